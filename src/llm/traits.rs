//! Chat 后端抽象
//!
//! 所有后端（OpenAI 兼容 / Azure OpenAI / Mock）实现 ChatBackend：接收有序消息、声明的工具集与
//! tool_choice，返回惰性事件流（文本增量 / 一轮结束时汇总的工具调用）。

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use crate::memory::{Message, ToolCallRequest};
use crate::tools::ToolDefinition;

/// 后端流中的单个事件
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    /// 文本增量
    Text(String),
    /// 本轮生成结束时模型请求的工具调用（按模型给出的顺序）
    ToolCalls(Vec<ToolCallRequest>),
}

pub type BackendStream = Pin<Box<dyn Stream<Item = Result<BackendEvent, String>> + Send>>;

/// 一次流式 Chat 请求
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    /// 为空表示不声明任何工具
    pub tools: Vec<ToolDefinition>,
    /// "auto" / "required"；None 时不发送
    pub tool_choice: Option<&'static str>,
}

#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// 发起流式完成；连接失败在此返回 Err，流中途失败由流内 Err 表示
    async fn stream_chat(&self, request: ChatRequest) -> Result<BackendStream, String>;

    /// 后端描述（日志用）
    fn describe(&self) -> String {
        "chat-backend".to_string()
    }
}
