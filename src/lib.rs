//! ragent - 检索增强的会话 Agent 轮次循环
//!
//! 模块划分：
//! - **agent**: 会话 Agent，流式片段与工具调用循环
//! - **config**: 应用配置加载（TOML + 环境变量）与校验
//! - **core**: 错误类型、轮次状态机、编排器、组件构建
//! - **index**: 文档索引抽象（进程内 / Azure AI Search）与播种
//! - **llm**: 流式 Chat 后端（OpenAI 兼容 / Azure OpenAI / Mock）
//! - **memory**: 对话历史与分词
//! - **observability**: tracing 日志初始化
//! - **rag**: 检索适配器与增强提示
//! - **tools**: 工具注册表、调用策略、执行器
//! - **ui**: 回答输出（终端 / 缓冲）

pub mod agent;
pub mod config;
pub mod core;
pub mod index;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod rag;
pub mod tools;
pub mod ui;

pub use crate::agent::{ChatAgent, FragmentContent, StreamedContentFragment};
pub use crate::config::{load_config, AppConfig};
pub use crate::core::{AgentBuilder, RagError, TurnOrchestrator, TurnOutcome, TurnState};
