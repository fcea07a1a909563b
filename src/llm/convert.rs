//! 内部消息 ↔ async_openai 类型
//!
//! 请求方向：Message / ToolDefinition / tool_choice → CreateChatCompletionRequest（stream=true）。
//! 响应方向：流式 chunk → BackendEvent；工具调用在流中按 index 分片到达，由 ToolCallAccumulator 拼接，
//! 整轮结束（finish_reason）后一次性产出。

use std::collections::BTreeMap;

use async_openai::types::chat::{
    ChatCompletionMessageToolCall, ChatCompletionMessageToolCallChunk,
    ChatCompletionMessageToolCalls, ChatCompletionRequestAssistantMessageArgs,
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessageArgs,
    ChatCompletionTool, ChatCompletionToolChoiceOption, ChatCompletionTools,
    CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
    CreateChatCompletionStreamResponse, FunctionCall, FunctionObjectArgs, ToolChoiceOptions,
};

use crate::llm::{BackendEvent, ChatRequest};
use crate::memory::{Message, Role, ToolCallRequest};
use crate::tools::ToolDefinition;

fn to_openai_message(m: &Message) -> Result<ChatCompletionRequestMessage, String> {
    let message = match m.role {
        Role::System => ChatCompletionRequestMessage::System(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(m.content.clone())
                .build()
                .map_err(|e| e.to_string())?,
        ),
        Role::User => ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessageArgs::default()
                .content(m.content.clone())
                .build()
                .map_err(|e| e.to_string())?,
        ),
        Role::Assistant => {
            let mut args = ChatCompletionRequestAssistantMessageArgs::default();
            if !m.content.is_empty() || m.tool_calls.is_empty() {
                args.content(m.content.clone());
            }
            if !m.tool_calls.is_empty() {
                let calls: Vec<ChatCompletionMessageToolCalls> = m
                    .tool_calls
                    .iter()
                    .map(|c| {
                        ChatCompletionMessageToolCalls::Function(ChatCompletionMessageToolCall {
                            id: c.id.clone(),
                            function: FunctionCall {
                                name: c.name.clone(),
                                arguments: c.arguments.clone(),
                            },
                        })
                    })
                    .collect();
                args.tool_calls(calls);
            }
            ChatCompletionRequestMessage::Assistant(args.build().map_err(|e| e.to_string())?)
        }
        Role::Tool => ChatCompletionRequestMessage::Tool(
            ChatCompletionRequestToolMessageArgs::default()
                .tool_call_id(m.tool_call_id.clone().unwrap_or_default())
                .content(m.content.clone())
                .build()
                .map_err(|e| e.to_string())?,
        ),
    };
    Ok(message)
}

fn to_openai_tool(tool: &ToolDefinition) -> Result<ChatCompletionTools, String> {
    let function = FunctionObjectArgs::default()
        .name(tool.name.clone())
        .description(tool.description.clone())
        .parameters(tool.parameters.clone())
        .build()
        .map_err(|e| e.to_string())?;
    let tool = ChatCompletionTool { function };
    Ok(ChatCompletionTools::Function(tool))
}

fn to_tool_choice(choice: &str) -> ChatCompletionToolChoiceOption {
    match choice {
        "required" => ChatCompletionToolChoiceOption::Mode(ToolChoiceOptions::Required),
        "none" => ChatCompletionToolChoiceOption::Mode(ToolChoiceOptions::None),
        _ => ChatCompletionToolChoiceOption::Mode(ToolChoiceOptions::Auto),
    }
}

/// 构建流式请求；未声明工具时 tools / tool_choice 都不发送
pub(crate) fn build_request(
    model: &str,
    request: &ChatRequest,
) -> Result<CreateChatCompletionRequest, String> {
    let messages = request
        .messages
        .iter()
        .map(to_openai_message)
        .collect::<Result<Vec<_>, _>>()?;

    let mut args = CreateChatCompletionRequestArgs::default();
    args.model(model).messages(messages).stream(true);
    if !request.tools.is_empty() {
        let tools = request
            .tools
            .iter()
            .map(to_openai_tool)
            .collect::<Result<Vec<_>, _>>()?;
        args.tools(tools);
        if let Some(choice) = request.tool_choice {
            args.tool_choice(to_tool_choice(choice));
        }
    }
    args.build().map_err(|e| format!("invalid chat request: {e}"))
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

/// 按 index 累积工具调用分片
#[derive(Debug, Default)]
pub(crate) struct ToolCallAccumulator {
    calls: BTreeMap<u32, PartialToolCall>,
}

impl ToolCallAccumulator {
    pub fn push(&mut self, delta: ChatCompletionMessageToolCallChunk) {
        let entry = self.calls.entry(delta.index).or_default();
        if let Some(id) = delta.id.filter(|id| !id.is_empty()) {
            entry.id = Some(id);
        }
        if let Some(function) = delta.function {
            if let Some(name) = function.name {
                entry.name.push_str(&name);
            }
            if let Some(arguments) = function.arguments {
                entry.arguments.push_str(&arguments);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// 取出已完成的调用（按 index 排序），无名称的分片丢弃，缺 id 时补一个
    pub fn take(&mut self) -> Vec<ToolCallRequest> {
        std::mem::take(&mut self.calls)
            .into_iter()
            .filter(|(_, c)| !c.name.is_empty())
            .map(|(index, c)| ToolCallRequest {
                id: c
                    .id
                    .unwrap_or_else(|| format!("call_{index}_{}", uuid::Uuid::new_v4().simple())),
                name: c.name,
                arguments: if c.arguments.trim().is_empty() {
                    "{}".to_string()
                } else {
                    c.arguments
                },
            })
            .collect()
    }
}

/// 流式 chunk → 后端事件
#[derive(Debug, Default)]
pub(crate) struct StreamDecoder {
    tool_calls: ToolCallAccumulator,
    finished: bool,
}

impl StreamDecoder {
    /// 只看 index 0 的 choice（Azure 首个 chunk 的 choices 可能为空）
    pub fn feed(&mut self, chunk: CreateChatCompletionStreamResponse) -> Vec<BackendEvent> {
        let mut events = Vec::new();
        for choice in chunk.choices.into_iter().filter(|c| c.index == 0) {
            if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
                events.push(BackendEvent::Text(text));
            }
            for call in choice.delta.tool_calls.unwrap_or_default() {
                self.tool_calls.push(call);
            }
            if choice.finish_reason.is_some() {
                self.finished = true;
                self.flush_into(&mut events);
            }
        }
        events
    }

    /// 底层流结束：未见 finish_reason 视为中途断开
    pub fn finish(&mut self) -> Result<Vec<BackendEvent>, String> {
        if !self.finished {
            return Err("stream closed before completion".to_string());
        }
        let mut events = Vec::new();
        self.flush_into(&mut events);
        Ok(events)
    }

    fn flush_into(&mut self, events: &mut Vec<BackendEvent>) {
        if !self.tool_calls.is_empty() {
            let calls = self.tool_calls.take();
            if !calls.is_empty() {
                events.push(BackendEvent::ToolCalls(calls));
            }
        }
    }
}

#[cfg(test)]
pub(crate) fn chunk_from_json(choices: serde_json::Value) -> CreateChatCompletionStreamResponse {
    serde_json::from_value(serde_json::json!({
        "id": "chatcmpl-1",
        "object": "chat.completion.chunk",
        "created": 1,
        "model": "gpt-4o-mini",
        "choices": choices,
    }))
    .unwrap()
}
