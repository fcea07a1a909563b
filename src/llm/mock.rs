//! Mock Chat 后端（无需 API）
//!
//! - `ScriptedChatBackend`：按脚本逐轮回放事件，并记录收到的请求，供测试断言
//! - `EchoChatBackend`：离线演示用，从增强提示中取出上下文与查询，按词流式输出一段有据回答；
//!   tool_choice 为 required 且尚无工具结果时，先请求一次 augment_prompt

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use serde_json::json;

use crate::llm::{BackendEvent, BackendStream, ChatBackend, ChatRequest};
use crate::memory::{Role, ToolCallRequest};
use crate::rag::augment::{CONTEXT_LABEL, QUERY_LABEL};
use crate::rag::retriever::DOCUMENT_PREFIX;
use crate::rag::NO_CONTEXT;
use crate::tools::AUGMENT_TOOL_NAME;

/// 脚本中的一轮后端响应
#[derive(Debug, Clone)]
pub enum ScriptedRound {
    /// 依次产出的流元素（Err 表示流中途失败）
    Stream(Vec<Result<BackendEvent, String>>),
    /// 调用即失败
    InvokeError(String),
}

impl ScriptedRound {
    pub fn text(chunks: &[&str]) -> Self {
        ScriptedRound::Stream(
            chunks
                .iter()
                .map(|c| Ok(BackendEvent::Text(c.to_string())))
                .collect(),
        )
    }

    pub fn tool_call(id: &str, name: &str, arguments: serde_json::Value) -> Self {
        ScriptedRound::Stream(vec![Ok(BackendEvent::ToolCalls(vec![ToolCallRequest {
            id: id.to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }]))])
    }
}

/// 按脚本回放的后端
#[derive(Default)]
pub struct ScriptedChatBackend {
    rounds: Mutex<VecDeque<ScriptedRound>>,
    requests: Mutex<Vec<ChatRequest>>,
    delay: Option<Duration>,
}

impl ScriptedChatBackend {
    pub fn new(rounds: Vec<ScriptedRound>) -> Self {
        Self {
            rounds: Mutex::new(rounds.into()),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// 每个事件产出前等待 delay（用于超时 / 取消测试）
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// 已收到的请求（按调用顺序）
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ChatBackend for ScriptedChatBackend {
    async fn stream_chat(&self, request: ChatRequest) -> Result<BackendStream, String> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        let round = self
            .rounds
            .lock()
            .map_err(|_| "script lock poisoned".to_string())?
            .pop_front()
            .ok_or_else(|| "scripted backend exhausted".to_string())?;

        match round {
            ScriptedRound::InvokeError(e) => Err(e),
            ScriptedRound::Stream(items) => Ok(delayed_stream(items, self.delay)),
        }
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

fn delayed_stream(
    items: Vec<Result<BackendEvent, String>>,
    delay: Option<Duration>,
) -> BackendStream {
    stream::unfold(items.into_iter(), move |mut items| async move {
        let item = items.next()?;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Some((item, items))
    })
    .boxed()
}

/// 离线回显后端：只依据增强提示里的上下文作答
#[derive(Debug, Default)]
pub struct EchoChatBackend {
    delay: Option<Duration>,
}

impl EchoChatBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// 每个词之间的停顿，模拟打字效果
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// 从增强提示中拆出 (context, query)
pub(crate) fn parse_augmented(prompt: &str) -> Option<(String, String)> {
    let rest = prompt.split_once(CONTEXT_LABEL)?.1;
    let (context, rest) = rest.split_once(&format!("\n\n{QUERY_LABEL}\n"))?;
    let query = rest.split("\n\n").next().unwrap_or_default();
    Some((context.trim().to_string(), query.trim().to_string()))
}

fn grounded_answer(context: &str, query: &str) -> String {
    if context == NO_CONTEXT || context.is_empty() {
        return format!(
            "I could not find anything in the provided documents about \"{query}\", so I cannot answer from them."
        );
    }
    let first = context
        .split("\n\n")
        .next()
        .unwrap_or(context)
        .trim_start_matches(DOCUMENT_PREFIX);
    format!("According to the retrieved documents: {first}")
}

fn word_chunks(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        current.push(ch);
        if ch == ' ' {
            chunks.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[async_trait]
impl ChatBackend for EchoChatBackend {
    async fn stream_chat(&self, request: ChatRequest) -> Result<BackendStream, String> {
        let tool_result = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Tool)
            .map(|m| m.content.clone());

        let augmented = match &tool_result {
            Some(result) => parse_augmented(result),
            None => request
                .messages
                .iter()
                .rev()
                .filter(|m| m.role == Role::System)
                .find_map(|m| parse_augmented(&m.content)),
        };

        let wants_tool = tool_result.is_none()
            && request.tool_choice == Some("required")
            && request.tools.iter().any(|t| t.name == AUGMENT_TOOL_NAME);
        if wants_tool {
            if let Some((context, query)) = &augmented {
                let call = ToolCallRequest {
                    id: format!("call_{}", uuid::Uuid::new_v4().simple()),
                    name: AUGMENT_TOOL_NAME.to_string(),
                    arguments: json!({ "query": query, "context": context }).to_string(),
                };
                return Ok(delayed_stream(
                    vec![Ok(BackendEvent::ToolCalls(vec![call]))],
                    None,
                ));
            }
        }

        let answer = match augmented {
            Some((context, query)) => grounded_answer(&context, &query),
            None => "I have no retrieved context to answer from.".to_string(),
        };
        let items = word_chunks(&answer)
            .into_iter()
            .map(|c| Ok(BackendEvent::Text(c)))
            .collect();
        Ok(delayed_stream(items, self.delay))
    }

    fn describe(&self) -> String {
        "echo".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Message;
    use crate::rag::augment;
    use crate::tools::ToolDefinition;

    async fn collect_text(stream: BackendStream) -> String {
        let items: Vec<_> = stream.collect().await;
        items
            .into_iter()
            .filter_map(|i| match i {
                Ok(BackendEvent::Text(t)) => Some(t),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_scripted_replays_and_records() {
        let backend = ScriptedChatBackend::new(vec![
            ScriptedRound::text(&["a", "b"]),
            ScriptedRound::InvokeError("boom".into()),
        ]);
        let first = backend
            .stream_chat(ChatRequest {
                messages: vec![Message::user("q")],
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(collect_text(first).await, "ab");
        assert!(backend.stream_chat(ChatRequest::default()).await.is_err());
        assert!(backend.stream_chat(ChatRequest::default()).await.is_err());
        let requests = backend.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].messages[0].content, "q");
    }

    #[test]
    fn test_parse_augmented() {
        let prompt = augment("What is it?", "Document: A\n\nDocument: B");
        let (context, query) = parse_augmented(&prompt).unwrap();
        assert_eq!(context, "Document: A\n\nDocument: B");
        assert_eq!(query, "What is it?");
        assert!(parse_augmented("plain text").is_none());
    }

    #[tokio::test]
    async fn test_echo_answers_from_context() {
        let prompt = augment(
            "Can you explain Contoso's travel insurance coverage?",
            "Document: Contoso's travel insurance covers lost baggage.",
        );
        let backend = EchoChatBackend::new();
        let stream = backend
            .stream_chat(ChatRequest {
                messages: vec![Message::system(prompt), Message::user("q")],
                ..Default::default()
            })
            .await
            .unwrap();
        let text = collect_text(stream).await;
        assert_eq!(
            text,
            "According to the retrieved documents: Contoso's travel insurance covers lost baggage."
        );
    }

    #[tokio::test]
    async fn test_echo_without_context_does_not_cite() {
        let prompt = augment("What is Neural Network?", NO_CONTEXT);
        let stream = EchoChatBackend::new()
            .stream_chat(ChatRequest {
                messages: vec![Message::system(prompt)],
                ..Default::default()
            })
            .await
            .unwrap();
        let text = collect_text(stream).await;
        assert!(text.contains("could not find"));
        assert!(!text.contains("Document:"));
    }

    #[tokio::test]
    async fn test_echo_requests_tool_when_required() {
        let prompt = augment("q", "Document: x");
        let request = ChatRequest {
            messages: vec![Message::system(prompt)],
            tools: vec![ToolDefinition {
                name: AUGMENT_TOOL_NAME.into(),
                description: String::new(),
                parameters: json!({}),
            }],
            tool_choice: Some("required"),
        };
        let items: Vec<_> = EchoChatBackend::new()
            .stream_chat(request)
            .await
            .unwrap()
            .collect()
            .await;
        match &items[..] {
            [Ok(BackendEvent::ToolCalls(calls))] => assert_eq!(calls[0].name, AUGMENT_TOOL_NAME),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
