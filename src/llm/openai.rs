//! OpenAI 兼容 / Azure OpenAI 流式 Chat 客户端
//!
//! 通过 async_openai 的 `chat().create_stream` 发请求（OpenAI 兼容端点可配置 base_url，Azure 走 deployment）；
//! chunk 由 StreamDecoder 转为 BackendEvent，整个流在调用方 poll 时才推进，不额外起任务。

use std::collections::VecDeque;
use std::fmt::Display;

use async_openai::config::{AzureConfig, Config, OpenAIConfig};
use async_openai::types::chat::{CreateChatCompletionRequest, CreateChatCompletionStreamResponse};
use async_openai::Client;
use async_trait::async_trait;
use futures_util::{stream, Stream, StreamExt};

use crate::llm::convert::{build_request, StreamDecoder};
use crate::llm::{BackendEvent, BackendStream, ChatBackend, ChatRequest};

pub const DEFAULT_AZURE_API_VERSION: &str = "2024-06-01";

enum Provider {
    OpenAi(Client<OpenAIConfig>),
    Azure(Client<AzureConfig>),
}

/// 流式 Chat 客户端（OpenAI 兼容端点或 Azure OpenAI deployment）
pub struct OpenAiChatBackend {
    provider: Provider,
    /// Azure 下填 deployment 名，实际模型由 deployment 决定
    model: String,
    label: String,
}

impl OpenAiChatBackend {
    pub fn openai(base_url: Option<&str>, model: &str, api_key: &str) -> Self {
        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(url) = base_url {
            config = config.with_api_base(url.trim_end_matches('/'));
        }
        Self {
            provider: Provider::OpenAi(Client::with_config(config)),
            model: model.to_string(),
            label: format!("openai:{model}"),
        }
    }

    pub fn azure(
        endpoint: &str,
        deployment: &str,
        api_version: Option<&str>,
        api_key: &str,
    ) -> Self {
        let config = AzureConfig::new()
            .with_api_base(endpoint.trim_end_matches('/'))
            .with_deployment_id(deployment)
            .with_api_version(api_version.unwrap_or(DEFAULT_AZURE_API_VERSION))
            .with_api_key(api_key);
        Self {
            provider: Provider::Azure(Client::with_config(config)),
            model: deployment.to_string(),
            label: format!("azure:{deployment}"),
        }
    }
}

async fn open_stream<C: Config>(
    client: &Client<C>,
    request: CreateChatCompletionRequest,
) -> Result<BackendStream, String> {
    let chunks = client
        .chat()
        .create_stream(request)
        .await
        .map_err(|e| format!("chat request failed: {e}"))?;
    Ok(backend_stream(chunks))
}

struct StreamState<S> {
    chunks: S,
    decoder: StreamDecoder,
    pending: VecDeque<Result<BackendEvent, String>>,
    closed: bool,
}

fn backend_stream<S, E>(chunks: S) -> BackendStream
where
    S: Stream<Item = Result<CreateChatCompletionStreamResponse, E>> + Send + Unpin + 'static,
    E: Display + Send + 'static,
{
    let state = StreamState {
        chunks,
        decoder: StreamDecoder::default(),
        pending: VecDeque::new(),
        closed: false,
    };
    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.closed {
                return None;
            }
            match state.chunks.next().await {
                Some(Ok(chunk)) => {
                    let events = state.decoder.feed(chunk);
                    state.pending.extend(events.into_iter().map(Ok));
                }
                Some(Err(e)) => {
                    let msg = format!("chat stream error: {e}");
                    tracing::error!("{}", msg);
                    state.pending.push_back(Err(msg));
                    state.closed = true;
                }
                None => {
                    match state.decoder.finish() {
                        Ok(events) => state.pending.extend(events.into_iter().map(Ok)),
                        Err(e) => state.pending.push_back(Err(e)),
                    }
                    state.closed = true;
                }
            }
        }
    })
    .boxed()
}

#[async_trait]
impl ChatBackend for OpenAiChatBackend {
    async fn stream_chat(&self, request: ChatRequest) -> Result<BackendStream, String> {
        tracing::debug!(
            backend = %self.label,
            messages = request.messages.len(),
            tools = request.tools.len(),
            tool_choice = ?request.tool_choice,
            "chat request"
        );
        let request = build_request(&self.model, &request)?;
        match &self.provider {
            Provider::OpenAi(client) => open_stream(client, request).await,
            Provider::Azure(client) => open_stream(client, request).await,
        }
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}
