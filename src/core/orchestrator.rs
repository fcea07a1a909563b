//! 轮次编排器：主控循环
//!
//! 每轮：检索 → 构建增强提示（ContextBuilt）→ 写入历史 [system, user]（HistoryPrimed）→
//! 调用 Agent 并把可展示文本逐段推给 sink（Streaming）→ 重置历史（Done）。
//! 检索与每次等待下一片段都有超时；CancellationToken 触发时立即中止。
//! 任一环节失败：历史回到本轮开始前的样子，状态回到 Idle。

use std::time::Duration;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::agent::ChatAgent;
use crate::core::{RagError, TurnOutcome, TurnState};
use crate::memory::{ConversationHistory, Message};
use crate::rag::{augment, Retriever};
use crate::ui::ResponseSink;

pub const DEFAULT_RETRIEVAL_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_STREAM_IDLE_TIMEOUT_SECS: u64 = 120;

pub struct TurnOrchestrator {
    retriever: Retriever,
    agent: ChatAgent,
    history: ConversationHistory,
    state: TurnState,
    /// 为 true 时跨轮保留历史（追加 assistant 回答并裁剪），否则每轮结束清空
    retain_history: bool,
    retrieval_timeout: Duration,
    stream_idle_timeout: Duration,
}

impl TurnOrchestrator {
    pub fn new(retriever: Retriever, agent: ChatAgent) -> Self {
        Self {
            retriever,
            agent,
            history: ConversationHistory::default(),
            state: TurnState::Idle,
            retain_history: false,
            retrieval_timeout: Duration::from_secs(DEFAULT_RETRIEVAL_TIMEOUT_SECS),
            stream_idle_timeout: Duration::from_secs(DEFAULT_STREAM_IDLE_TIMEOUT_SECS),
        }
    }

    pub fn with_timeouts(mut self, retrieval_secs: u64, stream_idle_secs: u64) -> Self {
        self.retrieval_timeout = Duration::from_secs(retrieval_secs);
        self.stream_idle_timeout = Duration::from_secs(stream_idle_secs);
        self
    }

    pub fn with_retained_history(mut self, max_turns: usize) -> Self {
        self.retain_history = true;
        self.history = ConversationHistory::new(max_turns);
        self
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn history(&self) -> &[Message] {
        self.history.messages()
    }

    /// 跑完一整轮；返回展示给用户的完整回答
    pub async fn run_turn(
        &mut self,
        query: &str,
        sink: &mut dyn ResponseSink,
        cancel: CancellationToken,
    ) -> Result<TurnOutcome, RagError> {
        let turn_id = Uuid::new_v4();
        let span = tracing::info_span!("turn", %turn_id);
        let checkpoint = self.history.len();
        self.state = TurnState::Idle;

        let result = self
            .run_steps(turn_id, query, sink, &cancel)
            .instrument(span)
            .await;

        if let Err(e) = &result {
            tracing::warn!(%turn_id, error = %e, "turn aborted");
            self.rollback(checkpoint);
        }
        result
    }

    async fn run_steps(
        &mut self,
        turn_id: Uuid,
        query: &str,
        sink: &mut dyn ResponseSink,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, RagError> {
        let augmented = self.build_context(query, cancel).await?;
        self.prime_history(query, augmented);
        let (response, tool_events) = self.stream(sink, cancel).await?;
        self.finish(&response);
        tracing::info!(chars = response.chars().count(), tool_events, "turn finished");
        Ok(TurnOutcome {
            turn_id,
            response,
            tool_events,
        })
    }

    fn advance(&mut self, next: TurnState) {
        if !self.state.can_advance_to(next) {
            tracing::warn!(from = %self.state, to = %next, "unexpected turn transition");
        }
        tracing::debug!(from = %self.state, to = %next, "turn state");
        self.state = next;
    }

    /// Idle → ContextBuilt：检索并构建增强提示
    async fn build_context(
        &mut self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<String, RagError> {
        let context = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RagError::Cancelled),
            r = tokio::time::timeout(self.retrieval_timeout, self.retriever.retrieve(query)) => {
                r.map_err(|_| RagError::Timeout {
                    stage: "retrieval",
                    secs: self.retrieval_timeout.as_secs(),
                })??
            }
        };
        let augmented = augment(query, &context);
        self.advance(TurnState::ContextBuilt);
        Ok(augmented)
    }

    /// ContextBuilt → HistoryPrimed：追加 system(增强提示) 与 user(原始问题)
    fn prime_history(&mut self, query: &str, augmented: String) {
        if !self.retain_history {
            self.history.clear();
        }
        self.history.push(Message::system(augmented));
        self.history.push(Message::user(query));
        self.advance(TurnState::HistoryPrimed);
    }

    /// HistoryPrimed → Streaming：过滤工具标记，文本按到达顺序推给 sink
    async fn stream(
        &mut self,
        sink: &mut dyn ResponseSink,
        cancel: &CancellationToken,
    ) -> Result<(String, usize), RagError> {
        self.advance(TurnState::Streaming);
        let mut fragments = self.agent.invoke_stream(self.history.messages());
        let mut response = String::new();
        let mut tool_events = 0usize;
        let mut begun = false;

        let result = loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break Err(RagError::Cancelled),
                n = tokio::time::timeout(self.stream_idle_timeout, fragments.next()) => n,
            };
            match next {
                Err(_) => {
                    break Err(RagError::Timeout {
                        stage: "stream",
                        secs: self.stream_idle_timeout.as_secs(),
                    })
                }
                Ok(None) => break Ok(()),
                Ok(Some(Err(e))) => break Err(e),
                Ok(Some(Ok(fragment))) => {
                    if let Some(text) = fragment.display_text() {
                        if !begun {
                            sink.begin(&fragment.author);
                            begun = true;
                        }
                        sink.text(text);
                        response.push_str(text);
                    } else if fragment.is_tool_marker() {
                        tool_events += 1;
                    }
                }
            }
        };

        if begun {
            sink.end();
        }
        result.map(|_| (response, tool_events))
    }

    /// Streaming → Done：默认清空历史；保留模式下追加回答并裁剪
    fn finish(&mut self, response: &str) {
        self.advance(TurnState::Done);
        if self.retain_history {
            self.history.push(Message::assistant(response));
            self.history.prune();
        } else {
            self.history.clear();
        }
    }

    fn rollback(&mut self, checkpoint: usize) {
        if self.retain_history {
            self.history.truncate(checkpoint);
        } else {
            self.history.clear();
        }
        self.state = TurnState::Idle;
    }
}
