//! 会话 Agent
//!
//! ChatAgent 包装一个流式 Chat 后端：invoke_stream 接收当前历史，返回惰性的片段流。
//! 后端某轮以工具调用结束时，Agent 依次产出 ToolCall / ToolResult 标记片段，
//! 把 assistant(tool_calls) 与 tool 消息追加到私有工作副本，再发起下一轮；
//! 首次 poll 之前不会向后端发出任何请求。

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::{stream, Stream, StreamExt};

use crate::core::RagError;
use crate::llm::{BackendEvent, BackendStream, ChatBackend, ChatRequest};
use crate::memory::{Message, ToolCallRequest};
use crate::tools::{FunctionChoicePolicy, ToolExecutor};

/// None 策略下拒绝执行时回给模型的结果
pub const TOOL_DISABLED_RESULT: &str = "Error: tool invocation is disabled";
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 4;

/// 片段内容：文本增量，或工具调用 / 工具结果标记
#[derive(Debug, Clone, PartialEq)]
pub enum FragmentContent {
    Text(String),
    ToolCall(ToolCallRequest),
    ToolResult {
        call_id: String,
        name: String,
        result: String,
    },
}

/// Agent 流式输出的最小单元，带作者（Agent 显示名）
#[derive(Debug, Clone, PartialEq)]
pub struct StreamedContentFragment {
    pub author: String,
    pub content: FragmentContent,
}

impl StreamedContentFragment {
    pub fn text(author: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            content: FragmentContent::Text(text.into()),
        }
    }

    /// 可展示的文本；工具标记与空文本返回 None
    pub fn display_text(&self) -> Option<&str> {
        match &self.content {
            FragmentContent::Text(t) if !t.is_empty() => Some(t),
            _ => None,
        }
    }

    pub fn is_tool_marker(&self) -> bool {
        !matches!(self.content, FragmentContent::Text(_))
    }
}

pub type FragmentStream =
    Pin<Box<dyn Stream<Item = Result<StreamedContentFragment, RagError>> + Send>>;

/// 流式会话 Agent：后端、工具执行器与调用策略均在构建时固定
#[derive(Clone)]
pub struct ChatAgent {
    name: String,
    instructions: Option<String>,
    backend: Arc<dyn ChatBackend>,
    executor: Arc<ToolExecutor>,
    policy: FunctionChoicePolicy,
    max_tool_rounds: usize,
}

impl ChatAgent {
    pub fn new(
        name: impl Into<String>,
        backend: Arc<dyn ChatBackend>,
        executor: Arc<ToolExecutor>,
    ) -> Self {
        Self {
            name: name.into(),
            instructions: None,
            backend,
            executor,
            policy: FunctionChoicePolicy::default(),
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }

    /// 附加到每次后端请求最前面的 system 指令（不写入编排器历史）
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        let instructions = instructions.into();
        self.instructions = (!instructions.trim().is_empty()).then_some(instructions);
        self
    }

    pub fn with_policy(mut self, policy: FunctionChoicePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    /// 以 history 的快照发起一次调用；返回的流有限、只能消费一次
    pub fn invoke_stream(&self, history: &[Message]) -> FragmentStream {
        let run = AgentRun {
            agent: self.clone(),
            messages: history.to_vec(),
            phase: Phase::Request,
            round: 0,
            tool_rounds: 0,
            round_text: String::new(),
            round_calls: Vec::new(),
            called_tool: false,
            pending: VecDeque::new(),
        };
        stream::unfold(run, |mut run| async move {
            loop {
                if let Some(item) = run.pending.pop_front() {
                    return Some((item, run));
                }
                match run.phase {
                    Phase::Finished => return None,
                    Phase::Request => run.start_round().await,
                    Phase::Streaming(_) => run.pull().await,
                }
            }
        })
        .boxed()
    }

    fn request_for(&self, messages: &[Message], round: usize) -> ChatRequest {
        let mut all = Vec::with_capacity(messages.len() + 1);
        if let Some(instructions) = &self.instructions {
            all.push(Message::system(instructions.clone()));
        }
        all.extend_from_slice(messages);

        let (tools, tool_choice) = if self.policy.exposes_tools() {
            (
                self.executor.definitions(),
                self.policy.tool_choice_for_round(round),
            )
        } else {
            (Vec::new(), None)
        };
        ChatRequest {
            messages: all,
            tools,
            tool_choice,
        }
    }

    async fn run_tool(&self, call: &ToolCallRequest) -> String {
        if !self.policy.exposes_tools() {
            tracing::warn!(tool = %call.name, "tool call refused: function choice is none");
            return TOOL_DISABLED_RESULT.to_string();
        }
        let args: serde_json::Value = if call.arguments.trim().is_empty() {
            serde_json::json!({})
        } else {
            match serde_json::from_str(&call.arguments) {
                Ok(v) => v,
                Err(e) => return format!("Error: invalid tool arguments: {e}"),
            }
        };
        match self.executor.execute(&call.name, args).await {
            Ok(result) => result,
            Err(e) => format!("Error: {e}"),
        }
    }
}

enum Phase {
    Request,
    Streaming(BackendStream),
    Finished,
}

/// 单次调用的运行状态（unfold 的状态）
struct AgentRun {
    agent: ChatAgent,
    messages: Vec<Message>,
    phase: Phase,
    round: usize,
    tool_rounds: usize,
    round_text: String,
    round_calls: Vec<ToolCallRequest>,
    called_tool: bool,
    pending: VecDeque<Result<StreamedContentFragment, RagError>>,
}

impl AgentRun {
    fn fragment(&self, content: FragmentContent) -> StreamedContentFragment {
        StreamedContentFragment {
            author: self.agent.name.clone(),
            content,
        }
    }

    fn fail(&mut self, err: RagError) {
        self.pending.push_back(Err(err));
        self.phase = Phase::Finished;
    }

    async fn start_round(&mut self) {
        let request = self.agent.request_for(&self.messages, self.round);
        tracing::debug!(
            round = self.round,
            backend = %self.agent.backend.describe(),
            tool_choice = ?request.tool_choice,
            "agent round"
        );
        self.round_text.clear();
        self.round_calls.clear();
        match self.agent.backend.stream_chat(request).await {
            Ok(s) => self.phase = Phase::Streaming(s),
            Err(e) => self.fail(RagError::Generation(e)),
        }
    }

    async fn pull(&mut self) {
        let next = match &mut self.phase {
            Phase::Streaming(s) => s.next().await,
            _ => return,
        };
        match next {
            Some(Ok(BackendEvent::Text(text))) => {
                if !text.is_empty() {
                    self.round_text.push_str(&text);
                    let fragment = self.fragment(FragmentContent::Text(text));
                    self.pending.push_back(Ok(fragment));
                }
            }
            Some(Ok(BackendEvent::ToolCalls(calls))) => self.round_calls.extend(calls),
            Some(Err(e)) => self.fail(RagError::Generation(e)),
            None => self.finish_round().await,
        }
    }

    async fn finish_round(&mut self) {
        if self.round_calls.is_empty() {
            if self.agent.policy == FunctionChoicePolicy::Required && !self.called_tool {
                tracing::warn!(
                    "function choice is required but the model answered without a tool call"
                );
            }
            self.phase = Phase::Finished;
            return;
        }

        self.tool_rounds += 1;
        if self.tool_rounds > self.agent.max_tool_rounds {
            self.fail(RagError::Generation(format!(
                "exceeded max tool rounds ({})",
                self.agent.max_tool_rounds
            )));
            return;
        }
        self.called_tool = true;

        let calls = std::mem::take(&mut self.round_calls);
        let text = std::mem::take(&mut self.round_text);
        self.messages
            .push(Message::assistant_tool_calls(text, calls.clone()));
        for call in calls {
            let marker = self.fragment(FragmentContent::ToolCall(call.clone()));
            self.pending.push_back(Ok(marker));
            let result = self.agent.run_tool(&call).await;
            self.messages.push(Message::tool(call.id.clone(), result.clone()));
            let marker = self.fragment(FragmentContent::ToolResult {
                call_id: call.id,
                name: call.name,
                result,
            });
            self.pending.push_back(Ok(marker));
        }
        self.round += 1;
        self.phase = Phase::Request;
    }
}
