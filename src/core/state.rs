//! 单轮状态机
//!
//! Idle → ContextBuilt → HistoryPrimed → Streaming → Done；任一环节失败回到 Idle。
//! 下一轮开始时从 Idle 重新进入。

use std::fmt;

use serde::Serialize;
use uuid::Uuid;

/// 编排器当前所处阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize)]
pub enum TurnState {
    #[default]
    Idle,
    /// 已检索并构建增强提示
    ContextBuilt,
    /// 历史已写入 [system: 增强提示, user: 原始问题]
    HistoryPrimed,
    Streaming,
    Done,
}

impl TurnState {
    /// 合法的下一状态（失败时统一回 Idle，不在此列）
    pub fn can_advance_to(self, next: TurnState) -> bool {
        matches!(
            (self, next),
            (TurnState::Idle, TurnState::ContextBuilt)
                | (TurnState::Done, TurnState::ContextBuilt)
                | (TurnState::ContextBuilt, TurnState::HistoryPrimed)
                | (TurnState::HistoryPrimed, TurnState::Streaming)
                | (TurnState::Streaming, TurnState::Done)
        )
    }
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TurnState::Idle => "idle",
            TurnState::ContextBuilt => "context_built",
            TurnState::HistoryPrimed => "history_primed",
            TurnState::Streaming => "streaming",
            TurnState::Done => "done",
        };
        f.write_str(s)
    }
}

/// 一轮成功结束后的结果
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TurnOutcome {
    pub turn_id: Uuid,
    /// 展示给用户的完整回答（所有文本片段按序拼接）
    pub response: String,
    /// 过滤掉的工具标记片段数
    pub tool_events: usize,
}
