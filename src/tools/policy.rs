//! 函数调用策略：Agent 是否可以 / 必须 / 不得调用已声明的工具

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// 函数调用策略；每轮在 Agent 调用建立时读取一次，调用期间不变
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FunctionChoicePolicy {
    /// 模型自行决定调用零个或多个工具
    #[default]
    Auto,
    /// 给出最终回答前至少调用一次工具
    Required,
    /// 不向模型暴露工具
    None,
}

impl FunctionChoicePolicy {
    /// 是否向后端声明工具
    pub fn exposes_tools(self) -> bool {
        !matches!(self, FunctionChoicePolicy::None)
    }

    /// 第 round 轮请求的 tool_choice 值；None 策略不发送。
    /// Required 只约束首轮，拿到工具结果后放开为 auto，让模型能给出最终回答
    pub fn tool_choice_for_round(self, round: usize) -> Option<&'static str> {
        match self {
            FunctionChoicePolicy::None => None,
            FunctionChoicePolicy::Auto => Some("auto"),
            FunctionChoicePolicy::Required if round == 0 => Some("required"),
            FunctionChoicePolicy::Required => Some("auto"),
        }
    }
}

impl fmt::Display for FunctionChoicePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FunctionChoicePolicy::Auto => "auto",
            FunctionChoicePolicy::Required => "required",
            FunctionChoicePolicy::None => "none",
        };
        f.write_str(s)
    }
}

impl FromStr for FunctionChoicePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(FunctionChoicePolicy::Auto),
            "required" => Ok(FunctionChoicePolicy::Required),
            "none" => Ok(FunctionChoicePolicy::None),
            other => Err(format!(
                "unknown function choice '{other}' (expected auto, required or none)"
            )),
        }
    }
}
