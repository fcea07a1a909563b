//! 错误类型
//!
//! 一轮对话中可能出现的失败：检索、生成、配置、索引写入、超时、取消与工具层错误。
//! 均不自动重试（检索的可选有界重试除外），由 run_turn 的调用方决定是否重跑整轮。

use thiserror::Error;

/// 流水线错误
#[derive(Error, Debug)]
pub enum RagError {
    /// 文档索引查询失败或不可达
    #[error("Retrieval failed: {0}")]
    Retrieval(String),

    /// Chat 后端在调用时或流式过程中失败；已输出的文本不回收
    #[error("Generation failed: {0}")]
    Generation(String),

    /// 启动时缺少必需配置（端点 / 凭据 / 模型）
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// 建索引或上传文档失败
    #[error("Index error: {0}")]
    Index(String),

    #[error("{stage} timed out after {secs}s")]
    Timeout { stage: &'static str, secs: u64 },

    #[error("Turn cancelled")]
    Cancelled,

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),
}

impl RagError {
    /// 是否为启动期致命错误（配置缺失时不允许开始任何一轮）
    pub fn is_fatal(&self) -> bool {
        matches!(self, RagError::Configuration(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_names_stage() {
        let err = RagError::Timeout {
            stage: "retrieval",
            secs: 5,
        };
        assert_eq!(err.to_string(), "retrieval timed out after 5s");
    }

    #[test]
    fn test_only_configuration_is_fatal() {
        assert!(RagError::Configuration("missing endpoint".into()).is_fatal());
        assert!(!RagError::Retrieval("boom".into()).is_fatal());
        assert!(!RagError::Cancelled.is_fatal());
    }
}
