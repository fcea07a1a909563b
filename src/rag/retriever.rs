//! 检索适配器：查询文档索引，把命中结果规范化为单个上下文字符串

use std::sync::Arc;
use std::time::Duration;

use crate::core::RagError;
use crate::index::{DocumentIndex, SearchHit};

/// 无命中时的哨兵值：保证下游仍能构建完整的指令块
pub const NO_CONTEXT: &str = "No relevant documents found.";
/// 每条命中的前缀
pub const DOCUMENT_PREFIX: &str = "Document: ";
/// 命中之间的分隔（空行）
const SEPARATOR: &str = "\n\n";
/// 重试间隔基数（第 n 次重试等待 n * BACKOFF）
const RETRY_BACKOFF: Duration = Duration::from_millis(200);

/// 将有序命中拼为上下文；零命中返回 NO_CONTEXT
pub fn format_context(hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return NO_CONTEXT.to_string();
    }
    hits.iter()
        .map(|h| format!("{DOCUMENT_PREFIX}{}", h.content))
        .collect::<Vec<_>>()
        .join(SEPARATOR)
}

/// 检索器：持有索引、top_k 与可选的有界重试次数（默认不重试）
pub struct Retriever {
    index: Arc<dyn DocumentIndex>,
    top_k: usize,
    max_retries: u32,
}

impl Retriever {
    pub fn new(index: Arc<dyn DocumentIndex>, top_k: usize) -> Self {
        Self {
            index,
            top_k,
            max_retries: 0,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// 查询原样透传给索引（不做客户端校验），由索引决定相关度
    pub async fn retrieve(&self, query: &str) -> Result<String, RagError> {
        let mut attempt = 0;
        loop {
            match self.index.search(query, self.top_k).await {
                Ok(hits) => {
                    tracing::debug!(hits = hits.len(), "retrieval finished");
                    return Ok(format_context(&hits));
                }
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(attempt, error = %e, "retrieval failed, retrying");
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
                Err(e) => return Err(RagError::Retrieval(e)),
            }
        }
    }
}
