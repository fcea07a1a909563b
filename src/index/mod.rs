//! 文档索引边界
//!
//! 外部协作者：按 id 存储文档、对可检索字段做相关度排序查询。流水线只通过
//! DocumentIndex 读取，从不修改文档；建索引与上传仅在启动播种时使用。
//! 实现：InMemoryIndex（本地 / 测试）、AzureSearchIndex（Azure AI Search REST）。

pub mod azure;
pub mod in_memory;
pub mod seed;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use azure::AzureSearchIndex;
pub use in_memory::InMemoryIndex;
pub use seed::{load_documents_from_dir, sample_documents, seed_index};

/// 文档：id 唯一且必填，content 为唯一可检索字段
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub content: String,
}

impl Document {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
        }
    }
}

/// 单条检索命中（按索引的相关度排序）
#[derive(Clone, Debug, PartialEq)]
pub struct SearchHit {
    pub id: Option<String>,
    pub content: String,
    pub score: f32,
}

/// 索引 schema：key 字段与可检索字段名
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexSchema {
    pub key_field: String,
    pub content_field: String,
}

impl Default for IndexSchema {
    fn default() -> Self {
        Self {
            key_field: "id".to_string(),
            content_field: "content".to_string(),
        }
    }
}

impl IndexSchema {
    pub fn validate(&self) -> Result<(), String> {
        if self.key_field.trim().is_empty() || self.content_field.trim().is_empty() {
            return Err("schema field names must not be empty".to_string());
        }
        if self.key_field == self.content_field {
            return Err(format!(
                "key field and searchable field must differ (both '{}')",
                self.key_field
            ));
        }
        Ok(())
    }
}

/// 文档索引 trait：建索引、上传（同 id 覆盖）、检索
#[async_trait]
pub trait DocumentIndex: Send + Sync {
    async fn create_index(&self, schema: &IndexSchema) -> Result<(), String>;

    async fn upload(&self, documents: &[Document]) -> Result<usize, String>;

    /// 返回最多 top 条命中，按相关度从高到低
    async fn search(&self, query: &str, top: usize) -> Result<Vec<SearchHit>, String>;
}
