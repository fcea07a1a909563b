//! 内存索引：按关键词重叠打分（无真实向量），用于本地运行与测试

use std::collections::HashSet;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::index::{Document, DocumentIndex, IndexSchema, SearchHit};
use crate::memory::tokenizer;

struct Entry {
    doc: Document,
    terms: HashSet<String>,
}

#[derive(Default)]
struct State {
    schema: Option<IndexSchema>,
    /// 上传顺序即同分时的排序
    entries: Vec<Entry>,
}

/// 简单内存实现：create_index 之后才能 upload；同 id 上传覆盖原文档并保留原位置
#[derive(Default)]
pub struct InMemoryIndex {
    state: RwLock<State>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以默认 schema 建好并装入文档（测试与离线演示用）
    pub fn with_documents(documents: Vec<Document>) -> Self {
        let entries = documents.into_iter().map(Self::entry).collect();
        Self {
            state: RwLock::new(State {
                schema: Some(IndexSchema::default()),
                entries,
            }),
        }
    }

    fn entry(doc: Document) -> Entry {
        let terms = tokenizer::tokenize_to_set(&doc.content);
        Entry { doc, terms }
    }

    pub fn len(&self) -> usize {
        self.state.read().map(|s| s.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DocumentIndex for InMemoryIndex {
    async fn create_index(&self, schema: &IndexSchema) -> Result<(), String> {
        schema.validate()?;
        let mut state = self.state.write().map_err(|e| e.to_string())?;
        state.schema = Some(schema.clone());
        Ok(())
    }

    async fn upload(&self, documents: &[Document]) -> Result<usize, String> {
        let mut state = self.state.write().map_err(|e| e.to_string())?;
        if state.schema.is_none() {
            return Err("index has not been created".to_string());
        }
        if let Some(doc) = documents.iter().find(|d| d.id.trim().is_empty()) {
            return Err(format!("document key is required (content: {:.40})", doc.content));
        }
        for doc in documents {
            let entry = Self::entry(doc.clone());
            match state.entries.iter_mut().find(|e| e.doc.id == doc.id) {
                Some(existing) => *existing = entry,
                None => state.entries.push(entry),
            }
        }
        Ok(documents.len())
    }

    async fn search(&self, query: &str, top: usize) -> Result<Vec<SearchHit>, String> {
        let state = self.state.read().map_err(|e| e.to_string())?;
        if state.schema.is_none() {
            return Err("index has not been created".to_string());
        }
        let query_terms = tokenizer::tokenize_to_set(query);
        if query_terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, &Entry)> = state
            .entries
            .iter()
            .map(|e| (tokenizer::overlap_score(&query_terms, &e.terms), e))
            .filter(|(score, _)| *score > 0)
            .collect();
        // 稳定排序：同分保持上传顺序
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(top)
            .map(|(score, e)| SearchHit {
                id: Some(e.doc.id.clone()),
                content: e.doc.content.clone(),
                score: score as f32,
            })
            .collect())
    }
}
