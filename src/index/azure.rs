//! Azure AI Search REST 客户端
//!
//! - 建索引：PUT {endpoint}/indexes/{name}
//! - 上传：POST {endpoint}/indexes/{name}/docs/index（@search.action = upload）
//! - 检索：POST {endpoint}/indexes/{name}/docs/search（search / top / select）
//!
//! 认证用 api-key 请求头，版本用 api-version 查询参数。

use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::index::{Document, DocumentIndex, IndexSchema, SearchHit};

pub const DEFAULT_SEARCH_API_VERSION: &str = "2023-11-01";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    value: Vec<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct IndexingResponse {
    #[serde(default)]
    value: Vec<IndexingResult>,
}

#[derive(Debug, Deserialize)]
struct IndexingResult {
    key: String,
    status: bool,
    #[serde(rename = "errorMessage")]
    error_message: Option<String>,
}

/// Azure AI Search 索引
pub struct AzureSearchIndex {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    index_name: String,
    api_version: String,
    /// 上传与检索使用的字段名；create_index 成功校验后替换为传入的 schema
    schema: RwLock<IndexSchema>,
}

impl AzureSearchIndex {
    pub fn new(
        endpoint: &str,
        api_key: &str,
        index_name: &str,
        api_version: Option<&str>,
        timeout_secs: u64,
    ) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| e.to_string())?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            index_name: index_name.to_string(),
            api_version: api_version.unwrap_or(DEFAULT_SEARCH_API_VERSION).to_string(),
            schema: RwLock::new(IndexSchema::default()),
        })
    }

    fn schema(&self) -> Result<IndexSchema, String> {
        self.schema.read().map(|s| s.clone()).map_err(|e| e.to_string())
    }

    fn set_schema(&self, schema: &IndexSchema) -> Result<(), String> {
        let mut current = self.schema.write().map_err(|e| e.to_string())?;
        *current = schema.clone();
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/indexes/{}{}?api-version={}",
            self.endpoint, self.index_name, path, self.api_version
        )
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, String> {
        let response = request
            .header("api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(format!("Azure AI Search returned {status}: {body}"))
    }
}

/// 建索引请求体：key 字段为 Edm.String + key，content 字段可检索
pub(crate) fn index_definition(name: &str, schema: &IndexSchema) -> Value {
    json!({
        "name": name,
        "fields": [
            {
                "name": schema.key_field,
                "type": "Edm.String",
                "key": true,
                "filterable": true
            },
            {
                "name": schema.content_field,
                "type": "Edm.String",
                "searchable": true
            }
        ]
    })
}

pub(crate) fn upload_batch(schema: &IndexSchema, documents: &[Document]) -> Value {
    let value: Vec<Value> = documents
        .iter()
        .map(|d| {
            let mut obj = Map::new();
            obj.insert("@search.action".into(), json!("upload"));
            obj.insert(schema.key_field.clone(), json!(d.id));
            obj.insert(schema.content_field.clone(), json!(d.content));
            Value::Object(obj)
        })
        .collect();
    json!({ "value": value })
}

pub(crate) fn search_body(schema: &IndexSchema, query: &str, top: usize) -> Value {
    json!({
        "search": query,
        "top": top,
        "select": format!("{},{}", schema.key_field, schema.content_field),
    })
}

fn parse_hits(schema: &IndexSchema, response: SearchResponse) -> Vec<SearchHit> {
    response
        .value
        .into_iter()
        .filter_map(|row| {
            let content = row.get(&schema.content_field)?.as_str()?.to_string();
            Some(SearchHit {
                id: row
                    .get(&schema.key_field)
                    .and_then(|v| v.as_str())
                    .map(String::from),
                content,
                score: row
                    .get("@search.score")
                    .and_then(|v| v.as_f64())
                    .unwrap_or_default() as f32,
            })
        })
        .collect()
}

#[async_trait]
impl DocumentIndex for AzureSearchIndex {
    async fn create_index(&self, schema: &IndexSchema) -> Result<(), String> {
        schema.validate()?;
        self.set_schema(schema)?;
        let body = index_definition(&self.index_name, schema);
        self.send(self.client.put(self.url("")).json(&body)).await?;
        tracing::info!(index = %self.index_name, "Azure AI Search index created or updated");
        Ok(())
    }

    async fn upload(&self, documents: &[Document]) -> Result<usize, String> {
        if documents.is_empty() {
            return Ok(0);
        }
        let body = upload_batch(&self.schema()?, documents);
        let response = self
            .send(self.client.post(self.url("/docs/index")).json(&body))
            .await?;
        let result: IndexingResponse = response.json().await.map_err(|e| e.to_string())?;
        let failed: Vec<String> = result
            .value
            .iter()
            .filter(|r| !r.status)
            .map(|r| format!("{}: {}", r.key, r.error_message.as_deref().unwrap_or("unknown")))
            .collect();
        if !failed.is_empty() {
            return Err(format!("upload failed for {}", failed.join("; ")));
        }
        Ok(result.value.len())
    }

    async fn search(&self, query: &str, top: usize) -> Result<Vec<SearchHit>, String> {
        let schema = self.schema()?;
        let body = search_body(&schema, query, top);
        let response = self
            .send(self.client.post(self.url("/docs/search")).json(&body))
            .await?;
        let parsed: SearchResponse = response.json().await.map_err(|e| e.to_string())?;
        Ok(parse_hits(&schema, parsed))
    }
}
