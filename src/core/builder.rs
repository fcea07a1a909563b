//! 组件构建器：由 AppConfig 组装索引、检索器、Chat 后端、Agent 与编排器
//!
//! 所有入口（REPL、集成测试、嵌入方）走同一套构建逻辑；测试可通过 with_backend / with_index
//! 注入替身，其余部分仍按配置构建。

use std::sync::Arc;
use std::time::Duration;

use crate::agent::ChatAgent;
use crate::config::AppConfig;
use crate::core::{RagError, TurnOrchestrator};
use crate::index::{
    load_documents_from_dir, sample_documents, seed_index, AzureSearchIndex, Document,
    DocumentIndex, IndexSchema, InMemoryIndex,
};
use crate::llm::{ChatBackend, EchoChatBackend, OpenAiChatBackend};
use crate::rag::Retriever;
use crate::tools::{AugmentPromptTool, ToolExecutor, ToolRegistry};

/// Echo 后端逐词输出的停顿
const ECHO_WORD_DELAY: Duration = Duration::from_millis(15);

pub struct AgentBuilder {
    config: AppConfig,
    backend: Option<Arc<dyn ChatBackend>>,
    index: Option<Arc<dyn DocumentIndex>>,
}

impl AgentBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            backend: None,
            index: None,
        }
    }

    /// 替换按配置构建的 Chat 后端
    pub fn with_backend(mut self, backend: Arc<dyn ChatBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// 替换按配置构建的文档索引
    pub fn with_index(mut self, index: Arc<dyn DocumentIndex>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 固定的工具表：只有 augment_prompt
    pub fn build_tool_registry(&self) -> ToolRegistry {
        let mut tools = ToolRegistry::new();
        tools.register(AugmentPromptTool);
        tracing::debug!(tools = ?tools.tool_names(), "tool registry built");
        tools
    }

    pub fn build_index(&self) -> Result<Arc<dyn DocumentIndex>, RagError> {
        if let Some(index) = &self.index {
            return Ok(index.clone());
        }
        let search = &self.config.search;
        match search.provider.to_lowercase().as_str() {
            "memory" => Ok(Arc::new(InMemoryIndex::new())),
            "azure" => {
                let endpoint = search
                    .endpoint
                    .as_deref()
                    .ok_or_else(|| RagError::Configuration("search.endpoint is required".into()))?;
                let api_key = search.resolved_api_key().ok_or_else(|| {
                    RagError::Configuration("search.api_key is required".into())
                })?;
                let index = AzureSearchIndex::new(
                    endpoint,
                    &api_key,
                    &search.index_name,
                    search.api_version.as_deref(),
                    self.config.timeouts.request_secs,
                )
                .map_err(RagError::Configuration)?;
                tracing::info!(endpoint, index = %search.index_name, "using Azure AI Search");
                Ok(Arc::new(index))
            }
            other => Err(RagError::Configuration(format!(
                "unknown search.provider '{other}'"
            ))),
        }
    }

    /// 播种用文档：内置示例（可选）+ seed_dir 下的文件
    pub fn seed_documents(&self) -> Result<Vec<Document>, RagError> {
        let mut documents = Vec::new();
        if self.config.search.seed_samples {
            documents.extend(sample_documents());
        }
        if let Some(dir) = &self.config.search.seed_dir {
            let loaded = load_documents_from_dir(dir)?;
            tracing::info!(dir = %dir.display(), documents = loaded.len(), "loaded seed documents");
            documents.extend(loaded);
        }
        Ok(documents)
    }

    /// 建索引并上传播种文档；进程内索引即使没有文档也要建，否则检索会失败
    pub async fn prepare_index(&self, index: &dyn DocumentIndex) -> Result<usize, RagError> {
        let documents = self.seed_documents()?;
        let is_memory = self.index.is_none()
            && self.config.search.provider.eq_ignore_ascii_case("memory");
        if documents.is_empty() && !is_memory {
            return Ok(0);
        }
        seed_index(index, &IndexSchema::default(), &documents).await
    }

    pub fn build_backend(&self) -> Result<Arc<dyn ChatBackend>, RagError> {
        if let Some(backend) = &self.backend {
            return Ok(backend.clone());
        }
        let llm = &self.config.llm;
        let backend: Arc<dyn ChatBackend> = match llm.provider.to_lowercase().as_str() {
            "mock" => {
                tracing::warn!("llm.provider is mock, answers come from the offline echo backend");
                Arc::new(EchoChatBackend::new().with_delay(ECHO_WORD_DELAY))
            }
            "openai" => {
                let key = llm.resolved_api_key().ok_or_else(|| {
                    RagError::Configuration("llm.api_key is required".into())
                })?;
                Arc::new(OpenAiChatBackend::openai(
                    llm.base_url.as_deref(),
                    &llm.model,
                    &key,
                ))
            }
            "azure" => {
                let endpoint = llm
                    .endpoint
                    .as_deref()
                    .ok_or_else(|| RagError::Configuration("llm.endpoint is required".into()))?;
                let deployment = llm
                    .deployment
                    .as_deref()
                    .ok_or_else(|| RagError::Configuration("llm.deployment is required".into()))?;
                let key = llm.resolved_api_key().ok_or_else(|| {
                    RagError::Configuration("llm.api_key is required".into())
                })?;
                Arc::new(OpenAiChatBackend::azure(
                    endpoint,
                    deployment,
                    llm.api_version.as_deref(),
                    &key,
                ))
            }
            other => {
                return Err(RagError::Configuration(format!(
                    "unknown llm.provider '{other}'"
                )))
            }
        };
        tracing::info!(backend = %backend.describe(), "chat backend ready");
        Ok(backend)
    }

    pub fn build_agent(&self, backend: Arc<dyn ChatBackend>) -> ChatAgent {
        let executor = Arc::new(ToolExecutor::new(
            self.build_tool_registry(),
            self.config.agent.tool_timeout_secs,
        ));
        let mut agent = ChatAgent::new(self.config.app.agent_name.clone(), backend, executor)
            .with_policy(self.config.agent.function_choice)
            .with_max_tool_rounds(self.config.agent.max_tool_rounds);
        if let Some(instructions) = &self.config.app.instructions {
            agent = agent.with_instructions(instructions.clone());
        }
        agent
    }

    /// 校验配置并构建完整编排器（包含索引播种）
    pub async fn build(self) -> Result<TurnOrchestrator, RagError> {
        if self.backend.is_none() || self.index.is_none() {
            self.config.validate()?;
        }
        let index = self.build_index()?;
        self.prepare_index(index.as_ref()).await?;

        let retriever = Retriever::new(index, self.config.search.top_k)
            .with_max_retries(self.config.search.max_retries);
        let agent = self.build_agent(self.build_backend()?);

        let timeouts = &self.config.timeouts;
        let mut orchestrator = TurnOrchestrator::new(retriever, agent)
            .with_timeouts(timeouts.retrieval_secs, timeouts.stream_idle_secs);
        if self.config.app.retain_history {
            orchestrator = orchestrator.with_retained_history(self.config.app.max_history_turns);
        }
        tracing::info!(
            agent = %self.config.app.agent_name,
            function_choice = %self.config.agent.function_choice,
            retain_history = self.config.app.retain_history,
            "orchestrator ready"
        );
        Ok(orchestrator)
    }
}
