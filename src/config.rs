//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `RAGENT__*` 覆盖（双下划线表示嵌套，如 `RAGENT__LLM__PROVIDER=azure`）。
//! 密钥未写入配置时回退到 AZURE_OPENAI_API_KEY / OPENAI_API_KEY / AZURE_SEARCH_API_KEY。

use std::path::PathBuf;

use serde::Deserialize;

use crate::core::RagError;
use crate::tools::FunctionChoicePolicy;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub search: SearchSection,
    pub agent: AgentSection,
    pub timeouts: TimeoutsSection,
}

/// [app] 段：Agent 显示名、附加指令、历史保留
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub agent_name: String,
    /// 附加在每次后端请求最前面的 system 指令（可选）
    pub instructions: Option<String>,
    /// 跨轮保留对话历史；默认 false，每轮结束清空
    pub retain_history: bool,
    /// 保留模式下的历史轮数上限
    pub max_history_turns: usize,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            agent_name: "Assistant".to_string(),
            instructions: None,
            retain_history: false,
            max_history_turns: 20,
        }
    }
}

/// [llm] 段：mock / openai / azure
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub provider: String,
    /// OpenAI 模型名（azure 下由 deployment 决定）
    pub model: String,
    /// OpenAI 兼容端点，默认 https://api.openai.com/v1
    pub base_url: Option<String>,
    /// Azure OpenAI 资源端点
    pub endpoint: Option<String>,
    pub deployment: Option<String>,
    pub api_version: Option<String>,
    pub api_key: Option<String>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "mock".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            endpoint: None,
            deployment: None,
            api_version: None,
            api_key: None,
        }
    }
}

impl LlmSection {
    /// 配置中的 key，缺省时按 provider 读环境变量
    pub fn resolved_api_key(&self) -> Option<String> {
        non_empty(self.api_key.clone()).or_else(|| {
            let var = match self.provider.to_lowercase().as_str() {
                "azure" => "AZURE_OPENAI_API_KEY",
                _ => "OPENAI_API_KEY",
            };
            non_empty(std::env::var(var).ok())
        })
    }
}

/// [search] 段：文档索引
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    /// memory（进程内关键词索引）/ azure（Azure AI Search）
    pub provider: String,
    pub endpoint: Option<String>,
    pub index_name: String,
    pub api_version: Option<String>,
    pub api_key: Option<String>,
    pub top_k: usize,
    /// 检索失败时的重试次数，默认不重试
    pub max_retries: u32,
    /// 启动时从该目录导入 .txt / .md 文档
    pub seed_dir: Option<PathBuf>,
    /// 启动时导入内置示例文档
    pub seed_samples: bool,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            provider: "memory".to_string(),
            endpoint: None,
            index_name: "documents".to_string(),
            api_version: None,
            api_key: None,
            top_k: 3,
            max_retries: 0,
            seed_dir: None,
            seed_samples: true,
        }
    }
}

impl SearchSection {
    pub fn resolved_api_key(&self) -> Option<String> {
        non_empty(self.api_key.clone())
            .or_else(|| non_empty(std::env::var("AZURE_SEARCH_API_KEY").ok()))
    }
}

/// [agent] 段：函数调用策略与工具循环
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    pub function_choice: FunctionChoicePolicy,
    pub max_tool_rounds: usize,
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            function_choice: FunctionChoicePolicy::Auto,
            max_tool_rounds: 4,
            tool_timeout_secs: 30,
        }
    }
}

/// [timeouts] 段（秒）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeoutsSection {
    /// Azure AI Search 单次 HTTP 请求
    pub request_secs: u64,
    pub retrieval_secs: u64,
    /// 等待下一个流片段的最长时间
    pub stream_idle_secs: u64,
}

impl Default for TimeoutsSection {
    fn default() -> Self {
        Self {
            request_secs: 60,
            retrieval_secs: 30,
            stream_idle_secs: 120,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn require(value: &Option<String>, what: &str) -> Result<(), RagError> {
    if non_empty(value.clone()).is_none() {
        return Err(RagError::Configuration(format!("{what} is required")));
    }
    Ok(())
}

impl AppConfig {
    /// 启动时校验：远程后端缺少端点 / 凭据 / 模型时返回 Configuration 错误
    pub fn validate(&self) -> Result<(), RagError> {
        match self.llm.provider.to_lowercase().as_str() {
            "mock" => {}
            "openai" => {
                if self.llm.model.trim().is_empty() {
                    return Err(RagError::Configuration("llm.model is required".into()));
                }
                if self.llm.resolved_api_key().is_none() {
                    return Err(RagError::Configuration(
                        "llm.api_key or OPENAI_API_KEY is required for provider openai".into(),
                    ));
                }
            }
            "azure" => {
                require(&self.llm.endpoint, "llm.endpoint")?;
                require(&self.llm.deployment, "llm.deployment")?;
                if self.llm.resolved_api_key().is_none() {
                    return Err(RagError::Configuration(
                        "llm.api_key or AZURE_OPENAI_API_KEY is required for provider azure".into(),
                    ));
                }
            }
            other => {
                return Err(RagError::Configuration(format!(
                    "unknown llm.provider '{other}' (expected mock, openai or azure)"
                )))
            }
        }

        match self.search.provider.to_lowercase().as_str() {
            "memory" => {}
            "azure" => {
                require(&self.search.endpoint, "search.endpoint")?;
                if self.search.index_name.trim().is_empty() {
                    return Err(RagError::Configuration("search.index_name is required".into()));
                }
                if self.search.resolved_api_key().is_none() {
                    return Err(RagError::Configuration(
                        "search.api_key or AZURE_SEARCH_API_KEY is required for provider azure"
                            .into(),
                    ));
                }
            }
            other => {
                return Err(RagError::Configuration(format!(
                    "unknown search.provider '{other}' (expected memory or azure)"
                )))
            }
        }

        if self.search.top_k == 0 {
            return Err(RagError::Configuration("search.top_k must be at least 1".into()));
        }
        if self.agent.tool_timeout_secs == 0
            || self.timeouts.retrieval_secs == 0
            || self.timeouts.stream_idle_secs == 0
        {
            return Err(RagError::Configuration("timeouts must be greater than zero".into()));
        }
        Ok(())
    }
}

/// 从 config 目录加载配置，环境变量 RAGENT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path，则追加该文件（可覆盖前面的键；文件不存在时报错）
/// 3. 最后叠加环境变量 RAGENT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(path) = config_path {
        builder = builder.add_source(config::File::from(path).required(true));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("RAGENT")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}
