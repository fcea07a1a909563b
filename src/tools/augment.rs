//! augment_prompt 工具：把增强提示构建声明给 Agent，处理函数与编排器直接调用的是同一个 augment

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::rag::augment;
use crate::tools::{schema::parameters_schema_for, Tool};

pub const AUGMENT_TOOL_NAME: &str = "augment_prompt";

/// augment_prompt 参数
#[derive(Debug, Deserialize, JsonSchema)]
pub struct AugmentArgs {
    /// 用户原始问题
    pub query: String,
    /// 检索得到的上下文
    pub context: String,
}

pub struct AugmentPromptTool;

#[async_trait]
impl Tool for AugmentPromptTool {
    fn name(&self) -> &str {
        AUGMENT_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Combine a user query with retrieved context into a structured prompt that restricts the answer to that context."
    }

    fn parameters_schema(&self) -> Value {
        parameters_schema_for::<AugmentArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: AugmentArgs =
            serde_json::from_value(args).map_err(|e| format!("invalid arguments: {e}"))?;
        Ok(augment(&args.query, &args.context))
    }
}
