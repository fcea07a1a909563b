//! 工具层：注册表、参数 schema、调用策略、执行器，以及 augment_prompt 工具

pub mod augment;
pub mod executor;
pub mod policy;
pub mod registry;
pub mod schema;

pub use augment::{AugmentArgs, AugmentPromptTool, AUGMENT_TOOL_NAME};
pub use executor::ToolExecutor;
pub use policy::FunctionChoicePolicy;
pub use registry::{Tool, ToolDefinition, ToolRegistry};
