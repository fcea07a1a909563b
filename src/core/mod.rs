//! 核心编排层：错误类型、轮次状态机、编排器与组件构建

pub mod builder;
pub mod error;
pub mod orchestrator;
pub mod state;

pub use builder::AgentBuilder;
pub use error::RagError;
pub use orchestrator::TurnOrchestrator;
pub use state::{TurnOutcome, TurnState};
