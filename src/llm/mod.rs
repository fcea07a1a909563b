//! LLM 层：流式 Chat 后端抽象与实现（OpenAI 兼容 / Azure OpenAI / Mock）

pub(crate) mod convert;
pub mod mock;
pub mod openai;
pub mod traits;

pub use mock::{EchoChatBackend, ScriptedChatBackend, ScriptedRound};
pub use openai::OpenAiChatBackend;
pub use traits::{BackendEvent, BackendStream, ChatBackend, ChatRequest};
