//! 记忆层：对话历史与检索用分词

pub mod conversation;
pub mod tokenizer;

pub use conversation::{ConversationHistory, Message, Role, ToolCallRequest};
