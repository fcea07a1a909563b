//! RAG：检索适配器与增强提示构建

pub mod augment;
pub mod retriever;

pub use augment::augment;
pub use retriever::{format_context, Retriever, NO_CONTEXT};
