//! 输出层：流式回答的展示目标（终端 / 内存缓冲）

pub mod sink;

pub use sink::{BufferSink, ResponseSink, StdoutSink};
