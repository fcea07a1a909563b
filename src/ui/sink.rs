//! ResponseSink：编排器把过滤后的文本片段按到达顺序推给 sink
//!
//! 每轮调用顺序为 begin(author) → text(chunk)* → end()；begin 只在第一段文本之前调用一次，
//! 没有任何文本时 begin / end 都不调用；调用过 begin 的轮次即使失败也会调用 end。

use std::io::Write;

pub trait ResponseSink: Send {
    /// 第一段文本之前调用一次
    fn begin(&mut self, author: &str);
    fn text(&mut self, chunk: &str);
    fn end(&mut self);
}

/// 终端输出：`# {author}: ` 后接逐段文本，每段 flush
#[derive(Debug, Default)]
pub struct StdoutSink {
    started: bool,
}

impl StdoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn write(&self, s: &str) {
        let mut out = std::io::stdout().lock();
        if let Err(e) = out.write_all(s.as_bytes()).and_then(|_| out.flush()) {
            tracing::warn!(error = %e, "failed to write response to stdout");
        }
    }
}

impl ResponseSink for StdoutSink {
    fn begin(&mut self, author: &str) {
        self.started = true;
        self.write(&format!("# {author}: "));
    }

    fn text(&mut self, chunk: &str) {
        self.write(chunk);
    }

    fn end(&mut self) {
        if std::mem::take(&mut self.started) {
            self.write("\n");
        }
    }
}

/// 收集到内存，供测试或嵌入方读取
#[derive(Debug, Default, Clone)]
pub struct BufferSink {
    pub author: Option<String>,
    pub chunks: Vec<String>,
    pub begins: usize,
    pub ends: usize,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 所有片段拼接后的文本
    pub fn collected(&self) -> String {
        self.chunks.concat()
    }
}

impl ResponseSink for BufferSink {
    fn begin(&mut self, author: &str) {
        self.begins += 1;
        self.author = Some(author.to_string());
    }

    fn text(&mut self, chunk: &str) {
        self.chunks.push(chunk.to_string());
    }

    fn end(&mut self) {
        self.ends += 1;
    }
}
