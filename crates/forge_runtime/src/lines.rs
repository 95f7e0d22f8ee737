//! Reassembles raw output chunks into whole lines.

use std::collections::VecDeque;

use futures::stream::{self, BoxStream, Stream, StreamExt};

use crate::error::RuntimeResult;
use crate::runner::{LogLine, LogSource};

/// Per-source partial line buffers.
#[derive(Debug, Default)]
pub struct LineBuffer {
    stdout: String,
    stderr: String,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completed.
    pub fn push(&mut self, source: LogSource, chunk: &[u8]) -> Vec<LogLine> {
        let buffer = match source {
            LogSource::Stdout => &mut self.stdout,
            LogSource::Stderr => &mut self.stderr,
        };
        buffer.push_str(&String::from_utf8_lossy(chunk));

        let mut lines = Vec::new();
        while let Some(pos) = buffer.find('\n') {
            let line: String = buffer.drain(..=pos).collect();
            let line = line.trim_end_matches(['\n', '\r']);
            if !line.trim().is_empty() {
                lines.push(LogLine::new(source, line));
            }
        }
        lines
    }

    /// Flush whatever is left once the source has ended.
    pub fn finish(&mut self) -> Vec<LogLine> {
        let mut lines = Vec::new();
        for (source, buffer) in [
            (LogSource::Stdout, &mut self.stdout),
            (LogSource::Stderr, &mut self.stderr),
        ] {
            let rest = std::mem::take(buffer);
            if !rest.trim().is_empty() {
                lines.push(LogLine::new(source, rest.trim_end()));
            }
        }
        lines
    }
}

struct SplitState<S> {
    inner: S,
    buffer: LineBuffer,
    ready: VecDeque<LogLine>,
    done: bool,
}

/// Turn a stream of raw chunks into a stream of lines.
///
/// An error item is forwarded and ends the stream.
pub fn split_lines<S>(chunks: S) -> BoxStream<'static, RuntimeResult<LogLine>>
where
    S: Stream<Item = RuntimeResult<(LogSource, Vec<u8>)>> + Send + Unpin + 'static,
{
    let state = SplitState {
        inner: chunks,
        buffer: LineBuffer::new(),
        ready: VecDeque::new(),
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(line) = state.ready.pop_front() {
                return Some((Ok(line), state));
            }
            if state.done {
                return None;
            }
            match state.inner.next().await {
                Some(Ok((source, chunk))) => {
                    state.ready.extend(state.buffer.push(source, &chunk));
                }
                Some(Err(e)) => {
                    state.done = true;
                    return Some((Err(e), state));
                }
                None => {
                    state.done = true;
                    state.ready.extend(state.buffer.finish());
                }
            }
        }
    })
    .boxed()
}
