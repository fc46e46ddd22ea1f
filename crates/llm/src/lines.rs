//! Line framing for streamed HTTP bodies.
//!
//! Providers stream newline-delimited payloads (NDJSON for Ollama, SSE
//! `data:` lines for Gemini), but network chunks do not respect line
//! boundaries. [`LineBuffer`] carries partial lines across chunks.

use futures::{Stream, StreamExt};
use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;
use tadabbur_core::{AppError, AppResult};

/// Stream of complete text lines.
pub type LineStream = Pin<Box<dyn Stream<Item = AppResult<String>> + Send>>;

/// Accumulates bytes and yields complete lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    /// Append a chunk and drain every complete line it closes.
    ///
    /// Trailing `\r` is stripped so CRLF bodies behave like LF ones.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line[..pos]);
            lines.push(text.trim_end_matches('\r').to_string());
        }
        lines
    }

    /// Flush whatever is left once the body ends.
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buf);
        let text = String::from_utf8_lossy(&rest).trim_end_matches('\r').to_string();
        Some(text)
    }
}

/// Re-frame a byte stream into lines.
///
/// The first transport error ends the stream after being yielded.
pub fn lines<S, B, E>(bytes: S) -> LineStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = (Box::pin(bytes), LineBuffer::default(), VecDeque::new(), false);

    Box::pin(futures::stream::unfold(
        state,
        |(mut inner, mut buffer, mut pending, mut finished)| async move {
            loop {
                if let Some(line) = pending.pop_front() {
                    return Some((Ok(line), (inner, buffer, pending, finished)));
                }
                if finished {
                    return None;
                }
                match inner.next().await {
                    Some(Ok(chunk)) => pending.extend(buffer.push(chunk.as_ref())),
                    Some(Err(e)) => {
                        finished = true;
                        let err = AppError::Llm(format!("Stream error: {}", e));
                        return Some((Err(err), (inner, buffer, pending, finished)));
                    }
                    None => {
                        finished = true;
                        pending.extend(buffer.finish());
                    }
                }
            }
        },
    ))
}
