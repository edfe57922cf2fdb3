//! Incremental decoding of line-delimited response bodies.
//!
//! Chat backends stream their output as one JSON document per line (NDJSON for the
//! local daemon, `data: {...}` server-sent events for hosted APIs). [`LineDecoder`]
//! turns the raw byte chunks of such a body into the text fragments it carries.
//! Chunks may split a line anywhere, so partial lines are buffered until their newline
//! arrives.

use futures::Stream;
use log::debug;
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{ Context, Poll };

use crate::error::{ GatewayError, Result };

pub type ChatStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// What one well-formed line contributed to the stream.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DecodedLine {
    pub fragment: Option<String>,
    /// The provider signalled the end of the response.
    pub done: bool,
}

/// Parses a single line. `None` marks the line as malformed.
pub type LineParser = fn(&str) -> Option<DecodedLine>;

pub struct LineDecoder<S> {
    body: Option<Pin<Box<S>>>,
    buffer: Vec<u8>,
    ready: VecDeque<String>,
    parse: LineParser,
}

impl<S> LineDecoder<S> {
    pub fn new(body: S, parse: LineParser) -> Self {
        Self {
            body: Some(Box::pin(body)),
            buffer: Vec::new(),
            ready: VecDeque::new(),
            parse,
        }
    }

    /// Drops the underlying body, releasing its connection. Later polls yield `None`.
    pub fn close(&mut self) {
        self.body = None;
        self.buffer.clear();
        self.ready.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.body.is_none() && self.ready.is_empty()
    }

    fn feed(&mut self, bytes: &[u8]) {
        let mut buffer = std::mem::take(&mut self.buffer);
        // the carried-over tail holds no newline, so scanning starts at the new bytes
        let mut cursor = buffer.len();
        buffer.extend_from_slice(bytes);

        let mut line_start = 0;
        while let Some(offset) = buffer[cursor..].iter().position(|b| *b == b'\n') {
            let line_end = cursor + offset + 1;
            let done = self.decode_line(&buffer[line_start..line_end]);
            line_start = line_end;
            cursor = line_end;
            if done {
                self.body = None;
                return;
            }
        }

        buffer.drain(..line_start);
        self.buffer = buffer;
    }

    fn finish(&mut self) {
        let rest = std::mem::take(&mut self.buffer);
        self.decode_line(&rest);
        self.body = None;
    }

    /// Returns true once the provider has signalled completion.
    fn decode_line(&mut self, raw: &[u8]) -> bool {
        let Ok(text) = std::str::from_utf8(raw) else {
            debug!("{}", GatewayError::MalformedStreamLine("invalid utf-8".to_string()));
            return false;
        };
        let line = text.trim();
        if line.is_empty() {
            return false;
        }

        match (self.parse)(line) {
            Some(decoded) => {
                if let Some(fragment) = decoded.fragment.filter(|f| !f.is_empty()) {
                    self.ready.push_back(fragment);
                }
                decoded.done
            }
            None => {
                debug!("Skipping {}", GatewayError::MalformedStreamLine(line.to_string()));
                false
            }
        }
    }
}

impl<S, B, E> Stream for LineDecoder<S>
    where S: Stream<Item = std::result::Result<B, E>>, B: AsRef<[u8]>, E: Into<GatewayError>
{
    type Item = Result<String>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(fragment) = this.ready.pop_front() {
                return Poll::Ready(Some(Ok(fragment)));
            }

            let Some(body) = this.body.as_mut() else {
                return Poll::Ready(None);
            };

            match body.as_mut().poll_next(cx) {
                Poll::Pending => {
                    return Poll::Pending;
                }
                Poll::Ready(Some(Ok(chunk))) => this.feed(chunk.as_ref()),
                Poll::Ready(Some(Err(e))) => {
                    this.close();
                    return Poll::Ready(Some(Err(e.into())));
                }
                Poll::Ready(None) => this.finish(),
            }
        }
    }
}
