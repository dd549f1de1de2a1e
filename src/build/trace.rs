//! Trace extraction from the run process's error stream.
//!
//! The runtime prints script traces to stderr as lines of the form
//! `Trace: "message"`. [`TraceDecoder`] turns a raw byte stream into
//! [`TraceEvent`]s without touching any process, and [`pump_traces`] drives
//! a decoder from an async reader.

use crate::build::log::{LogEvent, LogSink};
use tokio::io::{AsyncRead, AsyncReadExt};

/// One message extracted from a trace line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEvent {
    /// Text between the first two quote characters of the line
    pub text: String,
}

impl std::fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.text)
    }
}

/// Incremental line decoder for trace output.
///
/// Bytes are buffered until a newline. A completed line containing at least
/// two `"` characters yields the text between the first and second quote.
/// Any remaining partial line is dropped by [`TraceDecoder::close`].
#[derive(Debug, Default)]
pub struct TraceDecoder {
    line: Vec<u8>,
}

impl TraceDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes, returning every event completed by it.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<TraceEvent> {
        let mut events = Vec::new();
        for &byte in bytes {
            if byte == b'\n' {
                if let Some(event) = extract(&self.line) {
                    events.push(event);
                }
                self.line.clear();
            } else {
                self.line.push(byte);
            }
        }
        events
    }

    /// Bytes of the line currently being accumulated.
    pub fn pending(&self) -> &[u8] {
        &self.line
    }

    /// Finish decoding. A partial line without a newline is discarded.
    pub fn close(self) -> Vec<TraceEvent> {
        Vec::new()
    }
}

fn extract(line: &[u8]) -> Option<TraceEvent> {
    let mut parts = line.split(|&b| b == b'"');
    parts.next()?;
    let text = parts.next()?;
    // A second quote must close the message.
    parts.next()?;
    Some(TraceEvent { text: String::from_utf8_lossy(text).into_owned() })
}

/// Read `reader` to the end, forwarding every trace to `sink`.
///
/// Read errors end the pump quietly; the process owning the stream reports
/// its own exit.
pub async fn pump_traces<R>(mut reader: R, sink: &dyn LogSink) -> usize
where
    R: AsyncRead + Unpin,
{
    let mut decoder = TraceDecoder::new();
    let mut buf = [0u8; 4096];
    let mut count = 0;

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                tracing::debug!(error = %e, "trace stream closed");
                break;
            }
        };
        for event in decoder.feed(&buf[..n]) {
            count += 1;
            sink.log(LogEvent::Trace(event));
        }
    }

    for event in decoder.close() {
        count += 1;
        sink.log(LogEvent::Trace(event));
    }
    count
}
