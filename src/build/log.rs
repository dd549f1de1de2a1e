//! User-visible build log.
//!
//! Every message the build layer wants a user to see goes through a
//! [`LogSink`]. Hosts pick the sink: a console with colours, one JSON object
//! per line for tooling, or a recorder.
//!
//! # Example
//!
//! ```ignore
//! use playmake::build::log::{ConsoleLog, LogEvent, LogSink};
//!
//! let log = ConsoleLog::new();
//! log.log(LogEvent::info("Exporting scene"));
//! log.log(LogEvent::Finished { elapsed: std::time::Duration::from_millis(3210) });
//! ```

use crate::build::trace::TraceEvent;
use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

/// Events written to the build log.
#[derive(Debug, Clone, PartialEq)]
pub enum LogEvent {
    /// Clear the log (a new build begins)
    Clear,
    /// Informational message
    Info(String),
    /// Warning message
    Warning(String),
    /// Error message
    Error(String),
    /// Trace printed by the running application
    Trace(TraceEvent),
    /// A subprocess was started
    Running {
        /// Command line of the subprocess
        argv: Vec<String>,
    },
    /// A compile finished
    Finished {
        /// Wall-clock time since the compile started
        elapsed: Duration,
    },
}

impl LogEvent {
    /// Informational message.
    pub fn info(message: impl Into<String>) -> Self {
        LogEvent::Info(message.into())
    }

    /// Warning message.
    pub fn warning(message: impl Into<String>) -> Self {
        LogEvent::Warning(message.into())
    }

    /// Error message.
    pub fn error(message: impl Into<String>) -> Self {
        LogEvent::Error(message.into())
    }
}

/// Receiver of build log events.
pub trait LogSink: Send + Sync {
    /// Record one event.
    fn log(&self, event: LogEvent);

    /// Check if this sink wants verbose output.
    fn is_verbose(&self) -> bool {
        false
    }
}

/// A sink that discards all events.
#[derive(Debug, Default)]
pub struct NullLog;

impl NullLog {
    /// Create a new null sink.
    pub fn new() -> Self {
        Self
    }
}

impl LogSink for NullLog {
    fn log(&self, _event: LogEvent) {}
}

/// Console sink with optional colours.
pub struct ConsoleLog {
    use_colors: bool,
    verbose: bool,
    output: Mutex<Box<dyn Write + Send>>,
}

impl std::fmt::Debug for ConsoleLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleLog")
            .field("use_colors", &self.use_colors)
            .field("verbose", &self.verbose)
            .finish()
    }
}

impl ConsoleLog {
    /// Create a console sink writing to stderr.
    pub fn new() -> Self {
        Self {
            use_colors: atty::is(atty::Stream::Stderr),
            verbose: false,
            output: Mutex::new(Box::new(std::io::stderr())),
        }
    }

    /// Create a console sink that writes to a custom output.
    pub fn with_output<W: Write + Send + 'static>(output: W) -> Self {
        Self { use_colors: false, verbose: false, output: Mutex::new(Box::new(output)) }
    }

    /// Set whether to use colours.
    pub fn with_colors(mut self, use_colors: bool) -> Self {
        self.use_colors = use_colors;
        self
    }

    /// Set verbose mode.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn color(&self, text: &str, color: &str) -> String {
        if self.use_colors {
            format!("{}{}\x1b[0m", color, text)
        } else {
            text.to_string()
        }
    }

    fn writeln(&self, line: &str) {
        if let Ok(mut output) = self.output.lock() {
            let _ = writeln!(output, "{}", line);
        }
    }
}

impl Default for ConsoleLog {
    fn default() -> Self {
        Self::new()
    }
}

impl LogSink for ConsoleLog {
    fn log(&self, event: LogEvent) {
        match event {
            LogEvent::Clear => {
                if self.use_colors {
                    self.writeln("\x1b[2J\x1b[H");
                }
            }
            LogEvent::Info(message) => {
                self.writeln(&format!("{} {}", self.color("[info]", "\x1b[36m"), message));
            }
            LogEvent::Warning(message) => {
                self.writeln(&format!("{} {}", self.color("[warn]", "\x1b[33m"), message));
            }
            LogEvent::Error(message) => {
                self.writeln(&format!("{} {}", self.color("[error]", "\x1b[31m"), message));
            }
            LogEvent::Trace(trace) => {
                self.writeln(&format!("{} {}", self.color("[trace]", "\x1b[35m"), trace.text));
            }
            LogEvent::Running { argv } => {
                if self.verbose {
                    self.writeln(&format!("{} {}", self.color("[run]", "\x1b[36m"), argv.join(" ")));
                }
            }
            LogEvent::Finished { elapsed } => {
                self.writeln(&format!(
                    "{} Finished in {}",
                    self.color("[done]", "\x1b[32m"),
                    format_elapsed(elapsed)
                ));
            }
        }
    }

    fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// JSON sink for machine-readable output.
pub struct JsonLog {
    output: Mutex<Box<dyn Write + Send>>,
}

impl std::fmt::Debug for JsonLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonLog").finish()
    }
}

impl JsonLog {
    /// Create a JSON sink writing to stderr.
    pub fn new() -> Self {
        Self { output: Mutex::new(Box::new(std::io::stderr())) }
    }

    /// Create a JSON sink that writes to a custom output.
    pub fn with_output<W: Write + Send + 'static>(output: W) -> Self {
        Self { output: Mutex::new(Box::new(output)) }
    }
}

impl Default for JsonLog {
    fn default() -> Self {
        Self::new()
    }
}

impl LogSink for JsonLog {
    fn log(&self, event: LogEvent) {
        let value = match event {
            LogEvent::Clear => serde_json::json!({ "event": "clear" }),
            LogEvent::Info(message) => serde_json::json!({ "event": "info", "message": message }),
            LogEvent::Warning(message) => {
                serde_json::json!({ "event": "warning", "message": message })
            }
            LogEvent::Error(message) => serde_json::json!({ "event": "error", "message": message }),
            LogEvent::Trace(trace) => serde_json::json!({ "event": "trace", "message": trace.text }),
            LogEvent::Running { argv } => serde_json::json!({ "event": "running", "argv": argv }),
            LogEvent::Finished { elapsed } => serde_json::json!({
                "event": "finished",
                "elapsed_ms": elapsed.as_millis() as u64,
            }),
        };

        if let Ok(mut output) = self.output.lock() {
            let _ = writeln!(output, "{}", value);
        }
    }
}

/// Sink that keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingLog {
    events: Mutex<Vec<LogEvent>>,
}

impl RecordingLog {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded events, oldest first.
    pub fn events(&self) -> Vec<LogEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Text of every recorded trace.
    pub fn traces(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                LogEvent::Trace(t) => Some(t.text),
                _ => None,
            })
            .collect()
    }

    /// Every recorded error message.
    pub fn errors(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                LogEvent::Error(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    /// Whether any info, warning or error message contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.events().iter().any(|e| match e {
            LogEvent::Info(m) | LogEvent::Warning(m) | LogEvent::Error(m) => m.contains(needle),
            _ => false,
        })
    }

    /// Number of `Finished` events recorded.
    pub fn finished_count(&self) -> usize {
        self.events().iter().filter(|e| matches!(e, LogEvent::Finished { .. })).count()
    }
}

impl LogSink for RecordingLog {
    fn log(&self, event: LogEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

/// Format an elapsed time as seconds with two decimals (`3.21s`).
pub fn format_elapsed(elapsed: Duration) -> String {
    format!("{:.2}s", elapsed.as_secs_f64())
}
