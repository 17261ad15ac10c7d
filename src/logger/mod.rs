//! Logging capability injected into the server.
//!
//! The server reports its lifecycle (startup, shutdown) and every dispatched
//! request through a [`Logger`]. Connection-level diagnostics (accepts, parse
//! failures, oversized requests) are emitted directly on [`tracing`] at
//! debug/warn level and are not routed through this trait.

/// Destination for the server's request log.
///
/// Implementations must be `Send + Sync` because the accept loop shares the
/// logger across all connection tasks.
pub trait Logger: Send + Sync + 'static {
    /// Records one log line.
    fn log(&self, message: &str);
}

/// [`Logger`] that emits through `tracing::info!`.
///
/// The crate never installs a subscriber; consumers wire up their own
/// (e.g. `tracing_subscriber::fmt()`), so "console" here means whatever the
/// ambient subscriber does with info-level events.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleLogger;

impl Logger for ConsoleLogger {
    fn log(&self, message: &str) {
        tracing::info!(target: "tinyrest", "{message}");
    }
}

impl<L: Logger + ?Sized> Logger for std::sync::Arc<L> {
    fn log(&self, message: &str) {
        (**self).log(message);
    }
}

/// Captures log lines for assertions in unit tests.
#[cfg(test)]
pub(crate) struct RecordingLogger {
    lines: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
impl RecordingLogger {
    pub(crate) fn new() -> Self {
        Self {
            lines: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl Logger for RecordingLogger {
    fn log(&self, message: &str) {
        self.lines.lock().unwrap().push(message.to_owned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_logger_captures_lines() {
        let logger = RecordingLogger::new();
        logger.log("one");
        logger.log("two");
        assert_eq!(logger.lines(), vec!["one", "two"]);
    }
}
