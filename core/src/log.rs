//! Optional caller-supplied log sink.
//!
//! Every message is emitted as a `tracing` event; a sink, when installed,
//! additionally receives the rendered text.

use std::fmt;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct LogSink {
    sink: Option<Arc<dyn Fn(&str) + Send + Sync>>,
}

impl LogSink {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        Self { sink: Some(Arc::new(f)) }
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    pub fn debug(&self, message: &str) {
        tracing::debug!(target: "etsy", "{message}");
        self.forward(message);
    }

    pub fn info(&self, message: &str) {
        tracing::info!(target: "etsy", "{message}");
        self.forward(message);
    }

    pub fn warn(&self, message: &str) {
        tracing::warn!(target: "etsy", "{message}");
        self.forward(message);
    }

    fn forward(&self, message: &str) {
        if let Some(sink) = &self.sink {
            sink(message);
        }
    }
}

impl fmt::Debug for LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogSink").field("enabled", &self.is_enabled()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn sink_receives_messages() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&seen);
        let log = LogSink::new(move |m| captured.lock().unwrap().push(m.to_string()));
        log.info("one");
        log.warn("two");
        assert_eq!(*seen.lock().unwrap(), vec!["one", "two"]);
    }

    #[test]
    fn default_sink_is_silent() {
        let log = LogSink::default();
        assert!(!log.is_enabled());
        log.debug("ignored");
    }
}
