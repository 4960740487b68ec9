use chrono::Local;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Operator-visible message sink
///
/// Messages are stamped `@<local time>:<message>` and pushed to an unbounded
/// channel the binary drains. Error messages reach the sink only in verbose
/// mode; progress messages always do. Everything is also emitted through
/// `tracing`.
#[derive(Debug, Clone, Default)]
pub struct OperatorLog {
    verbose: bool,
    sink: Option<UnboundedSender<String>>,
}

impl OperatorLog {
    /// Creates a log and the receiving end of its sink
    pub fn channel(verbose: bool) -> (Self, UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                verbose,
                sink: Some(tx),
            },
            rx,
        )
    }

    /// A log that only emits through `tracing`
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Reports a provider or persistence error
    pub fn error(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::warn!("{}", message);
        if self.verbose {
            self.push(message);
        }
    }

    /// Reports crawl progress
    pub fn progress(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::info!("{}", message);
        self.push(message);
    }

    fn push(&self, message: &str) {
        if let Some(sink) = &self.sink {
            let stamped = format!("@{}:{}", Local::now().format("%Y/%m/%d %H:%M:%S"), message);
            // A dropped receiver just means nobody is watching
            let _ = sink.send(stamped);
        }
    }
}
