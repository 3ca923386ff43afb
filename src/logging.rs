use std::sync::OnceLock;

use chrono::Local;
use log::{LevelFilter, Metadata, Record, SetLoggerError};
use serde::Serialize;
use tokio::sync::mpsc;

static LOGGER: OnceLock<ForwardingLogger> = OnceLock::new();

/// A log record as handed to observers
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct LogMessage {
    pub level: String,
    pub message: String,
    pub timestamp: String,
}

/// Writes records to stderr and optionally forwards them to an observer channel
pub struct ForwardingLogger {
    level: LevelFilter,
    forward: Option<mpsc::UnboundedSender<LogMessage>>,
}

impl ForwardingLogger {
    pub fn new(level: LevelFilter, forward: Option<mpsc::UnboundedSender<LogMessage>>) -> Self {
        Self { level, forward }
    }

    /// Installs the global logger. Fails if one is already installed.
    pub fn init(
        level: LevelFilter,
        forward: Option<mpsc::UnboundedSender<LogMessage>>,
    ) -> Result<(), SetLoggerError> {
        let logger = LOGGER.get_or_init(|| ForwardingLogger::new(level, forward));
        log::set_logger(logger).map(|()| log::set_max_level(level))
    }

    fn forward_record(&self, record: &Record) {
        let Some(forward) = &self.forward else {
            return;
        };
        let log_message = LogMessage {
            level: record.level().to_string(),
            message: record.args().to_string(),
            timestamp: Local::now().to_rfc3339(),
        };
        // a closed channel only means nobody is watching any more
        let _ = forward.send(log_message);
    }
}

impl log::Log for ForwardingLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{}] {}", record.level(), record.args());
            self.forward_record(record);
        }
    }

    fn flush(&self) {}
}

/// Installs the forwarding logger, falling back to env_logger when it cannot be installed.
pub fn init(level: LevelFilter, forward: Option<mpsc::UnboundedSender<LogMessage>>) {
    if ForwardingLogger::init(level, forward).is_err() {
        let _ = env_logger::builder().filter_level(level).try_init();
    }
    log::info!("Logging initialized");
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::{Level, Log};

    #[test]
    fn forwards_enabled_records_only() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let logger = ForwardingLogger::new(LevelFilter::Info, Some(tx));

        logger.log(&Record::builder().args(format_args!("link up")).level(Level::Warn).build());
        logger.log(&Record::builder().args(format_args!("noise")).level(Level::Debug).build());

        let message = rx.try_recv().unwrap();
        assert_eq!(message.level, "WARN");
        assert_eq!(message.message, "link up");
        assert!(chrono::DateTime::parse_from_rfc3339(&message.timestamp).is_ok());
        assert!(rx.try_recv().is_err());
    }
}
