/// Progress and warning messages for whoever drives a session
///
/// Operations take a `&dyn StatusSink` instead of logging through a global.
/// Every published event is mirrored to `tracing` as well.

use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Warning,
}

/// A single status line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEvent {
    pub level: StatusLevel,
    pub message: String,
}

/// Receiver for status events (UI label, popup, test log, ...)
pub trait StatusSink: Send + Sync {
    fn publish(&self, event: &StatusEvent);
}

/// Sink that only forwards to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl StatusSink for TracingSink {
    fn publish(&self, _event: &StatusEvent) {}
}

/// Sink that keeps every event in memory
#[derive(Debug, Default)]
pub struct StatusLog {
    events: Mutex<Vec<StatusEvent>>,
}

impl StatusLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything published so far
    pub fn events(&self) -> Vec<StatusEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn warnings(&self) -> Vec<StatusEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.level == StatusLevel::Warning)
            .collect()
    }
}

impl StatusSink for StatusLog {
    fn publish(&self, event: &StatusEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
    }
}

/// Publish an info line
pub fn info(sink: &dyn StatusSink, message: impl Into<String>) {
    let message = message.into();
    tracing::info!("{}", message);
    sink.publish(&StatusEvent {
        level: StatusLevel::Info,
        message,
    });
}

/// Publish a warning line
pub fn warn(sink: &dyn StatusSink, message: impl Into<String>) {
    let message = message.into();
    tracing::warn!("{}", message);
    sink.publish(&StatusEvent {
        level: StatusLevel::Warning,
        message,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_collects_in_order() {
        let log = StatusLog::new();
        info(&log, "first");
        warn(&log, "second");
        info(&log, "third");

        let events = log.events();
        assert_eq!(events.len(), 3);
        assert_eq!(events[1].message, "second");
        assert_eq!(log.warnings().len(), 1);
    }
}
