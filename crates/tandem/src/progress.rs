//! Progress events and the sinks that receive them.
//!
//! Progress is advisory. Sinks must never block the producer: a full or
//! closed channel simply loses the event.

use tokio::sync::mpsc;

/// Label used for events emitted while comparing the two snapshots.
pub const COMPARE_LABEL: &str = "compare";

/// The kind of a [`ProgressEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Status,
    Progress,
    Error,
}

/// A progress event, tagged with the label of the database (or
/// [`COMPARE_LABEL`]) it concerns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// A phase started.
    Status { label: String, message: String },
    /// One table was reached. `current` is 1-based.
    Progress {
        label: String,
        current: usize,
        total: usize,
        table: String,
    },
    /// The producer failed; an error result follows.
    Error { label: String, message: String },
}

impl ProgressEvent {
    pub fn status(label: impl Into<String>, message: impl Into<String>) -> Self {
        ProgressEvent::Status {
            label: label.into(),
            message: message.into(),
        }
    }

    pub fn progress(
        label: impl Into<String>,
        current: usize,
        total: usize,
        table: impl Into<String>,
    ) -> Self {
        ProgressEvent::Progress {
            label: label.into(),
            current,
            total,
            table: table.into(),
        }
    }

    pub fn error(label: impl Into<String>, message: impl Into<String>) -> Self {
        ProgressEvent::Error {
            label: label.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            ProgressEvent::Status { .. } => EventKind::Status,
            ProgressEvent::Progress { .. } => EventKind::Progress,
            ProgressEvent::Error { .. } => EventKind::Error,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            ProgressEvent::Status { label, .. }
            | ProgressEvent::Progress { label, .. }
            | ProgressEvent::Error { label, .. } => label,
        }
    }

    /// The event text without its label.
    pub fn message(&self) -> String {
        match self {
            ProgressEvent::Status { message, .. } | ProgressEvent::Error { message, .. } => {
                message.clone()
            }
            ProgressEvent::Progress {
                current,
                total,
                table,
                ..
            } => format!("{current}/{total} ({table})"),
        }
    }
}

impl std::fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.label(), self.message())
    }
}

/// Receives progress events. `emit` must not block.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn emit(&self, _event: ProgressEvent) {}
}

impl ProgressSink for mpsc::Sender<ProgressEvent> {
    fn emit(&self, event: ProgressEvent) {
        // Full or closed: the event is dropped.
        let _ = self.try_send(event);
    }
}

impl ProgressSink for mpsc::UnboundedSender<ProgressEvent> {
    fn emit(&self, event: ProgressEvent) {
        let _ = self.send(event);
    }
}

impl<S: ProgressSink + ?Sized> ProgressSink for &S {
    fn emit(&self, event: ProgressEvent) {
        (**self).emit(event)
    }
}

impl<S: ProgressSink + ?Sized> ProgressSink for std::sync::Arc<S> {
    fn emit(&self, event: ProgressEvent) {
        (**self).emit(event)
    }
}
