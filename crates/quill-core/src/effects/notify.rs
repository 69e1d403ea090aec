//! Side-channel failure notifications.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Toast severity level
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastLevel {
    /// Informational
    #[default]
    Info,
    /// Operation completed
    Success,
    /// Something degraded but recoverable
    Warning,
    /// Operation failed
    Error,
}

impl ToastLevel {
    /// Get a lowercase label for logging/serialization
    #[must_use]
    pub fn label_lowercase(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// A user-facing notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Short headline
    pub title: String,
    /// Longer explanation
    pub description: String,
    /// Severity used for presentation
    pub severity: ToastLevel,
}

impl Notification {
    /// Create a notification.
    pub fn new(title: impl Into<String>, description: impl Into<String>, severity: ToastLevel) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            severity,
        }
    }
}

/// Receives notifications. Presentation is the implementor's concern.
pub trait Notifier: Send + Sync {
    /// Deliver a notification. Must not block.
    fn notify(&self, notification: Notification);
}

impl<T: Notifier + ?Sized> Notifier for Arc<T> {
    fn notify(&self, notification: Notification) {
        (**self).notify(notification);
    }
}

/// Notifier that only logs. Used when the host supplies none.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: Notification) {
        tracing::warn!(
            severity = notification.severity.label_lowercase(),
            title = %notification.title,
            description = %notification.description,
            "Notification"
        );
    }
}
