//! Notification capture.

use quill_core::{Notification, Notifier};
use std::sync::Mutex;

/// Records every notification it receives.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    received: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// All notifications so far, in delivery order.
    pub fn notifications(&self) -> Vec<Notification> {
        self.received.lock().unwrap().clone()
    }

    /// Number of notifications so far.
    pub fn count(&self) -> usize {
        self.received.lock().unwrap().len()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.received.lock().unwrap().push(notification);
    }
}
