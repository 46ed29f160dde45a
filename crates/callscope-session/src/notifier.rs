//! User-visible notifications
//!
//! [`ExpiryNotifier`] makes sure a lost session produces exactly one
//! "session expired" toast per expiry epoch, however many components
//! observe the loss. A new sign-in opens a new epoch.

use callscope_core::{auth_message, AuthError, Language};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

/// Notification category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NoticeKind {
    SessionExpired,
    Error,
}

/// One toast
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

/// Toast sink
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Logs notices instead of showing them
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: Notice) {
        tracing::info!(kind = ?notice.kind, message = %notice.message, "notice");
    }
}

#[derive(Debug, Default)]
struct Epoch {
    id: u64,
    fired: bool,
}

/// Single-shot session-expired notification
pub struct ExpiryNotifier {
    sink: Arc<dyn Notifier>,
    epoch: Mutex<Epoch>,
}

impl std::fmt::Debug for ExpiryNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpiryNotifier")
            .field("epoch", &*self.epoch.lock())
            .finish_non_exhaustive()
    }
}

impl ExpiryNotifier {
    #[must_use]
    pub fn new(sink: Arc<dyn Notifier>) -> Self {
        Self {
            sink,
            epoch: Mutex::new(Epoch::default()),
        }
    }

    /// Start a new epoch (called on successful sign-in)
    pub fn open_epoch(&self) -> u64 {
        let mut epoch = self.epoch.lock();
        epoch.id += 1;
        epoch.fired = false;
        epoch.id
    }

    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch.lock().id
    }

    /// Show the expiry toast unless this epoch already did
    ///
    /// Returns whether the toast was shown.
    pub fn notify_expired(&self, lang: Language) -> bool {
        {
            let mut epoch = self.epoch.lock();
            if epoch.fired {
                tracing::debug!(epoch = epoch.id, "expiry already notified");
                return false;
            }
            epoch.fired = true;
        }
        self.sink.notify(Notice {
            kind: NoticeKind::SessionExpired,
            message: auth_message(&AuthError::SessionExpired, lang, None),
        });
        true
    }
}
