//! Notification delivery hook.
//!
//! The scanner only decides *when* a todo is due; delivery is delegated to a
//! [`Notifier`]. [`LogNotifier`] is the stand-in used by the binary: it writes
//! the push message to the log and always succeeds.

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

/// Errors a [`Notifier`] may report for a single delivery.
///
/// Any error leaves the todo unnotified, so the next scan retries it.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification for {id} rejected: {reason}")]
    Rejected { id: String, reason: String },

    #[error("notification channel unavailable: {0}")]
    Unavailable(String),
}

/// Delivers a due-date notification for one todo.
///
/// Implementations must be cheap to share across tasks; the scanner holds
/// them behind an `Arc<dyn Notifier>`.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver the notification for the todo `id` titled `title`.
    async fn notify(&self, id: &str, title: &str) -> Result<(), NotifyError>;
}

/// Notifier that logs a simulated push message.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, id: &str, title: &str) -> Result<(), NotifyError> {
        info!(id, title, "due date arrived; push notification sent to the item's creator");
        Ok(())
    }
}
