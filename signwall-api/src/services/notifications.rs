//! Fire-and-forget delivery of signature notifications.

use signwall_core::{Notifier, ProviderUser, SignatureReceipt};
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::telemetry::metrics;

/// Runs every configured [`Notifier`] in a background task after a signature
/// commits. Failures are logged and counted, never returned.
#[derive(Clone, Default)]
pub struct NotificationDispatcher {
    notifiers: Arc<Vec<Arc<dyn Notifier>>>,
}

impl NotificationDispatcher {
    pub fn new(notifiers: Vec<Arc<dyn Notifier>>) -> Self {
        Self {
            notifiers: Arc::new(notifiers),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }

    pub fn sinks(&self) -> Vec<&'static str> {
        self.notifiers.iter().map(|n| n.name()).collect()
    }

    /// Spawn delivery to all sinks, in order. Returns the task handle, or
    /// `None` when no sinks are configured.
    pub fn dispatch(&self, user: ProviderUser, receipt: SignatureReceipt) -> Option<JoinHandle<()>> {
        if self.notifiers.is_empty() {
            return None;
        }
        let notifiers = Arc::clone(&self.notifiers);
        Some(tokio::spawn(async move {
            for notifier in notifiers.iter() {
                let result = notifier.signature_created(&user, &receipt).await;
                if let Some(metrics) = metrics() {
                    metrics.record_notification(notifier.name(), result.is_ok());
                }
                match result {
                    Ok(()) => tracing::debug!(
                        sink = notifier.name(),
                        user_id = %user.id,
                        "Notification delivered"
                    ),
                    Err(e) => tracing::warn!(
                        sink = notifier.name(),
                        user_id = %user.id,
                        error = %e,
                        "Notification failed"
                    ),
                }
            }
        }))
    }
}
