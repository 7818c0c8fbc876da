// # Notifier Trait
//
// Defines the interface for telling operators about a detected change.
//
// ## Implementations
//
// - SMTP: `digger-notify` crate
// - Log only: [`crate::notify::LogNotifier`]

use async_trait::async_trait;

use crate::model::ChangeEvent;

/// Trait for notification gateways
///
/// Delivery is best effort from the core's point of view: an `Err` is
/// logged and counted, never retried and never allowed to undo the
/// persisted change. Implementations that want retries own them
/// internally.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a change notification
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Delivery acknowledged
    /// - `Err(Error)`: Delivery failed
    async fn notify(&self, event: &ChangeEvent) -> Result<(), crate::Error>;

    /// Name used in logs
    fn notifier_name(&self) -> &'static str;
}
