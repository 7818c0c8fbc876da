//! Log-only notifier, used when no mail relay is configured.

use async_trait::async_trait;
use tracing::info;

use crate::model::ChangeEvent;
use crate::traits::Notifier;

/// Writes each change event to the log and always succeeds
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &ChangeEvent) -> Result<(), crate::Error> {
        info!(
            hostname = %event.hostname,
            port = event.port,
            entity = %event.entity_name,
            old_ip = %event.old_ips_joined(),
            new_ip = %event.new_ip,
            detected_at = %event.detected_at.to_rfc3339(),
            "IP address change"
        );
        Ok(())
    }

    fn notifier_name(&self) -> &'static str {
        "log"
    }
}
