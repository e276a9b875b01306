//! Log-only realtime notifier.
//!
//! The realtime hub that pushes to connected clients runs outside this
//! process. This implementation stands in for it by logging every
//! notification.

use async_trait::async_trait;

use crate::infrastructure::ports::{NotifyError, NotifyTarget, RealtimeNotifier};

#[derive(Debug, Default)]
pub struct TracingNotifier;

#[async_trait]
impl RealtimeNotifier for TracingNotifier {
    async fn notify(
        &self,
        target: NotifyTarget,
        event_name: &str,
        payload: serde_json::Value,
    ) -> Result<(), NotifyError> {
        match target {
            NotifyTarget::Session(session) => {
                tracing::info!(session = %session, event = event_name, %payload, "Notify session")
            }
            NotifyTarget::Broadcast => {
                tracing::info!(event = event_name, %payload, "Notify broadcast")
            }
        }
        Ok(())
    }
}
