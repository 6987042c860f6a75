//! Push notification channel: fans one message out to every device
//! the record's owner has registered.

use async_trait::async_trait;
use festa_core::error::Result;
use festa_core::traits::{Channel, MulticastSender, RecordStore};
use festa_core::types::{BirthdayRecord, Delivery, NotificationMessage};
use std::sync::Arc;

pub struct PushChannel {
    store: Arc<dyn RecordStore>,
    sender: Arc<dyn MulticastSender>,
}

impl PushChannel {
    pub fn new(store: Arc<dyn RecordStore>, sender: Arc<dyn MulticastSender>) -> Self {
        Self { store, sender }
    }
}

#[async_trait]
impl Channel for PushChannel {
    fn name(&self) -> &str {
        "push"
    }

    async fn deliver(
        &self,
        record: &BirthdayRecord,
        message: &NotificationMessage,
    ) -> Result<Delivery> {
        let devices = self.store.devices_for(&record.owner).await?;
        if devices.is_empty() {
            // No registered devices is a quiet outcome, not an error
            tracing::debug!("📪 No devices registered for owner {}", record.owner);
            return Ok(Delivery::none("push"));
        }
        if !self.sender.is_configured() {
            tracing::info!(
                "📴 Push provider unconfigured, simulating send of {:?} to {} device(s)",
                message.title,
                devices.len()
            );
            return Ok(Delivery::simulated("push"));
        }
        let tokens: Vec<String> = devices.into_iter().map(|d| d.token).collect();
        let outcome = self.sender.send_multicast(message, &tokens).await?;
        Ok(Delivery::from_outcome("push", outcome))
    }
}
