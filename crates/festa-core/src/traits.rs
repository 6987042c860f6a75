//! Capability traits.
//!
//! Every external dependency of the scheduler sits behind one of these
//! seams so the orchestrator can be exercised with in-memory fakes:
//! persistence ([`RecordStore`]), remote fan-out ([`MulticastSender`]),
//! local presentation ([`Presenter`]), and the channel facade
//! ([`Channel`]) the delivery pass dispatches through.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{
    BirthdayRecord, Delivery, DeviceRegistration, MulticastOutcome, NotificationMessage,
    Permission,
};

/// Persistent state: birthday records, device registrations, and
/// per-owner settings.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert_birthday(&self, record: &BirthdayRecord) -> Result<()>;
    async fn update_birthday(&self, record: &BirthdayRecord) -> Result<()>;
    /// Returns false when no record matched.
    async fn delete_birthday(&self, owner: &str, id: &str) -> Result<bool>;
    async fn get_birthday(&self, owner: &str, id: &str) -> Result<Option<BirthdayRecord>>;
    async fn list_birthdays(&self, owner: &str) -> Result<Vec<BirthdayRecord>>;
    /// Records with notifications enabled; every owner when `owner` is
    /// `None` (the cron pass), otherwise scoped to one owner.
    async fn enabled_birthdays(&self, owner: Option<&str>) -> Result<Vec<BirthdayRecord>>;

    /// Idempotent upsert on `(owner, token)`; refreshes `updated_at`.
    async fn register_device(&self, owner: &str, token: &str) -> Result<()>;
    /// Remove every registration carrying `token`, returning the count.
    async fn unregister_token(&self, token: &str) -> Result<usize>;
    async fn devices_for(&self, owner: &str) -> Result<Vec<DeviceRegistration>>;

    /// Per-owner notification master switch. Absent ⇒ enabled.
    async fn notifications_enabled(&self, owner: &str) -> Result<bool>;
    async fn set_notifications_enabled(&self, owner: &str, enabled: bool) -> Result<()>;
}

/// A way of getting one notification in front of the record's owner.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Short channel name used in logs and reports.
    fn name(&self) -> &str;
    /// Deliver `message` for `record`. Partial failure is expressed in
    /// the returned [`Delivery`], not as an `Err`.
    async fn deliver(
        &self,
        record: &BirthdayRecord,
        message: &NotificationMessage,
    ) -> Result<Delivery>;
}

/// Remote multicast push (FCM-style): one message, many device tokens.
#[async_trait]
pub trait MulticastSender: Send + Sync {
    /// False when provider credentials are absent; sends are then
    /// simulated instead of failing.
    fn is_configured(&self) -> bool;
    async fn send_multicast(
        &self,
        message: &NotificationMessage,
        tokens: &[String],
    ) -> Result<MulticastOutcome>;
}

/// Local presentation surface (terminal, desktop shell, ...).
#[async_trait]
pub trait Presenter: Send + Sync {
    fn permission(&self) -> Permission;
    /// Prompt for permission when still undecided.
    async fn request_permission(&self) -> Result<Permission>;
    async fn show(&self, message: &NotificationMessage) -> Result<()>;
}
