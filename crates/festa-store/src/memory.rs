//! In-memory record store.
//!
//! Backs tests and ephemeral runs where no database file is wanted.
//! Same semantics as the SQLite store, including default-allow
//! settings and `(owner, token)` dedup.

use async_trait::async_trait;
use chrono::Utc;
use festa_core::error::{FestaError, Result};
use festa_core::traits::RecordStore;
use festa_core::types::{BirthdayRecord, DeviceRegistration};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Default)]
struct Inner {
    birthdays: Vec<BirthdayRecord>,
    devices: Vec<DeviceRegistration>,
    /// (owner, key) -> value
    settings: HashMap<(String, String), String>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    fail: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every store call fail until reset. Lets tests exercise the
    /// store-outage paths without a real database.
    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(FestaError::Store("memory store unavailable".into()));
        }
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|e| FestaError::Store(format!("Lock: {e}")))
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert_birthday(&self, record: &BirthdayRecord) -> Result<()> {
        self.check()?;
        let mut inner = self.lock()?;
        if inner.birthdays.iter().any(|r| r.id == record.id) {
            return Err(FestaError::Store(format!("duplicate id {}", record.id)));
        }
        inner.birthdays.push(record.clone());
        Ok(())
    }

    async fn update_birthday(&self, record: &BirthdayRecord) -> Result<()> {
        self.check()?;
        let mut inner = self.lock()?;
        match inner
            .birthdays
            .iter_mut()
            .find(|r| r.id == record.id && r.owner == record.owner)
        {
            Some(slot) => {
                *slot = record.clone();
                Ok(())
            }
            None => Err(FestaError::NotFound(format!("birthday {}", record.id))),
        }
    }

    async fn delete_birthday(&self, owner: &str, id: &str) -> Result<bool> {
        self.check()?;
        let mut inner = self.lock()?;
        let before = inner.birthdays.len();
        inner.birthdays.retain(|r| !(r.id == id && r.owner == owner));
        Ok(inner.birthdays.len() < before)
    }

    async fn get_birthday(&self, owner: &str, id: &str) -> Result<Option<BirthdayRecord>> {
        self.check()?;
        let inner = self.lock()?;
        Ok(inner
            .birthdays
            .iter()
            .find(|r| r.id == id && r.owner == owner)
            .cloned())
    }

    async fn list_birthdays(&self, owner: &str) -> Result<Vec<BirthdayRecord>> {
        self.check()?;
        let inner = self.lock()?;
        let mut records: Vec<_> = inner
            .birthdays
            .iter()
            .filter(|r| r.owner == owner)
            .cloned()
            .collect();
        records.sort_by_key(|r| (r.birth_date.format("%m-%d").to_string(), r.first_name.clone()));
        Ok(records)
    }

    async fn enabled_birthdays(&self, owner: Option<&str>) -> Result<Vec<BirthdayRecord>> {
        self.check()?;
        let inner = self.lock()?;
        Ok(inner
            .birthdays
            .iter()
            .filter(|r| r.notification_enabled && owner.is_none_or(|o| r.owner == o))
            .cloned()
            .collect())
    }

    async fn register_device(&self, owner: &str, token: &str) -> Result<()> {
        self.check()?;
        let mut inner = self.lock()?;
        if let Some(existing) = inner
            .devices
            .iter_mut()
            .find(|d| d.owner == owner && d.token == token)
        {
            existing.updated_at = Utc::now();
        } else {
            inner.devices.push(DeviceRegistration {
                owner: owner.to_string(),
                token: token.to_string(),
                updated_at: Utc::now(),
            });
        }
        Ok(())
    }

    async fn unregister_token(&self, token: &str) -> Result<usize> {
        self.check()?;
        let mut inner = self.lock()?;
        let before = inner.devices.len();
        inner.devices.retain(|d| d.token != token);
        Ok(before - inner.devices.len())
    }

    async fn devices_for(&self, owner: &str) -> Result<Vec<DeviceRegistration>> {
        self.check()?;
        let inner = self.lock()?;
        Ok(inner
            .devices
            .iter()
            .filter(|d| d.owner == owner)
            .cloned()
            .collect())
    }

    async fn notifications_enabled(&self, owner: &str) -> Result<bool> {
        self.check()?;
        let inner = self.lock()?;
        let key = (owner.to_string(), "notifications_enabled".to_string());
        Ok(inner.settings.get(&key).map(String::as_str) != Some("false"))
    }

    async fn set_notifications_enabled(&self, owner: &str, enabled: bool) -> Result<()> {
        self.check()?;
        let mut inner = self.lock()?;
        let key = (owner.to_string(), "notifications_enabled".to_string());
        inner
            .settings
            .insert(key, if enabled { "true" } else { "false" }.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[tokio::test]
    async fn test_matches_sqlite_semantics() {
        let store = MemoryStore::new();
        let rec = BirthdayRecord::new(
            "u1",
            "Anna",
            "",
            NaiveDate::from_ymd_opt(1990, 6, 15).unwrap(),
        );
        store.insert_birthday(&rec).await.unwrap();
        assert!(store.get_birthday("u1", &rec.id).await.unwrap().is_some());
        assert!(store.get_birthday("u2", &rec.id).await.unwrap().is_none());

        store.register_device("u1", "tok").await.unwrap();
        store.register_device("u1", "tok").await.unwrap();
        assert_eq!(store.devices_for("u1").await.unwrap().len(), 1);
        assert_eq!(store.unregister_token("tok").await.unwrap(), 1);

        assert!(store.notifications_enabled("u1").await.unwrap());
        store.set_notifications_enabled("u1", false).await.unwrap();
        assert!(!store.notifications_enabled("u1").await.unwrap());
    }

    #[tokio::test]
    async fn test_set_failing() {
        let store = MemoryStore::new();
        store.set_failing(true);
        assert!(store.enabled_birthdays(None).await.is_err());
        store.set_failing(false);
        assert!(store.enabled_birthdays(None).await.is_ok());
    }
}
