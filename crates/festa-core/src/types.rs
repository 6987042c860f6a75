//! Shared domain types: birthday records, device registrations, and
//! the notification payloads exchanged between scheduler and channels.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{FestaError, Result};

/// Upper bound on per-record notification times.
pub const MAX_NOTIFICATION_TIMES: usize = 5;

/// Normalize a time-of-day string to zero-padded "HH:MM".
///
/// Accepts "H:MM", "HH:MM", or "HH:MM:SS"; seconds are dropped so that
/// times stored with second precision still match minute-level checks.
pub fn normalize_time(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    let parsed = NaiveTime::parse_from_str(trimmed, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M"))
        .map_err(|_| FestaError::Invalid(format!("invalid time of day: {trimmed:?}")))?;
    Ok(parsed.format("%H:%M").to_string())
}

/// A tracked birthday.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BirthdayRecord {
    /// Unique record ID (UUID v4).
    pub id: String,
    /// User that owns this record; all queries are owner-scoped.
    pub owner: String,
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    /// Date of birth; the year is only used to compute the age.
    pub birth_date: NaiveDate,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default = "bool_true")]
    pub notification_enabled: bool,
    /// Times of day ("HH:MM") at which reminders fire.
    #[serde(default = "default_notification_times")]
    pub notification_times: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn bool_true() -> bool {
    true
}

fn default_notification_times() -> Vec<String> {
    vec!["09:00".into()]
}

impl BirthdayRecord {
    /// Create a new record with default notification settings.
    pub fn new(owner: &str, first_name: &str, last_name: &str, birth_date: NaiveDate) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner: owner.to_string(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            birth_date,
            phone: None,
            email: None,
            notification_enabled: true,
            notification_times: default_notification_times(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn full_name(&self) -> String {
        if self.last_name.is_empty() {
            self.first_name.clone()
        } else {
            format!("{} {}", self.first_name, self.last_name)
        }
    }

    /// Refresh the modification timestamp.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Normalize all notification times to "HH:MM", then validate.
    ///
    /// Rules: first name present, 1..=5 notification times while
    /// notifications are enabled, every entry a valid time of day.
    pub fn normalize(&mut self) -> Result<()> {
        if self.first_name.trim().is_empty() {
            return Err(FestaError::Invalid("first name must not be empty".into()));
        }
        if self.notification_times.len() > MAX_NOTIFICATION_TIMES {
            return Err(FestaError::Invalid(format!(
                "at most {MAX_NOTIFICATION_TIMES} notification times allowed, got {}",
                self.notification_times.len()
            )));
        }
        if self.notification_enabled && self.notification_times.is_empty() {
            return Err(FestaError::Invalid(
                "notification times must not be empty while notifications are enabled".into(),
            ));
        }
        for entry in &mut self.notification_times {
            *entry = normalize_time(entry)?;
        }
        Ok(())
    }
}

/// A device registered for push delivery. `(owner, token)` is unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRegistration {
    pub owner: String,
    /// Opaque provider token identifying the device endpoint.
    pub token: String,
    pub updated_at: DateTime<Utc>,
}

/// Local presentation permission state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
    /// Not yet decided; the driver may prompt once.
    Default,
}

/// A notification ready for delivery. Transient, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationMessage {
    pub title: String,
    pub body: String,
    /// Collapse tag so repeated sends replace rather than stack.
    pub tag: String,
    /// Provider data payload forwarded to clients (string values only).
    #[serde(default)]
    pub data: serde_json::Value,
}

impl NotificationMessage {
    /// The reminder sent when a birthday fires.
    pub fn birthday(record: &BirthdayRecord, age: i32) -> Self {
        Self {
            title: "🎂 Birthday today!".into(),
            body: format!("{} turns {} today!", record.full_name(), age),
            tag: format!("birthday-{}", record.id),
            data: serde_json::json!({
                "birthdayId": record.id,
                "firstName": record.first_name,
                "lastName": record.last_name,
                "age": age.to_string(),
                "type": "birthday_reminder",
            }),
        }
    }

    /// Fixed message for verifying the push pipeline end to end.
    pub fn test() -> Self {
        Self {
            title: "🔔 Test notification".into(),
            body: "Push notifications are working!".into(),
            tag: "festa-test".into(),
            data: serde_json::json!({ "type": "test" }),
        }
    }
}

/// Per-token result from a multicast push.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResult {
    pub token: String,
    pub success: bool,
    /// Provider error code when the send failed.
    #[serde(default)]
    pub error_code: Option<String>,
    /// True when the provider marked the token permanently dead.
    #[serde(default)]
    pub permanent: bool,
}

/// Aggregate outcome of a single multicast send.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MulticastOutcome {
    pub success_count: usize,
    pub failure_count: usize,
    pub results: Vec<TokenResult>,
}

/// Result of delivering one message through a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delivery {
    /// Channel name ("local" or "push").
    pub channel: String,
    pub success_count: usize,
    pub failure_count: usize,
    #[serde(default)]
    pub token_results: Vec<TokenResult>,
    /// True when the provider was unconfigured and the send was skipped.
    #[serde(default)]
    pub simulated: bool,
}

impl Delivery {
    /// Soft no-op: nothing to deliver to (e.g. no registered devices).
    pub fn none(channel: &str) -> Self {
        Self {
            channel: channel.to_string(),
            success_count: 0,
            failure_count: 0,
            token_results: Vec::new(),
            simulated: false,
        }
    }

    /// Simulated delivery used when the push provider is unconfigured.
    pub fn simulated(channel: &str) -> Self {
        Self {
            simulated: true,
            ..Self::none(channel)
        }
    }

    /// One successful local presentation.
    pub fn shown(channel: &str) -> Self {
        Self {
            success_count: 1,
            ..Self::none(channel)
        }
    }

    /// Fold a multicast outcome into a delivery result.
    pub fn from_outcome(channel: &str, outcome: MulticastOutcome) -> Self {
        Self {
            channel: channel.to_string(),
            success_count: outcome.success_count,
            failure_count: outcome.failure_count,
            token_results: outcome.results,
            simulated: false,
        }
    }

    /// Tokens the provider reported as permanently dead.
    pub fn permanent_failures(&self) -> Vec<&str> {
        self.token_results
            .iter()
            .filter(|r| !r.success && r.permanent)
            .map(|r| r.token.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> BirthdayRecord {
        BirthdayRecord::new(
            "user-1",
            "Anna",
            "Schmidt",
            NaiveDate::from_ymd_opt(1995, 6, 15).unwrap(),
        )
    }

    #[test]
    fn test_normalize_time_variants() {
        assert_eq!(normalize_time("09:00").unwrap(), "09:00");
        assert_eq!(normalize_time("9:00").unwrap(), "09:00");
        assert_eq!(normalize_time("09:00:00").unwrap(), "09:00");
        assert_eq!(normalize_time("18:30:45").unwrap(), "18:30");
        assert_eq!(normalize_time(" 07:05 ").unwrap(), "07:05");
        assert!(normalize_time("25:00").is_err());
        assert!(normalize_time("nine").is_err());
        assert!(normalize_time("").is_err());
    }

    #[test]
    fn test_record_normalize() {
        let mut rec = record();
        rec.notification_times = vec!["9:00".into(), "18:00:30".into()];
        rec.normalize().unwrap();
        assert_eq!(rec.notification_times, vec!["09:00", "18:00"]);
    }

    #[test]
    fn test_record_normalize_rejects_too_many_times() {
        let mut rec = record();
        rec.notification_times = (0..6).map(|h| format!("{h:02}:00")).collect();
        assert!(rec.normalize().is_err());
    }

    #[test]
    fn test_record_normalize_rejects_empty_times_when_enabled() {
        let mut rec = record();
        rec.notification_times.clear();
        assert!(rec.normalize().is_err());

        // Disabled records may carry no times
        rec.notification_enabled = false;
        rec.normalize().unwrap();
    }

    #[test]
    fn test_full_name_with_and_without_last_name() {
        let mut rec = record();
        assert_eq!(rec.full_name(), "Anna Schmidt");
        rec.last_name.clear();
        assert_eq!(rec.full_name(), "Anna");
    }

    #[test]
    fn test_birthday_message_payload() {
        let rec = record();
        let msg = NotificationMessage::birthday(&rec, 30);
        assert_eq!(msg.title, "🎂 Birthday today!");
        assert_eq!(msg.body, "Anna Schmidt turns 30 today!");
        assert_eq!(msg.tag, format!("birthday-{}", rec.id));
        assert_eq!(msg.data["type"], "birthday_reminder");
        assert_eq!(msg.data["age"], "30");
        assert_eq!(msg.data["firstName"], "Anna");
    }

    #[test]
    fn test_permanent_failures_filter() {
        let delivery = Delivery {
            channel: "push".into(),
            success_count: 1,
            failure_count: 2,
            token_results: vec![
                TokenResult {
                    token: "ok".into(),
                    success: true,
                    error_code: None,
                    permanent: false,
                },
                TokenResult {
                    token: "dead".into(),
                    success: false,
                    error_code: Some("NotRegistered".into()),
                    permanent: true,
                },
                TokenResult {
                    token: "flaky".into(),
                    success: false,
                    error_code: Some("Unavailable".into()),
                    permanent: false,
                },
            ],
            simulated: false,
        };
        assert_eq!(delivery.permanent_failures(), vec!["dead"]);
    }
}
