//! One delivery pass: load candidates, match, deliver, prune, report.
//!
//! Both drivers share this sweep: the local timer scopes it to its
//! configured owner, the HTTP cron entry runs it across every owner.
//! A failing record never aborts the rest of the pass; only a store
//! failure while loading candidates is fatal.

use chrono::NaiveDateTime;
use festa_core::error::{FestaError, Result};
use festa_core::traits::{Channel, RecordStore};
use festa_core::types::{BirthdayRecord, Delivery, NotificationMessage};
use serde::Serialize;
use std::collections::HashMap;

use crate::matcher;

/// Which owners a pass covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassScope {
    /// The local driver: one configured owner.
    Owner(String),
    /// The cron driver: everyone.
    AllOwners,
}

impl PassScope {
    pub fn owner(&self) -> Option<&str> {
        match self {
            PassScope::Owner(owner) => Some(owner),
            PassScope::AllOwners => None,
        }
    }
}

/// What happened to one due record.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Deliveries went out (possibly partially).
    Sent {
        sent: usize,
        failed: usize,
        /// Device tokens removed after permanent provider failures.
        pruned: usize,
        /// True when the push provider was unconfigured.
        simulated: bool,
    },
    Skipped {
        reason: String,
    },
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordOutcome {
    pub birthday_id: String,
    pub name: String,
    #[serde(flatten)]
    pub status: OutcomeStatus,
}

impl RecordOutcome {
    fn sent(record: &BirthdayRecord, delivery: &Delivery, pruned: usize) -> Self {
        Self {
            birthday_id: record.id.clone(),
            name: record.full_name(),
            status: OutcomeStatus::Sent {
                sent: delivery.success_count,
                failed: delivery.failure_count,
                pruned,
                simulated: delivery.simulated,
            },
        }
    }

    fn skipped(record: &BirthdayRecord, reason: &str) -> Self {
        Self {
            birthday_id: record.id.clone(),
            name: record.full_name(),
            status: OutcomeStatus::Skipped {
                reason: reason.to_string(),
            },
        }
    }

    fn failed(record: &BirthdayRecord, error: &FestaError) -> Self {
        Self {
            birthday_id: record.id.clone(),
            name: record.full_name(),
            status: OutcomeStatus::Failed {
                error: error.to_string(),
            },
        }
    }
}

/// Aggregate result of one pass.
#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    /// Candidate records examined (due or not).
    pub checked: usize,
    /// Successful deliveries across all records.
    pub sent: usize,
    /// One entry per due record.
    pub outcomes: Vec<RecordOutcome>,
}

impl PassReport {
    pub fn summary(&self) -> String {
        format!(
            "Checked {} birthdays, sent {} notifications",
            self.checked, self.sent
        )
    }
}

/// Run one delivery sweep at wall-clock time `now`.
///
/// Failing to load candidates is the only fatal error; everything
/// after that is isolated per record and lands in the report.
pub async fn run_pass(
    store: &dyn RecordStore,
    channel: &dyn Channel,
    scope: &PassScope,
    now: NaiveDateTime,
) -> Result<PassReport> {
    let candidates = store.enabled_birthdays(scope.owner()).await?;
    let mut report = PassReport {
        checked: candidates.len(),
        sent: 0,
        outcomes: Vec::new(),
    };
    // Per-owner master switch, looked up once per owner per pass
    let mut owner_enabled: HashMap<String, bool> = HashMap::new();

    for record in &candidates {
        if !matcher::is_due(record, now) {
            continue;
        }

        let enabled = match owner_enabled.get(record.owner.as_str()) {
            Some(enabled) => *enabled,
            None => {
                // A settings read failure falls back to enabled: only
                // an explicit opt-out suppresses reminders
                let enabled = store
                    .notifications_enabled(&record.owner)
                    .await
                    .unwrap_or(true);
                owner_enabled.insert(record.owner.clone(), enabled);
                enabled
            }
        };
        if !enabled {
            tracing::debug!("🔕 Notifications disabled for owner {}", record.owner);
            report
                .outcomes
                .push(RecordOutcome::skipped(record, "notifications disabled"));
            continue;
        }

        let age = matcher::age_turning(record.birth_date, now.date());
        let message = NotificationMessage::birthday(record, age);
        tracing::info!(
            "🎂 Birthday due via {}: {} turns {}",
            channel.name(),
            record.full_name(),
            age
        );

        match channel.deliver(record, &message).await {
            Ok(delivery) => {
                let mut pruned = 0;
                for token in delivery.permanent_failures() {
                    match store.unregister_token(token).await {
                        Ok(removed) => pruned += removed,
                        // Pruning is best-effort; the token dies on a
                        // later pass if this removal fails
                        Err(e) => tracing::warn!("⚠️ Token prune failed: {e}"),
                    }
                }
                if pruned > 0 {
                    tracing::info!("🧹 Pruned {pruned} dead device token(s)");
                }
                report.sent += delivery.success_count;
                report
                    .outcomes
                    .push(RecordOutcome::sent(record, &delivery, pruned));
            }
            Err(e) => {
                tracing::error!("❌ Delivery failed for {}: {e}", record.full_name());
                report.outcomes.push(RecordOutcome::failed(record, &e));
            }
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use festa_core::types::TokenResult;
    use festa_store::MemoryStore;
    use std::sync::Mutex;

    /// Channel double: scripted per-record outcomes, call log.
    struct FakeChannel {
        delivered: Mutex<Vec<String>>,
        fail_for: Option<String>,
        delivery: Delivery,
    }

    impl FakeChannel {
        fn ok() -> Self {
            Self {
                delivered: Mutex::new(Vec::new()),
                fail_for: None,
                delivery: Delivery::shown("local"),
            }
        }

        fn with_delivery(delivery: Delivery) -> Self {
            Self {
                delivered: Mutex::new(Vec::new()),
                fail_for: None,
                delivery,
            }
        }

        fn failing_for(id: &str) -> Self {
            Self {
                delivered: Mutex::new(Vec::new()),
                fail_for: Some(id.to_string()),
                delivery: Delivery::shown("local"),
            }
        }
    }

    #[async_trait]
    impl Channel for FakeChannel {
        fn name(&self) -> &str {
            "fake"
        }
        async fn deliver(
            &self,
            record: &BirthdayRecord,
            _message: &NotificationMessage,
        ) -> Result<Delivery> {
            if self.fail_for.as_deref() == Some(record.id.as_str()) {
                return Err(FestaError::Channel("boom".into()));
            }
            self.delivered.lock().unwrap().push(record.id.clone());
            Ok(self.delivery.clone())
        }
    }

    fn record(owner: &str, first: &str, month: u32, day: u32, times: &[&str]) -> BirthdayRecord {
        let mut rec = BirthdayRecord::new(
            owner,
            first,
            "",
            NaiveDate::from_ymd_opt(1990, month, day).unwrap(),
        );
        rec.notification_times = times.iter().map(|t| t.to_string()).collect();
        rec
    }

    fn at(mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
    }

    #[tokio::test]
    async fn test_pass_delivers_only_due_records() {
        let store = MemoryStore::new();
        let due = record("u1", "Anna", 6, 15, &["09:00"]);
        store.insert_birthday(&due).await.unwrap();
        store
            .insert_birthday(&record("u1", "Ben", 6, 15, &["18:00"]))
            .await
            .unwrap();
        store
            .insert_birthday(&record("u1", "Carl", 7, 1, &["09:00"]))
            .await
            .unwrap();

        let channel = FakeChannel::ok();
        let scope = PassScope::Owner("u1".into());
        let report = run_pass(&store, &channel, &scope, at(6, 15, 9, 0))
            .await
            .unwrap();

        assert_eq!(report.checked, 3);
        assert_eq!(report.sent, 1);
        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(report.outcomes[0].name, "Anna");
        assert_eq!(*channel.delivered.lock().unwrap(), vec![due.id]);
        assert_eq!(report.summary(), "Checked 3 birthdays, sent 1 notifications");
    }

    #[tokio::test]
    async fn test_pass_scope_separates_owners() {
        let store = MemoryStore::new();
        store
            .insert_birthday(&record("u1", "Anna", 6, 15, &["09:00"]))
            .await
            .unwrap();
        store
            .insert_birthday(&record("u2", "Ben", 6, 15, &["09:00"]))
            .await
            .unwrap();

        let channel = FakeChannel::ok();
        let scope = PassScope::Owner("u1".into());
        let report = run_pass(&store, &channel, &scope, at(6, 15, 9, 0))
            .await
            .unwrap();
        assert_eq!(report.checked, 1);

        let channel = FakeChannel::ok();
        let report = run_pass(&store, &channel, &PassScope::AllOwners, at(6, 15, 9, 0))
            .await
            .unwrap();
        assert_eq!(report.checked, 2);
        assert_eq!(report.sent, 2);
    }

    #[tokio::test]
    async fn test_pass_respects_owner_master_switch() {
        let store = MemoryStore::new();
        store
            .insert_birthday(&record("u1", "Anna", 6, 15, &["09:00"]))
            .await
            .unwrap();
        store.set_notifications_enabled("u1", false).await.unwrap();

        let channel = FakeChannel::ok();
        let report = run_pass(&store, &channel, &PassScope::AllOwners, at(6, 15, 9, 0))
            .await
            .unwrap();

        assert!(channel.delivered.lock().unwrap().is_empty());
        assert_eq!(report.outcomes.len(), 1);
        assert!(matches!(
            report.outcomes[0].status,
            OutcomeStatus::Skipped { .. }
        ));
    }

    #[tokio::test]
    async fn test_pass_isolates_record_failures() {
        let store = MemoryStore::new();
        let a = record("u1", "Anna", 6, 15, &["09:00"]);
        let b = record("u1", "Ben", 6, 15, &["09:00"]);
        let c = record("u1", "Carl", 6, 15, &["09:00"]);
        store.insert_birthday(&a).await.unwrap();
        store.insert_birthday(&b).await.unwrap();
        store.insert_birthday(&c).await.unwrap();

        let channel = FakeChannel::failing_for(&b.id);
        let report = run_pass(
            &store,
            &channel,
            &PassScope::Owner("u1".into()),
            at(6, 15, 9, 0),
        )
        .await
        .unwrap();

        // The other two still went out
        assert_eq!(channel.delivered.lock().unwrap().len(), 2);
        assert_eq!(report.outcomes.len(), 3);
        let failed: Vec<_> = report
            .outcomes
            .iter()
            .filter(|o| matches!(o.status, OutcomeStatus::Failed { .. }))
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].name, "Ben");
    }

    #[tokio::test]
    async fn test_pass_prunes_permanently_dead_tokens() {
        let store = MemoryStore::new();
        store
            .insert_birthday(&record("u1", "Anna", 6, 15, &["09:00"]))
            .await
            .unwrap();
        store.register_device("u1", "tok-live").await.unwrap();
        store.register_device("u1", "tok-dead").await.unwrap();

        let channel = FakeChannel::with_delivery(Delivery {
            channel: "push".into(),
            success_count: 1,
            failure_count: 1,
            token_results: vec![
                TokenResult {
                    token: "tok-live".into(),
                    success: true,
                    error_code: None,
                    permanent: false,
                },
                TokenResult {
                    token: "tok-dead".into(),
                    success: false,
                    error_code: Some("NotRegistered".into()),
                    permanent: true,
                },
            ],
            simulated: false,
        });
        let report = run_pass(
            &store,
            &channel,
            &PassScope::Owner("u1".into()),
            at(6, 15, 9, 0),
        )
        .await
        .unwrap();

        // The dead token is gone, the live one stays
        let tokens: Vec<_> = store
            .devices_for("u1")
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.token)
            .collect();
        assert_eq!(tokens, vec!["tok-live"]);
        match &report.outcomes[0].status {
            OutcomeStatus::Sent { pruned, .. } => assert_eq!(*pruned, 1),
            other => panic!("expected Sent, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_transient_failures_are_not_pruned() {
        let store = MemoryStore::new();
        store
            .insert_birthday(&record("u1", "Anna", 6, 15, &["09:00"]))
            .await
            .unwrap();
        store.register_device("u1", "tok-flaky").await.unwrap();

        let channel = FakeChannel::with_delivery(Delivery {
            channel: "push".into(),
            success_count: 0,
            failure_count: 1,
            token_results: vec![TokenResult {
                token: "tok-flaky".into(),
                success: false,
                error_code: Some("Unavailable".into()),
                permanent: false,
            }],
            simulated: false,
        });
        run_pass(
            &store,
            &channel,
            &PassScope::Owner("u1".into()),
            at(6, 15, 9, 0),
        )
        .await
        .unwrap();

        assert_eq!(store.devices_for("u1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_pass_store_outage_is_fatal() {
        let store = MemoryStore::new();
        store.set_failing(true);
        let channel = FakeChannel::ok();
        let err = run_pass(&store, &channel, &PassScope::AllOwners, at(6, 15, 9, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, FestaError::Store(_)));
    }

    #[tokio::test]
    async fn test_simulated_delivery_surfaces_in_report() {
        let store = MemoryStore::new();
        store
            .insert_birthday(&record("u1", "Anna", 6, 15, &["09:00"]))
            .await
            .unwrap();

        let channel = FakeChannel::with_delivery(Delivery::simulated("push"));
        let report = run_pass(
            &store,
            &channel,
            &PassScope::Owner("u1".into()),
            at(6, 15, 9, 0),
        )
        .await
        .unwrap();

        match &report.outcomes[0].status {
            OutcomeStatus::Sent { simulated, .. } => assert!(*simulated),
            other => panic!("expected Sent, got {other:?}"),
        }
    }

    #[test]
    fn test_outcome_serialization_shape() {
        let rec = record("u1", "Anna", 6, 15, &["09:00"]);
        let outcome = RecordOutcome::sent(&rec, &Delivery::shown("local"), 0);
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "sent");
        assert_eq!(json["name"], "Anna");
        assert_eq!(json["sent"], 1);

        let outcome = RecordOutcome::skipped(&rec, "notifications disabled");
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "skipped");
        assert_eq!(json["reason"], "notifications disabled");
    }
}
