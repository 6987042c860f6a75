//! Local timer driver: a tokio interval loop that runs an owner-scoped
//! delivery pass roughly once a minute.
//!
//! The last-processed minute key is instance state on the driver, so
//! two ticks landing in the same minute cannot double-send and two
//! driver instances never share dedup state.

use chrono::NaiveDateTime;
use festa_core::error::Result;
use festa_core::traits::{Channel, Presenter, RecordStore};
use festa_core::types::Permission;
use std::sync::Arc;
use tokio::sync::Notify;

use crate::matcher;
use crate::pass::{PassReport, PassScope, run_pass};

pub struct LocalDriver {
    store: Arc<dyn RecordStore>,
    channel: Arc<dyn Channel>,
    presenter: Arc<dyn Presenter>,
    owner: String,
    tick_secs: u64,
    /// Minute key of the last executed pass.
    last_key: Option<String>,
    /// A permission prompt is shown at most once per driver.
    asked_permission: bool,
    /// Signalled to end a running `run_notifier` loop.
    stop: Arc<Notify>,
}

impl LocalDriver {
    pub fn new(
        store: Arc<dyn RecordStore>,
        channel: Arc<dyn Channel>,
        presenter: Arc<dyn Presenter>,
        owner: &str,
        tick_secs: u64,
    ) -> Self {
        Self {
            store,
            channel,
            presenter,
            owner: owner.to_string(),
            tick_secs,
            last_key: None,
            asked_permission: false,
            stop: Arc::new(Notify::new()),
        }
    }

    /// Handle that ends this driver's `run_notifier` loop when
    /// `notify_one` is called on it. Clone it out before spawning.
    pub fn stop_handle(&self) -> Arc<Notify> {
        self.stop.clone()
    }

    /// One timer tick at wall-clock time `now`.
    ///
    /// Returns `None` when the tick was a no-op: presentation not
    /// permitted, or this minute has already been processed. The minute
    /// is marked processed before the pass runs, so a failing pass is
    /// not retried within the same minute.
    pub async fn tick(&mut self, now: NaiveDateTime) -> Result<Option<PassReport>> {
        match self.presenter.permission() {
            Permission::Granted => {}
            Permission::Default if !self.asked_permission => {
                self.asked_permission = true;
                if self.presenter.request_permission().await? != Permission::Granted {
                    return Ok(None);
                }
            }
            _ => return Ok(None),
        }

        let key = matcher::dedup_key(now);
        if self.last_key.as_deref() == Some(key.as_str()) {
            return Ok(None);
        }
        self.last_key = Some(key);

        let scope = PassScope::Owner(self.owner.clone());
        let report = run_pass(self.store.as_ref(), self.channel.as_ref(), &scope, now).await?;
        Ok(Some(report))
    }
}

/// Run the notifier loop until stopped. Spawn this as a background
/// task; end it via `notify_one` on the driver's [`LocalDriver::stop_handle`].
pub async fn run_notifier(mut driver: LocalDriver) {
    tracing::info!(
        "⏰ Local notifier started for {} (check every {}s)",
        driver.owner,
        driver.tick_secs
    );
    // Zero would panic tokio's interval; clamp to one second
    let secs = driver.tick_secs.max(1);
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(secs));
    let stop = driver.stop_handle();
    loop {
        tokio::select! {
            _ = stop.notified() => {
                tracing::info!("🛑 Local notifier stopped for {}", driver.owner);
                break;
            }
            _ = interval.tick() => {
                let now = chrono::Local::now().naive_local();
                match driver.tick(now).await {
                    Ok(Some(report)) if !report.outcomes.is_empty() => {
                        tracing::info!("📣 {}", report.summary());
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!("⚠️ Notifier pass failed: {e}"),
                }
            }
        }
    }
}
