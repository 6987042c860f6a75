//! Local notification channel: presents reminders on the machine the
//! service runs on, through whatever [`Presenter`] surface is wired in.

use async_trait::async_trait;
use festa_core::error::{FestaError, Result};
use festa_core::traits::{Channel, Presenter};
use festa_core::types::{BirthdayRecord, Delivery, NotificationMessage, Permission};
use std::sync::Arc;

/// Terminal presenter: prints notifications to stdout. Always granted.
pub struct ConsolePresenter;

impl ConsolePresenter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ConsolePresenter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Presenter for ConsolePresenter {
    fn permission(&self) -> Permission {
        Permission::Granted
    }

    async fn request_permission(&self) -> Result<Permission> {
        Ok(Permission::Granted)
    }

    async fn show(&self, message: &NotificationMessage) -> Result<()> {
        println!("\n  {}\n  {}\n", message.title, message.body);
        tracing::info!("🔔 Local notification shown: {}", message.title);
        Ok(())
    }
}

/// Channel that delivers through a local presenter.
///
/// Delivery is atomic: either the message is shown once, or it fails
/// with the reason (no surface, permission denied, permission never
/// granted).
pub struct LocalChannel {
    presenter: Option<Arc<dyn Presenter>>,
}

impl LocalChannel {
    pub fn new(presenter: Arc<dyn Presenter>) -> Self {
        Self {
            presenter: Some(presenter),
        }
    }

    /// A local channel on a surface with no presentation capability.
    pub fn unsupported() -> Self {
        Self { presenter: None }
    }
}

#[async_trait]
impl Channel for LocalChannel {
    fn name(&self) -> &str {
        "local"
    }

    async fn deliver(
        &self,
        _record: &BirthdayRecord,
        message: &NotificationMessage,
    ) -> Result<Delivery> {
        let Some(presenter) = &self.presenter else {
            return Err(FestaError::Channel(
                "local notifications unsupported on this surface".into(),
            ));
        };
        match presenter.permission() {
            Permission::Granted => {}
            Permission::Denied => {
                return Err(FestaError::Channel("local notifications denied".into()));
            }
            Permission::Default => {
                return Err(FestaError::Channel(
                    "local notification permission not granted".into(),
                ));
            }
        }
        presenter.show(message).await?;
        Ok(Delivery::shown("local"))
    }
}
