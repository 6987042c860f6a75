//! # Festa Notify
//! Notification channel implementations.
//!
//! Two ways a reminder reaches someone: the local channel presents it
//! on the machine running the service, the push channel fans it out to
//! every device the owner registered. The FCM client behind the push
//! channel degrades to simulation mode when no server key is set, so
//! the rest of the system behaves identically with or without
//! credentials.

pub mod fcm;
pub mod local;
pub mod push;

pub use fcm::FcmClient;
pub use local::{ConsolePresenter, LocalChannel};
pub use push::PushChannel;
