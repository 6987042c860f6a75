//! # Festa Core
//! Shared foundation for the Festa birthday reminder service:
//! configuration, error taxonomy, domain types, and the capability
//! traits that isolate storage and notification transports.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::FestaConfig;
pub use error::{FestaError, Result};
pub use traits::{Channel, MulticastSender, Presenter, RecordStore};
pub use types::{
    BirthdayRecord, Delivery, DeviceRegistration, MulticastOutcome, NotificationMessage,
    Permission, TokenResult,
};
