//! # Festa Scheduler
//!
//! The beating heart of the reminder service: decide *when* a birthday
//! notification fires and push it through a channel.
//!
//! ## Architecture
//! ```text
//! matcher   pure date/time matching ("is this record due right now?")
//! pass      one delivery sweep over the candidate records
//! driver    local recurring timer (tokio interval, minute dedup)
//! ```
//!
//! The HTTP cron entry point in `festa-gateway` reuses `run_pass`
//! directly; only the local timer lives here, because only it carries
//! state (the last-processed minute) between runs.

pub mod driver;
pub mod matcher;
pub mod pass;

pub use driver::{LocalDriver, run_notifier};
pub use pass::{OutcomeStatus, PassReport, PassScope, RecordOutcome, run_pass};
