//! Status reporting for indexing and search runs
//!
//! Runs describe what they are doing through [`StatusEvent`]s on a [`StatusSender`].
//! Observers (the CLI, tests) read them from the paired [`StatusReceiver`].

pub mod channel;
pub mod types;

pub use channel::{StatusReceiver, StatusSender, status_channel};
pub use types::{IndexingSummary, SearchOutcome, StatusEvent};
