//! Progress reporting for mix sessions.
//!
//! A `ProgressBroadcaster` keeps the latest `ProgressEvent` of every session
//! and pushes new events to live subscribers. Subscribers that join late get
//! the latest event replayed first; callers without a live connection use
//! `get`. Delivery is best effort: a subscriber that went away is logged and
//! dropped, and the publisher never sees the failure.

mod broadcaster;
mod error;
mod types;

pub use broadcaster::{ProgressBroadcaster, ProgressSubscription};
pub use error::ProgressError;
pub use types::{ProgressEvent, Stage};
