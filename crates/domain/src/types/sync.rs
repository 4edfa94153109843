//! Synchronization session state

use serde::{Deserialize, Serialize};

use crate::impl_domain_status_conversions;

/// Lifecycle state of a chat synchronization session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// No active subscription; the last snapshot may be stale.
    #[default]
    Idle,
    /// History fetch in flight.
    Loading,
    /// History merged and live subscription open.
    Listening,
    /// History could not be loaded; recoverable by starting again.
    Error,
    /// Live resubscription gave up; history stays visible.
    Degraded,
}

impl_domain_status_conversions!(SyncState {
    Idle => "idle",
    Loading => "loading",
    Listening => "listening",
    Error => "error",
    Degraded => "degraded",
});
