use chrono::{DateTime, Utc};

use crate::error::ConnectionError;
use crate::ident::ResolutionOutcome;
use crate::protocol::InboundFrame;

/// Transport-level transitions, emitted exactly once per state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Connect,
    Disconnect,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Errored,
}

/// Everything the single-threaded engine pump consumes. Channel tasks and
/// resolution tasks produce these; the pump applies them in arrival order.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    Frame(InboundFrame),
    Lifecycle(LifecycleEvent),
    Status {
        state: ConnectionState,
        endpoint: Option<String>,
        error: Option<ConnectionError>,
        at: DateTime<Utc>,
    },
    Resolved {
        identifier: String,
        outcome: ResolutionOutcome,
    },
    /// The supervisor tore down the live channel. All per-channel state
    /// (registry, signage, resolution cache) is flushed.
    ChannelReplaced,
}
