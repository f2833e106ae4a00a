use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::events::{EngineEvent, LifecycleEvent};
use crate::ident::{IdentityResolver, ResolutionOutcome};
use crate::markers::{CallMarker, MarkerAggregator, MarkerSet};
use crate::protocol::{InboundFrame, OutboundFrame, RawTelemetryFrame};
use crate::registry::PlayerRegistry;
use crate::signage::{SignConfig, SignEditRejected, SignageControlPlane};

/// Single-threaded owner of all live-map state. Applies channel events in
/// arrival order; registry, signage and marker mutation run to completion
/// without yielding, so consumers never observe a half-updated snapshot.
pub struct LiveMapEngine {
    registry: PlayerRegistry,
    resolver: IdentityResolver,
    signage: SignageControlPlane,
    aggregator: MarkerAggregator,
    calls: Vec<CallMarker>,
    markers: MarkerSet,
    dirty: bool,
    resolution_failures: u64,
}

impl LiveMapEngine {
    pub fn new(
        resolver: IdentityResolver,
        aggregator: MarkerAggregator,
        signage_confirm_timeout_secs: u64,
    ) -> Self {
        Self {
            registry: PlayerRegistry::new(),
            resolver,
            signage: SignageControlPlane::new(signage_confirm_timeout_secs),
            aggregator,
            calls: Vec::new(),
            markers: MarkerSet::default(),
            dirty: true,
            resolution_failures: 0,
        }
    }

    pub fn handle_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Frame(InboundFrame::PlayerData(frames)) => {
                for frame in &frames {
                    self.apply_telemetry(frame);
                }
                self.dirty = true;
            }
            EngineEvent::Frame(InboundFrame::PlayerLeft(identifier)) => {
                if self.registry.remove(&identifier) {
                    debug!(identifier = %identifier, "entity left");
                }
                self.resolver.forget(&identifier);
                self.dirty = true;
            }
            EngineEvent::Frame(InboundFrame::SignageState(snapshot)) => {
                self.signage.apply_authoritative(&snapshot);
                self.dirty = true;
            }
            EngineEvent::Lifecycle(lifecycle) => match lifecycle {
                LifecycleEvent::Connect => info!("telemetry stream online"),
                LifecycleEvent::Disconnect => info!("telemetry stream closed"),
                LifecycleEvent::Error => warn!("telemetry stream failed"),
            },
            EngineEvent::Status { state, endpoint, .. } => {
                debug!(?state, ?endpoint, "connection status changed");
            }
            EngineEvent::Resolved {
                identifier,
                outcome,
            } => {
                self.resolver.complete(&identifier, &outcome);
                match outcome {
                    ResolutionOutcome::Found(identity) => {
                        // No-op when the entity already left; a late
                        // resolution must never resurrect an entry.
                        if self.registry.patch_resolved(&identifier, identity) {
                            self.dirty = true;
                        }
                    }
                    ResolutionOutcome::NotFound => {
                        debug!(identifier = %identifier, "no account matched; staying telemetry-only");
                    }
                    ResolutionOutcome::Failed(_) => {
                        self.resolution_failures = self.resolution_failures.saturating_add(1);
                    }
                }
            }
            EngineEvent::ChannelReplaced => {
                info!(
                    flushed_players = self.registry.len(),
                    flushed_signs = self.signage.len(),
                    "channel replaced; flushing per-channel state"
                );
                self.registry.clear();
                self.resolver.clear();
                self.signage.clear();
                self.dirty = true;
            }
        }
    }

    fn apply_telemetry(&mut self, frame: &RawTelemetryFrame) {
        self.registry.upsert(frame);
        let unresolved = self
            .registry
            .get(&frame.identifier)
            .is_some_and(|entry| !entry.is_resolved());
        if unresolved {
            if let Some(identity) = self.resolver.request(&frame.identifier, &frame.identifiers) {
                self.registry.patch_resolved(&frame.identifier, identity);
            }
        }
    }

    /// Applies a local signage edit and returns the outbound frame for the
    /// supervisor to send.
    pub fn edit_signage(
        &mut self,
        id: &str,
        config: SignConfig,
        now: DateTime<Utc>,
    ) -> Result<OutboundFrame, SignEditRejected> {
        let frame = self.signage.apply_local_edit(id, config, now)?;
        self.dirty = true;
        Ok(frame)
    }

    /// Replaces the externally supplied call markers.
    pub fn set_call_markers(&mut self, calls: Vec<CallMarker>) {
        self.calls = calls;
        self.dirty = true;
    }

    /// Periodic housekeeping: reverts signage edits whose echo never came.
    pub fn tick(&mut self, now: DateTime<Utc>) {
        if !self.signage.expire_pending(now).is_empty() {
            self.dirty = true;
        }
    }

    /// The current renderable set, recomputed only when registry or signage
    /// state changed since the last call.
    pub fn markers(&mut self) -> &MarkerSet {
        if self.dirty {
            self.markers =
                self.aggregator
                    .rebuild(&self.registry.snapshot(), &self.signage.snapshot(), &self.calls);
            self.signage.settle_transients();
            self.dirty = false;
        }
        &self.markers
    }

    pub fn registry(&self) -> &PlayerRegistry {
        &self.registry
    }

    pub fn signage(&self) -> &SignageControlPlane {
        &self.signage
    }

    pub fn resolution_failures(&self) -> u64 {
        self.resolution_failures
    }
}
