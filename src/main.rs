mod channel;
mod config;
mod engine;
mod error;
mod events;
mod ident;
mod markers;
mod projection;
mod protocol;
mod registry;
mod signage;
mod supervisor;

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    config::LiveMapConfig,
    engine::LiveMapEngine,
    events::EngineEvent,
    ident::{HttpAccountLookup, IdentityResolver},
    markers::{load_static_markers, MarkerAggregator},
    projection::CoordinateProjector,
    supervisor::ConnectionSupervisor,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let (config, config_path) = LiveMapConfig::load_or_create()?;
    info!(path = %config_path.display(), endpoints = config.endpoints.len(), "loaded live map config");

    let furniture = match &config.static_marker_catalogue {
        Some(path) => match load_static_markers(path) {
            Ok(markers) => markers,
            Err(err) => {
                warn!(?err, "static marker catalogue unavailable; map furniture disabled");
                Vec::new()
            }
        },
        None => {
            info!("no static marker catalogue configured");
            Vec::new()
        }
    };

    let (tx, rx) = crossbeam_channel::unbounded::<EngineEvent>();

    let lookup = Arc::new(
        HttpAccountLookup::new(
            &config.lookup_base_url,
            Duration::from_millis(config.lookup_timeout_ms),
        )
        .context("failed building account lookup collaborator")?,
    );
    let resolver = IdentityResolver::new(
        lookup,
        tx.clone(),
        Duration::from_millis(config.lookup_timeout_ms),
    );
    let aggregator = MarkerAggregator::new(
        CoordinateProjector::new(config.projection.clone()),
        furniture,
    );
    let mut engine = LiveMapEngine::new(
        resolver,
        aggregator,
        config.signage_confirm_timeout_secs,
    );

    let mut supervisor = ConnectionSupervisor::new(
        config.endpoints.clone(),
        config.initial_endpoint(),
        config.require_secure_transport,
        tx.clone(),
    );
    supervisor
        .connect()
        .await
        .context("no telemetry endpoint configured")?;

    let tick_interval = Duration::from_millis(config.tick_interval_ms.clamp(50, 5_000));
    let snapshot_interval =
        Duration::from_secs(config.snapshot_log_interval_secs.clamp(5, 3_600));
    let mut last_snapshot_log = Instant::now();

    info!(
        candidates = supervisor.endpoints().len(),
        "live map engine running"
    );
    loop {
        tokio::select! {
            _ = sleep(tick_interval) => {}
            result = tokio::signal::ctrl_c() => {
                result.context("failed waiting for shutdown signal")?;
                break;
            }
        }

        while let Ok(event) = rx.try_recv() {
            engine.handle_event(event);
        }
        engine.tick(Utc::now());

        if last_snapshot_log.elapsed() >= snapshot_interval {
            let status = supervisor.status();
            let set = engine.markers();
            info!(
                state = ?status.state,
                endpoint = ?status.endpoint,
                units = set.units.len(),
                players = set.players.len(),
                calls = set.calls.len(),
                signage = set.signage.len(),
                dropped_frames = status.dropped_frames,
                resolution_failures = engine.resolution_failures(),
                "live map snapshot"
            );
            last_snapshot_log = Instant::now();
        }
    }

    info!("shutting down live map engine");
    supervisor.disconnect();
    Ok(())
}
