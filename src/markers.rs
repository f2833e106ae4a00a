use std::{collections::HashSet, fs, path::Path};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

use crate::projection::{CoordinateProjector, MapPoint};
use crate::registry::{MapPlayer, PlayerIdentity};
use crate::signage::SignageItem;

/// Fixed map furniture (stations, hospitals, garages). Loaded once per
/// session from the catalogue file; immutable afterwards.
#[derive(Debug, Clone, Deserialize)]
pub struct StaticMarker {
    pub id: String,
    pub category: String,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub label: Option<String>,
}

/// An active call with a position, supplied by the host application.
#[derive(Debug, Clone, PartialEq)]
pub struct CallMarker {
    pub id: String,
    pub label: String,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub key: String,
    pub label: String,
    pub pos: MapPoint,
    pub heading: Option<f64>,
    pub detail: Option<String>,
}

/// One renderable collection, partitioned for the map layers. Ordering
/// within a partition is insertion-stable and keys are unique per partition.
#[derive(Debug, Clone, Default)]
pub struct MarkerSet {
    pub units: Vec<Marker>,
    pub players: Vec<Marker>,
    pub calls: Vec<Marker>,
    pub furniture: Vec<Marker>,
    pub signage: Vec<Marker>,
}

impl MarkerSet {
    pub fn total(&self) -> usize {
        self.units.len()
            + self.players.len()
            + self.calls.len()
            + self.furniture.len()
            + self.signage.len()
    }
}

/// Merges registry, signage, static furniture and externally supplied call
/// markers into one renderable set. Pure recomputation; no I/O.
pub struct MarkerAggregator {
    projector: CoordinateProjector,
    furniture: Vec<StaticMarker>,
}

impl MarkerAggregator {
    pub fn new(projector: CoordinateProjector, furniture: Vec<StaticMarker>) -> Self {
        Self {
            projector,
            furniture,
        }
    }

    pub fn rebuild(
        &self,
        players: &[MapPlayer],
        signs: &[SignageItem],
        calls: &[CallMarker],
    ) -> MarkerSet {
        let mut set = MarkerSet::default();
        let mut unit_keys = HashSet::new();
        let mut player_keys = HashSet::new();

        for player in players {
            let pos = self.projector.to_map_space(player.x, player.y);
            match &player.identity {
                PlayerIdentity::Resolved(identity) => {
                    if !unit_keys.insert(player.identifier.clone()) {
                        continue;
                    }
                    let label = identity
                        .active_unit
                        .as_ref()
                        .map(|unit| unit.callsign().to_owned())
                        .unwrap_or_else(|| identity.display_name.clone());
                    set.units.push(Marker {
                        key: player.identifier.clone(),
                        label,
                        pos,
                        heading: Some(player.heading),
                        detail: player.vehicle.clone(),
                    });
                }
                PlayerIdentity::TelemetryOnly => {
                    if !player_keys.insert(player.identifier.clone()) {
                        continue;
                    }
                    let label = player
                        .plate
                        .clone()
                        .or_else(|| player.vehicle.clone())
                        .unwrap_or_else(|| player.identifier.clone());
                    set.players.push(Marker {
                        key: player.identifier.clone(),
                        label,
                        pos,
                        heading: Some(player.heading),
                        detail: player.weapon.clone(),
                    });
                }
            }
        }

        let mut call_keys = HashSet::new();
        for call in calls {
            if !call_keys.insert(call.id.clone()) {
                continue;
            }
            set.calls.push(Marker {
                key: call.id.clone(),
                label: call.label.clone(),
                pos: self.projector.to_map_space(call.x, call.y),
                heading: None,
                detail: None,
            });
        }

        let mut furniture_keys = HashSet::new();
        for fixture in &self.furniture {
            if !furniture_keys.insert(fixture.id.clone()) {
                continue;
            }
            set.furniture.push(Marker {
                key: fixture.id.clone(),
                label: fixture
                    .label
                    .clone()
                    .unwrap_or_else(|| fixture.category.clone()),
                pos: self.projector.to_map_space(fixture.x, fixture.y),
                heading: None,
                detail: Some(fixture.category.clone()),
            });
        }

        let mut sign_keys = HashSet::new();
        for sign in signs {
            if !sign_keys.insert(sign.id.clone()) {
                continue;
            }
            set.signage.push(Marker {
                key: sign.id.clone(),
                label: sign.applied.lanes.join(" | "),
                pos: self.projector.to_map_space(sign.x, sign.y),
                heading: None,
                detail: (!sign.applied.text.is_empty()).then(|| sign.applied.text.join(" ")),
            });
        }

        set
    }
}

pub fn load_static_markers(path: &Path) -> Result<Vec<StaticMarker>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed reading static marker catalogue at {}", path.display()))?;
    let markers = serde_json::from_str::<Vec<StaticMarker>>(&text)
        .with_context(|| format!("invalid static marker catalogue at {}", path.display()))?;
    info!(markers = markers.len(), path = %path.display(), "loaded static marker catalogue");
    Ok(markers)
}
