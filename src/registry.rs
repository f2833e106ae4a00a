use std::collections::HashMap;

use crate::ident::ResolvedIdentity;
use crate::protocol::RawTelemetryFrame;

/// Tagged identity union: a registry entry is exactly one of these, never a
/// partial mix.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerIdentity {
    TelemetryOnly,
    Resolved(ResolvedIdentity),
}

#[derive(Debug, Clone)]
pub struct MapPlayer {
    pub identifier: String,
    pub identifiers: Vec<String>,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub heading: f64,
    pub vehicle: Option<String>,
    pub weapon: Option<String>,
    pub plate: Option<String>,
    pub identity: PlayerIdentity,
    pub(crate) seq: u64,
}

impl MapPlayer {
    pub fn is_resolved(&self) -> bool {
        matches!(self.identity, PlayerIdentity::Resolved(_))
    }

    fn apply_telemetry(&mut self, frame: &RawTelemetryFrame) {
        self.identifiers = frame.identifiers.clone();
        self.x = frame.x;
        self.y = frame.y;
        self.z = frame.z;
        self.heading = frame.heading;
        self.vehicle = frame.vehicle.clone();
        self.weapon = frame.weapon.clone();
        self.plate = frame.plate.clone();
    }
}

/// Authoritative in-memory table of currently visible entities. Mutated only
/// by channel events and resolution completions; identifier uniqueness is
/// guaranteed by the keying.
#[derive(Debug, Default)]
pub struct PlayerRegistry {
    entries: HashMap<String, MapPlayer>,
    next_seq: u64,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a telemetry-only entry on first sight, or overwrites the
    /// telemetry fields of an existing entry while preserving any resolved
    /// identity and the insertion sequence. Returns true when the entry is
    /// new.
    pub fn upsert(&mut self, frame: &RawTelemetryFrame) -> bool {
        match self.entries.get_mut(&frame.identifier) {
            Some(entry) => {
                entry.apply_telemetry(frame);
                false
            }
            None => {
                let seq = self.next_seq;
                self.next_seq += 1;
                self.entries.insert(
                    frame.identifier.clone(),
                    MapPlayer {
                        identifier: frame.identifier.clone(),
                        identifiers: frame.identifiers.clone(),
                        x: frame.x,
                        y: frame.y,
                        z: frame.z,
                        heading: frame.heading,
                        vehicle: frame.vehicle.clone(),
                        weapon: frame.weapon.clone(),
                        plate: frame.plate.clone(),
                        identity: PlayerIdentity::TelemetryOnly,
                        seq,
                    },
                );
                true
            }
        }
    }

    pub fn remove(&mut self, identifier: &str) -> bool {
        self.entries.remove(identifier).is_some()
    }

    /// Attaches a resolved identity to an existing entry. A no-op when the
    /// identifier already left: a late resolution must never resurrect an
    /// entry.
    pub fn patch_resolved(&mut self, identifier: &str, identity: ResolvedIdentity) -> bool {
        match self.entries.get_mut(identifier) {
            Some(entry) => {
                entry.identity = PlayerIdentity::Resolved(identity);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, identifier: &str) -> Option<&MapPlayer> {
        self.entries.get(identifier)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insertion-ordered copy for read-only consumers.
    pub fn snapshot(&self) -> Vec<MapPlayer> {
        let mut players: Vec<MapPlayer> = self.entries.values().cloned().collect();
        players.sort_by_key(|player| player.seq);
        players
    }

    /// Full flush; used only on channel replacement.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.next_seq = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::{PlayerIdentity, PlayerRegistry};
    use crate::ident::ResolvedIdentity;
    use crate::protocol::RawTelemetryFrame;

    fn frame(identifier: &str, x: f64, y: f64) -> RawTelemetryFrame {
        RawTelemetryFrame {
            identifier: identifier.to_owned(),
            identifiers: Vec::new(),
            x,
            y,
            z: 0.0,
            heading: 90.0,
            vehicle: None,
            weapon: None,
            plate: None,
        }
    }

    fn identity(name: &str) -> ResolvedIdentity {
        ResolvedIdentity {
            account_id: 7,
            display_name: name.to_owned(),
            permission_tier: 2,
            active_unit: None,
        }
    }

    #[test]
    fn consecutive_frames_for_one_identifier_keep_one_entry() {
        let mut registry = PlayerRegistry::new();
        registry.upsert(&frame("acct:01100001001101000011", 100.0, 200.0));
        registry.upsert(&frame("acct:01100001001101000011", 150.0, 250.0));

        assert_eq!(registry.len(), 1);
        let entry = registry
            .get("acct:01100001001101000011")
            .expect("entry should exist");
        assert_eq!(entry.x, 150.0);
        assert_eq!(entry.y, 250.0);
    }

    #[test]
    fn upsert_is_idempotent() {
        let mut registry = PlayerRegistry::new();
        let tick = frame("license:abc", 5.0, 6.0);
        registry.upsert(&tick);
        let snapshot_once = registry.snapshot();
        registry.upsert(&tick);
        let snapshot_twice = registry.snapshot();

        assert_eq!(snapshot_once.len(), snapshot_twice.len());
        assert_eq!(snapshot_once[0].x, snapshot_twice[0].x);
        assert_eq!(snapshot_once[0].seq, snapshot_twice[0].seq);
        assert_eq!(
            snapshot_once[0].identity,
            snapshot_twice[0].identity
        );
    }

    #[test]
    fn no_duplicate_identifiers_after_any_sequence() {
        let mut registry = PlayerRegistry::new();
        for _ in 0..3 {
            registry.upsert(&frame("license:a", 1.0, 1.0));
            registry.upsert(&frame("license:b", 2.0, 2.0));
            registry.remove("license:a");
            registry.upsert(&frame("license:a", 3.0, 3.0));
        }
        let snapshot = registry.snapshot();
        let mut identifiers: Vec<&str> = snapshot
            .iter()
            .map(|player| player.identifier.as_str())
            .collect();
        identifiers.sort_unstable();
        identifiers.dedup();
        assert_eq!(identifiers.len(), snapshot.len());
    }

    #[test]
    fn upsert_preserves_a_resolved_identity() {
        let mut registry = PlayerRegistry::new();
        registry.upsert(&frame("acct:ff", 1.0, 1.0));
        assert!(registry.patch_resolved("acct:ff", identity("PC Danvers")));
        registry.upsert(&frame("acct:ff", 9.0, 9.0));

        let entry = registry.get("acct:ff").expect("entry should exist");
        assert_eq!(entry.x, 9.0);
        match &entry.identity {
            PlayerIdentity::Resolved(resolved) => {
                assert_eq!(resolved.display_name, "PC Danvers");
            }
            PlayerIdentity::TelemetryOnly => panic!("identity should survive telemetry upserts"),
        }
    }

    #[test]
    fn late_resolution_never_resurrects_a_departed_entry() {
        let mut registry = PlayerRegistry::new();
        registry.upsert(&frame("acct:ff", 1.0, 1.0));
        registry.remove("acct:ff");

        assert!(!registry.patch_resolved("acct:ff", identity("PC Danvers")));
        assert!(registry.is_empty());
    }

    #[test]
    fn clear_flushes_everything() {
        let mut registry = PlayerRegistry::new();
        for n in 0..32 {
            registry.upsert(&frame(&format!("license:{n}"), n as f64, 0.0));
        }
        assert_eq!(registry.len(), 32);
        registry.clear();
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn snapshot_is_insertion_ordered() {
        let mut registry = PlayerRegistry::new();
        registry.upsert(&frame("license:c", 1.0, 1.0));
        registry.upsert(&frame("license:a", 2.0, 2.0));
        registry.upsert(&frame("license:b", 3.0, 3.0));
        // Re-upserting must not move an entry to the back.
        registry.upsert(&frame("license:c", 4.0, 4.0));

        let snapshot = registry.snapshot();
        let order: Vec<&str> = snapshot
            .iter()
            .map(|player| player.identifier.as_str())
            .collect();
        assert_eq!(order, vec!["license:c", "license:a", "license:b"]);
    }
}
