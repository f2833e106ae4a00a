use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::protocol::OutboundFrame;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignKind {
    Smart,
    SmartMotorway,
}

impl SignKind {
    /// Only motorway signage accepts remote edits.
    pub fn is_editable(self) -> bool {
        matches!(self, Self::SmartMotorway)
    }
}

/// Mutable display configuration: one indicator string per lane (speed,
/// "X" closure, blank) plus free-text lines.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SignConfig {
    pub lanes: Vec<String>,
    pub text: Vec<String>,
}

/// One entry of the authoritative `signage-initial-state` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignSnapshot {
    pub id: String,
    pub kind: SignKind,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub lanes: Vec<String>,
    #[serde(default)]
    pub text: Vec<String>,
}

impl SignSnapshot {
    fn config(&self) -> SignConfig {
        SignConfig {
            lanes: self.lanes.clone(),
            text: self.text.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignSync {
    Synced,
    PendingLocalEdit {
        pending: SignConfig,
        sent_at: DateTime<Utc>,
    },
    Confirmed,
    Reverted,
}

#[derive(Debug, Clone)]
pub struct SignageItem {
    pub id: String,
    pub kind: SignKind,
    pub x: f64,
    pub y: f64,
    /// What the map renders right now. Tracks local edits optimistically.
    pub applied: SignConfig,
    /// The last configuration confirmed by the plugin. Always wins a conflict.
    pub authoritative: SignConfig,
    pub sync: SignSync,
    pub(crate) seq: u64,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignEditRejected {
    #[error("unknown sign: {0}")]
    UnknownSign(String),
    #[error("sign {0} is not remotely editable")]
    NotEditable(String),
}

/// Tracks live signage and mediates every mutation the UI can see. Local
/// edits go out optimistically and are confirmed or reverted by the next
/// authoritative frame; an edit whose echo never arrives is reverted after a
/// bounded timeout.
#[derive(Debug)]
pub struct SignageControlPlane {
    signs: HashMap<String, SignageItem>,
    next_seq: u64,
    confirm_timeout: Duration,
}

impl SignageControlPlane {
    pub fn new(confirm_timeout_secs: u64) -> Self {
        Self {
            signs: HashMap::new(),
            next_seq: 0,
            confirm_timeout: Duration::seconds(confirm_timeout_secs.min(i64::MAX as u64) as i64),
        }
    }

    pub fn len(&self) -> usize {
        self.signs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signs.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&SignageItem> {
        self.signs.get(id)
    }

    /// Applies an authoritative signage array. The plugin sends the full set
    /// once after connect and re-broadcasts it on any change; signs never
    /// disappear from the set mid-session, so absent ids are left alone.
    pub fn apply_authoritative(&mut self, snapshot: &[SignSnapshot]) {
        for entry in snapshot {
            let config = entry.config();
            match self.signs.get_mut(&entry.id) {
                None => {
                    let seq = self.next_seq;
                    self.next_seq += 1;
                    self.signs.insert(
                        entry.id.clone(),
                        SignageItem {
                            id: entry.id.clone(),
                            kind: entry.kind,
                            x: entry.x,
                            y: entry.y,
                            applied: config.clone(),
                            authoritative: config,
                            sync: SignSync::Synced,
                            seq,
                        },
                    );
                }
                Some(item) => {
                    item.authoritative = config.clone();
                    match &item.sync {
                        SignSync::PendingLocalEdit { pending, .. } => {
                            if *pending == config {
                                item.sync = SignSync::Confirmed;
                            } else {
                                info!(sign = %item.id, "authoritative frame overrode local edit");
                                item.sync = SignSync::Reverted;
                            }
                            item.applied = config;
                        }
                        _ => {
                            item.applied = config;
                        }
                    }
                }
            }
        }
    }

    /// Applies a local edit optimistically and returns the outbound frame to
    /// send. The rendered configuration changes immediately; the sync state
    /// waits on the authoritative echo.
    pub fn apply_local_edit(
        &mut self,
        id: &str,
        config: SignConfig,
        now: DateTime<Utc>,
    ) -> Result<OutboundFrame, SignEditRejected> {
        let Some(item) = self.signs.get_mut(id) else {
            return Err(SignEditRejected::UnknownSign(id.to_owned()));
        };
        if !item.kind.is_editable() {
            return Err(SignEditRejected::NotEditable(id.to_owned()));
        }
        item.applied = config.clone();
        item.sync = SignSync::PendingLocalEdit {
            pending: config.clone(),
            sent_at: now,
        };
        Ok(OutboundFrame::SignageUpdate {
            id: id.to_owned(),
            config,
        })
    }

    /// Reverts pending edits whose authoritative echo never arrived. Returns
    /// the ids that were reverted.
    pub fn expire_pending(&mut self, now: DateTime<Utc>) -> Vec<String> {
        let mut reverted = Vec::new();
        for item in self.signs.values_mut() {
            if let SignSync::PendingLocalEdit { sent_at, .. } = &item.sync {
                if now - *sent_at >= self.confirm_timeout {
                    warn!(sign = %item.id, "signage edit echo lost; reverting to authoritative configuration");
                    item.applied = item.authoritative.clone();
                    item.sync = SignSync::Reverted;
                    reverted.push(item.id.clone());
                }
            }
        }
        reverted
    }

    /// Collapses the transient `Confirmed`/`Reverted` states back to
    /// `Synced` once the change has been rendered.
    pub fn settle_transients(&mut self) {
        for item in self.signs.values_mut() {
            if matches!(item.sync, SignSync::Confirmed | SignSync::Reverted) {
                item.sync = SignSync::Synced;
            }
        }
    }

    /// Insertion-ordered copy of the current signage set.
    pub fn snapshot(&self) -> Vec<SignageItem> {
        let mut items: Vec<SignageItem> = self.signs.values().cloned().collect();
        items.sort_by_key(|item| item.seq);
        items
    }

    pub fn clear(&mut self) {
        self.signs.clear();
        self.next_seq = 0;
    }
}
