use std::{collections::HashMap, sync::Arc, time::Duration};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use crossbeam_channel::Sender;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::ResolutionError;
use crate::events::EngineEvent;

const PLATFORM_SCHEME: &str = "acct:";
const LICENSE_SCHEME: &str = "license:";
const CHAT_SCHEME: &str = "chat:";

/// On-duty unit record attached to a resolved account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActiveUnit {
    Officer {
        id: i64,
        callsign: String,
    },
    EmsFdDeputy {
        id: i64,
        callsign: String,
    },
    CombinedUnit {
        id: i64,
        callsign: String,
        #[serde(default)]
        members: Vec<String>,
    },
}

impl ActiveUnit {
    pub fn callsign(&self) -> &str {
        match self {
            Self::Officer { callsign, .. }
            | Self::EmsFdDeputy { callsign, .. }
            | Self::CombinedUnit { callsign, .. } => callsign,
        }
    }
}

/// Persistent-account view returned by the records app.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedIdentity {
    pub account_id: i64,
    pub display_name: String,
    pub permission_tier: u8,
    #[serde(default)]
    pub active_unit: Option<ActiveUnit>,
}

/// Identifier schemes observed on telemetry frames, in precedence order:
/// platform account first, then licensing, then third-party chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentifierScheme {
    /// Canonical decimal account number, converted exactly from the
    /// fixed-width hex token.
    PlatformAccount(String),
    License(String),
    Chat(String),
}

impl IdentifierScheme {
    fn rank(&self) -> u8 {
        match self {
            Self::PlatformAccount(_) => 0,
            Self::License(_) => 1,
            Self::Chat(_) => 2,
        }
    }

    /// The key handed to the lookup collaborator.
    pub fn canonical_id(&self) -> &str {
        match self {
            Self::PlatformAccount(decimal) => decimal,
            Self::License(raw) | Self::Chat(raw) => raw,
        }
    }
}

/// Converts a platform-account hex token to its canonical decimal form. The
/// value routinely exceeds 64 bits, so the conversion runs on `BigUint` and
/// is exact for any width.
pub fn canonical_account_number(hex_token: &str) -> Option<String> {
    let token = hex_token.trim();
    if token.is_empty() || !token.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return None;
    }
    BigUint::parse_bytes(token.as_bytes(), 16).map(|value| value.to_string())
}

pub fn classify_identifier(raw: &str) -> Option<IdentifierScheme> {
    let raw = raw.trim();
    if let Some(hex_token) = raw.strip_prefix(PLATFORM_SCHEME) {
        return canonical_account_number(hex_token).map(IdentifierScheme::PlatformAccount);
    }
    if raw.strip_prefix(LICENSE_SCHEME).is_some_and(|t| !t.is_empty()) {
        return Some(IdentifierScheme::License(raw.to_owned()));
    }
    if raw.strip_prefix(CHAT_SCHEME).is_some_and(|t| !t.is_empty()) {
        return Some(IdentifierScheme::Chat(raw.to_owned()));
    }
    None
}

/// Picks the highest-precedence recognized scheme from a frame's identifier
/// set. Frames with no recognized scheme stay permanently telemetry-only.
pub fn select_scheme<'a>(identifiers: impl IntoIterator<Item = &'a str>) -> Option<IdentifierScheme> {
    identifiers
        .into_iter()
        .filter_map(classify_identifier)
        .min_by_key(IdentifierScheme::rank)
}

/// Account/unit lookup collaborator owned by the records app. Side-effect
/// free; one call per canonical id.
#[async_trait]
pub trait AccountLookup: Send + Sync {
    async fn lookup_account_by_canonical_id(
        &self,
        canonical_id: &str,
    ) -> Result<Option<ResolvedIdentity>>;
}

#[derive(Debug, Clone)]
pub enum ResolutionOutcome {
    Found(ResolvedIdentity),
    NotFound,
    Failed(ResolutionError),
}

#[derive(Debug, Clone)]
enum CacheState {
    InFlight,
    Resolved(Option<ResolvedIdentity>),
}

/// Resolves ephemeral identifiers to persistent identities. Outcomes are
/// cached per ephemeral identifier (including definitive not-found) and
/// concurrent requests for the same identifier coalesce into one in-flight
/// lookup. Lookup errors and timeouts are soft: they produce no cache entry,
/// so a later frame may retry.
pub struct IdentityResolver {
    lookup: Arc<dyn AccountLookup>,
    events: Sender<EngineEvent>,
    lookup_timeout: Duration,
    cache: HashMap<String, CacheState>,
}

impl IdentityResolver {
    pub fn new(
        lookup: Arc<dyn AccountLookup>,
        events: Sender<EngineEvent>,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            lookup,
            events,
            lookup_timeout,
            cache: HashMap::new(),
        }
    }

    /// Requests resolution for an identifier. Returns the identity right away
    /// on a cache hit; otherwise either coalesces into the in-flight lookup
    /// or spawns a new one whose outcome arrives as an engine event.
    pub fn request(&mut self, identifier: &str, extra_identifiers: &[String]) -> Option<ResolvedIdentity> {
        match self.cache.get(identifier) {
            Some(CacheState::InFlight) => return None,
            Some(CacheState::Resolved(cached)) => return cached.clone(),
            None => {}
        }

        let candidates = std::iter::once(identifier)
            .chain(extra_identifiers.iter().map(String::as_str));
        let Some(scheme) = select_scheme(candidates) else {
            debug!(identifier = %identifier, "no recognized identifier scheme; staying telemetry-only");
            self.cache
                .insert(identifier.to_owned(), CacheState::Resolved(None));
            return None;
        };

        self.cache
            .insert(identifier.to_owned(), CacheState::InFlight);
        let lookup = Arc::clone(&self.lookup);
        let events = self.events.clone();
        let deadline = self.lookup_timeout;
        let identifier = identifier.to_owned();
        let canonical = scheme.canonical_id().to_owned();
        tokio::spawn(async move {
            let outcome = run_lookup(lookup, &canonical, deadline).await;
            if events
                .send(EngineEvent::Resolved {
                    identifier,
                    outcome,
                })
                .is_err()
            {
                warn!("engine receiver dropped; discarding resolution outcome");
            }
        });
        None
    }

    /// Records a completed lookup. Soft failures are forgotten so later
    /// frames can retry; found/not-found outcomes stick for the lifetime of
    /// the registry entry.
    pub fn complete(&mut self, identifier: &str, outcome: &ResolutionOutcome) {
        if !self.cache.contains_key(identifier) {
            // The identifier left (or the channel was replaced) while the
            // lookup was in flight; nothing to record.
            return;
        }
        match outcome {
            ResolutionOutcome::Found(identity) => {
                self.cache.insert(
                    identifier.to_owned(),
                    CacheState::Resolved(Some(identity.clone())),
                );
            }
            ResolutionOutcome::NotFound => {
                self.cache
                    .insert(identifier.to_owned(), CacheState::Resolved(None));
            }
            ResolutionOutcome::Failed(err) => {
                warn!(identifier = %identifier, error = %err, "account lookup failed; entry stays telemetry-only");
                self.cache.remove(identifier);
            }
        }
    }

    /// Drops the cached outcome when its registry entry goes away.
    pub fn forget(&mut self, identifier: &str) {
        self.cache.remove(identifier);
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }

    #[cfg(test)]
    fn cached_len(&self) -> usize {
        self.cache.len()
    }
}

async fn run_lookup(
    lookup: Arc<dyn AccountLookup>,
    canonical_id: &str,
    deadline: Duration,
) -> ResolutionOutcome {
    match timeout(deadline, lookup.lookup_account_by_canonical_id(canonical_id)).await {
        Err(_) => ResolutionOutcome::Failed(ResolutionError::TimedOut(deadline.as_millis() as u64)),
        Ok(Err(err)) => ResolutionOutcome::Failed(ResolutionError::Lookup(err.to_string())),
        Ok(Ok(Some(identity))) => ResolutionOutcome::Found(identity),
        Ok(Ok(None)) => ResolutionOutcome::NotFound,
    }
}

/// Production lookup against the records app's REST surface.
pub struct HttpAccountLookup {
    base_url: String,
    client: reqwest::Client,
}

impl HttpAccountLookup {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_owned();
        if base_url.is_empty() {
            return Err(anyhow!("lookup base url is empty"));
        }
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .context("failed building account lookup client")?;
        Ok(Self { base_url, client })
    }
}

#[async_trait]
impl AccountLookup for HttpAccountLookup {
    async fn lookup_account_by_canonical_id(
        &self,
        canonical_id: &str,
    ) -> Result<Option<ResolvedIdentity>> {
        let url = format!("{}/api/livemap/accounts/{canonical_id}", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("account lookup request failed: {url}"))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response
            .error_for_status()
            .with_context(|| format!("account lookup rejected: {url}"))?;
        let identity = response
            .json::<Option<ResolvedIdentity>>()
            .await
            .with_context(|| format!("account lookup returned invalid json: {url}"))?;
        Ok(identity)
    }
}
