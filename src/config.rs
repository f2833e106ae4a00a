use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::projection::ProjectionConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveMapConfig {
    /// Candidate plugin endpoints; which one is selected persists here so a
    /// restart reconnects to the same server.
    pub endpoints: Vec<String>,
    pub selected_endpoint: Option<String>,
    pub require_secure_transport: bool,
    pub lookup_base_url: String,
    pub lookup_timeout_ms: u64,
    pub signage_confirm_timeout_secs: u64,
    pub tick_interval_ms: u64,
    pub snapshot_log_interval_secs: u64,
    pub static_marker_catalogue: Option<PathBuf>,
    pub projection: ProjectionConfig,
}

impl Default for LiveMapConfig {
    fn default() -> Self {
        Self {
            endpoints: vec!["ws://127.0.0.1:30121/livemap".to_owned()],
            selected_endpoint: None,
            require_secure_transport: false,
            lookup_base_url: "http://127.0.0.1:3000".to_owned(),
            lookup_timeout_ms: 4_000,
            signage_confirm_timeout_secs: 10,
            tick_interval_ms: 250,
            snapshot_log_interval_secs: 30,
            static_marker_catalogue: None,
            projection: ProjectionConfig::default(),
        }
    }
}

impl LiveMapConfig {
    pub fn load_or_create() -> Result<(Self, PathBuf)> {
        let config_dir = dirs::config_dir()
            .context("unable to locate OS config directory")?
            .join("dispatch-livemap");
        fs::create_dir_all(&config_dir)
            .with_context(|| format!("failed creating config dir at {}", config_dir.display()))?;

        let config_path = config_dir.join("config.json");
        if !config_path.exists() {
            let default = Self::default();
            default.save(&config_path)?;
            return Ok((default, config_path));
        }

        let text = fs::read_to_string(&config_path)
            .with_context(|| format!("failed reading {}", config_path.display()))?;
        let config = serde_json::from_str::<Self>(&text)
            .with_context(|| format!("invalid json in {}", config_path.display()))?;
        Ok((config, config_path))
    }

    pub fn save(&self, path: &PathBuf) -> Result<()> {
        let payload = serde_json::to_string_pretty(self).context("failed serializing config")?;
        fs::write(path, payload).with_context(|| format!("failed writing {}", path.display()))?;
        Ok(())
    }

    /// The endpoint a fresh session should dial: the persisted selection if
    /// it still exists in the candidate list, else the first candidate.
    pub fn initial_endpoint(&self) -> Option<String> {
        self.selected_endpoint
            .as_ref()
            .filter(|selected| self.endpoints.iter().any(|candidate| candidate == *selected))
            .cloned()
            .or_else(|| self.endpoints.first().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::LiveMapConfig;

    #[test]
    fn parses_partial_config_with_defaults() {
        let raw = r#"{
            "endpoints": ["wss://rp.example.org:30121/livemap"],
            "require_secure_transport": true
        }"#;
        let parsed: LiveMapConfig = serde_json::from_str(raw).expect("config should parse");
        assert!(parsed.require_secure_transport);
        assert_eq!(parsed.lookup_timeout_ms, 4_000);
        assert_eq!(parsed.signage_confirm_timeout_secs, 10);
        assert_eq!(parsed.projection.tile_size, 256);
        assert!(parsed.selected_endpoint.is_none());
    }

    #[test]
    fn initial_endpoint_prefers_a_valid_persisted_selection() {
        let mut config = LiveMapConfig::default();
        config.endpoints = vec![
            "ws://a.example:30121/livemap".to_owned(),
            "ws://b.example:30121/livemap".to_owned(),
        ];
        config.selected_endpoint = Some("ws://b.example:30121/livemap".to_owned());
        assert_eq!(
            config.initial_endpoint().as_deref(),
            Some("ws://b.example:30121/livemap")
        );

        // A stale selection falls back to the first candidate.
        config.selected_endpoint = Some("ws://gone.example:30121/livemap".to_owned());
        assert_eq!(
            config.initial_endpoint().as_deref(),
            Some("ws://a.example:30121/livemap")
        );
    }

    #[test]
    fn round_trips_through_json() {
        let config = LiveMapConfig::default();
        let text = serde_json::to_string_pretty(&config).expect("config should serialize");
        let parsed: LiveMapConfig = serde_json::from_str(&text).expect("config should parse back");
        assert_eq!(parsed.endpoints, config.endpoints);
        assert_eq!(parsed.tick_interval_ms, config.tick_interval_ms);
    }
}
