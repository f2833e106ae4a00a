use chrono::{DateTime, Utc};
use crossbeam_channel::Sender;
use tracing::{error, info, warn};

use crate::channel::TelemetryChannel;
use crate::error::{ConfigurationError, ConnectionError};
use crate::events::{ConnectionState, EngineEvent};
use crate::protocol::OutboundFrame;

#[derive(Debug, Clone)]
pub struct SupervisorStatus {
    pub state: ConnectionState,
    pub endpoint: Option<String>,
    pub last_error: Option<ConnectionError>,
    pub connected_at: Option<DateTime<Utc>>,
    pub dropped_frames: u64,
}

/// Top-level lifecycle owner: endpoint selection, connect, teardown and
/// failure classification. Exactly one channel object is live at any time;
/// every teardown emits a channel-replaced event so dependents flush their
/// per-channel state. Transport and security failures park the supervisor in
/// `Errored` until an explicit re-selection or reconnect; there is no silent
/// retry loop against a misconfigured endpoint.
pub struct ConnectionSupervisor {
    endpoints: Vec<String>,
    selected: Option<String>,
    require_secure: bool,
    channel: Option<TelemetryChannel>,
    state: ConnectionState,
    last_error: Option<ConnectionError>,
    connected_at: Option<DateTime<Utc>>,
    // Per-connection guard for the security remediation hint, reset on every
    // connect attempt. Replaces the legacy module-global "already warned"
    // flag.
    security_warning_issued: bool,
    events: Sender<EngineEvent>,
}

impl ConnectionSupervisor {
    pub fn new(
        endpoints: Vec<String>,
        selected: Option<String>,
        require_secure: bool,
        events: Sender<EngineEvent>,
    ) -> Self {
        Self {
            endpoints,
            selected,
            require_secure,
            channel: None,
            state: ConnectionState::Disconnected,
            last_error: None,
            connected_at: None,
            security_warning_issued: false,
            events,
        }
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    pub fn selected_endpoint(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Switches the candidate endpoint. A live channel is torn down and all
    /// per-channel state flushed immediately; connecting to the new endpoint
    /// requires an explicit `connect()`.
    pub fn select_endpoint(&mut self, url: &str) {
        let url = url.trim().to_owned();
        if self.selected.as_deref() == Some(url.as_str()) && self.channel.is_some() {
            return;
        }
        self.teardown_channel();
        info!(endpoint = %url, "selected telemetry endpoint");
        self.selected = Some(url);
        self.last_error = None;
        self.set_state(ConnectionState::Disconnected, None);
    }

    /// Opens a channel to the selected endpoint. Configuration problems are
    /// returned; transport failures are classified and surfaced through the
    /// status stream, leaving the supervisor in `Errored`.
    pub async fn connect(&mut self) -> Result<(), ConfigurationError> {
        let Some(url) = self.selected.clone() else {
            warn!("connect requested with no endpoint selected");
            return Err(ConfigurationError::NoEndpointSelected);
        };
        self.teardown_channel();
        self.security_warning_issued = false;
        self.set_state(ConnectionState::Connecting, None);

        if self.require_secure && !url.starts_with("wss://") {
            let failure = ConnectionError::SecurityPolicy(format!(
                "{url}: insecure endpoint while secure transport is required"
            ));
            self.report_failure(failure);
            return Ok(());
        }

        match TelemetryChannel::open(&url, self.events.clone()).await {
            Ok(channel) => {
                self.channel = Some(channel);
                self.connected_at = Some(Utc::now());
                self.set_state(ConnectionState::Connected, None);
            }
            Err(failure) => {
                self.report_failure(failure);
            }
        }
        Ok(())
    }

    pub fn disconnect(&mut self) {
        self.teardown_channel();
        self.set_state(ConnectionState::Disconnected, None);
    }

    pub fn status(&self) -> SupervisorStatus {
        SupervisorStatus {
            state: self.state,
            endpoint: self.selected.clone(),
            last_error: self.last_error.clone(),
            connected_at: self.connected_at,
            dropped_frames: self
                .channel
                .as_ref()
                .map(TelemetryChannel::dropped_frames)
                .unwrap_or(0),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_some() && self.state == ConnectionState::Connected
    }

    /// Forwards an outbound frame to the live channel, if any.
    pub fn send(&self, frame: OutboundFrame) -> bool {
        match &self.channel {
            Some(channel) => channel.send(frame),
            None => {
                warn!("dropping outbound frame; no live channel");
                false
            }
        }
    }

    fn teardown_channel(&mut self) {
        if let Some(channel) = self.channel.take() {
            info!(endpoint = %channel.url(), "tearing down telemetry channel");
            channel.close();
            self.connected_at = None;
            if self.events.send(EngineEvent::ChannelReplaced).is_err() {
                warn!("engine receiver dropped during channel teardown");
            }
        }
    }

    fn report_failure(&mut self, failure: ConnectionError) {
        if !self.security_warning_issued {
            error!(
                error = %failure,
                remediation = failure.remediation(),
                "telemetry connection failed"
            );
            self.security_warning_issued = true;
        }
        self.last_error = Some(failure.clone());
        self.set_state(ConnectionState::Errored, Some(failure));
    }

    fn set_state(&mut self, state: ConnectionState, error: Option<ConnectionError>) {
        self.state = state;
        let _ = self.events.send(EngineEvent::Status {
            state,
            endpoint: self.selected.clone(),
            error,
            at: Utc::now(),
        });
    }
}
