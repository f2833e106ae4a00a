use thiserror::Error;

/// Connection-level failures surfaced to the operator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("endpoint unreachable: {0}")]
    Unreachable(String),
    #[error("secure-context policy rejected endpoint: {0}")]
    SecurityPolicy(String),
}

impl ConnectionError {
    /// Actionable remediation shown next to the failure.
    pub fn remediation(&self) -> &'static str {
        match self {
            Self::Unreachable(_) => "check that the game server plugin is running, or select a different endpoint",
            Self::SecurityPolicy(_) => "select a secure (wss://) endpoint or disable require_secure_transport",
        }
    }
}

/// Inbound frames that cannot be parsed against the catalogue. Dropped and
/// counted, never fatal.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("payload is not a frame envelope: {0}")]
    NotAnEnvelope(String),
    #[error("unknown topic: {0}")]
    UnknownTopic(String),
    #[error("malformed {topic} payload: {reason}")]
    MalformedPayload { topic: String, reason: String },
}

/// Account lookup failures. Degrade the entry to telemetry-only display.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("account lookup failed: {0}")]
    Lookup(String),
    #[error("account lookup timed out after {0}ms")]
    TimedOut(u64),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("no endpoint selected")]
    NoEndpointSelected,
}

#[cfg(test)]
mod tests {
    use super::{ConnectionError, ProtocolError};

    #[test]
    fn connection_errors_carry_remediation() {
        let unreachable = ConnectionError::Unreachable("ws://10.0.0.1:30121".to_owned());
        assert!(unreachable.remediation().contains("endpoint"));
        let policy = ConnectionError::SecurityPolicy("ws://10.0.0.1:30121".to_owned());
        assert!(policy.remediation().contains("wss://"));
    }

    #[test]
    fn protocol_errors_name_the_topic() {
        let err = ProtocolError::MalformedPayload {
            topic: "player-data".to_owned(),
            reason: "expected an array".to_owned(),
        };
        assert!(err.to_string().contains("player-data"));
    }
}
