use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::ProtocolError;
use crate::signage::{SignConfig, SignSnapshot};

pub const TOPIC_PLAYER_DATA: &str = "player-data";
pub const TOPIC_PLAYER_LEFT: &str = "player-left";
pub const TOPIC_SIGNAGE_STATE: &str = "signage-initial-state";
pub const TOPIC_SIGNAGE_UPDATE: &str = "signage-update";

/// One tick of positional state for one in-game entity, exactly as the
/// plugin sends it. Never persisted past the registry entry it updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTelemetryFrame {
    pub identifier: String,
    /// Secondary session identifiers, when the plugin knows more than one.
    #[serde(default)]
    pub identifiers: Vec<String>,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
    #[serde(default)]
    pub heading: f64,
    #[serde(default)]
    pub vehicle: Option<String>,
    #[serde(default)]
    pub weapon: Option<String>,
    #[serde(default)]
    pub plate: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FrameEnvelope {
    topic: String,
    #[serde(default)]
    payload: Value,
}

#[derive(Debug, Clone)]
pub enum InboundFrame {
    PlayerData(Vec<RawTelemetryFrame>),
    PlayerLeft(String),
    SignageState(Vec<SignSnapshot>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutboundFrame {
    SignageUpdate { id: String, config: SignConfig },
}

impl OutboundFrame {
    pub fn topic(&self) -> &'static str {
        match self {
            Self::SignageUpdate { .. } => TOPIC_SIGNAGE_UPDATE,
        }
    }

    pub fn to_wire(&self) -> String {
        match self {
            Self::SignageUpdate { id, config } => json!({
                "topic": TOPIC_SIGNAGE_UPDATE,
                "payload": {
                    "id": id,
                    "lanes": config.lanes,
                    "text": config.text,
                },
            })
            .to_string(),
        }
    }
}

pub fn parse_inbound(text: &str) -> Result<InboundFrame, ProtocolError> {
    let envelope = serde_json::from_str::<FrameEnvelope>(text)
        .map_err(|err| ProtocolError::NotAnEnvelope(err.to_string()))?;
    match envelope.topic.as_str() {
        TOPIC_PLAYER_DATA => {
            let frames = serde_json::from_value::<Vec<RawTelemetryFrame>>(envelope.payload)
                .map_err(|err| malformed(TOPIC_PLAYER_DATA, err))?;
            Ok(InboundFrame::PlayerData(frames))
        }
        TOPIC_PLAYER_LEFT => {
            let identifier = serde_json::from_value::<String>(envelope.payload)
                .map_err(|err| malformed(TOPIC_PLAYER_LEFT, err))?;
            Ok(InboundFrame::PlayerLeft(identifier))
        }
        TOPIC_SIGNAGE_STATE => {
            let signs = serde_json::from_value::<Vec<SignSnapshot>>(envelope.payload)
                .map_err(|err| malformed(TOPIC_SIGNAGE_STATE, err))?;
            Ok(InboundFrame::SignageState(signs))
        }
        other => Err(ProtocolError::UnknownTopic(other.to_owned())),
    }
}

fn malformed(topic: &str, err: serde_json::Error) -> ProtocolError {
    ProtocolError::MalformedPayload {
        topic: topic.to_owned(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_inbound, InboundFrame, OutboundFrame};
    use crate::error::ProtocolError;
    use crate::signage::{SignConfig, SignKind};

    #[test]
    fn parses_player_data_batch() {
        let payload = r#"{
            "topic": "player-data",
            "payload": [
                {
                    "identifier": "acct:01100001001101000011",
                    "identifiers": ["license:2f9a44", "chat:99120"],
                    "x": -1823.4,
                    "y": 412.9,
                    "z": 31.2,
                    "heading": 182.0,
                    "vehicle": "Patrol Interceptor",
                    "plate": "LC54 XRD"
                },
                { "identifier": "license:77aa01", "x": 10.0, "y": -4.5 }
            ]
        }"#;

        let parsed = parse_inbound(payload).expect("expected player-data parse");
        let InboundFrame::PlayerData(frames) = parsed else {
            panic!("expected player-data frame");
        };
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].identifier, "acct:01100001001101000011");
        assert_eq!(frames[0].identifiers.len(), 2);
        assert_eq!(frames[0].plate.as_deref(), Some("LC54 XRD"));
        assert_eq!(frames[1].z, 0.0);
        assert!(frames[1].vehicle.is_none());
    }

    #[test]
    fn parses_player_left() {
        let payload = r#"{"topic":"player-left","payload":"license:77aa01"}"#;
        let parsed = parse_inbound(payload).expect("expected player-left parse");
        match parsed {
            InboundFrame::PlayerLeft(identifier) => assert_eq!(identifier, "license:77aa01"),
            _ => panic!("expected player-left frame"),
        }
    }

    #[test]
    fn parses_signage_initial_state() {
        let payload = r#"{
            "topic": "signage-initial-state",
            "payload": [
                {
                    "id": "m4-j12-a",
                    "kind": "smart-motorway",
                    "x": 2210.5,
                    "y": -880.0,
                    "lanes": ["70", "70", "X"],
                    "text": ["CONGESTION", "AFTER J13"]
                },
                { "id": "ring-n2", "kind": "smart", "x": 90.0, "y": 45.0 }
            ]
        }"#;

        let parsed = parse_inbound(payload).expect("expected signage parse");
        let InboundFrame::SignageState(signs) = parsed else {
            panic!("expected signage frame");
        };
        assert_eq!(signs.len(), 2);
        assert_eq!(signs[0].kind, SignKind::SmartMotorway);
        assert_eq!(signs[0].lanes[2], "X");
        assert_eq!(signs[1].kind, SignKind::Smart);
        assert!(signs[1].lanes.is_empty());
    }

    #[test]
    fn rejects_unknown_topic() {
        let payload = r#"{"topic":"weather-update","payload":{}}"#;
        let err = parse_inbound(payload).expect_err("unknown topic should fail");
        assert!(matches!(err, ProtocolError::UnknownTopic(topic) if topic == "weather-update"));
    }

    #[test]
    fn rejects_malformed_player_data() {
        let payload = r#"{"topic":"player-data","payload":{"identifier":"not-an-array"}}"#;
        let err = parse_inbound(payload).expect_err("non-array payload should fail");
        assert!(matches!(err, ProtocolError::MalformedPayload { topic, .. } if topic == "player-data"));
    }

    #[test]
    fn rejects_non_envelope_payloads() {
        let err = parse_inbound("not json at all").expect_err("garbage should fail");
        assert!(matches!(err, ProtocolError::NotAnEnvelope(_)));
    }

    #[test]
    fn serializes_signage_update() {
        let frame = OutboundFrame::SignageUpdate {
            id: "m4-j12-a".to_owned(),
            config: SignConfig {
                lanes: vec!["70".to_owned(), "60".to_owned(), "X".to_owned()],
                text: vec!["QUEUE AHEAD".to_owned()],
            },
        };
        assert_eq!(frame.topic(), "signage-update");
        let wire: serde_json::Value =
            serde_json::from_str(&frame.to_wire()).expect("wire frame should be json");
        assert_eq!(wire["topic"], "signage-update");
        assert_eq!(wire["payload"]["id"], "m4-j12-a");
        assert_eq!(wire["payload"]["lanes"][1], "60");
        assert_eq!(wire["payload"]["text"][0], "QUEUE AHEAD");
    }
}
