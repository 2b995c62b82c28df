//! Event codec: canonical JSON encoding of tagged events
//!
//! Encoding validates the payload against the schema registered for the
//! event's tag; decoding selects the payload variant from the tag and
//! fails on tags with no registered schema.

use crate::error::{EventError, Result};
use crate::schema::PayloadRegistry;
use crate::types::{AppType, Event, EventType, Metadata};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

/// Wire shape of an event before its payload is resolved
#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(default)]
    event_id: Option<String>,
    event_type: EventType,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    user_id: Uuid,
    school_id: Uuid,
    #[serde(default)]
    classroom_id: Option<Uuid>,
    app_type: AppType,
    #[serde(default)]
    payload: serde_json::Value,
    #[serde(default)]
    metadata: Metadata,
}

/// Encoder/decoder for events, backed by a payload registry
#[derive(Clone)]
pub struct EventCodec {
    registry: Arc<PayloadRegistry>,
}

impl EventCodec {
    /// Create a codec over a custom registry
    pub fn new(registry: Arc<PayloadRegistry>) -> Self {
        Self { registry }
    }

    /// The registry this codec consults
    pub fn registry(&self) -> &PayloadRegistry {
        &self.registry
    }

    /// Serialize an event to wire bytes
    pub fn encode(&self, event: &Event) -> Result<Bytes> {
        self.registry.validate(&event.event_type, &event.payload)?;
        let bytes = serde_json::to_vec(event)?;
        Ok(Bytes::from(bytes))
    }

    /// Serialize an event to a JSON value (for embedding in other records)
    pub fn encode_value(&self, event: &Event) -> Result<serde_json::Value> {
        self.registry.validate(&event.event_type, &event.payload)?;
        Ok(serde_json::to_value(event)?)
    }

    /// Parse wire bytes into an event
    pub fn decode(&self, bytes: &[u8]) -> Result<Event> {
        let raw: RawEvent = serde_json::from_slice(bytes)
            .map_err(|e| EventError::Decode(format!("malformed event: {}", e)))?;
        self.resolve(raw)
    }

    /// Parse an already-parsed JSON value into an event
    pub fn decode_value(&self, value: serde_json::Value) -> Result<Event> {
        let raw: RawEvent = serde_json::from_value(value)
            .map_err(|e| EventError::Decode(format!("malformed event: {}", e)))?;
        self.resolve(raw)
    }

    fn resolve(&self, raw: RawEvent) -> Result<Event> {
        let id = match raw.event_id.as_deref() {
            None | Some("") => None,
            Some(s) => Some(
                Uuid::parse_str(s)
                    .map_err(|e| EventError::Decode(format!("invalid event_id '{}': {}", s, e)))?,
            ),
        };

        let schema = self.registry.get(&raw.event_type)?.ok_or_else(|| {
            EventError::Decode(format!("unknown event type: {}", raw.event_type))
        })?;
        let payload = schema.decode_validated(raw.payload).map_err(|e| match e {
            EventError::Decode(_) => e,
            other => EventError::Decode(format!(
                "payload for '{}' rejected: {}",
                raw.event_type, other
            )),
        })?;

        Ok(Event {
            id,
            event_type: raw.event_type,
            timestamp: raw.timestamp,
            user_id: raw.user_id,
            school_id: raw.school_id,
            classroom_id: raw.classroom_id,
            app_type: raw.app_type,
            payload,
            metadata: raw.metadata,
        })
    }
}

impl Default for EventCodec {
    fn default() -> Self {
        Self::new(Arc::new(PayloadRegistry::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{QuizAnswerSubmittedPayload, UserLoginPayload};

    fn answer_event() -> Event {
        Event::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            AppType::Whiteboard,
            QuizAnswerSubmittedPayload {
                quiz_id: Uuid::new_v4(),
                session_id: Uuid::new_v4(),
                question_id: Uuid::new_v4(),
                question_sequence: 2,
                answer: serde_json::json!(["a", "c"]),
                points: Some(2.5),
                response_time_ms: 800,
                ..Default::default()
            },
            Metadata::new("2.1.0", "tablet", "dev-42"),
        )
        .with_classroom(Uuid::new_v4())
    }

    #[test]
    fn test_wire_field_names() {
        let codec = EventCodec::default();
        let mut event = answer_event();
        event.ensure_identity();

        let bytes = codec.encode(&event).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["event_id"], event.id.unwrap().to_string());
        assert_eq!(json["event_type"], "quiz.answer.submitted");
        assert_eq!(json["app_type"], "whiteboard");
        assert_eq!(json["payload"]["question_sequence"], 2);
        assert_eq!(json["metadata"]["device_id"], "dev-42");
        assert!(json["classroom_id"].is_string());
    }

    #[test]
    fn test_decode_restores_identical_event() {
        let codec = EventCodec::default();
        let mut event = answer_event();
        event.ensure_identity();

        let bytes = codec.encode(&event).unwrap();
        let decoded = codec.decode(&bytes).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_decode_unknown_type_fails() {
        let codec = EventCodec::default();
        let json = serde_json::json!({
            "event_id": Uuid::now_v7(),
            "event_type": "quiz.session.paused",
            "timestamp": "2024-05-01T10:00:00Z",
            "user_id": Uuid::new_v4(),
            "school_id": Uuid::new_v4(),
            "app_type": "notebook",
            "payload": {"anything": true},
            "metadata": {"app_version": "1", "device_type": "t", "device_id": "d"}
        });
        let err = codec.decode(json.to_string().as_bytes()).unwrap_err();
        assert!(matches!(err, EventError::Decode(msg) if msg.contains("unknown event type")));
    }

    #[test]
    fn test_decode_invalid_payload_fails() {
        let codec = EventCodec::default();
        let json = serde_json::json!({
            "event_type": "user.login",
            "user_id": Uuid::new_v4(),
            "school_id": Uuid::new_v4(),
            "app_type": "notebook",
            "payload": {"session_start": true}
        });
        let err = codec.decode_value(json).unwrap_err();
        assert!(matches!(err, EventError::Decode(_)));
    }

    #[test]
    fn test_decode_allows_empty_event_id() {
        let codec = EventCodec::default();
        let json = serde_json::json!({
            "event_id": "",
            "event_type": "user.login",
            "user_id": Uuid::new_v4(),
            "school_id": Uuid::new_v4(),
            "app_type": "notebook",
            "payload": {"login_method": "password", "session_start": false}
        });
        let event = codec.decode_value(json).unwrap();
        assert!(event.id.is_none());
        assert!(event.timestamp.is_none());
    }

    #[test]
    fn test_decode_malformed_bytes() {
        let codec = EventCodec::default();
        assert!(matches!(
            codec.decode(b"not json"),
            Err(EventError::Decode(_))
        ));
        assert!(matches!(
            codec.decode(br#"{"event_type":"user.login"}"#),
            Err(EventError::Decode(_))
        ));
    }

    #[test]
    fn test_encode_rejects_mismatched_tag() {
        let codec = EventCodec::default();
        let mut event = Event::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            AppType::Notebook,
            UserLoginPayload {
                login_method: "sso".to_string(),
                ..Default::default()
            },
            Metadata::new("1", "t", "d"),
        );
        event.event_type = EventType::UserLogout;
        assert!(matches!(
            codec.encode(&event),
            Err(EventError::Validation { .. })
        ));

        event.event_type = EventType::from("custom.thing");
        assert!(matches!(
            codec.encode(&event),
            Err(EventError::UnknownEventType(_))
        ));
    }
}
