//! Payload schema registry: map event type tags to decoders and validators
//!
//! The registry is consulted once per encode/decode. Tags with no
//! registered schema are rejected outright rather than passed through
//! with an empty payload.

use crate::error::{EventError, Result};
use crate::payload::{
    ApiRequestPayload, AppInteractionPayload, AppNavigationPayload, ErrorOccurredPayload,
    EventPayload, PayloadVariant, QuizAnswerSubmittedPayload, QuizQuestionShownPayload,
    QuizSessionCompletedPayload, QuizSessionStartedPayload, UserLoginPayload, UserLogoutPayload,
    Validate,
};
use crate::types::EventType;
use std::collections::HashMap;
use std::sync::RwLock;

/// Turns a raw JSON payload into a typed variant
pub type DecodeFn = fn(serde_json::Value) -> Result<EventPayload>;

/// Checks a typed payload against the rules of its variant
pub type ValidateFn = fn(&EventPayload) -> Result<()>;

/// Decoder/validator pair for one event type
#[derive(Debug, Clone, Copy)]
pub struct PayloadSchema {
    pub decode: DecodeFn,
    pub validate: ValidateFn,
}

impl PayloadSchema {
    /// Schema for a concrete payload variant
    pub fn of<P: PayloadVariant>() -> Self {
        Self {
            decode: decode_variant::<P>,
            validate: validate_variant::<P>,
        }
    }

    /// Decode and validate in one step
    pub fn decode_validated(&self, raw: serde_json::Value) -> Result<EventPayload> {
        let payload = (self.decode)(raw)?;
        (self.validate)(&payload)?;
        Ok(payload)
    }
}

fn decode_variant<P: PayloadVariant>(raw: serde_json::Value) -> Result<EventPayload> {
    if raw.is_null() {
        return Err(EventError::Decode(format!(
            "payload for '{}' is empty",
            P::event_type()
        )));
    }
    let payload: P = serde_json::from_value(raw).map_err(|e| {
        EventError::Decode(format!("invalid payload for '{}': {}", P::event_type(), e))
    })?;
    Ok(payload.into())
}

fn validate_variant<P: PayloadVariant>(payload: &EventPayload) -> Result<()> {
    match P::from_payload(payload) {
        Some(p) => p.validate(),
        None => Err(EventError::Validation {
            event_type: P::event_type().to_string(),
            reason: format!("payload variant is '{}'", payload.event_type()),
        }),
    }
}

/// Registry of payload schemas keyed by event type tag
pub struct PayloadRegistry {
    schemas: RwLock<HashMap<String, PayloadSchema>>,
}

impl PayloadRegistry {
    /// Create an empty registry
    pub fn empty() -> Self {
        Self {
            schemas: RwLock::new(HashMap::new()),
        }
    }

    /// Register (or replace) the schema for a payload variant
    pub fn register<P: PayloadVariant>(&self) -> Result<()> {
        self.register_schema(P::event_type(), PayloadSchema::of::<P>())
    }

    /// Register a schema under an arbitrary tag
    pub fn register_schema(&self, event_type: EventType, schema: PayloadSchema) -> Result<()> {
        if event_type.as_str().is_empty() {
            return Err(EventError::Config(
                "Event type cannot be empty".to_string(),
            ));
        }
        let mut schemas = self.schemas.write().map_err(|e| {
            EventError::Config(format!("Payload registry lock poisoned: {}", e))
        })?;
        schemas.insert(event_type.as_str().to_string(), schema);
        Ok(())
    }

    /// Look up the schema for a tag
    pub fn get(&self, event_type: &EventType) -> Result<Option<PayloadSchema>> {
        let schemas = self.schemas.read().map_err(|e| {
            EventError::Config(format!("Payload registry lock poisoned: {}", e))
        })?;
        Ok(schemas.get(event_type.as_str()).copied())
    }

    /// Look up the schema for a tag, failing on unregistered tags
    pub fn require(&self, event_type: &EventType) -> Result<PayloadSchema> {
        self.get(event_type)?
            .ok_or_else(|| EventError::UnknownEventType(event_type.to_string()))
    }

    /// List all registered tags
    pub fn list_types(&self) -> Result<Vec<String>> {
        let schemas = self.schemas.read().map_err(|e| {
            EventError::Config(format!("Payload registry lock poisoned: {}", e))
        })?;
        let mut types: Vec<String> = schemas.keys().cloned().collect();
        types.sort();
        Ok(types)
    }

    /// Validate a payload against the schema registered for `event_type`
    pub fn validate(&self, event_type: &EventType, payload: &EventPayload) -> Result<()> {
        let schema = self.require(event_type)?;
        (schema.validate)(payload)
    }
}

impl Default for PayloadRegistry {
    /// Registry with every built-in payload variant
    fn default() -> Self {
        let registry = Self::empty();
        let builtin: [(EventType, PayloadSchema); 10] = [
            (
                EventType::QuizSessionStarted,
                PayloadSchema::of::<QuizSessionStartedPayload>(),
            ),
            (
                EventType::QuizQuestionShown,
                PayloadSchema::of::<QuizQuestionShownPayload>(),
            ),
            (
                EventType::QuizAnswerSubmitted,
                PayloadSchema::of::<QuizAnswerSubmittedPayload>(),
            ),
            (
                EventType::QuizSessionCompleted,
                PayloadSchema::of::<QuizSessionCompletedPayload>(),
            ),
            (EventType::UserLogin, PayloadSchema::of::<UserLoginPayload>()),
            (EventType::UserLogout, PayloadSchema::of::<UserLogoutPayload>()),
            (
                EventType::AppInteraction,
                PayloadSchema::of::<AppInteractionPayload>(),
            ),
            (
                EventType::AppNavigation,
                PayloadSchema::of::<AppNavigationPayload>(),
            ),
            (EventType::ApiRequest, PayloadSchema::of::<ApiRequestPayload>()),
            (
                EventType::ErrorOccurred,
                PayloadSchema::of::<ErrorOccurredPayload>(),
            ),
        ];
        if let Ok(mut schemas) = registry.schemas.write() {
            for (event_type, schema) in builtin {
                schemas.insert(event_type.as_str().to_string(), schema);
            }
        }
        registry
    }
}
