//! Core event types for the dashbeam-events system
//!
//! Events use snake_case JSON field names on the wire.

use crate::error::{EventError, Result};
use crate::payload::{EventPayload, Validate};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Event identifier (UUID v7, time ordered)
pub type EventId = Uuid;

/// Event type tag
///
/// Known tags map to named variants; any other string is preserved in
/// `Unknown` so it can still be routed, but it never decodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    QuizSessionStarted,
    QuizQuestionShown,
    QuizAnswerSubmitted,
    QuizSessionCompleted,
    QuizSessionAbandoned,
    QuizSessionPaused,
    QuizSessionResumed,
    UserLogin,
    UserLogout,
    AppInteraction,
    AppNavigation,
    AppFocusChange,
    AppBackground,
    AppForeground,
    ApiRequest,
    ApiResponse,
    ErrorOccurred,
    SystemStartup,
    SystemShutdown,
    Unknown(String),
}

impl EventType {
    /// Wire tag for this event type
    pub fn as_str(&self) -> &str {
        match self {
            Self::QuizSessionStarted => "quiz.session.started",
            Self::QuizQuestionShown => "quiz.question.shown",
            Self::QuizAnswerSubmitted => "quiz.answer.submitted",
            Self::QuizSessionCompleted => "quiz.session.completed",
            Self::QuizSessionAbandoned => "quiz.session.abandoned",
            Self::QuizSessionPaused => "quiz.session.paused",
            Self::QuizSessionResumed => "quiz.session.resumed",
            Self::UserLogin => "user.login",
            Self::UserLogout => "user.logout",
            Self::AppInteraction => "app.interaction",
            Self::AppNavigation => "app.navigation",
            Self::AppFocusChange => "app.focus.change",
            Self::AppBackground => "app.background",
            Self::AppForeground => "app.foreground",
            Self::ApiRequest => "api.request",
            Self::ApiResponse => "api.response",
            Self::ErrorOccurred => "error.occurred",
            Self::SystemStartup => "system.startup",
            Self::SystemShutdown => "system.shutdown",
            Self::Unknown(tag) => tag,
        }
    }

    pub fn is_quiz(&self) -> bool {
        matches!(
            self,
            Self::QuizSessionStarted
                | Self::QuizQuestionShown
                | Self::QuizAnswerSubmitted
                | Self::QuizSessionCompleted
                | Self::QuizSessionAbandoned
                | Self::QuizSessionPaused
                | Self::QuizSessionResumed
        )
    }

    /// Login/logout plus in-app engagement
    pub fn is_user(&self) -> bool {
        matches!(self, Self::UserLogin | Self::UserLogout) || self.is_engagement()
    }

    pub fn is_engagement(&self) -> bool {
        matches!(
            self,
            Self::AppInteraction
                | Self::AppNavigation
                | Self::AppFocusChange
                | Self::AppBackground
                | Self::AppForeground
        )
    }

    pub fn is_system(&self) -> bool {
        matches!(
            self,
            Self::ApiRequest
                | Self::ApiResponse
                | Self::ErrorOccurred
                | Self::SystemStartup
                | Self::SystemShutdown
        )
    }
}

impl From<&str> for EventType {
    fn from(tag: &str) -> Self {
        match tag {
            "quiz.session.started" => Self::QuizSessionStarted,
            "quiz.question.shown" => Self::QuizQuestionShown,
            "quiz.answer.submitted" => Self::QuizAnswerSubmitted,
            "quiz.session.completed" => Self::QuizSessionCompleted,
            "quiz.session.abandoned" => Self::QuizSessionAbandoned,
            "quiz.session.paused" => Self::QuizSessionPaused,
            "quiz.session.resumed" => Self::QuizSessionResumed,
            "user.login" => Self::UserLogin,
            "user.logout" => Self::UserLogout,
            "app.interaction" => Self::AppInteraction,
            "app.navigation" => Self::AppNavigation,
            "app.focus.change" => Self::AppFocusChange,
            "app.background" => Self::AppBackground,
            "app.foreground" => Self::AppForeground,
            "api.request" => Self::ApiRequest,
            "api.response" => Self::ApiResponse,
            "error.occurred" => Self::ErrorOccurred,
            "system.startup" => Self::SystemStartup,
            "system.shutdown" => Self::SystemShutdown,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl From<String> for EventType {
    fn from(tag: String) -> Self {
        Self::from(tag.as_str())
    }
}

impl From<EventType> for String {
    fn from(ty: EventType) -> Self {
        match ty {
            EventType::Unknown(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Client application that produced the event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppType {
    Whiteboard,
    Notebook,
}

/// Technical metadata about the event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub app_version: String,

    #[serde(default)]
    pub device_type: String,

    #[serde(default)]
    pub device_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_time: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,

    /// Free-form attributes not covered above
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Metadata {
    /// Metadata with the three required device attributes
    pub fn new(
        app_version: impl Into<String>,
        device_type: impl Into<String>,
        device_id: impl Into<String>,
    ) -> Self {
        Self {
            app_version: app_version.into(),
            device_type: device_type.into(),
            device_id: device_id.into(),
            ..Default::default()
        }
    }
}

/// A single analytics event
///
/// `id` and `timestamp` may be left unset by producers; the publisher
/// assigns both before the event reaches the transport. Decoding goes
/// through [`EventCodec`](crate::codec::EventCodec) because the payload
/// shape depends on `event_type`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    #[serde(rename = "event_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<EventId>,

    pub event_type: EventType,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,

    pub user_id: Uuid,

    pub school_id: Uuid,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub classroom_id: Option<Uuid>,

    pub app_type: AppType,

    pub payload: EventPayload,

    pub metadata: Metadata,
}

impl Event {
    /// Create an event; the type tag is taken from the payload variant
    pub fn new(
        user_id: Uuid,
        school_id: Uuid,
        app_type: AppType,
        payload: impl Into<EventPayload>,
        metadata: Metadata,
    ) -> Self {
        let payload = payload.into();
        Self {
            id: None,
            event_type: payload.event_type(),
            timestamp: None,
            user_id,
            school_id,
            classroom_id: None,
            app_type,
            payload,
            metadata,
        }
    }

    pub fn with_id(mut self, id: EventId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_classroom(mut self, classroom_id: Uuid) -> Self {
        self.classroom_id = Some(classroom_id);
        self
    }

    /// Fill in a fresh v7 id and the current UTC time where unset
    ///
    /// Returns the (possibly pre-existing) id.
    pub fn ensure_identity(&mut self) -> EventId {
        if self.timestamp.is_none() {
            self.timestamp = Some(Utc::now());
        }
        *self.id.get_or_insert_with(Uuid::now_v7)
    }

    /// Producer-side validation of attributes and payload
    pub fn validate(&self) -> Result<()> {
        let fail = |reason: &str| EventError::Validation {
            event_type: self.event_type.to_string(),
            reason: reason.to_string(),
        };

        if self.user_id.is_nil() {
            return Err(fail("user ID is required"));
        }
        if self.school_id.is_nil() {
            return Err(fail("school ID is required"));
        }
        if self.metadata.app_version.is_empty() {
            return Err(fail("app version is required in metadata"));
        }
        if self.metadata.device_type.is_empty() {
            return Err(fail("device type is required in metadata"));
        }
        if self.metadata.device_id.is_empty() {
            return Err(fail("device ID is required in metadata"));
        }
        if self.payload.event_type() != self.event_type {
            return Err(fail("payload variant does not match event type"));
        }
        self.payload.validate()
    }

    pub fn is_quiz_event(&self) -> bool {
        self.event_type.is_quiz()
    }

    pub fn is_user_event(&self) -> bool {
        self.event_type.is_user()
    }

    pub fn is_system_event(&self) -> bool {
        self.event_type.is_system()
    }

    /// Physical topic this event is routed to
    pub fn topic(&self) -> &'static str {
        crate::topics::topic_for(&self.event_type)
    }

    /// Id rendered for logs, `-` while unassigned
    pub(crate) fn id_label(&self) -> String {
        self.id.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string())
    }
}

/// Options for creating subscriptions
#[derive(Debug, Clone, PartialEq)]
pub struct SubscribeOptions {
    /// Glob pattern subscription instead of an exact channel
    pub pattern: bool,

    /// Handler attempts per event before it is dead-lettered
    ///
    /// `0` is treated as a single attempt.
    pub max_retries: u32,

    /// Waits between attempts; the last entry repeats once exhausted
    pub retry_backoff: Vec<Duration>,

    /// Per-attempt deadline after which the handler's token is cancelled
    pub handler_timeout: Option<Duration>,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self {
            pattern: true,
            max_retries: 3,
            retry_backoff: vec![
                Duration::from_secs(1),
                Duration::from_secs(5),
                Duration::from_secs(10),
            ],
            handler_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl SubscribeOptions {
    /// Default options with an exact-match subscription
    pub fn exact() -> Self {
        Self {
            pattern: false,
            ..Default::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff(mut self, backoff: Vec<Duration>) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_handler_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.handler_timeout = timeout;
        self
    }

    /// Total handler invocations allowed per event
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.max(1)
    }

    /// Wait after the `n`th consecutive failure (1-based)
    pub fn backoff_for(&self, n: u32) -> Duration {
        let idx = (n.saturating_sub(1) as usize).min(self.retry_backoff.len().saturating_sub(1));
        self.retry_backoff.get(idx).copied().unwrap_or_default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.retry_backoff.is_empty() {
            return Err(EventError::Config(
                "retry_backoff must contain at least one duration".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{QuizAnswerSubmittedPayload, UserLoginPayload};

    fn login_event() -> Event {
        Event::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            AppType::Whiteboard,
            UserLoginPayload {
                login_method: "password".to_string(),
                session_start: true,
                ..Default::default()
            },
            Metadata::new("1.4.0", "tablet", "dev-1"),
        )
    }

    #[test]
    fn test_event_type_roundtrip() {
        for tag in ["quiz.answer.submitted", "user.login", "system.shutdown"] {
            let ty = EventType::from(tag);
            assert!(!matches!(ty, EventType::Unknown(_)));
            assert_eq!(ty.as_str(), tag);
            assert_eq!(String::from(ty), tag);
        }
    }

    #[test]
    fn test_unknown_event_type_preserved() {
        let ty = EventType::from("billing.invoice.paid");
        assert_eq!(ty, EventType::Unknown("billing.invoice.paid".to_string()));
        assert_eq!(ty.to_string(), "billing.invoice.paid");

        let json = serde_json::to_string(&ty).unwrap();
        assert_eq!(json, "\"billing.invoice.paid\"");
    }

    #[test]
    fn test_event_type_categories() {
        assert!(EventType::QuizSessionPaused.is_quiz());
        assert!(EventType::UserLogout.is_user());
        assert!(EventType::AppBackground.is_user());
        assert!(EventType::AppBackground.is_engagement());
        assert!(EventType::SystemStartup.is_system());
        assert!(!EventType::Unknown("x".into()).is_system());
    }

    #[test]
    fn test_event_new_takes_type_from_payload() {
        let event = login_event();
        assert_eq!(event.event_type, EventType::UserLogin);
        assert!(event.id.is_none());
        assert!(event.timestamp.is_none());
        assert!(event.is_user_event());
        assert_eq!(event.topic(), "user-events");
    }

    #[test]
    fn test_ensure_identity_fills_unset_fields() {
        let mut event = login_event();
        let before = Utc::now();
        let id = event.ensure_identity();
        assert_eq!(event.id, Some(id));
        assert_eq!(id.get_version_num(), 7);
        assert!(event.timestamp.unwrap() >= before);

        // Existing identity is kept
        let ts = event.timestamp;
        assert_eq!(event.ensure_identity(), id);
        assert_eq!(event.timestamp, ts);
    }

    #[test]
    fn test_event_validate() {
        assert!(login_event().validate().is_ok());

        let mut event = login_event();
        event.user_id = Uuid::nil();
        assert!(event.validate().is_err());

        let mut event = login_event();
        event.metadata.device_id.clear();
        assert!(event.validate().is_err());

        let mut event = login_event();
        event.event_type = EventType::UserLogout;
        assert!(event.validate().is_err());
    }

    #[test]
    fn test_event_validate_checks_payload() {
        let event = Event::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            AppType::Notebook,
            QuizAnswerSubmittedPayload::default(),
            Metadata::new("1.0", "phone", "d"),
        );
        assert!(matches!(
            event.validate(),
            Err(EventError::Validation { .. })
        ));
    }

    #[test]
    fn test_metadata_extra_flattened() {
        let mut metadata = Metadata::new("1.0", "phone", "d-9");
        metadata.session_id = Some("s-1".to_string());
        metadata
            .extra
            .insert("locale".to_string(), serde_json::json!("en-IN"));

        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json["locale"], "en-IN");
        assert_eq!(json["session_id"], "s-1");
        assert!(json.get("network_type").is_none());

        let parsed: Metadata = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, metadata);
    }

    #[test]
    fn test_subscribe_options_default() {
        let opts = SubscribeOptions::default();
        assert!(opts.pattern);
        assert_eq!(opts.max_retries, 3);
        assert_eq!(
            opts.retry_backoff,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(5),
                Duration::from_secs(10)
            ]
        );
        assert!(!SubscribeOptions::exact().pattern);
    }

    #[test]
    fn test_backoff_clamps_to_last() {
        let opts = SubscribeOptions::default();
        assert_eq!(opts.backoff_for(1), Duration::from_secs(1));
        assert_eq!(opts.backoff_for(2), Duration::from_secs(5));
        assert_eq!(opts.backoff_for(3), Duration::from_secs(10));
        assert_eq!(opts.backoff_for(9), Duration::from_secs(10));
    }

    #[test]
    fn test_max_attempts_never_zero() {
        assert_eq!(SubscribeOptions::default().with_max_retries(0).max_attempts(), 1);
        assert_eq!(SubscribeOptions::default().max_attempts(), 3);
    }

    #[test]
    fn test_empty_backoff_rejected() {
        let opts = SubscribeOptions::default().with_backoff(vec![]);
        assert!(matches!(opts.validate(), Err(EventError::Config(_))));
    }
}
