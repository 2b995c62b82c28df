//! Typed event payloads
//!
//! Every event carries exactly one payload variant, selected by its
//! `event_type` tag. Variants validate themselves; the schema registry
//! decides which tags have a variant at all.

use crate::error::{EventError, Result};
use crate::types::EventType;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Self-validation for a payload variant
pub trait Validate {
    /// Check the payload's invariants
    fn validate(&self) -> Result<()>;
}

/// A concrete payload struct bound to one event type tag
pub trait PayloadVariant:
    Validate + Serialize + DeserializeOwned + Into<EventPayload> + Send + Sync + 'static
{
    /// The tag this variant is registered under
    fn event_type() -> EventType;

    /// Borrow this variant out of an `EventPayload`, if it is one
    fn from_payload(payload: &EventPayload) -> Option<&Self>;
}

macro_rules! payload_variants {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        /// Closed set of payload variants
        ///
        /// Serialized without a tag; the enclosing event's `event_type`
        /// selects the variant on decode.
        #[derive(Debug, Clone, PartialEq, Serialize)]
        #[serde(untagged)]
        pub enum EventPayload {
            $($variant($ty),)*
        }

        impl EventPayload {
            /// Event type tag matching this variant
            pub fn event_type(&self) -> EventType {
                match self {
                    $(Self::$variant(_) => EventType::$variant,)*
                }
            }
        }

        impl Validate for EventPayload {
            fn validate(&self) -> Result<()> {
                match self {
                    $(Self::$variant(p) => p.validate(),)*
                }
            }
        }

        $(
            impl From<$ty> for EventPayload {
                fn from(payload: $ty) -> Self {
                    Self::$variant(payload)
                }
            }

            impl PayloadVariant for $ty {
                fn event_type() -> EventType {
                    EventType::$variant
                }

                fn from_payload(payload: &EventPayload) -> Option<&Self> {
                    match payload {
                        EventPayload::$variant(p) => Some(p),
                        #[allow(unreachable_patterns)]
                        _ => None,
                    }
                }
            }
        )*
    };
}

payload_variants! {
    QuizSessionStarted(QuizSessionStartedPayload),
    QuizQuestionShown(QuizQuestionShownPayload),
    QuizAnswerSubmitted(QuizAnswerSubmittedPayload),
    QuizSessionCompleted(QuizSessionCompletedPayload),
    UserLogin(UserLoginPayload),
    UserLogout(UserLogoutPayload),
    AppInteraction(AppInteractionPayload),
    AppNavigation(AppNavigationPayload),
    ApiRequest(ApiRequestPayload),
    ErrorOccurred(ErrorOccurredPayload),
}

fn invalid(event_type: EventType, reason: &str) -> EventError {
    EventError::Validation {
        event_type: event_type.to_string(),
        reason: reason.to_string(),
    }
}

// ─── Quiz ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuizSessionStartedPayload {
    pub quiz_id: Uuid,
    pub session_id: Uuid,
    pub session_code: String,
    pub total_questions: i32,
    #[serde(rename = "time_limit_seconds", skip_serializing_if = "Option::is_none")]
    pub time_limit: Option<i32>,
    pub max_score: f64,
}

impl Validate for QuizSessionStartedPayload {
    fn validate(&self) -> Result<()> {
        let ty = EventType::QuizSessionStarted;
        if self.quiz_id.is_nil() || self.session_id.is_nil() {
            return Err(invalid(ty, "quiz_id and session_id are required"));
        }
        if self.session_code.is_empty() {
            return Err(invalid(ty, "session_code is required"));
        }
        if self.total_questions <= 0 {
            return Err(invalid(ty, "total_questions must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuizQuestionShownPayload {
    pub quiz_id: Uuid,
    pub session_id: Uuid,
    pub question_id: Uuid,
    pub question_sequence: i32,
    pub question_type: String,
    #[serde(rename = "time_limit_seconds", skip_serializing_if = "Option::is_none")]
    pub time_limit: Option<i32>,
}

impl Validate for QuizQuestionShownPayload {
    fn validate(&self) -> Result<()> {
        let ty = EventType::QuizQuestionShown;
        if self.quiz_id.is_nil() || self.session_id.is_nil() || self.question_id.is_nil() {
            return Err(invalid(ty, "quiz_id, session_id and question_id are required"));
        }
        if self.question_sequence <= 0 {
            return Err(invalid(ty, "question_sequence must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuizAnswerSubmittedPayload {
    pub quiz_id: Uuid,
    pub session_id: Uuid,
    pub question_id: Uuid,
    pub question_sequence: i32,
    /// Raw answer as submitted by the client
    pub answer: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_correct: Option<bool>,
    pub response_time_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer_changes: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub points: Option<f64>,
}

impl Validate for QuizAnswerSubmittedPayload {
    fn validate(&self) -> Result<()> {
        let ty = EventType::QuizAnswerSubmitted;
        if self.quiz_id.is_nil() || self.session_id.is_nil() || self.question_id.is_nil() {
            return Err(invalid(ty, "quiz_id, session_id and question_id are required"));
        }
        if self.question_sequence <= 0 {
            return Err(invalid(ty, "question_sequence must be positive"));
        }
        if self.response_time_ms < 0 {
            return Err(invalid(ty, "response_time_ms cannot be negative"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuizSessionCompletedPayload {
    pub quiz_id: Uuid,
    pub session_id: Uuid,
    pub total_score: f64,
    pub max_score: f64,
    pub completion_time_ms: i64,
    pub questions_correct: i32,
    pub questions_answered: i32,
    pub questions_skipped: i32,
    #[serde(rename = "average_response_time_ms")]
    pub average_response_time: i64,
}

impl Validate for QuizSessionCompletedPayload {
    fn validate(&self) -> Result<()> {
        let ty = EventType::QuizSessionCompleted;
        if self.quiz_id.is_nil() || self.session_id.is_nil() {
            return Err(invalid(ty, "quiz_id and session_id are required"));
        }
        if self.max_score < 0.0 || self.total_score < 0.0 {
            return Err(invalid(ty, "scores cannot be negative"));
        }
        if self.completion_time_ms < 0 {
            return Err(invalid(ty, "completion_time_ms cannot be negative"));
        }
        Ok(())
    }
}

// ─── User & engagement ───────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserLoginPayload {
    pub login_method: String,
    pub session_start: bool,
    #[serde(rename = "previous_login_timestamp", skip_serializing_if = "Option::is_none")]
    pub previous_login: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl Validate for UserLoginPayload {
    fn validate(&self) -> Result<()> {
        if self.login_method.is_empty() {
            return Err(invalid(EventType::UserLogin, "login_method is required"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserLogoutPayload {
    #[serde(rename = "session_duration_ms")]
    pub session_duration: i64,
    /// manual, timeout, forced
    pub logout_reason: String,
}

impl Validate for UserLogoutPayload {
    fn validate(&self) -> Result<()> {
        if self.session_duration < 0 {
            return Err(invalid(
                EventType::UserLogout,
                "session_duration_ms cannot be negative",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppInteractionPayload {
    pub interaction_type: String,
    pub screen_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element_clicked: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_spent_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element_data: Option<String>,
    /// tap, swipe, long_press, ...
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

impl Validate for AppInteractionPayload {
    fn validate(&self) -> Result<()> {
        if self.interaction_type.is_empty() || self.screen_name.is_empty() {
            return Err(invalid(
                EventType::AppInteraction,
                "interaction_type and screen_name are required",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppNavigationPayload {
    pub from_screen: String,
    pub to_screen: String,
    /// push, pop, replace
    pub navigation_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_spent_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub navigation_data: Option<String>,
}

impl Validate for AppNavigationPayload {
    fn validate(&self) -> Result<()> {
        if self.from_screen.is_empty()
            || self.to_screen.is_empty()
            || self.navigation_type.is_empty()
        {
            return Err(invalid(
                EventType::AppNavigation,
                "from_screen, to_screen and navigation_type are required",
            ));
        }
        Ok(())
    }
}

// ─── System ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiRequestPayload {
    pub method: String,
    pub endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(rename = "response_time_ms", skip_serializing_if = "Option::is_none")]
    pub response_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(rename = "request_size_bytes", skip_serializing_if = "Option::is_none")]
    pub request_size: Option<i64>,
    #[serde(rename = "response_size_bytes", skip_serializing_if = "Option::is_none")]
    pub response_size: Option<i64>,
}

impl Validate for ApiRequestPayload {
    fn validate(&self) -> Result<()> {
        if self.method.is_empty() || self.endpoint.is_empty() {
            return Err(invalid(
                EventType::ApiRequest,
                "method and endpoint are required",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorOccurredPayload {
    pub error_type: String,
    pub error_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// low, medium, high, critical
    pub severity: String,
}

impl Validate for ErrorOccurredPayload {
    fn validate(&self) -> Result<()> {
        if self.error_type.is_empty()
            || self.error_message.is_empty()
            || self.severity.is_empty()
        {
            return Err(invalid(
                EventType::ErrorOccurred,
                "error_type, error_message and severity are required",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer() -> QuizAnswerSubmittedPayload {
        QuizAnswerSubmittedPayload {
            quiz_id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            question_id: Uuid::new_v4(),
            question_sequence: 1,
            answer: serde_json::json!({"choice": "b"}),
            is_correct: Some(true),
            response_time_ms: 1200,
            ..Default::default()
        }
    }

    #[test]
    fn test_payload_event_type() {
        let payload: EventPayload = answer().into();
        assert_eq!(payload.event_type(), EventType::QuizAnswerSubmitted);
        assert_eq!(
            QuizAnswerSubmittedPayload::event_type(),
            EventType::QuizAnswerSubmitted
        );
    }

    #[test]
    fn test_from_payload_matches_variant_only() {
        let payload: EventPayload = answer().into();
        assert!(QuizAnswerSubmittedPayload::from_payload(&payload).is_some());
        assert!(UserLoginPayload::from_payload(&payload).is_none());
    }

    #[test]
    fn test_answer_validation() {
        assert!(answer().validate().is_ok());

        let mut bad = answer();
        bad.question_sequence = 0;
        assert!(matches!(
            bad.validate(),
            Err(EventError::Validation { .. })
        ));

        let mut bad = answer();
        bad.response_time_ms = -1;
        assert!(bad.validate().is_err());

        let mut bad = answer();
        bad.quiz_id = Uuid::nil();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_untagged_serialization() {
        let payload: EventPayload = UserLogoutPayload {
            session_duration: 60_000,
            logout_reason: "manual".to_string(),
        }
        .into();

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["session_duration_ms"], 60_000);
        assert_eq!(json["logout_reason"], "manual");
        assert!(json.get("UserLogout").is_none());
    }

    #[test]
    fn test_optional_fields_skipped() {
        let json = serde_json::to_value(answer()).unwrap();
        assert!(json.get("answer_changes").is_none());
        assert!(json.get("points").is_none());
        assert_eq!(json["is_correct"], true);
    }

    #[test]
    fn test_login_requires_method() {
        let login = UserLoginPayload::default();
        assert!(login.validate().is_err());

        let login = UserLoginPayload {
            login_method: "password".to_string(),
            ..Default::default()
        };
        assert!(login.validate().is_ok());
    }

    #[test]
    fn test_error_occurred_requires_severity() {
        let mut payload = ErrorOccurredPayload {
            error_type: "db".to_string(),
            error_message: "timeout".to_string(),
            severity: "high".to_string(),
            ..Default::default()
        };
        assert!(payload.validate().is_ok());

        payload.severity.clear();
        assert!(payload.validate().is_err());
    }

    #[test]
    fn test_completed_rejects_negative_scores() {
        let payload = QuizSessionCompletedPayload {
            quiz_id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            total_score: -1.0,
            max_score: 10.0,
            ..Default::default()
        };
        assert!(payload.validate().is_err());
    }
}
