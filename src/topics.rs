//! Topic routing: map event types to physical topics

use crate::types::EventType;

pub const TOPIC_QUIZ_EVENTS: &str = "quiz-events";
pub const TOPIC_USER_EVENTS: &str = "user-events";
pub const TOPIC_ENGAGEMENT_EVENTS: &str = "engagement-events";
pub const TOPIC_SYSTEM_EVENTS: &str = "system-events";

/// All physical topics, in routing order
pub const ALL_TOPICS: [&str; 4] = [
    TOPIC_QUIZ_EVENTS,
    TOPIC_USER_EVENTS,
    TOPIC_ENGAGEMENT_EVENTS,
    TOPIC_SYSTEM_EVENTS,
];

/// Physical topic for an event type
///
/// Total: system and unrecognised types fall through to the system topic.
pub fn topic_for(event_type: &EventType) -> &'static str {
    if event_type.is_quiz() {
        TOPIC_QUIZ_EVENTS
    } else if matches!(event_type, EventType::UserLogin | EventType::UserLogout) {
        TOPIC_USER_EVENTS
    } else if event_type.is_engagement() {
        TOPIC_ENGAGEMENT_EVENTS
    } else {
        TOPIC_SYSTEM_EVENTS
    }
}
