use crate::topics::topic_for;
use crate::types::EventType;

/// Execute the `route` command: print the topic for an event type.
pub fn execute(event_type: &str) {
    let event_type = EventType::from(event_type);
    let known = if matches!(event_type, EventType::Unknown(_)) {
        " (unknown type)"
    } else {
        ""
    };
    println!("{} -> {}{}", event_type, topic_for(&event_type), known);
}
