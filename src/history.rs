//! Event history: write-once TTL copies of published events
//!
//! Every publish stores the exact wire bytes under `event:<id>` alongside
//! the broadcast. Entries are never rewritten; they simply expire.

use crate::codec::EventCodec;
use crate::error::{EventError, Result};
use crate::transport::Transport;
use crate::types::{Event, EventId};
use std::sync::Arc;
use std::time::Duration;

/// Default lifetime of a history entry
pub const HISTORY_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Key prefix for history entries
pub const HISTORY_KEY_PREFIX: &str = "event:";

/// Read side of the event history
///
/// Entries are written by [`Publisher`](crate::publisher::Publisher),
/// which owns their lifetime.
#[derive(Clone)]
pub struct EventHistory {
    transport: Arc<dyn Transport>,
    codec: EventCodec,
}

impl EventHistory {
    pub fn new(transport: Arc<dyn Transport>, codec: EventCodec) -> Self {
        Self { transport, codec }
    }

    /// Storage key for an event id
    pub fn key_for(id: &EventId) -> String {
        format!("{}{}", HISTORY_KEY_PREFIX, id)
    }

    /// Fetch a previously published event
    pub async fn get(&self, id: &EventId) -> Result<Event> {
        let key = Self::key_for(id);
        let bytes = self
            .transport
            .get(&key)
            .await
            .map_err(|e| match e {
                EventError::Transport { .. } => e,
                other => EventError::transport("history", other),
            })?
            .ok_or_else(|| EventError::NotFound(format!("event {} not in history", id)))?;

        self.codec.decode(&bytes).map_err(|e| match e {
            EventError::Decode(reason) => {
                EventError::Decode(format!("history entry {}: {}", key, reason))
            }
            other => other,
        })
    }
}
