//! # dashbeam-events
//!
//! At-most-once, topic-based event delivery over a pub/sub broker.
//!
//! ## Overview
//!
//! `dashbeam-events` decouples event producers from asynchronous consumers.
//! The broker underneath (Redis pub/sub) keeps nothing, so this crate adds
//! what it lacks: ids assigned before hand-off, a 24h history copy of every
//! published event, one delivery worker per topic with bounded retries and
//! backoff, and a dead-letter store that operators can replay.
//!
//! ## Quick Start
//!
//! ```rust
//! use dashbeam_events::handler::handler_fn;
//! use dashbeam_events::payload::UserLoginPayload;
//! use dashbeam_events::transport::memory::MemoryTransport;
//! use dashbeam_events::{AppType, Event, EventBus, Metadata};
//! use uuid::Uuid;
//!
//! # async fn example() -> dashbeam_events::Result<()> {
//! let bus = EventBus::new(MemoryTransport::new());
//!
//! bus.subscribe(
//!     "user-events",
//!     handler_fn(|event, _cancel| async move {
//!         println!("received {}", event.event_type);
//!         Ok(())
//!     }),
//!     None,
//! )
//! .await?;
//!
//! let event = Event::new(
//!     Uuid::new_v4(),
//!     Uuid::new_v4(),
//!     AppType::Notebook,
//!     UserLoginPayload {
//!         login_method: "password".to_string(),
//!         ..Default::default()
//!     },
//!     Metadata::new("3.1.0", "laptop", "device-7"),
//! );
//! let id = bus.publish_routed(event).await?;
//! println!("Published: {}", id);
//!
//! bus.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Transports
//!
//! - **memory**: in-process broker for testing, with fault injection
//! - **redis**: Redis pub/sub plus TTL keys for history and dead letters
//!
//! ## Architecture
//!
//! - **Transport** trait: pub/sub, TTL keys, key scans, pipelines
//! - **EventBus**: publish, subscribe, history, replay
//! - **EventHandler** trait: consumer callback with a cancellation token
//! - **Event**: tagged envelope whose payload variant follows its type

pub mod cli;
pub mod codec;
pub mod config;
pub mod dlq;
pub mod error;
pub mod handler;
pub mod history;
pub mod payload;
pub mod publisher;
pub mod registry;
pub mod schema;
pub mod store;
pub mod topics;
pub mod transport;
pub mod types;
pub mod worker;

// Re-export core types
pub use codec::EventCodec;
pub use config::{DeliveryConfig, EventsConfig, StoreConfig};
pub use dlq::{DeadLetter, DeadLetterRecord, DeadLetterStore, ReplayReport};
pub use error::{EventError, Result};
pub use handler::{handler_fn, EventHandler, HandlerError};
pub use history::EventHistory;
pub use payload::{EventPayload, PayloadVariant, Validate};
pub use publisher::Publisher;
pub use registry::{SubscriptionId, SubscriptionRegistry};
pub use schema::{PayloadRegistry, PayloadSchema};
pub use store::{BatchFailure, BatchReport, EventBus};
pub use topics::topic_for;
pub use transport::{Channel, Message, Pipeline, Transport};
pub use types::{AppType, Event, EventId, EventType, Metadata, SubscribeOptions};

// Re-export transports for convenience
pub use transport::memory::MemoryTransport;
pub use transport::redis::{RedisClient, RedisConfig, RedisTransport};
