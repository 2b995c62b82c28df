//! Redis transport
//!
//! Implements `Transport` over Redis pub/sub for delivery and plain
//! string keys with PX expiry for history and dead letters.

mod client;
mod config;
mod subscriber;

pub use client::RedisClient;
pub use config::RedisConfig;
pub use subscriber::RedisSubscription;

use crate::error::Result;
use crate::transport::{Channel, Pipeline, Transport};
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

/// Redis-backed transport
///
/// Wraps `RedisClient` and implements the `Transport` trait.
pub struct RedisTransport {
    client: RedisClient,
}

impl RedisTransport {
    /// Connect to Redis
    pub async fn connect(config: RedisConfig) -> Result<Self> {
        let client = RedisClient::connect(config).await?;
        Ok(Self { client })
    }

    /// Get the underlying Redis client for advanced usage
    pub fn client(&self) -> &RedisClient {
        &self.client
    }
}

#[async_trait]
impl Transport for RedisTransport {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<()> {
        self.client.publish(topic, &payload).await
    }

    async fn subscribe(&self, topic: &str, pattern: bool) -> Result<Box<dyn Channel>> {
        let sub = self.client.subscribe(topic, pattern).await?;
        Ok(Box::new(sub))
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        self.client.get(key).await
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()> {
        self.client.set(key, &value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.client.delete(key).await
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        self.client.keys(pattern).await
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<Bytes>>> {
        self.client.get_many(keys).await
    }

    async fn execute(&self, pipeline: Pipeline) -> Result<()> {
        self.client.execute(&pipeline).await
    }

    async fn close(&self) -> Result<()> {
        self.client.close();
        Ok(())
    }

    fn name(&self) -> &str {
        "redis"
    }

    async fn health(&self) -> Result<bool> {
        self.client.ping().await.map(|_| true)
    }
}
