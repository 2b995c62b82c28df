//! Redis client: connect, publish, subscribe, key-value commands

use super::config::RedisConfig;
use super::subscriber::RedisSubscription;
use crate::error::{EventError, Result};
use crate::transport::{Command, Pipeline};
use ::redis::aio::ConnectionManager;
use bytes::Bytes;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Redis client
///
/// Commands go through a multiplexed `ConnectionManager`, which reconnects
/// on its own; every subscription opens a dedicated pub/sub connection.
pub struct RedisClient {
    /// Client handle used to open pub/sub connections
    client: ::redis::Client,

    /// Shared command connection; `None` once closed
    conn: Mutex<Option<ConnectionManager>>,

    config: Arc<RedisConfig>,
}

impl RedisClient {
    /// Connect to Redis and verify the server answers
    pub async fn connect(config: RedisConfig) -> Result<Self> {
        let url = config.connection_url();
        let client = ::redis::Client::open(url.as_str())
            .map_err(|e| EventError::Connection(format!("{}: {}", config.redacted_url(), e)))?;

        let connect_timeout = Duration::from_secs(config.connect_timeout_secs);
        let conn = tokio::time::timeout(connect_timeout, ConnectionManager::new(client.clone()))
            .await
            .map_err(|_| {
                EventError::Timeout(format!(
                    "Connecting to {} timed out after {}s",
                    config.redacted_url(),
                    config.connect_timeout_secs
                ))
            })?
            .map_err(|e| EventError::Connection(format!("{}: {}", config.redacted_url(), e)))?;

        let client = Self {
            client,
            conn: Mutex::new(Some(conn)),
            config: Arc::new(config),
        };
        client.ping().await?;

        tracing::info!(url = %client.config.redacted_url(), "Connected to Redis");
        Ok(client)
    }

    /// Broadcast a payload on a channel
    pub async fn publish(&self, topic: &str, payload: &Bytes) -> Result<()> {
        let mut conn = self.connection("publish")?;
        let receivers: i64 = self
            .run("publish", async {
                ::redis::cmd("PUBLISH")
                    .arg(topic)
                    .arg(&payload[..])
                    .query_async(&mut conn)
                    .await
            })
            .await?;

        tracing::trace!(topic, receivers, "Message published");
        Ok(())
    }

    /// Open a pub/sub connection subscribed to a channel or pattern
    pub async fn subscribe(&self, topic: &str, pattern: bool) -> Result<RedisSubscription> {
        self.connection("subscribe")?;

        let mut pubsub = self
            .run("subscribe", self.client.get_async_pubsub())
            .await?;
        let subscribed = if pattern {
            pubsub.psubscribe(topic).await
        } else {
            pubsub.subscribe(topic).await
        };
        subscribed.map_err(|e| EventError::transport("subscribe", format!("{}: {}", topic, e)))?;

        tracing::debug!(topic, pattern, "Redis subscription opened");
        Ok(RedisSubscription::new(pubsub))
    }

    pub async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let mut conn = self.connection("get")?;
        let value: Option<Vec<u8>> = self
            .run("get", async {
                ::redis::cmd("GET").arg(key).query_async(&mut conn).await
            })
            .await?;
        Ok(value.map(Bytes::from))
    }

    /// SET with a millisecond expiry; a zero TTL stores without expiry
    pub async fn set(&self, key: &str, value: &Bytes, ttl: Duration) -> Result<()> {
        let mut conn = self.connection("set")?;
        let mut cmd = ::redis::cmd("SET");
        cmd.arg(key).arg(&value[..]);
        if !ttl.is_zero() {
            cmd.arg("PX").arg(ttl_millis(ttl));
        }

        let _: () = self
            .run("set", async { cmd.query_async(&mut conn).await })
            .await?;
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.connection("delete")?;
        let removed: i64 = self
            .run("delete", async {
                ::redis::cmd("DEL").arg(key).query_async(&mut conn).await
            })
            .await?;
        Ok(removed > 0)
    }

    /// KEYS scan; acceptable for the small dead-letter keyspace
    pub async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.connection("keys")?;
        let mut keys: Vec<String> = self
            .run("keys", async {
                ::redis::cmd("KEYS").arg(pattern).query_async(&mut conn).await
            })
            .await?;
        keys.sort();
        Ok(keys)
    }

    pub async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<Bytes>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.connection("get_many")?;
        let values: Vec<Option<Vec<u8>>> = self
            .run("get_many", async {
                ::redis::cmd("MGET").arg(keys).query_async(&mut conn).await
            })
            .await?;
        Ok(values.into_iter().map(|v| v.map(Bytes::from)).collect())
    }

    /// Send a batch of commands in one round trip (not MULTI/EXEC)
    pub async fn execute(&self, pipeline: &Pipeline) -> Result<()> {
        if pipeline.is_empty() {
            return Ok(());
        }

        let mut conn = self.connection("pipeline")?;
        let mut pipe = ::redis::pipe();
        for command in pipeline.commands() {
            match command {
                Command::Publish { topic, payload } => {
                    pipe.cmd("PUBLISH").arg(topic).arg(&payload[..]).ignore();
                }
                Command::Set { key, value, ttl } if ttl.is_zero() => {
                    pipe.cmd("SET").arg(key).arg(&value[..]).ignore();
                }
                Command::Set { key, value, ttl } => {
                    pipe.cmd("SET")
                        .arg(key)
                        .arg(&value[..])
                        .arg("PX")
                        .arg(ttl_millis(*ttl))
                        .ignore();
                }
                Command::Delete { key } => {
                    pipe.cmd("DEL").arg(key).ignore();
                }
            }
        }

        let _: () = self
            .run("pipeline", async { pipe.query_async(&mut conn).await })
            .await?;
        Ok(())
    }

    /// PING the server
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.connection("ping")?;
        let reply: String = self
            .run("ping", async {
                ::redis::cmd("PING").query_async(&mut conn).await
            })
            .await?;

        if reply != "PONG" {
            return Err(EventError::transport("ping", format!("unexpected reply '{}'", reply)));
        }
        Ok(())
    }

    /// Release the command connection and refuse further commands
    ///
    /// Open subscriptions own their connections and end when dropped.
    /// Commands already in flight finish on their own clone.
    pub fn close(&self) {
        let released = self
            .conn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if released.is_some() {
            tracing::info!(url = %self.config.redacted_url(), "Redis client closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.conn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Get the configuration
    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    fn connection(&self, op: &str) -> Result<ConnectionManager> {
        self.conn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| EventError::Connection(format!("redis client closed ({})", op)))
    }

    /// Apply the per-command timeout and map Redis errors
    async fn run<T>(
        &self,
        op: &str,
        fut: impl Future<Output = ::redis::RedisResult<T>>,
    ) -> Result<T> {
        let timeout = Duration::from_secs(self.config.timeout_secs);
        match tokio::time::timeout(timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(EventError::transport(op, e)),
            Err(_) => Err(EventError::Timeout(format!(
                "{} timed out after {}s",
                op, self.config.timeout_secs
            ))),
        }
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}
