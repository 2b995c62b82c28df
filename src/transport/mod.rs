//! Transport trait: the broker abstraction under the event bus
//!
//! A transport offers fire-and-forget pub/sub (exact and glob-pattern
//! subscriptions) plus a small key-value surface with TTLs, key scans and
//! pipelined command batches. Nothing here is durable or acknowledged:
//! a message published while nobody is subscribed is gone.

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

pub mod memory;
pub mod redis;

/// A message received on a subscription channel
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Concrete channel the message was published to
    pub channel: String,

    /// Raw wire bytes
    pub payload: Bytes,
}

/// Receiving end of a subscription
///
/// Dropping the channel unsubscribes it.
#[async_trait]
pub trait Channel: Send {
    /// Wait for the next message
    ///
    /// `Ok(None)` means the channel closed (e.g. broker disconnect);
    /// `Err` means it failed. Either way the channel is finished.
    async fn next(&mut self) -> Result<Option<Message>>;
}

/// A single command inside a pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Publish { topic: String, payload: Bytes },
    Set { key: String, value: Bytes, ttl: Duration },
    Delete { key: String },
}

/// A batch of commands sent to the broker in one round trip
///
/// Pipelines are not transactions: commands are applied in order and a
/// failure in one does not roll back the others.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    commands: Vec<Command>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(mut self, topic: impl Into<String>, payload: Bytes) -> Self {
        self.commands.push(Command::Publish {
            topic: topic.into(),
            payload,
        });
        self
    }

    pub fn set(mut self, key: impl Into<String>, value: Bytes, ttl: Duration) -> Self {
        self.commands.push(Command::Set {
            key: key.into(),
            value,
            ttl,
        });
        self
    }

    pub fn delete(mut self, key: impl Into<String>) -> Self {
        self.commands.push(Command::Delete { key: key.into() });
        self
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Core trait for broker backends
#[async_trait]
pub trait Transport: Send + Sync {
    /// Broadcast bytes on a topic
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<()>;

    /// Open a channel on an exact topic or a glob pattern
    async fn subscribe(&self, topic: &str, pattern: bool) -> Result<Box<dyn Channel>>;

    /// Read a key
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Write a key with a time-to-live
    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()>;

    /// Delete a key, returning whether it existed
    async fn delete(&self, key: &str) -> Result<bool>;

    /// List keys matching a glob pattern
    async fn keys(&self, pattern: &str) -> Result<Vec<String>>;

    /// Read several keys in one pipelined round trip
    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<Bytes>>>;

    /// Execute a pipeline of commands
    async fn execute(&self, pipeline: Pipeline) -> Result<()>;

    /// Close the broker connection
    async fn close(&self) -> Result<()>;

    /// Transport name (e.g., "memory", "redis")
    fn name(&self) -> &str;

    /// Health check: true if the broker answers
    async fn health(&self) -> Result<bool> {
        self.get("__health__").await.map(|_| true)
    }
}

/// Redis-style glob match (`*`, `?`, `[abc]`, `[^a-z]`, `\x`)
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    match_from(&pattern, &text)
}

fn match_from(p: &[char], t: &[char]) -> bool {
    match p.first() {
        None => t.is_empty(),
        Some('*') => {
            let rest = &p[1..];
            (0..=t.len()).any(|i| match_from(rest, &t[i..]))
        }
        Some('?') => !t.is_empty() && match_from(&p[1..], &t[1..]),
        Some('[') => {
            let Some(&c) = t.first() else {
                return false;
            };
            match match_class(&p[1..], c) {
                Some((matched, rest)) => matched && match_from(rest, &t[1..]),
                // Unterminated class: treat '[' literally
                None => c == '[' && match_from(&p[1..], &t[1..]),
            }
        }
        Some('\\') if p.len() > 1 => {
            !t.is_empty() && t[0] == p[1] && match_from(&p[2..], &t[1..])
        }
        Some(&c) => !t.is_empty() && t[0] == c && match_from(&p[1..], &t[1..]),
    }
}

/// Match `c` against a bracket class body; returns the verdict and the
/// pattern after the closing `]`.
fn match_class(p: &[char], c: char) -> Option<(bool, &[char])> {
    let negate = p.first() == Some(&'^');
    let mut i = usize::from(negate);
    let mut matched = false;

    while i < p.len() {
        match p[i] {
            ']' => return Some((matched != negate, &p[i + 1..])),
            '\\' if i + 1 < p.len() => {
                matched |= p[i + 1] == c;
                i += 2;
            }
            lo if i + 2 < p.len() && p[i + 1] == '-' && p[i + 2] != ']' => {
                let hi = p[i + 2];
                matched |= lo <= c && c <= hi;
                i += 3;
            }
            other => {
                matched |= other == c;
                i += 1;
            }
        }
    }
    None
}

/// Escape glob metacharacters so `s` matches only itself
pub fn escape_glob(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
