//! Subscription registry: at most one live worker per topic
//!
//! Installing on a topic that already has a subscription cancels the old
//! worker and chains the new one behind its `JoinHandle`, so two workers
//! never run handlers for the same topic at once. The map lock is only
//! held for map updates, never across an await.

use crate::error::{EventError, Result};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Identifies one installation on a topic
pub type SubscriptionId = u64;

struct ActiveSubscription {
    id: SubscriptionId,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Owner of every active subscription worker
#[derive(Default)]
pub struct SubscriptionRegistry {
    subscriptions: Mutex<HashMap<String, ActiveSubscription>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ActiveSubscription>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Install a worker for `topic`, replacing any existing one
    ///
    /// `start` receives the new subscription id and builds the worker
    /// future; the future is not polled until the replaced worker (if
    /// any) has finished.
    pub fn install<F, Fut>(
        &self,
        topic: &str,
        cancel: CancellationToken,
        start: F,
    ) -> Result<SubscriptionId>
    where
        F: FnOnce(SubscriptionId) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.closed.load(Ordering::SeqCst) {
            return Err(EventError::Connection(
                "subscription registry is shut down".to_string(),
            ));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let worker = start(id);

        let mut subscriptions = self.lock();
        let previous = subscriptions.remove(topic).map(|prev| {
            prev.cancel.cancel();
            tracing::info!(topic, replaced = prev.id, "Replacing existing subscription");
            prev.task
        });

        let task = tokio::spawn(async move {
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            worker.await;
        });

        subscriptions.insert(topic.to_string(), ActiveSubscription { id, cancel, task });
        Ok(id)
    }

    /// Remove and stop the subscription on `topic`, waiting for its worker
    pub async fn remove(&self, topic: &str) -> bool {
        let removed = self.lock().remove(topic);
        match removed {
            Some(sub) => {
                sub.cancel.cancel();
                if let Err(e) = sub.task.await {
                    tracing::warn!(topic, error = %e, "Subscription worker ended abnormally");
                }
                true
            }
            None => false,
        }
    }

    /// Remove `topic` only if it is still owned by subscription `id`
    ///
    /// Used by workers tearing themselves down, so it does not wait.
    pub fn remove_if(&self, topic: &str, id: SubscriptionId) -> bool {
        let mut subscriptions = self.lock();
        match subscriptions.get(topic) {
            Some(sub) if sub.id == id => {
                if let Some(sub) = subscriptions.remove(topic) {
                    sub.cancel.cancel();
                }
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.lock().contains_key(topic)
    }

    /// Topics with an active subscription, sorted
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.lock().keys().cloned().collect();
        topics.sort();
        topics
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Stop every worker and refuse further installs
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let drained: Vec<(String, ActiveSubscription)> = self.lock().drain().collect();

        for (_, sub) in &drained {
            sub.cancel.cancel();
        }
        for (topic, sub) in drained {
            if let Err(e) = sub.task.await {
                tracing::warn!(topic = %topic, error = %e, "Subscription worker ended abnormally");
            }
        }
    }
}
