//! Delivery worker: one task per subscription
//!
//! Reads the subscription channel, decodes each message and drives the
//! handler through its bounded retries. Receipt and handling are strictly
//! sequential: while an event is being retried the channel is not read.
//! Exhausted events go to the dead-letter store. A channel that closes or
//! fails is reopened with backoff; more than [`CHANNEL_FAILURE_LIMIT`]
//! consecutive failures tear the subscription down for good.

use crate::codec::EventCodec;
use crate::dlq::DeadLetterStore;
use crate::error::EventError;
use crate::handler::{EventHandler, HandlerError};
use crate::registry::{SubscriptionId, SubscriptionRegistry};
use crate::transport::{Channel, Message, Transport};
use crate::types::{Event, SubscribeOptions};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Consecutive channel failures tolerated before teardown
pub const CHANNEL_FAILURE_LIMIT: u32 = 5;

pub(crate) struct DeliveryWorker {
    pub id: SubscriptionId,
    pub topic: String,
    pub options: SubscribeOptions,
    pub handler: Arc<dyn EventHandler>,
    pub transport: Arc<dyn Transport>,
    pub codec: EventCodec,
    pub dead_letters: DeadLetterStore,
    pub registry: Arc<SubscriptionRegistry>,
    pub cancel: CancellationToken,
}

impl DeliveryWorker {
    pub(crate) async fn run(self, mut channel: Box<dyn Channel>) {
        let topic = self.topic.as_str();
        tracing::info!(topic, subscription = self.id, pattern = self.options.pattern, "Subscription worker started");

        let mut failures: u32 = 0;
        loop {
            let received = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                received = channel.next() => received,
            };

            match received {
                Ok(Some(message)) => {
                    failures = 0;
                    self.deliver(message).await;
                    continue;
                }
                Ok(None) => tracing::warn!(topic, "Subscription channel closed"),
                Err(e) => tracing::warn!(topic, error = %e, "Subscription channel failed"),
            }

            match self.reconnect(&mut failures).await {
                Some(reopened) => channel = reopened,
                None => break,
            }
        }

        tracing::info!(topic, subscription = self.id, "Subscription worker stopped");
    }

    /// Reopen the channel with backoff; `None` once cancelled or torn down
    async fn reconnect(&self, failures: &mut u32) -> Option<Box<dyn Channel>> {
        let topic = self.topic.as_str();
        loop {
            *failures += 1;
            if *failures > CHANNEL_FAILURE_LIMIT {
                tracing::error!(
                    topic,
                    failures = *failures,
                    "Subscription torn down after repeated channel failures"
                );
                self.registry.remove_if(topic, self.id);
                return None;
            }

            if !self.pause(self.options.backoff_for(*failures)).await {
                return None;
            }

            match self.transport.subscribe(topic, self.options.pattern).await {
                Ok(channel) => {
                    tracing::info!(topic, failures = *failures, "Subscription channel reopened");
                    return Some(channel);
                }
                Err(e) => {
                    tracing::warn!(topic, failures = *failures, error = %e, "Failed to reopen subscription channel");
                }
            }
        }
    }

    async fn deliver(&self, message: Message) {
        let event = match self.codec.decode(&message.payload) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(
                    topic = %self.topic,
                    channel = %message.channel,
                    error = %e,
                    "Dropping undecodable message"
                );
                return;
            }
        };

        let event_id = event.id_label();
        let max_attempts = self.options.max_attempts();
        let mut attempt = 1;
        loop {
            let reason = match self.invoke(&event).await {
                Ok(()) => {
                    tracing::debug!(
                        channel = %message.channel,
                        event_id = %event_id,
                        attempt,
                        "Event handled"
                    );
                    return;
                }
                Err(reason) => reason,
            };

            if attempt >= max_attempts {
                self.dead_letter(&message.channel, &event, attempt, reason).await;
                return;
            }

            tracing::warn!(
                channel = %message.channel,
                event_id = %event_id,
                attempt,
                max_attempts,
                error = %reason,
                "Handler failed, retrying"
            );
            if !self.pause(self.options.backoff_for(attempt)).await {
                tracing::warn!(
                    channel = %message.channel,
                    event_id = %event_id,
                    attempt,
                    "Subscription cancelled during retry backoff, event dropped"
                );
                return;
            }
            attempt += 1;
        }
    }

    /// One handler attempt under the optional deadline
    ///
    /// A panicking handler counts as a failed attempt.
    async fn invoke(&self, event: &Event) -> Result<(), String> {
        let token = self.cancel.child_token();
        let handling = AssertUnwindSafe(async {
            self.handler.handle(event, token.clone()).await
        })
        .catch_unwind();
        tokio::pin!(handling);

        let Some(limit) = self.options.handler_timeout else {
            return attempt_outcome(handling.await);
        };

        tokio::select! {
            result = &mut handling => attempt_outcome(result),
            _ = tokio::time::sleep(limit) => {
                token.cancel();
                let late = attempt_outcome(handling.await);
                let reason = format!("handler timed out after {:?}", limit);
                Err(match late {
                    Ok(()) => reason,
                    Err(e) => format!("{}: {}", reason, e),
                })
            }
        }
    }

    async fn dead_letter(&self, channel: &str, event: &Event, attempts: u32, reason: String) {
        let event_id = event.id_label();
        let exhausted = EventError::DeliveryExhausted {
            event_id: event_id.clone(),
            attempts,
            reason,
        };

        match self
            .dead_letters
            .store_failed(channel, event, &exhausted.to_string(), attempts)
            .await
        {
            Ok(key) => tracing::error!(
                channel,
                event_id = %event_id,
                attempts,
                key = %key,
                error = %exhausted,
                "Event dead-lettered"
            ),
            Err(e) => tracing::error!(
                channel,
                event_id = %event_id,
                attempts,
                error = %e,
                "Failed to store dead letter, event lost"
            ),
        }
    }

    /// Sleep unless cancelled first; false when cancelled
    async fn pause(&self, wait: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(wait) => true,
        }
    }
}

fn attempt_outcome(
    result: std::thread::Result<Result<(), HandlerError>>,
) -> Result<(), String> {
    match result {
        Ok(handled) => handled.map_err(|e| e.to_string()),
        Err(panic) => Err(format!("handler panicked: {}", panic_message(panic.as_ref()))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
