//! Redis pub/sub subscription wrapper

use crate::error::Result;
use crate::transport::{Channel, Message};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;

/// A live Redis pub/sub subscription
///
/// Owns its dedicated connection; dropping it unsubscribes.
pub struct RedisSubscription {
    messages: BoxStream<'static, ::redis::Msg>,
}

impl RedisSubscription {
    pub(crate) fn new(pubsub: ::redis::aio::PubSub) -> Self {
        Self {
            messages: pubsub.into_on_message().boxed(),
        }
    }
}

#[async_trait]
impl Channel for RedisSubscription {
    async fn next(&mut self) -> Result<Option<Message>> {
        // The stream ends when the pub/sub connection drops
        Ok(self.messages.next().await.map(|msg| Message {
            channel: msg.get_channel_name().to_string(),
            payload: Bytes::copy_from_slice(msg.get_payload_bytes()),
        }))
    }
}
