//! Event handler contract for subscriptions

use crate::types::Event;
use async_trait::async_trait;
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Error type handlers report; any error counts as a failed attempt
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Consumer callback invoked once per delivery attempt
///
/// The token is cancelled when the attempt times out or the subscription
/// shuts down. Handlers are never aborted; they should return promptly
/// once the token fires.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &Event, cancel: CancellationToken) -> Result<(), HandlerError>;
}

/// Handler backed by an async closure
pub struct HandlerFn<F> {
    f: F,
}

/// Wrap an async closure as an [`EventHandler`]
///
/// ```rust
/// use dashbeam_events::handler::handler_fn;
///
/// let handler = handler_fn(|event, _cancel| async move {
///     println!("got {}", event.event_type);
///     Ok(())
/// });
/// # let _ = handler;
/// ```
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(Event, CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    HandlerFn { f }
}

#[async_trait]
impl<F, Fut> EventHandler for HandlerFn<F>
where
    F: Fn(Event, CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    async fn handle(&self, event: &Event, cancel: CancellationToken) -> Result<(), HandlerError> {
        (self.f)(event.clone(), cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::UserLogoutPayload;
    use crate::types::{AppType, Metadata};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use uuid::Uuid;

    fn logout() -> Event {
        Event::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            AppType::Whiteboard,
            UserLogoutPayload {
                session_duration: 1_000,
                logout_reason: "manual".to_string(),
            },
            Metadata::new("1.0.0", "tablet", "dev-9"),
        )
    }

    #[tokio::test]
    async fn test_handler_fn_invokes_closure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let handler = handler_fn(move |event: Event, _cancel| {
            let counter = counter.clone();
            async move {
                assert!(event.is_user_event());
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        handler.handle(&logout(), CancellationToken::new()).await.unwrap();
        handler.handle(&logout(), CancellationToken::new()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_handler_fn_error() {
        let handler = handler_fn(|_event, _cancel| async { Err::<(), HandlerError>("db down".into()) });
        let err = handler
            .handle(&logout(), CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "db down");
    }

    #[tokio::test]
    async fn test_handler_observes_cancellation() {
        let handler = handler_fn(|_event, cancel: CancellationToken| async move {
            cancel.cancelled().await;
            Ok(())
        });
        let token = CancellationToken::new();
        token.cancel();
        handler.handle(&logout(), token).await.unwrap();
    }
}
