//! The meeting-point capability and its implementations.

mod event_stream;
mod http;
mod memory;

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::task::JoinHandle;
use url::Url;

use crate::error::{Error, Result};
use crate::models::{ClientConfiguration, HostConfiguration, HostId, RelayedMessage, SessionToken};

pub use event_stream::{EventStreamDecoder, MAX_LINE_LENGTH, ServerEvent};
pub use http::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT, HttpMeetingPointClient};
pub use memory::MemoryMeetingPoint;

/// Callback invoked once per inbound relayed message, in arrival order.
pub type MessageHandler = Box<dyn FnMut(RelayedMessage) + Send + 'static>;

/// Operations a signaling transport must provide.
///
/// Implementations hold no per-session state and are shared between
/// concurrent sessions.
#[async_trait]
pub trait MeetingPointClient: Send + Sync {
    /// Registers `host_id` and returns the host's session configuration.
    /// Registering an identifier twice fails with `HostIdAlreadyInUse`.
    async fn register_host(&self, host_id: &HostId) -> Result<HostConfiguration>;

    /// Joins a registered host.
    async fn join_host(&self, host_id: &HostId) -> Result<ClientConfiguration>;

    /// Hands `message` to the meeting point for relay to the token's peer.
    async fn send_relayed_message(
        &self,
        token: &SessionToken,
        message: &RelayedMessage,
        endpoint: Option<&Url>,
    ) -> Result<()>;

    /// Opens the relayed stream for `token`. Failing to establish the stream
    /// is returned here; failures after that end the [`Subscription`].
    async fn subscribe_to_relayed_messages(
        &self,
        token: &SessionToken,
        handler: MessageHandler,
        endpoint: Option<&Url>,
    ) -> Result<Subscription>;
}

/// Delivers messages to the subscriber's handler until the subscription closes.
pub struct Dispatcher {
    handler: MessageHandler,
    closed: Arc<AtomicBool>,
}

impl Dispatcher {
    /// Invokes the handler unless the subscription was closed.
    /// Returns `false` once closed so pumps can stop.
    pub fn dispatch(&mut self, message: RelayedMessage) -> bool {
        if self.is_closed() {
            return false;
        }
        (self.handler)(message);
        true
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Live handle on a relayed message stream.
///
/// Dropping the handle closes it.
pub struct Subscription {
    closed: Arc<AtomicBool>,
    task: Option<JoinHandle<Result<()>>>,
}

impl Subscription {
    /// Spawns `pump` with a [`Dispatcher`] wrapping `handler`. The pump's
    /// result is the subscription's terminal outcome.
    pub fn spawn<P, F>(handler: MessageHandler, pump: P) -> Self
    where
        P: FnOnce(Dispatcher) -> F,
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let closed = Arc::new(AtomicBool::new(false));
        let dispatcher = Dispatcher {
            handler,
            closed: closed.clone(),
        };
        let task = tokio::spawn(pump(dispatcher));

        Self {
            closed,
            task: Some(task),
        }
    }

    /// Stops delivery and releases the underlying connection. Idempotent.
    /// No handler invocation starts after this returns.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        if let Some(task) = &self.task {
            task.abort();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// True once the stream has ended for any reason.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(|task| task.is_finished())
    }

    /// Waits for the stream to end. `Ok(())` after [`close`](Self::close);
    /// a `MeetingPointError` when the stream failed after it was established.
    pub async fn finished(&mut self) -> Result<()> {
        let Some(task) = self.task.take() else {
            return Ok(());
        };
        match task.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Ok(()),
            Err(e) => Err(Error::meeting_point("subscription task panicked").with_source(e)),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("closed", &self.is_closed())
            .field("finished", &self.is_finished())
            .finish()
    }
}
