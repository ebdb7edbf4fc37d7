use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};
use url::Url;

use super::{MeetingPointClient, MessageHandler, Subscription};
use crate::error::{Error, Result};
use crate::models::{ClientConfiguration, HostConfiguration, HostId, RelayedMessage, SessionToken};

const HOST_TOKEN_PREFIX: &str = "host";
const CLIENT_TOKEN_PREFIX: &str = "client";
const TOKEN_HEX_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Host,
    Client,
}

#[derive(Debug)]
struct Binding {
    host_id: HostId,
    role: Role,
}

#[derive(Debug)]
struct HostEntry {
    token: SessionToken,
    clients: Vec<SessionToken>,
}

/// Commands sent to the meeting-point actor
enum Command {
    Register {
        host_id: HostId,
        reply: oneshot::Sender<Result<HostConfiguration>>,
    },
    Join {
        host_id: HostId,
        reply: oneshot::Sender<Result<ClientConfiguration>>,
    },
    Relay {
        token: SessionToken,
        message: RelayedMessage,
        reply: oneshot::Sender<Result<()>>,
    },
    Subscribe {
        token: SessionToken,
        tx: mpsc::UnboundedSender<RelayedMessage>,
        reply: oneshot::Sender<Result<()>>,
    },
    DisconnectSubscribers,
    Shutdown,
}

#[derive(Default)]
struct State {
    hosts: HashMap<HostId, HostEntry>,
    bindings: HashMap<SessionToken, Binding>,
    subscribers: HashMap<SessionToken, Vec<mpsc::UnboundedSender<RelayedMessage>>>,
}

impl State {
    fn register(&mut self, host_id: HostId) -> Result<HostConfiguration> {
        if self.hosts.contains_key(&host_id) {
            return Err(Error::host_id_in_use(format!("host id '{}' is already in use", host_id))
                .with_status(400));
        }

        let token = SessionToken::generate(HOST_TOKEN_PREFIX);
        self.bindings.insert(
            token.clone(),
            Binding {
                host_id: host_id.clone(),
                role: Role::Host,
            },
        );
        self.hosts.insert(
            host_id.clone(),
            HostEntry {
                token: token.clone(),
                clients: Vec::new(),
            },
        );

        info!("Host registered: {}", host_id);
        Ok(HostConfiguration {
            host_id,
            host_token: token,
            send_url: None,
            receive_url: None,
        })
    }

    fn join(&mut self, host_id: HostId) -> Result<ClientConfiguration> {
        let Some(host) = self.hosts.get_mut(&host_id) else {
            return Err(Error::invalid_host_id(format!("unknown host id '{}'", host_id))
                .with_status(400));
        };

        let token = SessionToken::generate(CLIENT_TOKEN_PREFIX);
        host.clients.push(token.clone());
        self.bindings.insert(
            token.clone(),
            Binding {
                host_id: host_id.clone(),
                role: Role::Client,
            },
        );

        info!("Client joined host {}", host_id);
        Ok(ClientConfiguration {
            client_token: token,
            send_url: None,
            receive_url: None,
        })
    }

    fn relay(&mut self, token: &SessionToken, message: RelayedMessage) -> Result<()> {
        if !is_well_formed(token) {
            return Err(Error::invalid_token("malformed token").with_status(401));
        }
        let binding = self.bindings.get(token).ok_or_else(|| {
            Error::invalid_client_or_host_id("token does not belong to an active session")
                .with_status(400)
        })?;
        let host = self.hosts.get(&binding.host_id).ok_or_else(|| {
            Error::invalid_client_or_host_id("host session has ended").with_status(400)
        })?;

        let recipients: Vec<SessionToken> = match binding.role {
            Role::Client => vec![host.token.clone()],
            Role::Host => host.clients.clone(),
        };

        for recipient in &recipients {
            if let Some(senders) = self.subscribers.get_mut(recipient) {
                senders.retain(|tx| tx.send(message.clone()).is_ok());
            }
        }
        debug!("Relayed message from {} to {} peer(s)", token, recipients.len());
        Ok(())
    }

    fn subscribe(
        &mut self,
        token: SessionToken,
        tx: mpsc::UnboundedSender<RelayedMessage>,
    ) -> Result<()> {
        if !is_well_formed(&token) || !self.bindings.contains_key(&token) {
            return Err(
                Error::meeting_point("event stream rejected: unknown token").with_status(400)
            );
        }
        self.subscribers.entry(token).or_default().push(tx);
        Ok(())
    }
}

/// `host_<16 hex>` or `client_<16 hex>`.
fn is_well_formed(token: &SessionToken) -> bool {
    let Some((prefix, hex)) = token.as_str().split_once('_') else {
        return false;
    };
    (prefix == HOST_TOKEN_PREFIX || prefix == CLIENT_TOKEN_PREFIX)
        && hex.len() == TOKEN_HEX_LEN
        && hex.chars().all(|c| c.is_ascii_hexdigit())
}

async fn meeting_point_actor(mut rx: mpsc::Receiver<Command>) {
    let mut state = State::default();

    while let Some(cmd) = rx.recv().await {
        match cmd {
            Command::Register { host_id, reply } => {
                let _ = reply.send(state.register(host_id));
            }
            Command::Join { host_id, reply } => {
                let _ = reply.send(state.join(host_id));
            }
            Command::Relay {
                token,
                message,
                reply,
            } => {
                let _ = reply.send(state.relay(&token, message));
            }
            Command::Subscribe { token, tx, reply } => {
                let _ = reply.send(state.subscribe(token, tx));
            }
            Command::DisconnectSubscribers => {
                info!("Dropping {} event stream(s)", state.subscribers.len());
                state.subscribers.clear();
            }
            Command::Shutdown => break,
        }
    }

    info!("Meeting point stopped");
}

/// In-process meeting point.
///
/// Implements the full rendezvous protocol behind the same capability as the
/// HTTP client, so sessions can run without a server. Endpoint overrides are
/// ignored. After [`shutdown`](Self::shutdown) every operation fails with
/// `MeetingPointUnreachable`.
#[derive(Clone)]
pub struct MemoryMeetingPoint {
    tx: mpsc::Sender<Command>,
}

impl Default for MemoryMeetingPoint {
    /// Same as [`MemoryMeetingPoint::new`].
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryMeetingPoint {
    /// Starts the meeting-point actor on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel::<Command>(1024);
        tokio::spawn(meeting_point_actor(rx));
        Self { tx }
    }

    /// Ends every open event stream, as a server restart would.
    pub async fn disconnect_subscribers(&self) {
        let _ = self.tx.send(Command::DisconnectSubscribers).await;
    }

    pub async fn shutdown(&self) {
        let _ = self.tx.send(Command::Shutdown).await;
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<Result<T>>) -> Command,
    ) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(command(reply_tx))
            .await
            .map_err(|_| Error::unreachable("meeting point is not running"))?;
        reply_rx
            .await
            .map_err(|_| Error::unreachable("meeting point is not running"))?
    }
}

#[async_trait]
impl MeetingPointClient for MemoryMeetingPoint {
    async fn register_host(&self, host_id: &HostId) -> Result<HostConfiguration> {
        let host_id = host_id.clone();
        self.request(|reply| Command::Register { host_id, reply })
            .await
    }

    async fn join_host(&self, host_id: &HostId) -> Result<ClientConfiguration> {
        let host_id = host_id.clone();
        self.request(|reply| Command::Join { host_id, reply }).await
    }

    async fn send_relayed_message(
        &self,
        token: &SessionToken,
        message: &RelayedMessage,
        _endpoint: Option<&Url>,
    ) -> Result<()> {
        let token = token.clone();
        let message = message.clone();
        self.request(|reply| Command::Relay {
            token,
            message,
            reply,
        })
        .await
    }

    async fn subscribe_to_relayed_messages(
        &self,
        token: &SessionToken,
        handler: MessageHandler,
        _endpoint: Option<&Url>,
    ) -> Result<Subscription> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let token = token.clone();
        self.request(|reply| Command::Subscribe { token, tx, reply })
            .await?;

        Ok(Subscription::spawn(handler, |mut dispatcher| async move {
            while let Some(message) = rx.recv().await {
                if !dispatcher.dispatch(message) {
                    return Ok(());
                }
            }
            if dispatcher.is_closed() {
                return Ok(());
            }
            Err(Error::meeting_point("event stream closed by meeting point"))
        }))
    }
}
