//! Entry point: resolves the meeting point once and hands out host/client
//! session handles wired to it.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, trace};
use url::Url;

use crate::config::{
    ConfigError, ConnectionSettings, MeetingPointSource, RendezvousOptions, resolve_meeting_point,
};
use crate::error::Error;
use crate::meeting_point::{MeetingPointClient, Subscription};
use crate::models::{HostId, InvalidIdentifier, RelayedMessage, SessionToken};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    MeetingPoint(#[from] Error),

    #[error("failed to serialize relayed message: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Host,
    Client,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => f.write_str("host"),
            Self::Client => f.write_str("client"),
        }
    }
}

/// What every session handle carries from the facade.
#[derive(Clone)]
struct SessionContext {
    meeting_point: Arc<dyn MeetingPointClient>,
    connection: ConnectionSettings,
    debug: bool,
}

impl SessionContext {
    fn lifecycle(&self, args: fmt::Arguments<'_>) {
        if self.debug {
            debug!("{}", args);
        } else {
            trace!("{}", args);
        }
    }
}

/// Owns the meeting-point client chosen at construction.
pub struct Rendezvous {
    ctx: SessionContext,
    source: MeetingPointSource,
}

impl Rendezvous {
    pub fn new(options: RendezvousOptions) -> Result<Self, ConfigError> {
        let (meeting_point, source) = resolve_meeting_point(&options)?;
        let ctx = SessionContext {
            meeting_point,
            connection: options.connection.unwrap_or_default(),
            debug: options.debug,
        };
        ctx.lifecycle(format_args!("Meeting point resolved: {:?}", source));

        Ok(Self { ctx, source })
    }

    /// Act as host for `host_id`.
    pub fn host(&self, host_id: &str) -> Result<HostSession, InvalidIdentifier> {
        Ok(HostSession {
            ctx: self.ctx.clone(),
            host_id: HostId::new(host_id)?,
        })
    }

    /// Act as a client joining `host_id`.
    pub fn join(&self, host_id: &str) -> Result<ClientSession, InvalidIdentifier> {
        Ok(ClientSession {
            ctx: self.ctx.clone(),
            host_id: HostId::new(host_id)?,
        })
    }

    pub fn meeting_point(&self) -> &Arc<dyn MeetingPointClient> {
        &self.ctx.meeting_point
    }

    pub fn meeting_point_source(&self) -> &MeetingPointSource {
        &self.source
    }

    pub fn connection_settings(&self) -> &ConnectionSettings {
        &self.ctx.connection
    }

    pub fn is_debug(&self) -> bool {
        self.ctx.debug
    }
}

/// Host side before registration.
pub struct HostSession {
    ctx: SessionContext,
    host_id: HostId,
}

impl HostSession {
    pub fn host_id(&self) -> &HostId {
        &self.host_id
    }

    pub fn connection_settings(&self) -> &ConnectionSettings {
        &self.ctx.connection
    }

    /// Registers the host id. Not retried: a second registration of the same
    /// id fails with `HostIdAlreadyInUse`.
    pub async fn register(self) -> Result<SignalingChannel, Error> {
        self.ctx
            .lifecycle(format_args!("Registering host {}", self.host_id));
        let config = self.ctx.meeting_point.register_host(&self.host_id).await?;
        self.ctx
            .lifecycle(format_args!("Host {} registered", config.host_id));

        Ok(SignalingChannel {
            ctx: self.ctx,
            role: Role::Host,
            host_id: self.host_id,
            token: config.host_token,
            send_url: config.send_url,
            receive_url: config.receive_url,
        })
    }
}

/// Client side before joining.
pub struct ClientSession {
    ctx: SessionContext,
    host_id: HostId,
}

impl ClientSession {
    pub fn host_id(&self) -> &HostId {
        &self.host_id
    }

    pub fn connection_settings(&self) -> &ConnectionSettings {
        &self.ctx.connection
    }

    pub async fn join(self) -> Result<SignalingChannel, Error> {
        self.ctx
            .lifecycle(format_args!("Joining host {}", self.host_id));
        let config = self.ctx.meeting_point.join_host(&self.host_id).await?;
        self.ctx
            .lifecycle(format_args!("Joined host {}", self.host_id));

        Ok(SignalingChannel {
            ctx: self.ctx,
            role: Role::Client,
            host_id: self.host_id,
            token: config.client_token,
            send_url: config.send_url,
            receive_url: config.receive_url,
        })
    }
}

/// Relay channel of a registered host or joined client.
///
/// Holds the session token and the endpoints the meeting point assigned;
/// this is what the peer-connection layer drives its offer/answer exchange
/// through.
pub struct SignalingChannel {
    ctx: SessionContext,
    role: Role,
    host_id: HostId,
    token: SessionToken,
    send_url: Option<Url>,
    receive_url: Option<Url>,
}

impl SignalingChannel {
    pub fn role(&self) -> Role {
        self.role
    }

    pub fn host_id(&self) -> &HostId {
        &self.host_id
    }

    pub fn token(&self) -> &SessionToken {
        &self.token
    }

    pub fn connection_settings(&self) -> &ConnectionSettings {
        &self.ctx.connection
    }

    pub fn is_debug(&self) -> bool {
        self.ctx.debug
    }

    pub async fn send_raw(&self, message: &RelayedMessage) -> Result<(), Error> {
        self.ctx.lifecycle(format_args!(
            "{} {} sending relayed message",
            self.role, self.host_id
        ));
        self.ctx
            .meeting_point
            .send_relayed_message(&self.token, message, self.send_url.as_ref())
            .await
    }

    /// Serializes `message` to JSON and relays it.
    pub async fn send<M: Serialize + ?Sized>(&self, message: &M) -> Result<(), SessionError> {
        let value = serde_json::to_value(message)?;
        Ok(self.send_raw(&value).await?)
    }

    pub async fn subscribe<F>(&self, handler: F) -> Result<Subscription, Error>
    where
        F: FnMut(RelayedMessage) + Send + 'static,
    {
        self.ctx.lifecycle(format_args!(
            "{} {} subscribing to relayed messages",
            self.role, self.host_id
        ));
        self.ctx
            .meeting_point
            .subscribe_to_relayed_messages(&self.token, Box::new(handler), self.receive_url.as_ref())
            .await
    }
}

impl fmt::Debug for SignalingChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalingChannel")
            .field("role", &self.role)
            .field("host_id", &self.host_id)
            .field("send_url", &self.send_url)
            .field("receive_url", &self.receive_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;
    use crate::error::ErrorKind;
    use crate::meeting_point::{MemoryMeetingPoint, MessageHandler};
    use crate::messages::SignalMessage;
    use crate::models::{ClientConfiguration, HostConfiguration};

    fn memory_rendezvous() -> Rendezvous {
        Rendezvous::new(
            RendezvousOptions::new().with_meeting_point_client(Arc::new(MemoryMeetingPoint::new())),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn host_and_client_exchange_offer_and_answer() {
        let rendezvous = memory_rendezvous();
        assert_eq!(rendezvous.meeting_point_source(), &MeetingPointSource::Custom);

        let host = rendezvous.host("room-42").unwrap().register().await.unwrap();
        let client = rendezvous.join("room-42").unwrap().join().await.unwrap();
        assert_eq!(host.role(), Role::Host);
        assert_eq!(client.role(), Role::Client);
        assert_ne!(host.token(), client.token());

        let (host_tx, mut host_rx) = mpsc::unbounded_channel();
        let _host_sub = host
            .subscribe(move |msg| {
                let _ = host_tx.send(msg);
            })
            .await
            .unwrap();
        let (client_tx, mut client_rx) = mpsc::unbounded_channel();
        let _client_sub = client
            .subscribe(move |msg| {
                let _ = client_tx.send(msg);
            })
            .await
            .unwrap();

        let offer = SignalMessage::Offer {
            sdp: "v=0".to_string(),
        };
        client.send(&offer).await.unwrap();
        let received: SignalMessage = serde_json::from_value(host_rx.recv().await.unwrap()).unwrap();
        assert_eq!(received, offer);

        host.send(&SignalMessage::Answer {
            sdp: "v=0".to_string(),
        })
        .await
        .unwrap();
        assert_eq!(
            client_rx.recv().await.unwrap(),
            json!({"type": "answer", "sdp": "v=0"})
        );
    }

    #[tokio::test]
    async fn joining_unknown_room_is_invalid_host_id() {
        let rendezvous = memory_rendezvous();
        let err = rendezvous
            .join("nonexistent-room")
            .unwrap()
            .join()
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidHostId);
    }

    #[tokio::test]
    async fn registering_twice_fails() {
        let rendezvous = memory_rendezvous();
        rendezvous.host("room-42").unwrap().register().await.unwrap();
        let err = rendezvous
            .host("room-42")
            .unwrap()
            .register()
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::HostIdAlreadyInUse);
    }

    #[test]
    fn empty_host_id_is_rejected() {
        let rendezvous = Rendezvous::new(RendezvousOptions::default()).unwrap();
        assert!(matches!(
            rendezvous.host(""),
            Err(InvalidIdentifier::EmptyHostId)
        ));
        assert!(rendezvous.join("").is_err());
    }

    #[tokio::test]
    async fn unserializable_message_fails_fast() {
        let rendezvous = memory_rendezvous();
        let host = rendezvous.host("room").unwrap().register().await.unwrap();
        let bad: BTreeMap<(u8, u8), u8> = BTreeMap::from([((1, 2), 3)]);
        let err = host.send(&bad).await.unwrap_err();
        assert!(matches!(err, SessionError::Serialize(_)));
    }

    #[test]
    fn options_flow_into_sessions() {
        let connection = ConnectionSettings {
            ice_servers: vec![crate::config::IceServer::stun("stun:stun.example:3478")],
        };
        let rendezvous = Rendezvous::new(
            RendezvousOptions::new()
                .with_meeting_point_url("https://mp.example/")
                .with_connection(connection.clone())
                .with_debug(true),
        )
        .unwrap();
        assert!(rendezvous.is_debug());
        assert_eq!(rendezvous.connection_settings(), &connection);

        let host = rendezvous.host("room").unwrap();
        assert_eq!(host.host_id().as_str(), "room");
        assert_eq!(host.connection_settings(), &connection);
        let client = rendezvous.join("room").unwrap();
        assert_eq!(client.connection_settings(), &connection);
    }

    #[test]
    fn default_connection_settings_without_override() {
        let rendezvous = Rendezvous::new(RendezvousOptions::default()).unwrap();
        assert_eq!(
            rendezvous.connection_settings(),
            &ConnectionSettings::default()
        );
    }

    /// Records which endpoints the session layer passes down.
    #[derive(Default)]
    struct EndpointRecorder {
        seen: Mutex<Vec<(&'static str, Option<Url>)>>,
    }

    #[async_trait]
    impl MeetingPointClient for EndpointRecorder {
        async fn register_host(&self, host_id: &HostId) -> crate::Result<HostConfiguration> {
            Ok(HostConfiguration {
                host_id: host_id.clone(),
                host_token: SessionToken::from("T1"),
                send_url: None,
                receive_url: Some(Url::parse("https://recv.example/host").unwrap()),
            })
        }

        async fn join_host(&self, _host_id: &HostId) -> crate::Result<ClientConfiguration> {
            Ok(ClientConfiguration {
                client_token: SessionToken::from("T2"),
                send_url: Some(Url::parse("https://send.example/").unwrap()),
                receive_url: Some(Url::parse("https://recv.example/client").unwrap()),
            })
        }

        async fn send_relayed_message(
            &self,
            _token: &SessionToken,
            _message: &RelayedMessage,
            endpoint: Option<&Url>,
        ) -> crate::Result<()> {
            self.seen.lock().unwrap().push(("send", endpoint.cloned()));
            Ok(())
        }

        async fn subscribe_to_relayed_messages(
            &self,
            _token: &SessionToken,
            handler: MessageHandler,
            endpoint: Option<&Url>,
        ) -> crate::Result<Subscription> {
            self.seen.lock().unwrap().push(("subscribe", endpoint.cloned()));
            Ok(Subscription::spawn(handler, |_| async { Ok(()) }))
        }
    }

    #[tokio::test]
    async fn assigned_endpoints_are_used() {
        let recorder = Arc::new(EndpointRecorder::default());
        let rendezvous =
            Rendezvous::new(RendezvousOptions::new().with_meeting_point_client(recorder.clone()))
                .unwrap();

        let host = rendezvous.host("room").unwrap().register().await.unwrap();
        host.send(&json!("x")).await.unwrap();
        host.subscribe(|_| {}).await.unwrap();

        let client = rendezvous.join("room").unwrap().join().await.unwrap();
        client.send(&json!("y")).await.unwrap();
        client.subscribe(|_| {}).await.unwrap();

        let seen = recorder.seen.lock().unwrap();
        let url = |s: &str| Some(Url::parse(s).unwrap());
        assert_eq!(
            seen.as_slice(),
            &[
                ("send", None),
                ("subscribe", url("https://recv.example/host")),
                ("send", url("https://send.example/")),
                ("subscribe", url("https://recv.example/client")),
            ]
        );
    }
}
