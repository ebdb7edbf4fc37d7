//! Rendezvous (signaling) client for peers that cannot reach each other
//! directly.
//!
//! A host registers an identifier with a meeting point, a client joins with
//! the same identifier, and both then relay opaque signaling payloads through
//! the meeting point until a direct connection can be set up.

pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod meeting_point;
pub mod messages;
pub mod models;
pub mod session;

#[cfg(test)]
mod testing;

pub use config::{
    ConfigError, ConnectionSettings, DEFAULT_MEETING_POINT_URL, IceServer, MeetingPointSource,
    MeetpointConfig, RendezvousOptions,
};
pub use diagnostics::{DiagnosticSink, NoopDiagnostics, Operation, TracingDiagnostics};
pub use error::{Error, ErrorKind, Result};
pub use meeting_point::{
    HttpMeetingPointClient, MeetingPointClient, MemoryMeetingPoint, MessageHandler, Subscription,
};
pub use messages::SignalMessage;
pub use models::{
    ClientConfiguration, HostConfiguration, HostId, InvalidIdentifier, RelayedMessage,
    SessionToken,
};
pub use session::{ClientSession, HostSession, Rendezvous, Role, SessionError, SignalingChannel};
