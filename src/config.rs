//! Rendezvous configuration.
//!
//! [`RendezvousOptions`] is the programmatic surface. [`MeetpointConfig`] is
//! the file form (TOML), converted into options with
//! [`MeetpointConfig::into_options`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::diagnostics::DiagnosticSink;
use crate::meeting_point::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT, HttpMeetingPointClient, MeetingPointClient,
};

/// Meeting point used when neither a client nor a URL is configured.
pub const DEFAULT_MEETING_POINT_URL: &str = "https://demo.uhst.io/";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid meeting point url '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("failed to read config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// NAT-traversal server handed to the peer-connection layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServer {
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }
}

/// Parameters for the downstream peer connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSettings {
    pub ice_servers: Vec<IceServer>,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            ice_servers: vec![
                IceServer::stun("stun:stun.l.google.com:19302"),
                IceServer::stun("stun:global.stun.twilio.com:3478"),
            ],
        }
    }
}

/// Options for [`Rendezvous::new`](crate::Rendezvous::new).
///
/// When both `meeting_point_client` and `meeting_point_url` are set the
/// client wins. With neither, [`DEFAULT_MEETING_POINT_URL`] is used.
#[derive(Clone)]
pub struct RendezvousOptions {
    pub meeting_point_client: Option<Arc<dyn MeetingPointClient>>,
    pub meeting_point_url: Option<String>,
    pub connection: Option<ConnectionSettings>,
    pub debug: bool,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub diagnostics: Option<Arc<dyn DiagnosticSink>>,
}

impl Default for RendezvousOptions {
    fn default() -> Self {
        Self {
            meeting_point_client: None,
            meeting_point_url: None,
            connection: None,
            debug: false,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            diagnostics: None,
        }
    }
}

impl std::fmt::Debug for RendezvousOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RendezvousOptions")
            .field("meeting_point_client", &self.meeting_point_client.is_some())
            .field("meeting_point_url", &self.meeting_point_url)
            .field("connection", &self.connection)
            .field("debug", &self.debug)
            .field("request_timeout", &self.request_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("diagnostics", &self.diagnostics.is_some())
            .finish()
    }
}

impl RendezvousOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_meeting_point_client(mut self, client: Arc<dyn MeetingPointClient>) -> Self {
        self.meeting_point_client = Some(client);
        self
    }

    pub fn with_meeting_point_url(mut self, url: impl Into<String>) -> Self {
        self.meeting_point_url = Some(url.into());
        self
    }

    pub fn with_connection(mut self, connection: ConnectionSettings) -> Self {
        self.connection = Some(connection);
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_timeouts(mut self, request: Duration, connect: Duration) -> Self {
        self.request_timeout = request;
        self.connect_timeout = connect;
        self
    }

    /// Sink for failures of the HTTP meeting-point client. Ignored when a
    /// custom client is supplied.
    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn DiagnosticSink>) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }
}

/// How the meeting-point client was chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeetingPointSource {
    Custom,
    Url(Url),
    Fallback(Url),
}

/// Picks the single meeting-point client a [`Rendezvous`](crate::Rendezvous)
/// uses for its whole lifetime.
pub(crate) fn resolve_meeting_point(
    options: &RendezvousOptions,
) -> Result<(Arc<dyn MeetingPointClient>, MeetingPointSource), ConfigError> {
    if let Some(client) = &options.meeting_point_client {
        return Ok((client.clone(), MeetingPointSource::Custom));
    }

    let (url, source): (Url, fn(Url) -> MeetingPointSource) = match &options.meeting_point_url {
        Some(url) => (parse_url(url)?, MeetingPointSource::Url),
        None => (parse_url(DEFAULT_MEETING_POINT_URL)?, MeetingPointSource::Fallback),
    };

    let mut client =
        HttpMeetingPointClient::with_timeouts(url.clone(), options.request_timeout, options.connect_timeout)?;
    if let Some(diagnostics) = &options.diagnostics {
        client = client.with_diagnostics(diagnostics.clone());
    }
    Ok((Arc::new(client), source(url)))
}

fn parse_url(url: &str) -> Result<Url, ConfigError> {
    Url::parse(url).map_err(|source| ConfigError::InvalidUrl {
        url: url.to_string(),
        source,
    })
}

/// File form of the configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeetpointConfig {
    /// Meeting point base URL.
    pub meeting_point_url: Option<String>,

    /// NAT-traversal servers; the built-in list when absent.
    pub ice_servers: Option<Vec<IceServer>>,

    /// Debug mode.
    pub debug: bool,

    /// Timeout for one-shot requests, in seconds.
    pub request_timeout_secs: Option<u64>,

    /// Connection timeout, in seconds.
    pub connect_timeout_secs: Option<u64>,
}

impl MeetpointConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn into_options(self) -> RendezvousOptions {
        let mut options = RendezvousOptions::new().with_debug(self.debug);
        options.meeting_point_url = self.meeting_point_url;
        options.connection = self
            .ice_servers
            .map(|ice_servers| ConnectionSettings { ice_servers });
        if let Some(secs) = self.request_timeout_secs {
            options.request_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.connect_timeout_secs {
            options.connect_timeout = Duration::from_secs(secs);
        }
        options
    }
}
