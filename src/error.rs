use std::fmt;

use thiserror::Error;

/// Classification of every way a meeting-point exchange can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The transport call failed before any HTTP status was obtained.
    MeetingPointUnreachable,
    /// Host registration rejected: the identifier is taken.
    HostIdAlreadyInUse,
    /// Join rejected: no active registration for the identifier.
    InvalidHostId,
    /// Relayed send rejected: the token's session cannot be resolved.
    InvalidClientOrHostId,
    /// Relayed send rejected: the token is invalid or expired.
    InvalidToken,
    /// Any other rejection, or a failure of the event stream.
    MeetingPointError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MeetingPointUnreachable => "meeting_point_unreachable",
            Self::HostIdAlreadyInUse => "host_id_already_in_use",
            Self::InvalidHostId => "invalid_host_id",
            Self::InvalidClientOrHostId => "invalid_client_or_host_id",
            Self::InvalidToken => "invalid_token",
            Self::MeetingPointError => "meeting_point_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error raised by a meeting-point operation.
///
/// Carries the [`ErrorKind`] callers branch on, a human-readable detail, the
/// HTTP status when the meeting point answered, and the transport error when
/// it did not.
#[derive(Debug, Error)]
pub struct Error {
    kind: ErrorKind,
    message: String,
    status: Option<u16>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            source: None,
        }
    }

    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MeetingPointUnreachable, message)
    }

    pub fn host_id_in_use(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::HostIdAlreadyInUse, message)
    }

    pub fn invalid_host_id(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidHostId, message)
    }

    pub fn invalid_client_or_host_id(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidClientOrHostId, message)
    }

    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidToken, message)
    }

    pub fn meeting_point(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MeetingPointError, message)
    }

    /// Attaches the HTTP status the meeting point answered with.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Attaches the underlying cause.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// True when the meeting point could not be reached at all.
    pub fn is_unreachable(&self) -> bool {
        self.kind == ErrorKind::MeetingPointUnreachable
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(status) = self.status {
            write!(f, " (status {})", status)?;
        }
        Ok(())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
