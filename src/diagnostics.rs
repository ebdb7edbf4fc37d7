//! Pluggable sink for meeting-point failure reports.

use std::fmt;

use tracing::warn;

use crate::error::Error;

/// Meeting-point operation a diagnostic refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    RegisterHost,
    JoinHost,
    SendRelayedMessage,
    SubscribeToRelayedMessages,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RegisterHost => "register_host",
            Self::JoinHost => "join_host",
            Self::SendRelayedMessage => "send_relayed_message",
            Self::SubscribeToRelayedMessages => "subscribe_to_relayed_messages",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives every failure a meeting-point client raises, before it is returned.
pub trait DiagnosticSink: Send + Sync {
    fn report(&self, operation: Operation, error: &Error);
}

/// Logs failures through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl DiagnosticSink for TracingDiagnostics {
    fn report(&self, operation: Operation, error: &Error) {
        match std::error::Error::source(error) {
            Some(cause) => warn!("{} failed: {} ({})", operation, error, cause),
            None => warn!("{} failed: {}", operation, error),
        }
    }
}

/// Discards every report.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDiagnostics;

impl DiagnosticSink for NoopDiagnostics {
    fn report(&self, _operation: Operation, _error: &Error) {}
}
