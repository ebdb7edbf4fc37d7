use std::fmt;

use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use url::Url;

/// Payload relayed between the two peers. No schema is imposed beyond JSON.
pub type RelayedMessage = serde_json::Value;

const HEX_CHARS: &[u8] = b"0123456789abcdef";
const TOKEN_HEX_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidIdentifier {
    #[error("host id must not be empty")]
    EmptyHostId,
}

/// Rendezvous identifier chosen by the host peer. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct HostId(String);

impl HostId {
    pub fn new(id: impl Into<String>) -> Result<Self, InvalidIdentifier> {
        let id = id.into();
        if id.is_empty() {
            return Err(InvalidIdentifier::EmptyHostId);
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<&str> for HostId {
    type Error = InvalidIdentifier;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl<'de> Deserialize<'de> for HostId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        HostId::new(s).map_err(serde::de::Error::custom)
    }
}

/// Credential bound to one role in one rendezvous session.
///
/// Opaque to the client; the meeting point alone decides validity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Random token of the form `<prefix>_<16 hex>`.
    pub fn generate(prefix: &str) -> Self {
        let mut rng = rand::rng();
        let value: u64 = rng.random();

        let mut token = String::with_capacity(prefix.len() + 1 + TOKEN_HEX_LEN);
        token.push_str(prefix);
        token.push('_');
        for i in 0..TOKEN_HEX_LEN {
            let nibble = ((value >> (60 - i * 4)) & 0xF) as usize;
            token.push(HEX_CHARS[nibble] as char);
        }
        Self(token)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionToken {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SessionToken {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Returned to the host after a successful registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostConfiguration {
    pub host_id: HostId,
    pub host_token: SessionToken,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_url: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receive_url: Option<Url>,
}

/// Returned to a joining peer after a successful join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfiguration {
    pub client_token: SessionToken,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_url: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receive_url: Option<Url>,
}
