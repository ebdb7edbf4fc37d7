use serde::{Deserialize, Serialize};

/// Conventional signaling payloads exchanged through the relay.
///
/// The meeting point never inspects these; any JSON value can be relayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SignalMessage {
    /// SDP offer from the initiating peer
    #[serde(rename = "offer")]
    Offer { sdp: String },

    /// SDP answer to a previous offer
    #[serde(rename = "answer")]
    Answer { sdp: String },

    /// Trickled ICE candidate
    #[serde(rename = "candidate")]
    Candidate {
        candidate: String,
        #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
        sdp_mid: Option<String>,
        #[serde(
            rename = "sdpMLineIndex",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        sdp_m_line_index: Option<u16>,
    },

    /// The sender is tearing the session down
    #[serde(rename = "close")]
    Close,
}
