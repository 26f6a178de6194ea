//! SCTP (data channel) capability and parameter records.

use serde::{Deserialize, Serialize};

/// Number of SCTP streams announced by this endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumSctpStreams {
    /// Initially requested number of outgoing SCTP streams.
    #[serde(rename = "OS")]
    pub os: u16,
    /// Maximum number of incoming SCTP streams.
    #[serde(rename = "MIS")]
    pub mis: u16,
}

/// What this endpoint supports at SCTP level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SctpCapabilities {
    /// Announced stream counts.
    pub num_streams: NumSctpStreams,
}

/// SCTP association parameters as signaled by the remote side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SctpParameters {
    /// Must always equal 5000.
    pub port: u16,
    /// Initially requested number of outgoing SCTP streams.
    #[serde(rename = "OS")]
    pub os: u16,
    /// Maximum number of incoming SCTP streams.
    #[serde(rename = "MIS")]
    pub mis: u16,
    /// Maximum allowed size for SCTP messages.
    #[serde(rename = "maxMessageSize")]
    pub max_message_size: u32,
}

fn default_true() -> bool {
    true
}

/// Parameters of one SCTP stream (one data channel).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SctpStreamParameters {
    /// SCTP stream id.
    pub stream_id: u16,
    /// Whether data messages must be received in order. If both reliability
    /// limits below are unset, messages are also guaranteed to arrive.
    #[serde(default = "default_true")]
    pub ordered: bool,
    /// When set, the maximum time in milliseconds a message can spend being
    /// retransmitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_packet_life_time: Option<u16>,
    /// When set, the maximum number of retransmissions per message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retransmits: Option<u16>,
    /// Stream priority.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<crate::rtp::Priority>,
    /// Data channel label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Data channel sub-protocol.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

impl Default for SctpStreamParameters {
    fn default() -> Self {
        SctpStreamParameters {
            stream_id: 0,
            ordered: true,
            max_packet_life_time: None,
            max_retransmits: None,
            priority: None,
            label: None,
            protocol: None,
        }
    }
}

impl SctpStreamParameters {
    /// Resolve the contradictory combination of `ordered` with a
    /// reliability limit: any limit forces unordered delivery.
    pub fn normalize(mut self) -> SctpStreamParameters {
        if self.max_packet_life_time.is_some() || self.max_retransmits.is_some() {
            self.ordered = false;
        }
        self
    }
}
