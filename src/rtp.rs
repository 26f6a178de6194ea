//! RTP capability and parameter records.
//!
//! These are the value types exchanged with the remote router during
//! capability negotiation and carried by producers/consumers afterwards.
//! They are plain data: all negotiation behavior lives in [`crate::ortc`].

use std::collections::BTreeMap;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::RtcError;

/// Media kind of a codec, track or header extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Audio media.
    Audio,
    /// Video media.
    Video,
}

impl MediaKind {
    /// The lowercase name used in mime types and m= lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Direction of a media line or header extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Both send and receive.
    #[default]
    SendRecv,
    /// Send only.
    SendOnly,
    /// Receive only.
    RecvOnly,
    /// Neither direction.
    Inactive,
}

impl Direction {
    /// The SDP attribute value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::SendRecv => "sendrecv",
            Direction::SendOnly => "sendonly",
            Direction::RecvOnly => "recvonly",
            Direction::Inactive => "inactive",
        }
    }

    /// Mirror the direction as seen from the other side.
    pub fn reverse(&self) -> Direction {
        match self {
            Direction::SendRecv => Direction::SendRecv,
            Direction::SendOnly => Direction::RecvOnly,
            Direction::RecvOnly => Direction::SendOnly,
            Direction::Inactive => Direction::Inactive,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A codec parameter value as carried in an a=fmtp config.
///
/// Values that look numeric ("apt=96", "packetization-mode=1") compare and
/// serialize as integers, everything else ("profile-level-id=42e01f") stays
/// a string. The distinction is load bearing: codec matching compares
/// `packetization-mode` numerically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Numeric parameter value.
    Int(i64),
    /// String parameter value.
    Str(String),
}

impl ParamValue {
    /// Coerce a textual token the way the SDP grammar does.
    pub fn coerce(s: &str) -> ParamValue {
        match s.parse::<i64>() {
            Ok(n) => ParamValue::Int(n),
            Err(_) => ParamValue::Str(s.to_string()),
        }
    }

    /// Numeric view, if this is an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(n) => Some(*n),
            ParamValue::Str(_) => None,
        }
    }

    /// String view, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Int(_) => None,
            ParamValue::Str(s) => Some(s),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(n) => write!(f, "{}", n),
            ParamValue::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(n: i64) -> Self {
        ParamValue::Int(n)
    }
}

impl From<u8> for ParamValue {
    fn from(n: u8) -> Self {
        ParamValue::Int(n as i64)
    }
}

impl From<u16> for ParamValue {
    fn from(n: u16) -> Self {
        ParamValue::Int(n as i64)
    }
}

impl From<u32> for ParamValue {
    fn from(n: u32) -> Self {
        ParamValue::Int(n as i64)
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Str(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::Str(s)
    }
}

/// Codec specific parameters, string keyed.
pub type Parameters = BTreeMap<String, ParamValue>;

/// One RTCP feedback mechanism supported for a codec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RtcpFeedback {
    /// Feedback type, e.g. "nack", "ccm", "transport-cc".
    #[serde(rename = "type")]
    pub typ: String,
    /// Feedback sub-parameter, e.g. "pli" or "fir". Empty when absent.
    #[serde(default)]
    pub parameter: String,
}

impl RtcpFeedback {
    /// Feedback with no sub-parameter.
    pub fn new(typ: &str) -> Self {
        RtcpFeedback {
            typ: typ.to_string(),
            parameter: String::new(),
        }
    }

    /// Feedback with a sub-parameter.
    pub fn with_parameter(typ: &str, parameter: &str) -> Self {
        RtcpFeedback {
            typ: typ.to_string(),
            parameter: parameter.to_string(),
        }
    }
}

/// Common view over capability and parameter codecs, used by the
/// negotiation engine so it can match either form against either form.
pub trait RtpCodec {
    /// Mime type, e.g. "audio/opus".
    fn mime_type(&self) -> &str;
    /// Clock rate in Hertz.
    fn clock_rate(&self) -> u32;
    /// Audio channel count, if any.
    fn channels(&self) -> Option<u8>;
    /// Codec specific parameters.
    fn parameters(&self) -> &Parameters;
    /// Mutable codec specific parameters.
    fn parameters_mut(&mut self) -> &mut Parameters;
    /// RTCP feedback entries.
    fn rtcp_feedback(&self) -> &[RtcpFeedback];
}

/// A codec the local endpoint or the remote router can handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpCodecCapability {
    /// The codec MIME media type/subtype, e.g. 'audio/opus', 'video/VP8'.
    pub mime_type: String,
    /// Media kind.
    pub kind: MediaKind,
    /// The preferred RTP payload type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_payload_type: Option<u8>,
    /// Codec clock rate expressed in Hertz.
    pub clock_rate: u32,
    /// The number of channels supported. Just for audio.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<u8>,
    /// Codec specific parameters. Some of them ('packetization-mode' and
    /// 'profile-level-id' in H264, 'profile-id' in VP9) are critical for
    /// codec matching.
    #[serde(default)]
    pub parameters: Parameters,
    /// Transport layer and codec-specific feedback messages for this codec.
    #[serde(default)]
    pub rtcp_feedback: Vec<RtcpFeedback>,
}

impl RtpCodec for RtpCodecCapability {
    fn mime_type(&self) -> &str {
        &self.mime_type
    }
    fn clock_rate(&self) -> u32 {
        self.clock_rate
    }
    fn channels(&self) -> Option<u8> {
        self.channels
    }
    fn parameters(&self) -> &Parameters {
        &self.parameters
    }
    fn parameters_mut(&mut self) -> &mut Parameters {
        &mut self.parameters
    }
    fn rtcp_feedback(&self) -> &[RtcpFeedback] {
        &self.rtcp_feedback
    }
}

/// A codec as used in concrete RTP parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpCodecParameters {
    /// The codec MIME media type/subtype.
    pub mime_type: String,
    /// The value that goes in the RTP payload type field. Must be unique
    /// within the parameter set.
    pub payload_type: u8,
    /// Codec clock rate expressed in Hertz.
    pub clock_rate: u32,
    /// The number of channels supported. Just for audio.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<u8>,
    /// Codec specific parameters.
    #[serde(default)]
    pub parameters: Parameters,
    /// Transport layer and codec-specific feedback messages for this codec.
    #[serde(default)]
    pub rtcp_feedback: Vec<RtcpFeedback>,
}

impl RtpCodec for RtpCodecParameters {
    fn mime_type(&self) -> &str {
        &self.mime_type
    }
    fn clock_rate(&self) -> u32 {
        self.clock_rate
    }
    fn channels(&self) -> Option<u8> {
        self.channels
    }
    fn parameters(&self) -> &Parameters {
        &self.parameters
    }
    fn parameters_mut(&mut self) -> &mut Parameters {
        &mut self.parameters
    }
    fn rtcp_feedback(&self) -> &[RtcpFeedback] {
        &self.rtcp_feedback
    }
}

/// A supported RTP header extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpHeaderExtension {
    /// Media kind. `None` means valid for all kinds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<MediaKind>,
    /// The URI of the RTP header extension, as defined in RFC 5285.
    pub uri: String,
    /// The preferred numeric identifier that goes in the RTP packet.
    pub preferred_id: u8,
    /// Whether it is preferred that the value in the header be encrypted
    /// as per RFC 6904.
    #[serde(default)]
    pub preferred_encrypt: bool,
    /// Which directions the extension can be used in.
    #[serde(default)]
    pub direction: Direction,
}

/// A header extension within concrete RTP parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpHeaderExtensionParameters {
    /// The URI of the RTP header extension.
    pub uri: String,
    /// The numeric identifier that goes in the RTP packet. Must be unique.
    pub id: u8,
    /// Whether the value in the header is encrypted as per RFC 6904.
    #[serde(default)]
    pub encrypt: bool,
    /// Configuration parameters for the header extension.
    #[serde(default)]
    pub parameters: Parameters,
}

/// RTX stream information for an encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rtx {
    /// The RTX SSRC.
    pub ssrc: u32,
}

/// Stream priority as signaled for an encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Priority {
    /// Very low priority.
    VeryLow,
    /// Low priority.
    Low,
    /// Medium priority.
    Medium,
    /// High priority.
    High,
}

/// One encoding: a media RTP stream and its associated RTX stream (if any).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpEncodingParameters {
    /// The media SSRC.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssrc: Option<u32>,
    /// The RID RTP extension value. Must be unique.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rid: Option<String>,
    /// Codec payload type this encoding affects. If unset, the first media
    /// codec is chosen.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec_payload_type: Option<u8>,
    /// RTX stream information.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rtx: Option<Rtx>,
    /// Whether discontinuous RTP transmission will be used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dtx: Option<bool>,
    /// Number of spatial and temporal layers in the RTP stream, e.g. "L1T3".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scalability_mode: Option<String>,
    /// Resolution downscale factor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_resolution_down_by: Option<u32>,
    /// Max bitrate cap in bps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_bitrate: Option<u32>,
    /// Max framerate cap.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_framerate: Option<u32>,
    /// Whether adaptive packet time is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adaptive_ptime: Option<bool>,
    /// Stream priority.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    /// Network priority.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_priority: Option<Priority>,
}

impl RtpEncodingParameters {
    /// New encoding for a plain SSRC.
    pub fn with_ssrc(ssrc: u32) -> Self {
        RtpEncodingParameters {
            ssrc: Some(ssrc),
            ..Default::default()
        }
    }

    /// A new encoding taking every field the override has set, and the
    /// base's value otherwise.
    pub fn merged_with(&self, over: &RtpEncodingParameters) -> RtpEncodingParameters {
        RtpEncodingParameters {
            ssrc: over.ssrc.or(self.ssrc),
            rid: over.rid.clone().or_else(|| self.rid.clone()),
            codec_payload_type: over.codec_payload_type.or(self.codec_payload_type),
            rtx: over.rtx.clone().or_else(|| self.rtx.clone()),
            dtx: over.dtx.or(self.dtx),
            scalability_mode: over
                .scalability_mode
                .clone()
                .or_else(|| self.scalability_mode.clone()),
            scale_resolution_down_by: over
                .scale_resolution_down_by
                .or(self.scale_resolution_down_by),
            max_bitrate: over.max_bitrate.or(self.max_bitrate),
            max_framerate: over.max_framerate.or(self.max_framerate),
            adaptive_ptime: over.adaptive_ptime.or(self.adaptive_ptime),
            priority: over.priority.or(self.priority),
            network_priority: over.network_priority.or(self.network_priority),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Parameters used for RTCP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtcpParameters {
    /// The canonical name (CNAME) used by RTCP.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cname: Option<String>,
    /// Whether reduced size RTCP (RFC 5506) is configured.
    #[serde(default = "default_true")]
    pub reduced_size: bool,
    /// Whether RTCP-mux is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mux: Option<bool>,
}

impl Default for RtcpParameters {
    fn default() -> Self {
        RtcpParameters {
            cname: None,
            reduced_size: true,
            mux: None,
        }
    }
}

/// The full set of parameters describing a sent or received media stream.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpParameters {
    /// The MID RTP extension value as defined in the BUNDLE specification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mid: Option<String>,
    /// Media and RTX codecs in use.
    #[serde(default)]
    pub codecs: Vec<RtpCodecParameters>,
    /// RTP header extensions in use.
    #[serde(default)]
    pub header_extensions: Vec<RtpHeaderExtensionParameters>,
    /// Transmitted RTP streams and their settings.
    #[serde(default)]
    pub encodings: Vec<RtpEncodingParameters>,
    /// Parameters used for RTCP.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rtcp: Option<RtcpParameters>,
}

impl RtpParameters {
    /// Check the payload-type uniqueness invariant.
    pub fn validate(&self) -> Result<(), RtcError> {
        for (i, c) in self.codecs.iter().enumerate() {
            if self.codecs[..i]
                .iter()
                .any(|o| o.payload_type == c.payload_type)
            {
                return Err(RtcError::Unsupported(format!(
                    "duplicated payload type {}",
                    c.payload_type
                )));
            }
        }
        Ok(())
    }
}

/// What an endpoint can receive at media level.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpCapabilities {
    /// Supported media and RTX codecs.
    #[serde(default)]
    pub codecs: Vec<RtpCodecCapability>,
    /// Supported RTP header extensions.
    #[serde(default)]
    pub header_extensions: Vec<RtpHeaderExtension>,
}

/// Negotiation output for one matched codec: both sides' identifiers and
/// parameters. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendedCodec {
    /// The codec MIME media type/subtype.
    pub mime_type: String,
    /// Media kind.
    pub kind: MediaKind,
    /// Codec clock rate expressed in Hertz.
    pub clock_rate: u32,
    /// Audio channel count, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<u8>,
    /// Our payload type for this codec.
    pub local_payload_type: u8,
    /// Our RTX payload type, when both sides have one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_rtx_payload_type: Option<u8>,
    /// The remote payload type for this codec.
    pub remote_payload_type: u8,
    /// The remote RTX payload type, when both sides have one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_rtx_payload_type: Option<u8>,
    /// Our codec parameters.
    #[serde(default)]
    pub local_parameters: Parameters,
    /// The remote codec parameters.
    #[serde(default)]
    pub remote_parameters: Parameters,
    /// The RTCP feedback intersection of both sides.
    #[serde(default)]
    pub rtcp_feedback: Vec<RtcpFeedback>,
}

/// Negotiation output for one matched header extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendedHeaderExtension {
    /// Media kind. `None` means valid for all kinds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<MediaKind>,
    /// The URI of the RTP header extension.
    pub uri: String,
    /// The id we use when sending.
    pub send_id: u8,
    /// The id the remote uses, i.e. what we see when receiving.
    pub recv_id: u8,
    /// Whether the header value is encrypted.
    pub encrypt: bool,
    /// Usable directions, mirrored to our perspective.
    pub direction: Direction,
}

/// The paired local/remote result of capability negotiation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendedRtpCapabilities {
    /// Matched codecs, in the order preferred by the remote side.
    #[serde(default)]
    pub codecs: Vec<ExtendedCodec>,
    /// Matched header extensions.
    #[serde(default)]
    pub header_extensions: Vec<ExtendedHeaderExtension>,
}

/// Spatial/temporal layering parsed from a scalability mode string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalabilityMode {
    /// Number of spatial layers.
    pub spatial_layers: u8,
    /// Number of temporal layers.
    pub temporal_layers: u8,
}

static SCALABILITY_MODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[LS]([1-9]\d?)T([1-9]\d?)").expect("scalability mode regex"));

impl ScalabilityMode {
    /// Parse a mode such as "L1T3" or "S3T3". Anything unparsable means a
    /// single spatial and temporal layer.
    pub fn parse(s: &str) -> ScalabilityMode {
        match SCALABILITY_MODE_RE.captures(s) {
            Some(caps) => ScalabilityMode {
                spatial_layers: caps[1].parse().unwrap_or(1),
                temporal_layers: caps[2].parse().unwrap_or(1),
            },
            None => ScalabilityMode {
                spatial_layers: 1,
                temporal_layers: 1,
            },
        }
    }
}
