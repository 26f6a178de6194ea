//! ORTC style capability negotiation.
//!
//! Pairs what the local media engine can do with what the remote router
//! announces and derives sending/receiving parameters from the result.
//! The remote capability order is authoritative throughout.

use crate::h264_profile;
use crate::rtp::{
    Direction, ExtendedCodec, ExtendedHeaderExtension, ExtendedRtpCapabilities, MediaKind,
    ParamValue, RtcpFeedback, RtcpParameters, RtpCapabilities, RtpCodec, RtpCodecCapability,
    RtpCodecParameters, RtpEncodingParameters, RtpHeaderExtension, RtpHeaderExtensionParameters,
    RtpParameters,
};
use crate::RtcError;

/// MID used for the RTP probation consumer.
pub const RTP_PROBATOR_MID: &str = "probator";
/// SSRC used for the RTP probation consumer.
pub const RTP_PROBATOR_SSRC: u32 = 1234;
/// Payload type used for the RTP probation consumer.
pub const RTP_PROBATOR_CODEC_PAYLOAD_TYPE: u8 = 127;

const TWCC_URI: &str = "http://www.ietf.org/id/draft-holmer-rmcat-transport-wide-cc-extensions-01";
const ABS_SEND_TIME_URI: &str = "http://www.webrtc.org/experiments/rtp-hdrext/abs-send-time";

/// Whether codec `a` can interoperate with codec `b`.
///
/// `strict` additionally compares the codec profile (H264 profile-level-id,
/// VP9 profile-id). `modify` rewrites `a`'s profile-level-id to the value an
/// answer must carry.
pub(crate) fn match_codecs<A: RtpCodec, B: RtpCodec>(
    a: &mut A,
    b: &B,
    strict: bool,
    modify: bool,
) -> bool {
    let a_mime = a.mime_type().to_lowercase();
    let b_mime = b.mime_type().to_lowercase();

    if a_mime != b_mime {
        return false;
    }
    if a.clock_rate() != b.clock_rate() {
        return false;
    }
    if a.channels() != b.channels() {
        return false;
    }

    if a_mime == "video/h264" {
        let a_pmode = int_param(a.parameters(), "packetization-mode");
        let b_pmode = int_param(b.parameters(), "packetization-mode");
        if a_pmode != b_pmode {
            return false;
        }

        if strict {
            if !h264_profile::is_same_profile(a.parameters(), b.parameters()) {
                return false;
            }

            if modify {
                let selected = match h264_profile::generate_profile_level_id_for_answer(
                    a.parameters(),
                    b.parameters(),
                ) {
                    Ok(v) => v,
                    Err(_) => return false,
                };

                match selected {
                    Some(id) => {
                        a.parameters_mut()
                            .insert("profile-level-id".into(), ParamValue::Str(id));
                    }
                    None => {
                        a.parameters_mut().remove("profile-level-id");
                    }
                }
            }
        }
    } else if a_mime == "video/vp9" && strict {
        let a_profile = int_param(a.parameters(), "profile-id");
        let b_profile = int_param(b.parameters(), "profile-id");
        if a_profile != b_profile {
            return false;
        }
    }

    true
}

fn int_param(params: &crate::rtp::Parameters, key: &str) -> i64 {
    params.get(key).and_then(|v| v.as_i64()).unwrap_or(0)
}

pub(crate) fn is_rtx_codec(codec: &impl RtpCodec) -> bool {
    codec.mime_type().to_lowercase().ends_with("/rtx")
}

/// The RTCP feedback both codecs support. Entries come from `b`'s list so
/// the caller controls which side's spelling wins.
fn reduce_rtcp_feedback<A: RtpCodec, B: RtpCodec>(a: &A, b: &B) -> Vec<RtcpFeedback> {
    let mut reduced = vec![];

    for a_fb in a.rtcp_feedback() {
        let matching = b
            .rtcp_feedback()
            .iter()
            .find(|b_fb| b_fb.typ == a_fb.typ && b_fb.parameter == a_fb.parameter);

        if let Some(fb) = matching {
            reduced.push(fb.clone());
        }
    }

    reduced
}

fn match_header_extensions(a: &RtpHeaderExtension, b: &RtpHeaderExtension) -> bool {
    a.kind == b.kind && a.uri == b.uri
}

/// Generate extended RTP capabilities for sending and receiving.
///
/// Neither input is mutated; profile-level-id rewrites happen on working
/// copies that end up in the extended codec's local parameters.
pub fn get_extended_rtp_capabilities(
    local_caps: &RtpCapabilities,
    remote_caps: &RtpCapabilities,
) -> ExtendedRtpCapabilities {
    let mut extended = ExtendedRtpCapabilities::default();

    // Match media codecs and keep the order preferred by remote_caps.
    let mut local_codecs: Vec<RtpCodecCapability> = local_caps.codecs.clone();

    for remote_codec in &remote_caps.codecs {
        if is_rtx_codec(remote_codec) {
            continue;
        }

        let mut matching_local: Option<&mut RtpCodecCapability> = None;
        for local in local_codecs.iter_mut() {
            if match_codecs(local, remote_codec, true, true) {
                matching_local = Some(local);
                break;
            }
        }

        let Some(local_codec) = matching_local else {
            continue;
        };
        let (Some(local_pt), Some(remote_pt)) = (
            local_codec.preferred_payload_type,
            remote_codec.preferred_payload_type,
        ) else {
            continue;
        };

        extended.codecs.push(ExtendedCodec {
            mime_type: local_codec.mime_type.clone(),
            kind: local_codec.kind,
            clock_rate: local_codec.clock_rate,
            channels: local_codec.channels,
            local_payload_type: local_pt,
            local_rtx_payload_type: None,
            remote_payload_type: remote_pt,
            remote_rtx_payload_type: None,
            local_parameters: local_codec.parameters.clone(),
            remote_parameters: remote_codec.parameters.clone(),
            rtcp_feedback: reduce_rtcp_feedback(local_codec, remote_codec),
        });
    }

    // Match RTX codecs.
    for extended_codec in &mut extended.codecs {
        let local_rtx = local_codecs.iter().find(|c| {
            is_rtx_codec(*c)
                && int_param(&c.parameters, "apt") == extended_codec.local_payload_type as i64
        });
        let remote_rtx = remote_caps.codecs.iter().find(|c| {
            is_rtx_codec(*c)
                && int_param(&c.parameters, "apt") == extended_codec.remote_payload_type as i64
        });

        if let (Some(local_rtx), Some(remote_rtx)) = (local_rtx, remote_rtx) {
            extended_codec.local_rtx_payload_type = local_rtx.preferred_payload_type;
            extended_codec.remote_rtx_payload_type = remote_rtx.preferred_payload_type;
        }
    }

    // Match header extensions.
    for remote_ext in &remote_caps.header_extensions {
        let matching_local = local_caps
            .header_extensions
            .iter()
            .find(|local| match_header_extensions(local, remote_ext));

        let Some(local_ext) = matching_local else {
            continue;
        };

        // Mirror the remote's direction to our perspective.
        let direction = remote_ext.direction.reverse();

        extended.header_extensions.push(ExtendedHeaderExtension {
            kind: remote_ext.kind,
            uri: remote_ext.uri.clone(),
            send_id: local_ext.preferred_id,
            recv_id: remote_ext.preferred_id,
            encrypt: local_ext.preferred_encrypt,
            direction,
        });
    }

    extended
}

/// Generate RTP capabilities for receiving media based on the given
/// extended RTP capabilities.
pub fn get_recv_rtp_capabilities(extended: &ExtendedRtpCapabilities) -> RtpCapabilities {
    let mut caps = RtpCapabilities::default();

    for extended_codec in &extended.codecs {
        caps.codecs.push(RtpCodecCapability {
            mime_type: extended_codec.mime_type.clone(),
            kind: extended_codec.kind,
            preferred_payload_type: Some(extended_codec.remote_payload_type),
            clock_rate: extended_codec.clock_rate,
            channels: extended_codec.channels,
            parameters: extended_codec.local_parameters.clone(),
            rtcp_feedback: extended_codec.rtcp_feedback.clone(),
        });

        // Add RTX codec.
        let Some(remote_rtx_pt) = extended_codec.remote_rtx_payload_type else {
            continue;
        };

        caps.codecs.push(RtpCodecCapability {
            mime_type: format!("{}/rtx", extended_codec.kind),
            kind: extended_codec.kind,
            preferred_payload_type: Some(remote_rtx_pt),
            clock_rate: extended_codec.clock_rate,
            channels: None,
            parameters: [(
                "apt".to_string(),
                ParamValue::Int(extended_codec.remote_payload_type as i64),
            )]
            .into(),
            rtcp_feedback: vec![],
        });
    }

    for extended_ext in &extended.header_extensions {
        // Ignore RTP extensions not valid for receiving.
        if !matches!(
            extended_ext.direction,
            Direction::SendRecv | Direction::RecvOnly
        ) {
            continue;
        }

        caps.header_extensions.push(RtpHeaderExtension {
            kind: extended_ext.kind,
            uri: extended_ext.uri.clone(),
            preferred_id: extended_ext.recv_id,
            preferred_encrypt: extended_ext.encrypt,
            direction: extended_ext.direction,
        });
    }

    caps
}

fn sending_codecs(
    kind: MediaKind,
    extended: &ExtendedRtpCapabilities,
    remote_view: bool,
) -> Vec<RtpCodecParameters> {
    let mut codecs = vec![];

    for extended_codec in &extended.codecs {
        if extended_codec.kind != kind {
            continue;
        }

        let parameters = if remote_view {
            extended_codec.remote_parameters.clone()
        } else {
            extended_codec.local_parameters.clone()
        };

        codecs.push(RtpCodecParameters {
            mime_type: extended_codec.mime_type.clone(),
            payload_type: extended_codec.local_payload_type,
            clock_rate: extended_codec.clock_rate,
            channels: extended_codec.channels,
            parameters,
            rtcp_feedback: extended_codec.rtcp_feedback.clone(),
        });

        // Add RTX codec.
        if let Some(rtx_pt) = extended_codec.local_rtx_payload_type {
            codecs.push(RtpCodecParameters {
                mime_type: format!("{}/rtx", extended_codec.kind),
                payload_type: rtx_pt,
                clock_rate: extended_codec.clock_rate,
                channels: None,
                parameters: [(
                    "apt".to_string(),
                    ParamValue::Int(extended_codec.local_payload_type as i64),
                )]
                .into(),
                rtcp_feedback: vec![],
            });
        }
    }

    codecs
}

fn sending_header_extensions(
    kind: MediaKind,
    extended: &ExtendedRtpCapabilities,
) -> Vec<RtpHeaderExtensionParameters> {
    extended
        .header_extensions
        .iter()
        .filter(|e| {
            e.kind == Some(kind)
                && matches!(e.direction, Direction::SendRecv | Direction::SendOnly)
        })
        .map(|e| RtpHeaderExtensionParameters {
            uri: e.uri.clone(),
            id: e.send_id,
            encrypt: e.encrypt,
            parameters: Default::default(),
        })
        .collect()
}

/// Generate RTP parameters of the given kind for sending media.
///
/// The mid, encodings and rtcp fields are left empty.
pub fn get_sending_rtp_parameters(
    kind: MediaKind,
    extended: &ExtendedRtpCapabilities,
) -> RtpParameters {
    RtpParameters {
        mid: None,
        codecs: sending_codecs(kind, extended, false),
        header_extensions: sending_header_extensions(kind, extended),
        encodings: vec![],
        rtcp: None,
    }
}

/// Generate RTP parameters of the given kind suitable for the remote SDP
/// answer.
pub fn get_sending_remote_rtp_parameters(
    kind: MediaKind,
    extended: &ExtendedRtpCapabilities,
) -> RtpParameters {
    let mut params = RtpParameters {
        mid: None,
        codecs: sending_codecs(kind, extended, true),
        header_extensions: sending_header_extensions(kind, extended),
        encodings: vec![],
        rtcp: None,
    };

    // Reduce codecs' RTCP feedback. Use Transport-CC if available, REMB
    // otherwise.
    let has_twcc = params.header_extensions.iter().any(|e| e.uri == TWCC_URI);
    let has_abs_send_time = params
        .header_extensions
        .iter()
        .any(|e| e.uri == ABS_SEND_TIME_URI);

    for codec in &mut params.codecs {
        codec.rtcp_feedback.retain(|fb| {
            if has_twcc {
                fb.typ != "goog-remb"
            } else if has_abs_send_time {
                fb.typ != "transport-cc"
            } else {
                fb.typ != "transport-cc" && fb.typ != "goog-remb"
            }
        });
    }

    params
}

/// Reduce given codecs to the one (plus RTX) compatible with the given
/// capability codec, or the first one (plus RTX) when no capability codec
/// is given.
///
/// Given codecs must come from [`get_sending_rtp_parameters`] or
/// [`get_sending_remote_rtp_parameters`].
pub fn reduce_codecs(
    codecs: &[RtpCodecParameters],
    cap_codec: Option<&RtpCodecCapability>,
) -> Result<Vec<RtpCodecParameters>, RtcError> {
    let mut filtered: Vec<RtpCodecParameters> = vec![];

    match cap_codec {
        // If no capability codec is given, take the first one (and RTX).
        None => {
            let Some(first) = codecs.first() else {
                return Err(RtcError::Unsupported("no codecs to reduce".into()));
            };
            filtered.push(first.clone());
            if let Some(second) = codecs.get(1) {
                if is_rtx_codec(second) {
                    filtered.push(second.clone());
                }
            }
        }

        // Otherwise look for the first compatible codec.
        Some(cap) => {
            for (idx, codec) in codecs.iter().enumerate() {
                let mut candidate = codec.clone();
                if !match_codecs(&mut candidate, cap, false, false) {
                    continue;
                }

                filtered.push(candidate);
                if let Some(next) = codecs.get(idx + 1) {
                    if is_rtx_codec(next) {
                        filtered.push(next.clone());
                    }
                }
                break;
            }

            if filtered.is_empty() {
                return Err(RtcError::Unsupported("no matching codec found".into()));
            }
        }
    }

    Ok(filtered)
}

/// Create RTP parameters for a Consumer for the RTP probator.
pub fn generate_probator_rtp_parameters(video: &RtpParameters) -> RtpParameters {
    let mut codec = video.codecs[0].clone();
    codec.payload_type = RTP_PROBATOR_CODEC_PAYLOAD_TYPE;

    RtpParameters {
        mid: Some(RTP_PROBATOR_MID.to_string()),
        codecs: vec![codec],
        header_extensions: video.header_extensions.clone(),
        encodings: vec![RtpEncodingParameters::with_ssrc(RTP_PROBATOR_SSRC)],
        rtcp: Some(RtcpParameters {
            cname: Some("probator".to_string()),
            ..Default::default()
        }),
    }
}

/// Whether media can be sent based on the given RTP capabilities.
pub fn can_send(kind: MediaKind, extended: &ExtendedRtpCapabilities) -> bool {
    extended.codecs.iter().any(|c| c.kind == kind)
}

/// Whether the given RTP parameters can be received with the given RTP
/// capabilities.
pub fn can_receive(params: &RtpParameters, extended: &ExtendedRtpCapabilities) -> bool {
    let Some(first) = params.codecs.first() else {
        return false;
    };

    extended
        .codecs
        .iter()
        .any(|c| c.remote_payload_type == first.payload_type)
}
