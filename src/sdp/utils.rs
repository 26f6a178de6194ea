//! Helpers reading negotiation data out of a parsed session description.
//!
//! Each function builds its state fresh from the passed session. Codec
//! extraction takes the first m=audio and first m=video section, scanning
//! all sections to find them.

use super::grammar::{parse_params, write_params};
use super::model::{Record, SdpMedia, SdpSession, Value};
use crate::rtp::{
    MediaKind, RtcpFeedback, RtpCapabilities, RtpCodecCapability, RtpEncodingParameters,
    RtpHeaderExtension, RtpParameters, Rtx,
};
use crate::transport::{DtlsFingerprint, DtlsParameters, DtlsRole};
use crate::RtcError;

fn media_kind(media: &SdpMedia) -> Option<MediaKind> {
    match media.typ().as_deref() {
        Some("audio") => Some(MediaKind::Audio),
        Some("video") => Some(MediaKind::Video),
        _ => None,
    }
}

/// The RTP capabilities the local engine advertises in an offer.
pub fn extract_rtp_capabilities(session: &SdpSession) -> RtpCapabilities {
    let mut codecs: Vec<RtpCodecCapability> = vec![];
    let mut header_extensions: Vec<RtpHeaderExtension> = vec![];
    let mut got_audio = false;
    let mut got_video = false;

    for media in &session.media {
        let Some(kind) = media_kind(media) else {
            continue;
        };
        // Just the first section of each kind.
        match kind {
            MediaKind::Audio if got_audio => continue,
            MediaKind::Audio => got_audio = true,
            MediaKind::Video if got_video => continue,
            MediaKind::Video => got_video = true,
        }

        let section_start = codecs.len();

        for rtp in media.fields.list("rtp").unwrap_or_default() {
            let Some(payload) = rtp.get("payload").and_then(|v| v.as_i64()) else {
                continue;
            };
            let name = rtp.get("codec").map(|v| v.to_string()).unwrap_or_default();
            codecs.push(RtpCodecCapability {
                mime_type: format!("{}/{}", kind, name),
                kind,
                preferred_payload_type: Some(payload as u8),
                clock_rate: rtp.get("rate").and_then(|v| v.as_i64()).unwrap_or(0) as u32,
                channels: rtp
                    .get("encoding")
                    .and_then(|v| v.as_i64())
                    .map(|c| c as u8),
                parameters: Default::default(),
                rtcp_feedback: vec![],
            });
        }

        let codec_of = |codecs: &mut [RtpCodecCapability], payload: Option<i64>| {
            let payload = payload? as u8;
            codecs[section_start..]
                .iter_mut()
                .position(|c| c.preferred_payload_type == Some(payload))
                .map(|i| section_start + i)
        };

        for fmtp in media.fields.list("fmtp").unwrap_or_default() {
            let payload = fmtp.get("payload").and_then(|v| v.as_i64());
            let Some(idx) = codec_of(&mut codecs, payload) else {
                continue;
            };
            let config = fmtp.get("config").map(|v| v.to_string()).unwrap_or_default();
            let mut parameters = parse_params(&config);
            // The hex profile-level-id can look numeric ("640032").
            if let Some(v) = parameters.get_mut("profile-level-id") {
                *v = Value::Str(v.to_string());
            }
            codecs[idx].parameters = parameters;
        }

        for fb in media.fields.list("rtcpFb").unwrap_or_default() {
            let payload = fb.get("payload").and_then(|v| v.as_i64());
            let Some(idx) = codec_of(&mut codecs, payload) else {
                continue;
            };
            codecs[idx].rtcp_feedback.push(RtcpFeedback {
                typ: fb.get("type").map(|v| v.to_string()).unwrap_or_default(),
                parameter: fb.get("subtype").map(|v| v.to_string()).unwrap_or_default(),
            });
        }

        for ext in media.fields.list("ext").unwrap_or_default() {
            // Encrypted extensions are not negotiated.
            if ext.contains_key("encrypt-uri") {
                continue;
            }
            let Some(id) = ext.get("value").and_then(|v| v.as_i64()) else {
                continue;
            };
            header_extensions.push(RtpHeaderExtension {
                kind: Some(kind),
                uri: ext.get("uri").map(|v| v.to_string()).unwrap_or_default(),
                preferred_id: id as u8,
                preferred_encrypt: false,
                direction: Default::default(),
            });
        }
    }

    RtpCapabilities {
        codecs,
        header_extensions,
    }
}

/// DTLS role and fingerprint from the first active media section.
pub fn extract_dtls_parameters(session: &SdpSession) -> Result<DtlsParameters, RtcError> {
    let media = session
        .media
        .iter()
        .find(|m| m.fields.contains("iceUfrag") && m.port() != Some(0))
        .ok_or_else(|| RtcError::NotFound("no active media section found".to_string()))?;

    let fingerprint = media
        .fields
        .record("fingerprint")
        .or_else(|| session.fields.record("fingerprint"))
        .ok_or_else(|| RtcError::NotFound("no DTLS fingerprint found".to_string()))?;

    let role = match media.fields.str_of("setup").as_deref() {
        Some("active") => DtlsRole::Client,
        Some("passive") => DtlsRole::Server,
        _ => DtlsRole::Auto,
    };

    Ok(DtlsParameters {
        role,
        fingerprints: vec![DtlsFingerprint {
            algorithm: fingerprint
                .get("type")
                .map(|v| v.to_string())
                .unwrap_or_default(),
            value: fingerprint
                .get("hash")
                .map(|v| v.to_string())
                .unwrap_or_default(),
        }],
    })
}

/// The CNAME from the first a=ssrc cname line, or empty.
pub fn get_cname(media: &SdpMedia) -> String {
    media
        .fields
        .list("ssrcs")
        .unwrap_or_default()
        .iter()
        .find(|line| line.get("attribute").map(|v| v.to_string()).as_deref() == Some("cname"))
        .and_then(|line| line.get("value").map(|v| v.to_string()))
        .unwrap_or_default()
}

/// Reflect opus codec options the offer carries (sprop-stereo) into the
/// answer section's fmtp (stereo).
pub fn apply_codec_parameters(offer_rtp_parameters: &RtpParameters, answer_media: &mut SdpMedia) {
    for codec in &offer_rtp_parameters.codecs {
        if !codec.mime_type.eq_ignore_ascii_case("audio/opus") {
            continue;
        }

        let in_answer = answer_media
            .fields
            .list("rtp")
            .unwrap_or_default()
            .iter()
            .any(|r| r.get("payload").and_then(|v| v.as_i64()) == Some(i64::from(codec.payload_type)));
        if !in_answer {
            continue;
        }

        let fmtps = answer_media.fields.list_mut("fmtp");
        let idx = match fmtps
            .iter()
            .position(|f| f.get("payload").and_then(|v| v.as_i64()) == Some(i64::from(codec.payload_type)))
        {
            Some(idx) => idx,
            None => {
                let mut rec = Record::new();
                rec.insert("payload".into(), codec.payload_type.into());
                rec.insert("config".into(), "".into());
                fmtps.push(rec);
                fmtps.len() - 1
            }
        };

        let config = fmtps[idx]
            .get("config")
            .map(|v| v.to_string())
            .unwrap_or_default();
        let mut parameters = parse_params(&config);

        if let Some(sprop_stereo) = codec.parameters.get("sprop-stereo") {
            let stereo = sprop_stereo.as_i64().map(|i| i != 0).unwrap_or(false);
            parameters.insert("stereo".into(), i64::from(stereo).into());
        }

        fmtps[idx].insert("config".into(), Value::Str(write_params(&parameters)));
    }
}

/// Encodings from the a=ssrc/a=ssrc-group lines of an offer section, with
/// FID groups paired into media+RTX encodings.
pub fn get_rtp_encodings(media: &SdpMedia) -> Result<Vec<RtpEncodingParameters>, RtcError> {
    let mut ssrcs: Vec<u32> = vec![];
    for line in media.fields.list("ssrcs").unwrap_or_default() {
        if let Some(ssrc) = line.get("id").and_then(|v| v.as_i64()) {
            let ssrc = ssrc as u32;
            if !ssrcs.contains(&ssrc) {
                ssrcs.push(ssrc);
            }
        }
    }
    if ssrcs.is_empty() {
        return Err(RtcError::NotFound("no a=ssrc lines found".to_string()));
    }

    let mut pairs: Vec<(u32, Option<u32>)> = vec![];

    for line in media.fields.list("ssrcGroups").unwrap_or_default() {
        if line.get("semantics").map(|v| v.to_string()).as_deref() != Some("FID") {
            continue;
        }
        let group = line.get("ssrcs").map(|v| v.to_string()).unwrap_or_default();
        let mut split = group.split_whitespace();
        let (Some(ssrc), Some(rtx_ssrc)) = (split.next(), split.next()) else {
            continue;
        };
        let (Ok(ssrc), Ok(rtx_ssrc)) = (ssrc.parse::<u32>(), rtx_ssrc.parse::<u32>()) else {
            continue;
        };
        if ssrcs.contains(&ssrc) {
            ssrcs.retain(|s| *s != ssrc && *s != rtx_ssrc);
            pairs.push((ssrc, Some(rtx_ssrc)));
        }
    }

    // Leftover SSRCs have no RTX.
    for ssrc in ssrcs {
        pairs.push((ssrc, None));
    }

    Ok(pairs
        .into_iter()
        .map(|(ssrc, rtx_ssrc)| RtpEncodingParameters {
            ssrc: Some(ssrc),
            rtx: rtx_ssrc.map(|ssrc| Rtx { ssrc }),
            ..Default::default()
        })
        .collect())
}

/// Rewrite an offer section for multi-ssrc (legacy, non-rid) simulcast with
/// `num_streams` consecutive SSRCs per stream.
pub fn add_legacy_simulcast(media: &mut SdpMedia, num_streams: u8) -> Result<(), RtcError> {
    if num_streams <= 1 {
        return Err(RtcError::InvalidState(
            "num_streams must be greater than 1".to_string(),
        ));
    }

    let ssrc_lines = media.fields.list("ssrcs").unwrap_or_default();

    let msid_line = ssrc_lines
        .iter()
        .find(|line| line.get("attribute").map(|v| v.to_string()).as_deref() == Some("msid"))
        .ok_or_else(|| {
            RtcError::NotFound("a=ssrc line with msid information not found".to_string())
        })?;
    let msid = msid_line
        .get("value")
        .map(|v| v.to_string())
        .unwrap_or_default();
    let first_ssrc = msid_line
        .get("id")
        .and_then(|v| v.as_i64())
        .unwrap_or_default() as u32;

    let cname = ssrc_lines
        .iter()
        .find(|line| line.get("attribute").map(|v| v.to_string()).as_deref() == Some("cname"))
        .and_then(|line| line.get("value").map(|v| v.to_string()))
        .ok_or_else(|| {
            RtcError::NotFound("a=ssrc line with cname information not found".to_string())
        })?;

    let mut first_rtx_ssrc = None;
    for line in media.fields.list("ssrcGroups").unwrap_or_default() {
        if line.get("semantics").map(|v| v.to_string()).as_deref() != Some("FID") {
            continue;
        }
        let group = line.get("ssrcs").map(|v| v.to_string()).unwrap_or_default();
        let mut split = group.split_whitespace();
        if split.next().and_then(|s| s.parse::<u32>().ok()) == Some(first_ssrc) {
            first_rtx_ssrc = split.next().and_then(|s| s.parse::<u32>().ok());
        }
    }

    let ssrcs: Vec<u32> = (0..u32::from(num_streams)).map(|i| first_ssrc + i).collect();
    let rtx_ssrcs: Vec<u32> = match first_rtx_ssrc {
        Some(first) => (0..u32::from(num_streams)).map(|i| first + i).collect(),
        None => vec![],
    };

    let mut ssrc_records = vec![];
    let mut group_records = vec![];

    let mut sim = Record::new();
    sim.insert("semantics".into(), "SIM".into());
    sim.insert(
        "ssrcs".into(),
        ssrcs
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(" ")
            .into(),
    );
    group_records.push(sim);

    let mut push_ssrc = |records: &mut Vec<Record>, id: u32, attribute: &str, value: &str| {
        let mut rec = Record::new();
        rec.insert("id".into(), id.into());
        rec.insert("attribute".into(), attribute.into());
        rec.insert("value".into(), value.into());
        records.push(rec);
    };

    for ssrc in &ssrcs {
        push_ssrc(&mut ssrc_records, *ssrc, "cname", &cname);
        push_ssrc(&mut ssrc_records, *ssrc, "msid", &msid);
    }

    for (ssrc, rtx_ssrc) in ssrcs.iter().zip(rtx_ssrcs.iter()) {
        push_ssrc(&mut ssrc_records, *rtx_ssrc, "cname", &cname);
        push_ssrc(&mut ssrc_records, *rtx_ssrc, "msid", &msid);
        let mut fid = Record::new();
        fid.insert("semantics".into(), "FID".into());
        fid.insert("ssrcs".into(), format!("{} {}", ssrc, rtx_ssrc).into());
        group_records.push(fid);
    }

    *media.fields.list_mut("ssrcs") = ssrc_records;
    *media.fields.list_mut("ssrcGroups") = group_records;

    Ok(())
}
