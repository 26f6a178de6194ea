//! Building individual m= sections for the remote session description.
//!
//! Sections come in two flavors. Answer sections respond to an offer the
//! local engine produced (sending media to the server). Offer sections are
//! authored from scratch for media the server sends to us. Both build a
//! fresh [`SdpMedia`] record from negotiated parameters instead of patching
//! a parsed one.

use super::grammar::write_params;
use super::model::{Record, SdpMedia, Value};
use crate::producer::ProducerCodecOptions;
use crate::rtp::{RtpCodecParameters, RtpParameters};
use crate::sctp::SctpParameters;
use crate::transport::{
    DtlsParameters, DtlsRole, IceCandidate, IceParameters, PlainRtpParameters,
};
use crate::RtcError;

/// The codec name part of a mime type, "audio/opus" -> "opus".
fn codec_name(codec: &RtpCodecParameters) -> Result<&str, RtcError> {
    codec
        .mime_type
        .split_once('/')
        .filter(|(kind, name)| {
            (kind.eq_ignore_ascii_case("audio") || kind.eq_ignore_ascii_case("video"))
                && !name.is_empty()
        })
        .map(|(_, name)| name)
        .ok_or_else(|| RtcError::Unsupported(format!("invalid codec mimeType: {}", codec.mime_type)))
}

fn rtp_record(codec: &RtpCodecParameters) -> Result<Record, RtcError> {
    let mut rtp = Record::new();
    rtp.insert("payload".into(), codec.payload_type.into());
    rtp.insert("codec".into(), codec_name(codec)?.into());
    rtp.insert("rate".into(), codec.clock_rate.into());
    if let Some(channels) = codec.channels {
        if channels > 1 {
            rtp.insert("encoding".into(), channels.into());
        }
    }
    Ok(rtp)
}

fn fmtp_record(codec: &RtpCodecParameters, params: &crate::rtp::Parameters) -> Option<Record> {
    let config = write_params(params);
    if config.is_empty() {
        return None;
    }
    let mut fmtp = Record::new();
    fmtp.insert("payload".into(), codec.payload_type.into());
    fmtp.insert("config".into(), Value::Str(config));
    Some(fmtp)
}

fn feedback_records(codec: &RtpCodecParameters, out: &mut Vec<Record>) {
    for fb in &codec.rtcp_feedback {
        let mut rec = Record::new();
        rec.insert("payload".into(), codec.payload_type.into());
        rec.insert("type".into(), fb.typ.as_str().into());
        if !fb.parameter.is_empty() {
            rec.insert("subtype".into(), fb.parameter.as_str().into());
        }
        out.push(rec);
    }
}

fn payloads_of(codecs: &[RtpCodecParameters]) -> String {
    codecs
        .iter()
        .map(|c| c.payload_type.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

fn connection_record(ip: &str, version: u8) -> Record {
    let mut conn = Record::new();
    conn.insert("ip".into(), ip.into());
    conn.insert("version".into(), version.into());
    conn
}

fn candidate_record(candidate: &IceCandidate) -> Record {
    let mut rec = Record::new();
    rec.insert("foundation".into(), candidate.foundation.as_str().into());
    // RTCP component never appears with rtcp-mux.
    rec.insert("component".into(), 1i64.into());
    rec.insert("transport".into(), candidate.protocol.as_str().into());
    rec.insert("priority".into(), candidate.priority.into());
    rec.insert("ip".into(), candidate.ip.as_str().into());
    rec.insert("port".into(), candidate.port.into());
    rec.insert("type".into(), candidate.typ.as_str().into());
    if let Some(tcp_type) = &candidate.tcp_type {
        rec.insert("tcptype".into(), tcp_type.as_str().into());
    }
    rec
}

/// Inputs for [`MediaSection::answer`].
pub struct AnswerMediaSectionOpts<'a> {
    pub ice_parameters: Option<&'a IceParameters>,
    pub ice_candidates: &'a [IceCandidate],
    pub dtls_parameters: Option<&'a DtlsParameters>,
    pub plain_rtp_parameters: Option<&'a PlainRtpParameters>,
    pub plan_b: bool,
    /// The m= section from the local engine's offer this answers.
    pub offer_media: &'a SdpMedia,
    /// Offer side parameters, updated in place when codec options reflect
    /// back into the offer (opus stereo/fec/dtx/ptime).
    pub offer_rtp_parameters: Option<&'a mut RtpParameters>,
    pub answer_rtp_parameters: Option<&'a RtpParameters>,
    pub codec_options: Option<&'a ProducerCodecOptions>,
    pub sctp_parameters: Option<&'a SctpParameters>,
    pub extmap_allow_mixed: bool,
}

/// Inputs for [`MediaSection::offer`].
pub struct OfferMediaSectionOpts<'a> {
    pub ice_parameters: Option<&'a IceParameters>,
    pub ice_candidates: &'a [IceCandidate],
    pub dtls_parameters: Option<&'a DtlsParameters>,
    pub plain_rtp_parameters: Option<&'a PlainRtpParameters>,
    pub plan_b: bool,
    pub mid: &'a str,
    /// "audio", "video" or "application".
    pub kind: &'a str,
    pub stream_id: Option<&'a str>,
    pub track_id: Option<&'a str>,
    pub old_data_channel_spec: bool,
    pub sctp_parameters: Option<&'a SctpParameters>,
    pub offer_rtp_parameters: Option<&'a RtpParameters>,
}

/// One m= section under construction inside a [`super::RemoteSdp`].
pub struct MediaSection {
    media: SdpMedia,
    /// Offer sections always answer setup with actpass.
    offer: bool,
    plan_b: bool,
}

impl MediaSection {
    fn base(
        offer: bool,
        plan_b: bool,
        ice_parameters: Option<&IceParameters>,
        ice_candidates: &[IceCandidate],
        dtls_parameters: Option<&DtlsParameters>,
    ) -> MediaSection {
        let mut section = MediaSection {
            media: SdpMedia::new(),
            offer,
            plan_b,
        };

        if let Some(ice) = ice_parameters {
            section.set_ice_parameters(ice);
        }

        if !ice_candidates.is_empty() {
            let candidates = section.media.fields.list_mut("candidates");
            for candidate in ice_candidates {
                candidates.push(candidate_record(candidate));
            }
            section
                .media
                .fields
                .set("endOfCandidates", "end-of-candidates");
            section.media.fields.set("iceOptions", "renomination");
        }

        if let Some(dtls) = dtls_parameters {
            section.set_dtls_role(dtls.role);
        }

        section
    }

    /// An answer section responding to `opts.offer_media`.
    pub fn answer(opts: AnswerMediaSectionOpts<'_>) -> Result<MediaSection, RtcError> {
        let AnswerMediaSectionOpts {
            ice_parameters,
            ice_candidates,
            dtls_parameters,
            plain_rtp_parameters,
            plan_b,
            offer_media,
            mut offer_rtp_parameters,
            answer_rtp_parameters,
            codec_options,
            sctp_parameters,
            extmap_allow_mixed,
        } = opts;

        let mut section = Self::base(false, plan_b, ice_parameters, ice_candidates, dtls_parameters);
        let fields = &mut section.media.fields;

        if let Some(mid) = offer_media.mid() {
            fields.set("mid", mid);
        }
        let typ = offer_media.typ().unwrap_or_default();
        fields.set("type", typ.as_str());
        if let Some(protocol) = offer_media.fields.str_of("protocol") {
            fields.set("protocol", protocol);
        }

        match plain_rtp_parameters {
            None => {
                fields.set_record("connection", connection_record("127.0.0.1", 4));
                fields.set("port", 7i64);
            }
            Some(plain) => {
                fields.set_record("connection", connection_record(&plain.ip, plain.ip_version));
                fields.set("port", i64::from(plain.port));
            }
        }

        match typ.as_str() {
            "audio" | "video" => {
                fields.set("direction", "recvonly");
                fields.list_mut("rtcpFb");

                if let Some(answer) = answer_rtp_parameters {
                    for codec in &answer.codecs {
                        let rtp = rtp_record(codec)?;
                        fields.push_record("rtp", rtp);

                        let mut codec_parameters = codec.parameters.clone();
                        if let Some(options) = codec_options {
                            let offer_codec = offer_rtp_parameters.as_deref_mut().and_then(|o| {
                                o.codecs
                                    .iter_mut()
                                    .find(|c| c.payload_type == codec.payload_type)
                            });
                            if let Some(offer_codec) = offer_codec {
                                options.apply(codec, offer_codec, &mut codec_parameters);
                            }
                        }

                        if let Some(fmtp) = fmtp_record(codec, &codec_parameters) {
                            fields.push_record("fmtp", fmtp);
                        }
                        let mut fbs = vec![];
                        feedback_records(codec, &mut fbs);
                        fields.list_mut("rtcpFb").extend(fbs);
                    }

                    fields.set("payloads", payloads_of(&answer.codecs));

                    // Don't answer header extensions absent from the offer.
                    let offered_uris: Vec<String> = offer_media
                        .fields
                        .list("ext")
                        .unwrap_or_default()
                        .iter()
                        .filter_map(|e| e.get("uri").map(|v| v.to_string()))
                        .collect();
                    let exts = fields.list_mut("ext");
                    for ext in &answer.header_extensions {
                        if offered_uris.iter().any(|uri| *uri == ext.uri) {
                            let mut rec = Record::new();
                            rec.insert("uri".into(), ext.uri.as_str().into());
                            rec.insert("value".into(), ext.id.into());
                            exts.push(rec);
                        }
                    }
                }

                // Allow both 1 byte and 2 bytes length header extensions.
                if extmap_allow_mixed && offer_media.fields.contains("extmapAllowMixed") {
                    fields.set("extmapAllowMixed", "extmap-allow-mixed");
                }

                if let Some(simulcast) = offer_media.fields.record("simulcast") {
                    let mut rec = Record::new();
                    rec.insert("dir1".into(), "recv".into());
                    if let Some(list1) = simulcast.get("list1") {
                        rec.insert("list1".into(), list1.clone());
                    }
                    fields.set_record("simulcast", rec);
                    Self::answer_rids(fields, offer_media);
                } else if let Some(simulcast_03) = offer_media.fields.record("simulcast_03") {
                    let mut rec = Record::new();
                    let value = simulcast_03
                        .get("value")
                        .map(|v| v.to_string())
                        .unwrap_or_default()
                        .replace("send", "recv");
                    rec.insert("value".into(), Value::Str(value));
                    fields.set_record("simulcast_03", rec);
                    Self::answer_rids(fields, offer_media);
                }

                fields.set("rtcpMux", "rtcp-mux");
                fields.set("rtcpRsize", "rtcp-rsize");

                if plan_b && typ == "video" {
                    fields.set("xGoogleFlag", "conference");
                }
            }
            "application" => {
                if let Some(sctp) = sctp_parameters {
                    if offer_media.fields.contains("sctpPort") {
                        fields.set("payloads", "webrtc-datachannel");
                        fields.set("sctpPort", sctp.port);
                        fields.set("maxMessageSize", i64::from(sctp.max_message_size));
                    } else if offer_media.fields.contains("sctpmap") {
                        fields.set("payloads", i64::from(sctp.port));
                        let mut rec = Record::new();
                        rec.insert("app".into(), "webrtc-datachannel".into());
                        rec.insert("sctpmapNumber".into(), sctp.port.into());
                        rec.insert("maxMessageSize".into(), sctp.max_message_size.into());
                        fields.set_record("sctpmap", rec);
                    }
                }
            }
            _ => {}
        }

        Ok(section)
    }

    fn answer_rids(fields: &mut super::model::Fields, offer_media: &SdpMedia) {
        let recv_rids: Vec<Record> = offer_media
            .fields
            .list("rids")
            .unwrap_or_default()
            .iter()
            .filter(|rid| rid.get("direction").map(|d| d.to_string()).as_deref() == Some("send"))
            .filter_map(|rid| {
                let mut rec = Record::new();
                rec.insert("id".into(), rid.get("id")?.clone());
                rec.insert("direction".into(), "recv".into());
                Some(rec)
            })
            .collect();
        *fields.list_mut("rids") = recv_rids;
    }

    /// An offer section authored for media the server will send us (or, for
    /// "application", the SCTP association).
    pub fn offer(opts: OfferMediaSectionOpts<'_>) -> Result<MediaSection, RtcError> {
        let OfferMediaSectionOpts {
            ice_parameters,
            ice_candidates,
            dtls_parameters,
            plain_rtp_parameters,
            plan_b,
            mid,
            kind,
            stream_id,
            track_id,
            old_data_channel_spec,
            sctp_parameters,
            offer_rtp_parameters,
        } = opts;

        let mut section = Self::base(true, plan_b, ice_parameters, ice_candidates, dtls_parameters);
        let fields = &mut section.media.fields;

        fields.set("mid", mid);
        fields.set("type", kind);

        match plain_rtp_parameters {
            None => {
                fields.set_record("connection", connection_record("127.0.0.1", 4));
                let protocol = if sctp_parameters.is_none() {
                    "UDP/TLS/RTP/SAVPF"
                } else {
                    "UDP/DTLS/SCTP"
                };
                fields.set("protocol", protocol);
                fields.set("port", 7i64);
            }
            Some(plain) => {
                fields.set_record("connection", connection_record(&plain.ip, plain.ip_version));
                fields.set("protocol", "RTP/AVP");
                fields.set("port", i64::from(plain.port));
            }
        }

        match kind {
            "audio" | "video" => {
                fields.set("direction", "sendonly");
                fields.list_mut("rtcpFb");

                if !plan_b {
                    let msid = format!(
                        "{} {}",
                        stream_id.unwrap_or("-"),
                        track_id.unwrap_or_default()
                    );
                    fields.set("msid", msid);
                }

                if let Some(offer) = offer_rtp_parameters {
                    for codec in &offer.codecs {
                        let rtp = rtp_record(codec)?;
                        fields.push_record("rtp", rtp);
                        if let Some(fmtp) = fmtp_record(codec, &codec.parameters) {
                            fields.push_record("fmtp", fmtp);
                        }
                        let mut fbs = vec![];
                        feedback_records(codec, &mut fbs);
                        fields.list_mut("rtcpFb").extend(fbs);
                    }

                    fields.set("payloads", payloads_of(&offer.codecs));

                    let exts = fields.list_mut("ext");
                    for ext in &offer.header_extensions {
                        let mut rec = Record::new();
                        rec.insert("uri".into(), ext.uri.as_str().into());
                        rec.insert("value".into(), ext.id.into());
                        exts.push(rec);
                    }

                    fields.set("rtcpMux", "rtcp-mux");
                    fields.set("rtcpRsize", "rtcp-rsize");
                    fields.list_mut("ssrcs");
                    fields.list_mut("ssrcGroups");

                    section.add_stream_ssrcs(offer, stream_id, track_id);
                }
            }
            "application" => {
                if let Some(sctp) = sctp_parameters {
                    if !old_data_channel_spec {
                        fields.set("payloads", "webrtc-datachannel");
                        fields.set("sctpPort", sctp.port);
                        fields.set("maxMessageSize", i64::from(sctp.max_message_size));
                    } else {
                        fields.set("payloads", i64::from(sctp.port));
                        let mut rec = Record::new();
                        rec.insert("app".into(), "webrtc-datachannel".into());
                        rec.insert("sctpmapNumber".into(), sctp.port.into());
                        rec.insert("maxMessageSize".into(), sctp.max_message_size.into());
                        fields.set_record("sctpmap", rec);
                    }
                }
            }
            _ => {}
        }

        Ok(section)
    }

    /// The a=mid value of this section.
    pub fn mid(&self) -> Option<String> {
        self.media.mid()
    }

    pub fn closed(&self) -> bool {
        self.media.closed()
    }

    /// The built m= section record.
    pub fn media(&self) -> &SdpMedia {
        &self.media
    }

    pub fn set_ice_parameters(&mut self, ice_parameters: &IceParameters) {
        self.media
            .fields
            .set("iceUfrag", ice_parameters.username_fragment.as_str());
        self.media
            .fields
            .set("icePwd", ice_parameters.password.as_str());
    }

    /// The a=setup answer for the given remote role. Offer sections always
    /// leave the choice open with actpass.
    pub fn set_dtls_role(&mut self, role: DtlsRole) {
        let setup = if self.offer {
            "actpass"
        } else {
            match role {
                DtlsRole::Client => "active",
                DtlsRole::Server => "passive",
                DtlsRole::Auto => "actpass",
            }
        };
        self.media.fields.set("setup", setup);
    }

    /// Stop media flow without releasing the slot.
    pub fn disable(&mut self) {
        self.media.fields.set("direction", "inactive");
        for key in ["ext", "ssrcs", "ssrcGroups", "simulcast", "simulcast_03", "rids"] {
            self.media.fields.remove(key);
        }
    }

    /// Close the section. Its m= slot (port 0) stays in the session and can
    /// be reused by a later section.
    pub fn close(&mut self) {
        self.disable();
        self.media.fields.set("port", 0i64);
        self.media.fields.remove("extmapAllowMixed");
    }

    fn add_stream_ssrcs(
        &mut self,
        offer_rtp_parameters: &RtpParameters,
        stream_id: Option<&str>,
        track_id: Option<&str>,
    ) {
        let Some(encoding) = offer_rtp_parameters.encodings.first() else {
            return;
        };
        let Some(ssrc) = encoding.ssrc else {
            return;
        };
        let rtx_ssrc = encoding.rtx.as_ref().map(|rtx| rtx.ssrc);
        let cname = offer_rtp_parameters
            .rtcp
            .as_ref()
            .and_then(|rtcp| rtcp.cname.clone());
        let msid = format!(
            "{} {}",
            stream_id.unwrap_or("-"),
            track_id.unwrap_or_default()
        );

        let plan_b = self.plan_b;
        let ssrcs = self.media.fields.list_mut("ssrcs");
        let mut push_ssrc = |id: u32, attribute: &str, value: &str| {
            let mut rec = Record::new();
            rec.insert("id".into(), id.into());
            rec.insert("attribute".into(), attribute.into());
            rec.insert("value".into(), value.into());
            ssrcs.push(rec);
        };

        if let Some(cname) = &cname {
            push_ssrc(ssrc, "cname", cname);
        }
        if plan_b {
            push_ssrc(ssrc, "msid", &msid);
        }
        if let Some(rtx_ssrc) = rtx_ssrc {
            if let Some(cname) = &cname {
                push_ssrc(rtx_ssrc, "cname", cname);
            }
            if plan_b {
                push_ssrc(rtx_ssrc, "msid", &msid);
            }
            let mut group = Record::new();
            group.insert("semantics".into(), "FID".into());
            group.insert("ssrcs".into(), format!("{} {}", ssrc, rtx_ssrc).into());
            self.media.fields.push_record("ssrcGroups", group);
        }
    }

    /// Plan-B only: add the ssrc lines of another received stream to this
    /// (shared, per kind) section.
    pub fn plan_b_receive(
        &mut self,
        offer_rtp_parameters: &RtpParameters,
        stream_id: &str,
        track_id: &str,
    ) {
        self.add_stream_ssrcs(offer_rtp_parameters, Some(stream_id), Some(track_id));
    }

    /// Plan-B only: remove the ssrc lines of a stream no longer received.
    pub fn plan_b_stop_receiving(&mut self, offer_rtp_parameters: &RtpParameters) {
        let Some(encoding) = offer_rtp_parameters.encodings.first() else {
            return;
        };
        let Some(ssrc) = encoding.ssrc else {
            return;
        };
        let rtx_ssrc = encoding.rtx.as_ref().map(|rtx| rtx.ssrc);

        let dropped = |id: Option<i64>| {
            id == Some(i64::from(ssrc)) || (rtx_ssrc.is_some() && id.map(|i| i as u32) == rtx_ssrc)
        };
        self.media
            .fields
            .list_mut("ssrcs")
            .retain(|rec| !dropped(rec.get("id").and_then(|v| v.as_i64())));

        if let Some(rtx_ssrc) = rtx_ssrc {
            let group = format!("{} {}", ssrc, rtx_ssrc);
            self.media
                .fields
                .list_mut("ssrcGroups")
                .retain(|rec| rec.get("ssrcs").map(|v| v.to_string()).as_deref() != Some(&group));
        }
    }
}
