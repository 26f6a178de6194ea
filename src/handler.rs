//! The SDP handler driving one transport's native engine.
//!
//! Mediates between the negotiation core and a [`NativeEngine`] (the
//! WebRTC implementation actually moving packets). The handler owns the
//! remote session description and runs each offer/answer exchange as a
//! sequence of blocking engine calls.

use std::collections::HashMap;

use crate::ortc::{get_sending_remote_rtp_parameters, get_sending_rtp_parameters, reduce_codecs};
use crate::producer::ProducerCodecOptions;
use crate::rtp::{
    Direction, ExtendedRtpCapabilities, MediaKind, RtpCodecCapability, RtpEncodingParameters,
    RtpParameters, ScalabilityMode,
};
use crate::sctp::{SctpParameters, SctpStreamParameters};
use crate::sdp::{self, utils, RemoteSdp};
use crate::transport::{
    ConnectionState, DtlsParameters, DtlsRole, IceCandidate, IceParameters, SignalingChannel,
    TransportDirection,
};
use crate::RtcError;

/// Highest number of inbound and outbound SCTP streams we negotiate.
pub const SCTP_NUM_STREAMS_OS: u16 = 1024;
/// See [`SCTP_NUM_STREAMS_OS`].
pub const SCTP_NUM_STREAMS_MIS: u16 = 1024;

/// Which half of an SDP exchange a session description is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpType {
    /// An offer.
    Offer,
    /// An answer.
    Answer,
}

/// The WebRTC engine behind a transport.
///
/// All calls are synchronous; an implementation backed by an async engine
/// blocks on each call. Session descriptions cross this boundary as plain
/// SDP text.
pub trait NativeEngine {
    /// Create an offer covering the current transceivers.
    fn create_offer(&mut self) -> Result<String, RtcError>;

    /// Create an answer to the currently set remote description.
    fn create_answer(&mut self) -> Result<String, RtcError>;

    fn set_local_description(&mut self, typ: SdpType, sdp: &str) -> Result<(), RtcError>;

    fn set_remote_description(&mut self, typ: SdpType, sdp: &str) -> Result<(), RtcError>;

    /// The current local description, as last set (possibly munged by the
    /// engine).
    fn local_description(&self) -> Option<String>;

    /// Add a transceiver, optionally bound to a local track.
    fn add_transceiver(
        &mut self,
        kind: MediaKind,
        direction: Direction,
        track: Option<&str>,
    ) -> Result<(), RtcError>;

    /// Replace the track of the sending transceiver with the given mid.
    fn replace_track(&mut self, mid: &str, track: Option<&str>) -> Result<(), RtcError>;

    /// Create a pre-negotiated data channel on the given SCTP stream.
    fn create_data_channel(
        &mut self,
        stream_id: u16,
        label: &str,
        ordered: bool,
        max_packet_life_time: Option<u16>,
        max_retransmits: Option<u16>,
        protocol: &str,
    ) -> Result<(), RtcError>;

    /// Connection state changes since the last poll, oldest first.
    fn poll_connection_state(&mut self) -> Option<ConnectionState>;

    /// Transport level stats, engine defined.
    fn stats(&mut self) -> Result<String, RtcError>;

    fn close(&mut self);
}

/// Creates engines: once per transport, plus throwaway ones for
/// capability probing.
pub trait NativeEngineFactory {
    fn create_engine(&self) -> Box<dyn NativeEngine>;
}

/// What [`SdpHandler::send`] produced.
pub struct HandlerSendResult {
    /// The mid of the sending transceiver.
    pub local_id: String,
    /// The RTP parameters to signal to the server.
    pub rtp_parameters: RtpParameters,
}

/// Per-transport SDP negotiation state.
pub(crate) struct SdpHandler {
    direction: TransportDirection,
    engine: Box<dyn NativeEngine>,
    remote_sdp: RemoteSdp,
    sending_rtp_parameters_by_kind: HashMap<MediaKind, RtpParameters>,
    sending_remote_rtp_parameters_by_kind: HashMap<MediaKind, RtpParameters>,
    /// Mids of transceivers we created, in creation order.
    transceiver_mids: Vec<String>,
    has_data_channel_media_section: bool,
    next_send_sctp_stream_id: u16,
    /// Set after the one-time DTLS connect exchange.
    transport_ready: bool,
    /// DTLS parameters of a connect that just happened, for the transport
    /// to turn into an event.
    pending_connect: Option<DtlsParameters>,
}

impl SdpHandler {
    pub fn new(
        direction: TransportDirection,
        engine: Box<dyn NativeEngine>,
        ice_parameters: IceParameters,
        ice_candidates: Vec<IceCandidate>,
        dtls_parameters: DtlsParameters,
        sctp_parameters: Option<SctpParameters>,
        extended_rtp_capabilities: &ExtendedRtpCapabilities,
    ) -> SdpHandler {
        debug!("SdpHandler new() [direction:{:?}]", direction);

        let remote_sdp = RemoteSdp::new(
            Some(ice_parameters),
            ice_candidates,
            Some(dtls_parameters),
            sctp_parameters,
            None,
            false,
        );

        let mut sending = HashMap::new();
        let mut sending_remote = HashMap::new();
        for kind in [MediaKind::Audio, MediaKind::Video] {
            sending.insert(kind, get_sending_rtp_parameters(kind, extended_rtp_capabilities));
            sending_remote.insert(
                kind,
                get_sending_remote_rtp_parameters(kind, extended_rtp_capabilities),
            );
        }

        SdpHandler {
            direction,
            engine,
            remote_sdp,
            sending_rtp_parameters_by_kind: sending,
            sending_remote_rtp_parameters_by_kind: sending_remote,
            transceiver_mids: vec![],
            has_data_channel_media_section: false,
            next_send_sctp_stream_id: 0,
            transport_ready: false,
            pending_connect: None,
        }
    }

    /// The DTLS parameters of a connect exchange that just ran, once.
    pub fn take_pending_connect(&mut self) -> Option<DtlsParameters> {
        self.pending_connect.take()
    }

    pub fn poll_connection_state(&mut self) -> Option<ConnectionState> {
        self.engine.poll_connection_state()
    }

    pub fn stats(&mut self) -> Result<String, RtcError> {
        self.engine.stats()
    }

    pub fn close(&mut self) {
        debug!("SdpHandler close()");
        self.engine.close();
    }

    /// Start sending a track. Runs the full offer/answer exchange and
    /// returns the negotiated sending parameters.
    pub fn send(
        &mut self,
        track: Option<&str>,
        kind: MediaKind,
        mut encodings: Vec<RtpEncodingParameters>,
        codec_options: Option<&ProducerCodecOptions>,
        codec: Option<&RtpCodecCapability>,
        signaling: &mut dyn SignalingChannel,
    ) -> Result<HandlerSendResult, RtcError> {
        self.assert_send_direction()?;
        debug!("send() [kind:{}, track:{:?}]", kind, track);

        for (idx, encoding) in encodings.iter_mut().enumerate() {
            encoding.rid = Some(format!("r{}", idx));
        }

        let mut sending_rtp_parameters = self.sending_rtp_parameters_by_kind[&kind].clone();
        sending_rtp_parameters.codecs = reduce_codecs(&sending_rtp_parameters.codecs, codec)?;

        let mut sending_remote_rtp_parameters =
            self.sending_remote_rtp_parameters_by_kind[&kind].clone();
        sending_remote_rtp_parameters.codecs =
            reduce_codecs(&sending_remote_rtp_parameters.codecs, codec)?;

        let media_section_idx = self.remote_sdp.next_media_section_idx();

        self.engine.add_transceiver(kind, Direction::SendOnly, track)?;
        let mut offer = self.engine.create_offer()?;
        let mut local_session = sdp::parse(&offer);

        if !self.transport_ready {
            self.setup_transport(DtlsRole::Server, &local_session, signaling)?;
        }

        // VP9 SVC gets announced through multi-ssrc legacy simulcast.
        let layers = ScalabilityMode::parse(
            encodings
                .first()
                .and_then(|e| e.scalability_mode.as_deref())
                .unwrap_or(""),
        );
        let mut hack_vp9_svc = false;
        if encodings.len() == 1
            && layers.spatial_layers > 1
            && sending_rtp_parameters.codecs[0]
                .mime_type
                .eq_ignore_ascii_case("video/vp9")
        {
            debug!("send() | enabling legacy simulcast for VP9 SVC");
            hack_vp9_svc = true;
            utils::add_legacy_simulcast(
                &mut local_session.media[media_section_idx.idx],
                layers.spatial_layers,
            )?;
            offer = sdp::write(&local_session)?;
        }

        debug!("send() | calling engine.set_local_description() [offer]");
        self.engine.set_local_description(SdpType::Offer, &offer)?;

        // Mids are assigned now.
        let local_sdp = self
            .engine
            .local_description()
            .ok_or_else(|| RtcError::InvalidState("no local description".to_string()))?;
        let local_session = sdp::parse(&local_sdp);
        let offer_media = local_session
            .media
            .get(media_section_idx.idx)
            .ok_or_else(|| RtcError::NotFound("offered media section not found".to_string()))?;
        let local_id = offer_media
            .mid()
            .ok_or_else(|| RtcError::NotFound("transceiver mid not found".to_string()))?;

        sending_rtp_parameters.mid = Some(local_id.clone());

        let cname = utils::get_cname(offer_media);
        sending_rtp_parameters
            .rtcp
            .get_or_insert_with(Default::default)
            .cname = Some(cname);

        if encodings.is_empty() {
            // Take the encodings the engine offered.
            sending_rtp_parameters.encodings = utils::get_rtp_encodings(offer_media)?;
        } else if encodings.len() == 1 {
            // Complete the offered encodings with the single given one.
            let mut new_encodings = utils::get_rtp_encodings(offer_media)?;
            if let Some(first) = new_encodings.first() {
                new_encodings[0] = first.merged_with(&encodings[0]);
            }
            if hack_vp9_svc {
                new_encodings.truncate(1);
            }
            sending_rtp_parameters.encodings = new_encodings;
        } else {
            sending_rtp_parameters.encodings = encodings;
        }

        // Effective VP8/H264 simulcast sends three temporal layers per
        // stream.
        if sending_rtp_parameters.encodings.len() > 1 {
            let mime = sending_rtp_parameters.codecs[0].mime_type.to_lowercase();
            if mime == "video/vp8" || mime == "video/h264" {
                for encoding in &mut sending_rtp_parameters.encodings {
                    encoding.scalability_mode = Some("S1T3".to_string());
                }
            }
        }

        self.remote_sdp.send(
            offer_media,
            &mut sending_rtp_parameters,
            &sending_remote_rtp_parameters,
            codec_options,
            media_section_idx.reuse_mid.as_deref(),
            true,
        )?;

        let answer = self.remote_sdp.sdp()?;
        debug!("send() | calling engine.set_remote_description() [answer]");
        self.engine.set_remote_description(SdpType::Answer, &answer)?;

        self.transceiver_mids.push(local_id.clone());

        Ok(HandlerSendResult {
            local_id,
            rtp_parameters: sending_rtp_parameters,
        })
    }

    /// Stop sending: close the media section and re-negotiate.
    pub fn stop_sending(&mut self, local_id: &str) -> Result<(), RtcError> {
        self.assert_send_direction()?;
        debug!("stop_sending() [local_id:{}]", local_id);

        self.known_mid(local_id)?;
        self.transceiver_mids.retain(|mid| mid != local_id);

        self.remote_sdp.close_media_section(local_id)?;

        let offer = self.engine.create_offer()?;
        self.engine.set_local_description(SdpType::Offer, &offer)?;
        let answer = self.remote_sdp.sdp()?;
        self.engine.set_remote_description(SdpType::Answer, &answer)?;

        Ok(())
    }

    pub fn replace_track(&mut self, local_id: &str, track: Option<&str>) -> Result<(), RtcError> {
        self.assert_send_direction()?;
        debug!("replace_track() [local_id:{}, track:{:?}]", local_id, track);
        self.known_mid(local_id)?;
        self.engine.replace_track(local_id, track)
    }

    /// Open an outgoing data channel, negotiating the single m=application
    /// section on first use.
    pub fn send_data_channel(
        &mut self,
        ordered: bool,
        max_packet_life_time: Option<u16>,
        max_retransmits: Option<u16>,
        label: &str,
        protocol: &str,
        signaling: &mut dyn SignalingChannel,
    ) -> Result<SctpStreamParameters, RtcError> {
        self.assert_send_direction()?;
        debug!("send_data_channel() [label:{}]", label);

        let stream_id = self.next_send_sctp_stream_id;
        let parameters = SctpStreamParameters {
            stream_id,
            ordered,
            max_packet_life_time,
            max_retransmits,
            priority: None,
            label: Some(label.to_string()),
            protocol: Some(protocol.to_string()),
        }
        .normalize();

        self.engine.create_data_channel(
            stream_id,
            label,
            parameters.ordered,
            max_packet_life_time,
            max_retransmits,
            protocol,
        )?;
        self.next_send_sctp_stream_id = (self.next_send_sctp_stream_id + 1) % SCTP_NUM_STREAMS_MIS;

        if !self.has_data_channel_media_section {
            let offer = self.engine.create_offer()?;
            let local_session = sdp::parse(&offer);
            let offer_media = local_session
                .media
                .iter()
                .find(|m| m.typ().as_deref() == Some("application"))
                .ok_or_else(|| RtcError::NotFound("no datachannel media section".to_string()))?;

            if !self.transport_ready {
                self.setup_transport(DtlsRole::Server, &local_session, signaling)?;
            }

            debug!("send_data_channel() | calling engine.set_local_description() [offer]");
            self.engine.set_local_description(SdpType::Offer, &offer)?;
            self.remote_sdp.send_sctp_association(offer_media)?;
            let answer = self.remote_sdp.sdp()?;
            debug!("send_data_channel() | calling engine.set_remote_description() [answer]");
            self.engine.set_remote_description(SdpType::Answer, &answer)?;
            self.has_data_channel_media_section = true;
        }

        Ok(parameters)
    }

    /// Start receiving a server stream. Returns the local id (mid).
    pub fn receive(
        &mut self,
        track_id: &str,
        kind: MediaKind,
        rtp_parameters: &RtpParameters,
        signaling: &mut dyn SignalingChannel,
    ) -> Result<String, RtcError> {
        self.assert_recv_direction()?;
        debug!("receive() [track_id:{}, kind:{}]", track_id, kind);

        let local_id = match &rtp_parameters.mid {
            Some(mid) => mid.clone(),
            None => self.transceiver_mids.len().to_string(),
        };
        let cname = rtp_parameters
            .rtcp
            .as_ref()
            .and_then(|rtcp| rtcp.cname.as_deref())
            .ok_or_else(|| RtcError::InvalidState("rtcp cname required".to_string()))?
            .to_string();

        self.remote_sdp
            .receive(&local_id, kind.as_str(), rtp_parameters, &cname, track_id)?;

        let offer = self.remote_sdp.sdp()?;
        debug!("receive() | calling engine.set_remote_description() [offer]");
        self.engine.set_remote_description(SdpType::Offer, &offer)?;

        let answer = self.engine.create_answer()?;
        let mut local_session = sdp::parse(&answer);
        let answer_media = local_session
            .media_by_mid_mut(&local_id)
            .ok_or_else(|| RtcError::NotFound("answer media section not found".to_string()))?;
        // The answer may need codec parameters reflected from the offer.
        utils::apply_codec_parameters(rtp_parameters, answer_media);
        let answer = sdp::write(&local_session)?;

        if !self.transport_ready {
            self.setup_transport(DtlsRole::Client, &local_session, signaling)?;
        }

        debug!("receive() | calling engine.set_local_description() [answer]");
        self.engine.set_local_description(SdpType::Answer, &answer)?;

        self.transceiver_mids.push(local_id.clone());

        Ok(local_id)
    }

    /// Stop receiving: close the media section and re-negotiate.
    pub fn stop_receiving(&mut self, local_id: &str) -> Result<(), RtcError> {
        self.assert_recv_direction()?;
        debug!("stop_receiving() [local_id:{}]", local_id);

        self.known_mid(local_id)?;
        self.transceiver_mids.retain(|mid| mid != local_id);

        self.remote_sdp.close_media_section(local_id)?;

        let offer = self.remote_sdp.sdp()?;
        self.engine.set_remote_description(SdpType::Offer, &offer)?;
        let answer = self.engine.create_answer()?;
        self.engine.set_local_description(SdpType::Answer, &answer)?;

        Ok(())
    }

    /// Open an incoming (pre-negotiated) data channel.
    pub fn receive_data_channel(
        &mut self,
        sctp_stream_parameters: &SctpStreamParameters,
        label: &str,
        protocol: &str,
        signaling: &mut dyn SignalingChannel,
    ) -> Result<(), RtcError> {
        self.assert_recv_direction()?;
        debug!("receive_data_channel() [label:{}]", label);

        self.engine.create_data_channel(
            sctp_stream_parameters.stream_id,
            label,
            sctp_stream_parameters.ordered,
            sctp_stream_parameters.max_packet_life_time,
            sctp_stream_parameters.max_retransmits,
            protocol,
        )?;

        if !self.has_data_channel_media_section {
            self.remote_sdp.receive_sctp_association(false)?;
            let offer = self.remote_sdp.sdp()?;
            debug!("receive_data_channel() | calling engine.set_remote_description() [offer]");
            self.engine.set_remote_description(SdpType::Offer, &offer)?;
            let answer = self.engine.create_answer()?;
            if !self.transport_ready {
                let local_session = sdp::parse(&answer);
                self.setup_transport(DtlsRole::Client, &local_session, signaling)?;
            }
            debug!("receive_data_channel() | calling engine.set_local_description() [answer]");
            self.engine.set_local_description(SdpType::Answer, &answer)?;
            self.has_data_channel_media_section = true;
        }

        Ok(())
    }

    /// Apply fresh ICE parameters and re-run the offer/answer exchange.
    pub fn restart_ice(&mut self, ice_parameters: IceParameters) -> Result<(), RtcError> {
        debug!("restart_ice()");

        self.remote_sdp.update_ice_parameters(ice_parameters);

        if !self.transport_ready {
            return Ok(());
        }

        match self.direction {
            TransportDirection::Send => {
                let offer = self.engine.create_offer()?;
                self.engine.set_local_description(SdpType::Offer, &offer)?;
                let answer = self.remote_sdp.sdp()?;
                self.engine.set_remote_description(SdpType::Answer, &answer)?;
            }
            TransportDirection::Recv => {
                let offer = self.remote_sdp.sdp()?;
                self.engine.set_remote_description(SdpType::Offer, &offer)?;
                let answer = self.engine.create_answer()?;
                self.engine.set_local_description(SdpType::Answer, &answer)?;
            }
        }

        Ok(())
    }

    /// One-time DTLS parameter exchange with the server.
    fn setup_transport(
        &mut self,
        local_dtls_role: DtlsRole,
        local_session: &sdp::SdpSession,
        signaling: &mut dyn SignalingChannel,
    ) -> Result<(), RtcError> {
        let mut dtls_parameters = utils::extract_dtls_parameters(local_session)?;
        dtls_parameters.role = local_dtls_role;

        let remote_role = match local_dtls_role {
            DtlsRole::Client => DtlsRole::Server,
            _ => DtlsRole::Client,
        };
        self.remote_sdp.update_dtls_role(remote_role);

        // The server must learn our parameters before media can flow.
        signaling.connect(&dtls_parameters)?;

        self.pending_connect = Some(dtls_parameters);
        self.transport_ready = true;

        Ok(())
    }

    fn known_mid(&self, local_id: &str) -> Result<(), RtcError> {
        if self.transceiver_mids.iter().any(|mid| mid == local_id) {
            Ok(())
        } else {
            Err(RtcError::NotFound(format!(
                "associated transceiver not found [local_id:{}]",
                local_id
            )))
        }
    }

    fn assert_send_direction(&self) -> Result<(), RtcError> {
        if self.direction == TransportDirection::Send {
            Ok(())
        } else {
            Err(RtcError::InvalidState(
                "method can just be called on a send transport".to_string(),
            ))
        }
    }

    fn assert_recv_direction(&self) -> Result<(), RtcError> {
        if self.direction == TransportDirection::Recv {
            Ok(())
        } else {
            Err(RtcError::InvalidState(
                "method can just be called on a recv transport".to_string(),
            ))
        }
    }
}
