//! The remote session description under our control.
//!
//! Holds an arena of media sections. Sections are never removed once added:
//! closing one sets its port to 0 and keeps the m= slot, which a later
//! section may reuse. Indices into the arena are therefore stable handles.

use std::collections::HashMap;

use super::media_section::{AnswerMediaSectionOpts, MediaSection, OfferMediaSectionOpts};
use super::model::{Fields, Record, SdpMedia, SdpSession};
use crate::producer::ProducerCodecOptions;
use crate::rtp::RtpParameters;
use crate::sctp::SctpParameters;
use crate::transport::{
    DtlsParameters, DtlsRole, IceCandidate, IceParameters, PlainRtpParameters,
};
use crate::RtcError;

/// Where the next media section will live in the arena.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSectionIdx {
    pub idx: usize,
    /// Set when a closed section's m= slot (and its mid) is being recycled.
    pub reuse_mid: Option<String>,
}

pub struct RemoteSdp {
    ice_parameters: Option<IceParameters>,
    ice_candidates: Vec<IceCandidate>,
    dtls_parameters: Option<DtlsParameters>,
    sctp_parameters: Option<SctpParameters>,
    plain_rtp_parameters: Option<PlainRtpParameters>,
    plan_b: bool,
    sections: Vec<MediaSection>,
    mid_to_index: HashMap<String, usize>,
    first_mid: Option<String>,
    /// Session level fields (origin, timing, fingerprint, BUNDLE group...).
    session: Fields,
}

impl RemoteSdp {
    pub fn new(
        ice_parameters: Option<IceParameters>,
        ice_candidates: Vec<IceCandidate>,
        dtls_parameters: Option<DtlsParameters>,
        sctp_parameters: Option<SctpParameters>,
        plain_rtp_parameters: Option<PlainRtpParameters>,
        plan_b: bool,
    ) -> RemoteSdp {
        let mut session = Fields::default();
        session.set("version", 0i64);

        let mut origin = Record::new();
        origin.insert("username".into(), "sigrtc-client".into());
        origin.insert("sessionId".into(), 10000i64.into());
        origin.insert("sessionVersion".into(), 0i64.into());
        origin.insert("netType".into(), "IN".into());
        origin.insert("ipVer".into(), 4i64.into());
        origin.insert("address".into(), "0.0.0.0".into());
        // Plain RTP overrides the origin address.
        if let Some(plain) = &plain_rtp_parameters {
            origin.insert("address".into(), plain.ip.as_str().into());
            origin.insert("ipVer".into(), plain.ip_version.into());
        }
        session.set_record("origin", origin);

        session.set("name", "-");

        let mut timing = Record::new();
        timing.insert("start".into(), 0i64.into());
        timing.insert("stop".into(), 0i64.into());
        session.set_record("timing", timing);

        if let Some(ice) = &ice_parameters {
            if ice.ice_lite {
                session.set("icelite", "ice-lite");
            }
        }

        // DTLS parameters present means WebRTC, so BUNDLE everything.
        if let Some(dtls) = &dtls_parameters {
            let mut msid_semantic = Record::new();
            msid_semantic.insert("semantic".into(), "WMS".into());
            msid_semantic.insert("token".into(), "*".into());
            session.set_record("msidSemantic", msid_semantic);

            let fingerprint = dtls
                .fingerprints
                .iter()
                .find(|f| f.algorithm == "sha-256")
                .or(dtls.fingerprints.last());
            if let Some(fingerprint) = fingerprint {
                let mut rec = Record::new();
                rec.insert("type".into(), fingerprint.algorithm.as_str().into());
                rec.insert("hash".into(), fingerprint.value.as_str().into());
                session.set_record("fingerprint", rec);
            }

            let mut bundle = Record::new();
            bundle.insert("type".into(), "BUNDLE".into());
            bundle.insert("mids".into(), "".into());
            session.push_record("groups", bundle);
        }

        RemoteSdp {
            ice_parameters,
            ice_candidates,
            dtls_parameters,
            sctp_parameters,
            plain_rtp_parameters,
            plan_b,
            sections: vec![],
            mid_to_index: HashMap::new(),
            first_mid: None,
            session,
        }
    }

    pub fn update_ice_parameters(&mut self, ice_parameters: IceParameters) {
        debug!("update_ice_parameters() [{:?}]", ice_parameters);

        if ice_parameters.ice_lite {
            self.session.set("icelite", "ice-lite");
        } else {
            self.session.remove("icelite");
        }
        for section in &mut self.sections {
            section.set_ice_parameters(&ice_parameters);
        }
        self.ice_parameters = Some(ice_parameters);
    }

    pub fn update_dtls_role(&mut self, role: DtlsRole) {
        debug!("update_dtls_role() [{:?}]", role);

        if let Some(dtls) = &mut self.dtls_parameters {
            dtls.role = role;
            for section in &mut self.sections {
                section.set_dtls_role(role);
            }
        }
    }

    /// Index for the next section: the first closed slot, else one past the
    /// end.
    pub fn next_media_section_idx(&self) -> MediaSectionIdx {
        for (idx, section) in self.sections.iter().enumerate() {
            if section.closed() {
                return MediaSectionIdx {
                    idx,
                    reuse_mid: section.mid(),
                };
            }
        }
        MediaSectionIdx {
            idx: self.sections.len(),
            reuse_mid: None,
        }
    }

    /// Answer a local offer section for media we are sending.
    #[allow(clippy::too_many_arguments)]
    pub fn send(
        &mut self,
        offer_media: &SdpMedia,
        offer_rtp_parameters: &mut RtpParameters,
        answer_rtp_parameters: &RtpParameters,
        codec_options: Option<&ProducerCodecOptions>,
        reuse_mid: Option<&str>,
        extmap_allow_mixed: bool,
    ) -> Result<(), RtcError> {
        let section = MediaSection::answer(AnswerMediaSectionOpts {
            ice_parameters: self.ice_parameters.as_ref(),
            ice_candidates: &self.ice_candidates,
            dtls_parameters: self.dtls_parameters.as_ref(),
            plain_rtp_parameters: self.plain_rtp_parameters.as_ref(),
            plan_b: self.plan_b,
            offer_media,
            offer_rtp_parameters: Some(offer_rtp_parameters),
            answer_rtp_parameters: Some(answer_rtp_parameters),
            codec_options,
            sctp_parameters: self.sctp_parameters.as_ref(),
            extmap_allow_mixed,
        })?;

        if let Some(reuse_mid) = reuse_mid {
            // Unified-Plan, replacing a closed media section.
            self.replace_media_section(section, Some(reuse_mid))?;
        } else if !self.known_mid(&section) {
            // Unified-Plan, or Plan-B with a new media kind.
            self.add_media_section(section);
        } else {
            // Plan-B with the same media kind.
            self.replace_media_section(section, None)?;
        }

        Ok(())
    }

    /// Author an offer section for media the server sends us.
    pub fn receive(
        &mut self,
        mid: &str,
        kind: &str,
        offer_rtp_parameters: &RtpParameters,
        stream_id: &str,
        track_id: &str,
    ) -> Result<(), RtcError> {
        if let Some(idx) = self.mid_to_index.get(mid).copied() {
            // Plan-B, the shared section of this kind gains another stream.
            self.sections[idx].plan_b_receive(offer_rtp_parameters, stream_id, track_id);
            return Ok(());
        }

        let section = MediaSection::offer(OfferMediaSectionOpts {
            ice_parameters: self.ice_parameters.as_ref(),
            ice_candidates: &self.ice_candidates,
            dtls_parameters: self.dtls_parameters.as_ref(),
            plain_rtp_parameters: self.plain_rtp_parameters.as_ref(),
            plan_b: self.plan_b,
            mid,
            kind,
            stream_id: Some(stream_id),
            track_id: Some(track_id),
            old_data_channel_spec: false,
            sctp_parameters: None,
            offer_rtp_parameters: Some(offer_rtp_parameters),
        })?;

        // Recycle a closed slot if there is one. A closed m=audio slot can
        // carry a new m=video section just fine.
        let closed_mid = self
            .sections
            .iter()
            .find(|s| s.closed())
            .and_then(|s| s.mid());
        match closed_mid {
            Some(closed_mid) => self.replace_media_section(section, Some(&closed_mid))?,
            None => self.add_media_section(section),
        }

        Ok(())
    }

    pub fn disable_media_section(&mut self, mid: &str) -> Result<(), RtcError> {
        let idx = self.index_of(mid)?;
        self.sections[idx].disable();
        Ok(())
    }

    pub fn close_media_section(&mut self, mid: &str) -> Result<(), RtcError> {
        let idx = self.index_of(mid)?;

        // Closing the first m= section would invalidate the bundled
        // transport, so it is only ever disabled.
        if Some(mid) == self.first_mid.as_deref() {
            debug!(
                "close_media_section() | cannot close first media section, disabling it [mid:{}]",
                mid
            );
            return self.disable_media_section(mid);
        }

        self.sections[idx].close();
        self.regenerate_bundle_mids();
        Ok(())
    }

    pub fn plan_b_stop_receiving(
        &mut self,
        mid: &str,
        offer_rtp_parameters: &RtpParameters,
    ) -> Result<(), RtcError> {
        let idx = self.index_of(mid)?;
        self.sections[idx].plan_b_stop_receiving(offer_rtp_parameters);
        Ok(())
    }

    /// Answer the local offer's application section (SCTP association we
    /// initiate).
    pub fn send_sctp_association(&mut self, offer_media: &SdpMedia) -> Result<(), RtcError> {
        let section = MediaSection::answer(AnswerMediaSectionOpts {
            ice_parameters: self.ice_parameters.as_ref(),
            ice_candidates: &self.ice_candidates,
            dtls_parameters: self.dtls_parameters.as_ref(),
            plain_rtp_parameters: self.plain_rtp_parameters.as_ref(),
            plan_b: self.plan_b,
            offer_media,
            offer_rtp_parameters: None,
            answer_rtp_parameters: None,
            codec_options: None,
            sctp_parameters: self.sctp_parameters.as_ref(),
            extmap_allow_mixed: false,
        })?;
        self.add_media_section(section);
        Ok(())
    }

    /// Author the application section for an SCTP association the server
    /// initiates.
    pub fn receive_sctp_association(&mut self, old_data_channel_spec: bool) -> Result<(), RtcError> {
        let section = MediaSection::offer(OfferMediaSectionOpts {
            ice_parameters: self.ice_parameters.as_ref(),
            ice_candidates: &self.ice_candidates,
            dtls_parameters: self.dtls_parameters.as_ref(),
            plain_rtp_parameters: self.plain_rtp_parameters.as_ref(),
            plan_b: self.plan_b,
            mid: "datachannel",
            kind: "application",
            stream_id: None,
            track_id: None,
            old_data_channel_spec,
            sctp_parameters: self.sctp_parameters.as_ref(),
            offer_rtp_parameters: None,
        })?;
        self.add_media_section(section);
        Ok(())
    }

    /// Serialize, bumping the origin session version first.
    pub fn sdp(&mut self) -> Result<String, RtcError> {
        if let Some(origin) = self.session.record_mut("origin") {
            let version = origin
                .get("sessionVersion")
                .and_then(|v| v.as_i64())
                .unwrap_or(0);
            origin.insert("sessionVersion".into(), (version + 1).into());
        }

        let session = SdpSession {
            fields: self.session.clone(),
            media: self.sections.iter().map(|s| s.media().clone()).collect(),
        };

        Ok(super::grammar::write(&session)?)
    }

    fn known_mid(&self, section: &MediaSection) -> bool {
        section
            .mid()
            .map(|mid| self.mid_to_index.contains_key(&mid))
            .unwrap_or(false)
    }

    fn index_of(&self, mid: &str) -> Result<usize, RtcError> {
        self.mid_to_index
            .get(mid)
            .copied()
            .ok_or_else(|| RtcError::NotFound(format!("no media section found with mid '{}'", mid)))
    }

    fn add_media_section(&mut self, section: MediaSection) {
        let mid = section.mid();
        if self.first_mid.is_none() {
            self.first_mid = mid.clone();
        }
        self.sections.push(section);
        if let Some(mid) = mid {
            self.mid_to_index.insert(mid, self.sections.len() - 1);
        }
        self.regenerate_bundle_mids();
    }

    fn replace_media_section(
        &mut self,
        section: MediaSection,
        reuse_mid: Option<&str>,
    ) -> Result<(), RtcError> {
        match reuse_mid {
            Some(reuse_mid) => {
                let idx = self.index_of(reuse_mid)?;
                let old_mid = self.sections[idx].mid();
                let new_mid = section.mid();
                self.sections[idx] = section;
                if let Some(old_mid) = old_mid {
                    self.mid_to_index.remove(&old_mid);
                }
                if let Some(new_mid) = new_mid {
                    self.mid_to_index.insert(new_mid, idx);
                }
                self.regenerate_bundle_mids();
            }
            None => {
                let mid = section.mid().ok_or_else(|| {
                    RtcError::NotFound("media section without mid".to_string())
                })?;
                let idx = self.index_of(&mid)?;
                self.sections[idx] = section;
            }
        }
        Ok(())
    }

    fn regenerate_bundle_mids(&mut self) {
        if self.dtls_parameters.is_none() {
            return;
        }
        let mids = self
            .sections
            .iter()
            .filter(|s| !s.closed())
            .filter_map(|s| s.mid())
            .collect::<Vec<_>>()
            .join(" ");
        if let Some(groups) = self.session.list_mut("groups").first_mut() {
            groups.insert("mids".into(), mids.into());
        }
    }
}
