//! Producer handle: a local track being sent to the server.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::rtp::{MediaKind, Parameters, RtpCodecParameters, RtpParameters};
use crate::RtcError;

/// Per-codec tweaks applied while answering the send offer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProducerCodecOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opus_stereo: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opus_fec: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opus_dtx: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opus_max_playback_rate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opus_max_average_bitrate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opus_ptime: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_google_start_bitrate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_google_max_bitrate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_google_min_bitrate: Option<u32>,
}

impl ProducerCodecOptions {
    /// Fold the options into the answer fmtp of `codec`, reflecting the
    /// opus options the remote encoder must know about back into the offer
    /// codec as well.
    pub(crate) fn apply(
        &self,
        codec: &RtpCodecParameters,
        offer_codec: &mut RtpCodecParameters,
        answer_params: &mut Parameters,
    ) {
        let mime = codec.mime_type.to_lowercase();

        if mime == "audio/opus" {
            if let Some(stereo) = self.opus_stereo {
                let v = i64::from(stereo);
                offer_codec.parameters.insert("sprop-stereo".into(), v.into());
                answer_params.insert("stereo".into(), v.into());
            }
            if let Some(fec) = self.opus_fec {
                let v = i64::from(fec);
                offer_codec.parameters.insert("useinbandfec".into(), v.into());
                answer_params.insert("useinbandfec".into(), v.into());
            }
            if let Some(dtx) = self.opus_dtx {
                let v = i64::from(dtx);
                offer_codec.parameters.insert("usedtx".into(), v.into());
                answer_params.insert("usedtx".into(), v.into());
            }
            if let Some(rate) = self.opus_max_playback_rate {
                answer_params.insert("maxplaybackrate".into(), i64::from(rate).into());
            }
            if let Some(bitrate) = self.opus_max_average_bitrate {
                answer_params.insert("maxaveragebitrate".into(), i64::from(bitrate).into());
            }
            if let Some(ptime) = self.opus_ptime {
                let v = i64::from(ptime);
                offer_codec.parameters.insert("ptime".into(), v.into());
                answer_params.insert("ptime".into(), v.into());
            }
        } else if matches!(
            mime.as_str(),
            "video/vp8" | "video/vp9" | "video/h264" | "video/h265"
        ) {
            if let Some(bitrate) = self.video_google_start_bitrate {
                answer_params.insert("x-google-start-bitrate".into(), i64::from(bitrate).into());
            }
            if let Some(bitrate) = self.video_google_max_bitrate {
                answer_params.insert("x-google-max-bitrate".into(), i64::from(bitrate).into());
            }
            if let Some(bitrate) = self.video_google_min_bitrate {
                answer_params.insert("x-google-min-bitrate".into(), i64::from(bitrate).into());
            }
        }
    }
}

/// Observer events of one producer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProducerEvent {
    /// Sending paused.
    Pause,
    /// Sending resumed.
    Resume,
    /// The producer closed, locally or because its transport closed.
    Close,
}

/// A stream of media sent to the server.
///
/// Created by [`crate::Transport::produce`]. Operations that need the
/// native engine or the signaling channel (closing, replacing the track,
/// capping the spatial layer) go through the owning transport.
pub struct Producer {
    id: String,
    local_id: String,
    kind: MediaKind,
    track: Option<String>,
    rtp_parameters: RtpParameters,
    paused: bool,
    max_spatial_layer: Option<u8>,
    closed: bool,
    events: VecDeque<ProducerEvent>,
}

impl Producer {
    pub(crate) fn new(
        id: String,
        local_id: String,
        kind: MediaKind,
        track: Option<String>,
        rtp_parameters: RtpParameters,
    ) -> Producer {
        Producer {
            id,
            local_id,
            kind,
            track,
            rtp_parameters,
            paused: false,
            max_spatial_layer: None,
            closed: false,
            events: VecDeque::new(),
        }
    }

    /// Server side producer id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Engine side identifier (the mid of the sending transceiver).
    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// The sent track, if any.
    pub fn track(&self) -> Option<&str> {
        self.track.as_deref()
    }

    pub fn rtp_parameters(&self) -> &RtpParameters {
        &self.rtp_parameters
    }

    pub fn paused(&self) -> bool {
        self.paused
    }

    pub fn closed(&self) -> bool {
        self.closed
    }

    /// The highest spatial layer being sent, when capped.
    pub fn max_spatial_layer(&self) -> Option<u8> {
        self.max_spatial_layer
    }

    /// Next observer event, if any.
    pub fn poll_event(&mut self) -> Option<ProducerEvent> {
        self.events.pop_front()
    }

    /// Pause sending. No-op when closed.
    pub fn pause(&mut self) {
        debug!("Producer pause()");
        if self.closed || self.paused {
            return;
        }
        self.paused = true;
        self.events.push_back(ProducerEvent::Pause);
    }

    /// Resume sending. No-op when closed.
    pub fn resume(&mut self) {
        debug!("Producer resume()");
        if self.closed || !self.paused {
            return;
        }
        self.paused = false;
        self.events.push_back(ProducerEvent::Resume);
    }

    pub(crate) fn set_max_spatial_layer(&mut self, layer: u8) -> Result<(), RtcError> {
        if self.closed {
            return Err(RtcError::InvalidState("closed".to_string()));
        }
        if self.kind != MediaKind::Video {
            return Err(RtcError::Unsupported("not a video Producer".to_string()));
        }
        self.max_spatial_layer = Some(layer);
        Ok(())
    }

    pub(crate) fn set_track(&mut self, track: Option<String>) {
        self.track = track;
    }

    pub(crate) fn close(&mut self) {
        if self.closed {
            return;
        }
        debug!("Producer close()");
        self.closed = true;
        self.events.push_back(ProducerEvent::Close);
    }

    pub(crate) fn transport_closed(&mut self) {
        if self.closed {
            return;
        }
        debug!("Producer transport_closed()");
        self.closed = true;
        self.events.push_back(ProducerEvent::Close);
    }
}
