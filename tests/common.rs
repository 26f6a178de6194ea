#![allow(unused)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Once;

use sigrtc::rtp::{Direction, MediaKind, RtpCapabilities, RtpParameters};
use sigrtc::sctp::{SctpParameters, SctpStreamParameters};
use sigrtc::sdp::{self, Record, SdpSession};
use sigrtc::{
    ConnectionState, DtlsFingerprint, DtlsParameters, DtlsRole, IceCandidate, IceCandidateType,
    IceParameters, IceProtocol, NativeEngine, NativeEngineFactory, RtcError, SdpType,
    SignalingChannel, TransportOptions,
};

pub fn init_log() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    static START: Once = Once::new();

    START.call_once(|| {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(env_filter)
            .init();
    });
}

const TWCC_URI: &str = "http://www.ietf.org/id/draft-holmer-rmcat-transport-wide-cc-extensions-01";
const ABS_SEND_TIME_URI: &str = "http://www.webrtc.org/experiments/rtp-hdrext/abs-send-time";
const MID_URI: &str = "urn:ietf:params:rtp-hdrext:sdes:mid";
const AUDIO_LEVEL_URI: &str = "urn:ietf:params:rtp-hdrext:ssrc-audio-level";
const VIDEO_ORIENTATION_URI: &str = "urn:3gpp:video-orientation";

fn random_token(len: usize) -> String {
    (0..len).map(|_| fastrand::alphanumeric()).collect()
}

fn random_fingerprint() -> String {
    (0..32)
        .map(|_| format!("{:02X}", fastrand::u8(..)))
        .collect::<Vec<_>>()
        .join(":")
}

struct FakeTransceiver {
    kind: MediaKind,
    mid: String,
    direction: Direction,
    ssrc: u32,
    rtx_ssrc: Option<u32>,
    cname: String,
    track: Option<String>,
}

/// In-memory engine producing browser-shaped SDP. Offers opus and VP8/RTX
/// with a handful of header extensions; answers echo whatever the remote
/// description offered.
pub struct FakeEngine {
    ufrag: String,
    pwd: String,
    fingerprint: String,
    transceivers: Vec<FakeTransceiver>,
    data_mid: Option<String>,
    next_mid: u32,
    local: Option<String>,
    remote: Option<String>,
    states: VecDeque<ConnectionState>,
    announced: bool,
    closed: bool,
}

impl FakeEngine {
    pub fn new() -> FakeEngine {
        FakeEngine {
            ufrag: random_token(4),
            pwd: random_token(22),
            fingerprint: random_fingerprint(),
            transceivers: vec![],
            data_mid: None,
            next_mid: 0,
            local: None,
            remote: None,
            states: VecDeque::new(),
            announced: false,
            closed: false,
        }
    }

    fn direction_attr(direction: Direction) -> &'static str {
        match direction {
            Direction::SendRecv => "sendrecv",
            Direction::SendOnly => "sendonly",
            Direction::RecvOnly => "recvonly",
            Direction::Inactive => "inactive",
        }
    }

    fn media_section(&self, t: &FakeTransceiver) -> String {
        let mut out = String::new();

        let payloads = match t.kind {
            MediaKind::Audio => "111",
            MediaKind::Video => "96 97",
        };
        out.push_str(&format!("m={} 9 UDP/TLS/RTP/SAVPF {}\r\n", t.kind, payloads));
        out.push_str("c=IN IP4 0.0.0.0\r\n");
        out.push_str(&format!("a=mid:{}\r\n", t.mid));
        out.push_str(&format!("a={}\r\n", Self::direction_attr(t.direction)));
        out.push_str(&format!("a=ice-ufrag:{}\r\n", self.ufrag));
        out.push_str(&format!("a=ice-pwd:{}\r\n", self.pwd));
        out.push_str("a=setup:actpass\r\n");
        out.push_str("a=rtcp-mux\r\n");
        out.push_str("a=rtcp-rsize\r\n");

        match t.kind {
            MediaKind::Audio => {
                out.push_str("a=rtpmap:111 opus/48000/2\r\n");
                out.push_str("a=fmtp:111 minptime=10;useinbandfec=1\r\n");
                out.push_str("a=rtcp-fb:111 transport-cc\r\n");
                out.push_str(&format!("a=extmap:1 {}\r\n", MID_URI));
                out.push_str(&format!("a=extmap:2 {}\r\n", ABS_SEND_TIME_URI));
                out.push_str(&format!("a=extmap:3 {}\r\n", TWCC_URI));
                out.push_str(&format!("a=extmap:10 {}\r\n", AUDIO_LEVEL_URI));
            }
            MediaKind::Video => {
                out.push_str("a=rtpmap:96 VP8/90000\r\n");
                out.push_str("a=rtpmap:97 rtx/90000\r\n");
                out.push_str("a=fmtp:97 apt=96\r\n");
                out.push_str("a=rtcp-fb:96 nack\r\n");
                out.push_str("a=rtcp-fb:96 nack pli\r\n");
                out.push_str("a=rtcp-fb:96 goog-remb\r\n");
                out.push_str("a=rtcp-fb:96 transport-cc\r\n");
                out.push_str(&format!("a=extmap:1 {}\r\n", MID_URI));
                out.push_str(&format!("a=extmap:2 {}\r\n", ABS_SEND_TIME_URI));
                out.push_str(&format!("a=extmap:3 {}\r\n", TWCC_URI));
                out.push_str(&format!("a=extmap:13 {}\r\n", VIDEO_ORIENTATION_URI));
            }
        }

        let track = t.track.as_deref().unwrap_or("-");
        out.push_str(&format!("a=ssrc:{} cname:{}\r\n", t.ssrc, t.cname));
        out.push_str(&format!("a=ssrc:{} msid:- {}\r\n", t.ssrc, track));
        if let Some(rtx) = t.rtx_ssrc {
            out.push_str(&format!("a=ssrc:{} cname:{}\r\n", rtx, t.cname));
            out.push_str(&format!("a=ssrc:{} msid:- {}\r\n", rtx, track));
            out.push_str(&format!("a=ssrc-group:FID {} {}\r\n", t.ssrc, rtx));
        }

        out
    }

    fn application_section(&self, mid: &str) -> String {
        let mut out = String::new();
        out.push_str("m=application 9 UDP/DTLS/SCTP webrtc-datachannel\r\n");
        out.push_str("c=IN IP4 0.0.0.0\r\n");
        out.push_str(&format!("a=mid:{}\r\n", mid));
        out.push_str(&format!("a=ice-ufrag:{}\r\n", self.ufrag));
        out.push_str(&format!("a=ice-pwd:{}\r\n", self.pwd));
        out.push_str("a=setup:actpass\r\n");
        out.push_str("a=sctp-port:5000\r\n");
        out.push_str("a=max-message-size:262144\r\n");
        out
    }

    fn negotiated(&mut self) {
        if self.announced {
            return;
        }
        self.announced = true;
        self.states.push_back(ConnectionState::Connecting);
        self.states.push_back(ConnectionState::Connected);
    }
}

impl NativeEngine for FakeEngine {
    fn create_offer(&mut self) -> Result<String, RtcError> {
        let mut sdp = String::new();
        sdp.push_str("v=0\r\n");
        sdp.push_str("o=- 8232084215 2 IN IP4 127.0.0.1\r\n");
        sdp.push_str("s=-\r\n");
        sdp.push_str("t=0 0\r\n");
        sdp.push_str(&format!("a=fingerprint:sha-256 {}\r\n", self.fingerprint));
        sdp.push_str("a=msid-semantic: WMS *\r\n");

        let mut mids: Vec<&str> = self.transceivers.iter().map(|t| t.mid.as_str()).collect();
        if let Some(mid) = &self.data_mid {
            mids.push(mid);
        }
        if !mids.is_empty() {
            sdp.push_str(&format!("a=group:BUNDLE {}\r\n", mids.join(" ")));
        }

        for t in &self.transceivers {
            sdp.push_str(&self.media_section(t));
        }
        if let Some(mid) = &self.data_mid {
            sdp.push_str(&self.application_section(mid));
        }

        Ok(sdp)
    }

    fn create_answer(&mut self) -> Result<String, RtcError> {
        let remote = self
            .remote
            .as_deref()
            .ok_or_else(|| RtcError::InvalidState("no remote description".to_string()))?;
        let remote = sdp::parse(remote);

        let mut answer = SdpSession::default();
        let mut fp = Record::new();
        fp.insert("type".into(), "sha-256".into());
        fp.insert("hash".into(), self.fingerprint.as_str().into());
        answer.fields.set_record("fingerprint", fp);

        for media in &remote.media {
            let mut media = media.clone();
            media.fields.set("iceUfrag", self.ufrag.as_str());
            media.fields.set("icePwd", self.pwd.as_str());
            media.fields.set("setup", "active");
            media.fields.remove("candidates");
            media.fields.remove("endOfCandidates");
            media.fields.remove("iceOptions");
            if media.typ().as_deref() != Some("application") && !media.closed() {
                media.fields.set("direction", "recvonly");
            }
            answer.media.push(media);
        }

        Ok(sdp::write(&answer)?)
    }

    fn set_local_description(&mut self, typ: SdpType, sdp: &str) -> Result<(), RtcError> {
        self.local = Some(sdp.to_string());
        if typ == SdpType::Answer {
            self.negotiated();
        }
        Ok(())
    }

    fn set_remote_description(&mut self, typ: SdpType, sdp: &str) -> Result<(), RtcError> {
        self.remote = Some(sdp.to_string());
        if typ == SdpType::Answer {
            self.negotiated();
        }
        Ok(())
    }

    fn local_description(&self) -> Option<String> {
        self.local.clone()
    }

    fn add_transceiver(
        &mut self,
        kind: MediaKind,
        direction: Direction,
        track: Option<&str>,
    ) -> Result<(), RtcError> {
        if self.closed {
            return Err(RtcError::InvalidState("engine closed".to_string()));
        }
        let ssrc = fastrand::u32(100_000_000..900_000_000);
        self.transceivers.push(FakeTransceiver {
            kind,
            mid: self.next_mid.to_string(),
            direction,
            ssrc,
            rtx_ssrc: (kind == MediaKind::Video).then(|| ssrc + 1),
            cname: random_token(16),
            track: track.map(|t| t.to_string()),
        });
        self.next_mid += 1;
        Ok(())
    }

    fn replace_track(&mut self, mid: &str, track: Option<&str>) -> Result<(), RtcError> {
        let t = self
            .transceivers
            .iter_mut()
            .find(|t| t.mid == mid)
            .ok_or_else(|| RtcError::NotFound(format!("no transceiver with mid '{}'", mid)))?;
        t.track = track.map(|t| t.to_string());
        Ok(())
    }

    fn create_data_channel(
        &mut self,
        _stream_id: u16,
        _label: &str,
        _ordered: bool,
        _max_packet_life_time: Option<u16>,
        _max_retransmits: Option<u16>,
        _protocol: &str,
    ) -> Result<(), RtcError> {
        if self.closed {
            return Err(RtcError::InvalidState("engine closed".to_string()));
        }
        if self.data_mid.is_none() {
            self.data_mid = Some(self.next_mid.to_string());
            self.next_mid += 1;
        }
        Ok(())
    }

    fn poll_connection_state(&mut self) -> Option<ConnectionState> {
        self.states.pop_front()
    }

    fn stats(&mut self) -> Result<String, RtcError> {
        Ok(r#"{"transport":{"bytesSent":0,"bytesReceived":0}}"#.to_string())
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.states.push_back(ConnectionState::Closed);
    }
}

pub struct FakeEngineFactory;

impl NativeEngineFactory for FakeEngineFactory {
    fn create_engine(&self) -> Box<dyn NativeEngine> {
        Box::new(FakeEngine::new())
    }
}

/// What the fake server saw, shared with the test body.
#[derive(Default)]
pub struct SignalingLog {
    pub connect_calls: Vec<DtlsParameters>,
    pub produce_calls: Vec<(MediaKind, RtpParameters)>,
    pub produce_data_calls: Vec<(SctpStreamParameters, String, String)>,
    pub fail_next_produce: bool,
    next_id: u32,
}

pub struct FakeSignaling {
    log: Rc<RefCell<SignalingLog>>,
}

impl FakeSignaling {
    pub fn new() -> (FakeSignaling, Rc<RefCell<SignalingLog>>) {
        let log = Rc::new(RefCell::new(SignalingLog::default()));
        (FakeSignaling { log: Rc::clone(&log) }, log)
    }
}

impl SignalingChannel for FakeSignaling {
    fn connect(&mut self, dtls_parameters: &DtlsParameters) -> Result<(), RtcError> {
        self.log
            .borrow_mut()
            .connect_calls
            .push(dtls_parameters.clone());
        Ok(())
    }

    fn produce(
        &mut self,
        kind: MediaKind,
        rtp_parameters: &RtpParameters,
    ) -> Result<String, RtcError> {
        let mut log = self.log.borrow_mut();
        if log.fail_next_produce {
            log.fail_next_produce = false;
            return Err(RtcError::InvalidState("signaling request failed".to_string()));
        }
        log.produce_calls.push((kind, rtp_parameters.clone()));
        log.next_id += 1;
        Ok(format!("producer-{}", log.next_id))
    }

    fn produce_data(
        &mut self,
        sctp_stream_parameters: &SctpStreamParameters,
        label: &str,
        protocol: &str,
    ) -> Result<String, RtcError> {
        let mut log = self.log.borrow_mut();
        log.produce_data_calls.push((
            sctp_stream_parameters.clone(),
            label.to_string(),
            protocol.to_string(),
        ));
        log.next_id += 1;
        Ok(format!("dataproducer-{}", log.next_id))
    }
}

/// Router capabilities as a server announces them over signaling.
pub fn router_rtp_capabilities() -> RtpCapabilities {
    serde_json::from_value(serde_json::json!({
        "codecs": [
            {
                "mimeType": "audio/opus",
                "kind": "audio",
                "preferredPayloadType": 100,
                "clockRate": 48000,
                "channels": 2,
                "parameters": { "useinbandfec": 1, "foo": "bar" },
                "rtcpFeedback": [ { "type": "transport-cc" } ]
            },
            {
                "mimeType": "video/VP8",
                "kind": "video",
                "preferredPayloadType": 101,
                "clockRate": 90000,
                "parameters": { "x-google-start-bitrate": 1500 },
                "rtcpFeedback": [
                    { "type": "nack" },
                    { "type": "nack", "parameter": "pli" },
                    { "type": "ccm", "parameter": "fir" },
                    { "type": "goog-remb" },
                    { "type": "transport-cc" }
                ]
            },
            {
                "mimeType": "video/rtx",
                "kind": "video",
                "preferredPayloadType": 102,
                "clockRate": 90000,
                "parameters": { "apt": 101 },
                "rtcpFeedback": []
            },
            {
                "mimeType": "video/H264",
                "kind": "video",
                "preferredPayloadType": 103,
                "clockRate": 90000,
                "parameters": {
                    "level-asymmetry-allowed": 1,
                    "packetization-mode": 1,
                    "profile-level-id": "42e01f"
                },
                "rtcpFeedback": [
                    { "type": "nack" },
                    { "type": "nack", "parameter": "pli" },
                    { "type": "ccm", "parameter": "fir" },
                    { "type": "goog-remb" },
                    { "type": "transport-cc" }
                ]
            },
            {
                "mimeType": "video/rtx",
                "kind": "video",
                "preferredPayloadType": 104,
                "clockRate": 90000,
                "parameters": { "apt": 103 },
                "rtcpFeedback": []
            }
        ],
        "headerExtensions": [
            { "kind": "audio", "uri": MID_URI, "preferredId": 1, "direction": "sendrecv" },
            { "kind": "video", "uri": MID_URI, "preferredId": 1, "direction": "sendrecv" },
            { "kind": "audio", "uri": ABS_SEND_TIME_URI, "preferredId": 4, "direction": "sendrecv" },
            { "kind": "video", "uri": ABS_SEND_TIME_URI, "preferredId": 4, "direction": "sendrecv" },
            { "kind": "audio", "uri": TWCC_URI, "preferredId": 5, "direction": "recvonly" },
            { "kind": "video", "uri": TWCC_URI, "preferredId": 5, "direction": "sendrecv" },
            { "kind": "audio", "uri": AUDIO_LEVEL_URI, "preferredId": 10, "direction": "sendrecv" },
            { "kind": "video", "uri": VIDEO_ORIENTATION_URI, "preferredId": 11, "direction": "sendrecv" }
        ]
    }))
    .unwrap()
}

/// Server assigned transport parameters.
pub fn transport_options(id: &str) -> TransportOptions {
    TransportOptions {
        id: id.to_string(),
        ice_parameters: IceParameters {
            username_fragment: "srvufrag".to_string(),
            password: "srvpassword".to_string(),
            ice_lite: true,
        },
        ice_candidates: vec![IceCandidate {
            foundation: "udpcandidate".to_string(),
            priority: 1_078_862_079,
            ip: "9.9.9.9".to_string(),
            protocol: IceProtocol::Udp,
            port: 40_000,
            typ: IceCandidateType::Host,
            tcp_type: None,
        }],
        dtls_parameters: DtlsParameters {
            role: DtlsRole::Auto,
            fingerprints: vec![DtlsFingerprint {
                algorithm: "sha-256".to_string(),
                value: random_fingerprint(),
            }],
        },
        sctp_parameters: Some(SctpParameters {
            port: 5000,
            os: 1024,
            mis: 1024,
            max_message_size: 262_144,
        }),
    }
}

/// RTP parameters of a server side VP8 consumer.
pub fn vp8_consumer_rtp_parameters(mid: &str) -> RtpParameters {
    serde_json::from_value(serde_json::json!({
        "mid": mid,
        "codecs": [
            {
                "mimeType": "video/VP8",
                "payloadType": 101,
                "clockRate": 90000,
                "parameters": {},
                "rtcpFeedback": [
                    { "type": "nack" },
                    { "type": "nack", "parameter": "pli" },
                    { "type": "transport-cc" }
                ]
            },
            {
                "mimeType": "video/rtx",
                "payloadType": 102,
                "clockRate": 90000,
                "parameters": { "apt": 101 },
                "rtcpFeedback": []
            }
        ],
        "headerExtensions": [
            { "uri": MID_URI, "id": 1 },
            { "uri": VIDEO_ORIENTATION_URI, "id": 11 }
        ],
        "encodings": [
            { "ssrc": 222_222_222u32, "rtx": { "ssrc": 222_222_223u32 } }
        ],
        "rtcp": { "cname": "videoconsumer", "reducedSize": true }
    }))
    .unwrap()
}

/// RTP parameters of a server side opus consumer.
pub fn opus_consumer_rtp_parameters(mid: &str) -> RtpParameters {
    serde_json::from_value(serde_json::json!({
        "mid": mid,
        "codecs": [
            {
                "mimeType": "audio/opus",
                "payloadType": 100,
                "clockRate": 48000,
                "channels": 2,
                "parameters": { "useinbandfec": 1, "sprop-stereo": 1 },
                "rtcpFeedback": [ { "type": "transport-cc" } ]
            }
        ],
        "headerExtensions": [
            { "uri": MID_URI, "id": 1 },
            { "uri": AUDIO_LEVEL_URI, "id": 10 }
        ],
        "encodings": [ { "ssrc": 111_111_111u32 } ],
        "rtcp": { "cname": "audioconsumer", "reducedSize": true }
    }))
    .unwrap()
}
