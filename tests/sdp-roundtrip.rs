use sigrtc::sdp::{parse, parse_params, write, write_params, Value};

mod common;
use common::init_log;

const OFFER: &str = "v=0\r\n\
    o=- 98765432109876543210 2 IN IP4 127.0.0.1\r\n\
    s=-\r\n\
    t=0 0\r\n\
    a=group:BUNDLE 0 1\r\n\
    a=extmap-allow-mixed\r\n\
    a=msid-semantic: WMS stream0\r\n\
    m=audio 54400 UDP/TLS/RTP/SAVPF 111 103\r\n\
    c=IN IP4 203.0.113.1\r\n\
    a=rtcp:9 IN IP4 0.0.0.0\r\n\
    a=candidate:1467250027 1 udp 2122260223 192.168.0.196 46243 typ host generation 0\r\n\
    a=candidate:1853887674 1 udp 1518280447 47.61.61.61 36768 typ srflx raddr 192.168.0.196 rport 36768 generation 0\r\n\
    a=ice-ufrag:F7gI\r\n\
    a=ice-pwd:x9cml/YzichV2+XlhiMu8g\r\n\
    a=fingerprint:sha-256 D2:FA:0E:C3:22:59:5E:14:95:69:92:3D:13:B4:84:24\r\n\
    a=setup:actpass\r\n\
    a=mid:0\r\n\
    a=extmap:1 urn:ietf:params:rtp-hdrext:ssrc-audio-level\r\n\
    a=extmap:2/recvonly urn:ietf:params:rtp-hdrext:csrc-audio-level\r\n\
    a=sendonly\r\n\
    a=msid:stream0 track0\r\n\
    a=rtcp-mux\r\n\
    a=rtpmap:111 opus/48000/2\r\n\
    a=rtcp-fb:111 transport-cc\r\n\
    a=fmtp:111 minptime=10;useinbandfec=1\r\n\
    a=rtpmap:103 ISAC/16000\r\n\
    a=ssrc:2566107569 cname:t9YU8M1UxTF8Y1A1\r\n\
    a=ssrc:2566107569 msid:stream0 track0\r\n\
    m=video 9 UDP/TLS/RTP/SAVPF 96 97\r\n\
    c=IN IP4 0.0.0.0\r\n\
    a=ice-ufrag:F7gI\r\n\
    a=ice-pwd:x9cml/YzichV2+XlhiMu8g\r\n\
    a=setup:actpass\r\n\
    a=mid:1\r\n\
    a=sendonly\r\n\
    a=rtcp-mux\r\n\
    a=rtcp-rsize\r\n\
    a=rtpmap:96 VP8/90000\r\n\
    a=rtcp-fb:96 nack\r\n\
    a=rtcp-fb:96 nack pli\r\n\
    a=rtcp-fb:96 goog-remb\r\n\
    a=rtpmap:97 rtx/90000\r\n\
    a=fmtp:97 apt=96\r\n\
    a=ssrc-group:FID 3004364195 1080772241\r\n\
    a=ssrc:3004364195 cname:t9YU8M1UxTF8Y1A1\r\n\
    a=ssrc:1080772241 cname:t9YU8M1UxTF8Y1A1\r\n";

#[test]
fn parse_browser_offer() {
    init_log();

    let session = parse(OFFER);

    let origin = session.fields.record("origin").unwrap();
    assert_eq!(origin.get("username"), Some(&Value::Str("-".into())));
    // Session ids can overflow i64 and must stay strings then.
    assert_eq!(
        origin.get("sessionId"),
        Some(&Value::Str("98765432109876543210".into()))
    );

    let groups = session.fields.list("groups").unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].get("type"), Some(&Value::Str("BUNDLE".into())));
    assert_eq!(groups[0].get("mids"), Some(&Value::Str("0 1".into())));

    assert!(session.fields.contains("extmapAllowMixed"));

    assert_eq!(session.media.len(), 2);

    let audio = &session.media[0];
    assert_eq!(audio.typ().as_deref(), Some("audio"));
    assert_eq!(audio.port(), Some(54400));
    assert_eq!(audio.mid().as_deref(), Some("0"));
    assert_eq!(audio.fields.str_of("direction").as_deref(), Some("sendonly"));
    assert_eq!(audio.fields.str_of("payloads").as_deref(), Some("111 103"));

    let rtp = audio.fields.list("rtp").unwrap();
    assert_eq!(rtp.len(), 2);
    assert_eq!(rtp[0].get("payload"), Some(&Value::Int(111)));
    assert_eq!(rtp[0].get("codec"), Some(&Value::Str("opus".into())));
    assert_eq!(rtp[0].get("rate"), Some(&Value::Int(48000)));
    assert_eq!(rtp[0].get("encoding"), Some(&Value::Int(2)));
    // ISAC has no encoding component.
    assert_eq!(rtp[1].get("codec"), Some(&Value::Str("ISAC".into())));
    assert_eq!(rtp[1].get("encoding"), None);

    let fmtp = audio.fields.list("fmtp").unwrap();
    assert_eq!(fmtp[0].get("payload"), Some(&Value::Int(111)));
    assert_eq!(
        fmtp[0].get("config"),
        Some(&Value::Str("minptime=10;useinbandfec=1".into()))
    );

    let candidates = audio.fields.list("candidates").unwrap();
    assert_eq!(candidates.len(), 2);
    assert_eq!(candidates[0].get("type"), Some(&Value::Str("host".into())));
    assert_eq!(candidates[1].get("type"), Some(&Value::Str("srflx".into())));
    assert_eq!(
        candidates[1].get("raddr"),
        Some(&Value::Str("192.168.0.196".into()))
    );
    assert_eq!(candidates[1].get("rport"), Some(&Value::Int(36768)));

    let ext = audio.fields.list("ext").unwrap();
    assert_eq!(ext.len(), 2);
    assert_eq!(ext[0].get("value"), Some(&Value::Int(1)));
    assert_eq!(ext[0].get("direction"), None);
    assert_eq!(ext[1].get("direction"), Some(&Value::Str("recvonly".into())));

    let video = &session.media[1];
    let fb = video.fields.list("rtcpFb").unwrap();
    assert_eq!(fb.len(), 3);
    assert_eq!(fb[1].get("type"), Some(&Value::Str("nack".into())));
    assert_eq!(fb[1].get("subtype"), Some(&Value::Str("pli".into())));
    assert_eq!(fb[2].get("subtype"), None);

    let groups = video.fields.list("ssrcGroups").unwrap();
    assert_eq!(groups[0].get("semantics"), Some(&Value::Str("FID".into())));
    assert_eq!(
        groups[0].get("ssrcs"),
        Some(&Value::Str("3004364195 1080772241".into()))
    );
}

#[test]
fn write_is_stable() {
    init_log();

    let session = parse(OFFER);
    let text = write(&session).unwrap();
    let reparsed = parse(&text);

    assert_eq!(session, reparsed);
}

#[test]
fn unknown_attribute_survives() {
    init_log();

    let sdp = "v=0\r\n\
        o=- 1 1 IN IP4 127.0.0.1\r\n\
        s=-\r\n\
        t=0 0\r\n\
        m=audio 9 UDP/TLS/RTP/SAVPF 111\r\n\
        a=mid:0\r\n\
        a=some-vendor-thing:on 42\r\n\
        a=rtpmap:111 opus/48000/2\r\n";

    let session = parse(sdp);
    let invalid = session.media[0].fields.list("invalid").unwrap();
    assert_eq!(
        invalid[0].get("value"),
        Some(&Value::Str("some-vendor-thing:on 42".into()))
    );

    let text = write(&session).unwrap();
    assert!(text.contains("a=some-vendor-thing:on 42\r\n"));
}

#[test]
fn write_fills_version_and_name() {
    init_log();

    let sdp = "o=- 1 1 IN IP4 127.0.0.1\r\nt=0 0\r\n";
    let session = parse(sdp);
    let text = write(&session).unwrap();

    assert!(text.starts_with("v=0\r\n"));
    assert!(text.contains("\r\ns= \r\n"));
}

#[test]
fn fmtp_config_params() {
    init_log();

    let params = parse_params("level-asymmetry-allowed=1;packetization-mode=0;profile-level-id=42e01f");
    assert_eq!(params.get("level-asymmetry-allowed"), Some(&Value::Int(1)));
    assert_eq!(params.get("packetization-mode"), Some(&Value::Int(0)));
    assert_eq!(
        params.get("profile-level-id"),
        Some(&Value::Str("42e01f".into()))
    );

    let text = write_params(&params);
    let back = parse_params(&text);
    assert_eq!(params, back);

    // Bare keys keep an empty value and render without '='.
    let params = parse_params("stereo;sprop-stereo=1");
    assert_eq!(params.get("stereo"), Some(&Value::Str(String::new())));
    assert!(write_params(&params).contains("stereo"));
}
