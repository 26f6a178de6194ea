use sigrtc::rtp::MediaKind;
use sigrtc::{
    ConnectionState, ConsumerOptions, ConsumerEvent, Device, DtlsRole, ProducerOptions, RtcError,
    TransportEvent,
};

mod common;
use common::{
    init_log, opus_consumer_rtp_parameters, router_rtp_capabilities, transport_options,
    vp8_consumer_rtp_parameters, FakeEngineFactory, FakeSignaling,
};

#[test]
fn device_load_and_capabilities() -> Result<(), RtcError> {
    init_log();

    let mut device = Device::new(Box::new(FakeEngineFactory));
    assert!(!device.loaded());

    device.load(&router_rtp_capabilities())?;
    assert!(device.loaded());

    assert!(device.can_produce(MediaKind::Audio)?);
    assert!(device.can_produce(MediaKind::Video)?);

    // Consumer capabilities carry the router's payload types. H264 is not
    // in the engine's repertoire and must be gone.
    let pts: Vec<u8> = device
        .rtp_capabilities()?
        .codecs
        .iter()
        .filter_map(|c| c.preferred_payload_type)
        .collect();
    assert_eq!(pts, vec![100, 101, 102]);

    let sctp = device.sctp_capabilities()?;
    assert_eq!(sctp.num_streams.os, 1024);
    assert_eq!(sctp.num_streams.mis, 1024);

    // Loading twice is a no-op.
    device.load(&router_rtp_capabilities())?;

    Ok(())
}

#[test]
fn produce_audio_and_video() -> Result<(), RtcError> {
    init_log();

    let mut device = Device::new(Box::new(FakeEngineFactory));
    device.load(&router_rtp_capabilities())?;

    let mut transport = device.create_send_transport(transport_options("send-1"))?;
    let (signaling, log) = FakeSignaling::new();
    transport.register_signaling(Box::new(signaling));

    let audio_id = transport.produce(ProducerOptions::new(MediaKind::Audio, "mic"))?;

    // The first produce runs the DTLS exchange, then announces the
    // producer, then the engine connects.
    let event = transport.poll_event().unwrap();
    let TransportEvent::Connect { dtls_parameters } = event else {
        panic!("expected Connect, got {:?}", event);
    };
    assert_eq!(dtls_parameters.role, DtlsRole::Server);
    assert!(!dtls_parameters.fingerprints.is_empty());

    assert_eq!(
        transport.poll_event(),
        Some(TransportEvent::NewProducer {
            id: audio_id.clone()
        })
    );
    assert_eq!(
        transport.poll_event(),
        Some(TransportEvent::ConnectionStateChange {
            state: ConnectionState::Connecting
        })
    );
    assert_eq!(
        transport.poll_event(),
        Some(TransportEvent::ConnectionStateChange {
            state: ConnectionState::Connected
        })
    );
    assert_eq!(transport.poll_event(), None);
    assert_eq!(transport.connection_state(), ConnectionState::Connected);

    let producer = transport.producer(&audio_id).unwrap();
    assert_eq!(producer.kind(), MediaKind::Audio);
    assert_eq!(producer.track(), Some("mic"));

    let params = producer.rtp_parameters();
    assert_eq!(params.mid.as_deref(), Some("0"));
    assert_eq!(params.codecs.len(), 1);
    assert_eq!(params.codecs[0].payload_type, 111);
    assert!(params.rtcp.as_ref().unwrap().cname.is_some());

    {
        let log = log.borrow();
        assert_eq!(log.connect_calls.len(), 1);
        assert_eq!(log.produce_calls.len(), 1);
        assert_eq!(log.produce_calls[0].0, MediaKind::Audio);
    }

    // A second producer reuses the established transport.
    let video_id = transport.produce(ProducerOptions::new(MediaKind::Video, "camera"))?;

    assert_eq!(
        transport.poll_event(),
        Some(TransportEvent::NewProducer {
            id: video_id.clone()
        })
    );
    assert_eq!(transport.poll_event(), None);

    let producer = transport.producer(&video_id).unwrap();
    let params = producer.rtp_parameters();
    assert_eq!(params.mid.as_deref(), Some("1"));
    assert_eq!(params.codecs.len(), 2);
    assert_eq!(params.codecs[0].payload_type, 96);
    assert_eq!(params.codecs[1].mime_type, "video/rtx");
    assert_eq!(params.encodings.len(), 1);
    assert!(params.encodings[0].ssrc.is_some());
    assert!(params.encodings[0].rtx.is_some());

    assert_eq!(log.borrow().connect_calls.len(), 1);

    Ok(())
}

#[test]
fn consume_media() -> Result<(), RtcError> {
    init_log();

    let mut device = Device::new(Box::new(FakeEngineFactory));
    device.load(&router_rtp_capabilities())?;

    let mut transport = device.create_recv_transport(transport_options("recv-1"))?;
    let (signaling, log) = FakeSignaling::new();
    transport.register_signaling(Box::new(signaling));

    let video_id = transport.consume(ConsumerOptions {
        id: "consumer-v1".to_string(),
        producer_id: "producer-remote-1".to_string(),
        kind: MediaKind::Video,
        rtp_parameters: vp8_consumer_rtp_parameters("0"),
    })?;
    assert_eq!(video_id, "consumer-v1");

    let event = transport.poll_event().unwrap();
    let TransportEvent::Connect { dtls_parameters } = event else {
        panic!("expected Connect, got {:?}", event);
    };
    assert_eq!(dtls_parameters.role, DtlsRole::Client);

    assert_eq!(
        transport.poll_event(),
        Some(TransportEvent::NewConsumer {
            id: video_id.clone()
        })
    );
    assert_eq!(
        transport.poll_event(),
        Some(TransportEvent::ConnectionStateChange {
            state: ConnectionState::Connecting
        })
    );
    assert_eq!(
        transport.poll_event(),
        Some(TransportEvent::ConnectionStateChange {
            state: ConnectionState::Connected
        })
    );

    let consumer = transport.consumer(&video_id).unwrap();
    assert_eq!(consumer.kind(), MediaKind::Video);
    assert_eq!(consumer.local_id(), "0");
    assert_eq!(consumer.producer_id(), "producer-remote-1");

    assert_eq!(log.borrow().connect_calls.len(), 1);

    // An audio consumer on the same transport.
    let audio_id = transport.consume(ConsumerOptions {
        id: "consumer-a1".to_string(),
        producer_id: "producer-remote-2".to_string(),
        kind: MediaKind::Audio,
        rtp_parameters: opus_consumer_rtp_parameters("1"),
    })?;

    assert_eq!(
        transport.poll_event(),
        Some(TransportEvent::NewConsumer {
            id: audio_id.clone()
        })
    );
    assert_eq!(transport.consumer(&audio_id).unwrap().local_id(), "1");

    // Closing releases the media section; a second close is a no-op.
    transport.close_consumer(&video_id)?;
    let consumer = transport.consumer_mut(&video_id).unwrap();
    assert!(consumer.closed());
    assert_eq!(consumer.poll_event(), Some(ConsumerEvent::Close));
    transport.close_consumer(&video_id)?;

    Ok(())
}

#[test]
fn replace_track_and_close() -> Result<(), RtcError> {
    init_log();

    let mut device = Device::new(Box::new(FakeEngineFactory));
    device.load(&router_rtp_capabilities())?;

    let mut transport = device.create_send_transport(transport_options("send-2"))?;
    let (signaling, _log) = FakeSignaling::new();
    transport.register_signaling(Box::new(signaling));

    let id = transport.produce(ProducerOptions::new(MediaKind::Video, "camera"))?;

    transport.replace_producer_track(&id, Some("camera-back"))?;
    assert_eq!(transport.producer(&id).unwrap().track(), Some("camera-back"));

    transport.replace_producer_track(&id, None)?;
    assert_eq!(transport.producer(&id).unwrap().track(), None);

    transport.close();
    assert!(transport.closed());
    assert!(transport.producer(&id).unwrap().closed());

    // Close is idempotent and everything afterwards refuses to run.
    transport.close();
    let err = transport
        .produce(ProducerOptions::new(MediaKind::Audio, "mic"))
        .unwrap_err();
    assert!(matches!(err, RtcError::InvalidState(_)));
    assert!(matches!(transport.get_stats(), Err(RtcError::InvalidState(_))));

    let mut events = vec![];
    while let Some(event) = transport.poll_event() {
        events.push(event);
    }
    assert!(events.contains(&TransportEvent::Close));
    assert_eq!(transport.connection_state(), ConnectionState::Closed);

    Ok(())
}

#[test]
fn transport_stats() -> Result<(), RtcError> {
    init_log();

    let mut device = Device::new(Box::new(FakeEngineFactory));
    device.load(&router_rtp_capabilities())?;

    let mut transport = device.create_send_transport(transport_options("send-3"))?;
    let stats = transport.get_stats()?;
    assert!(stats.contains("bytesSent"));

    Ok(())
}
