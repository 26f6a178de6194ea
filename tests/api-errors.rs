use sigrtc::rtp::MediaKind;
use sigrtc::{
    ConsumerOptions, DataProducerOptions, Device, ProducerOptions, RtcError, TransportEvent,
};

mod common;
use common::{
    init_log, router_rtp_capabilities, transport_options, vp8_consumer_rtp_parameters,
    FakeEngineFactory, FakeSignaling,
};

#[test]
fn unloaded_device_rejects_queries() {
    init_log();

    let mut device = Device::new(Box::new(FakeEngineFactory));

    assert!(matches!(
        device.rtp_capabilities(),
        Err(RtcError::InvalidState(_))
    ));
    assert!(matches!(
        device.sctp_capabilities(),
        Err(RtcError::InvalidState(_))
    ));
    assert!(matches!(
        device.can_produce(MediaKind::Audio),
        Err(RtcError::InvalidState(_))
    ));
    assert!(matches!(
        device.create_send_transport(transport_options("send-1")),
        Err(RtcError::InvalidState(_))
    ));
}

#[test]
fn direction_is_enforced() -> Result<(), RtcError> {
    init_log();

    let mut device = Device::new(Box::new(FakeEngineFactory));
    device.load(&router_rtp_capabilities())?;

    let mut recv = device.create_recv_transport(transport_options("recv-1"))?;
    let (signaling, _log) = FakeSignaling::new();
    recv.register_signaling(Box::new(signaling));

    let err = recv
        .produce(ProducerOptions::new(MediaKind::Audio, "mic"))
        .unwrap_err();
    assert!(matches!(err, RtcError::Unsupported(_)));
    let err = recv
        .produce_data(DataProducerOptions::default())
        .unwrap_err();
    assert!(matches!(err, RtcError::Unsupported(_)));

    let mut send = device.create_send_transport(transport_options("send-1"))?;
    let (signaling, _log) = FakeSignaling::new();
    send.register_signaling(Box::new(signaling));

    let err = send
        .consume(ConsumerOptions {
            id: "consumer-1".to_string(),
            producer_id: "producer-1".to_string(),
            kind: MediaKind::Video,
            rtp_parameters: vp8_consumer_rtp_parameters("0"),
        })
        .unwrap_err();
    assert!(matches!(err, RtcError::Unsupported(_)));

    Ok(())
}

#[test]
fn produce_needs_signaling() -> Result<(), RtcError> {
    init_log();

    let mut device = Device::new(Box::new(FakeEngineFactory));
    device.load(&router_rtp_capabilities())?;

    let mut transport = device.create_send_transport(transport_options("send-1"))?;
    let err = transport
        .produce(ProducerOptions::new(MediaKind::Audio, "mic"))
        .unwrap_err();
    assert!(matches!(err, RtcError::InvalidState(_)));

    Ok(())
}

#[test]
fn codec_restriction_must_match_kind() -> Result<(), RtcError> {
    init_log();

    let mut device = Device::new(Box::new(FakeEngineFactory));
    device.load(&router_rtp_capabilities())?;

    let mut transport = device.create_send_transport(transport_options("send-1"))?;
    let (signaling, _log) = FakeSignaling::new();
    transport.register_signaling(Box::new(signaling));

    let vp8 = router_rtp_capabilities()
        .codecs
        .iter()
        .find(|c| c.mime_type == "video/VP8")
        .cloned()
        .unwrap();

    let err = transport
        .produce(ProducerOptions {
            codec: Some(vp8),
            ..ProducerOptions::new(MediaKind::Audio, "mic")
        })
        .unwrap_err();
    assert!(matches!(err, RtcError::Unsupported(_)));

    Ok(())
}

#[test]
fn unconsumable_parameters_are_rejected() -> Result<(), RtcError> {
    init_log();

    let mut device = Device::new(Box::new(FakeEngineFactory));
    device.load(&router_rtp_capabilities())?;

    let mut transport = device.create_recv_transport(transport_options("recv-1"))?;
    let (signaling, _log) = FakeSignaling::new();
    transport.register_signaling(Box::new(signaling));

    // A payload type the negotiated capabilities do not know.
    let mut unknown = vp8_consumer_rtp_parameters("0");
    unknown.codecs[0].payload_type = 119;
    let err = transport
        .consume(ConsumerOptions {
            id: "consumer-1".to_string(),
            producer_id: "producer-1".to_string(),
            kind: MediaKind::Video,
            rtp_parameters: unknown,
        })
        .unwrap_err();
    assert!(matches!(err, RtcError::Unsupported(_)));

    // Duplicated payload types fail validation.
    let mut duplicated = vp8_consumer_rtp_parameters("0");
    duplicated.codecs[1].payload_type = duplicated.codecs[0].payload_type;
    let err = transport
        .consume(ConsumerOptions {
            id: "consumer-1".to_string(),
            producer_id: "producer-1".to_string(),
            kind: MediaKind::Video,
            rtp_parameters: duplicated,
        })
        .unwrap_err();
    assert!(matches!(err, RtcError::Unsupported(_)));

    Ok(())
}

#[test]
fn failed_produce_leaves_no_producer_behind() -> Result<(), RtcError> {
    init_log();

    let mut device = Device::new(Box::new(FakeEngineFactory));
    device.load(&router_rtp_capabilities())?;

    let mut transport = device.create_send_transport(transport_options("send-1"))?;
    let (signaling, log) = FakeSignaling::new();
    transport.register_signaling(Box::new(signaling));

    log.borrow_mut().fail_next_produce = true;
    let err = transport
        .produce(ProducerOptions::new(MediaKind::Audio, "mic"))
        .unwrap_err();
    assert!(matches!(err, RtcError::InvalidState(_)));

    // The DTLS exchange already ran, but no producer was registered.
    let mut events = vec![];
    while let Some(event) = transport.poll_event() {
        events.push(event);
    }
    assert!(events
        .iter()
        .any(|e| matches!(e, TransportEvent::Connect { .. })));
    assert!(!events
        .iter()
        .any(|e| matches!(e, TransportEvent::NewProducer { .. })));

    // The transport stays usable.
    let id = transport.produce(ProducerOptions::new(MediaKind::Audio, "mic"))?;
    assert_eq!(
        transport.poll_event(),
        Some(TransportEvent::NewProducer { id })
    );
    assert_eq!(log.borrow().produce_calls.len(), 1);

    Ok(())
}

#[test]
fn unknown_ids_are_not_found() -> Result<(), RtcError> {
    init_log();

    let mut device = Device::new(Box::new(FakeEngineFactory));
    device.load(&router_rtp_capabilities())?;

    let mut transport = device.create_send_transport(transport_options("send-1"))?;

    assert!(matches!(
        transport.close_producer("nope"),
        Err(RtcError::NotFound(_))
    ));
    assert!(matches!(
        transport.replace_producer_track("nope", None),
        Err(RtcError::NotFound(_))
    ));
    assert!(transport.producer("nope").is_none());

    Ok(())
}
