//! Transports: the send/recv pipelines connecting local media to a server.

use std::collections::{HashMap, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::consumer::Consumer;
use crate::data_consumer::DataConsumer;
use crate::data_producer::DataProducer;
use crate::handler::SdpHandler;
use crate::ortc::{can_receive, generate_probator_rtp_parameters};
use crate::producer::{Producer, ProducerCodecOptions};
use crate::rtp::{
    ExtendedRtpCapabilities, MediaKind, RtpCodecCapability, RtpEncodingParameters, RtpParameters,
};
use crate::sctp::{SctpParameters, SctpStreamParameters};
use crate::RtcError;

/// ICE parameters of the server side transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceParameters {
    /// ICE username fragment.
    pub username_fragment: String,
    /// ICE password.
    pub password: String,
    /// Whether the server is an ICE Lite endpoint.
    #[serde(default)]
    pub ice_lite: bool,
}

/// Transport protocol of an ICE candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IceProtocol {
    Udp,
    Tcp,
}

impl IceProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            IceProtocol::Udp => "udp",
            IceProtocol::Tcp => "tcp",
        }
    }
}

/// Candidate type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IceCandidateType {
    Host,
    Srflx,
    Prflx,
    Relay,
}

impl IceCandidateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IceCandidateType::Host => "host",
            IceCandidateType::Srflx => "srflx",
            IceCandidateType::Prflx => "prflx",
            IceCandidateType::Relay => "relay",
        }
    }
}

/// TCP candidate flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IceTcpType {
    Active,
    Passive,
    So,
}

impl IceTcpType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IceTcpType::Active => "active",
            IceTcpType::Passive => "passive",
            IceTcpType::So => "so",
        }
    }
}

/// One ICE candidate of the server side transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    /// Correlates candidates appearing on multiple transports.
    pub foundation: String,
    /// The assigned priority.
    pub priority: u32,
    /// The IP address.
    pub ip: String,
    /// Transport protocol.
    pub protocol: IceProtocol,
    /// The port.
    pub port: u16,
    /// Candidate type.
    #[serde(rename = "type")]
    pub typ: IceCandidateType,
    /// TCP flavor, for TCP candidates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tcp_type: Option<IceTcpType>,
}

/// Hash algorithm and certificate fingerprint as in RFC 4572.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DtlsFingerprint {
    pub algorithm: String,
    pub value: String,
}

/// Which side initiates the DTLS handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DtlsRole {
    /// Determined by the usual SDP offer/answer rules.
    #[default]
    Auto,
    /// We connect.
    Client,
    /// We listen.
    Server,
}

/// DTLS parameters of one side of a transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DtlsParameters {
    #[serde(default)]
    pub role: DtlsRole,
    pub fingerprints: Vec<DtlsFingerprint>,
}

/// Connection state of a transport, as reported by the native engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Failed,
    Disconnected,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::New => "new",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Failed => "failed",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Closed => "closed",
        };
        write!(f, "{}", s)
    }
}

/// Plain RTP (no ICE/DTLS) endpoint parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlainRtpParameters {
    pub ip: String,
    /// 4 or 6.
    pub ip_version: u8,
    pub port: u16,
}

/// Which way media flows over a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportDirection {
    /// Local producers, sending to the server.
    Send,
    /// Consumers of server streams.
    Recv,
}

/// Server-assigned parameters needed to create a transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportOptions {
    pub id: String,
    pub ice_parameters: IceParameters,
    pub ice_candidates: Vec<IceCandidate>,
    pub dtls_parameters: DtlsParameters,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sctp_parameters: Option<SctpParameters>,
}

/// The application's signaling connection to the server.
///
/// Registered on a transport before the first produce/consume. Calls block
/// until the server answered.
pub trait SignalingChannel {
    /// Tell the server our DTLS parameters. Called exactly once per
    /// transport, lazily before the first media or data exchange.
    fn connect(&mut self, dtls_parameters: &DtlsParameters) -> Result<(), RtcError>;

    /// Announce a new producer. Returns the server side producer id.
    fn produce(
        &mut self,
        kind: MediaKind,
        rtp_parameters: &RtpParameters,
    ) -> Result<String, RtcError>;

    /// Announce a new data producer. Returns the server side id.
    fn produce_data(
        &mut self,
        sctp_stream_parameters: &SctpStreamParameters,
        label: &str,
        protocol: &str,
    ) -> Result<String, RtcError>;
}

/// Events of one transport, polled via [`Transport::poll_event`].
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The one-time DTLS exchange ran; these local parameters were sent to
    /// the server.
    Connect { dtls_parameters: DtlsParameters },
    /// The engine reported a new connection state.
    ConnectionStateChange { state: ConnectionState },
    /// A producer was created.
    NewProducer { id: String },
    /// A consumer was created.
    NewConsumer { id: String },
    /// A data producer was created.
    NewDataProducer { id: String },
    /// A data consumer was created.
    NewDataConsumer { id: String },
    /// The transport closed.
    Close,
}

/// Options for [`Transport::produce`].
pub struct ProducerOptions {
    /// Local track to send.
    pub track: Option<String>,
    pub kind: MediaKind,
    pub encodings: Vec<RtpEncodingParameters>,
    pub codec_options: Option<ProducerCodecOptions>,
    /// Restrict sending to this codec.
    pub codec: Option<RtpCodecCapability>,
}

impl ProducerOptions {
    /// Options sending the given track with default settings.
    pub fn new(kind: MediaKind, track: impl Into<String>) -> ProducerOptions {
        ProducerOptions {
            track: Some(track.into()),
            kind,
            encodings: vec![],
            codec_options: None,
            codec: None,
        }
    }
}

/// Options for [`Transport::consume`], from the server's consumer answer.
pub struct ConsumerOptions {
    /// Server side consumer id.
    pub id: String,
    /// Server side producer id being consumed.
    pub producer_id: String,
    pub kind: MediaKind,
    pub rtp_parameters: RtpParameters,
}

/// Options for [`Transport::produce_data`].
pub struct DataProducerOptions {
    pub ordered: bool,
    pub max_packet_life_time: Option<u16>,
    pub max_retransmits: Option<u16>,
    pub label: String,
    pub protocol: String,
}

impl Default for DataProducerOptions {
    fn default() -> Self {
        DataProducerOptions {
            ordered: true,
            max_packet_life_time: None,
            max_retransmits: None,
            label: String::new(),
            protocol: String::new(),
        }
    }
}

/// Options for [`Transport::consume_data`], from the server.
pub struct DataConsumerOptions {
    /// Server side data consumer id.
    pub id: String,
    /// Server side data producer id being consumed.
    pub data_producer_id: String,
    pub sctp_stream_parameters: SctpStreamParameters,
    pub label: String,
    pub protocol: String,
}

/// A send or recv pipeline between this client and the server.
///
/// Created by [`crate::Device::create_send_transport`] or
/// [`crate::Device::create_recv_transport`]. All produced/consumed handles
/// live inside the transport and are reached by their server side id.
pub struct Transport {
    id: String,
    direction: TransportDirection,
    closed: bool,
    connection_state: ConnectionState,
    handler: SdpHandler,
    signaling: Option<Box<dyn SignalingChannel>>,
    extended_rtp_capabilities: ExtendedRtpCapabilities,
    can_produce_by_kind: HashMap<MediaKind, bool>,
    producers: HashMap<String, Producer>,
    consumers: HashMap<String, Consumer>,
    data_producers: HashMap<String, DataProducer>,
    data_consumers: HashMap<String, DataConsumer>,
    sctp_enabled: bool,
    probator_consumer_created: bool,
    events: VecDeque<TransportEvent>,
}

impl Transport {
    pub(crate) fn new(
        direction: TransportDirection,
        options: TransportOptions,
        engine: Box<dyn crate::handler::NativeEngine>,
        extended_rtp_capabilities: ExtendedRtpCapabilities,
        can_produce_by_kind: HashMap<MediaKind, bool>,
    ) -> Transport {
        debug!("Transport new() [id:{}, direction:{:?}]", options.id, direction);

        let sctp_enabled = options.sctp_parameters.is_some();
        let handler = SdpHandler::new(
            direction,
            engine,
            options.ice_parameters,
            options.ice_candidates,
            options.dtls_parameters,
            options.sctp_parameters,
            &extended_rtp_capabilities,
        );

        Transport {
            id: options.id,
            direction,
            closed: false,
            connection_state: ConnectionState::New,
            handler,
            signaling: None,
            extended_rtp_capabilities,
            can_produce_by_kind,
            producers: HashMap::new(),
            consumers: HashMap::new(),
            data_producers: HashMap::new(),
            data_consumers: HashMap::new(),
            sctp_enabled,
            probator_consumer_created: false,
            events: VecDeque::new(),
        }
    }

    /// Server side transport id.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn direction(&self) -> TransportDirection {
        self.direction
    }

    pub fn closed(&self) -> bool {
        self.closed
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection_state
    }

    /// Register the signaling channel carrying connect/produce requests.
    /// Must happen before the first produce or consume.
    pub fn register_signaling(&mut self, signaling: Box<dyn SignalingChannel>) {
        self.signaling = Some(signaling);
    }

    /// Next transport event, if any. Connection state changes reported by
    /// the engine surface here.
    pub fn poll_event(&mut self) -> Option<TransportEvent> {
        while let Some(state) = self.handler.poll_connection_state() {
            if state == self.connection_state {
                continue;
            }
            debug!("connection state changed to {}", state);
            self.connection_state = state;
            self.events
                .push_back(TransportEvent::ConnectionStateChange { state });
        }
        self.events.pop_front()
    }

    /// Send a track to the server. Returns the new producer's id.
    pub fn produce(&mut self, options: ProducerOptions) -> Result<String, RtcError> {
        self.ensure_open()?;
        if self.direction != TransportDirection::Send {
            return Err(RtcError::Unsupported("not a send transport".to_string()));
        }
        let kind = options.kind;
        if let Some(codec) = &options.codec {
            if codec.kind != kind {
                return Err(RtcError::Unsupported(format!(
                    "codec '{}' is not a {} codec",
                    codec.mime_type, kind
                )));
            }
        }
        if !self.can_produce_by_kind.get(&kind).copied().unwrap_or(false) {
            return Err(RtcError::Unsupported(format!("cannot produce {}", kind)));
        }

        let signaling = self
            .signaling
            .as_deref_mut()
            .ok_or_else(|| RtcError::InvalidState("no signaling channel registered".to_string()))?;

        let result = self.handler.send(
            options.track.as_deref(),
            kind,
            options.encodings,
            options.codec_options.as_ref(),
            options.codec.as_ref(),
            signaling,
        )?;
        self.drain_connect();

        let signaling = self.signaling.as_deref_mut().expect("signaling present");
        let id = match signaling.produce(kind, &result.rtp_parameters) {
            Ok(id) => id,
            Err(e) => {
                // The engine side transceiver exists already; undo it so no
                // half-registered producer is left behind.
                warn!("produce() | signaling failed, closing media section: {}", e);
                if let Err(undo) = self.handler.stop_sending(&result.local_id) {
                    warn!("produce() | compensating close failed: {}", undo);
                }
                return Err(e);
            }
        };

        let producer = Producer::new(
            id.clone(),
            result.local_id,
            kind,
            options.track,
            result.rtp_parameters,
        );
        self.producers.insert(id.clone(), producer);
        self.events
            .push_back(TransportEvent::NewProducer { id: id.clone() });

        Ok(id)
    }

    /// Receive a server stream. Returns the consumer's id (as given).
    pub fn consume(&mut self, options: ConsumerOptions) -> Result<String, RtcError> {
        self.ensure_open()?;
        if self.direction != TransportDirection::Recv {
            return Err(RtcError::Unsupported("not a recv transport".to_string()));
        }
        options.rtp_parameters.validate()?;
        if !can_receive(&options.rtp_parameters, &self.extended_rtp_capabilities) {
            return Err(RtcError::Unsupported("cannot consume this producer".to_string()));
        }
        let signaling = self
            .signaling
            .as_deref_mut()
            .ok_or_else(|| RtcError::InvalidState("no signaling channel registered".to_string()))?;

        let local_id =
            self.handler
                .receive(&options.id, options.kind, &options.rtp_parameters, signaling)?;
        self.drain_connect();

        // A single keepalive probator stream accompanies the first video
        // consumer.
        if options.kind == MediaKind::Video && !self.probator_consumer_created {
            let probator_rtp_parameters =
                generate_probator_rtp_parameters(&options.rtp_parameters);
            let signaling = self.signaling.as_deref_mut().expect("signaling present");
            self.handler.receive(
                "probator",
                MediaKind::Video,
                &probator_rtp_parameters,
                signaling,
            )?;
            debug!("consume() | probator consumer created");
            self.probator_consumer_created = true;
        }

        let consumer = Consumer::new(
            options.id.clone(),
            local_id,
            options.producer_id,
            options.kind,
            None,
            options.rtp_parameters,
        );
        self.consumers.insert(options.id.clone(), consumer);
        self.events.push_back(TransportEvent::NewConsumer {
            id: options.id.clone(),
        });

        Ok(options.id)
    }

    /// Open an outgoing data channel. Returns the new data producer's id.
    pub fn produce_data(&mut self, options: DataProducerOptions) -> Result<String, RtcError> {
        self.ensure_open()?;
        if self.direction != TransportDirection::Send {
            return Err(RtcError::Unsupported("not a send transport".to_string()));
        }
        self.ensure_sctp()?;
        let signaling = self
            .signaling
            .as_deref_mut()
            .ok_or_else(|| RtcError::InvalidState("no signaling channel registered".to_string()))?;

        let sctp_stream_parameters = self.handler.send_data_channel(
            options.ordered,
            options.max_packet_life_time,
            options.max_retransmits,
            &options.label,
            &options.protocol,
            signaling,
        )?;
        self.drain_connect();

        let signaling = self.signaling.as_deref_mut().expect("signaling present");
        let id = signaling.produce_data(&sctp_stream_parameters, &options.label, &options.protocol)?;

        let local_id = sctp_stream_parameters.stream_id.to_string();
        let data_producer = DataProducer::new(
            id.clone(),
            local_id,
            sctp_stream_parameters,
            options.label,
            options.protocol,
        );
        self.data_producers.insert(id.clone(), data_producer);
        self.events
            .push_back(TransportEvent::NewDataProducer { id: id.clone() });

        Ok(id)
    }

    /// Receive a server data channel. Returns the data consumer's id.
    pub fn consume_data(&mut self, options: DataConsumerOptions) -> Result<String, RtcError> {
        self.ensure_open()?;
        if self.direction != TransportDirection::Recv {
            return Err(RtcError::Unsupported("not a recv transport".to_string()));
        }
        self.ensure_sctp()?;
        let signaling = self
            .signaling
            .as_deref_mut()
            .ok_or_else(|| RtcError::InvalidState("no signaling channel registered".to_string()))?;

        self.handler.receive_data_channel(
            &options.sctp_stream_parameters,
            &options.label,
            &options.protocol,
            signaling,
        )?;
        self.drain_connect();

        let local_id = options.sctp_stream_parameters.stream_id.to_string();
        let data_consumer = DataConsumer::new(
            options.id.clone(),
            local_id,
            options.data_producer_id,
            options.sctp_stream_parameters,
            options.label,
            options.protocol,
        );
        self.data_consumers.insert(options.id.clone(), data_consumer);
        self.events.push_back(TransportEvent::NewDataConsumer {
            id: options.id.clone(),
        });

        Ok(options.id)
    }

    /// Apply fresh ICE parameters after a server side ICE restart.
    pub fn restart_ice(&mut self, ice_parameters: IceParameters) -> Result<(), RtcError> {
        self.ensure_open()?;
        self.handler.restart_ice(ice_parameters)
    }

    /// Engine defined transport stats.
    pub fn get_stats(&mut self) -> Result<String, RtcError> {
        self.ensure_open()?;
        self.handler.stats()
    }

    pub fn producer(&self, id: &str) -> Option<&Producer> {
        self.producers.get(id)
    }

    pub fn producer_mut(&mut self, id: &str) -> Option<&mut Producer> {
        self.producers.get_mut(id)
    }

    pub fn consumer(&self, id: &str) -> Option<&Consumer> {
        self.consumers.get(id)
    }

    pub fn consumer_mut(&mut self, id: &str) -> Option<&mut Consumer> {
        self.consumers.get_mut(id)
    }

    pub fn data_producer(&self, id: &str) -> Option<&DataProducer> {
        self.data_producers.get(id)
    }

    pub fn data_consumer(&self, id: &str) -> Option<&DataConsumer> {
        self.data_consumers.get(id)
    }

    /// Close a producer and release its media section.
    pub fn close_producer(&mut self, id: &str) -> Result<(), RtcError> {
        let producer = self
            .producers
            .get_mut(id)
            .ok_or_else(|| RtcError::NotFound(format!("no producer with id '{}'", id)))?;
        if producer.closed() {
            return Ok(());
        }
        let local_id = producer.local_id().to_string();
        producer.close();
        if !self.closed {
            self.handler.stop_sending(&local_id)?;
        }
        Ok(())
    }

    /// Close a consumer and release its media section.
    pub fn close_consumer(&mut self, id: &str) -> Result<(), RtcError> {
        let consumer = self
            .consumers
            .get_mut(id)
            .ok_or_else(|| RtcError::NotFound(format!("no consumer with id '{}'", id)))?;
        if consumer.closed() {
            return Ok(());
        }
        let local_id = consumer.local_id().to_string();
        consumer.close();
        if !self.closed {
            self.handler.stop_receiving(&local_id)?;
        }
        Ok(())
    }

    /// Close a data producer. The application section stays negotiated.
    pub fn close_data_producer(&mut self, id: &str) -> Result<(), RtcError> {
        self.data_producers
            .get_mut(id)
            .ok_or_else(|| RtcError::NotFound(format!("no data producer with id '{}'", id)))?
            .close();
        Ok(())
    }

    /// Close a data consumer. The application section stays negotiated.
    pub fn close_data_consumer(&mut self, id: &str) -> Result<(), RtcError> {
        self.data_consumers
            .get_mut(id)
            .ok_or_else(|| RtcError::NotFound(format!("no data consumer with id '{}'", id)))?
            .close();
        Ok(())
    }

    /// Swap (or remove) the track a producer is sending.
    pub fn replace_producer_track(
        &mut self,
        id: &str,
        track: Option<&str>,
    ) -> Result<(), RtcError> {
        let producer = self
            .producers
            .get_mut(id)
            .ok_or_else(|| RtcError::NotFound(format!("no producer with id '{}'", id)))?;
        if producer.closed() {
            return Err(RtcError::InvalidState("closed".to_string()));
        }
        let local_id = producer.local_id().to_string();
        self.handler.replace_track(&local_id, track)?;
        let producer = self.producers.get_mut(id).expect("producer present");
        producer.set_track(track.map(|t| t.to_string()));
        Ok(())
    }

    /// Cap the spatial layer a video producer sends.
    pub fn set_producer_max_spatial_layer(
        &mut self,
        id: &str,
        spatial_layer: u8,
    ) -> Result<(), RtcError> {
        self.producers
            .get_mut(id)
            .ok_or_else(|| RtcError::NotFound(format!("no producer with id '{}'", id)))?
            .set_max_spatial_layer(spatial_layer)
    }

    /// Close the transport. All handles transition to closed.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        debug!("Transport close() [id:{}]", self.id);
        self.closed = true;

        self.handler.close();

        for producer in self.producers.values_mut() {
            producer.transport_closed();
        }
        for consumer in self.consumers.values_mut() {
            consumer.transport_closed();
        }
        for data_producer in self.data_producers.values_mut() {
            data_producer.transport_closed();
        }
        for data_consumer in self.data_consumers.values_mut() {
            data_consumer.transport_closed();
        }

        self.events.push_back(TransportEvent::Close);
    }

    fn ensure_open(&self) -> Result<(), RtcError> {
        if self.closed {
            Err(RtcError::InvalidState("closed".to_string()))
        } else {
            Ok(())
        }
    }

    fn ensure_sctp(&self) -> Result<(), RtcError> {
        if self.sctp_enabled {
            Ok(())
        } else {
            Err(RtcError::Unsupported(
                "SCTP not enabled by remote transport".to_string(),
            ))
        }
    }

    fn drain_connect(&mut self) {
        if let Some(dtls_parameters) = self.handler.take_pending_connect() {
            self.events
                .push_back(TransportEvent::Connect { dtls_parameters });
        }
    }
}
