//! A Sans I/O WebRTC signaling client core in Rust.
//!
//! This crate implements the negotiation half of a WebRTC signaling client:
//! ORTC style capability matching, SDP parsing and serialization, and the
//! stateful remote session description a client maintains while producing
//! and consuming media over server allocated transports.
//!
//! Nothing here talks to a network or a media engine. The two places where
//! the outside world is needed are traits:
//!
//! - [`NativeEngine`] is the local WebRTC engine (peer connection). It
//!   answers offer/answer calls with plain SDP text.
//! - [`SignalingChannel`] is the application's connection to the server.
//!   Its calls block until the server answered.
//!
//! # Usage
//!
//! Everything starts with a [`Device`]. Load it once with the server
//! router's RTP capabilities, then create send/recv [`Transport`]s from
//! server assigned parameters:
//!
//! ```no_run
//! # use sigrtc::*;
//! # use sigrtc::rtp::MediaKind;
//! # fn run(
//! #     factory: Box<dyn NativeEngineFactory>,
//! #     router_rtp_capabilities: rtp::RtpCapabilities,
//! #     transport_options: TransportOptions,
//! #     signaling: Box<dyn SignalingChannel>,
//! # ) -> Result<(), RtcError> {
//! let mut device = Device::new(factory);
//! device.load(&router_rtp_capabilities)?;
//!
//! let mut transport = device.create_send_transport(transport_options)?;
//! transport.register_signaling(signaling);
//!
//! let producer_id = transport.produce(ProducerOptions::new(
//!     MediaKind::Audio,
//!     "microphone",
//! ))?;
//!
//! while let Some(event) = transport.poll_event() {
//!     // Connect, ConnectionStateChange, NewProducer, ...
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Producers, consumers and data channel handles live inside their
//! transport and are addressed by server side id. Everything notable that
//! happens surfaces as an event polled from the transport or handle; there
//! are no callbacks.

#![forbid(unsafe_code)]
#![allow(clippy::new_without_default)]

#[macro_use]
extern crate tracing;

use thiserror::Error;

pub mod ortc;
pub mod rtp;
pub mod sctp;
pub mod sdp;

mod h264_profile;

mod device;
pub use device::Device;

mod transport;
pub use transport::{
    ConnectionState, ConsumerOptions, DataConsumerOptions, DataProducerOptions, DtlsFingerprint,
    DtlsParameters, DtlsRole, IceCandidate, IceCandidateType, IceParameters, IceProtocol,
    IceTcpType, PlainRtpParameters, ProducerOptions, SignalingChannel, Transport,
    TransportDirection, TransportEvent, TransportOptions,
};

mod handler;
pub use handler::{NativeEngine, NativeEngineFactory, SdpType};

mod producer;
pub use producer::{Producer, ProducerCodecOptions, ProducerEvent};

mod consumer;
pub use consumer::{Consumer, ConsumerEvent};

mod data_producer;
pub use data_producer::{DataProducer, DataProducerEvent};

mod data_consumer;
pub use data_consumer::{DataConsumer, DataConsumerEvent};

use sdp::SdpError;

/// Errors of this crate. No call retries internally; every failure
/// propagates to the caller as one of these.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RtcError {
    /// An operation was called in a state that cannot serve it, such as
    /// producing on a closed transport or querying an unloaded device.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The peer, codec or direction cannot do what was asked.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// A referenced entity (mid, producer, SDP attribute) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// SDP could not be serialized or violated the grammar.
    #[error("sdp error: {0}")]
    Sdp(#[from] SdpError),
}
