//! Device: entry point holding the negotiated capabilities of this client.

use std::collections::HashMap;

use crate::handler::{
    NativeEngineFactory, SCTP_NUM_STREAMS_MIS, SCTP_NUM_STREAMS_OS,
};
use crate::ortc;
use crate::rtp::{Direction, ExtendedRtpCapabilities, MediaKind, RtpCapabilities};
use crate::sctp::{NumSctpStreams, SctpCapabilities};
use crate::sdp;
use crate::transport::{Transport, TransportDirection, TransportOptions};
use crate::RtcError;

/// The client side endpoint.
///
/// A device is created unloaded. [`Device::load`] probes the native engine's
/// capabilities, intersects them with the server's router capabilities and
/// unlocks the capability queries and transport factories. Loading happens
/// once; the transition is one way.
pub struct Device {
    factory: Box<dyn NativeEngineFactory>,
    loaded: bool,
    extended_rtp_capabilities: Option<ExtendedRtpCapabilities>,
    recv_rtp_capabilities: Option<RtpCapabilities>,
    can_produce_by_kind: HashMap<MediaKind, bool>,
    sctp_capabilities: Option<SctpCapabilities>,
}

impl Device {
    pub fn new(factory: Box<dyn NativeEngineFactory>) -> Device {
        Device {
            factory,
            loaded: false,
            extended_rtp_capabilities: None,
            recv_rtp_capabilities: None,
            can_produce_by_kind: HashMap::new(),
            sctp_capabilities: None,
        }
    }

    pub fn loaded(&self) -> bool {
        self.loaded
    }

    /// Load the device with the server router's RTP capabilities.
    ///
    /// A second load is a no-op.
    pub fn load(&mut self, router_rtp_capabilities: &RtpCapabilities) -> Result<(), RtcError> {
        if self.loaded {
            warn!("load() | already loaded");
            return Ok(());
        }
        debug!("load()");

        let native_rtp_capabilities = self.native_rtp_capabilities()?;

        let extended = ortc::get_extended_rtp_capabilities(
            &native_rtp_capabilities,
            router_rtp_capabilities,
        );

        let mut can_produce_by_kind = HashMap::new();
        for kind in [MediaKind::Audio, MediaKind::Video] {
            can_produce_by_kind.insert(kind, ortc::can_send(kind, &extended));
        }

        self.recv_rtp_capabilities = Some(ortc::get_recv_rtp_capabilities(&extended));
        self.extended_rtp_capabilities = Some(extended);
        self.can_produce_by_kind = can_produce_by_kind;
        self.sctp_capabilities = Some(SctpCapabilities {
            num_streams: NumSctpStreams {
                os: SCTP_NUM_STREAMS_OS,
                mis: SCTP_NUM_STREAMS_MIS,
            },
        });
        self.loaded = true;

        Ok(())
    }

    /// The RTP capabilities to hand to the server for creating consumers.
    pub fn rtp_capabilities(&self) -> Result<&RtpCapabilities, RtcError> {
        self.recv_rtp_capabilities
            .as_ref()
            .ok_or_else(|| RtcError::InvalidState("not loaded".to_string()))
    }

    /// The SCTP capabilities to hand to the server for data channels.
    pub fn sctp_capabilities(&self) -> Result<&SctpCapabilities, RtcError> {
        self.sctp_capabilities
            .as_ref()
            .ok_or_else(|| RtcError::InvalidState("not loaded".to_string()))
    }

    /// Whether this device can send the given kind of media.
    pub fn can_produce(&self, kind: MediaKind) -> Result<bool, RtcError> {
        if !self.loaded {
            return Err(RtcError::InvalidState("not loaded".to_string()));
        }
        Ok(self.can_produce_by_kind.get(&kind).copied().unwrap_or(false))
    }

    /// Create a transport for sending media and data.
    pub fn create_send_transport(
        &mut self,
        options: TransportOptions,
    ) -> Result<Transport, RtcError> {
        self.create_transport(TransportDirection::Send, options)
    }

    /// Create a transport for receiving media and data.
    pub fn create_recv_transport(
        &mut self,
        options: TransportOptions,
    ) -> Result<Transport, RtcError> {
        self.create_transport(TransportDirection::Recv, options)
    }

    fn create_transport(
        &mut self,
        direction: TransportDirection,
        options: TransportOptions,
    ) -> Result<Transport, RtcError> {
        let extended = self
            .extended_rtp_capabilities
            .as_ref()
            .ok_or_else(|| RtcError::InvalidState("not loaded".to_string()))?;

        Ok(Transport::new(
            direction,
            options,
            self.factory.create_engine(),
            extended.clone(),
            self.can_produce_by_kind.clone(),
        ))
    }

    /// What the engine itself can do, read from a probe offer on a
    /// throwaway engine.
    fn native_rtp_capabilities(&self) -> Result<RtpCapabilities, RtcError> {
        let mut engine = self.factory.create_engine();

        engine.add_transceiver(MediaKind::Audio, Direction::SendRecv, None)?;
        engine.add_transceiver(MediaKind::Video, Direction::SendRecv, None)?;
        let offer = engine.create_offer()?;
        engine.close();

        let session = sdp::parse(&offer);
        Ok(sdp::utils::extract_rtp_capabilities(&session))
    }
}
