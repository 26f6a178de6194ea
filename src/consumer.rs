//! Consumer handle: a remote stream being received from the server.

use std::collections::VecDeque;

use crate::rtp::{MediaKind, RtpParameters};

/// Observer events of one consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumerEvent {
    /// Receiving paused locally.
    Pause,
    /// Receiving resumed locally.
    Resume,
    /// The consumer closed, locally or because its transport closed.
    Close,
}

/// A stream of media received from the server.
///
/// Created by [`crate::Transport::consume`]. Closing goes through the
/// owning transport so the media section can be released.
pub struct Consumer {
    id: String,
    local_id: String,
    producer_id: String,
    kind: MediaKind,
    track: Option<String>,
    rtp_parameters: RtpParameters,
    paused: bool,
    closed: bool,
    events: VecDeque<ConsumerEvent>,
}

impl Consumer {
    pub(crate) fn new(
        id: String,
        local_id: String,
        producer_id: String,
        kind: MediaKind,
        track: Option<String>,
        rtp_parameters: RtpParameters,
    ) -> Consumer {
        Consumer {
            id,
            local_id,
            producer_id,
            kind,
            track,
            rtp_parameters,
            paused: false,
            closed: false,
            events: VecDeque::new(),
        }
    }

    /// Server side consumer id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Engine side identifier (the mid of the receiving transceiver).
    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    /// The id of the server side producer being consumed.
    pub fn producer_id(&self) -> &str {
        &self.producer_id
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// The received track, if the engine exposed one.
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

    /// Next observer event, if any.
    pub fn poll_event(&mut self) -> Option<ConsumerEvent> {
        self.events.pop_front()
    }

    /// Pause receiving locally. No-op when closed.
    pub fn pause(&mut self) {
        debug!("Consumer pause()");
        if self.closed || self.paused {
            return;
        }
        self.paused = true;
        self.events.push_back(ConsumerEvent::Pause);
    }

    /// Resume receiving locally. No-op when closed.
    pub fn resume(&mut self) {
        debug!("Consumer resume()");
        if self.closed || !self.paused {
            return;
        }
        self.paused = false;
        self.events.push_back(ConsumerEvent::Resume);
    }

    pub(crate) fn close(&mut self) {
        if self.closed {
            return;
        }
        debug!("Consumer close()");
        self.closed = true;
        self.events.push_back(ConsumerEvent::Close);
    }

    pub(crate) fn transport_closed(&mut self) {
        if self.closed {
            return;
        }
        debug!("Consumer transport_closed()");
        self.closed = true;
        self.events.push_back(ConsumerEvent::Close);
    }
}
