//! DataProducer handle: a local data channel sending to the server.

use std::collections::VecDeque;

use crate::sctp::SctpStreamParameters;

/// Observer events of one data producer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataProducerEvent {
    /// The data producer closed, locally or because its transport closed.
    Close,
}

/// An outgoing data channel, created by [`crate::Transport::produce_data`].
pub struct DataProducer {
    id: String,
    local_id: String,
    sctp_stream_parameters: SctpStreamParameters,
    label: String,
    protocol: String,
    closed: bool,
    events: VecDeque<DataProducerEvent>,
}

impl DataProducer {
    pub(crate) fn new(
        id: String,
        local_id: String,
        sctp_stream_parameters: SctpStreamParameters,
        label: String,
        protocol: String,
    ) -> DataProducer {
        DataProducer {
            id,
            local_id,
            sctp_stream_parameters,
            label,
            protocol,
            closed: false,
            events: VecDeque::new(),
        }
    }

    /// Server side data producer id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Engine side identifier (the SCTP stream id).
    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    pub fn sctp_stream_parameters(&self) -> &SctpStreamParameters {
        &self.sctp_stream_parameters
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn closed(&self) -> bool {
        self.closed
    }

    /// Next observer event, if any.
    pub fn poll_event(&mut self) -> Option<DataProducerEvent> {
        self.events.pop_front()
    }

    pub(crate) fn close(&mut self) {
        if self.closed {
            return;
        }
        debug!("DataProducer close()");
        self.closed = true;
        self.events.push_back(DataProducerEvent::Close);
    }

    pub(crate) fn transport_closed(&mut self) {
        if self.closed {
            return;
        }
        debug!("DataProducer transport_closed()");
        self.closed = true;
        self.events.push_back(DataProducerEvent::Close);
    }
}
