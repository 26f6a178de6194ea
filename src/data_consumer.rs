//! DataConsumer handle: a data channel received from the server.

use std::collections::VecDeque;

use crate::sctp::SctpStreamParameters;

/// Observer events of one data consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataConsumerEvent {
    /// The data consumer closed, locally or because its transport closed.
    Close,
}

/// An incoming data channel, created by [`crate::Transport::consume_data`].
pub struct DataConsumer {
    id: String,
    local_id: String,
    data_producer_id: String,
    sctp_stream_parameters: SctpStreamParameters,
    label: String,
    protocol: String,
    closed: bool,
    events: VecDeque<DataConsumerEvent>,
}

impl DataConsumer {
    pub(crate) fn new(
        id: String,
        local_id: String,
        data_producer_id: String,
        sctp_stream_parameters: SctpStreamParameters,
        label: String,
        protocol: String,
    ) -> DataConsumer {
        DataConsumer {
            id,
            local_id,
            data_producer_id,
            sctp_stream_parameters,
            label,
            protocol,
            closed: false,
            events: VecDeque::new(),
        }
    }

    /// Server side data consumer id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Engine side identifier (the SCTP stream id).
    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    /// The id of the server side data producer being consumed.
    pub fn data_producer_id(&self) -> &str {
        &self.data_producer_id
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
    pub fn poll_event(&mut self) -> Option<DataConsumerEvent> {
        self.events.pop_front()
    }

    pub(crate) fn close(&mut self) {
        if self.closed {
            return;
        }
        debug!("DataConsumer close()");
        self.closed = true;
        self.events.push_back(DataConsumerEvent::Close);
    }

    pub(crate) fn transport_closed(&mut self) {
        if self.closed {
            return;
        }
        debug!("DataConsumer transport_closed()");
        self.closed = true;
        self.events.push_back(DataConsumerEvent::Close);
    }
}
