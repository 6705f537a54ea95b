use serde::{Deserialize, Serialize};

use stockledger_core::{EventId, StockRecordId};

/// Envelope for a published event, carrying stream metadata.
///
/// Notes:
/// - One stream per stock record; `record_id` names it.
/// - `sequence_number` equals the record version after the event was applied,
///   so it is strictly increasing per stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: EventId,

    record_id: StockRecordId,
    stream_type: String,

    sequence_number: u64,

    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: EventId,
        record_id: StockRecordId,
        stream_type: impl Into<String>,
        sequence_number: u64,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            record_id,
            stream_type: stream_type.into(),
            sequence_number,
            payload,
        }
    }

    pub fn event_id(&self) -> EventId {
        self.event_id
    }

    pub fn record_id(&self) -> StockRecordId {
        self.record_id
    }

    pub fn stream_type(&self) -> &str {
        &self.stream_type
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}
