//! Server-to-client batch envelope
//!
//! The stream socket carries batches, not single events:
//! `{"type":"batch","events":[...]}`. Clients must also accept a bare
//! event object for transitional compatibility; this crate only ever
//! produces the enveloped form.

use serde::{Deserialize, Serialize};

use crate::event::Event;

/// One delivered batch of ordered events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchEnvelope {
    /// Always `"batch"`
    #[serde(rename = "type")]
    pub kind: String,

    /// Events in admission order, IDs strictly increasing by offset
    pub events: Vec<Event>,
}

impl BatchEnvelope {
    /// Wrap events for delivery
    pub fn new(events: Vec<Event>) -> Self {
        Self {
            kind: "batch".to_string(),
            events,
        }
    }

    /// Serialize to the wire frame
    pub fn to_frame(&self) -> String {
        serde_json::to_string(self).expect("envelope serialization is infallible")
    }
}
