//! Data structures representing last heard call events.
//!
//! This module defines the core types used throughout the application
//! to represent decoded session records from the BrandMeister network.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// The lifecycle stage of a BrandMeister voice session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// A station keyed up.
    SessionStart,
    /// Periodic update while the station is still transmitting.
    SessionUpdate,
    /// The transmission ended; only these carry complete link information.
    SessionStop,
    /// Any event name we don't recognize.
    Other(String),
}

impl EventKind {
    /// Map the network's `Event` field to a kind.
    pub fn from_name(name: &str) -> Self {
        match name {
            "Session-Start" => EventKind::SessionStart,
            "Session-Update" | "Session-Progress" => EventKind::SessionUpdate,
            "Session-Stop" => EventKind::SessionStop,
            other => EventKind::Other(other.to_string()),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::SessionStart => write!(f, "Session-Start"),
            EventKind::SessionUpdate => write!(f, "Session-Update"),
            EventKind::SessionStop => write!(f, "Session-Stop"),
            EventKind::Other(name) => write!(f, "{}", name),
        }
    }
}

/// The repeater or hotspot a call came in through.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkInfo {
    /// Callsign of the repeater, if the network knows it.
    pub call: String,

    /// Link type, e.g. "Repeater" or "Hotspot".
    pub kind: String,

    /// Free-form device name, e.g. "MMDVM Host".
    pub name: String,
}

/// A single call event from the last heard feed.
///
/// # Example
///
/// A session payload like:
/// ```text
/// {"Event":"Session-Stop","SourceCall":"OH6ABC","DestinationID":244,"Master":2441,...}
/// ```
///
/// Would be decoded into a `CallEvent` with:
/// - `callsign`: "OH6ABC"
/// - `talkgroup`: 244
/// - `peer_id`: 2441
/// - `kind`: EventKind::SessionStop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallEvent {
    /// Network-assigned identifier of the voice session.
    pub session_id: String,

    /// Lifecycle stage of the session.
    pub kind: EventKind,

    /// The transmitting station's callsign. May be empty when the network
    /// only reported a DMR id.
    pub callsign: String,

    /// The transmitting station's DMR id.
    pub source_id: Option<u32>,

    /// The destination talkgroup.
    pub talkgroup: u32,

    /// The BrandMeister master server that relayed the call.
    pub peer_id: u32,

    /// When the session started, or when it was received if unreported.
    pub timestamp: DateTime<Utc>,

    /// Length of the transmission, known once the session stops.
    pub duration: Option<Duration>,

    /// Repeater/hotspot details.
    pub link: LinkInfo,
}

impl CallEvent {
    /// Returns a copy of this event carrying the given callsign.
    pub fn with_callsign(self, callsign: impl Into<String>) -> Self {
        Self {
            callsign: callsign.into(),
            ..self
        }
    }

    /// Whether this event marks the end of a transmission.
    pub fn is_session_stop(&self) -> bool {
        self.kind == EventKind::SessionStop
    }
}

impl fmt::Display for CallEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} TG{} via {} at {}",
            self.kind,
            if self.callsign.is_empty() {
                "?"
            } else {
                &self.callsign
            },
            self.talkgroup,
            self.peer_id,
            self.timestamp.format("%H:%M:%SZ")
        )
    }
}
