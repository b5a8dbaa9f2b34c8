//! Parser for BrandMeister last heard messages.
//!
//! The feed is a Socket.IO endpoint. Every WebSocket text message is an
//! Engine.IO frame; message frames wrap a Socket.IO packet, and the packets we
//! care about are `mqtt` events whose payload is itself a JSON-encoded session
//! record. Framing is parsed with `nom`, the payloads with `serde_json`.
//!
//! # Frame Format
//!
//! ```text
//! 42["mqtt",{"topic":"LH","payload":"{\"Event\":\"Session-Stop\",...}"}]
//! ^^ ^ event name   ^ event body
//! ||
//! |+- Socket.IO packet type (2 = event)
//! +-- Engine.IO packet type (4 = message)
//! ```

use chrono::{DateTime, Utc};
use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::take_while,
    character::complete::{char, digit1},
    combinator::{map_res, opt, recognize, value},
    sequence::terminated,
};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::event::{CallEvent, EventKind, LinkInfo};

/// Name of the Socket.IO event carrying last heard records.
pub const MQTT_EVENT: &str = "mqtt";

/// Errors that can occur during parsing.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Frame is not a Socket.IO event")]
    NotAnEvent,

    #[error("Unexpected event: {0}")]
    UnexpectedEvent(String),

    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// A record other than a session stop without its routing fields.
    #[error("Incomplete {0} record")]
    IncompleteRecord(EventKind),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(i64),
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Engine.IO packet types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineKind {
    Open,
    Close,
    Ping,
    Pong,
    Message,
    Upgrade,
    Noop,
}

/// Socket.IO packet types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Connect,
    Disconnect,
    Event,
    Ack,
    ConnectError,
    BinaryEvent,
    BinaryAck,
}

/// A Socket.IO packet carried by an Engine.IO message frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet<'a> {
    pub kind: PacketKind,
    pub namespace: &'a str,
    pub ack: Option<u64>,
    pub data: &'a str,
}

/// A decoded Engine.IO frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame<'a> {
    /// Handshake, carrying the session parameters as JSON.
    Open(&'a str),
    Close,
    Ping,
    Pong,
    Message(Packet<'a>),
    Upgrade,
    Noop,
}

fn engine_kind(input: &str) -> IResult<&str, EngineKind> {
    alt((
        value(EngineKind::Open, char('0')),
        value(EngineKind::Close, char('1')),
        value(EngineKind::Ping, char('2')),
        value(EngineKind::Pong, char('3')),
        value(EngineKind::Message, char('4')),
        value(EngineKind::Upgrade, char('5')),
        value(EngineKind::Noop, char('6')),
    ))
    .parse(input)
}

fn packet_kind(input: &str) -> IResult<&str, PacketKind> {
    alt((
        value(PacketKind::Connect, char('0')),
        value(PacketKind::Disconnect, char('1')),
        value(PacketKind::Event, char('2')),
        value(PacketKind::Ack, char('3')),
        value(PacketKind::ConnectError, char('4')),
        value(PacketKind::BinaryEvent, char('5')),
        value(PacketKind::BinaryAck, char('6')),
    ))
    .parse(input)
}

/// Parse a `/namespace,` prefix. The default namespace is sent without one.
fn namespace(input: &str) -> IResult<&str, &str> {
    terminated(recognize((char('/'), take_while(|c| c != ','))), char(',')).parse(input)
}

fn ack_id(input: &str) -> IResult<&str, u64> {
    map_res(digit1, |s: &str| s.parse::<u64>()).parse(input)
}

fn packet(input: &str) -> IResult<&str, Packet<'_>> {
    let (input, kind) = packet_kind(input)?;
    let (input, namespace) = opt(namespace).parse(input)?;
    let (data, ack) = opt(ack_id).parse(input)?;

    Ok((
        "",
        Packet {
            kind,
            namespace: namespace.unwrap_or("/"),
            ack,
            data,
        },
    ))
}

fn frame(input: &str) -> IResult<&str, Frame<'_>> {
    let (input, kind) = engine_kind(input)?;
    match kind {
        EngineKind::Message => {
            let (input, packet) = packet(input)?;
            Ok((input, Frame::Message(packet)))
        }
        EngineKind::Open => Ok(("", Frame::Open(input))),
        EngineKind::Close => Ok((input, Frame::Close)),
        EngineKind::Ping => Ok((input, Frame::Ping)),
        EngineKind::Pong => Ok((input, Frame::Pong)),
        EngineKind::Upgrade => Ok((input, Frame::Upgrade)),
        EngineKind::Noop => Ok((input, Frame::Noop)),
    }
}

/// Parse a single Engine.IO text frame.
///
/// # Example
///
/// ```
/// use bm_lastheard::parser::{Frame, PacketKind, parse_frame};
///
/// let frame = parse_frame(r#"42["mqtt",{}]"#).unwrap();
/// match frame {
///     Frame::Message(packet) => {
///         assert_eq!(packet.kind, PacketKind::Event);
///         assert_eq!(packet.data, r#"["mqtt",{}]"#);
///     }
///     other => panic!("unexpected frame {:?}", other),
/// }
/// ```
pub fn parse_frame(input: &str) -> ParseResult<Frame<'_>> {
    match frame(input.trim()) {
        Ok((_, frame)) => Ok(frame),
        Err(e) => Err(ParseError::InvalidFrame(format!("{:?}", e))),
    }
}

/// Body of an `mqtt` event.
#[derive(Debug, Deserialize)]
struct MqttMessage {
    payload: String,
}

/// A session record exactly as BrandMeister publishes it.
#[derive(Debug, Deserialize)]
struct RawSession {
    #[serde(rename = "Event", default)]
    event: Option<String>,
    #[serde(rename = "SessionID", default)]
    session_id: Option<String>,
    #[serde(rename = "SourceCall", default)]
    source_call: Option<String>,
    #[serde(rename = "SourceID", default)]
    source_id: Option<u32>,
    #[serde(rename = "DestinationID", default)]
    destination_id: Option<u32>,
    #[serde(rename = "Master", default)]
    master: Option<u32>,
    #[serde(rename = "Start", default)]
    start: Option<i64>,
    #[serde(rename = "Stop", default)]
    stop: Option<i64>,
    #[serde(rename = "LinkCall", default)]
    link_call: Option<String>,
    #[serde(rename = "LinkTypeName", default)]
    link_type: Option<String>,
    #[serde(rename = "LinkName", default)]
    link_name: Option<String>,
}

fn trimmed(value: Option<String>) -> String {
    value.map(|s| s.trim().to_string()).unwrap_or_default()
}

/// Parse the JSON session record carried in an `mqtt` event payload.
///
/// `received_at` is used as the event time when the record has no start time.
pub fn parse_session_payload(payload: &str, received_at: DateTime<Utc>) -> ParseResult<CallEvent> {
    let raw: RawSession = serde_json::from_str(payload)?;
    let kind = EventKind::from_name(raw.event.as_deref().unwrap_or("").trim());

    let (talkgroup, peer_id) = match (raw.destination_id, raw.master) {
        (Some(talkgroup), Some(peer_id)) => (talkgroup, peer_id),
        _ if kind != EventKind::SessionStop => return Err(ParseError::IncompleteRecord(kind)),
        (None, _) => return Err(ParseError::MissingField("DestinationID")),
        (_, None) => return Err(ParseError::MissingField("Master")),
    };

    let start = raw.start.unwrap_or(0);
    let timestamp = if start > 0 {
        DateTime::from_timestamp(start, 0).ok_or(ParseError::InvalidTimestamp(start))?
    } else {
        received_at
    };

    let duration = match raw.stop {
        Some(stop) if start > 0 && stop >= start => {
            Some(Duration::from_secs((stop - start) as u64))
        }
        _ => None,
    };

    Ok(CallEvent {
        session_id: trimmed(raw.session_id),
        kind,
        callsign: trimmed(raw.source_call),
        source_id: raw.source_id.filter(|&id| id != 0),
        talkgroup,
        peer_id,
        timestamp,
        duration,
        link: LinkInfo {
            call: trimmed(raw.link_call),
            kind: trimmed(raw.link_type),
            name: trimmed(raw.link_name),
        },
    })
}

/// Parse a complete feed message (an Engine.IO frame) into a call event.
///
/// Returns an error for control frames, events other than `mqtt`, and
/// malformed payloads.
pub fn parse_call_event(raw: &str, received_at: DateTime<Utc>) -> ParseResult<CallEvent> {
    let packet = match parse_frame(raw)? {
        Frame::Message(packet) if packet.kind == PacketKind::Event => packet,
        _ => return Err(ParseError::NotAnEvent),
    };

    let args: Vec<serde_json::Value> = serde_json::from_str(packet.data)?;
    let name = args
        .first()
        .and_then(|v| v.as_str())
        .ok_or(ParseError::MissingField("event name"))?;
    if name != MQTT_EVENT {
        return Err(ParseError::UnexpectedEvent(name.to_string()));
    }

    let body = args
        .get(1)
        .cloned()
        .ok_or(ParseError::MissingField("event body"))?;
    let message: MqttMessage = serde_json::from_value(body)?;

    parse_session_payload(&message.payload, received_at)
}

/// Check whether a raw frame is a Socket.IO event (quick pre-filter).
#[inline]
pub fn looks_like_event(raw: &str) -> bool {
    raw.trim_start().starts_with("42")
}
