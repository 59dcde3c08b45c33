//! Drawing event model and protobuf codec for the realtime WS transport.
//!
//! This crate owns the wire representation of a [`DrawEvent`]. The hub moves
//! encoded events around as opaque bytes; only the places that care about
//! semantics (the persistence filter and the replay scan) decode them.
//!
//! Every encoded event carries [`WIRE_VERSION`]. Decoding never panics: any
//! byte string either yields a well-formed event or a [`CodecError`].

use prost::Message;

/// Version stamped into every encoded event.
pub const WIRE_VERSION: u32 = 1;

/// Error returned by [`decode_event`] and [`decode_action`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The raw bytes could not be decoded as a protobuf `WireEvent`.
    #[error("failed to decode protobuf event: {0}")]
    Decode(#[from] prost::DecodeError),
    /// The `action` integer on the wire is zero or unknown.
    #[error("invalid event action: {0}")]
    InvalidAction(i32),
    /// The event was produced by an incompatible schema version.
    #[error("unsupported wire version: {0}")]
    UnsupportedVersion(u32),
}

/// Kind of pointer activity carried by an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    /// Pointer pressed; starts a stroke.
    Down,
    /// Pointer moved while pressed.
    Move,
    /// Pointer released; ends a stroke.
    Up,
    /// Hover position of a remote pointer. Ephemeral.
    Cursor,
    /// Canvas wiped. Bounds replay.
    Clear,
}

impl Action {
    /// Convert action into wire enum integer value.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        match self {
            Self::Down => WireAction::Down as i32,
            Self::Move => WireAction::Move as i32,
            Self::Up => WireAction::Up as i32,
            Self::Cursor => WireAction::Cursor as i32,
            Self::Clear => WireAction::Clear as i32,
        }
    }

    /// Parse an action from wire enum integer value.
    fn from_i32(value: i32) -> Result<Self, CodecError> {
        match WireAction::try_from(value) {
            Ok(WireAction::Down) => Ok(Self::Down),
            Ok(WireAction::Move) => Ok(Self::Move),
            Ok(WireAction::Up) => Ok(Self::Up),
            Ok(WireAction::Cursor) => Ok(Self::Cursor),
            Ok(WireAction::Clear) => Ok(Self::Clear),
            Ok(WireAction::Unspecified) | Err(_) => Err(CodecError::InvalidAction(value)),
        }
    }

    /// Whether events of this kind belong in the session log.
    ///
    /// Cursor positions are overwritten continuously and have no replay value.
    #[must_use]
    pub fn is_persistent(self) -> bool {
        !matches!(self, Self::Cursor)
    }

    /// Whether this event resets the visible canvas, bounding replay.
    #[must_use]
    pub fn is_boundary(self) -> bool {
        matches!(self, Self::Clear)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Down => "down",
            Self::Move => "move",
            Self::Up => "up",
            Self::Cursor => "cursor",
            Self::Clear => "clear",
        }
    }
}

/// Canvas position in drawing-surface units.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
}

/// A single pointer event on the shared canvas.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawEvent {
    /// Sender-chosen identifier, used by peers to tell strokes apart.
    pub client_id: u32,
    pub action: Action,
    pub coordinate: Coordinate,
    /// Reserved. Always zero today.
    pub sequence_id: u64,
}

impl DrawEvent {
    #[must_use]
    pub fn new(client_id: u32, action: Action, x: f64, y: f64) -> Self {
        Self { client_id, action, coordinate: Coordinate { x, y }, sequence_id: 0 }
    }
}

/// Encode an event into protobuf bytes.
#[must_use]
pub fn encode_event(event: &DrawEvent) -> Vec<u8> {
    let wire = event_to_wire(event);

    let mut out = Vec::with_capacity(wire.encoded_len());
    // Encoding into a growable Vec cannot hit `BufferTooSmall`.
    wire.encode(&mut out).unwrap_or_default();
    out
}

/// Decode protobuf bytes into an event.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] for malformed bytes,
/// [`CodecError::UnsupportedVersion`] for foreign schema versions and
/// [`CodecError::InvalidAction`] for zero or out-of-range actions.
pub fn decode_event(bytes: &[u8]) -> Result<DrawEvent, CodecError> {
    let wire = WireEvent::decode(bytes)?;
    wire_to_event(wire)
}

/// Decode just far enough to learn the event's action.
///
/// # Errors
///
/// Same as [`decode_event`].
pub fn decode_action(bytes: &[u8]) -> Result<Action, CodecError> {
    decode_event(bytes).map(|event| event.action)
}

fn event_to_wire(event: &DrawEvent) -> WireEvent {
    WireEvent {
        version: WIRE_VERSION,
        client_id: event.client_id,
        action: event.action.as_i32(),
        coordinate: Some(WireCoordinate { x: event.coordinate.x, y: event.coordinate.y }),
        sequence_id: event.sequence_id,
    }
}

fn wire_to_event(wire: WireEvent) -> Result<DrawEvent, CodecError> {
    if wire.version != WIRE_VERSION {
        return Err(CodecError::UnsupportedVersion(wire.version));
    }

    Ok(DrawEvent {
        client_id: wire.client_id,
        action: Action::from_i32(wire.action)?,
        coordinate: wire
            .coordinate
            .map_or_else(Coordinate::default, |c| Coordinate { x: c.x, y: c.y }),
        sequence_id: wire.sequence_id,
    })
}

#[derive(Clone, PartialEq, Message)]
struct WireEvent {
    #[prost(uint32, tag = "1")]
    version: u32,
    #[prost(uint32, tag = "2")]
    client_id: u32,
    #[prost(enumeration = "WireAction", tag = "3")]
    action: i32,
    #[prost(message, optional, tag = "4")]
    coordinate: Option<WireCoordinate>,
    #[prost(uint64, tag = "5")]
    sequence_id: u64,
}

#[derive(Clone, PartialEq, Message)]
struct WireCoordinate {
    #[prost(double, tag = "1")]
    x: f64,
    #[prost(double, tag = "2")]
    y: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, prost::Enumeration)]
#[repr(i32)]
enum WireAction {
    Unspecified = 0,
    Down = 1,
    Move = 2,
    Up = 3,
    Cursor = 4,
    Clear = 5,
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
