//! The Wire Codec - size-bounded, pipe-delimited knowledge messages.
//!
//! Every frame is a single line of ASCII text:
//!
//! ```text
//! report:    kind|id|locations|treasure|animals|terrain
//! hello:     kind|id
//! summary:   1|id|treasure|animals|terrain|runners        (relayer -> sink only)
//! signal:    20 | 1000 | 10 | 30 | 40 | 50                  (no pipes at all)
//! ```
//!
//! List fields are `!`-delimited; coordinates are `(r, c)` and terrain
//! observations `(r, c, t)`. When a message would exceed its byte budget the
//! encoder drops trailing animals, then trailing terrain. Terrain is sorted by
//! descending ordinal first, so quicksand survives truncation before flat
//! ground does. Treasure and locations are never dropped.

use crate::grid::{Bounds, Location, Terrain};
use std::fmt::Write as _;
use thiserror::Error;

/// "Sender is outside communication range this tick."
pub const OUT_OF_RANGE: &str = "20";
/// Acknowledgement from the visualization sink.
pub const MESSAGE_RECEIVED: &str = "1000";
/// A process finished binding its listeners.
pub const IM_UP: &str = "10";
/// The runner was killed this tick.
pub const IM_DEAD: &str = "30";
/// The runner stepped onto the treasure.
pub const I_WON: &str = "40";
/// Game over, broadcast by relayers to every runner.
pub const WE_WON: &str = "50";

/// Decode failures. Any of these means the peer is desynchronized.
#[derive(Debug, Error, PartialEq)]
pub enum CodecError {
    #[error("Expected {expected} fields, found {found}")]
    FieldCount { expected: &'static str, found: usize },

    #[error("Unknown signal: {0:?}")]
    UnknownSignal(String),

    #[error("Unknown sender kind: {0:?}")]
    UnknownSenderKind(String),

    #[error("Invalid sender id: {0:?}")]
    InvalidId(String),

    #[error("Malformed tuple: {0:?}")]
    MalformedTuple(String),

    #[error("Unknown terrain ordinal: {0}")]
    UnknownTerrain(u64),

    #[error("Location {0} is off the map")]
    OutOfBounds(Location),
}

/// Which kind of agent produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SenderKind {
    Runner,
    Relayer,
}

impl SenderKind {
    pub fn code(self) -> &'static str {
        match self {
            SenderKind::Runner => "0",
            SenderKind::Relayer => "1",
        }
    }

    fn parse(field: &str) -> Result<Self, CodecError> {
        match field {
            "0" => Ok(SenderKind::Runner),
            "1" => Ok(SenderKind::Relayer),
            other => Err(CodecError::UnknownSenderKind(other.to_string())),
        }
    }
}

/// Fixed sentinel messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    OutOfRange,
    MessageReceived,
    ImUp,
    ImDead,
    IWon,
    WeWon,
}

impl Signal {
    pub fn as_str(self) -> &'static str {
        match self {
            Signal::OutOfRange => OUT_OF_RANGE,
            Signal::MessageReceived => MESSAGE_RECEIVED,
            Signal::ImUp => IM_UP,
            Signal::ImDead => IM_DEAD,
            Signal::IWon => I_WON,
            Signal::WeWon => WE_WON,
        }
    }

    pub fn parse(frame: &str) -> Option<Self> {
        match frame {
            OUT_OF_RANGE => Some(Signal::OutOfRange),
            MESSAGE_RECEIVED => Some(Signal::MessageReceived),
            IM_UP => Some(Signal::ImUp),
            IM_DEAD => Some(Signal::ImDead),
            I_WON => Some(Signal::IWon),
            WE_WON => Some(Signal::WeWon),
            _ => None,
        }
    }
}

/// One observed terrain cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TerrainObservation {
    pub location: Location,
    pub terrain: Terrain,
}

impl TerrainObservation {
    pub fn new(location: Location, terrain: Terrain) -> Self {
        Self { location, terrain }
    }
}

impl std::fmt::Display for TerrainObservation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}, {}, {})",
            self.location.row,
            self.location.col,
            self.terrain.ordinal()
        )
    }
}

/// The knowledge subset carried by a report.
#[derive(Debug, Clone, Copy)]
pub struct Payload<'a> {
    pub treasure: Option<Location>,
    pub animals: &'a [Location],
    pub terrain: &'a [TerrainObservation],
}

/// A structured knowledge message.
///
/// `locations` means "where I am" for runner reports, "runners heard this
/// tick" for relayer-to-relayer reports and "your next target" for
/// relayer-to-runner replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub kind: SenderKind,
    pub id: u32,
    pub locations: Vec<Location>,
    pub treasure: Option<Location>,
    pub animals: Vec<Location>,
    pub terrain: Vec<TerrainObservation>,
}

impl Report {
    /// Creates a report with no knowledge attached.
    pub fn new(kind: SenderKind, id: u32, locations: Vec<Location>) -> Self {
        Self {
            kind,
            id,
            locations,
            treasure: None,
            animals: Vec::new(),
            terrain: Vec::new(),
        }
    }

    pub fn payload(&self) -> Payload<'_> {
        Payload {
            treasure: self.treasure,
            animals: &self.animals,
            terrain: &self.terrain,
        }
    }

    /// Encodes under `limit` bytes (see [`encode`]).
    pub fn encode(&self, limit: usize) -> String {
        encode(&self.payload(), self.kind, self.id, &self.locations, limit)
    }

    /// Rejects any coordinate outside `bounds`.
    pub fn validate(&self, bounds: Bounds) -> Result<(), CodecError> {
        let cells = self
            .locations
            .iter()
            .chain(self.treasure.iter())
            .chain(self.animals.iter())
            .chain(self.terrain.iter().map(|obs| &obs.location));
        for &cell in cells {
            if !bounds.contains(cell) {
                return Err(CodecError::OutOfBounds(cell));
            }
        }
        Ok(())
    }
}

/// What a relayer tells the visualization sink once per tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub relayer_id: u32,
    pub treasure: Option<Location>,
    pub animals: Vec<Location>,
    pub terrain: Vec<TerrainObservation>,
    pub runners: Vec<Location>,
}

impl Summary {
    /// Encodes as `1|id|treasure|animals|terrain|runners`. Runner locations
    /// are reserved up front; animals and terrain are truncated as in
    /// [`encode`].
    pub fn encode(&self, limit: usize) -> String {
        let mut tail = String::from("|");
        push_all(&mut tail, &self.runners);

        let mut out = String::new();
        let _ = write!(out, "{}|{}|", SenderKind::Relayer.code(), self.relayer_id);
        if let Some(treasure) = self.treasure {
            let _ = write!(out, "{}", treasure);
        }
        out.push('|');
        push_bounded(&mut out, &self.animals, limit, tail.len() + 1);
        out.push('|');
        push_bounded(&mut out, &by_interest(&self.terrain), limit, tail.len());
        out.push_str(&tail);
        out
    }
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Signal(Signal),
    Hello { kind: SenderKind, id: u32 },
    Report(Report),
}

/// Encodes a connection handshake.
pub fn encode_hello(kind: SenderKind, id: u32) -> String {
    format!("{}|{}", kind.code(), id)
}

/// Encodes a report, dropping optional entries that do not fit in `limit`.
///
/// Deterministic for identical inputs. Truncation is not an error: the
/// result is always a valid message carrying a prefix of the animals and a
/// prefix of the interest-sorted terrain.
pub fn encode(
    payload: &Payload<'_>,
    kind: SenderKind,
    id: u32,
    locations: &[Location],
    limit: usize,
) -> String {
    let mut out = String::with_capacity(limit);
    let _ = write!(out, "{}|{}|", kind.code(), id);
    push_all(&mut out, locations);
    out.push('|');
    if let Some(treasure) = payload.treasure {
        let _ = write!(out, "{}", treasure);
    }
    out.push('|');
    // one byte stays reserved for the pipe before the terrain field
    push_bounded(&mut out, payload.animals, limit, 1);
    out.push('|');
    push_bounded(&mut out, &by_interest(payload.terrain), limit, 0);
    out
}

/// Decodes any frame except a sink summary.
pub fn decode(frame: &str) -> Result<Frame, CodecError> {
    if !frame.contains('|') {
        return Signal::parse(frame)
            .map(Frame::Signal)
            .ok_or_else(|| CodecError::UnknownSignal(frame.to_string()));
    }

    let fields: Vec<&str> = frame.split('|').collect();
    match fields.len() {
        2 => Ok(Frame::Hello {
            kind: SenderKind::parse(fields[0])?,
            id: parse_id(fields[1])?,
        }),
        6 => Ok(Frame::Report(Report {
            kind: SenderKind::parse(fields[0])?,
            id: parse_id(fields[1])?,
            locations: parse_list(fields[2], parse_location)?,
            treasure: parse_optional(fields[3])?,
            animals: parse_list(fields[4], parse_location)?,
            terrain: parse_list(fields[5], parse_observation)?,
        })),
        found => Err(CodecError::FieldCount {
            expected: "2 or 6",
            found,
        }),
    }
}

/// Decodes a relayer-to-sink summary.
pub fn decode_summary(frame: &str) -> Result<Summary, CodecError> {
    let fields: Vec<&str> = frame.split('|').collect();
    if fields.len() != 6 {
        return Err(CodecError::FieldCount {
            expected: "6",
            found: fields.len(),
        });
    }
    if SenderKind::parse(fields[0])? != SenderKind::Relayer {
        return Err(CodecError::UnknownSenderKind(fields[0].to_string()));
    }
    Ok(Summary {
        relayer_id: parse_id(fields[1])?,
        treasure: parse_optional(fields[2])?,
        animals: parse_list(fields[3], parse_location)?,
        terrain: parse_list(fields[4], parse_observation)?,
        runners: parse_list(fields[5], parse_location)?,
    })
}

/// Sorts terrain by descending ordinal, ties by ascending location.
fn by_interest(terrain: &[TerrainObservation]) -> Vec<TerrainObservation> {
    let mut sorted = terrain.to_vec();
    sorted.sort_by(|a, b| {
        b.terrain
            .cmp(&a.terrain)
            .then_with(|| a.location.cmp(&b.location))
    });
    sorted
}

fn push_all<T: std::fmt::Display>(out: &mut String, entries: &[T]) {
    for (i, entry) in entries.iter().enumerate() {
        if i > 0 {
            out.push('!');
        }
        let _ = write!(out, "{}", entry);
    }
}

/// Appends `!`-separated entries while `out` plus `reserve` stays within
/// `limit`; stops at the first entry that does not fit.
fn push_bounded<T: std::fmt::Display>(out: &mut String, entries: &[T], limit: usize, reserve: usize) {
    let mut entry = String::new();
    for (i, item) in entries.iter().enumerate() {
        entry.clear();
        let _ = write!(entry, "{}", item);
        let separator = usize::from(i > 0);
        if out.len() + separator + entry.len() + reserve > limit {
            break;
        }
        if i > 0 {
            out.push('!');
        }
        out.push_str(&entry);
    }
}

fn parse_id(field: &str) -> Result<u32, CodecError> {
    field
        .parse()
        .map_err(|_| CodecError::InvalidId(field.to_string()))
}

fn parse_list<T>(
    field: &str,
    item: fn(&str) -> Result<T, CodecError>,
) -> Result<Vec<T>, CodecError> {
    if field.is_empty() {
        return Ok(Vec::new());
    }
    field.split('!').map(item).collect()
}

fn parse_optional(field: &str) -> Result<Option<Location>, CodecError> {
    if field.is_empty() {
        Ok(None)
    } else {
        parse_location(field).map(Some)
    }
}

/// Tuple grammar: `'(' int (',' int)* ')'`, whitespace allowed around ints.
fn parse_tuple(token: &str) -> Result<Vec<usize>, CodecError> {
    let malformed = || CodecError::MalformedTuple(token.to_string());
    let inner = token
        .trim()
        .strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
        .ok_or_else(malformed)?;
    inner
        .split(',')
        .map(|part| part.trim().parse::<usize>().map_err(|_| malformed()))
        .collect()
}

fn parse_location(token: &str) -> Result<Location, CodecError> {
    match parse_tuple(token)?.as_slice() {
        &[row, col] => Ok(Location::new(row, col)),
        _ => Err(CodecError::MalformedTuple(token.to_string())),
    }
}

fn parse_observation(token: &str) -> Result<TerrainObservation, CodecError> {
    match parse_tuple(token)?.as_slice() {
        &[row, col, ordinal] => {
            let terrain = u8::try_from(ordinal)
                .ok()
                .and_then(Terrain::from_ordinal)
                .ok_or(CodecError::UnknownTerrain(ordinal as u64))?;
            Ok(TerrainObservation::new(Location::new(row, col), terrain))
        }
        _ => Err(CodecError::MalformedTuple(token.to_string())),
    }
}
