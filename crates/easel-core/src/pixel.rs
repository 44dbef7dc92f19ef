use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Upper bound on the length of a map identifier, in characters.
pub const MAX_MAP_IDENT_LEN: usize = 100;

/// Integer canvas coordinate. Exact equality on both axes is the merge key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: i64,
    pub y: i64,
}

/// RGBA color with float channels. Channels are conventionally in
/// `[0.0, 1.0]` but the range is not enforced, only the numeric typing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub a: f64,
}

/// One positioned, colored mark with provenance. `is_active = false` is a
/// deletion instruction and is never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Pixel {
    pub position: Position,
    pub color: Color,
    pub placed_by: String,
    /// Unix milliseconds, client-supplied and echoed verbatim.
    #[serde(alias = "LastModified")]
    pub placed_at: i64,
    pub is_active: bool,
}

impl Pixel {
    /// Checks the constraints serde typing cannot express. Field presence
    /// and numeric/bool typing are already enforced by deserialization.
    pub fn validate(&self) -> Result<(), InvalidPixel> {
        if self.placed_by.trim().is_empty() {
            return Err(InvalidPixel::EmptyPlacedBy);
        }
        Ok(())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidPixel {
    #[error("PlacedBy must be a non-empty string")]
    EmptyPlacedBy,
}

/// Partition key identifying one canvas. Guaranteed to match
/// `^[A-Za-z0-9._-]{1,100}$` once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct MapIdent(String);

impl MapIdent {
    pub fn parse(raw: &str) -> Result<Self, InvalidMapIdent> {
        if raw.is_empty() {
            return Err(InvalidMapIdent::Empty);
        }
        let length = raw.chars().count();
        if length > MAX_MAP_IDENT_LEN {
            return Err(InvalidMapIdent::TooLong(length));
        }
        if let Some(ch) = raw.chars().find(|ch| !is_ident_char(*ch)) {
            return Err(InvalidMapIdent::BadChar(ch));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MapIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidMapIdent {
    #[error("map identifier is empty")]
    Empty,
    #[error("map identifier is {0} characters, limit is {MAX_MAP_IDENT_LEN}")]
    TooLong(usize),
    #[error("map identifier contains forbidden character {0:?}")]
    BadChar(char),
}

/// Convenience predicate form of [`MapIdent::parse`].
pub fn validate_map_ident(raw: &str) -> bool {
    MapIdent::parse(raw).is_ok()
}

fn is_ident_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-')
}
