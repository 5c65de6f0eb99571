//! Location and field-value codecs shared by the mesh side and the serial
//! transport.
//!
//! A location is a local tangent-plane coordinate with decimeter-scale
//! integer components. On the wire it is the fixed-width form
//! `N±nnnnnE±nnnnnA±nnnnnFnnnUnnnnn`; the remaining field values are
//! `rgb` (RRGGBB hex), `level` (4-hex signed 16-bit), `onoff` (`ON`/`OFF`)
//! and `addr` (4-hex mesh address).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Value a location's `uncertainty` takes while the position is unknown.
pub const UNCERTAINTY_UNKNOWN: u16 = u16::MAX;

/// Local-frame location as carried by the mesh location model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalLocation {
    pub north: i16,
    pub east: i16,
    pub altitude: i16,
    pub floor: u8,
    pub uncertainty: u16,
}

impl Default for LocalLocation {
    fn default() -> Self {
        Self {
            north: 0,
            east: 0,
            altitude: 0,
            floor: 0,
            uncertainty: UNCERTAINTY_UNKNOWN,
        }
    }
}

/// Errors produced by the field-value codecs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationParseError {
    #[error("value has wrong length: expected {expected}, got {got}")]
    WrongLength { expected: usize, got: usize },
    #[error("missing '{0}' marker")]
    MissingMarker(char),
    #[error("invalid number in component '{0}'")]
    InvalidNumber(char),
    #[error("invalid hex value: {0}")]
    InvalidHex(String),
    #[error("invalid on/off value: {0}")]
    InvalidOnOff(String),
}

/// Wire length of the `loc` field value.
pub const LOC_STR_LEN: usize = 1 + 6 + 1 + 6 + 1 + 6 + 1 + 3 + 1 + 5;

impl LocalLocation {
    pub fn new(north: i16, east: i16) -> Self {
        Self {
            north,
            east,
            altitude: 0,
            floor: 0,
            uncertainty: 0,
        }
    }

    /// True once some estimator has produced a usable position.
    pub fn is_known(&self) -> bool {
        self.uncertainty != UNCERTAINTY_UNKNOWN
    }

    /// Planar distance to another location, in location units.
    pub fn distance_to(&self, other: &LocalLocation) -> f32 {
        let dn = f32::from(self.north) - f32::from(other.north);
        let de = f32::from(self.east) - f32::from(other.east);
        (dn.powi(2) + de.powi(2)).sqrt()
    }

    /// Encode as the fixed-width `loc` field value.
    pub fn to_field(&self) -> String {
        format!(
            "N{:+06}E{:+06}A{:+06}F{:03}U{:05}",
            self.north, self.east, self.altitude, self.floor, self.uncertainty
        )
    }

    /// Parse the fixed-width `loc` field value. Strict inverse of
    /// [`to_field`](Self::to_field).
    pub fn parse_field(s: &str) -> Result<Self, LocationParseError> {
        if s.len() != LOC_STR_LEN {
            return Err(LocationParseError::WrongLength {
                expected: LOC_STR_LEN,
                got: s.len(),
            });
        }
        let bytes = s.as_bytes();
        let marker = |idx: usize, ch: u8| {
            if bytes[idx] == ch {
                Ok(())
            } else {
                Err(LocationParseError::MissingMarker(ch as char))
            }
        };
        marker(0, b'N')?;
        marker(7, b'E')?;
        marker(14, b'A')?;
        marker(21, b'F')?;
        marker(25, b'U')?;

        let signed = |range: std::ops::Range<usize>, tag: char| {
            s[range]
                .parse::<i16>()
                .map_err(|_| LocationParseError::InvalidNumber(tag))
        };
        let north = signed(1..7, 'N')?;
        let east = signed(8..14, 'E')?;
        let altitude = signed(15..21, 'A')?;
        let floor = s[22..25]
            .parse::<u8>()
            .map_err(|_| LocationParseError::InvalidNumber('F'))?;
        let uncertainty = s[26..31]
            .parse::<u16>()
            .map_err(|_| LocationParseError::InvalidNumber('U'))?;
        Ok(Self {
            north,
            east,
            altitude,
            floor,
            uncertainty,
        })
    }
}

/// Color value carried by the `rgb` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rgb {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl Rgb {
    pub fn new(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }

    pub fn to_field(&self) -> String {
        format!("{:02x}{:02x}{:02x}", self.red, self.green, self.blue)
    }

    pub fn parse_field(s: &str) -> Result<Self, LocationParseError> {
        if s.len() != 6 {
            return Err(LocationParseError::WrongLength {
                expected: 6,
                got: s.len(),
            });
        }
        // Byte-offset slicing below requires every char to be one byte.
        if !s.is_ascii() {
            return Err(LocationParseError::InvalidHex(s.to_string()));
        }
        let component = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&s[range], 16)
                .map_err(|_| LocationParseError::InvalidHex(s.to_string()))
        };
        Ok(Self {
            red: component(0..2)?,
            green: component(2..4)?,
            blue: component(4..6)?,
        })
    }
}

/// Encode a `level` field value (4 hex digits carrying a signed 16-bit).
pub fn level_to_field(level: i16) -> String {
    format!("{:04x}", level as u16)
}

/// Parse a `level` field value.
pub fn level_from_field(s: &str) -> Result<i16, LocationParseError> {
    if s.len() != 4 {
        return Err(LocationParseError::WrongLength {
            expected: 4,
            got: s.len(),
        });
    }
    u16::from_str_radix(s, 16)
        .map(|v| v as i16)
        .map_err(|_| LocationParseError::InvalidHex(s.to_string()))
}

/// Encode an `onoff` field value.
pub fn onoff_to_field(on: bool) -> &'static str {
    if on {
        "ON"
    } else {
        "OFF"
    }
}

/// Parse an `onoff` field value.
pub fn onoff_from_field(s: &str) -> Result<bool, LocationParseError> {
    match s {
        "ON" => Ok(true),
        "OFF" => Ok(false),
        other => Err(LocationParseError::InvalidOnOff(other.to_string())),
    }
}

/// Encode an `addr` field value (4-hex mesh address).
pub fn addr_to_field(addr: u16) -> String {
    format!("{:04x}", addr)
}

/// Parse an `addr` field value.
pub fn addr_from_field(s: &str) -> Result<u16, LocationParseError> {
    if s.len() != 4 {
        return Err(LocationParseError::WrongLength {
            expected: 4,
            got: s.len(),
        });
    }
    u16::from_str_radix(s, 16).map_err(|_| LocationParseError::InvalidHex(s.to_string()))
}
