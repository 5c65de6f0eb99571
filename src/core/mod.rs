//! Core value types shared by every subsystem.

pub mod constants;
pub mod location;
pub mod types;

pub use constants::*;
pub use location::{LocalLocation, LocationParseError, Rgb};
pub use types::{Anchor, Position, Solution};
