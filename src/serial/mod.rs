//! Line-oriented serial field transport.
//!
//! Peers exchange `GET`/`PUT` commands and `field=value` responses as
//! separator-terminated text frames. The client side keeps a
//! freshness-stamped value cache; the server side owns the field store and
//! answers on behalf of the mesh node it fronts.

mod client;
mod error;
mod frame;
mod message;
mod port;
mod server;

pub use client::SerialClient;
pub use error::{FieldParseError, TransportError};
pub use frame::FrameReader;
pub use message::{FieldName, SerialRequest, SerialResponse};
pub use port::{BytePort, MockPort};
pub use server::{SerialServer, ServerEvent};
