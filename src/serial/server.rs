//! Serving side of the field transport.
//!
//! The server fronts one mesh node: it owns a field store keyed by mesh
//! address, answers `GET`s from it and applies `PUT`s to it. Requests with
//! no address prefix fall back to the node's own address. The literal
//! `addr` field always answers the node's own address, whatever is stored.

use std::collections::HashMap;
use std::sync::mpsc::Sender;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::core::location::addr_to_field;
use crate::serial::error::TransportError;
use crate::serial::frame::FrameReader;
use crate::serial::message::{FieldName, SerialRequest, SerialResponse};
use crate::serial::port::BytePort;
use crate::utils::config::TransportConfig;

/// Requests surfaced to an application-level handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// A peer asked for a field. When an event sink is installed the
    /// application owns the answer; the server does not auto-respond.
    GetRequested { addr: u16, field: String },
    /// A peer wrote a field; the store has already been updated.
    FieldChanged {
        addr: u16,
        field: String,
        value: String,
    },
}

pub struct SerialServer {
    own_addr: u16,
    config: TransportConfig,
    fields: Mutex<HashMap<u16, HashMap<String, String>>>,
    reader: Mutex<FrameReader>,
    events: Mutex<Option<Sender<ServerEvent>>>,
    write_gate: Mutex<()>,
}

impl SerialServer {
    pub fn new(config: TransportConfig, own_addr: u16) -> Self {
        let reader = FrameReader::new(config.separator, config.max_frame_len);
        Self {
            own_addr,
            config,
            fields: Mutex::new(HashMap::new()),
            reader: Mutex::new(reader),
            events: Mutex::new(None),
            write_gate: Mutex::new(()),
        }
    }

    pub fn own_addr(&self) -> u16 {
        self.own_addr
    }

    /// Surface requests to the application instead of auto-answering GETs.
    pub fn set_event_sink(&self, sender: Sender<ServerEvent>) {
        *self.events.lock() = Some(sender);
    }

    fn lock_fields(
        &self,
    ) -> Result<parking_lot::MutexGuard<'_, HashMap<u16, HashMap<String, String>>>, TransportError>
    {
        self.fields
            .try_lock_for(Duration::from_millis(self.config.lock_timeout_ms))
            .ok_or(TransportError::LockTimeout)
    }

    /// Store a value the server will answer GETs with.
    pub fn set_field(&self, addr: Option<u16>, name: &str, value: &str) -> Result<(), TransportError> {
        let addr = addr.unwrap_or(self.own_addr);
        self.lock_fields()?
            .entry(addr)
            .or_default()
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    /// Read a stored value back.
    pub fn field(&self, addr: Option<u16>, name: &str) -> Result<Option<String>, TransportError> {
        let addr = addr.unwrap_or(self.own_addr);
        Ok(self
            .lock_fields()?
            .get(&addr)
            .and_then(|fields| fields.get(name))
            .cloned())
    }

    /// Handle one complete frame, returning the response frame to send, if
    /// any. Malformed frames answer `FAIL`.
    pub fn handle_frame(&self, frame: &str) -> Result<Option<String>, TransportError> {
        let request = match SerialRequest::parse(frame) {
            Ok(request) => request,
            Err(err) => {
                warn!(frame, %err, "malformed request frame");
                return Ok(Some(SerialResponse::Fail.to_string()));
            }
        };
        match request {
            SerialRequest::Get { field } => self.handle_get(field),
            SerialRequest::Put { field, value } => {
                self.handle_put(field, value)?;
                Ok(None)
            }
        }
    }

    fn handle_get(&self, field: FieldName) -> Result<Option<String>, TransportError> {
        // `addr` is answered unconditionally so a peer can bootstrap
        // addressing before anything else works.
        if field.name == "addr" {
            let response = SerialResponse::Value {
                field: field.clone(),
                value: addr_to_field(self.own_addr),
            };
            return Ok(Some(response.to_string()));
        }

        let addr = field.addr.unwrap_or(self.own_addr);
        if let Some(sender) = self.events.lock().as_ref() {
            let _ = sender.send(ServerEvent::GetRequested {
                addr,
                field: field.name.clone(),
            });
            return Ok(None);
        }

        match self.field(Some(addr), &field.name)? {
            Some(value) => Ok(Some(SerialResponse::Value { field, value }.to_string())),
            None => {
                debug!(%field, "GET for unknown field");
                Ok(Some(SerialResponse::Fail.to_string()))
            }
        }
    }

    fn handle_put(&self, field: FieldName, value: String) -> Result<(), TransportError> {
        let addr = field.addr.unwrap_or(self.own_addr);
        self.set_field(Some(addr), &field.name, &value)?;
        if let Some(sender) = self.events.lock().as_ref() {
            let _ = sender.send(ServerEvent::FieldChanged {
                addr,
                field: field.name,
                value,
            });
        }
        Ok(())
    }

    /// Drain the port, handle every completed frame and write the answers.
    pub fn service(&self, port: &dyn BytePort) -> Result<(), TransportError> {
        let received = port.drain();
        if received.is_empty() {
            return Ok(());
        }
        let frames = self.reader.lock().push_bytes(&received);
        for frame in frames {
            if let Some(response) = self.handle_frame(&frame)? {
                let _writer = self.write_gate.lock();
                let mut bytes = response.into_bytes();
                bytes.push(self.config.separator);
                port.send(&bytes)?;
            }
        }
        Ok(())
    }
}
