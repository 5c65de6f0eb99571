//! Byte-level port boundary.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use crate::serial::error::TransportError;

/// Raw byte transport under the framing layer. Implementations wrap a UART
/// driver, a pty, or a test double.
pub trait BytePort: Send + Sync {
    /// Write bytes out. The framing layer has already appended separators.
    fn send(&self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Drain everything currently received, non-blocking.
    fn drain(&self) -> Vec<u8>;
}

/// In-memory port for tests.
///
/// Bytes sent are recorded; optional auto-responses map an exact outbound
/// line to the line pushed back into the receive queue, emulating the peer.
#[derive(Default)]
pub struct MockPort {
    sent: Mutex<Vec<u8>>,
    rx: Mutex<VecDeque<u8>>,
    auto: Mutex<HashMap<String, String>>,
    separator: u8,
}

impl MockPort {
    pub fn new(separator: u8) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            rx: Mutex::new(VecDeque::new()),
            auto: Mutex::new(HashMap::new()),
            separator,
        }
    }

    /// Answer `request` lines with `response` from now on.
    pub fn respond_with(&self, request: &str, response: &str) {
        self.auto
            .lock()
            .insert(request.to_string(), response.to_string());
    }

    pub fn clear_responder(&self, request: &str) {
        self.auto.lock().remove(request);
    }

    /// Inject bytes as if the peer had sent them.
    pub fn push_rx(&self, bytes: &[u8]) {
        self.rx.lock().extend(bytes.iter().copied());
    }

    /// Everything sent so far, as a lossy string.
    pub fn sent_text(&self) -> String {
        String::from_utf8_lossy(&self.sent.lock()).into_owned()
    }
}

impl BytePort for MockPort {
    fn send(&self, bytes: &[u8]) -> Result<(), TransportError> {
        self.sent.lock().extend_from_slice(bytes);
        let auto = self.auto.lock();
        for line in bytes.split(|&b| b == self.separator) {
            if line.is_empty() {
                continue;
            }
            if let Some(response) = auto.get(&String::from_utf8_lossy(line).into_owned()) {
                let mut rx = self.rx.lock();
                rx.extend(response.as_bytes().iter().copied());
                rx.push_back(self.separator);
            }
        }
        Ok(())
    }

    fn drain(&self) -> Vec<u8> {
        self.rx.lock().drain(..).collect()
    }
}
