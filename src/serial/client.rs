//! Requesting side of the field transport.
//!
//! Every fetched value lands in a cache stamped with its arrival tick. A
//! fresh hit is served from the cache; a stale hit is served immediately
//! while a re-fetch goes out in the background (the next read observes the
//! updated value); a miss blocks until the response arrives or the response
//! timeout fires.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::serial::error::TransportError;
use crate::serial::frame::FrameReader;
use crate::serial::message::{FieldName, SerialRequest, SerialResponse};
use crate::serial::port::BytePort;
use crate::utils::clock::{Clock, Ticks};
use crate::utils::config::TransportConfig;

const POLL_STEP_MS: u64 = 5;

struct CacheEntry {
    arrival: Ticks,
    value: String,
}

pub struct SerialClient {
    port: Arc<dyn BytePort>,
    clock: Arc<dyn Clock>,
    config: TransportConfig,
    cache: Mutex<HashMap<String, CacheEntry>>,
    reader: Mutex<FrameReader>,
    // All outbound frames go through one writer.
    write_gate: Mutex<()>,
}

impl SerialClient {
    pub fn new(config: TransportConfig, port: Arc<dyn BytePort>, clock: Arc<dyn Clock>) -> Self {
        let reader = FrameReader::new(config.separator, config.max_frame_len);
        Self {
            port,
            clock,
            config,
            cache: Mutex::new(HashMap::new()),
            reader: Mutex::new(reader),
            write_gate: Mutex::new(()),
        }
    }

    fn send_frame(&self, frame: &str) -> Result<(), TransportError> {
        let _writer = self.write_gate.lock();
        let mut bytes = frame.as_bytes().to_vec();
        bytes.push(self.config.separator);
        self.port.send(&bytes)
    }

    fn lock_cache(&self) -> Result<parking_lot::MutexGuard<'_, HashMap<String, CacheEntry>>, TransportError> {
        self.cache
            .try_lock_for(Duration::from_millis(self.config.lock_timeout_ms))
            .ok_or(TransportError::LockTimeout)
    }

    /// Drain the port and fold completed responses into the cache.
    fn pump(&self, cache: &mut HashMap<String, CacheEntry>) {
        let received = self.port.drain();
        if received.is_empty() {
            return;
        }
        let frames = self.reader.lock().push_bytes(&received);
        let now = self.clock.now();
        for frame in frames {
            match SerialResponse::parse(&frame) {
                Ok(SerialResponse::Value { field, value }) => {
                    cache.insert(field.to_string(), CacheEntry { arrival: now, value });
                }
                Ok(SerialResponse::Fail) => {
                    debug!("peer answered FAIL");
                }
                Err(_) => {
                    warn!(frame, "dropping malformed response frame");
                }
            }
        }
    }

    /// Read a field value, through the cache.
    pub fn get_field(&self, field: &FieldName) -> Result<String, TransportError> {
        let key = field.to_string();
        let request = SerialRequest::Get {
            field: field.clone(),
        };

        {
            let mut cache = self.lock_cache()?;
            self.pump(&mut cache);
            if let Some(entry) = cache.get(&key) {
                let age = self.clock.now().saturating_sub(entry.arrival);
                if age <= self.config.cache_freshness_ms {
                    return Ok(entry.value.clone());
                }
                // stale: serve the old value, refresh in the background
                let stale = entry.value.clone();
                drop(cache);
                self.send_frame(&request.to_string())?;
                return Ok(stale);
            }
        }

        // first fetch of this field: ask and wait
        self.send_frame(&request.to_string())?;
        let deadline = self.clock.now() + self.config.response_timeout_ms;
        loop {
            {
                let mut cache = self.lock_cache()?;
                self.pump(&mut cache);
                if let Some(entry) = cache.get(&key) {
                    return Ok(entry.value.clone());
                }
            }
            if self.clock.now() >= deadline {
                return Err(TransportError::Timeout);
            }
            self.clock.sleep(Duration::from_millis(POLL_STEP_MS));
        }
    }

    /// Write a field value. Fire-and-forget, the peer does not acknowledge.
    pub fn put_field(&self, field: &FieldName, value: &str) -> Result<(), TransportError> {
        let request = SerialRequest::Put {
            field: field.clone(),
            value: value.to_string(),
        };
        self.send_frame(&request.to_string())
    }

    /// Drop any cached value for the field so the next read goes to the
    /// peer.
    pub fn invalidate(&self, field: &FieldName) -> Result<(), TransportError> {
        self.lock_cache()?.remove(&field.to_string());
        Ok(())
    }

    #[cfg(test)]
    fn cache_for_test(&self) -> &Mutex<HashMap<String, CacheEntry>> {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::port::MockPort;
    use crate::utils::clock::ManualClock;

    fn client_with_mock(config: TransportConfig) -> (SerialClient, Arc<MockPort>, ManualClock) {
        let port = Arc::new(MockPort::new(config.separator));
        let clock = ManualClock::new();
        let client = SerialClient::new(
            config,
            Arc::clone(&port) as Arc<dyn BytePort>,
            Arc::new(clock.clone()),
        );
        (client, port, clock)
    }

    fn test_config() -> TransportConfig {
        TransportConfig {
            cache_freshness_ms: 1_000,
            lock_timeout_ms: 50,
            response_timeout_ms: 100,
            ..TransportConfig::default()
        }
    }

    #[test]
    fn test_first_fetch_waits_for_response() {
        let (client, port, _clock) = client_with_mock(test_config());
        port.respond_with("GET rgb", "rgb=ff00aa");
        let value = client.get_field(&FieldName::local("rgb")).unwrap();
        assert_eq!(value, "ff00aa");
    }

    #[test]
    fn test_first_fetch_times_out_without_peer() {
        let (client, _port, clock) = client_with_mock(test_config());
        let before = clock.now();
        let err = client.get_field(&FieldName::local("rgb")).unwrap_err();
        assert_eq!(err, TransportError::Timeout);
        // virtual time advanced to the deadline, no further
        assert!(clock.now() - before >= 100);
    }

    #[test]
    fn test_fresh_hit_sends_nothing() {
        let (client, port, _clock) = client_with_mock(test_config());
        port.respond_with("GET rgb", "rgb=ff00aa");
        client.get_field(&FieldName::local("rgb")).unwrap();
        let sent_before = port.sent_text();
        client.get_field(&FieldName::local("rgb")).unwrap();
        assert_eq!(port.sent_text(), sent_before);
    }

    #[test]
    fn test_stale_hit_served_while_revalidating() {
        let (client, port, clock) = client_with_mock(test_config());
        let field = FieldName::local("rgb");
        port.respond_with("GET rgb", "rgb=ff00aa");
        assert_eq!(client.get_field(&field).unwrap(), "ff00aa");

        clock.advance(2_000);
        port.respond_with("GET rgb", "rgb=00ff00");
        // stale read still returns the old value
        assert_eq!(client.get_field(&field).unwrap(), "ff00aa");
        // the refresh went out and its response lands on the next read
        assert_eq!(client.get_field(&field).unwrap(), "00ff00");
    }

    #[test]
    fn test_addressed_fields_cached_separately() {
        let (client, port, _clock) = client_with_mock(test_config());
        port.respond_with("GET 00a1:rgb", "00a1:rgb=111111");
        port.respond_with("GET 00a2:rgb", "00a2:rgb=222222");
        assert_eq!(
            client.get_field(&FieldName::addressed(0x00a1, "rgb")).unwrap(),
            "111111"
        );
        assert_eq!(
            client.get_field(&FieldName::addressed(0x00a2, "rgb")).unwrap(),
            "222222"
        );
    }

    #[test]
    fn test_put_is_fire_and_forget() {
        let (client, port, _clock) = client_with_mock(test_config());
        client
            .put_field(&FieldName::addressed(0x00a1, "rgb"), "ff00aa")
            .unwrap();
        assert_eq!(port.sent_text(), "PUT 00a1:rgb ff00aa\n");
    }

    #[test]
    fn test_invalidate_forces_refetch() {
        let (client, port, _clock) = client_with_mock(test_config());
        let field = FieldName::local("rgb");
        port.respond_with("GET rgb", "rgb=ff00aa");
        assert_eq!(client.get_field(&field).unwrap(), "ff00aa");
        port.respond_with("GET rgb", "rgb=00ff00");
        // still fresh, so only invalidation gets the new value seen
        client.invalidate(&field).unwrap();
        assert_eq!(client.get_field(&field).unwrap(), "00ff00");
    }

    #[test]
    fn test_contended_cache_lock_times_out() {
        let (client, _port, _clock) = client_with_mock(test_config());
        let _held = client.cache_for_test().lock();
        assert_eq!(
            client.get_field(&FieldName::local("rgb")).unwrap_err(),
            TransportError::LockTimeout
        );
    }

    #[test]
    fn test_fail_response_does_not_populate_cache() {
        let (client, port, _clock) = client_with_mock(test_config());
        port.respond_with("GET nosuch", "FAIL");
        let err = client.get_field(&FieldName::local("nosuch")).unwrap_err();
        assert_eq!(err, TransportError::Timeout);
    }
}
