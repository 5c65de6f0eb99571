//! Device directory: every mesh node the local one knows about.
//!
//! A device is plain data; all field traffic goes through the shared
//! [`SerialClient`], qualified by the device's mesh address. Stations also
//! carry a ranging point so distances can be measured toward them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::constants::ADDR_BROADCAST;
use crate::core::location::{
    addr_from_field, level_from_field, level_to_field, LocalLocation, LocationParseError, Rgb,
};
use crate::ranging::{RangingError, RangingLogEntry, RangingResult, RangingStore};
use crate::serial::{FieldName, SerialClient, TransportError};
use crate::utils::clock::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Mobile,
    Station,
}

/// One known mesh node.
#[derive(Debug, Clone)]
pub struct Device {
    pub id: u32,
    pub kind: DeviceKind,
    pub mesh_addr: u16,
    /// Ranging point toward this device; stations only.
    pub point_id: Option<u32>,
    /// A fixed location is configured, estimators must not overwrite it.
    pub fixed_location: bool,
    /// Talk to the serving node without an address prefix. Set for the
    /// local device when no valid mesh address could be obtained.
    local_commands: bool,
}

impl Device {
    fn field(&self, name: &str) -> FieldName {
        if self.local_commands {
            FieldName::local(name)
        } else {
            FieldName::addressed(self.mesh_addr, name)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    #[error("unknown device {0}")]
    UnknownDevice(u32),
    /// No mesh address could be obtained from the serving node or the
    /// persisted fallback.
    #[error("no mesh address available for the local device")]
    AddressUnavailable,
    #[error("device {0} has no ranging point")]
    NoRangingPoint(u32),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Codec(#[from] LocationParseError),
    #[error(transparent)]
    Ranging(#[from] RangingError),
}

/// Persistence boundary for the local mesh address. Firmware backs this
/// with NVS; tests use an in-memory store.
pub trait AddressStore: Send + Sync {
    fn load_addr(&self) -> Option<u16>;
    fn save_addr(&self, addr: u16);
}

/// In-memory [`AddressStore`].
#[derive(Default)]
pub struct MemoryAddressStore {
    addr: parking_lot::Mutex<Option<u16>>,
}

impl MemoryAddressStore {
    pub fn with_addr(addr: u16) -> Self {
        Self {
            addr: parking_lot::Mutex::new(Some(addr)),
        }
    }
}

impl AddressStore for MemoryAddressStore {
    fn load_addr(&self) -> Option<u16> {
        *self.addr.lock()
    }

    fn save_addr(&self, addr: u16) {
        *self.addr.lock() = Some(addr);
    }
}

pub struct DeviceDirectory {
    devices: RwLock<HashMap<u32, Device>>,
    next_id: parking_lot::Mutex<u32>,
    local_id: parking_lot::Mutex<Option<u32>>,
    client: Arc<SerialClient>,
    ranging: Arc<RangingStore>,
}

impl DeviceDirectory {
    pub fn new(client: Arc<SerialClient>, ranging: Arc<RangingStore>) -> Self {
        Self {
            devices: RwLock::new(HashMap::new()),
            next_id: parking_lot::Mutex::new(0),
            local_id: parking_lot::Mutex::new(None),
            client,
            ranging,
        }
    }

    /// Register a remote device. Stations get a ranging point on the given
    /// channel; ids are stable for the directory's lifetime.
    pub fn add_device(&self, kind: DeviceKind, mac: [u8; 6], channel: u8, mesh_addr: u16) -> u32 {
        let point_id = match kind {
            DeviceKind::Station => Some(self.ranging.add_point(mac, channel)),
            DeviceKind::Mobile => None,
        };
        let mut next = self.next_id.lock();
        let id = *next;
        *next += 1;
        let device = Device {
            id,
            kind,
            mesh_addr,
            point_id,
            fixed_location: false,
            local_commands: false,
        };
        self.devices.write().insert(id, device);
        debug!(id, ?kind, mesh_addr, "device registered");
        id
    }

    /// Bootstrap the local device's mesh address and register it.
    ///
    /// The serving node is asked for `addr` up to `retries` times with
    /// `backoff` between attempts; if that never yields a parsable address
    /// the persisted one is used. A fresh address is persisted for the next
    /// boot. With neither source available this fails and the node cannot
    /// participate in the mesh.
    pub fn init_local_device(
        &self,
        kind: DeviceKind,
        mac: [u8; 6],
        channel: u8,
        fixed_location: Option<LocalLocation>,
        store: &dyn AddressStore,
        clock: &dyn Clock,
        retries: u32,
        backoff: Duration,
    ) -> Result<u32, DirectoryError> {
        let mut mesh_addr = None;
        for attempt in 0..retries {
            match self.client.get_field(&FieldName::local("addr")) {
                Ok(value) => match addr_from_field(&value) {
                    Ok(addr) => {
                        info!(addr, "mesh address obtained from serving node");
                        mesh_addr = Some(addr);
                        break;
                    }
                    Err(err) => warn!(%err, value, "unparsable addr response"),
                },
                Err(err) => debug!(attempt, %err, "addr query failed"),
            }
            clock.sleep(backoff);
        }

        let from_node = mesh_addr.is_some();
        if mesh_addr.is_none() {
            mesh_addr = store.load_addr();
            if let Some(addr) = mesh_addr {
                info!(addr, "using persisted mesh address");
            }
        }
        let Some(addr) = mesh_addr else {
            return Err(DirectoryError::AddressUnavailable);
        };
        if from_node {
            store.save_addr(addr);
        }

        let point_id = match kind {
            DeviceKind::Station => Some(self.ranging.add_point(mac, channel)),
            DeviceKind::Mobile => None,
        };
        let mut next = self.next_id.lock();
        let id = *next;
        *next += 1;
        let device = Device {
            id,
            kind,
            mesh_addr: addr,
            point_id,
            fixed_location: fixed_location.is_some(),
            local_commands: !from_node,
        };
        self.devices.write().insert(id, device);
        *self.local_id.lock() = Some(id);
        if let Some(location) = fixed_location {
            self.set_location(id, &location)?;
        }
        Ok(id)
    }

    pub fn local_id(&self) -> Option<u32> {
        *self.local_id.lock()
    }

    pub fn device(&self, id: u32) -> Result<Device, DirectoryError> {
        self.devices
            .read()
            .get(&id)
            .cloned()
            .ok_or(DirectoryError::UnknownDevice(id))
    }

    /// Ids of every registered station, the local device excluded.
    pub fn station_ids(&self) -> Vec<u32> {
        let local = self.local_id();
        let mut ids: Vec<u32> = self
            .devices
            .read()
            .values()
            .filter(|d| d.kind == DeviceKind::Station && Some(d.id) != local)
            .map(|d| d.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn set_rgb(&self, id: u32, rgb: Rgb) -> Result<(), DirectoryError> {
        let device = self.device(id)?;
        let field = device.field("rgb");
        self.client.put_field(&field, &rgb.to_field())?;
        // the cached value no longer matches the mesh
        self.client.invalidate(&field)?;
        Ok(())
    }

    pub fn get_rgb(&self, id: u32) -> Result<Rgb, DirectoryError> {
        let device = self.device(id)?;
        let value = self.client.get_field(&device.field("rgb"))?;
        Ok(Rgb::parse_field(&value)?)
    }

    /// Set every node's color in one broadcast write.
    pub fn set_rgb_all(&self, rgb: Rgb) -> Result<(), DirectoryError> {
        self.client
            .put_field(&FieldName::addressed(ADDR_BROADCAST, "rgb"), &rgb.to_field())?;
        Ok(())
    }

    pub fn set_location(&self, id: u32, location: &LocalLocation) -> Result<(), DirectoryError> {
        let device = self.device(id)?;
        let field = device.field("loc");
        self.client.put_field(&field, &location.to_field())?;
        self.client.invalidate(&field)?;
        Ok(())
    }

    pub fn get_location(&self, id: u32) -> Result<LocalLocation, DirectoryError> {
        let device = self.device(id)?;
        let value = self.client.get_field(&device.field("loc"))?;
        Ok(LocalLocation::parse_field(&value)?)
    }

    pub fn set_level(&self, id: u32, level: i16) -> Result<(), DirectoryError> {
        let device = self.device(id)?;
        let field = device.field("level");
        self.client.put_field(&field, &level_to_field(level))?;
        self.client.invalidate(&field)?;
        Ok(())
    }

    pub fn get_level(&self, id: u32) -> Result<i16, DirectoryError> {
        let device = self.device(id)?;
        let value = self.client.get_field(&device.field("level"))?;
        Ok(level_from_field(&value)?)
    }

    pub fn set_level_all(&self, level: i16) -> Result<(), DirectoryError> {
        self.client.put_field(
            &FieldName::addressed(ADDR_BROADCAST, "level"),
            &level_to_field(level),
        )?;
        Ok(())
    }

    /// Run one ranging measurement toward a station.
    pub fn measure_distance(&self, id: u32) -> Result<RangingResult, DirectoryError> {
        let device = self.device(id)?;
        let point_id = device.point_id.ok_or(DirectoryError::NoRangingPoint(id))?;
        Ok(self.ranging.measure(point_id)?)
    }

    /// Most recent filtered measurement toward a station, if any.
    pub fn last_distance(&self, id: u32) -> Result<Option<RangingLogEntry>, DirectoryError> {
        let device = self.device(id)?;
        let point_id = device.point_id.ok_or(DirectoryError::NoRangingPoint(id))?;
        Ok(self.ranging.last_distance(point_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranging::{FtmInitiator, FtmResultSlot, MockFtm};
    use crate::serial::{BytePort, MockPort};
    use crate::utils::clock::ManualClock;
    use crate::utils::config::{RangingConfig, TransportConfig};

    struct Fixture {
        directory: DeviceDirectory,
        port: Arc<MockPort>,
        ftm: Arc<MockFtm>,
        clock: ManualClock,
    }

    fn fixture() -> Fixture {
        let transport = TransportConfig {
            response_timeout_ms: 50,
            ..TransportConfig::default()
        };
        let ranging_config = RangingConfig {
            timeout_ms: 20,
            ..RangingConfig::default()
        };
        let clock = ManualClock::new();
        let port = Arc::new(MockPort::new(transport.separator));
        let client = Arc::new(SerialClient::new(
            transport,
            Arc::clone(&port) as Arc<dyn BytePort>,
            Arc::new(clock.clone()),
        ));
        let slot = Arc::new(FtmResultSlot::new());
        let ftm = Arc::new(MockFtm::new(Arc::clone(&slot)));
        let ranging = Arc::new(RangingStore::new(
            ranging_config,
            Arc::clone(&ftm) as Arc<dyn FtmInitiator>,
            slot,
            Arc::new(clock.clone()),
        ));
        Fixture {
            directory: DeviceDirectory::new(client, ranging),
            port,
            ftm,
            clock,
        }
    }

    #[test]
    fn test_station_gets_ranging_point() {
        let f = fixture();
        let station = f.directory.add_device(DeviceKind::Station, [1; 6], 1, 0x00a1);
        let mobile = f.directory.add_device(DeviceKind::Mobile, [2; 6], 1, 0x00a2);
        assert!(f.directory.device(station).unwrap().point_id.is_some());
        assert!(f.directory.device(mobile).unwrap().point_id.is_none());
        assert_eq!(
            f.directory.last_distance(mobile).unwrap_err(),
            DirectoryError::NoRangingPoint(mobile)
        );
    }

    #[test]
    fn test_field_accessors_are_address_qualified() {
        let f = fixture();
        let id = f.directory.add_device(DeviceKind::Station, [1; 6], 1, 0x00a1);
        f.directory.set_rgb(id, Rgb::new(0xff, 0x00, 0xaa)).unwrap();
        assert_eq!(f.port.sent_text(), "PUT 00a1:rgb ff00aa\n");

        f.port.respond_with("GET 00a1:level", "00a1:level=fffe");
        assert_eq!(f.directory.get_level(id).unwrap(), -2);
    }

    #[test]
    fn test_broadcast_setters_use_broadcast_address() {
        let f = fixture();
        f.directory.set_rgb_all(Rgb::new(1, 2, 3)).unwrap();
        f.directory.set_level_all(7).unwrap();
        assert_eq!(f.port.sent_text(), "PUT ffff:rgb 010203\nPUT ffff:level 0007\n");
    }

    #[test]
    fn test_set_level_invalidates_cached_value() {
        let f = fixture();
        let id = f.directory.add_device(DeviceKind::Station, [1; 6], 1, 0x00a1);
        f.port.respond_with("GET 00a1:level", "00a1:level=0001");
        assert_eq!(f.directory.get_level(id).unwrap(), 1);
        // the peer echoes the write back from its field store
        f.port.respond_with("GET 00a1:level", "00a1:level=0002");
        f.directory.set_level(id, 2).unwrap();
        // a fresh cache entry would have served the old value
        assert_eq!(f.directory.get_level(id).unwrap(), 2);
    }

    #[test]
    fn test_get_location_round_trips_codec() {
        let f = fixture();
        let id = f.directory.add_device(DeviceKind::Station, [1; 6], 1, 0x00a1);
        let loc = LocalLocation {
            north: 30,
            east: -40,
            altitude: 0,
            floor: 1,
            uncertainty: 5,
        };
        f.port
            .respond_with("GET 00a1:loc", &format!("00a1:loc={}", loc.to_field()));
        assert_eq!(f.directory.get_location(id).unwrap(), loc);
    }

    #[test]
    fn test_local_init_uses_served_address_and_persists_it() {
        let f = fixture();
        f.port.respond_with("GET addr", "addr=00b2");
        let store = MemoryAddressStore::default();
        let id = f
            .directory
            .init_local_device(
                DeviceKind::Mobile,
                [9; 6],
                1,
                None,
                &store,
                &f.clock,
                3,
                Duration::from_millis(10),
            )
            .unwrap();
        assert_eq!(f.directory.device(id).unwrap().mesh_addr, 0x00b2);
        assert_eq!(store.load_addr(), Some(0x00b2));
        assert_eq!(f.directory.local_id(), Some(id));
    }

    #[test]
    fn test_local_init_falls_back_to_persisted_address() {
        let f = fixture();
        let store = MemoryAddressStore::with_addr(0x0042);
        let id = f
            .directory
            .init_local_device(
                DeviceKind::Mobile,
                [9; 6],
                1,
                None,
                &store,
                &f.clock,
                2,
                Duration::from_millis(10),
            )
            .unwrap();
        let device = f.directory.device(id).unwrap();
        assert_eq!(device.mesh_addr, 0x0042);
        // without a served address, commands stay unaddressed
        f.directory.set_level(id, 1).unwrap();
        assert!(f.port.sent_text().ends_with("PUT level 0001\n"));
    }

    #[test]
    fn test_local_init_exhaustion_is_fatal() {
        let f = fixture();
        let store = MemoryAddressStore::default();
        let before = f.clock.now();
        let err = f
            .directory
            .init_local_device(
                DeviceKind::Mobile,
                [9; 6],
                1,
                None,
                &store,
                &f.clock,
                3,
                Duration::from_millis(1_000),
            )
            .unwrap_err();
        assert_eq!(err, DirectoryError::AddressUnavailable);
        // one backoff per attempt
        assert!(f.clock.now() - before >= 3_000);
    }

    #[test]
    fn test_fixed_location_is_published_on_init() {
        let f = fixture();
        f.port.respond_with("GET addr", "addr=00b2");
        let store = MemoryAddressStore::default();
        let fixed = LocalLocation::new(10, 20);
        let id = f
            .directory
            .init_local_device(
                DeviceKind::Station,
                [9; 6],
                1,
                Some(fixed),
                &store,
                &f.clock,
                3,
                Duration::from_millis(10),
            )
            .unwrap();
        assert!(f.directory.device(id).unwrap().fixed_location);
        assert!(f
            .port
            .sent_text()
            .contains(&format!("PUT 00b2:loc {}", fixed.to_field())));
    }

    #[test]
    fn test_measure_distance_flows_through_ranging() {
        let f = fixture();
        let id = f.directory.add_device(DeviceKind::Station, [1; 6], 1, 0x00a1);
        f.ftm.push_success(1000, -42);
        let result = f.directory.measure_distance(id).unwrap();
        assert!(result.distance_cm > 0);
        assert!(f.directory.last_distance(id).unwrap().is_some());
    }
}
