//! Defines shared data structures for the Bluetooth module.

use serde::Serialize;
use uuid::Uuid;

/// Lifecycle of the single managed connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    DiscoveringServices,
    Ready,
}

/// A peripheral reported by the scanner
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredPeripheral {
    /// MAC address, or the platform id when no address is exposed (macOS)
    pub address: String,
    /// The advertised name, if any
    pub name: Option<String>,
    /// The signal strength (RSSI) of the advertisement
    pub rssi: i16,
}

impl DiscoveredPeripheral {
    pub fn new(address: String, name: Option<String>, rssi: i16) -> Self {
        Self { address, name, rssi }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unknown Device")
    }
}

/// Identifies one characteristic of the connected peripheral
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CharacteristicId {
    pub service: Uuid,
    pub characteristic: Uuid,
}

impl CharacteristicId {
    pub fn new(service: Uuid, characteristic: Uuid) -> Self {
        Self { service, characteristic }
    }
}

impl std::fmt::Display for CharacteristicId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.service, self.characteristic)
    }
}

/// Characteristic as reported by the transport, before filtering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCharacteristic {
    pub uuid: Uuid,
    /// GATT property bitmask
    pub properties: u8,
}

/// Service as reported by the transport, before filtering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawService {
    pub uuid: Uuid,
    pub characteristics: Vec<RawCharacteristic>,
}

/// Outcome reported by the transport for discovery and reads
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GattStatus {
    Success,
    Failure(String),
}

impl GattStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Everything the transport reports back to the connection task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    LinkUp,
    LinkDown,
    DiscoveryComplete {
        status: GattStatus,
        services: Vec<RawService>,
    },
    ReadComplete {
        id: CharacteristicId,
        status: GattStatus,
        value: Vec<u8>,
    },
}

/// Progress of the initial value reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ReadProgress {
    /// Reads queued after the last discovery
    pub total: usize,
    /// Reads handed to the transport, accepted or not
    pub attempted: usize,
    /// Reads that completed with a value
    pub succeeded: usize,
    /// Whether the pipeline is still working through its queue
    pub draining: bool,
}
