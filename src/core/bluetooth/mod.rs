//! Bluetooth functionality for the GATT inspector
//! This module handles all bluetooth operations including scanning,
//! connecting, discovering services and reading characteristics.

pub mod bluest_transport;
pub mod connection;
pub mod constants;
pub mod manager;
pub mod read_queue;
pub mod scanner;
pub mod transport;
pub mod types;

// Re-export types that should be publicly accessible
pub use bluest_transport::{BluestLink, BluestTransport, DeviceRegistry};
pub use connection::{ConnectionStateMachine, ServiceSnapshot};
pub use manager::BluetoothManager;
pub use read_queue::ReadPipeline;
pub use scanner::{BluetoothScanner, ScanResults};
pub use transport::{EventSink, Transport};
pub use types::{
    CharacteristicId, ConnectionState, DiscoveredPeripheral, GattStatus, RawCharacteristic,
    RawService, ReadProgress, TransportEvent,
};
