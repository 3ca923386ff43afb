//! Core functionality for the GATT inspector
//! Bluetooth plumbing, the GATT topology model and value rendering.

pub mod bluetooth;
pub mod formatter;
pub mod gatt;

// Re-export commonly used types
pub use bluetooth::BluetoothManager;
pub use formatter::{DataType, Endianness, format_value};
pub use gatt::{CharacteristicInfo, CharacteristicProperty, ServiceInfo};
