//! Constants used throughout the application
//! This module contains the well-known UUIDs, GATT property bits and
//! default tuning values.

use uuid::Uuid;

/// Standard Bluetooth Service UUIDs
pub const UUID_GENERIC_ACCESS_SERVICE: Uuid = Uuid::from_u128(0x00001800_0000_1000_8000_00805f9b34fb);
pub const UUID_GENERIC_ATTRIBUTE_SERVICE: Uuid = Uuid::from_u128(0x00001801_0000_1000_8000_00805f9b34fb);
pub const UUID_BATTERY_SERVICE: Uuid = Uuid::from_u128(0x0000180f_0000_1000_8000_00805f9b34fb);

/// Standard Bluetooth Characteristic UUIDs
pub const UUID_DEVICE_NAME: Uuid = Uuid::from_u128(0x00002a00_0000_1000_8000_00805f9b34fb);
pub const UUID_BATTERY_LEVEL: Uuid = Uuid::from_u128(0x00002a19_0000_1000_8000_00805f9b34fb);

/// Services hidden from the exposed topology; they carry no user data
pub const HIDDEN_SERVICES: [Uuid; 2] = [UUID_GENERIC_ACCESS_SERVICE, UUID_GENERIC_ATTRIBUTE_SERVICE];

/// GATT characteristic property bits (Core Spec Vol 3, Part G, 3.3.1.1)
pub const PROPERTY_READ: u8 = 0x02;
pub const PROPERTY_WRITE_NO_RESPONSE: u8 = 0x04;
pub const PROPERTY_WRITE: u8 = 0x08;
pub const PROPERTY_NOTIFY: u8 = 0x10;
pub const PROPERTY_INDICATE: u8 = 0x20;

/// Capacity of the command channel feeding the connection task
pub const DEFAULT_COMMAND_CAPACITY: usize = 32;

/// How long an availability check waits for the radio before reporting it off
pub const AVAILABILITY_PROBE_MS: u64 = 500;

/// Scan duration in seconds, applied by the caller
pub const DEFAULT_SCAN_TIMEOUT_SECS: u64 = 30;

/// Weakest signal still reported by the scanner
pub const MIN_RSSI_THRESHOLD: i16 = -100;
