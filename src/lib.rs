//! GATT inspector library
//! Connects to a single BLE peripheral, discovers its services and reads
//! every readable characteristic one request at a time.

pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod metadata;
pub mod state;
pub mod utils;

pub use crate::core::bluetooth::{BluetoothManager, ConnectionState};
pub use crate::error::{Error, Result};
pub use crate::state::AppState;
