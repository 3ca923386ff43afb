use serde::{Deserialize, Serialize};

use crate::core::bluetooth::constants::{
    DEFAULT_COMMAND_CAPACITY, DEFAULT_SCAN_TIMEOUT_SECS, MIN_RSSI_THRESHOLD,
};

/// Scan settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// How long the binary scans before listing results, in seconds
    pub timeout_secs: u64,
    /// Advertisements weaker than this are dropped
    pub min_rssi: i16,
    /// Replace an already listed device when it is seen again instead of listing it twice
    pub update_duplicate_devices: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            timeout_secs: DEFAULT_SCAN_TIMEOUT_SECS,
            min_rssi: MIN_RSSI_THRESHOLD,
            update_duplicate_devices: true,
        }
    }
}

/// Connection task settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Pending connect/disconnect requests buffered before callers wait
    pub command_capacity: usize,
    /// How long the binary waits for discovery and the initial reads, in seconds
    pub ready_timeout_secs: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            command_capacity: DEFAULT_COMMAND_CAPACITY,
            ready_timeout_secs: 30,
        }
    }
}
