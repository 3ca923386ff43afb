//! Application state management
//! This module wires the adapter, scanner, metadata store and connection task together.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use log::{error, info};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::AppConfig;
use crate::core::bluetooth::{BluestTransport, BluetoothManager, BluetoothScanner, DeviceRegistry};
use crate::metadata::{MetadataLookup, MetadataStore};

/// Global application state
pub struct AppState {
    pub config: AppConfig,
    /// The Bluetooth manager instance
    pub bluetooth_manager: BluetoothManager,
    pub scanner: Arc<Mutex<BluetoothScanner>>,
    pub metadata: Arc<MetadataStore>,
    connection_task: JoinHandle<()>,
}

impl AppState {
    /// Creates a new AppState instance from the loaded configuration
    pub async fn new(config: AppConfig) -> Result<Self> {
        let metadata = match &config.metadata_path {
            Some(path) => Arc::new(MetadataStore::open(path).await?),
            None => Arc::new(MetadataStore::in_memory()),
        };

        info!("Initializing BluetoothManager...");
        let devices: DeviceRegistry = Arc::new(std::sync::Mutex::new(HashMap::new()));
        let transport = BluestTransport::new(devices.clone()).await;
        let scanner = BluetoothScanner::new(transport.adapter().cloned(), devices, &config.scan);

        let lookup: Arc<dyn MetadataLookup> = metadata.clone();
        let (bluetooth_manager, connection_task) =
            BluetoothManager::spawn(transport, lookup, config.connection.command_capacity);

        Ok(Self {
            config,
            bluetooth_manager,
            scanner: Arc::new(Mutex::new(scanner)),
            metadata,
            connection_task,
        })
    }

    /// Stops any scan, disconnects and waits for the connection task to exit.
    pub async fn shutdown(self) -> Result<()> {
        self.scanner.lock().await.stop_scan().await?;
        self.bluetooth_manager.shutdown().await?;
        if let Err(e) = self.connection_task.await {
            error!("Connection task ended abnormally: {}", e);
        }
        info!("Application state shut down.");
        Ok(())
    }
}
