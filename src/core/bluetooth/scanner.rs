//! Peripheral discovery
//! Produces a cancellable stream of discovered peripherals and records the
//! underlying `bluest` devices so the transport can open them by address.

use std::sync::{Arc, PoisonError};

use anyhow::{Result, anyhow};
use bluest::{Adapter, Device};
use futures_util::StreamExt;
use log::{debug, error, info};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::inspector_config::ScanConfig;
use crate::core::bluetooth::bluest_transport::DeviceRegistry;
use crate::core::bluetooth::types::DiscoveredPeripheral;
use crate::utils::extract_mac_address;

const SCAN_CHANNEL_CAPACITY: usize = 64;

pub struct BluetoothScanner {
    adapter: Option<Adapter>,
    devices: DeviceRegistry,
    min_rssi: i16,
    cancel_token: Arc<CancellationToken>,
    scan_task_handle: Option<JoinHandle<Result<()>>>,
}

impl BluetoothScanner {
    pub fn new(adapter: Option<Adapter>, devices: DeviceRegistry, config: &ScanConfig) -> Self {
        Self {
            adapter,
            devices,
            min_rssi: config.min_rssi,
            cancel_token: Arc::new(CancellationToken::new()),
            scan_task_handle: None,
        }
    }

    /// Starts scanning. Peripherals arrive on the returned channel until
    /// [`stop_scan`](Self::stop_scan) is called or the platform ends the scan.
    pub async fn start_scan(&mut self) -> Result<mpsc::Receiver<DiscoveredPeripheral>> {
        let adapter = self
            .adapter
            .clone()
            .ok_or_else(|| anyhow!("No Bluetooth adapter found"))?;

        if self.scan_task_handle.is_some() {
            self.stop_scan().await?;
        }
        self.devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();

        self.cancel_token = Arc::new(CancellationToken::new());
        let cancel_token_for_task = self.cancel_token.clone();
        let devices_for_task = self.devices.clone();
        let min_rssi = self.min_rssi;
        let (tx, rx) = mpsc::channel(SCAN_CHANNEL_CAPACITY);

        let handle = tokio::spawn(async move {
            let result = Self::internal_scan_task(adapter, devices_for_task, tx, cancel_token_for_task, min_rssi).await;
            if let Err(e) = &result {
                error!("Scan task failed: {}", e);
            }
            result
        });
        self.scan_task_handle = Some(handle);

        info!("Device scan task started.");
        Ok(rx)
    }

    async fn internal_scan_task(
        adapter: Adapter,
        devices: DeviceRegistry,
        tx: mpsc::Sender<DiscoveredPeripheral>,
        cancel_token: Arc<CancellationToken>,
        min_rssi: i16,
    ) -> Result<()> {
        info!("Checking for connected devices");
        for device in adapter.connected_devices().await? {
            let rssi = device.rssi().await.unwrap_or(0);
            if !Self::report(&devices, &tx, device, None, rssi).await {
                return Ok(());
            }
        }

        info!("Starting bluetooth scan");
        let mut scan_stream = adapter.scan(&[]).await?;

        loop {
            tokio::select! {
                result = scan_stream.next() => {
                    match result {
                        Some(discovered) => {
                            debug!("Found device - Device: {:?}, RSSI: {:?}", discovered.device, discovered.rssi);
                            let Some(rssi) = discovered.rssi else {
                                continue;
                            };
                            if rssi < min_rssi {
                                continue;
                            }
                            let name = discovered.adv_data.local_name.clone();
                            if !Self::report(&devices, &tx, discovered.device, name, rssi).await {
                                break;
                            }
                        }
                        None => {
                            info!("Bluetooth scan stream has ended.");
                            break;
                        }
                    }
                }
                _ = cancel_token.cancelled() => {
                    break;
                }
            }
        }
        Ok(())
    }

    pub async fn stop_scan(&mut self) -> Result<()> {
        info!("Stopping Bluetooth scan.");
        self.cancel_token.cancel();

        if let Some(handle) = self.scan_task_handle.take() {
            match handle.await {
                Ok(Ok(())) => info!("Scan task finished."),
                Ok(Err(e)) => error!("Scan task finished with an error: {:?}", e),
                Err(e) if e.is_cancelled() => info!("Scan task was cancelled."),
                Err(e) => error!("Scan task finished with an unexpected join error: {:?}", e),
            }
        } else {
            info!("No active scan task handle found to wait for.");
        }
        Ok(())
    }

    /// Records the device and forwards it. Returns false once nobody listens.
    async fn report(
        devices: &DeviceRegistry,
        tx: &mpsc::Sender<DiscoveredPeripheral>,
        device: Device,
        advertised_name: Option<String>,
        rssi: i16,
    ) -> bool {
        let id = device.id().to_string();
        let address = extract_mac_address(&id).unwrap_or(id);
        let name = advertised_name.or_else(|| device.name().ok());

        devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(address.clone(), device);

        let peripheral = DiscoveredPeripheral::new(address, name, rssi);
        debug!("Reporting peripheral {:?}", peripheral);
        tx.send(peripheral).await.is_ok()
    }
}

/// Collected scan results with the duplicate policy applied
#[derive(Debug, Clone, Default)]
pub struct ScanResults {
    update_duplicates: bool,
    devices: Vec<DiscoveredPeripheral>,
}

impl ScanResults {
    pub fn new(config: &ScanConfig) -> Self {
        Self {
            update_duplicates: config.update_duplicate_devices,
            devices: Vec::new(),
        }
    }

    /// Adds a sighting. With duplicate updates enabled a repeated address
    /// replaces the earlier entry in place; otherwise every sighting is kept.
    pub fn upsert(&mut self, peripheral: DiscoveredPeripheral) {
        if self.update_duplicates {
            if let Some(existing) = self.devices.iter_mut().find(|d| d.address == peripheral.address) {
                *existing = peripheral;
                return;
            }
        }
        self.devices.push(peripheral);
    }

    pub fn devices(&self) -> &[DiscoveredPeripheral] {
        &self.devices
    }
}
