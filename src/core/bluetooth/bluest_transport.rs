//! Transport implementation on top of `bluest`
//! Each request runs in its own task and reports back through the link's
//! [`EventSink`]; the connection task never waits on the radio.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use bluest::{Adapter, Characteristic, ConnectionEvent, Device};
use futures_util::StreamExt;
use log::{debug, error, info, warn};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::core::bluetooth::constants::{
    AVAILABILITY_PROBE_MS, PROPERTY_INDICATE, PROPERTY_NOTIFY, PROPERTY_READ, PROPERTY_WRITE, PROPERTY_WRITE_NO_RESPONSE,
};
use crate::core::bluetooth::transport::{EventSink, Transport};
use crate::core::bluetooth::types::{
    CharacteristicId, GattStatus, RawCharacteristic, RawService, TransportEvent,
};
use crate::utils::extract_mac_address;

/// Devices seen by the scanner, keyed by address
pub type DeviceRegistry = Arc<std::sync::Mutex<HashMap<String, Device>>>;

/// An open `bluest` link
pub struct BluestLink {
    device: Device,
    events: EventSink,
    characteristics: Arc<Mutex<HashMap<CharacteristicId, Characteristic>>>,
    connection_task: JoinHandle<()>,
}

pub struct BluestTransport {
    adapter: Option<Adapter>,
    devices: DeviceRegistry,
}

impl BluestTransport {
    /// Wraps the default adapter. A missing adapter is reported by `is_available`.
    pub async fn new(devices: DeviceRegistry) -> Self {
        let adapter = Adapter::default().await;
        if adapter.is_none() {
            warn!("No Bluetooth adapter found");
        }
        Self { adapter, devices }
    }

    pub fn adapter(&self) -> Option<&Adapter> {
        self.adapter.as_ref()
    }

    pub fn devices(&self) -> DeviceRegistry {
        self.devices.clone()
    }

    fn require_adapter(&self) -> Result<&Adapter> {
        self.adapter
            .as_ref()
            .ok_or_else(|| anyhow!("No Bluetooth adapter found"))
    }

    /// Finds a device by address among scanned devices, then among devices
    /// the system already has connected.
    async fn find_device(&self, address: &str) -> Result<Device> {
        let known = {
            let devices = self.devices.lock().unwrap_or_else(PoisonError::into_inner);
            devices
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(address))
                .map(|(_, device)| device.clone())
        };
        if let Some(device) = known {
            return Ok(device);
        }

        debug!("{} not in scan results, checking connected devices", address);
        let adapter = self.require_adapter()?;
        for device in adapter.connected_devices().await? {
            let id = device.id().to_string();
            let device_address = extract_mac_address(&id).unwrap_or(id);
            if device_address.eq_ignore_ascii_case(address) {
                return Ok(device);
            }
        }
        Err(anyhow!("Device not found with address: {}", address))
    }
}

#[async_trait]
impl Transport for BluestTransport {
    type Link = BluestLink;

    async fn is_available(&self) -> bool {
        let Some(adapter) = &self.adapter else {
            return false;
        };
        // wait_available only returns once the radio is on
        let probe = Duration::from_millis(AVAILABILITY_PROBE_MS);
        match timeout(probe, adapter.wait_available()).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                error!("Failed to query adapter state: {}", e);
                false
            }
            Err(_) => {
                warn!("Bluetooth adapter is switched off");
                false
            }
        }
    }

    async fn open(&self, address: &str, events: EventSink) -> Result<BluestLink> {
        let adapter = self.require_adapter()?.clone();
        let device = self.find_device(address).await?;
        info!("Device details - ID: {}, Address: {}", device.id(), address);

        let task_device = device.clone();
        let task_events = events.clone();
        let connection_task = tokio::spawn(async move {
            Self::connection_task(adapter, task_device, task_events).await;
        });

        Ok(BluestLink {
            device,
            events,
            characteristics: Arc::new(Mutex::new(HashMap::new())),
            connection_task,
        })
    }

    async fn request_discovery(&self, link: &BluestLink) -> Result<()> {
        let device = link.device.clone();
        let events = link.events.clone();
        let characteristics = link.characteristics.clone();

        tokio::spawn(async move {
            let event = match Self::discover(&device, &characteristics).await {
                Ok(services) => TransportEvent::DiscoveryComplete {
                    status: GattStatus::Success,
                    services,
                },
                Err(e) => TransportEvent::DiscoveryComplete {
                    status: GattStatus::Failure(e.to_string()),
                    services: Vec::new(),
                },
            };
            events.emit(event);
        });
        Ok(())
    }

    async fn read_characteristic(&self, link: &BluestLink, id: CharacteristicId) -> bool {
        let Some(characteristic) = link.characteristics.lock().await.get(&id).cloned() else {
            error!("No handle for characteristic {}", id);
            return false;
        };

        let events = link.events.clone();
        tokio::spawn(async move {
            let event = match characteristic.read().await {
                Ok(value) => TransportEvent::ReadComplete {
                    id,
                    status: GattStatus::Success,
                    value,
                },
                Err(e) => TransportEvent::ReadComplete {
                    id,
                    status: GattStatus::Failure(e.to_string()),
                    value: Vec::new(),
                },
            };
            events.emit(event);
        });
        true
    }

    async fn close(&self, link: BluestLink) {
        link.connection_task.abort();
        let Some(adapter) = &self.adapter else {
            return;
        };
        if link.device.is_connected().await {
            info!("Disconnecting from device {}", link.device.id());
            match adapter.disconnect_device(&link.device).await {
                Ok(()) => info!("Successfully disconnected"),
                Err(e) => error!("Failed to disconnect from {}: {}", link.device.id(), e),
            }
        } else {
            info!("Device {} not connected", link.device.id());
        }
    }
}

impl BluestTransport {
    /// Connects and then reports link-up, followed by link-down once the
    /// platform reports the device gone.
    async fn connection_task(adapter: Adapter, device: Device, events: EventSink) {
        let connection_events = match adapter.device_connection_events(&device).await {
            Ok(stream) => Some(stream),
            Err(e) => {
                warn!("Connection events unavailable for {}: {}", device.id(), e);
                None
            }
        };

        if !device.is_connected().await {
            info!("Initiating connection to {}...", device.id());
            if let Err(e) = adapter.connect_device(&device).await {
                error!("Connection to {} failed: {}", device.id(), e);
                events.emit(TransportEvent::LinkDown);
                return;
            }
        }
        events.emit(TransportEvent::LinkUp);

        if let Some(stream) = connection_events {
            let mut stream = std::pin::pin!(stream);
            while let Some(event) = stream.next().await {
                if matches!(event, ConnectionEvent::Disconnected) {
                    events.emit(TransportEvent::LinkDown);
                    break;
                }
            }
        }
    }

    async fn discover(
        device: &Device,
        handles: &Mutex<HashMap<CharacteristicId, Characteristic>>,
    ) -> Result<Vec<RawService>> {
        let mut handles = handles.lock().await;
        handles.clear();

        let mut services = Vec::new();
        for service in device.discover_services().await? {
            let service_uuid = service.uuid();
            let mut characteristics = Vec::new();
            for characteristic in service.discover_characteristics().await? {
                let uuid = characteristic.uuid();
                let properties = match characteristic.properties().await {
                    Ok(props) => {
                        let mut bits = 0u8;
                        if props.read {
                            bits |= PROPERTY_READ;
                        }
                        if props.write_without_response {
                            bits |= PROPERTY_WRITE_NO_RESPONSE;
                        }
                        if props.write {
                            bits |= PROPERTY_WRITE;
                        }
                        if props.notify {
                            bits |= PROPERTY_NOTIFY;
                        }
                        if props.indicate {
                            bits |= PROPERTY_INDICATE;
                        }
                        bits
                    }
                    Err(e) => {
                        warn!("Failed to read properties of {}: {}", uuid, e);
                        0
                    }
                };
                debug!("Found characteristic {} (properties {:#04x})", uuid, properties);
                handles.insert(CharacteristicId::new(service_uuid, uuid), characteristic);
                characteristics.push(RawCharacteristic { uuid, properties });
            }
            info!("Available service: {}", service_uuid);
            services.push(RawService {
                uuid: service_uuid,
                characteristics,
            });
        }
        Ok(services)
    }
}
