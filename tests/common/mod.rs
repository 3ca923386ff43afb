//! Scripted transport shared by the integration tests.
//!
//! Every request is answered immediately through the event sink: open emits
//! link-up, discovery emits the scripted services and each read emits the
//! scripted value (or a failure when the characteristic has none).

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use gatt_inspector::core::bluetooth::{
    CharacteristicId, EventSink, GattStatus, RawCharacteristic, RawService, Transport, TransportEvent,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Open(String),
    Discover,
    Read(CharacteristicId),
    Close,
}

pub struct ScriptedTransport {
    pub available: bool,
    pub services: Vec<RawService>,
    pub values: HashMap<CharacteristicId, Vec<u8>>,
    /// Emit link-down instead of answering once this many reads have completed
    pub link_down_after_reads: Option<usize>,
    pub reject_reads: bool,
    pub fail_open: bool,
    /// Report the link lost right after open, as a failed platform connect does
    pub link_down_on_open: bool,
    pub calls: Arc<Mutex<Vec<Call>>>,
}

impl ScriptedTransport {
    pub fn new(services: Vec<RawService>) -> Self {
        Self {
            available: true,
            services,
            values: HashMap::new(),
            link_down_after_reads: None,
            reject_reads: false,
            fail_open: false,
            link_down_on_open: false,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_value(mut self, id: CharacteristicId, value: &[u8]) -> Self {
        self.values.insert(id, value.to_vec());
        self
    }

    pub fn calls(&self) -> Arc<Mutex<Vec<Call>>> {
        self.calls.clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn reads_so_far(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, Call::Read(_)))
            .count()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    type Link = EventSink;

    async fn is_available(&self) -> bool {
        self.available
    }

    async fn open(&self, address: &str, events: EventSink) -> anyhow::Result<EventSink> {
        self.record(Call::Open(address.to_string()));
        if self.fail_open {
            anyhow::bail!("peripheral {} refused the connection", address);
        }
        if self.link_down_on_open {
            events.emit(TransportEvent::LinkDown);
            // arrives after the teardown and must be ignored
            events.emit(TransportEvent::LinkUp);
        } else {
            events.emit(TransportEvent::LinkUp);
        }
        Ok(events)
    }

    async fn request_discovery(&self, link: &EventSink) -> anyhow::Result<()> {
        self.record(Call::Discover);
        link.emit(TransportEvent::DiscoveryComplete {
            status: GattStatus::Success,
            services: self.services.clone(),
        });
        Ok(())
    }

    async fn read_characteristic(&self, link: &EventSink, id: CharacteristicId) -> bool {
        self.record(Call::Read(id));
        if self.reject_reads {
            return false;
        }

        if let Some(limit) = self.link_down_after_reads {
            if self.reads_so_far() > limit {
                link.emit(TransportEvent::LinkDown);
                return true;
            }
        }

        let event = match self.values.get(&id) {
            Some(value) => TransportEvent::ReadComplete {
                id,
                status: GattStatus::Success,
                value: value.clone(),
            },
            None => TransportEvent::ReadComplete {
                id,
                status: GattStatus::Failure("read not permitted".to_string()),
                value: Vec::new(),
            },
        };
        link.emit(event);
        true
    }

    async fn close(&self, _link: EventSink) {
        self.record(Call::Close);
    }
}

pub fn characteristic(uuid: uuid::Uuid, properties: u8) -> RawCharacteristic {
    RawCharacteristic { uuid, properties }
}

pub fn service(uuid: uuid::Uuid, characteristics: Vec<RawCharacteristic>) -> RawService {
    RawService { uuid, characteristics }
}
