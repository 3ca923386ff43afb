//! Connection state machine
//! Owns the transport link, the read pipeline and the topology snapshot of the
//! single managed connection. Commands and transport events are processed one
//! at a time by [`ConnectionStateMachine::run`]; nothing else mutates this state.

use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::sync::{mpsc, oneshot, watch};

use crate::core::bluetooth::read_queue::ReadPipeline;
use crate::core::bluetooth::transport::{EventSink, TaggedEvent, Transport};
use crate::core::bluetooth::types::{
    CharacteristicId, ConnectionState, GattStatus, RawService, ReadProgress, TransportEvent,
};
use crate::core::formatter::format_value;
use crate::core::gatt::{ServiceInfo, apply_read, build_topology, readable_characteristics};
use crate::error::{Error, Result};
use crate::metadata::MetadataLookup;

/// Immutable service list shared with observers
pub type ServiceSnapshot = Arc<Vec<ServiceInfo>>;

/// Requests sent by [`BluetoothManager`](super::manager::BluetoothManager) handles
pub(crate) enum Command {
    Connect {
        address: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
    Shutdown,
}

pub struct ConnectionStateMachine<T: Transport> {
    transport: T,
    metadata: Arc<dyn MetadataLookup>,
    link: Option<T::Link>,
    /// Address of the current connection attempt
    address: Option<String>,
    /// Bumped whenever a link is opened or torn down; events tagged with an
    /// older value belong to a dead link
    generation: u64,
    pipeline: ReadPipeline,
    services: ServiceSnapshot,
    events_tx: mpsc::UnboundedSender<TaggedEvent>,
    state_tx: watch::Sender<ConnectionState>,
    services_tx: watch::Sender<ServiceSnapshot>,
    progress_tx: watch::Sender<ReadProgress>,
}

impl<T: Transport> ConnectionStateMachine<T> {
    /// Creates the state machine and the receiving end of its event channel
    pub(crate) fn new(
        transport: T,
        metadata: Arc<dyn MetadataLookup>,
    ) -> (Self, mpsc::UnboundedReceiver<TaggedEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (services_tx, _) = watch::channel(ServiceSnapshot::default());
        let (progress_tx, _) = watch::channel(ReadProgress::default());

        let machine = Self {
            transport,
            metadata,
            link: None,
            address: None,
            generation: 0,
            pipeline: ReadPipeline::new(),
            services: ServiceSnapshot::default(),
            events_tx,
            state_tx,
            services_tx,
            progress_tx,
        };
        (machine, events_rx)
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn subscribe_services(&self) -> watch::Receiver<ServiceSnapshot> {
        self.services_tx.subscribe()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<ReadProgress> {
        self.progress_tx.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Processes commands and transport events until shut down
    pub(crate) async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut events: mpsc::UnboundedReceiver<TaggedEvent>,
    ) {
        info!("Connection task started.");
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Connect { address, reply }) => {
                        let result = self.connect(&address).await;
                        let _ = reply.send(result);
                    }
                    Some(Command::Disconnect { reply }) => {
                        self.disconnect().await;
                        let _ = reply.send(());
                    }
                    Some(Command::Shutdown) | None => {
                        self.disconnect().await;
                        break;
                    }
                },
                Some((generation, event)) = events.recv() => {
                    self.handle_event(generation, event).await;
                }
            }
        }
        info!("Connection task stopped.");
    }

    /// Opens a link to `address`. Progress past the open request is reported
    /// through the observable state.
    pub(crate) async fn connect(&mut self, address: &str) -> Result<()> {
        if !self.transport.is_available().await {
            error!("Bluetooth adapter not available or disabled");
            return Err(Error::TransportUnavailable);
        }

        if self.link.is_some() {
            warn!(
                "Connecting to {} replaces the connection to {}",
                address,
                self.address.as_deref().unwrap_or("unknown")
            );
            self.teardown().await;
        }

        self.generation += 1;
        self.address = Some(address.to_string());
        self.set_state(ConnectionState::Connecting);

        let sink = EventSink::new(self.generation, self.events_tx.clone());
        match self.transport.open(address, sink).await {
            Ok(link) => {
                info!("Opening connection to {}...", address);
                self.link = Some(link);
                Ok(())
            }
            Err(e) => {
                error!("Failed to open connection to {}: {}", address, e);
                self.teardown().await;
                Err(Error::OpenFailed {
                    address: address.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Drops the pipeline and the topology and closes the link. Safe to call repeatedly.
    pub(crate) async fn disconnect(&mut self) {
        if self.link.is_some() {
            info!(
                "Disconnecting from {}",
                self.address.as_deref().unwrap_or("unknown")
            );
        } else {
            debug!("Disconnect requested with no open link");
        }
        self.teardown().await;
    }

    pub(crate) async fn handle_event(&mut self, generation: u64, event: TransportEvent) {
        if generation != self.generation || self.link.is_none() {
            debug!("Ignoring stale transport event: {:?}", event);
            return;
        }

        match event {
            TransportEvent::LinkUp => self.on_link_up().await,
            TransportEvent::LinkDown => {
                warn!(
                    "Link to {} went down",
                    self.address.as_deref().unwrap_or("unknown")
                );
                self.teardown().await;
            }
            TransportEvent::DiscoveryComplete { status, services } => {
                self.on_discovery_complete(status, services).await
            }
            TransportEvent::ReadComplete { id, status, value } => {
                self.on_read_complete(id, status, value).await
            }
        }
    }

    async fn on_link_up(&mut self) {
        if self.state() != ConnectionState::Connecting {
            debug!("Ignoring link-up in state {:?}", self.state());
            return;
        }
        self.set_state(ConnectionState::Connected);
        self.set_state(ConnectionState::DiscoveringServices);

        if let Some(link) = &self.link {
            info!("Connection successful, discovering services...");
            if let Err(e) = self.transport.request_discovery(link).await {
                error!("Failed to start service discovery: {}", e);
            }
        }
    }

    async fn on_discovery_complete(&mut self, status: GattStatus, services: Vec<RawService>) {
        if self.state() != ConnectionState::DiscoveringServices {
            debug!("Ignoring discovery result in state {:?}", self.state());
            return;
        }
        if let GattStatus::Failure(reason) = status {
            error!("Service discovery failed: {}", reason);
            return;
        }

        let topology = build_topology(&services);
        info!(
            "Discovered {} services ({} hidden)",
            topology.len(),
            services.len() - topology.len()
        );

        self.pipeline.reset();
        self.pipeline.enqueue_readable(readable_characteristics(&topology));
        self.publish_services(Arc::new(topology));
        self.drain().await;
        self.set_state(ConnectionState::Ready);
    }

    async fn on_read_complete(&mut self, id: CharacteristicId, status: GattStatus, value: Vec<u8>) {
        if !self.pipeline.complete(&id, status.is_success()) {
            debug!("Ignoring read completion for {} that is not in flight", id);
            return;
        }

        match status {
            GattStatus::Success => {
                let (data_type, endianness) = self
                    .metadata
                    .rendering(self.address.as_deref().unwrap_or_default(), &id);
                let formatted = format_value(Some(&value), data_type, endianness);
                debug!("Read {} -> {:?}", id, formatted);
                let updated = apply_read(&self.services, &id, &value, &formatted);
                self.publish_services(Arc::new(updated));
            }
            GattStatus::Failure(reason) => {
                warn!("Read of {} failed: {}", id, reason);
            }
        }
        self.issue_next_read().await;
    }

    /// Starts working through the read queue unless a drain is already running
    async fn drain(&mut self) {
        if !self.pipeline.begin() {
            self.publish_progress();
            return;
        }
        info!("Reading {} characteristics", self.pipeline.len());
        self.issue_next_read().await;
    }

    /// Issues reads until one is accepted or the queue runs dry
    async fn issue_next_read(&mut self) {
        while let Some(id) = self.pipeline.pop_next() {
            let accepted = match &self.link {
                Some(link) => self.transport.read_characteristic(link, id).await,
                None => false,
            };
            if accepted {
                self.pipeline.mark_in_flight(id);
                break;
            }
            warn!("Failed to initiate read for {}", id);
        }
        if !self.pipeline.is_draining() {
            info!("Characteristic reads finished");
        }
        self.publish_progress();
    }

    async fn teardown(&mut self) {
        self.pipeline.reset();
        self.generation += 1;
        if let Some(link) = self.link.take() {
            self.transport.close(link).await;
        }
        self.address = None;
        self.publish_services(ServiceSnapshot::default());
        self.publish_progress();
        self.set_state(ConnectionState::Disconnected);
    }

    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            info!("Connection state: {:?} -> {:?}", current, state);
            *current = state;
            true
        });
    }

    fn publish_services(&mut self, services: ServiceSnapshot) {
        self.services = services.clone();
        self.services_tx.send_replace(services);
    }

    fn publish_progress(&self) {
        self.progress_tx.send_replace(self.pipeline.progress());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bluetooth::constants::{PROPERTY_READ, PROPERTY_WRITE, UUID_BATTERY_SERVICE};
    use crate::core::bluetooth::types::RawCharacteristic;
    use crate::metadata::NoMetadata;
    use std::sync::Mutex;
    use uuid::Uuid;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Open(String),
        Discover,
        Read(CharacteristicId),
        Close,
    }

    /// Records calls; tests feed events by hand
    #[derive(Default)]
    struct ManualTransport {
        available: bool,
        reject_reads: bool,
        calls: Arc<Mutex<Vec<Call>>>,
    }

    #[async_trait::async_trait]
    impl Transport for ManualTransport {
        type Link = ();

        async fn is_available(&self) -> bool {
            self.available
        }

        async fn open(&self, address: &str, _events: EventSink) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(Call::Open(address.to_string()));
            Ok(())
        }

        async fn request_discovery(&self, _link: &()) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(Call::Discover);
            Ok(())
        }

        async fn read_characteristic(&self, _link: &(), id: CharacteristicId) -> bool {
            self.calls.lock().unwrap().push(Call::Read(id));
            !self.reject_reads
        }

        async fn close(&self, _link: ()) {
            self.calls.lock().unwrap().push(Call::Close);
        }
    }

    fn machine(transport: ManualTransport) -> ConnectionStateMachine<ManualTransport> {
        ConnectionStateMachine::new(transport, Arc::new(NoMetadata)).0
    }

    fn readable(n: u128) -> RawCharacteristic {
        RawCharacteristic { uuid: Uuid::from_u128(n), properties: PROPERTY_READ }
    }

    fn discovery(characteristics: Vec<RawCharacteristic>) -> TransportEvent {
        TransportEvent::DiscoveryComplete {
            status: GattStatus::Success,
            services: vec![RawService { uuid: UUID_BATTERY_SERVICE, characteristics }],
        }
    }

    async fn ready(m: &mut ConnectionStateMachine<ManualTransport>, characteristics: Vec<RawCharacteristic>) {
        m.connect("AA:BB:CC:DD:EE:FF").await.unwrap();
        let g = m.generation();
        m.handle_event(g, TransportEvent::LinkUp).await;
        m.handle_event(g, discovery(characteristics)).await;
    }

    #[tokio::test]
    async fn connect_fails_fast_without_radio() {
        let mut m = machine(ManualTransport::default());
        let err = m.connect("AA:BB:CC:DD:EE:FF").await.unwrap_err();
        assert!(matches!(err, Error::TransportUnavailable));
        assert_eq!(m.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn walks_states_to_ready_and_reads_one_at_a_time() {
        let transport = ManualTransport { available: true, ..Default::default() };
        let calls = transport.calls.clone();
        let mut m = machine(transport);

        m.connect("AA:BB:CC:DD:EE:FF").await.unwrap();
        assert_eq!(m.state(), ConnectionState::Connecting);

        let g = m.generation();
        m.handle_event(g, TransportEvent::LinkUp).await;
        assert_eq!(m.state(), ConnectionState::DiscoveringServices);

        m.handle_event(g, discovery(vec![readable(1), readable(2)])).await;
        assert_eq!(m.state(), ConnectionState::Ready);

        let first = CharacteristicId::new(UUID_BATTERY_SERVICE, Uuid::from_u128(1));
        let second = CharacteristicId::new(UUID_BATTERY_SERVICE, Uuid::from_u128(2));
        assert_eq!(calls.lock().unwrap().last(), Some(&Call::Read(first)));

        m.handle_event(
            g,
            TransportEvent::ReadComplete { id: first, status: GattStatus::Success, value: vec![0x64] },
        )
        .await;
        assert_eq!(calls.lock().unwrap().last(), Some(&Call::Read(second)));

        let services = m.subscribe_services().borrow().clone();
        assert_eq!(services[0].characteristics[0].formatted_value.as_deref(), Some("64\n\"d\""));
    }

    #[tokio::test]
    async fn rejected_reads_do_not_stall_the_pipeline() {
        let transport = ManualTransport { available: true, reject_reads: true, ..Default::default() };
        let calls = transport.calls.clone();
        let mut m = machine(transport);

        ready(&mut m, vec![readable(1), readable(2), readable(3)]).await;

        let reads = calls.lock().unwrap().iter().filter(|c| matches!(c, Call::Read(_))).count();
        assert_eq!(reads, 3);
        let progress = *m.subscribe_progress().borrow();
        assert_eq!(progress.attempted, 3);
        assert!(!progress.draining);
    }

    #[tokio::test]
    async fn discovery_failure_stays_in_discovering_services() {
        let mut m = machine(ManualTransport { available: true, ..Default::default() });
        m.connect("AA:BB:CC:DD:EE:FF").await.unwrap();
        let g = m.generation();
        m.handle_event(g, TransportEvent::LinkUp).await;
        m.handle_event(
            g,
            TransportEvent::DiscoveryComplete { status: GattStatus::Failure("133".into()), services: vec![] },
        )
        .await;
        assert_eq!(m.state(), ConnectionState::DiscoveringServices);
        assert!(m.subscribe_services().borrow().is_empty());
    }

    #[tokio::test]
    async fn events_from_an_old_link_are_ignored() {
        let transport = ManualTransport { available: true, ..Default::default() };
        let calls = transport.calls.clone();
        let mut m = machine(transport);

        ready(&mut m, vec![readable(1), RawCharacteristic { uuid: Uuid::from_u128(9), properties: PROPERTY_WRITE }]).await;
        let old = m.generation();
        m.disconnect().await;
        assert_eq!(m.state(), ConnectionState::Disconnected);

        let id = CharacteristicId::new(UUID_BATTERY_SERVICE, Uuid::from_u128(1));
        m.handle_event(old, TransportEvent::ReadComplete { id, status: GattStatus::Success, value: vec![1] })
            .await;
        m.handle_event(old, TransportEvent::LinkUp).await;

        assert_eq!(m.state(), ConnectionState::Disconnected);
        assert!(m.subscribe_services().borrow().is_empty());
        assert_eq!(calls.lock().unwrap().iter().filter(|c| **c == Call::Close).count(), 1);
    }

    #[tokio::test]
    async fn connect_supersedes_an_existing_link() {
        let transport = ManualTransport { available: true, ..Default::default() };
        let calls = transport.calls.clone();
        let mut m = machine(transport);

        ready(&mut m, vec![readable(1)]).await;
        m.connect("11:22:33:44:55:66").await.unwrap();

        assert_eq!(m.state(), ConnectionState::Connecting);
        let calls = calls.lock().unwrap();
        let close_at = calls.iter().position(|c| *c == Call::Close).unwrap();
        assert_eq!(calls[close_at + 1], Call::Open("11:22:33:44:55:66".into()));
    }
    fn closes(calls: &Mutex<Vec<Call>>) -> usize {
        calls.lock().unwrap().iter().filter(|c| **c == Call::Close).count()
    }

    #[tokio::test]
    async fn link_down_while_connecting_tears_down() {
        let transport = ManualTransport { available: true, ..Default::default() };
        let calls = transport.calls.clone();
        let mut m = machine(transport);

        m.connect("AA:BB:CC:DD:EE:FF").await.unwrap();
        let g = m.generation();
        m.handle_event(g, TransportEvent::LinkDown).await;
        assert_eq!(m.state(), ConnectionState::Disconnected);
        assert_eq!(closes(&calls), 1);

        m.handle_event(g, TransportEvent::LinkUp).await;
        assert_eq!(m.state(), ConnectionState::Disconnected);
        assert!(!calls.lock().unwrap().contains(&Call::Discover));
    }

    #[tokio::test]
    async fn link_down_while_discovering_tears_down() {
        let transport = ManualTransport { available: true, ..Default::default() };
        let calls = transport.calls.clone();
        let mut m = machine(transport);

        m.connect("AA:BB:CC:DD:EE:FF").await.unwrap();
        let g = m.generation();
        m.handle_event(g, TransportEvent::LinkUp).await;
        assert_eq!(m.state(), ConnectionState::DiscoveringServices);

        m.handle_event(g, TransportEvent::LinkDown).await;
        assert_eq!(m.state(), ConnectionState::Disconnected);
        assert_eq!(closes(&calls), 1);

        m.handle_event(g, TransportEvent::LinkUp).await;
        m.handle_event(g, discovery(vec![readable(1)])).await;
        assert_eq!(m.state(), ConnectionState::Disconnected);
        assert!(m.subscribe_services().borrow().is_empty());
        assert!(!calls.lock().unwrap().iter().any(|c| matches!(c, Call::Read(_))));
        assert_eq!(closes(&calls), 1);
    }
}
