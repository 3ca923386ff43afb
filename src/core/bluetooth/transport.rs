//! Transport seam between the connection task and a platform BLE stack
//!
//! A transport only dispatches requests. Their outcomes come back as
//! [`TransportEvent`]s through the [`EventSink`] handed over in `open`.

use anyhow::Result;
use tokio::sync::mpsc;

use crate::core::bluetooth::types::{CharacteristicId, TransportEvent};

/// Event tagged with the connection generation it belongs to
pub(crate) type TaggedEvent = (u64, TransportEvent);

/// Delivers transport events for one connection attempt.
///
/// Events emitted after the connection was torn down or superseded carry a
/// stale generation and are dropped by the connection task.
#[derive(Debug, Clone)]
pub struct EventSink {
    generation: u64,
    tx: mpsc::UnboundedSender<TaggedEvent>,
}

impl EventSink {
    pub(crate) fn new(generation: u64, tx: mpsc::UnboundedSender<TaggedEvent>) -> Self {
        Self { generation, tx }
    }

    /// Sends an event. Returns false once the connection task is gone.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx.send((self.generation, event)).is_ok()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Platform BLE capability driven by the connection task
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Handle for one open link
    type Link: Send + Sync + 'static;

    /// Whether the local radio is present and enabled
    async fn is_available(&self) -> bool;

    /// Starts connecting to `address`. Link-up or link-down is reported through `events`.
    async fn open(&self, address: &str, events: EventSink) -> Result<Self::Link>;

    /// Starts service discovery; completes with `TransportEvent::DiscoveryComplete`
    async fn request_discovery(&self, link: &Self::Link) -> Result<()>;

    /// Starts a read; completes with `TransportEvent::ReadComplete`.
    /// Returns false when the request was not accepted.
    async fn read_characteristic(&self, link: &Self::Link, id: CharacteristicId) -> bool;

    /// Tears the link down and releases it
    async fn close(&self, link: Self::Link);
}
