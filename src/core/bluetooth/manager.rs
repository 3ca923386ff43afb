//! Bluetooth manager for the GATT inspector
//! This module provides the main interface for bluetooth operations: the
//! imperative entry points and the observable connection streams.

use std::sync::Arc;

use log::info;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::core::bluetooth::connection::{Command, ConnectionStateMachine, ServiceSnapshot};
use crate::core::bluetooth::transport::Transport;
use crate::core::bluetooth::types::{ConnectionState, ReadProgress};
use crate::error::{Error, Result};
use crate::metadata::MetadataLookup;

/// Clonable handle to the connection task
#[derive(Clone)]
pub struct BluetoothManager {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<ConnectionState>,
    services: watch::Receiver<ServiceSnapshot>,
    progress: watch::Receiver<ReadProgress>,
}

impl BluetoothManager {
    /// Starts the connection task on the current tokio runtime
    pub fn spawn<T: Transport>(
        transport: T,
        metadata: Arc<dyn MetadataLookup>,
        command_capacity: usize,
    ) -> (Self, JoinHandle<()>) {
        let (machine, events) = ConnectionStateMachine::new(transport, metadata);
        let (commands, commands_rx) = mpsc::channel(command_capacity.max(1));

        let manager = Self {
            commands,
            state: machine.subscribe_state(),
            services: machine.subscribe_services(),
            progress: machine.subscribe_progress(),
        };
        let handle = tokio::spawn(machine.run(commands_rx, events));
        (manager, handle)
    }

    /// Connects to the peripheral at `address`, replacing any current connection.
    ///
    /// Returns once the open request has been dispatched; link-up, discovery
    /// and reads are reported through [`connection_state`](Self::connection_state)
    /// and [`services`](Self::services).
    pub async fn connect(&self, address: &str) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Connect {
            address: address.to_string(),
            reply,
        })
        .await?;
        response.await.map_err(|_| Error::ManagerClosed)?
    }

    /// Disconnects from the current peripheral. Does nothing when already disconnected.
    pub async fn disconnect(&self) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Disconnect { reply }).await?;
        response.await.map_err(|_| Error::ManagerClosed)
    }

    /// Disconnects and stops the connection task
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down connection task.");
        self.send(Command::Shutdown).await
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub fn services(&self) -> watch::Receiver<ServiceSnapshot> {
        self.services.clone()
    }

    pub fn read_progress(&self) -> watch::Receiver<ReadProgress> {
        self.progress.clone()
    }

    pub fn current_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Waits until the connection is ready and every queued read has settled,
    /// then returns the service snapshot.
    pub async fn wait_until_ready(&self) -> Result<ServiceSnapshot> {
        let mut state = self.state.clone();
        state
            .wait_for(|s| *s == ConnectionState::Ready)
            .await
            .map_err(|_| Error::ManagerClosed)?;

        let mut progress = self.progress.clone();
        progress
            .wait_for(|p| !p.draining)
            .await
            .map_err(|_| Error::ManagerClosed)?;

        Ok(self.services.borrow().clone())
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| Error::ManagerClosed)
    }
}
