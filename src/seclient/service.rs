//! Client event loop and public handle
//!
//! Every input to the state machine (network state changes, received
//! commands, node additions, timer fires, CBKE completions and
//! configuration changes) is a [`ClientEvent`] on a single channel consumed
//! by one task, so state transitions never run concurrently.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{error, info};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::client::SmartEnergyClient;
use super::config::{validate_keep_alive_period, SepClientConfig};
use super::key_establishment::CbkeProvider;
use super::notifier::{StatusListener, StatusNotifier};
use super::state::{ClientState, ClientStatus};
use super::timer::TokioScheduler;
use crate::error::{Result, SepError};
use crate::zigbee::{NetworkManager, ZigBeeCommand, ZigBeeNetworkState, ZigBeeNode};

/// Input to the client state machine
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// The mesh network changed state
    NetworkStateUpdated(ZigBeeNetworkState),

    /// A command was received from the mesh
    CommandReceived(ZigBeeCommand),

    /// A node joined or was added to the registry
    NodeAdded(ZigBeeNode),

    /// A timer arming fired
    TimerFired { generation: u64 },

    /// A key establishment session finished
    KeyEstablishmentComplete {
        session: u64,
        success: bool,
        retry_hint_secs: u32,
    },

    /// Change the keep-alive interval
    SetKeepAlivePeriod(Duration),

    /// Stop the client and end the event loop
    Shutdown,
}

/// Client state published after every event
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClientSnapshot {
    pub state: ClientState,
    pub status: ClientStatus,
    pub keep_alive_failures: u32,
    pub last_keep_alive: Option<DateTime<Utc>>,
}

/// Handle to a running Smart Energy client.
///
/// Dropping the handle shuts the client down.
pub struct SmartEnergyClientHandle {
    events: mpsc::UnboundedSender<ClientEvent>,
    notifier: StatusNotifier,
    snapshot: watch::Receiver<ClientSnapshot>,
    task: Option<JoinHandle<()>>,
}

impl SmartEnergyClientHandle {
    /// Start the client on the current tokio runtime.
    ///
    /// Profile security is applied to the nodes already in the registry;
    /// discovery begins when the network reports [`ZigBeeNetworkState::Online`].
    pub fn spawn(
        config: SepClientConfig,
        network: Arc<dyn NetworkManager>,
        cbke: Arc<dyn CbkeProvider>,
    ) -> Result<Self> {
        config.validate()?;

        let (events, receiver) = mpsc::unbounded_channel();
        let scheduler = Arc::new(TokioScheduler::new(events.clone()));
        let mut client = SmartEnergyClient::new(config, network, cbke, scheduler, events.clone());
        client.startup();

        let notifier = client.notifier().clone();
        let (snapshot_tx, snapshot) = watch::channel(client.snapshot());
        let task = tokio::spawn(run_event_loop(client, receiver, snapshot_tx));

        Ok(Self {
            events,
            notifier,
            snapshot,
            task: Some(task),
        })
    }

    fn send(&self, event: ClientEvent) -> Result<()> {
        self.events.send(event).map_err(|_| SepError::ClientStopped)
    }

    /// Network state listener entry point
    pub fn network_state_updated(&self, state: ZigBeeNetworkState) -> Result<()> {
        self.send(ClientEvent::NetworkStateUpdated(state))
    }

    /// Command listener entry point
    pub fn command_received(&self, command: ZigBeeCommand) -> Result<()> {
        self.send(ClientEvent::CommandReceived(command))
    }

    /// Node listener entry point
    pub fn node_added(&self, node: ZigBeeNode) -> Result<()> {
        self.send(ClientEvent::NodeAdded(node))
    }

    /// Set the keep-alive interval (5 to 20 minutes).
    ///
    /// Out of range values are rejected here and never reach the client.
    pub fn set_keep_alive_period(&self, period: Duration) -> Result<()> {
        validate_keep_alive_period(period)?;
        self.send(ClientEvent::SetKeepAlivePeriod(period))
    }

    pub fn add_listener(&self, listener: Arc<dyn StatusListener>) {
        self.notifier.add_listener(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn StatusListener>) {
        self.notifier.remove_listener(listener);
    }

    pub fn state(&self) -> ClientState {
        self.snapshot.borrow().state
    }

    pub fn status(&self) -> ClientStatus {
        self.snapshot.borrow().status
    }

    /// Time of the last successful keep-alive poll
    pub fn last_keep_alive(&self) -> Option<DateTime<Utc>> {
        self.snapshot.borrow().last_keep_alive
    }

    pub fn keep_alive_failures(&self) -> u32 {
        self.snapshot.borrow().keep_alive_failures
    }

    /// Watch the published client state
    pub fn subscribe(&self) -> watch::Receiver<ClientSnapshot> {
        self.snapshot.clone()
    }

    /// Stop the client and wait for the event loop to finish
    pub async fn shutdown(mut self) -> Result<()> {
        self.send(ClientEvent::Shutdown)?;
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("SEP client: event loop ended abnormally: {}", e);
                return Err(SepError::ClientStopped);
            }
        }
        Ok(())
    }
}

impl Drop for SmartEnergyClientHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            let _ = self.events.send(ClientEvent::Shutdown);
        }
    }
}

async fn run_event_loop(
    mut client: SmartEnergyClient,
    mut events: mpsc::UnboundedReceiver<ClientEvent>,
    snapshot: watch::Sender<ClientSnapshot>,
) {
    info!("SEP client: event loop started");
    while let Some(event) = events.recv().await {
        let shutdown = matches!(event, ClientEvent::Shutdown);
        client.handle_event(event).await;
        snapshot.send_replace(client.snapshot());
        if shutdown {
            break;
        }
    }
    info!("SEP client: event loop stopped");
}
