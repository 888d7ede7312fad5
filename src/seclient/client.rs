//! Smart Energy client state machine
//!
//! [`SmartEnergyClient`] owns the discovery / maintenance state and is only
//! ever mutated through `&mut self`, one event at a time. In production the
//! event loop in [`service`](super::service) feeds it; tests can drive it
//! directly.
//!
//! ```text
//!            online                     IEEE addr of 0
//!   IDLE ───────────► DISCOVER_TRUST_CENTRE ───────────► DISCOVER_KEY_ESTABLISHMENT_CLUSTER
//!    ▲                                                         │ Match_Desc_rsp from 0
//!    │ offline /                                               ▼
//!    │ retries exhausted                              PERFORM_KEY_ESTABLISHMENT ◄─┐ CBKE failed
//!    │                                                         │ CBKE ok          └─(backoff)
//!    │                                                         ▼
//!    └──────────────────── KEEP_ALIVE ◄──────────── DISCOVER_METERING_SERVERS
//!                                      Match_Desc_rsp
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use tokio::sync::mpsc;

use super::config::SepClientConfig;
use super::discovery::{DiscoveryProtocol, TrustCentreEndpoints, TrustCentreUpdate};
use super::key_establishment::{CbkeProvider, KeyEstablishmentAttempt, KeyEstablishmentCoordinator};
use super::keepalive::{KeepAliveMonitor, KeepAliveProbe};
use super::notifier::StatusNotifier;
use super::security::SecurityPolicy;
use super::service::{ClientEvent, ClientSnapshot};
use super::state::{ClientState, ClientStatus, TimerPolicy};
use super::timer::{TaskScheduler, Timer, TimerCadence};
use crate::error::Result;
use crate::zigbee::{
    MatchDescriptorResponse, NetworkManager, ZclClusterType, ZigBeeCommand, ZigBeeNetworkState,
    ZigBeeNode, TRUST_CENTRE_ADDRESS,
};

/// The Smart Energy Profile client controller
pub struct SmartEnergyClient {
    config: SepClientConfig,
    network: Arc<dyn NetworkManager>,
    discovery: DiscoveryProtocol,
    key_establishment: KeyEstablishmentCoordinator,
    security: SecurityPolicy,
    keep_alive: KeepAliveMonitor,
    notifier: StatusNotifier,
    timer: Timer,
    state: ClientState,
    status: ClientStatus,
    retry_counter: u32,
    endpoints: TrustCentreEndpoints,
}

impl SmartEnergyClient {
    /// Create a client in the `Idle` state.
    ///
    /// `events` is the channel key establishment completions are posted to;
    /// it must be the channel that feeds [`handle_event`](Self::handle_event).
    pub fn new(
        config: SepClientConfig,
        network: Arc<dyn NetworkManager>,
        cbke: Arc<dyn CbkeProvider>,
        scheduler: Arc<dyn TaskScheduler>,
        events: mpsc::UnboundedSender<ClientEvent>,
    ) -> Self {
        let discovery = DiscoveryProtocol::new(Arc::clone(&network), config.transaction_timeout);
        let keep_alive = KeepAliveMonitor::new(config.keep_alive_period);

        Self {
            discovery,
            key_establishment: KeyEstablishmentCoordinator::new(cbke, events),
            security: SecurityPolicy::default(),
            keep_alive,
            notifier: StatusNotifier::new(),
            timer: Timer::new(scheduler),
            state: ClientState::Idle,
            status: ClientStatus::Disconnected,
            retry_counter: 0,
            endpoints: TrustCentreEndpoints::default(),
            network,
            config,
        }
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Last status notified to listeners
    pub fn status(&self) -> ClientStatus {
        self.status
    }

    pub fn retry_counter(&self) -> u32 {
        self.retry_counter
    }

    pub fn trust_centre_endpoints(&self) -> TrustCentreEndpoints {
        self.endpoints
    }

    pub fn keep_alive_period(&self) -> Duration {
        self.keep_alive.period()
    }

    /// Consecutive failed keep-alive polls
    pub fn keep_alive_failures(&self) -> u32 {
        self.keep_alive.failures()
    }

    /// Time of the last successful keep-alive poll
    pub fn last_keep_alive(&self) -> Option<DateTime<Utc>> {
        self.keep_alive.last_success()
    }

    /// Cadence of the pending timer, `None` when no timer is armed
    pub fn timer_cadence(&self) -> Option<TimerCadence> {
        self.timer.cadence()
    }

    /// Identifier of the running key establishment session
    pub fn key_establishment_session(&self) -> Option<u64> {
        self.key_establishment.active_session()
    }

    pub fn notifier(&self) -> &StatusNotifier {
        &self.notifier
    }

    pub fn snapshot(&self) -> ClientSnapshot {
        ClientSnapshot {
            state: self.state,
            status: self.status,
            keep_alive_failures: self.keep_alive.failures(),
            last_keep_alive: self.keep_alive.last_success(),
        }
    }

    /// Dispatch one event from the client channel
    pub async fn handle_event(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::NetworkStateUpdated(state) => self.network_state_updated(state),
            ClientEvent::CommandReceived(command) => self.on_response(&command).await,
            ClientEvent::NodeAdded(node) => self.node_added(node),
            ClientEvent::TimerFired { generation } => {
                if self.timer.is_current(generation) {
                    self.on_timer().await;
                } else {
                    debug!("SEP client: dropping stale timer fire {}", generation);
                }
            }
            ClientEvent::KeyEstablishmentComplete {
                session,
                success,
                retry_hint_secs,
            } => {
                if self.state == ClientState::PerformKeyEstablishment
                    && self.key_establishment.active_session() == Some(session)
                {
                    self.on_key_establishment_result(success, retry_hint_secs);
                } else {
                    debug!(
                        "SEP client: dropping completion of CBKE session {} in {}",
                        session, self.state
                    );
                }
            }
            ClientEvent::SetKeepAlivePeriod(period) => {
                if let Err(e) = self.set_keep_alive_period(period) {
                    warn!("SEP client: keep-alive period not changed: {}", e);
                }
            }
            ClientEvent::Shutdown => self.shutdown(),
        }
    }

    /// Apply the profile security policy to every node already known
    pub fn startup(&mut self) {
        debug!("SEP client: applying profile security to known nodes");
        for node in self.network.get_nodes() {
            self.secure_node(node);
        }
    }

    /// Stop discovery and release the timer and any CBKE session
    pub fn shutdown(&mut self) {
        self.stop();
        info!("SEP client: shutdown");
    }

    pub fn network_state_updated(&mut self, state: ZigBeeNetworkState) {
        match state {
            ZigBeeNetworkState::Online => self.start(),
            ZigBeeNetworkState::Offline => self.stop(),
            _ => debug!("SEP client: ignoring network state {:?}", state),
        }
    }

    /// Begin discovery, skipping the steps already satisfied by the registry
    pub fn start(&mut self) {
        info!("SEP client: starting discovery");

        // The user asked us to start again
        self.retry_counter = 0;
        self.key_establishment.stop();

        match self.network.get_node(TRUST_CENTRE_ADDRESS) {
            Some(trust_centre) if self.key_establishment.is_authorised(&trust_centre.ieee_address) => {
                debug!(
                    "SEP client: Trust Centre {} is already authorised",
                    trust_centre.ieee_address
                );
                if self.endpoints.key_establishment.is_none() {
                    self.endpoints.key_establishment = trust_centre
                        .endpoints()
                        .find(|endpoint| {
                            endpoint
                                .input_cluster(ZclClusterType::KeyEstablishment.id())
                                .is_some()
                        })
                        .map(|endpoint| endpoint.endpoint_id);
                }

                let metering_known =
                    trust_centre.has_input_cluster(ZclClusterType::Metering.id());
                self.secure_node(trust_centre);
                if metering_known {
                    self.discovery_complete();
                } else {
                    self.update_state(ClientState::DiscoverMeteringServers);
                }
            }
            Some(_) => self.update_state(ClientState::DiscoverKeyEstablishmentCluster),
            None => self.update_state(ClientState::DiscoverTrustCentre),
        }
        debug!("SEP client: discovery starting at {}", self.state);
    }

    /// Abandon discovery and return to `Idle`
    pub fn stop(&mut self) {
        debug!(
            "SEP client: discovery stopped at {} after {} retries",
            self.state, self.retry_counter
        );
        self.timer.cancel();
        self.key_establishment.stop();
        self.update_state(ClientState::Idle);
    }

    /// Run the current state's step. Called on every live timer fire.
    pub async fn on_timer(&mut self) {
        let attempt = self.retry_counter;
        self.retry_counter = self.retry_counter.saturating_add(1);
        if attempt > self.config.max_retries {
            info!(
                "SEP client: giving up at {} after {} attempts",
                self.state, attempt
            );
            self.stop();
            return;
        }
        debug!(
            "SEP client: running task {}, attempt {}",
            self.state, self.retry_counter
        );

        match self.state {
            ClientState::DiscoverTrustCentre => self.discover_trust_centre().await,
            ClientState::DiscoverKeyEstablishmentCluster => {
                self.discovery.discover_key_establishment_server()
            }
            ClientState::PerformKeyEstablishment => self.perform_key_establishment(),
            ClientState::DiscoverMeteringServers => self.discovery.discover_metering_servers(),
            ClientState::DiscoverKeepAlive => {
                self.discovery.discover_keep_alive();
                self.update_state(ClientState::DiscoverKeepAliveTimeout);
            }
            ClientState::DiscoverKeepAliveTimeout => {
                debug!("SEP client: no Keep-Alive cluster, polling Key Establishment instead");
                self.update_state(ClientState::KeepAlive);
            }
            ClientState::KeepAlive => self.keep_alive_poll().await,
            ClientState::Idle => {}
        }
    }

    /// Feed a command received from the mesh
    pub async fn on_response(&mut self, command: &ZigBeeCommand) {
        if let ZigBeeCommand::MatchDescriptorResponse(response) = command {
            self.handle_match_descriptor_response(response).await;
        }
    }

    /// Outcome of the running key establishment session
    pub fn on_key_establishment_result(&mut self, success: bool, retry_hint_secs: u32) {
        if !self.key_establishment.is_active() {
            warn!("SEP client: key establishment result with no session running");
            return;
        }
        self.key_establishment.stop();

        if success {
            if let Some(trust_centre) = self.network.get_node(TRUST_CENTRE_ADDRESS) {
                self.secure_node(trust_centre);
            }
            self.update_state(ClientState::DiscoverMeteringServers);
        } else {
            let delay = if retry_hint_secs == 0 {
                self.config.key_establishment_backoff
            } else {
                Duration::from_secs(u64::from(retry_hint_secs))
            };
            debug!(
                "SEP client: key establishment failed, retrying in {:?}",
                delay
            );
            self.transition(ClientState::PerformKeyEstablishment, delay);
        }
        debug!("SEP client: key establishment complete, state {}", self.state);
    }

    /// Enforce profile security on a newly added node
    pub fn node_added(&mut self, node: ZigBeeNode) {
        self.secure_node(node);
    }

    /// Change the keep-alive interval, re-arming the poll if already joined
    pub fn set_keep_alive_period(&mut self, period: Duration) -> Result<()> {
        self.keep_alive.set_period(period)?;
        if self.state == ClientState::KeepAlive {
            self.timer.start(self.keep_alive.cadence());
        }
        Ok(())
    }

    fn update_state(&mut self, new_state: ClientState) {
        self.transition(new_state, self.config.timer_immediate);
    }

    /// Move to `new_state`; retry states first fire after `first_delay`
    fn transition(&mut self, new_state: ClientState, first_delay: Duration) {
        debug!(
            "SEP client: state updated from {} to {}",
            self.state, new_state
        );
        if self.state != new_state {
            self.retry_counter = 0;
        }
        self.state = new_state;

        match new_state.timer_policy() {
            TimerPolicy::Cancel => self.timer.cancel(),
            TimerPolicy::Retry => {
                let cadence =
                    TimerCadence::new(first_delay, first_delay + self.config.retry_period);
                self.timer.start(cadence);
            }
            TimerPolicy::KeepAlive => {
                self.timer.start(self.keep_alive.cadence());
            }
            TimerPolicy::Unchanged => {}
        }

        let status = new_state.status();
        if status != self.status {
            info!("SEP client: status updated to {}", status);
            self.status = status;
            self.notifier.notify(status);
        }
    }

    fn discovery_complete(&mut self) {
        debug!("SEP client: discovery complete");
        self.timer.cancel();
        if self.config.discover_keep_alive_cluster {
            self.update_state(ClientState::DiscoverKeepAlive);
        } else {
            self.update_state(ClientState::KeepAlive);
        }
    }

    async fn discover_trust_centre(&mut self) {
        if self.network.get_node(TRUST_CENTRE_ADDRESS).is_some() {
            debug!("SEP client: Trust Centre already known");
            self.update_state(ClientState::DiscoverKeyEstablishmentCluster);
            return;
        }

        let Some(ieee_address) = self
            .discovery
            .request_ieee_address(TRUST_CENTRE_ADDRESS)
            .await
        else {
            debug!("SEP client: Trust Centre IEEE address not found");
            return;
        };
        debug!("SEP client: found Trust Centre {}", ieee_address);

        self.discovery.add_trust_centre(ieee_address);
        self.update_state(ClientState::DiscoverKeyEstablishmentCluster);
    }

    fn perform_key_establishment(&mut self) {
        if let Some(session) = self.key_establishment.active_session() {
            debug!("SEP client: key establishment session {} still running", session);
            return;
        }

        let trust_centre = self.network.get_node(TRUST_CENTRE_ADDRESS);
        match self
            .key_establishment
            .attempt(trust_centre.as_ref(), self.endpoints.key_establishment)
        {
            KeyEstablishmentAttempt::Started(session) => {
                debug!("SEP client: key establishment session {} started", session);
            }
            KeyEstablishmentAttempt::AlreadyAuthorised => {
                if let Some(trust_centre) = trust_centre {
                    self.secure_node(trust_centre);
                }
                self.update_state(ClientState::DiscoverMeteringServers);
            }
            KeyEstablishmentAttempt::Unavailable => {}
        }
    }

    async fn handle_match_descriptor_response(&mut self, response: &MatchDescriptorResponse) {
        // Retry timer covers anything we drop here
        if !DiscoveryProtocol::is_usable(response) {
            return;
        }

        match self.state {
            ClientState::DiscoverKeyEstablishmentCluster => {
                if response.source_address != TRUST_CENTRE_ADDRESS {
                    return;
                }
                match self.discovery.record_key_establishment_server(response) {
                    TrustCentreUpdate::Recorded(endpoint) => {
                        self.endpoints.key_establishment = Some(endpoint);
                        self.update_state(ClientState::PerformKeyEstablishment);
                    }
                    TrustCentreUpdate::TrustCentreMissing => {
                        debug!("SEP client: Trust Centre not found in network nodes list");
                        self.update_state(ClientState::DiscoverTrustCentre);
                    }
                }
            }
            ClientState::DiscoverMeteringServers => {
                if self.discovery.record_metering_servers(response).await {
                    self.discovery_complete();
                }
            }
            ClientState::DiscoverKeepAlive | ClientState::DiscoverKeepAliveTimeout => {
                if response.source_address != TRUST_CENTRE_ADDRESS {
                    return;
                }
                if let Some(endpoint) = self.discovery.record_keep_alive_server(response) {
                    self.endpoints.keep_alive = Some(endpoint);
                    self.update_state(ClientState::KeepAlive);
                }
            }
            _ => {}
        }
    }

    async fn keep_alive_poll(&mut self) {
        debug!("SEP client: performing Trust Centre keep-alive poll");

        let Some(trust_centre) = self.network.get_node(TRUST_CENTRE_ADDRESS) else {
            error!("SEP client: Trust Centre not found for keep-alive poll");
            return;
        };
        let Some(probe) = KeepAliveProbe::select(&trust_centre, &self.endpoints) else {
            error!("SEP client: no keep-alive cluster known on Trust Centre");
            return;
        };

        match probe
            .read(self.network.as_ref(), self.config.transaction_timeout)
            .await
        {
            Ok(Some(_)) => {
                self.keep_alive.record_success(Utc::now());
                self.retry_counter = 0;
            }
            Ok(None) => self.keep_alive.record_failure(),
            Err(e) => {
                debug!("SEP client: keep-alive read failed: {}", e);
                self.keep_alive.record_failure();
            }
        }
    }

    /// Apply profile security and write the node back if anything changed
    fn secure_node(&self, mut node: ZigBeeNode) {
        debug!("{}: SEP setting profile security", node.ieee_address);
        let authorised = self.key_establishment.is_authorised(&node.ieee_address);
        if self.security.apply(&mut node, authorised) > 0 {
            self.network.update_node(node);
        }
    }
}
