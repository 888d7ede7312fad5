//! In-memory collaborators for driving the client in tests

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use sep_client::seclient::{
    CbkeProvider, ClientEvent, ClientStatus, KeyEstablishmentCompletion, KeyEstablishmentSession,
    KeyEstablishmentTarget, SepClientConfig, SmartEnergyClient, StatusListener, TaskScheduler,
    TimerCadence, TimerHandle,
};
use sep_client::zigbee::{
    IeeeAddress, IeeeAddressRequest, IeeeAddressResponse, MatchDescriptorResponse,
    NetworkManager, ZclCluster, ZclClusterType, ZdoRequest, ZdoStatus, ZigBeeEndpoint,
    ZigBeeNode, SMART_ENERGY_PROFILE_ID,
};
use sep_client::{Result, SepError};

pub const TC_IEEE: IeeeAddress = IeeeAddress::new(0x0011_2233_4455_6677);
pub const KE_ENDPOINT: u8 = 5;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Default)]
pub struct MockNetwork {
    pub nodes: Mutex<BTreeMap<u16, ZigBeeNode>>,
    pub sent: Mutex<Vec<ZdoRequest>>,
    pub identities: Mutex<HashMap<u16, IeeeAddress>>,
    pub reads: Mutex<Vec<(u16, u8, u16, u16)>>,
    pub read_value: Mutex<Option<Vec<u8>>>,
    pub stall_reads: Mutex<bool>,
    pub updates: Mutex<Vec<ZigBeeNode>>,
}

impl MockNetwork {
    pub fn add_node(&self, node: ZigBeeNode) {
        self.nodes.lock().insert(node.network_address, node);
    }

    pub fn set_identity(&self, network_address: u16, ieee_address: IeeeAddress) {
        self.identities.lock().insert(network_address, ieee_address);
    }

    pub fn set_read_value(&self, value: Option<Vec<u8>>) {
        *self.read_value.lock() = value;
    }

    pub fn node(&self, network_address: u16) -> Option<ZigBeeNode> {
        self.nodes.lock().get(&network_address).cloned()
    }

    /// Match descriptor requests sent so far as (destination, cluster)
    pub fn match_requests(&self) -> Vec<(u16, u16)> {
        self.sent
            .lock()
            .iter()
            .filter_map(|request| match request {
                ZdoRequest::MatchDescriptor(request) => {
                    Some((request.destination, request.in_cluster_list[0]))
                }
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl NetworkManager for MockNetwork {
    fn get_node(&self, network_address: u16) -> Option<ZigBeeNode> {
        self.node(network_address)
    }

    fn get_nodes(&self) -> Vec<ZigBeeNode> {
        self.nodes.lock().values().cloned().collect()
    }

    fn update_node(&self, node: ZigBeeNode) {
        self.updates.lock().push(node.clone());
        self.add_node(node);
    }

    fn send_transaction(&self, request: ZdoRequest) -> Result<()> {
        self.sent.lock().push(request);
        Ok(())
    }

    async fn request_ieee_address(&self, request: IeeeAddressRequest) -> Result<IeeeAddressResponse> {
        let ieee = self
            .identities
            .lock()
            .get(&request.nwk_addr_of_interest)
            .copied();
        match ieee {
            Some(ieee) => Ok(IeeeAddressResponse {
                status: ZdoStatus::Success,
                ieee_addr_remote_dev: ieee,
                nwk_addr_remote_dev: request.nwk_addr_of_interest,
            }),
            None => Err(SepError::Transport("no response".to_string())),
        }
    }

    async fn read_attribute(
        &self,
        network_address: u16,
        endpoint: u8,
        cluster_id: u16,
        attribute_id: u16,
    ) -> Result<Option<Vec<u8>>> {
        self.reads
            .lock()
            .push((network_address, endpoint, cluster_id, attribute_id));
        let stalled = *self.stall_reads.lock();
        if stalled {
            std::future::pending::<()>().await;
        }
        Ok(self.read_value.lock().clone())
    }
}

#[derive(Default)]
pub struct MockCbke {
    pub authorised: Mutex<HashSet<IeeeAddress>>,
    pub log: Arc<Mutex<Vec<String>>>,
    pub completions: Mutex<Vec<KeyEstablishmentCompletion>>,
    pub targets: Mutex<Vec<KeyEstablishmentTarget>>,
}

impl MockCbke {
    pub fn authorise(&self, ieee_address: IeeeAddress) {
        self.authorised.lock().insert(ieee_address);
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    pub fn last_completion(&self) -> Option<KeyEstablishmentCompletion> {
        self.completions.lock().last().cloned()
    }
}

struct MockSession {
    id: u64,
    log: Arc<Mutex<Vec<String>>>,
}

impl KeyEstablishmentSession for MockSession {
    fn start(&mut self) {
        self.log.lock().push(format!("start {}", self.id));
    }

    fn stop(&mut self) {
        self.log.lock().push(format!("stop {}", self.id));
    }
}

impl CbkeProvider for MockCbke {
    fn is_authorised(&self, ieee_address: &IeeeAddress) -> bool {
        self.authorised.lock().contains(ieee_address)
    }

    fn create_session(
        &self,
        target: KeyEstablishmentTarget,
        completion: KeyEstablishmentCompletion,
    ) -> Box<dyn KeyEstablishmentSession> {
        let id = completion.session();
        self.targets.lock().push(target);
        self.completions.lock().push(completion);
        Box::new(MockSession {
            id,
            log: Arc::clone(&self.log),
        })
    }
}

/// Scheduler that records armings and never fires on its own
#[derive(Default)]
pub struct RecordingScheduler {
    pub armings: Mutex<Vec<(u64, TimerCadence)>>,
    pub cancelled: Arc<Mutex<Vec<u64>>>,
}

impl RecordingScheduler {
    pub fn last_generation(&self) -> Option<u64> {
        self.armings.lock().last().map(|(generation, _)| *generation)
    }
}

struct RecordingHandle {
    generation: u64,
    cancelled: Arc<Mutex<Vec<u64>>>,
    done: bool,
}

impl TimerHandle for RecordingHandle {
    fn cancel(&mut self) {
        if !self.done {
            self.done = true;
            self.cancelled.lock().push(self.generation);
        }
    }
}

impl TaskScheduler for RecordingScheduler {
    fn schedule(&self, generation: u64, cadence: TimerCadence) -> Box<dyn TimerHandle> {
        self.armings.lock().push((generation, cadence));
        Box::new(RecordingHandle {
            generation,
            cancelled: Arc::clone(&self.cancelled),
            done: false,
        })
    }
}

pub struct Harness {
    pub client: SmartEnergyClient,
    pub network: Arc<MockNetwork>,
    pub cbke: Arc<MockCbke>,
    pub scheduler: Arc<RecordingScheduler>,
    pub events: mpsc::UnboundedReceiver<ClientEvent>,
    pub statuses: mpsc::UnboundedReceiver<ClientStatus>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(SepClientConfig::default())
    }

    pub fn with_config(config: SepClientConfig) -> Self {
        init_logging();
        let network = Arc::new(MockNetwork::default());
        let cbke = Arc::new(MockCbke::default());
        let scheduler = Arc::new(RecordingScheduler::default());
        let (tx, events) = mpsc::unbounded_channel();

        let client = SmartEnergyClient::new(
            config,
            network.clone(),
            cbke.clone(),
            scheduler.clone(),
            tx,
        );

        let (status_tx, statuses) = mpsc::unbounded_channel();
        let listener: Arc<dyn StatusListener> = Arc::new(move |status: ClientStatus| {
            let _ = status_tx.send(status);
        });
        client.notifier().add_listener(listener);

        Self {
            client,
            network,
            cbke,
            scheduler,
            events,
            statuses,
        }
    }

    /// Status notifications delivered so far
    pub async fn notified(&mut self) -> Vec<ClientStatus> {
        // Let the dispatcher task deliver
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        let mut statuses = Vec::new();
        while let Ok(status) = self.statuses.try_recv() {
            statuses.push(status);
        }
        statuses
    }

    /// Fire the live timer arming through the event path
    pub async fn fire(&mut self) {
        let generation = self
            .scheduler
            .last_generation()
            .expect("no timer armed");
        self.client
            .handle_event(ClientEvent::TimerFired { generation })
            .await;
    }

    /// Deliver queued events (CBKE completions) to the client
    pub async fn pump(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.client.handle_event(event).await;
        }
    }
}

/// Trust centre with the Key Establishment server on `KE_ENDPOINT`
pub fn trust_centre() -> ZigBeeNode {
    let mut node = ZigBeeNode::new(TC_IEEE, 0);
    let mut endpoint = ZigBeeEndpoint::new(KE_ENDPOINT, SMART_ENERGY_PROFILE_ID);
    endpoint.add_input_cluster(ZclCluster::new(ZclClusterType::KeyEstablishment.id()));
    node.add_endpoint(endpoint);
    node
}

/// Trust centre that also serves metering on endpoint 1
pub fn trust_centre_with_metering() -> ZigBeeNode {
    let mut node = trust_centre();
    let mut endpoint = ZigBeeEndpoint::new(1, SMART_ENERGY_PROFILE_ID);
    endpoint.add_input_cluster(ZclCluster::new(ZclClusterType::Metering.id()));
    endpoint.add_input_cluster(ZclCluster::new(ZclClusterType::Price.id()));
    node.add_endpoint(endpoint);
    node
}

pub fn match_response(source_address: u16, match_list: Vec<u8>) -> MatchDescriptorResponse {
    MatchDescriptorResponse {
        status: ZdoStatus::Success,
        source_address,
        nwk_addr_of_interest: source_address,
        match_list,
    }
}
