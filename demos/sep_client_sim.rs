//! Smart Energy Client Simulation
//!
//! Runs the SEP client against a simulated mesh: an in-memory trust centre
//! that answers descriptor matches and IEEE address requests, one metering
//! server, and a CBKE provider that always succeeds after a short delay.
//!
//! # Usage
//!
//! ```bash
//! RUST_LOG=debug cargo run --example sep_client_sim
//! ```
//!
//! Or with custom parameters:
//!
//! ```bash
//! SEP_TC_IEEE="00:11:22:33:44:55:66:77" \
//! SEP_KEEPALIVE_SECS=300 \
//! SEP_RUN_SECS=60 \
//! cargo run --example sep_client_sim
//! ```

use std::collections::BTreeMap;
use std::env;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use sep_client::seclient::{
    CbkeProvider, ClientStatus, KeyEstablishmentCompletion, KeyEstablishmentSession,
    KeyEstablishmentTarget, SepClientConfig, SmartEnergyClientHandle,
};
use sep_client::zigbee::{
    IeeeAddress, IeeeAddressRequest, IeeeAddressResponse, MatchDescriptorResponse,
    NetworkManager, ZclClusterType, ZdoRequest, ZdoStatus, ZigBeeCommand, ZigBeeNetworkState,
    ZigBeeNode, BROADCAST_RX_ON, TRUST_CENTRE_ADDRESS,
};
use sep_client::SepError;

const METER_ADDRESS: u16 = 0x4A2F;
const METER_IEEE: IeeeAddress = IeeeAddress::new(0x000D_6F00_0ABC_1234);
const TC_ENDPOINT: u8 = 1;
const METER_ENDPOINT: u8 = 2;

/// Mesh with a trust centre and one meter that answer discovery
struct SimulatedMesh {
    trust_centre: IeeeAddress,
    nodes: Mutex<BTreeMap<u16, ZigBeeNode>>,
    responses: mpsc::UnboundedSender<ZigBeeCommand>,
}

impl SimulatedMesh {
    fn answer_match(&self, destination: u16, cluster_id: u16) {
        let (source_address, endpoint) = match (destination, ZclClusterType::from_id(cluster_id)) {
            (TRUST_CENTRE_ADDRESS, Some(ZclClusterType::KeyEstablishment)) => {
                (TRUST_CENTRE_ADDRESS, TC_ENDPOINT)
            }
            (BROADCAST_RX_ON, Some(ZclClusterType::Metering)) => (METER_ADDRESS, METER_ENDPOINT),
            _ => return,
        };
        let response = MatchDescriptorResponse {
            status: ZdoStatus::Success,
            source_address,
            nwk_addr_of_interest: source_address,
            match_list: vec![endpoint],
        };
        let _ = self
            .responses
            .send(ZigBeeCommand::MatchDescriptorResponse(response));
    }
}

#[async_trait]
impl NetworkManager for SimulatedMesh {
    fn get_node(&self, network_address: u16) -> Option<ZigBeeNode> {
        self.nodes.lock().get(&network_address).cloned()
    }

    fn get_nodes(&self) -> Vec<ZigBeeNode> {
        self.nodes.lock().values().cloned().collect()
    }

    fn update_node(&self, node: ZigBeeNode) {
        println!("  registry: node {:04X} updated", node.network_address);
        self.nodes.lock().insert(node.network_address, node);
    }

    fn send_transaction(&self, request: ZdoRequest) -> sep_client::Result<()> {
        if let ZdoRequest::MatchDescriptor(request) = request {
            println!(
                "  mesh: Match_Desc_req to {:04X} for cluster {:04X}",
                request.destination, request.in_cluster_list[0]
            );
            self.answer_match(request.destination, request.in_cluster_list[0]);
        }
        Ok(())
    }

    async fn request_ieee_address(
        &self,
        request: IeeeAddressRequest,
    ) -> sep_client::Result<IeeeAddressResponse> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let ieee_addr_remote_dev = match request.nwk_addr_of_interest {
            TRUST_CENTRE_ADDRESS => self.trust_centre,
            METER_ADDRESS => METER_IEEE,
            other => return Err(SepError::Transport(format!("no route to {:04X}", other))),
        };
        Ok(IeeeAddressResponse {
            status: ZdoStatus::Success,
            ieee_addr_remote_dev,
            nwk_addr_remote_dev: request.nwk_addr_of_interest,
        })
    }

    async fn read_attribute(
        &self,
        network_address: u16,
        endpoint: u8,
        cluster_id: u16,
        attribute_id: u16,
    ) -> sep_client::Result<Option<Vec<u8>>> {
        println!(
            "  mesh: read {:04X}/{} cluster {:04X} attribute {:04X}",
            network_address, endpoint, cluster_id, attribute_id
        );
        Ok(Some(vec![0x01]))
    }
}

/// CBKE that succeeds two seconds after it starts
#[derive(Default)]
struct SimulatedCbke {
    authorised: Arc<Mutex<Vec<IeeeAddress>>>,
}

struct SimulatedSession {
    target: KeyEstablishmentTarget,
    completion: KeyEstablishmentCompletion,
    authorised: Arc<Mutex<Vec<IeeeAddress>>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl KeyEstablishmentSession for SimulatedSession {
    fn start(&mut self) {
        println!("  cbke: starting with {}", self.target.ieee_address);
        let completion = self.completion.clone();
        let authorised = Arc::clone(&self.authorised);
        let ieee_address = self.target.ieee_address;
        self.task = Some(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            authorised.lock().push(ieee_address);
            completion.complete(true, 0);
        }));
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl CbkeProvider for SimulatedCbke {
    fn is_authorised(&self, ieee_address: &IeeeAddress) -> bool {
        self.authorised.lock().contains(ieee_address)
    }

    fn create_session(
        &self,
        target: KeyEstablishmentTarget,
        completion: KeyEstablishmentCompletion,
    ) -> Box<dyn KeyEstablishmentSession> {
        Box::new(SimulatedSession {
            target,
            completion,
            authorised: Arc::clone(&self.authorised),
            task: None,
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::init();

    println!("Smart Energy Client Simulation");
    println!("==============================\n");

    let trust_centre: IeeeAddress = env::var("SEP_TC_IEEE")
        .unwrap_or_else(|_| "00:11:22:33:44:55:66:77".to_string())
        .parse()?;
    let keep_alive_secs: u64 = env::var("SEP_KEEPALIVE_SECS")
        .unwrap_or_else(|_| "300".to_string())
        .parse()?;
    let run_secs: u64 = env::var("SEP_RUN_SECS")
        .unwrap_or_else(|_| "30".to_string())
        .parse()?;

    println!("Configuration:");
    println!("  Trust Centre: {}", trust_centre);
    println!("  Keep-alive: {} s", keep_alive_secs);
    println!("  Run time: {} s\n", run_secs);

    let config = SepClientConfig {
        keep_alive_period: Duration::from_secs(keep_alive_secs),
        ..SepClientConfig::default()
    };

    let (responses, mut incoming) = mpsc::unbounded_channel();
    let mesh = Arc::new(SimulatedMesh {
        trust_centre,
        nodes: Mutex::new(BTreeMap::new()),
        responses,
    });
    let cbke = Arc::new(SimulatedCbke::default());

    let client = Arc::new(SmartEnergyClientHandle::spawn(config, mesh, cbke)?);
    client.add_listener(Arc::new(|status: ClientStatus| {
        println!("SEP status: {}", status);
    }));

    // Deliver the mesh's answers back to the client
    let forwarder = {
        let client = Arc::clone(&client);
        tokio::spawn(async move {
            while let Some(command) = incoming.recv().await {
                if client.command_received(command).is_err() {
                    break;
                }
            }
        })
    };

    println!("Network online, starting discovery...");
    client.network_state_updated(ZigBeeNetworkState::Online)?;

    println!("Running for {} seconds, press Ctrl+C to stop\n", run_secs);
    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(run_secs)) => {}
        _ = tokio::signal::ctrl_c() => println!("\nInterrupted"),
    }

    println!("\nFinal state: {} ({})", client.state(), client.status());
    if let Some(last) = client.last_keep_alive() {
        println!("Last keep-alive: {}", last.to_rfc3339());
    }

    forwarder.abort();
    let _ = forwarder.await;
    match Arc::try_unwrap(client) {
        Ok(client) => client.shutdown().await?,
        Err(_) => eprintln!("Client handle still shared, dropping"),
    }

    println!("Simulation completed");
    Ok(())
}
