//! Service discovery against the mesh
//!
//! Queries are fire-and-forget: results come back later as received
//! commands and are fed into the `record_*` methods by the client, which
//! decides whether the response is relevant to its current state. Only IEEE
//! address resolution waits for its answer, bounded by the transaction
//! timeout.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error};
use tokio::time::timeout;

use crate::error::{Result, SepError};
use crate::zigbee::{
    IeeeAddress, IeeeAddressRequest, IeeeAddressResponse, MatchDescriptorRequest, MatchDescriptorResponse,
    NetworkManager, ZclClusterType, ZdoRequest, ZdoStatus, ZigBeeNode, BROADCAST_RX_ON,
    SMART_ENERGY_PROFILE_ID, TRUST_CENTRE_ADDRESS,
};

/// Endpoints on the trust centre learnt during discovery
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrustCentreEndpoints {
    /// Endpoint hosting the Key Establishment server
    pub key_establishment: Option<u8>,

    /// Endpoint hosting the Keep-Alive server
    pub keep_alive: Option<u8>,
}

/// Result of recording a Key Establishment server response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustCentreUpdate {
    /// Endpoint recorded and registry updated
    Recorded(u8),

    /// The trust centre is no longer in the registry
    TrustCentreMissing,
}

pub struct DiscoveryProtocol {
    network: Arc<dyn NetworkManager>,
    transaction_timeout: Duration,
}

impl DiscoveryProtocol {
    pub fn new(network: Arc<dyn NetworkManager>, transaction_timeout: Duration) -> Self {
        Self {
            network,
            transaction_timeout,
        }
    }

    /// True if the response is successful and matched at least one endpoint
    pub fn is_usable(response: &MatchDescriptorResponse) -> bool {
        response.status == ZdoStatus::Success && !response.match_list.is_empty()
    }

    /// Send a Smart Energy descriptor match for `cluster_id`
    pub fn discover_services(&self, destination: u16, cluster_id: u16) {
        let request = MatchDescriptorRequest::smart_energy(destination, cluster_id);
        if let Err(e) = self
            .network
            .send_transaction(ZdoRequest::MatchDescriptor(request))
        {
            // The retry timer will send it again
            debug!(
                "SEP discovery: match descriptor to {:04X} for cluster {:04X} failed: {}",
                destination, cluster_id, e
            );
        }
    }

    /// Look for the Key Establishment server on the trust centre
    pub fn discover_key_establishment_server(&self) {
        debug!("SEP discovery: searching for Key Establishment server");
        self.discover_services(TRUST_CENTRE_ADDRESS, ZclClusterType::KeyEstablishment.id());
    }

    /// Broadcast a search for metering servers
    pub fn discover_metering_servers(&self) {
        debug!("SEP discovery: searching for Energy Service Interfaces");
        self.discover_services(BROADCAST_RX_ON, ZclClusterType::Metering.id());
    }

    /// Look for the Keep-Alive server on the trust centre
    pub fn discover_keep_alive(&self) {
        debug!("SEP discovery: searching for Keep-Alive cluster");
        self.discover_services(TRUST_CENTRE_ADDRESS, ZclClusterType::KeepAlive.id());
    }

    /// Send an IEEE address request and wait at most the transaction timeout
    pub async fn resolve_ieee_address(&self, network_address: u16) -> Result<IeeeAddressResponse> {
        let request = IeeeAddressRequest::single(network_address);
        timeout(
            self.transaction_timeout,
            self.network.request_ieee_address(request),
        )
        .await
        .map_err(|_| SepError::Timeout(self.transaction_timeout))?
    }

    /// Resolve the IEEE address behind a network address.
    ///
    /// Returns `None` on timeout, transport failure or an unsuccessful
    /// response; all of those are retried by the caller's timer.
    pub async fn request_ieee_address(&self, network_address: u16) -> Option<IeeeAddress> {
        match self.resolve_ieee_address(network_address).await {
            Ok(response) if response.status == ZdoStatus::Success => {
                debug!(
                    "SEP discovery: IEEE address of {:04X} is {}",
                    network_address, response.ieee_addr_remote_dev
                );
                Some(response.ieee_addr_remote_dev)
            }
            Ok(response) => {
                debug!(
                    "SEP discovery: IEEE address request to {:04X} returned {:?}",
                    network_address, response.status
                );
                None
            }
            Err(e) => {
                debug!(
                    "SEP discovery: IEEE address request to {:04X} failed: {}",
                    network_address, e
                );
                None
            }
        }
    }

    /// Add the trust centre to the registry under address 0
    pub fn add_trust_centre(&self, ieee_address: IeeeAddress) {
        self.network
            .update_node(ZigBeeNode::new(ieee_address, TRUST_CENTRE_ADDRESS));
    }

    /// Record the Key Establishment endpoint from a trust centre response.
    ///
    /// Key Establishment is a global cluster, so the first match is used.
    /// The endpoint and cluster are created on the trust centre if absent.
    pub fn record_key_establishment_server(
        &self,
        response: &MatchDescriptorResponse,
    ) -> TrustCentreUpdate {
        let Some(&endpoint) = response.match_list.first() else {
            return TrustCentreUpdate::TrustCentreMissing;
        };
        debug!(
            "SEP discovery: using endpoint {} for KeyEstablishment",
            endpoint
        );
        if self.upsert_trust_centre_cluster(endpoint, ZclClusterType::KeyEstablishment) {
            TrustCentreUpdate::Recorded(endpoint)
        } else {
            TrustCentreUpdate::TrustCentreMissing
        }
    }

    /// Record the Keep-Alive endpoint from a trust centre response
    pub fn record_keep_alive_server(&self, response: &MatchDescriptorResponse) -> Option<u8> {
        let endpoint = *response.match_list.first()?;
        debug!("SEP discovery: using endpoint {} for KeepAlive", endpoint);
        if !self.upsert_trust_centre_cluster(endpoint, ZclClusterType::KeepAlive) {
            debug!("SEP discovery: Trust Centre not in node list, Keep-Alive cluster not added");
        }
        Some(endpoint)
    }

    /// Attach metering clusters to every endpoint in the response.
    ///
    /// Unknown source nodes are created after resolving their IEEE address.
    /// Returns false if the node could not be resolved.
    pub async fn record_metering_servers(&self, response: &MatchDescriptorResponse) -> bool {
        let source = response.source_address;
        let mut node = match self.network.get_node(source) {
            Some(node) => node,
            None => {
                debug!(
                    "SEP discovery: node {:04X} is unknown - getting IEEE address",
                    source
                );
                let Some(ieee_address) = self.request_ieee_address(source).await else {
                    error!(
                        "SEP discovery: unable to resolve metering server {:04X}",
                        source
                    );
                    return false;
                };
                ZigBeeNode::new(ieee_address, source)
            }
        };

        let metering_id = ZclClusterType::Metering.id();
        for &endpoint_id in &response.match_list {
            let (endpoint, created) = node.ensure_endpoint(endpoint_id, SMART_ENERGY_PROFILE_ID);
            if created {
                // Metering may live on a different endpoint from Key Establishment
                debug!(
                    "SEP discovery: adding metering endpoint {:04X}/{}",
                    source, endpoint_id
                );
            }

            let (cluster, created) = endpoint.ensure_input_cluster(metering_id);
            if created {
                debug!(
                    "SEP discovery: adding metering cluster to endpoint {:04X}/{}",
                    source, endpoint_id
                );
                cluster.aps_security_required = true;
            } else {
                debug!(
                    "SEP discovery: metering cluster already supported in endpoint {:04X}/{}",
                    source, endpoint_id
                );
            }
        }
        self.network.update_node(node);
        true
    }

    fn upsert_trust_centre_cluster(&self, endpoint_id: u8, cluster_type: ZclClusterType) -> bool {
        let Some(mut trust_centre) = self.network.get_node(TRUST_CENTRE_ADDRESS) else {
            return false;
        };

        let (endpoint, created) = trust_centre.ensure_endpoint(endpoint_id, SMART_ENERGY_PROFILE_ID);
        if created {
            debug!(
                "SEP discovery: adding Trust Centre endpoint {}",
                endpoint_id
            );
        }
        let (_, created) = endpoint.ensure_input_cluster(cluster_type.id());
        if created {
            debug!(
                "SEP discovery: adding {:?} input cluster to endpoint {}",
                cluster_type, endpoint_id
            );
        }
        self.network.update_node(trust_centre);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeNetwork {
        nodes: Mutex<HashMap<u16, ZigBeeNode>>,
        sent: Mutex<Vec<ZdoRequest>>,
        identities: HashMap<u16, IeeeAddress>,
        hang: bool,
    }

    #[async_trait]
    impl NetworkManager for FakeNetwork {
        fn get_node(&self, network_address: u16) -> Option<ZigBeeNode> {
            self.nodes.lock().get(&network_address).cloned()
        }

        fn get_nodes(&self) -> Vec<ZigBeeNode> {
            self.nodes.lock().values().cloned().collect()
        }

        fn update_node(&self, node: ZigBeeNode) {
            self.nodes.lock().insert(node.network_address, node);
        }

        fn send_transaction(&self, request: ZdoRequest) -> Result<()> {
            self.sent.lock().push(request);
            Ok(())
        }

        async fn request_ieee_address(
            &self,
            request: IeeeAddressRequest,
        ) -> Result<IeeeAddressResponse> {
            if self.hang {
                std::future::pending::<()>().await;
            }
            match self.identities.get(&request.nwk_addr_of_interest) {
                Some(ieee) => Ok(IeeeAddressResponse {
                    status: ZdoStatus::Success,
                    ieee_addr_remote_dev: *ieee,
                    nwk_addr_remote_dev: request.nwk_addr_of_interest,
                }),
                None => Err(SepError::Transport("no route".to_string())),
            }
        }

        async fn read_attribute(&self, _: u16, _: u8, _: u16, _: u16) -> Result<Option<Vec<u8>>> {
            Ok(None)
        }
    }

    fn response(source_address: u16, match_list: Vec<u8>) -> MatchDescriptorResponse {
        MatchDescriptorResponse {
            status: ZdoStatus::Success,
            source_address,
            nwk_addr_of_interest: source_address,
            match_list,
        }
    }

    fn protocol(network: Arc<FakeNetwork>) -> DiscoveryProtocol {
        DiscoveryProtocol::new(network, Duration::from_secs(10))
    }

    #[test]
    fn test_usable_response() {
        assert!(DiscoveryProtocol::is_usable(&response(0, vec![1])));
        assert!(!DiscoveryProtocol::is_usable(&response(0, vec![])));

        let mut failed = response(0, vec![1]);
        failed.status = ZdoStatus::NoMatch;
        assert!(!DiscoveryProtocol::is_usable(&failed));
    }

    #[test]
    fn test_metering_discovery_is_broadcast() {
        let network = Arc::new(FakeNetwork::default());
        protocol(network.clone()).discover_metering_servers();

        let sent = network.sent.lock();
        match &sent[..] {
            [ZdoRequest::MatchDescriptor(request)] => {
                assert_eq!(request.destination, BROADCAST_RX_ON);
                assert_eq!(request.in_cluster_list, vec![0x0702]);
                assert_eq!(request.profile_id, SMART_ENERGY_PROFILE_ID);
            }
            other => panic!("unexpected requests {:?}", other),
        }
    }

    #[test]
    fn test_record_key_establishment_upserts_trust_centre() {
        let network = Arc::new(FakeNetwork::default());
        let discovery = protocol(network.clone());

        assert_eq!(
            discovery.record_key_establishment_server(&response(0, vec![5, 6])),
            TrustCentreUpdate::TrustCentreMissing
        );

        discovery.add_trust_centre(IeeeAddress::new(0xAA));
        assert_eq!(
            discovery.record_key_establishment_server(&response(0, vec![5, 6])),
            TrustCentreUpdate::Recorded(5)
        );
        // Second time is a no-op upsert
        discovery.record_key_establishment_server(&response(0, vec![5]));

        let trust_centre = network.get_node(0).unwrap();
        assert_eq!(trust_centre.endpoints().count(), 1);
        let endpoint = trust_centre.endpoint(5).unwrap();
        assert_eq!(endpoint.profile_id, SMART_ENERGY_PROFILE_ID);
        assert!(endpoint.input_cluster(0x0800).is_some());
    }

    #[tokio::test]
    async fn test_record_metering_creates_unknown_node() {
        let mut network = FakeNetwork::default();
        network
            .identities
            .insert(0x4321, IeeeAddress::new(0x0102_0304_0506_0708));
        let network = Arc::new(network);

        let recorded = protocol(network.clone())
            .record_metering_servers(&response(0x4321, vec![1, 2]))
            .await;
        assert!(recorded);

        let node = network.get_node(0x4321).unwrap();
        assert_eq!(node.ieee_address, IeeeAddress::new(0x0102_0304_0506_0708));
        for endpoint in [1, 2] {
            let cluster = node.endpoint(endpoint).unwrap().input_cluster(0x0702).unwrap();
            assert!(cluster.aps_security_required);
        }
    }

    #[tokio::test]
    async fn test_record_metering_unresolvable_node_dropped() {
        let network = Arc::new(FakeNetwork::default());
        let recorded = protocol(network.clone())
            .record_metering_servers(&response(0x4321, vec![1]))
            .await;
        assert!(!recorded);
        assert!(network.get_nodes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ieee_request_times_out() {
        let network = Arc::new(FakeNetwork {
            hang: true,
            ..Default::default()
        });
        let discovery = protocol(network);
        assert_eq!(
            discovery.resolve_ieee_address(0).await,
            Err(SepError::Timeout(Duration::from_secs(10)))
        );
        assert_eq!(discovery.request_ieee_address(0).await, None);
    }
}
