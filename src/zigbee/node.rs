//! Node, endpoint and cluster registry model
//!
//! These are value types: the network manager owns the authoritative copies
//! and the client reads a clone, mutates it and writes it back with
//! [`NetworkManager::update_node`](super::NetworkManager::update_node).
//! All `ensure_*` helpers are create-if-absent so concurrent writers that
//! race on the same node converge on the same shape.

use std::collections::BTreeMap;

use super::IeeeAddress;

/// A cluster instance on an endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ZclCluster {
    /// Cluster identifier
    pub cluster_id: u16,

    /// Commands on this cluster must use APS link-key encryption
    pub aps_security_required: bool,
}

impl ZclCluster {
    /// Create a cluster with APS security disabled
    pub fn new(cluster_id: u16) -> Self {
        Self {
            cluster_id,
            aps_security_required: false,
        }
    }
}

/// An application endpoint on a node
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ZigBeeEndpoint {
    /// Endpoint number (1-240)
    pub endpoint_id: u8,

    /// Application profile identifier
    pub profile_id: u16,

    input_clusters: BTreeMap<u16, ZclCluster>,
    output_clusters: BTreeMap<u16, ZclCluster>,
}

impl ZigBeeEndpoint {
    /// Create an empty endpoint
    pub fn new(endpoint_id: u8, profile_id: u16) -> Self {
        Self {
            endpoint_id,
            profile_id,
            input_clusters: BTreeMap::new(),
            output_clusters: BTreeMap::new(),
        }
    }

    pub fn input_cluster(&self, cluster_id: u16) -> Option<&ZclCluster> {
        self.input_clusters.get(&cluster_id)
    }

    pub fn input_cluster_mut(&mut self, cluster_id: u16) -> Option<&mut ZclCluster> {
        self.input_clusters.get_mut(&cluster_id)
    }

    pub fn output_cluster(&self, cluster_id: u16) -> Option<&ZclCluster> {
        self.output_clusters.get(&cluster_id)
    }

    pub fn output_cluster_mut(&mut self, cluster_id: u16) -> Option<&mut ZclCluster> {
        self.output_clusters.get_mut(&cluster_id)
    }

    /// Add (or replace) a server-side cluster
    pub fn add_input_cluster(&mut self, cluster: ZclCluster) {
        self.input_clusters.insert(cluster.cluster_id, cluster);
    }

    /// Add (or replace) a client-side cluster
    pub fn add_output_cluster(&mut self, cluster: ZclCluster) {
        self.output_clusters.insert(cluster.cluster_id, cluster);
    }

    /// Get the input cluster, creating it when missing.
    ///
    /// Returns the cluster and whether it was created.
    pub fn ensure_input_cluster(&mut self, cluster_id: u16) -> (&mut ZclCluster, bool) {
        let created = !self.input_clusters.contains_key(&cluster_id);
        let cluster = self
            .input_clusters
            .entry(cluster_id)
            .or_insert_with(|| ZclCluster::new(cluster_id));
        (cluster, created)
    }
}

/// A node in the mesh
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ZigBeeNode {
    /// Extended address
    pub ieee_address: IeeeAddress,

    /// Current 16-bit network address
    pub network_address: u16,

    endpoints: BTreeMap<u8, ZigBeeEndpoint>,
}

impl ZigBeeNode {
    /// Create a node with no endpoints
    pub fn new(ieee_address: IeeeAddress, network_address: u16) -> Self {
        Self {
            ieee_address,
            network_address,
            endpoints: BTreeMap::new(),
        }
    }

    pub fn endpoint(&self, endpoint_id: u8) -> Option<&ZigBeeEndpoint> {
        self.endpoints.get(&endpoint_id)
    }

    pub fn endpoint_mut(&mut self, endpoint_id: u8) -> Option<&mut ZigBeeEndpoint> {
        self.endpoints.get_mut(&endpoint_id)
    }

    pub fn endpoints(&self) -> impl Iterator<Item = &ZigBeeEndpoint> {
        self.endpoints.values()
    }

    pub fn endpoints_mut(&mut self) -> impl Iterator<Item = &mut ZigBeeEndpoint> {
        self.endpoints.values_mut()
    }

    /// Add (or replace) an endpoint
    pub fn add_endpoint(&mut self, endpoint: ZigBeeEndpoint) {
        self.endpoints.insert(endpoint.endpoint_id, endpoint);
    }

    /// Get the endpoint, creating it with `profile_id` when missing.
    ///
    /// Returns the endpoint and whether it was created.
    pub fn ensure_endpoint(&mut self, endpoint_id: u8, profile_id: u16) -> (&mut ZigBeeEndpoint, bool) {
        let created = !self.endpoints.contains_key(&endpoint_id);
        let endpoint = self
            .endpoints
            .entry(endpoint_id)
            .or_insert_with(|| ZigBeeEndpoint::new(endpoint_id, profile_id));
        (endpoint, created)
    }

    /// True if any endpoint carries `cluster_id` as an input cluster
    pub fn has_input_cluster(&self, cluster_id: u16) -> bool {
        self.endpoints()
            .any(|endpoint| endpoint.input_cluster(cluster_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zigbee::SMART_ENERGY_PROFILE_ID;

    #[test]
    fn test_ensure_endpoint_is_idempotent() {
        let mut node = ZigBeeNode::new(IeeeAddress::new(1), 0x1234);

        let (_, created) = node.ensure_endpoint(5, SMART_ENERGY_PROFILE_ID);
        assert!(created);

        let (endpoint, created) = node.ensure_endpoint(5, 0x0104);
        assert!(!created);
        // Existing profile is kept
        assert_eq!(endpoint.profile_id, SMART_ENERGY_PROFILE_ID);
        assert_eq!(node.endpoints().count(), 1);
    }

    #[test]
    fn test_ensure_input_cluster_keeps_flags() {
        let mut endpoint = ZigBeeEndpoint::new(1, SMART_ENERGY_PROFILE_ID);
        let (cluster, created) = endpoint.ensure_input_cluster(0x0702);
        assert!(created);
        cluster.aps_security_required = true;

        let (cluster, created) = endpoint.ensure_input_cluster(0x0702);
        assert!(!created);
        assert!(cluster.aps_security_required);
        assert!(endpoint.output_cluster(0x0702).is_none());
    }

    #[test]
    fn test_has_input_cluster() {
        let mut node = ZigBeeNode::new(IeeeAddress::new(1), 0);
        assert!(!node.has_input_cluster(0x0702));

        let mut endpoint = ZigBeeEndpoint::new(2, SMART_ENERGY_PROFILE_ID);
        endpoint.add_output_cluster(ZclCluster::new(0x0702));
        node.add_endpoint(endpoint);
        assert!(!node.has_input_cluster(0x0702));

        node.endpoint_mut(2)
            .unwrap()
            .add_input_cluster(ZclCluster::new(0x0702));
        assert!(node.has_input_cluster(0x0702));
    }
}
