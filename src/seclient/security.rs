//! Smart Energy Profile APS security policy
//!
//! Once a node is authorised through CBKE, every SEP cluster listed in
//! [`SECURE_CLUSTERS`] on its Smart Energy endpoints must be addressed with
//! APS link-key encryption.

use log::debug;

use crate::zigbee::{ZclClusterType, ZigBeeNode, SMART_ENERGY_PROFILE_ID};

/// Set of cluster types that require APS security
#[derive(Debug, Clone, Copy)]
pub struct SecureClusterSet(&'static [ZclClusterType]);

/// Clusters SEP requires to be APS secured
pub const SECURE_CLUSTERS: SecureClusterSet = SecureClusterSet(&[
    ZclClusterType::Time,
    ZclClusterType::Commissioning,
    ZclClusterType::OtaUpgrade,
    ZclClusterType::Price,
    ZclClusterType::DemandResponseAndLoadControl,
    ZclClusterType::Metering,
    ZclClusterType::Messaging,
    ZclClusterType::SmartEnergyTunneling,
    ZclClusterType::Prepayment,
]);

impl SecureClusterSet {
    pub fn contains(&self, cluster_id: u16) -> bool {
        self.0.iter().any(|cluster| cluster.id() == cluster_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = ZclClusterType> + '_ {
        self.0.iter().copied()
    }
}

/// Applies the secure cluster set to authorised nodes
#[derive(Debug, Clone, Copy)]
pub struct SecurityPolicy {
    secure_clusters: SecureClusterSet,
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self::new(SECURE_CLUSTERS)
    }
}

impl SecurityPolicy {
    pub fn new(secure_clusters: SecureClusterSet) -> Self {
        Self { secure_clusters }
    }

    pub fn secure_clusters(&self) -> SecureClusterSet {
        self.secure_clusters
    }

    /// Flag APS security on the node's secure SEP clusters.
    ///
    /// Does nothing unless `authorised`. Returns the number of clusters whose
    /// flag changed, so callers only write back nodes that were modified.
    pub fn apply(&self, node: &mut ZigBeeNode, authorised: bool) -> usize {
        let ieee_address = node.ieee_address;
        if !authorised {
            debug!("{}: SEP node is not authorised", ieee_address);
            return 0;
        }

        let mut changed = 0;
        for endpoint in node.endpoints_mut() {
            if endpoint.profile_id != SMART_ENERGY_PROFILE_ID {
                debug!(
                    "{}: SEP endpoint {} is not SmartEnergy",
                    ieee_address, endpoint.endpoint_id
                );
                continue;
            }

            for cluster_type in self.secure_clusters.iter() {
                if let Some(cluster) = endpoint.input_cluster_mut(cluster_type.id()) {
                    if !cluster.aps_security_required {
                        debug!(
                            "{}: SEP setting profile security for input cluster {:?}",
                            ieee_address, cluster_type
                        );
                        cluster.aps_security_required = true;
                        changed += 1;
                    }
                }
                if let Some(cluster) = endpoint.output_cluster_mut(cluster_type.id()) {
                    if !cluster.aps_security_required {
                        debug!(
                            "{}: SEP setting profile security for output cluster {:?}",
                            ieee_address, cluster_type
                        );
                        cluster.aps_security_required = true;
                        changed += 1;
                    }
                }
            }
        }
        changed
    }
}
