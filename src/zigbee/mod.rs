//! ZigBee Mesh Data Model
//!
//! The Smart Energy client sits above an already-joined ZigBee network and
//! only needs a narrow view of it:
//!
//! - **Addressing**: 16-bit network addresses and 64-bit IEEE identities
//! - **Registry model**: nodes, endpoints and the clusters they expose
//! - **ZDO commands**: descriptor-match and IEEE-address discovery frames
//! - **Network manager**: the collaborator that owns the registry and the
//!   transport (see [`network::NetworkManager`])
//!
//! Frame encoding, routing and network-key management belong to the mesh
//! stack and are not modelled here.

pub mod network;
pub mod node;
pub mod zcl;
pub mod zdo;

use std::fmt;
use std::str::FromStr;

use crate::error::SepError;

pub use network::{NetworkManager, ZigBeeNetworkState};
pub use node::{ZclCluster, ZigBeeEndpoint, ZigBeeNode};
pub use zcl::ZclClusterType;
pub use zdo::{
    IeeeAddressRequest, IeeeAddressResponse, MatchDescriptorRequest, MatchDescriptorResponse,
    ZdoRequest, ZdoStatus, ZigBeeCommand,
};

/// Network address of the trust centre (always the coordinator)
pub const TRUST_CENTRE_ADDRESS: u16 = 0x0000;

/// Broadcast to all devices with the receiver on when idle
pub const BROADCAST_RX_ON: u16 = 0xFFFD;

/// ZigBee Smart Energy application profile identifier
pub const SMART_ENERGY_PROFILE_ID: u16 = 0x0109;

/// 64-bit IEEE (extended) address of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IeeeAddress(u64);

impl IeeeAddress {
    /// Create an address from its 64-bit value
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Raw 64-bit value
    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for IeeeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016X}", self.0)
    }
}

impl FromStr for IeeeAddress {
    type Err = SepError;

    /// Accepts `0011223344556677` or colon separated `00:11:22:33:44:55:66:77`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits: String = s.chars().filter(|c| *c != ':').collect();
        if digits.len() != 16 {
            return Err(SepError::InvalidIeeeAddress(s.to_string()));
        }
        u64::from_str_radix(&digits, 16)
            .map(Self)
            .map_err(|_| SepError::InvalidIeeeAddress(s.to_string()))
    }
}
