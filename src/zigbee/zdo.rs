//! ZigBee Device Object (ZDO) discovery commands
//!
//! Only the semantic fields the Smart Energy client needs are modelled. The
//! mesh stack is responsible for putting these on the air and for decoding
//! responses into [`ZigBeeCommand`] values.

use super::{IeeeAddress, SMART_ENERGY_PROFILE_ID};

/// ZDO status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ZdoStatus {
    /// Request completed
    Success = 0x00,

    /// Request type not supported
    InvalidRequestType = 0x80,

    /// Address of interest not found
    DeviceNotFound = 0x81,

    /// Invalid endpoint
    InvalidEndpoint = 0x82,

    /// Endpoint not active
    NotActive = 0x83,

    /// Request not supported
    NotSupported = 0x84,

    /// Request timed out
    Timeout = 0x85,

    /// No descriptor matched
    NoMatch = 0x86,
}

impl ZdoStatus {
    /// Convert from u8, returns None for unknown values
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::Success),
            0x80 => Some(Self::InvalidRequestType),
            0x81 => Some(Self::DeviceNotFound),
            0x82 => Some(Self::InvalidEndpoint),
            0x83 => Some(Self::NotActive),
            0x84 => Some(Self::NotSupported),
            0x85 => Some(Self::Timeout),
            0x86 => Some(Self::NoMatch),
            _ => None,
        }
    }
}

/// Match_Desc_req: which endpoints on a node support a cluster in a profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchDescriptorRequest {
    /// Node (or broadcast address) the request is sent to
    pub destination: u16,

    /// Address whose descriptors are matched
    pub nwk_addr_of_interest: u16,

    /// Profile to match against
    pub profile_id: u16,

    /// Server clusters to match
    pub in_cluster_list: Vec<u16>,

    /// Client clusters to match
    pub out_cluster_list: Vec<u16>,
}

impl MatchDescriptorRequest {
    /// Smart Energy match for a single cluster on either side
    pub fn smart_energy(destination: u16, cluster_id: u16) -> Self {
        Self {
            destination,
            nwk_addr_of_interest: destination,
            profile_id: SMART_ENERGY_PROFILE_ID,
            in_cluster_list: vec![cluster_id],
            out_cluster_list: vec![cluster_id],
        }
    }
}

/// Match_Desc_rsp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchDescriptorResponse {
    /// Response status
    pub status: ZdoStatus,

    /// Node that sent the response
    pub source_address: u16,

    /// Address whose descriptors were matched
    pub nwk_addr_of_interest: u16,

    /// Matching endpoints
    pub match_list: Vec<u8>,
}

/// IEEE_addr_req
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IeeeAddressRequest {
    /// Node the request is sent to
    pub destination: u16,

    /// Address whose IEEE address is requested
    pub nwk_addr_of_interest: u16,

    /// 0 = single device response
    pub request_type: u8,

    /// Start index into the associated device list
    pub start_index: u8,
}

impl IeeeAddressRequest {
    /// Single device request for `network_address`
    pub fn single(network_address: u16) -> Self {
        Self {
            destination: network_address,
            nwk_addr_of_interest: network_address,
            request_type: 0,
            start_index: 0,
        }
    }
}

/// IEEE_addr_rsp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IeeeAddressResponse {
    /// Response status
    pub status: ZdoStatus,

    /// IEEE address of the remote device
    pub ieee_addr_remote_dev: IeeeAddress,

    /// Network address of the remote device
    pub nwk_addr_remote_dev: u16,
}

/// Fire-and-forget requests handed to the network manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZdoRequest {
    MatchDescriptor(MatchDescriptorRequest),
    IeeeAddress(IeeeAddressRequest),
}

/// Commands received from the mesh that the client may care about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZigBeeCommand {
    /// Match_Desc_rsp
    MatchDescriptorResponse(MatchDescriptorResponse),

    /// IEEE_addr_rsp (unsolicited or late)
    IeeeAddressResponse(IeeeAddressResponse),

    /// Anything else; ignored by the client
    Other { source_address: u16, cluster_id: u16 },
}
