//! Network manager collaborator interface

use async_trait::async_trait;

use super::zdo::{IeeeAddressRequest, IeeeAddressResponse, ZdoRequest};
use super::ZigBeeNode;
use crate::error::Result;

/// State of the underlying ZigBee network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ZigBeeNetworkState {
    /// Stack not yet initialised
    Uninitialised,

    /// Stack is joining or forming
    Initialising,

    /// Network joined and usable
    Online,

    /// Network lost
    Offline,

    /// Stack shut down
    Shutdown,
}

/// The mesh stack as seen by the Smart Energy client.
///
/// The registry is shared with other extensions; the client only reads
/// snapshots and writes back whole nodes through [`update_node`](Self::update_node).
#[async_trait]
pub trait NetworkManager: Send + Sync {
    /// Look up a node by network address
    fn get_node(&self, network_address: u16) -> Option<ZigBeeNode>;

    /// All known nodes
    fn get_nodes(&self) -> Vec<ZigBeeNode>;

    /// Add or replace a node in the registry
    fn update_node(&self, node: ZigBeeNode);

    /// Queue a request without waiting for its response. Responses arrive
    /// later as received commands.
    fn send_transaction(&self, request: ZdoRequest) -> Result<()>;

    /// Send an IEEE address request and wait for the matching response.
    ///
    /// The client bounds this call with its transaction timeout.
    async fn request_ieee_address(&self, request: IeeeAddressRequest)
        -> Result<IeeeAddressResponse>;

    /// Read a single attribute from a remote cluster. `Ok(None)` means the
    /// read completed without a value.
    async fn read_attribute(
        &self,
        network_address: u16,
        endpoint: u8,
        cluster_id: u16,
        attribute_id: u16,
    ) -> Result<Option<Vec<u8>>>;
}
