//! # sep-client
//!
//! Client side of the ZigBee Smart Energy Profile: trust centre discovery,
//! certificate based key establishment, metering server discovery and
//! keep-alive polling, layered on top of an existing mesh stack.
//!
//! The mesh stack is reached through [`zigbee::NetworkManager`] and the CBKE
//! cryptography through [`seclient::CbkeProvider`]. See [`seclient`] for the
//! state machine.

pub mod error;
pub mod seclient;
pub mod zigbee;

pub use error::{Result, SepError};
pub use seclient::{
    ClientState, ClientStatus, SepClientConfig, SmartEnergyClient, SmartEnergyClientHandle,
};
