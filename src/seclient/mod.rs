//! Smart Energy Profile (SEP) Client
//!
//! Brings a node onto a ZigBee Smart Energy network that the mesh stack has
//! already joined. The client:
//!
//! - Resolves the trust centre (network address 0)
//! - Finds its Key Establishment server and runs CBKE to obtain a link key
//! - Finds metering servers (Energy Service Interfaces) and registers them
//! - Flags APS security on every SEP cluster that requires it
//! - Polls the trust centre periodically to confirm it is still reachable
//!
//! # Architecture
//!
//! The state machine is a plain struct driven by a single event channel:
//!
//! ```text
//!  network stack ──┐
//!  mesh commands ──┤
//!  node listener ──┼──► ClientEvent channel ──► SmartEnergyClient ──► StatusNotifier ──► listeners
//!  timer fires   ──┤                               │        │
//!  CBKE session  ──┘                               │        └──► NetworkManager (registry, ZDO)
//!                                                  └──► Timer / KeyEstablishmentCoordinator
//! ```
//!
//! Each discovery step is run by a repeating timer: a short first delay for
//! the nominal attempt, then a slower repeat in case the response is lost.
//! Every fire counts against a retry budget; exhausting it returns the
//! client to `Idle` and reports `Disconnected`.
//!
//! # Status
//!
//! | State | Status |
//! |---|---|
//! | `Idle` | `Disconnected` |
//! | `Discover*`, `PerformKeyEstablishment` | `Initializing` |
//! | `KeepAlive` | `Connected` |
//!
//! Listeners only hear about status changes, never repeats.
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sep_client::seclient::{ClientStatus, SepClientConfig, SmartEnergyClientHandle};
//! use sep_client::zigbee::ZigBeeNetworkState;
//!
//! let client = SmartEnergyClientHandle::spawn(SepClientConfig::default(), network, cbke)?;
//! client.add_listener(Arc::new(|status: ClientStatus| println!("SEP status {}", status)));
//!
//! // Wire the mesh stack's listeners into the handle
//! client.network_state_updated(ZigBeeNetworkState::Online)?;
//! ```

pub mod client;
pub mod config;
pub mod discovery;
pub mod key_establishment;
pub mod keepalive;
pub mod notifier;
pub mod security;
pub mod service;
pub mod state;
pub mod timer;

pub use client::SmartEnergyClient;
pub use config::{
    SepClientConfig, KEEPALIVE_PERIOD_DEFAULT, KEEPALIVE_PERIOD_MAXIMUM, KEEPALIVE_PERIOD_MINIMUM,
};
pub use discovery::TrustCentreEndpoints;
pub use key_establishment::{
    CbkeProvider, KeyEstablishmentCompletion, KeyEstablishmentSession, KeyEstablishmentTarget,
};
pub use notifier::{StatusListener, StatusNotifier};
pub use security::{SecureClusterSet, SecurityPolicy, SECURE_CLUSTERS};
pub use service::{ClientEvent, ClientSnapshot, SmartEnergyClientHandle};
pub use state::{ClientState, ClientStatus};
pub use timer::{TaskScheduler, TimerCadence, TimerHandle, TokioScheduler};
