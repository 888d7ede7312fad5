//! Certificate Based Key Establishment (CBKE) coordination
//!
//! The cryptographic exchange itself is performed by an external session
//! created through [`CbkeProvider`]. The coordinator checks the
//! preconditions, owns the one live session and routes its completion back
//! into the client event channel.

use std::sync::Arc;

use log::{debug, error};
use tokio::sync::mpsc;

use super::service::ClientEvent;
use crate::zigbee::{IeeeAddress, ZclClusterType, ZigBeeNode};

/// An external key establishment exchange
pub trait KeyEstablishmentSession: Send {
    /// Begin the exchange. The outcome is reported through the
    /// [`KeyEstablishmentCompletion`] given at creation.
    fn start(&mut self);

    /// Abort the exchange and release its resources
    fn stop(&mut self);
}

/// Source of CBKE authorisation state and key establishment sessions
pub trait CbkeProvider: Send + Sync {
    /// True if a link key has already been established with `ieee_address`
    fn is_authorised(&self, ieee_address: &IeeeAddress) -> bool;

    /// Create a session against the Key Establishment server at `target`
    fn create_session(
        &self,
        target: KeyEstablishmentTarget,
        completion: KeyEstablishmentCompletion,
    ) -> Box<dyn KeyEstablishmentSession>;
}

/// The Key Establishment server a session talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEstablishmentTarget {
    pub ieee_address: IeeeAddress,
    pub network_address: u16,
    pub endpoint: u8,
}

/// Completion callback handed to a session
#[derive(Debug, Clone)]
pub struct KeyEstablishmentCompletion {
    session: u64,
    events: mpsc::UnboundedSender<ClientEvent>,
}

impl KeyEstablishmentCompletion {
    /// Report the outcome. `retry_hint_secs` is the server's requested wait
    /// before another attempt on failure; 0 means use the default.
    pub fn complete(&self, success: bool, retry_hint_secs: u32) {
        let event = ClientEvent::KeyEstablishmentComplete {
            session: self.session,
            success,
            retry_hint_secs,
        };
        if self.events.send(event).is_err() {
            debug!("CBKE session {}: client stopped before completion", self.session);
        }
    }

    /// Session this completion belongs to
    pub fn session(&self) -> u64 {
        self.session
    }
}

/// Outcome of an attempt to start key establishment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEstablishmentAttempt {
    /// A session was started
    Started(u64),

    /// The trust centre is already authorised; no session needed
    AlreadyAuthorised,

    /// Preconditions unmet; retried on the next timer fire
    Unavailable,
}

pub struct KeyEstablishmentCoordinator {
    provider: Arc<dyn CbkeProvider>,
    events: mpsc::UnboundedSender<ClientEvent>,
    session: Option<(u64, Box<dyn KeyEstablishmentSession>)>,
    next_session: u64,
}

impl KeyEstablishmentCoordinator {
    pub fn new(provider: Arc<dyn CbkeProvider>, events: mpsc::UnboundedSender<ClientEvent>) -> Self {
        Self {
            provider,
            events,
            session: None,
            next_session: 0,
        }
    }

    pub fn is_authorised(&self, ieee_address: &IeeeAddress) -> bool {
        self.provider.is_authorised(ieee_address)
    }

    /// Start key establishment with the trust centre.
    ///
    /// The endpoint must be known and the trust centre must expose the Key
    /// Establishment server on it.
    pub fn attempt(
        &mut self,
        trust_centre: Option<&ZigBeeNode>,
        endpoint: Option<u8>,
    ) -> KeyEstablishmentAttempt {
        let Some(endpoint_id) = endpoint else {
            debug!("CBKE: key establishment endpoint not known");
            return KeyEstablishmentAttempt::Unavailable;
        };
        let Some(trust_centre) = trust_centre else {
            error!("CBKE: Trust Centre not found in network nodes list");
            return KeyEstablishmentAttempt::Unavailable;
        };
        let Some(endpoint) = trust_centre.endpoint(endpoint_id) else {
            error!("CBKE: endpoint {} not found in Trust Centre", endpoint_id);
            return KeyEstablishmentAttempt::Unavailable;
        };
        if endpoint
            .input_cluster(ZclClusterType::KeyEstablishment.id())
            .is_none()
        {
            error!(
                "CBKE: Key Establishment cluster not found in endpoint {}",
                endpoint_id
            );
            return KeyEstablishmentAttempt::Unavailable;
        }

        if self.provider.is_authorised(&trust_centre.ieee_address) {
            debug!("CBKE: already authorised with {}", trust_centre.ieee_address);
            return KeyEstablishmentAttempt::AlreadyAuthorised;
        }

        self.stop();
        self.next_session = self.next_session.wrapping_add(1);
        let session_id = self.next_session;
        let target = KeyEstablishmentTarget {
            ieee_address: trust_centre.ieee_address,
            network_address: trust_centre.network_address,
            endpoint: endpoint_id,
        };
        let completion = KeyEstablishmentCompletion {
            session: session_id,
            events: self.events.clone(),
        };

        debug!(
            "CBKE: starting session {} with {} endpoint {}",
            session_id, target.ieee_address, endpoint_id
        );
        let mut session = self.provider.create_session(target, completion);
        session.start();
        self.session = Some((session_id, session));
        KeyEstablishmentAttempt::Started(session_id)
    }

    /// Stop and discard the live session, if any
    pub fn stop(&mut self) {
        if let Some((session_id, mut session)) = self.session.take() {
            debug!("CBKE: stopping session {}", session_id);
            session.stop();
        }
    }

    /// Identifier of the live session
    pub fn active_session(&self) -> Option<u64> {
        self.session.as_ref().map(|(session_id, _)| *session_id)
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }
}

impl Drop for KeyEstablishmentCoordinator {
    fn drop(&mut self) {
        self.stop();
    }
}
