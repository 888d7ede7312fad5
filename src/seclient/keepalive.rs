//! Trust centre keep-alive monitoring
//!
//! While joined, the client periodically reads an attribute from the trust
//! centre over an APS secured link. A value coming back proves both that
//! the trust centre is reachable and that the link key is still good.
//! Failures are only counted; what to do after repeated failures is left to
//! the state machine's retry budget.

use std::time::Duration;

use chrono::{DateTime, Utc};
use log::debug;
use tokio::time::timeout;

use super::config::validate_keep_alive_period;
use super::discovery::TrustCentreEndpoints;
use super::timer::TimerCadence;
use crate::error::{Result, SepError};
use crate::zigbee::zcl::{ATTR_KEEP_ALIVE_BASE, ATTR_SERVER_KEY_ESTABLISHMENT_SUITE};
use crate::zigbee::{NetworkManager, ZclClusterType, ZigBeeNode, TRUST_CENTRE_ADDRESS};

/// Attribute read used as the liveness probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAliveProbe {
    pub endpoint: u8,
    pub cluster_id: u16,
    pub attribute_id: u16,
}

impl KeepAliveProbe {
    /// Pick the probe for the trust centre.
    ///
    /// Prefers the Keep-Alive cluster when it was discovered, otherwise reads
    /// the Key Establishment suite attribute. Returns `None` when neither
    /// endpoint carries the expected cluster.
    pub fn select(trust_centre: &ZigBeeNode, endpoints: &TrustCentreEndpoints) -> Option<Self> {
        if let Some(endpoint) = endpoints.keep_alive {
            return Some(Self {
                endpoint,
                cluster_id: ZclClusterType::KeepAlive.id(),
                attribute_id: ATTR_KEEP_ALIVE_BASE,
            });
        }

        let endpoint = endpoints.key_establishment?;
        let cluster_id = ZclClusterType::KeyEstablishment.id();
        trust_centre
            .endpoint(endpoint)?
            .input_cluster(cluster_id)?;
        Some(Self {
            endpoint,
            cluster_id,
            attribute_id: ATTR_SERVER_KEY_ESTABLISHMENT_SUITE,
        })
    }

    /// Read the probe attribute from the trust centre, bounded by `limit`
    pub async fn read(
        &self,
        network: &dyn NetworkManager,
        limit: Duration,
    ) -> Result<Option<Vec<u8>>> {
        timeout(
            limit,
            network.read_attribute(
                TRUST_CENTRE_ADDRESS,
                self.endpoint,
                self.cluster_id,
                self.attribute_id,
            ),
        )
        .await
        .map_err(|_| SepError::Timeout(limit))?
    }
}

/// Keep-alive interval, failure count and last success time
#[derive(Debug, Clone)]
pub struct KeepAliveMonitor {
    period: Duration,
    failures: u32,
    last_success: Option<DateTime<Utc>>,
}

impl KeepAliveMonitor {
    /// Create a monitor; `period` is expected to have been validated
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            failures: 0,
            last_success: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Change the poll interval. Out of range values leave it unchanged.
    pub fn set_period(&mut self, period: Duration) -> Result<()> {
        validate_keep_alive_period(period)?;
        self.period = period;
        Ok(())
    }

    /// Timer cadence for polling
    pub fn cadence(&self) -> TimerCadence {
        TimerCadence::new(self.period, self.period)
    }

    pub fn record_success(&mut self, now: DateTime<Utc>) {
        self.failures = 0;
        self.last_success = Some(now);
        debug!("SEP keep-alive: poll successful");
    }

    pub fn record_failure(&mut self) {
        self.failures = self.failures.saturating_add(1);
        debug!(
            "SEP keep-alive: poll unsuccessful. Failures={}",
            self.failures
        );
    }

    /// Consecutive failed polls
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Time of the last successful poll
    pub fn last_success(&self) -> Option<DateTime<Utc>> {
        self.last_success
    }
}
