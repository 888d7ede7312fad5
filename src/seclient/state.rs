//! Client state machine states and the externally visible status

use std::fmt;

/// Discovery / maintenance state of the Smart Energy client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ClientState {
    /// Network offline or discovery abandoned
    #[default]
    Idle,

    /// Resolving the IEEE address of the trust centre
    DiscoverTrustCentre,

    /// Looking for the Key Establishment server on the trust centre
    DiscoverKeyEstablishmentCluster,

    /// Running CBKE against the trust centre
    PerformKeyEstablishment,

    /// Looking for metering servers
    DiscoverMeteringServers,

    /// Looking for the Keep-Alive cluster on the trust centre
    DiscoverKeepAlive,

    /// Keep-Alive cluster search outstanding; falls back to polling the
    /// Key Establishment cluster on the next timer fire
    DiscoverKeepAliveTimeout,

    /// Joined; polling the trust centre for liveness
    KeepAlive,
}

/// Coarse status reported to listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ClientStatus {
    #[default]
    Disconnected,
    Initializing,
    Connected,
}

/// What entering a state does to the timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerPolicy {
    /// Cancel any pending timer
    Cancel,

    /// Arm the immediate-then-retry cadence
    Retry,

    /// Arm the keep-alive cadence
    KeepAlive,

    /// Leave the current timer running
    Unchanged,
}

impl ClientState {
    /// Status derived from the state
    pub fn status(self) -> ClientStatus {
        match self {
            Self::Idle => ClientStatus::Disconnected,
            Self::DiscoverTrustCentre
            | Self::DiscoverKeyEstablishmentCluster
            | Self::PerformKeyEstablishment
            | Self::DiscoverMeteringServers
            | Self::DiscoverKeepAlive
            | Self::DiscoverKeepAliveTimeout => ClientStatus::Initializing,
            Self::KeepAlive => ClientStatus::Connected,
        }
    }

    pub(crate) fn timer_policy(self) -> TimerPolicy {
        match self {
            Self::Idle => TimerPolicy::Cancel,
            Self::DiscoverTrustCentre
            | Self::DiscoverKeyEstablishmentCluster
            | Self::PerformKeyEstablishment
            | Self::DiscoverMeteringServers
            | Self::DiscoverKeepAlive => TimerPolicy::Retry,
            Self::DiscoverKeepAliveTimeout => TimerPolicy::Unchanged,
            Self::KeepAlive => TimerPolicy::KeepAlive,
        }
    }
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "IDLE",
            Self::DiscoverTrustCentre => "DISCOVER_TRUST_CENTRE",
            Self::DiscoverKeyEstablishmentCluster => "DISCOVER_KEY_ESTABLISHMENT_CLUSTER",
            Self::PerformKeyEstablishment => "PERFORM_KEY_ESTABLISHMENT",
            Self::DiscoverMeteringServers => "DISCOVER_METERING_SERVERS",
            Self::DiscoverKeepAlive => "DISCOVER_KEEP_ALIVE",
            Self::DiscoverKeepAliveTimeout => "DISCOVER_KEEP_ALIVE_TIMEOUT",
            Self::KeepAlive => "KEEP_ALIVE",
        };
        f.write_str(name)
    }
}

impl fmt::Display for ClientStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "DISCONNECTED",
            Self::Initializing => "INITIALIZING",
            Self::Connected => "CONNECTED",
        };
        f.write_str(name)
    }
}
