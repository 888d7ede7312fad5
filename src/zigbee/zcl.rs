//! ZCL cluster identifiers used by the Smart Energy Profile

/// ZCL cluster types the Smart Energy client reasons about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u16)]
pub enum ZclClusterType {
    /// Time
    Time = 0x000A,

    /// Commissioning
    Commissioning = 0x0015,

    /// Over-the-air upgrade
    OtaUpgrade = 0x0019,

    /// Keep-Alive (SEP 1.2)
    KeepAlive = 0x0025,

    /// Price
    Price = 0x0700,

    /// Demand Response and Load Control
    DemandResponseAndLoadControl = 0x0701,

    /// Metering
    Metering = 0x0702,

    /// Messaging
    Messaging = 0x0703,

    /// Smart Energy Tunneling
    SmartEnergyTunneling = 0x0704,

    /// Prepayment
    Prepayment = 0x0705,

    /// Key Establishment (CBKE)
    KeyEstablishment = 0x0800,
}

impl ZclClusterType {
    /// Cluster identifier on the wire
    pub const fn id(self) -> u16 {
        self as u16
    }

    /// Convert from a cluster identifier, returns None for clusters we do not track
    pub fn from_id(id: u16) -> Option<Self> {
        match id {
            0x000A => Some(Self::Time),
            0x0015 => Some(Self::Commissioning),
            0x0019 => Some(Self::OtaUpgrade),
            0x0025 => Some(Self::KeepAlive),
            0x0700 => Some(Self::Price),
            0x0701 => Some(Self::DemandResponseAndLoadControl),
            0x0702 => Some(Self::Metering),
            0x0703 => Some(Self::Messaging),
            0x0704 => Some(Self::SmartEnergyTunneling),
            0x0705 => Some(Self::Prepayment),
            0x0800 => Some(Self::KeyEstablishment),
            _ => None,
        }
    }
}

/// Key Establishment server attribute: supported key establishment suites
pub const ATTR_SERVER_KEY_ESTABLISHMENT_SUITE: u16 = 0x0000;

/// Keep-Alive server attribute: keep-alive base in minutes
pub const ATTR_KEEP_ALIVE_BASE: u16 = 0x0000;
