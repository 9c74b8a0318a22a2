use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether a connected link actually reaches the public internet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Option<bool>", into = "Option<bool>")]
pub enum Reachability {
    Reachable,
    Unreachable,
    #[default]
    Unknown,
}

impl Reachability {
    pub fn from_option(value: Option<bool>) -> Self {
        match value {
            Some(true) => Reachability::Reachable,
            Some(false) => Reachability::Unreachable,
            None => Reachability::Unknown,
        }
    }

    pub fn as_option(self) -> Option<bool> {
        match self {
            Reachability::Reachable => Some(true),
            Reachability::Unreachable => Some(false),
            Reachability::Unknown => None,
        }
    }
}

impl From<Option<bool>> for Reachability {
    fn from(value: Option<bool>) -> Self {
        Self::from_option(value)
    }
}

impl From<Reachability> for Option<bool> {
    fn from(value: Reachability) -> Self {
        value.as_option()
    }
}

impl std::fmt::Display for Reachability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reachability::Reachable => write!(f, "reachable"),
            Reachability::Unreachable => write!(f, "unreachable"),
            Reachability::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    Wifi,
    Cellular,
    Ethernet,
    Bluetooth,
    Wimax,
    Vpn,
    Other,
    Unknown,
    None,
}

impl ConnectionType {
    /// Parse a platform-reported type name. Unrecognized names map to `Unknown`.
    pub fn from_platform(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "wifi" | "wi-fi" | "wlan" => ConnectionType::Wifi,
            "cellular" | "mobile" => ConnectionType::Cellular,
            "ethernet" | "wired" => ConnectionType::Ethernet,
            "bluetooth" => ConnectionType::Bluetooth,
            "wimax" => ConnectionType::Wimax,
            "vpn" => ConnectionType::Vpn,
            "other" => ConnectionType::Other,
            "none" => ConnectionType::None,
            _ => ConnectionType::Unknown,
        }
    }
}

impl std::fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionType::Wifi => "wifi",
            ConnectionType::Cellular => "cellular",
            ConnectionType::Ethernet => "ethernet",
            ConnectionType::Bluetooth => "bluetooth",
            ConnectionType::Wimax => "wimax",
            ConnectionType::Vpn => "vpn",
            ConnectionType::Other => "other",
            ConnectionType::Unknown => "unknown",
            ConnectionType::None => "none",
        };
        write!(f, "{}", name)
    }
}

/// Raw connectivity reading as a platform reports it. Any field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformSignal {
    pub is_connected: Option<bool>,
    pub is_internet_reachable: Option<bool>,
    #[serde(rename = "type")]
    pub connection_type: Option<String>,
}

impl PlatformSignal {
    pub fn new(
        is_connected: bool,
        is_internet_reachable: Reachability,
        connection_type: Option<ConnectionType>,
    ) -> Self {
        Self {
            is_connected: Some(is_connected),
            is_internet_reachable: is_internet_reachable.as_option(),
            connection_type: connection_type.map(|kind| kind.to_string()),
        }
    }

    /// No link and no internet.
    pub fn offline() -> Self {
        Self::new(false, Reachability::Unreachable, Some(ConnectionType::None))
    }
}

/// Last known connectivity of the host.
///
/// `is_internet_reachable` is never `Reachable` while `is_connected` is false;
/// every constructor enforces this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct NetworkState {
    pub is_connected: bool,
    #[serde(default)]
    #[cfg_attr(feature = "ts", ts(type = "boolean | null"))]
    pub is_internet_reachable: Reachability,
    pub connection_type: Option<ConnectionType>,
    #[cfg_attr(feature = "ts", ts(type = "string | null"))]
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl Default for NetworkState {
    /// Optimistic startup state used before the first probe: assume a link,
    /// reachability not yet known.
    fn default() -> Self {
        Self {
            is_connected: true,
            is_internet_reachable: Reachability::Unknown,
            connection_type: None,
            last_checked_at: None,
        }
    }
}

impl NetworkState {
    pub fn new(
        is_connected: bool,
        is_internet_reachable: Reachability,
        connection_type: Option<ConnectionType>,
        last_checked_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            is_connected,
            is_internet_reachable,
            connection_type,
            last_checked_at,
        }
        .normalized()
    }

    /// Normalize a platform reading: a missing `is_connected` means
    /// disconnected, a missing reachability means unknown.
    pub fn from_signal(signal: &PlatformSignal, checked_at: DateTime<Utc>) -> Self {
        Self::new(
            signal.is_connected.unwrap_or(false),
            Reachability::from_option(signal.is_internet_reachable),
            signal
                .connection_type
                .as_deref()
                .map(ConnectionType::from_platform),
            Some(checked_at),
        )
    }

    /// Definite offline state, used when a probe fails or times out.
    pub fn offline(checked_at: DateTime<Utc>) -> Self {
        Self {
            is_connected: false,
            is_internet_reachable: Reachability::Unreachable,
            connection_type: Some(ConnectionType::None),
            last_checked_at: Some(checked_at),
        }
    }

    pub fn normalized(mut self) -> Self {
        if !self.is_connected && self.is_internet_reachable == Reachability::Reachable {
            self.is_internet_reachable = Reachability::Unreachable;
        }
        self
    }

    /// Equal in everything but the check timestamp.
    pub fn same_connectivity(&self, other: &NetworkState) -> bool {
        self.is_connected == other.is_connected
            && self.is_internet_reachable == other.is_internet_reachable
            && self.connection_type == other.connection_type
    }

    /// Connected, and not known to be cut off from the internet.
    pub fn is_online(&self) -> bool {
        self.is_connected && self.is_internet_reachable != Reachability::Unreachable
    }

    pub fn status_display(&self) -> String {
        let link = match self.connection_type {
            Some(kind) => kind.to_string(),
            None => "unknown".to_string(),
        };
        if !self.is_connected {
            "offline".to_string()
        } else {
            match self.is_internet_reachable {
                Reachability::Reachable => format!("online ({})", link),
                Reachability::Unreachable => format!("no internet ({})", link),
                Reachability::Unknown => format!("connected ({})", link),
            }
        }
    }
}
