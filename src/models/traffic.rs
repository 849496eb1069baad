use serde::Serialize;
use std::fmt;
use std::net::Ipv4Addr;

/// Transport protocol of a synthetic packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Protocol {
    #[serde(rename = "TCP")]
    Tcp,
    #[serde(rename = "UDP")]
    Udp,
    #[serde(rename = "ICMP")]
    Icmp,
}

impl Protocol {
    pub const ALL: [Protocol; 3] = [Protocol::Tcp, Protocol::Udp, Protocol::Icmp];

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
            Protocol::Icmp => "ICMP",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome attached to a traffic event after rule evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "String")]
pub enum TrafficStatus {
    Allowed,
    Matched { action: String, rule_name: String },
}

impl fmt::Display for TrafficStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrafficStatus::Allowed => f.write_str("Allowed"),
            TrafficStatus::Matched { action, rule_name } => {
                write!(f, "{} (Rule: {})", action, rule_name)
            }
        }
    }
}

impl From<TrafficStatus> for String {
    fn from(status: TrafficStatus) -> Self {
        status.to_string()
    }
}

/// One synthetic packet-like record produced per simulation tick
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrafficEvent {
    pub id: u64,
    /// Local wall-clock time of generation, `HH:MM:SS`
    pub timestamp: String,
    pub source_ip: Ipv4Addr,
    pub destination_ip: Ipv4Addr,
    pub protocol: Protocol,
    pub port: u16,
    pub status: TrafficStatus,
    pub alert: bool,
}

impl TrafficEvent {
    pub fn is_allowed(&self) -> bool {
        self.status == TrafficStatus::Allowed
    }
}
