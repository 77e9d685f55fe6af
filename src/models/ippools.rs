use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Pool type decides which device class leases from a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PoolType {
    #[serde(rename = "CM")]
    Cm,
    #[serde(rename = "CPEPub")]
    CpePub,
    #[serde(rename = "CPEPriv")]
    CpePriv,
    #[serde(rename = "MTA")]
    Mta,
}

impl PoolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolType::Cm => "CM",
            PoolType::CpePub => "CPEPub",
            PoolType::CpePriv => "CPEPriv",
            PoolType::Mta => "MTA",
        }
    }

    /// dhcpd class membership statements placed inside the pool block
    pub fn membership_rules(&self) -> &'static [&'static str] {
        match self {
            PoolType::Cm => &["allow members of \"CM\""],
            PoolType::CpePub => &[
                "allow members of \"Client\"",
                "deny members of \"Client-Public\"",
            ],
            PoolType::CpePriv => &[
                "allow members of \"Client-Public\"",
                "allow known-clients",
            ],
            PoolType::Mta => &["allow members of \"MTA\"", "allow known-clients"],
        }
    }
}

impl fmt::Display for PoolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PoolType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CM" => Ok(PoolType::Cm),
            "CPEPub" => Ok(PoolType::CpePub),
            "CPEPriv" => Ok(PoolType::CpePriv),
            "MTA" => Ok(PoolType::Mta),
            other => Err(format!("unknown pool type: {}", other)),
        }
    }
}

/// NetGw is a network gateway (CMTS) owning a set of address pools
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetGw {
    pub id: i64,
    pub hostname: String,
    pub ip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool_count: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateNetGwRequest {
    pub hostname: String,
    #[serde(default)]
    pub ip: String,
}

/// IpPool is an address range within a gateway's subnet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpPool {
    pub id: i64,
    pub netgw_id: i64,
    #[serde(rename = "type")]
    pub pool_type: PoolType,
    pub net: String,
    pub netmask: String,
    pub ip_pool_start: String,
    pub ip_pool_end: String,
    pub router_ip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broadcast_ip: Option<String>,
    pub version: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateIpPoolRequest {
    pub netgw_id: i64,
    #[serde(rename = "type")]
    pub pool_type: PoolType,
    pub net: String,
    pub netmask: String,
    pub ip_pool_start: String,
    pub ip_pool_end: String,
    pub router_ip: String,
    #[serde(default)]
    pub broadcast_ip: Option<String>,
    #[serde(default = "default_version")]
    pub version: i32,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_version() -> i32 {
    4
}

/// Endpoint device class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointType {
    Cpe,
    Mta,
}

impl EndpointType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointType::Cpe => "cpe",
            EndpointType::Mta => "mta",
        }
    }
}

impl FromStr for EndpointType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpe" => Ok(EndpointType::Cpe),
            "mta" => Ok(EndpointType::Mta),
            other => Err(format!("unknown endpoint type: {}", other)),
        }
    }
}

/// Endpoint is a device that may hold a statically reserved address
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: i64,
    pub hostname: String,
    pub mac: String,
    #[serde(rename = "type")]
    pub endpoint_type: EndpointType,
    pub fixed_ip: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateEndpointRequest {
    pub hostname: String,
    pub mac: String,
    #[serde(rename = "type")]
    pub endpoint_type: EndpointType,
    #[serde(default)]
    pub fixed_ip: bool,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// A contiguous inclusive address range handed to dhcpd
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRange {
    pub start: u32,
    pub end: u32,
}

/// Ranges usable for dynamic leasing in a pool, as dotted strings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolRangesResponse {
    pub pool_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cidr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wildcard_mask: Option<String>,
    pub secondary: bool,
    pub ranges: Vec<(String, String)>,
}

/// Rendered dhcpd fragment of one gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DhcpConfigResponse {
    pub netgw_id: i64,
    pub path: String,
    pub content: String,
}
