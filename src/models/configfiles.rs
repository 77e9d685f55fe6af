use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Device class a configfile is compiled for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    /// Cable modem, encoded with the shared-secret keyfile
    Cm,
    /// Multimedia terminal adapter (voice), produced without keyfile
    Mta,
    /// Customer-managed router, text is passed through untouched
    Tr069,
}

impl DeviceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceClass::Cm => "cm",
            DeviceClass::Mta => "mta",
            DeviceClass::Tr069 => "tr069",
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cm" => Ok(DeviceClass::Cm),
            "mta" => Ok(DeviceClass::Mta),
            "tr069" => Ok(DeviceClass::Tr069),
            other => Err(format!("unknown device class: {}", other)),
        }
    }
}

/// Configfile is one node of the configuration tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configfile {
    pub id: i64,
    pub name: String,
    pub device: Option<DeviceClass>,
    pub parent_id: Option<i64>,
    pub text: String,
    pub firmware: String,
    pub cvc: String,
    pub public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Configfile {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// CreateConfigfileRequest for creating/updating configfiles
#[derive(Debug, Clone, Deserialize)]
pub struct CreateConfigfileRequest {
    pub name: String,
    #[serde(default)]
    pub device: Option<DeviceClass>,
    #[serde(default)]
    pub parent_id: Option<i64>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub firmware: String,
    #[serde(default)]
    pub cvc: String,
    #[serde(default = "default_public")]
    pub public: bool,
}

fn default_public() -> bool {
    true
}

/// Portable representation of a configfile subtree, used for export and import.
///
/// Carries every persisted attribute except the audit timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigfileExport {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub device: Option<DeviceClass>,
    #[serde(default)]
    pub parent_id: Option<i64>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub firmware: String,
    #[serde(default)]
    pub cvc: String,
    #[serde(default = "default_public")]
    pub public: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ConfigfileExport>,
}

impl ConfigfileExport {
    pub fn from_node(node: &Configfile) -> Self {
        Self {
            id: node.id,
            name: node.name.clone(),
            device: node.device,
            parent_id: node.parent_id,
            text: node.text.clone(),
            firmware: node.firmware.clone(),
            cvc: node.cvc.clone(),
            public: node.public,
            children: Vec::new(),
        }
    }

    /// Attributes of this node as a create request (children are not included)
    pub fn to_request(&self) -> CreateConfigfileRequest {
        CreateConfigfileRequest {
            name: self.name.clone(),
            device: self.device,
            parent_id: self.parent_id,
            text: self.text.clone(),
            firmware: self.firmware.clone(),
            cvc: self.cvc.clone(),
            public: self.public,
        }
    }

    /// Number of nodes in this subtree, including self
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(|c| c.node_count()).sum::<usize>()
    }
}

/// ImportConfigfileRequest carries an uploaded tree
#[derive(Debug, Clone, Deserialize)]
pub struct ImportConfigfileRequest {
    /// Node the uploaded subtree is attached under
    #[serde(default)]
    pub parent_id: Option<i64>,
    /// Name for the top-level node; when set the top node is validated before anything is written
    #[serde(default)]
    pub name: Option<String>,
    /// Raw JSON file content
    pub content: String,
}

/// Result of a tree import
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportReport {
    pub root_id: i64,
    pub created: Vec<i64>,
    pub warnings: Vec<String>,
}

/// One link of a resolved inheritance chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainLink {
    pub id: i64,
    pub name: String,
}

/// Effective (inheritance-flattened) text of a configfile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfigResponse {
    pub id: i64,
    pub device: Option<DeviceClass>,
    pub chain: Vec<ChainLink>,
    pub text: String,
}

/// Result of building a device config file from a configfile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildResponse {
    pub id: i64,
    pub path: String,
    pub size: u64,
}

/// Result of a device class change, listing every node that was rewritten
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateConfigfileResponse {
    pub configfile: Configfile,
    pub propagated_to: Vec<i64>,
}
