//! Gateway configuration

use crate::errors::GatewayError;
use crate::transport::AddressString;
use serde::{Deserialize, Serialize};
use sgw_appconn::ClientConfig;

/// Complete gateway configuration: the signalling-side properties plus
/// the embedded application server client properties.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Client identity towards the application servers
    #[serde(default = "default_client_id")]
    pub client_id: u32,
    /// Process logical name towards the signalling runtime (required)
    #[serde(default)]
    pub logical_name: String,
    /// Local point code (required)
    #[serde(default, rename = "localPC")]
    pub local_pc: u32,
    /// Remote point code (required)
    #[serde(default, rename = "remotePC")]
    pub remote_pc: u32,
    /// Local global title digits (required)
    #[serde(default, rename = "localGT")]
    pub local_gt: String,
    /// Type-of-address of the local global title
    #[serde(default = "default_local_gt_type", rename = "localGTType")]
    pub local_gt_type: u8,
    /// Local subsystem number
    #[serde(default = "default_local_ssn", rename = "localSSN")]
    pub local_ssn: u8,
    /// Dialog table capacity advertised to the transport
    #[serde(default = "default_dialog_capacity")]
    pub n_dialogs: u32,
    /// Invoke table capacity advertised to the transport
    #[serde(default = "default_dialog_capacity")]
    pub n_invokes: u32,
    /// Transport node name (required)
    #[serde(default)]
    pub node_name: String,
    /// Run against the in-process loopback transport
    #[serde(default)]
    pub stand_alone: bool,
    /// Application server client properties
    #[serde(flatten)]
    pub client: ClientConfig,
}

fn default_client_id() -> u32 {
    1
}

fn default_local_gt_type() -> u8 {
    145
}

fn default_local_ssn() -> u8 {
    8
}

fn default_dialog_capacity() -> u32 {
    16384
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            client_id: default_client_id(),
            logical_name: String::new(),
            local_pc: 0,
            remote_pc: 0,
            local_gt: String::new(),
            local_gt_type: default_local_gt_type(),
            local_ssn: default_local_ssn(),
            n_dialogs: default_dialog_capacity(),
            n_invokes: default_dialog_capacity(),
            node_name: String::new(),
            stand_alone: false,
            client: ClientConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from file
    pub fn from_file(path: &str) -> Result<Self, GatewayError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| GatewayError::Config(e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| GatewayError::Config(e.to_string()))
    }

    /// Checks the required properties before any networking starts.
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.logical_name.is_empty() {
            return Err(GatewayError::Config("logicalName not well defined".to_string()));
        }
        if self.local_pc == 0 {
            return Err(GatewayError::Config("localPC not well defined".to_string()));
        }
        if self.remote_pc == 0 {
            return Err(GatewayError::Config("remotePC not well defined".to_string()));
        }
        if self.local_gt.is_empty() {
            return Err(GatewayError::Config("localGT not well defined".to_string()));
        }
        if self.node_name.is_empty() {
            return Err(GatewayError::Config("nodeName not well defined".to_string()));
        }
        self.client.validate()?;
        Ok(())
    }

    /// The local global title as an address
    pub fn local_gt_address(&self) -> AddressString {
        AddressString::new(self.local_gt.clone(), self.local_gt_type)
    }
}
