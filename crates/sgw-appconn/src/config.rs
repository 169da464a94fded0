//! Client configuration

use crate::conn::DEFAULT_PORT;
use crate::errors::AppConnError;
use serde::{Deserialize, Serialize};

/// Configuration of one application server client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// Application server address (required)
    #[serde(default)]
    pub address: String,
    /// Application server port
    #[serde(default = "default_port")]
    pub port: u16,
    /// First connection index of this client
    #[serde(default)]
    pub conn_index: u8,
    /// Number of redundant connections
    #[serde(default = "default_size")]
    pub size: usize,
    /// Whether connections register with the server before going online
    #[serde(default = "default_true")]
    pub registrable: bool,
    /// Whether offline connections are periodically rebuilt
    #[serde(default = "default_true")]
    pub failsafe: bool,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_size() -> usize {
    8
}

fn default_true() -> bool {
    true
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            address: String::new(),
            port: default_port(),
            conn_index: 0,
            size: default_size(),
            registrable: true,
            failsafe: true,
        }
    }
}

impl ClientConfig {
    /// Load configuration from file
    pub fn from_file(path: &str) -> Result<Self, AppConnError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppConnError::Config(e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| AppConnError::Config(e.to_string()))
    }

    /// Checks the required properties before any networking starts.
    pub fn validate(&self) -> Result<(), AppConnError> {
        if self.address.is_empty() {
            return Err(AppConnError::Config("address not well defined".to_string()));
        }
        if self.size == 0 {
            return Err(AppConnError::Config("size not well defined".to_string()));
        }
        if self.conn_index as usize + self.size > 256 {
            return Err(AppConnError::Config(
                "connIndex and size exceed the index space".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: ClientConfig = serde_json::from_str(r#"{"address": "10.0.0.5"}"#).unwrap();
        assert_eq!(config.port, 8482);
        assert_eq!(config.conn_index, 0);
        assert_eq!(config.size, 8);
        assert!(config.registrable);
        assert!(config.failsafe);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_address_rejected() {
        let config: ClientConfig = serde_json::from_str("{}").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_camel_case_keys() {
        let config: ClientConfig = serde_json::from_str(
            r#"{"address": "10.0.0.5", "connIndex": 8, "size": 4, "registrable": false}"#,
        )
        .unwrap();
        assert_eq!(config.conn_index, 8);
        assert_eq!(config.size, 4);
        assert!(!config.registrable);
    }

    #[test]
    fn test_index_space_overflow_rejected() {
        let config: ClientConfig = serde_json::from_str(
            r#"{"address": "10.0.0.5", "connIndex": 250, "size": 8}"#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }
}
