//! Client Preferences
//!
//! The read-only flags that steer gateway selection and profile rendering.
//! Loaded from TOML or JSON; every field is optional.
//!
//! ```toml
//! preferred_city = "Amsterdam"
//! prefer_udp = true
//! use_pluggable_transports = false
//! excluded_apps = ["org.example.bank"]
//!
//! [obfuscation_pinning]
//! ip = "198.51.100.9"
//! port = "443"
//! cert = "..."
//! use_kcp = false
//! ```

use crate::capability::TransportType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::path::Path;
use tracing::info;

/// Debug override forcing a specific obfuscation bridge
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObfuscationPinning {
    pub ip: String,
    pub port: String,
    pub cert: String,
    /// Tunnel the bridge connection over KCP
    pub use_kcp: bool,
}

impl ObfuscationPinning {
    /// All of ip, port and cert set
    pub fn is_complete(&self) -> bool {
        !self.ip.is_empty() && !self.port.is_empty() && !self.cert.is_empty()
    }
}

/// Client preference flags
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientPreferences {
    /// Only select gateways in this location
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_city: Option<String>,
    /// Emit UDP remotes before TCP ones
    pub prefer_udp: bool,
    /// Route through obfs4 instead of plain OpenVPN
    pub use_pluggable_transports: bool,
    /// Talk to obfuscation bridges directly instead of the local dispatcher
    pub use_obfs_vpn: bool,
    /// Apps that bypass the tunnel
    pub excluded_apps: BTreeSet<String>,
    /// Always select this gateway host
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pinned_gateway: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub obfuscation_pinning: Option<ObfuscationPinning>,
}

impl ClientPreferences {
    /// Load from TOML file
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Load from TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content)
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Load from JSON file
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_json(&content)
    }

    /// Load from JSON string
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(content)
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Load and validate, format chosen by file extension
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let ext = path.extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");

        let preferences = match ext {
            "toml" => Self::from_toml_file(path)?,
            "json" => Self::from_json_file(path)?,
            _ => return Err(ConfigError::UnsupportedFormat),
        };
        preferences.validate()?;

        info!("Loaded client preferences from {}", path.display());
        Ok(preferences)
    }

    /// Export as TOML
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    /// Export as JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Check pinning overrides for completeness
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(pinning) = &self.obfuscation_pinning {
            if !pinning.is_complete() {
                return Err(ConfigError::InvalidPinning("ip, port and cert are required".into()));
            }
            pinning.ip.parse::<IpAddr>()
                .map_err(|_| ConfigError::InvalidPinning(format!("invalid ip {}", pinning.ip)))?;
            pinning.port.parse::<u16>()
                .map_err(|_| ConfigError::InvalidPinning(format!("invalid port {}", pinning.port)))?;
        }
        if self.pinned_gateway.as_deref().is_some_and(|h| h.trim().is_empty()) {
            return Err(ConfigError::EmptyPinnedGateway);
        }
        Ok(())
    }

    /// Transport selection uses
    pub fn transport(&self) -> TransportType {
        if self.use_pluggable_transports {
            TransportType::Obfs4
        } else {
            TransportType::Openvpn
        }
    }

    /// Active pinning, if obfsvpn mode uses one
    pub fn active_pinning(&self) -> Option<&ObfuscationPinning> {
        self.obfuscation_pinning
            .as_ref()
            .filter(|p| self.use_obfs_vpn && p.is_complete())
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Unsupported config format")]
    UnsupportedFormat,

    #[error("Invalid obfuscation pinning: {0}")]
    InvalidPinning(String),

    #[error("Pinned gateway host is empty")]
    EmptyPinnedGateway,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let preferences = ClientPreferences::from_toml("").unwrap();

        assert_eq!(preferences, ClientPreferences::default());
        assert_eq!(preferences.transport(), TransportType::Openvpn);
        assert!(preferences.validate().is_ok());
    }

    #[test]
    fn test_from_toml() {
        let preferences = ClientPreferences::from_toml(r#"
            preferred_city = "Amsterdam"
            prefer_udp = true
            use_pluggable_transports = true
            use_obfs_vpn = true
            excluded_apps = ["org.example.bank"]

            [obfuscation_pinning]
            ip = "198.51.100.9"
            port = "443"
            cert = "CERT"
        "#).unwrap();

        assert_eq!(preferences.preferred_city.as_deref(), Some("Amsterdam"));
        assert_eq!(preferences.transport(), TransportType::Obfs4);
        assert!(preferences.excluded_apps.contains("org.example.bank"));
        assert_eq!(preferences.active_pinning().unwrap().port, "443");
        assert!(preferences.validate().is_ok());
    }

    #[test]
    fn test_from_json() {
        let preferences = ClientPreferences::from_json(
            r#"{ "prefer_udp": true, "pinned_gateway": "pt.demo.example.net" }"#,
        ).unwrap();

        assert!(preferences.prefer_udp);
        assert_eq!(preferences.pinned_gateway.as_deref(), Some("pt.demo.example.net"));
        assert!(ClientPreferences::from_json("[1, 2]").is_err());
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let preferences = ClientPreferences {
            preferred_city: Some("Manila".to_string()),
            obfuscation_pinning: Some(ObfuscationPinning {
                ip: "198.51.100.9".to_string(),
                port: "443".to_string(),
                cert: "CERT".to_string(),
                use_kcp: true,
            }),
            ..Default::default()
        };

        let parsed = ClientPreferences::from_toml(&preferences.to_toml()).unwrap();
        assert_eq!(parsed, preferences);
    }

    #[test]
    fn test_validate_pinning() {
        let mut preferences = ClientPreferences {
            obfuscation_pinning: Some(ObfuscationPinning {
                ip: "198.51.100.9".to_string(),
                port: "http".to_string(),
                cert: "CERT".to_string(),
                use_kcp: false,
            }),
            ..Default::default()
        };
        assert!(matches!(preferences.validate(), Err(ConfigError::InvalidPinning(_))));

        // pinning only applies in obfsvpn mode
        assert!(preferences.active_pinning().is_none());

        preferences.obfuscation_pinning = None;
        preferences.pinned_gateway = Some("  ".to_string());
        assert!(matches!(preferences.validate(), Err(ConfigError::EmptyPinnedGateway)));
    }
}
