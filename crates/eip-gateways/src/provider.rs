//! Provider Snapshot
//!
//! In-memory copy of the documents a provider publishes, plus the
//! provider-wide capability queries used before any gateway is built.

use crate::capability::{self, TransportPair};
use crate::descriptor::{EipService, GeoIpOrdering, Secrets};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

/// Provider documents
#[derive(Debug, Clone, Default)]
pub struct Provider {
    pub eip_service: EipService,
    /// Geo/load ordering, if the geo service answered
    pub geo_ip: Option<GeoIpOrdering>,
    pub secrets: Secrets,
}

impl Provider {
    pub fn new(eip_service: EipService, secrets: Secrets) -> Self {
        Self {
            eip_service,
            geo_ip: None,
            secrets,
        }
    }

    /// Parse eip-service and secrets JSON text
    pub fn from_json(eip_service: &str, secrets: &str) -> Result<Self, ProviderError> {
        Ok(Self::new(EipService::from_json(eip_service)?, Secrets::from_json(secrets)?))
    }

    /// Attach a geo document
    pub fn with_geo_ip_json(mut self, geo_ip: &str) -> Result<Self, ProviderError> {
        self.geo_ip = GeoIpOrdering::from_json(geo_ip)?;
        if self.geo_ip.is_none() {
            debug!("Geo document carries no gateway ordering");
        }
        Ok(self)
    }

    /// Load provider documents from disk
    pub fn load(eip_service: &Path, secrets: &Path, geo_ip: Option<&Path>) -> Result<Self, ProviderError> {
        let mut provider = Self::from_json(&read(eip_service)?, &read(secrets)?)?;
        if let Some(path) = geo_ip {
            provider = provider.with_geo_ip_json(&read(path)?)?;
        }

        info!(
            "Loaded provider with {} gateway(s), api version {}",
            provider.eip_service.gateways.len(),
            provider.eip_service.version
        );
        Ok(provider)
    }

    /// More than one location declared?
    pub fn has_gateways_in_different_locations(&self) -> bool {
        self.eip_service.locations.len() > 1
    }

    /// Does any gateway offer a pluggable transport this build can use?
    pub fn supports_pluggable_transports(&self, use_obfs_vpn: bool) -> bool {
        self.supports_any(&capability::pluggable_transport_pairs(use_obfs_vpn))
    }

    /// Does any gateway offer an experimental pluggable transport?
    pub fn supports_experimental_pluggable_transports(&self) -> bool {
        self.supports_any(&capability::experimental_pluggable_transport_pairs())
    }

    fn supports_any(&self, allowed: &HashSet<TransportPair>) -> bool {
        self.eip_service
            .gateways
            .iter()
            .any(|gateway| capability::supports_any(gateway, allowed))
    }
}

fn read(path: &Path) -> Result<String, ProviderError> {
    std::fs::read_to_string(path)
        .map_err(|e| ProviderError::Io(format!("{}: {}", path.display(), e)))
}

/// Provider loading errors
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
