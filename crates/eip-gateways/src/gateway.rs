//! Gateway
//!
//! One physical gateway of a provider with its rendered per-transport
//! profiles. Profiles are built once at construction and never change;
//! only the server-reported load may be attached later.

use crate::capability::TransportType;
use crate::config::ClientPreferences;
use crate::descriptor::{EipService, GatewayDescriptor, GatewayLoad, Secrets};
use crate::generator::VpnConfigGenerator;
use crate::profile::{ConfigParseError, VpnProfile};
use crate::timezone;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

/// A provider gateway
#[derive(Debug, Clone)]
pub struct Gateway {
    name: String,
    host: String,
    remote_ip: String,
    timezone: i32,
    api_version: i32,
    profiles: HashMap<TransportType, VpnProfile>,
    load: Option<GatewayLoad>,
}

impl Gateway {
    /// Build a gateway and its profiles from a raw gateway entry
    pub fn new(
        eip_service: &EipService,
        secrets: &Secrets,
        descriptor: &Value,
        preferences: &ClientPreferences,
    ) -> Result<Self, GatewayError> {
        let descriptor = GatewayDescriptor::from_value(descriptor)
            .map_err(|e| GatewayError::Json(e.to_string()))?;
        let location = eip_service.location(&descriptor.location);

        let generator = VpnConfigGenerator::new(
            &eip_service.openvpn_configuration,
            secrets,
            &descriptor,
            eip_service.version,
            preferences,
        )?;
        let mut profiles = generator.generate_vpn_profiles()?;

        for profile in profiles.values_mut() {
            profile.name = location.name.clone();
            profile.gateway_ip = descriptor.ip_address.clone();
            profile.excluded_apps = preferences.excluded_apps.clone();
        }

        debug!(
            "Gateway {} ({}) with {} profile(s)",
            descriptor.host,
            location.name,
            profiles.len()
        );

        Ok(Self {
            name: location.name,
            host: descriptor.host,
            remote_ip: descriptor.ip_address,
            timezone: location.timezone,
            api_version: eip_service.version,
            profiles,
            load: None,
        })
    }

    /// Location display name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn remote_ip(&self) -> &str {
        &self.remote_ip
    }

    /// UTC offset of the gateway location in hours
    pub fn timezone(&self) -> i32 {
        self.timezone
    }

    pub fn api_version(&self) -> i32 {
        self.api_version
    }

    /// Profile for `transport`, if the gateway supports it
    pub fn profile(&self, transport: TransportType) -> Option<&VpnProfile> {
        self.profiles.get(&transport)
    }

    pub fn supports_transport(&self, transport: TransportType) -> bool {
        self.profiles.contains_key(&transport)
    }

    pub fn profiles(&self) -> &HashMap<TransportType, VpnProfile> {
        &self.profiles
    }

    /// Supported transports in a stable order
    pub fn transports(&self) -> Vec<TransportType> {
        let mut transports: Vec<_> = self.profiles.keys().copied().collect();
        transports.sort();
        transports
    }

    /// Attach server-reported load
    pub fn update_load(&mut self, load: GatewayLoad) {
        self.load = Some(load);
    }

    pub fn load(&self) -> Option<GatewayLoad> {
        self.load
    }

    /// Server-reported fullness, or a timezone-distance estimate without one
    pub fn fullness(&self, client_timezone: i32) -> f64 {
        match self.load {
            Some(load) => load.fullness,
            None => timezone::connection_quality(client_timezone, self.timezone),
        }
    }

    pub fn is_overloaded(&self) -> bool {
        self.load.is_some_and(|l| l.overload)
    }
}

/// Gateway construction errors
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Invalid gateway entry: {0}")]
    Json(String),

    #[error("Config error: {0}")]
    Config(#[from] ConfigParseError),
}
