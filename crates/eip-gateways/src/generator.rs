//! VPN Configuration Generator
//!
//! Renders one gateway into OpenVPN configuration text per transport and
//! parses the text back into a [`VpnProfile`].
//!
//! # Layout
//!
//! A rendered configuration is four blocks joined by newlines:
//!
//! 1. general directives from `openvpn_configuration`, then `client`
//! 2. `remote` (and for obfs4 `route`) lines for the gateway
//! 3. fixed client customizations
//! 4. `<ca>`, `<key>` and `<cert>` inline blocks
//!
//! Api versions 1 and 2 publish flat ports/protocols; version 3 and later
//! publish a per-transport capability matrix.

use crate::capability::{TransportDescriptor, TransportType};
use crate::config::ClientPreferences;
use crate::descriptor::{GatewayDescriptor, Secrets};
use crate::profile::{
    ConfigParseError, ConfigParser, DISPATCHER_IP, DISPATCHER_PORT, Obfs4Options, VpnProfile,
};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use tracing::{debug, error, warn};

const CLIENT_CUSTOMIZATIONS: &str = "remote-cert-tls server\npersist-tun\nauth-retry nointeract";

/// First api version with a capability matrix
pub const CAPABILITY_MATRIX_API_VERSION: i32 = 3;

/// Per-gateway profile builder
pub struct VpnConfigGenerator<'a> {
    general_config: &'a Map<String, Value>,
    secrets: &'a Secrets,
    gateway: &'a GatewayDescriptor,
    api_version: i32,
    preferences: &'a ClientPreferences,
    transports: Vec<TransportDescriptor>,
    obfs4_transport: Option<usize>,
}

impl<'a> VpnConfigGenerator<'a> {
    /// Create a generator, validating the capability matrix up front
    pub fn new(
        general_config: &'a Map<String, Value>,
        secrets: &'a Secrets,
        gateway: &'a GatewayDescriptor,
        api_version: i32,
        preferences: &'a ClientPreferences,
    ) -> Result<Self, ConfigParseError> {
        let transports = if api_version >= CAPABILITY_MATRIX_API_VERSION {
            gateway
                .transports()
                .map_err(|e| ConfigParseError::Capabilities(api_version, e.to_string()))?
        } else {
            Vec::new()
        };
        let obfs4_transport = transports.iter().position(|t| t.is(TransportType::Obfs4));

        Ok(Self {
            general_config,
            secrets,
            gateway,
            api_version,
            preferences,
            transports,
            obfs4_transport,
        })
    }

    /// Does the gateway advertise an obfs4 capability entry?
    pub fn supports_obfs4(&self) -> bool {
        self.obfs4_transport.is_some()
    }

    /// Build every profile the gateway supports.
    ///
    /// The OpenVPN profile is mandatory; an obfs4 profile that cannot be
    /// built is logged and left out.
    pub fn generate_vpn_profiles(&self) -> Result<HashMap<TransportType, VpnProfile>, ConfigParseError> {
        let mut profiles = HashMap::new();
        profiles.insert(TransportType::Openvpn, self.create_profile(TransportType::Openvpn)?);

        if self.supports_obfs4() {
            match self.create_profile(TransportType::Obfs4) {
                Ok(profile) => {
                    profiles.insert(TransportType::Obfs4, profile);
                }
                Err(e) => warn!("Skipping obfs4 profile for {}: {}", self.gateway.host, e),
            }
        }

        Ok(profiles)
    }

    /// Render and parse one profile
    pub fn create_profile(&self, transport: TransportType) -> Result<VpnProfile, ConfigParseError> {
        let mut parser = ConfigParser::new();
        parser.parse_config(&self.configuration(transport))?;
        if transport.is_pluggable() {
            parser.set_obfs4_options(self.obfs4_options()?);
        }
        parser.convert_profile(transport)
    }

    /// Full configuration text for `transport`
    pub fn configuration(&self, transport: TransportType) -> String {
        [
            self.general_configuration(),
            self.gateway_configuration(transport),
            CLIENT_CUSTOMIZATIONS.to_string(),
            self.secrets_configuration(),
        ]
        .join("\n")
    }

    /// Obfuscation parameters, pinning overrides applied
    pub fn obfs4_options(&self) -> Result<Obfs4Options, ConfigParseError> {
        let transport = self
            .obfs4_transport
            .and_then(|i| self.transports.get(i))
            .ok_or(ConfigParseError::MissingTransportOptions(TransportType::Obfs4))?;
        let options = transport.options.clone().unwrap_or_default();

        if let Some(pinning) = self.preferences.active_pinning() {
            return Ok(Obfs4Options {
                gateway_ip: pinning.ip.clone(),
                port: parse_port(&pinning.port)?,
                cert: pinning.cert.clone(),
                iat_mode: options.iat_mode.unwrap_or_else(|| "0".to_string()),
                use_kcp: pinning.use_kcp,
                transport_type: TransportType::Obfs4,
            });
        }

        if self.gateway.ip_address.is_empty() {
            return Err(ConfigParseError::MissingField("ip_address"));
        }
        let iat_mode = options.iat_mode.ok_or(ConfigParseError::MissingField("iatMode"))?;
        let cert = options.cert.ok_or(ConfigParseError::MissingField("cert"))?;
        let port = transport
            .first_port()
            .ok_or(ConfigParseError::MissingField("ports"))?;

        Ok(Obfs4Options {
            gateway_ip: self.gateway.ip_address.clone(),
            port: parse_port(port)?,
            cert,
            iat_mode,
            use_kcp: false,
            transport_type: TransportType::Obfs4,
        })
    }

    fn general_configuration(&self) -> String {
        let mut lines = Vec::with_capacity(self.general_config.len() + 1);
        for (key, value) in self.general_config {
            let text = match value {
                Value::String(s) => s.split_whitespace().collect::<Vec<_>>().join(" "),
                other => other.to_string(),
            };
            if text.is_empty() {
                lines.push(key.clone());
            } else {
                lines.push(format!("{} {}", key, text));
            }
        }
        lines.push("client".to_string());
        lines.join("\n")
    }

    fn gateway_configuration(&self, transport: TransportType) -> String {
        let lines = if self.api_version < CAPABILITY_MATRIX_API_VERSION {
            self.legacy_remotes()
        } else if transport.is_pluggable() {
            self.obfs4_remotes()
        } else {
            self.openvpn_remotes()
        };
        lines.join("\n")
    }

    fn legacy_remotes(&self) -> Vec<String> {
        if self.gateway.ip_address.is_empty() {
            warn!("{} has no ip_address, no remotes rendered", self.gateway.host);
            return Vec::new();
        }
        let capabilities = self.gateway.legacy_capabilities();
        let mut remotes = Vec::new();
        for port in &capabilities.ports {
            if port.parse::<u16>().is_err() {
                warn!("Skipping invalid port {} of {}", port, self.gateway.host);
                continue;
            }
            for protocol in &capabilities.protocols {
                remotes.push(remote(&self.gateway.ip_address, port, Some(protocol.as_str())));
            }
        }
        remotes
    }

    fn openvpn_remotes(&self) -> Vec<String> {
        let Some(transport) = self.transports.iter().find(|t| t.is(TransportType::Openvpn)) else {
            debug!("{} has no openvpn capability", self.gateway.host);
            return Vec::new();
        };
        let addresses = self.gateway.ip_addresses();
        let ports: Vec<&String> = transport
            .ports
            .iter()
            .filter(|p| p.parse::<u16>().is_ok())
            .collect();

        if self.preferences.prefer_udp {
            let mut udp = Vec::new();
            let mut other = Vec::new();
            for protocol in &transport.protocols {
                let bucket = if protocol == "udp" { &mut udp } else { &mut other };
                for port in &ports {
                    for address in &addresses {
                        bucket.push(remote(address, port, Some(protocol.as_str())));
                    }
                }
            }
            udp.extend(other);
            udp
        } else {
            let mut remotes = Vec::new();
            for port in &ports {
                for protocol in &transport.protocols {
                    for address in &addresses {
                        remotes.push(remote(address, port, Some(protocol.as_str())));
                    }
                }
            }
            remotes
        }
    }

    fn obfs4_remotes(&self) -> Vec<String> {
        let Some(transport) = self.obfs4_transport.and_then(|i| self.transports.get(i)) else {
            return Vec::new();
        };

        let mut address = None;
        for candidate in self.gateway.ip_addresses() {
            if candidate.parse::<Ipv4Addr>().is_ok() {
                address = Some(candidate);
                break;
            }
            warn!("Skipping IP address {} while configuring obfs4", candidate);
        }
        let Some(address) = address else {
            error!("No IPv4 address of {} to configure obfs4", self.gateway.host);
            return Vec::new();
        };

        if !transport.has_tcp() {
            error!("obfs4 requires TCP, skipping obfs4 remotes for {}", address);
            return Vec::new();
        }

        let Some(port) = transport.first_port() else {
            error!("Misconfigured provider: no obfs4 ports for {}", self.gateway.host);
            return Vec::new();
        };

        let route = format!("route {} 255.255.255.255 net_gateway", address);
        let remote = if self.preferences.use_obfs_vpn {
            match self.preferences.active_pinning() {
                Some(pinning) => remote(&pinning.ip, &pinning.port, None),
                None => remote(address, port, None),
            }
        } else {
            remote(DISPATCHER_IP, &DISPATCHER_PORT.to_string(), Some("tcp"))
        };

        vec![route, remote]
    }

    fn secrets_configuration(&self) -> String {
        format!(
            "<ca>\n{}\n</ca>\n<key>\n{}\n</key>\n<cert>\n{}\n</cert>",
            self.secrets.ca_cert, self.secrets.provider_private_key, self.secrets.provider_vpn_certificate
        )
    }
}

fn remote(address: &str, port: &str, protocol: Option<&str>) -> String {
    match protocol {
        Some(protocol) => format!("remote {} {} {}", address, port, protocol),
        None => format!("remote {} {}", address, port),
    }
}

fn parse_port(port: &str) -> Result<u16, ConfigParseError> {
    port.parse()
        .map_err(|_| ConfigParseError::InvalidPort(port.to_string()))
}
