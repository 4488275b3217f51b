//! Transport Capabilities
//!
//! Closed transport and protocol enums plus the capability matching used by
//! gateway selection and provider-level queries.
//!
//! A gateway advertises its capability matrix as an array of transport
//! entries:
//!
//! ```json
//! { "type": "obfs4", "protocols": ["tcp"], "ports": ["23050"],
//!   "options": { "cert": "...", "iatMode": "0" } }
//! ```
//!
//! Matching is expressed as set intersection over `(transport, protocol)`
//! pairs, so a provider query never compares raw strings.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Tunnel transport variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TransportType {
    /// Plain OpenVPN
    #[serde(rename = "openvpn")]
    Openvpn,
    /// OpenVPN wrapped in obfs4
    #[serde(rename = "obfs4")]
    Obfs4,
    /// obfs4 with port hopping
    #[serde(rename = "obfs4-hop")]
    Obfs4Hop,
}

impl TransportType {
    /// All known transports
    pub fn all() -> &'static [TransportType] {
        &[TransportType::Openvpn, TransportType::Obfs4, TransportType::Obfs4Hop]
    }

    /// Wire name used in capability descriptors
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportType::Openvpn => "openvpn",
            TransportType::Obfs4 => "obfs4",
            TransportType::Obfs4Hop => "obfs4-hop",
        }
    }

    /// Is this a pluggable (obfuscating) transport?
    pub fn is_pluggable(&self) -> bool {
        !matches!(self, TransportType::Openvpn)
    }
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportType {
    type Err = CapabilityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "openvpn" => Ok(TransportType::Openvpn),
            "obfs4" => Ok(TransportType::Obfs4),
            "obfs4-hop" => Ok(TransportType::Obfs4Hop),
            _ => Err(CapabilityError::UnknownTransport(s.to_string())),
        }
    }
}

/// Transport protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportProtocol {
    Udp,
    Tcp,
    Kcp,
}

impl TransportProtocol {
    /// Wire name used in capability descriptors
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportProtocol::Udp => "udp",
            TransportProtocol::Tcp => "tcp",
            TransportProtocol::Kcp => "kcp",
        }
    }
}

impl fmt::Display for TransportProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportProtocol {
    type Err = CapabilityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "udp" => Ok(TransportProtocol::Udp),
            "tcp" => Ok(TransportProtocol::Tcp),
            "kcp" => Ok(TransportProtocol::Kcp),
            _ => Err(CapabilityError::UnknownProtocol(s.to_string())),
        }
    }
}

/// A `(transport, protocol)` combination
pub type TransportPair = (TransportType, TransportProtocol);

/// Transport-specific options of a capability entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TransportOptions {
    /// obfs4 bridge certificate
    #[serde(default)]
    pub cert: Option<String>,
    /// obfs4 inter-arrival-time mode
    #[serde(default, rename = "iatMode", deserialize_with = "crate::descriptor::opt_string_or_number")]
    pub iat_mode: Option<String>,
}

/// One entry of `capabilities.transport` (api version 3 and later)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TransportDescriptor {
    /// `None` for transport types this client does not know
    #[serde(rename = "type", deserialize_with = "known_transport")]
    pub transport_type: Option<TransportType>,
    /// Protocols as published (kept verbatim for rendering), non-strings dropped
    #[serde(default, deserialize_with = "crate::descriptor::string_list")]
    pub protocols: Vec<String>,
    /// Ports as published, numbers normalized to strings
    #[serde(default, deserialize_with = "crate::descriptor::port_list")]
    pub ports: Vec<String>,
    /// `None` when absent or malformed
    #[serde(default, deserialize_with = "crate::descriptor::or_default")]
    pub options: Option<TransportOptions>,
}

fn known_transport<'de, D>(deserializer: D) -> Result<Option<TransportType>, D::Error>
where
    D: Deserializer<'de>,
{
    let name = String::deserialize(deserializer)?;
    Ok(name.parse().ok())
}

impl TransportDescriptor {
    /// Is this entry of the given transport type?
    pub fn is(&self, transport: TransportType) -> bool {
        self.transport_type == Some(transport)
    }

    /// Known protocols of this entry, unknown ones skipped
    pub fn known_protocols(&self) -> impl Iterator<Item = TransportProtocol> + '_ {
        self.protocols.iter().filter_map(|p| p.parse().ok())
    }

    /// Does this entry offer `transport` over `protocol`?
    pub fn supports(&self, transport: TransportType, protocol: TransportProtocol) -> bool {
        self.is(transport) && self.known_protocols().any(|p| p == protocol)
    }

    /// All `(transport, protocol)` pairs this entry offers
    pub fn offered_pairs(&self) -> impl Iterator<Item = TransportPair> + '_ {
        self.transport_type
            .into_iter()
            .flat_map(move |t| self.known_protocols().map(move |p| (t, p)))
    }

    /// At least one TCP flavoured protocol (`tcp`, `tcp4`, ...)
    pub fn has_tcp(&self) -> bool {
        self.protocols.iter().any(|p| p.contains("tcp"))
    }

    /// First published port
    pub fn first_port(&self) -> Option<&str> {
        self.ports.first().map(String::as_str)
    }
}

/// Parse `capabilities.transport` from a `capabilities` object.
///
/// Each entry needs an object with a string `type`; its other fields are
/// read leniently.
pub fn transports_from_capabilities(
    capabilities: Option<&Value>,
) -> Result<Vec<TransportDescriptor>, CapabilityError> {
    let capabilities = capabilities
        .filter(|c| c.is_object())
        .ok_or(CapabilityError::MissingCapabilities)?;
    let transports = capabilities
        .get("transport")
        .ok_or(CapabilityError::MissingTransports)?;
    Vec::<TransportDescriptor>::deserialize(transports)
        .map_err(|e| CapabilityError::Malformed(e.to_string()))
}

/// Parse the capability matrix of a raw gateway descriptor.
pub fn gateway_transports(gateway: &Value) -> Result<Vec<TransportDescriptor>, CapabilityError> {
    transports_from_capabilities(gateway.get("capabilities"))
}

/// Every `(transport, protocol)` pair offered by a capability matrix
pub fn offered_pairs(transports: &[TransportDescriptor]) -> HashSet<TransportPair> {
    transports.iter().flat_map(TransportDescriptor::offered_pairs).collect()
}

/// Does a raw gateway descriptor offer `transport` over `protocol`?
///
/// Missing or malformed capabilities yield `false`.
pub fn supports_transport(
    gateway: &Value,
    transport: TransportType,
    protocol: TransportProtocol,
) -> bool {
    gateway_transports(gateway)
        .map(|t| t.iter().any(|entry| entry.supports(transport, protocol)))
        .unwrap_or(false)
}

/// Does a raw gateway descriptor offer any of the `allowed` pairs?
pub fn supports_any(gateway: &Value, allowed: &HashSet<TransportPair>) -> bool {
    gateway_transports(gateway)
        .map(|t| !offered_pairs(&t).is_disjoint(allowed))
        .unwrap_or(false)
}

/// Pairs that count as pluggable transport support.
///
/// Builds talking to obfuscation proxies directly (`use_obfs_vpn`) accept
/// KCP and port hopping as well; dispatcher builds only obfs4 over TCP.
pub fn pluggable_transport_pairs(use_obfs_vpn: bool) -> HashSet<TransportPair> {
    if use_obfs_vpn {
        HashSet::from([
            (TransportType::Obfs4, TransportProtocol::Tcp),
            (TransportType::Obfs4, TransportProtocol::Kcp),
            (TransportType::Obfs4Hop, TransportProtocol::Tcp),
            (TransportType::Obfs4Hop, TransportProtocol::Kcp),
        ])
    } else {
        HashSet::from([(TransportType::Obfs4, TransportProtocol::Tcp)])
    }
}

/// Pairs still considered experimental
pub fn experimental_pluggable_transport_pairs() -> HashSet<TransportPair> {
    HashSet::from([
        (TransportType::Obfs4, TransportProtocol::Kcp),
        (TransportType::Obfs4Hop, TransportProtocol::Tcp),
        (TransportType::Obfs4Hop, TransportProtocol::Kcp),
    ])
}

/// Capability errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum CapabilityError {
    #[error("Gateway has no capabilities object")]
    MissingCapabilities,

    #[error("Capabilities have no transport array")]
    MissingTransports,

    #[error("Malformed transport entry: {0}")]
    Malformed(String),

    #[error("Unknown transport type: {0}")]
    UnknownTransport(String),

    #[error("Unknown transport protocol: {0}")]
    UnknownProtocol(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obfs4_gateway() -> Value {
        json!({
            "host": "pt.example.net",
            "capabilities": {
                "transport": [
                    { "type": "openvpn", "protocols": ["tcp", "udp"], "ports": ["1195"] },
                    { "type": "obfs4", "protocols": ["tcp"], "ports": [23050],
                      "options": { "cert": "abc", "iatMode": 0 } }
                ]
            }
        })
    }

    #[test]
    fn test_transport_names() {
        assert_eq!(TransportType::Obfs4Hop.as_str(), "obfs4-hop");
        assert_eq!("obfs4".parse::<TransportType>().unwrap(), TransportType::Obfs4);
        assert!("wireguard".parse::<TransportType>().is_err());
        assert_eq!("kcp".parse::<TransportProtocol>().unwrap(), TransportProtocol::Kcp);
        assert!(TransportType::Obfs4.is_pluggable());
        assert!(!TransportType::Openvpn.is_pluggable());
    }

    #[test]
    fn test_supports_transport() {
        let gateway = obfs4_gateway();

        assert!(supports_transport(&gateway, TransportType::Obfs4, TransportProtocol::Tcp));
        assert!(supports_transport(&gateway, TransportType::Openvpn, TransportProtocol::Udp));
        assert!(!supports_transport(&gateway, TransportType::Obfs4, TransportProtocol::Udp));
        assert!(!supports_transport(&gateway, TransportType::Obfs4Hop, TransportProtocol::Tcp));
    }

    #[test]
    fn test_missing_capabilities_is_false() {
        let gateway = json!({ "host": "broken.example.net" });
        assert!(!supports_transport(&gateway, TransportType::Openvpn, TransportProtocol::Tcp));

        let gateway = json!({ "capabilities": { "transport": [{ "protocols": ["tcp"] }] } });
        assert!(!supports_transport(&gateway, TransportType::Openvpn, TransportProtocol::Tcp));
        assert!(matches!(
            gateway_transports(&gateway),
            Err(CapabilityError::Malformed(_))
        ));
    }

    #[test]
    fn test_ports_and_options_normalized() {
        let transports = gateway_transports(&obfs4_gateway()).unwrap();
        let obfs4 = transports.iter().find(|t| t.is(TransportType::Obfs4)).unwrap();

        assert_eq!(obfs4.first_port(), Some("23050"));
        assert_eq!(obfs4.options.as_ref().unwrap().iat_mode.as_deref(), Some("0"));
        assert!(obfs4.has_tcp());
    }

    #[test]
    fn test_lenient_entry_fields() {
        let gateway = json!({
            "capabilities": { "transport": [
                { "type": "openvpn", "protocols": ["tcp", 7], "ports": [443] },
                { "type": "obfs4", "protocols": ["tcp"], "ports": ["23050"], "options": "broken" }
            ] }
        });
        let transports = gateway_transports(&gateway).unwrap();

        assert_eq!(transports[0].protocols, vec!["tcp"]);
        assert!(supports_transport(&gateway, TransportType::Openvpn, TransportProtocol::Tcp));
        assert_eq!(transports[1].options, None);
        assert!(supports_transport(&gateway, TransportType::Obfs4, TransportProtocol::Tcp));
    }

    #[test]
    fn test_unknown_transport_never_matches() {
        let gateway = json!({
            "capabilities": { "transport": [{ "type": "wireguard", "protocols": ["udp"] }] }
        });
        let transports = gateway_transports(&gateway).unwrap();

        assert_eq!(transports[0].transport_type, None);
        assert!(offered_pairs(&transports).is_empty());
    }

    #[test]
    fn test_allow_lists() {
        let kcp_only = json!({
            "capabilities": { "transport": [{ "type": "obfs4", "protocols": ["kcp"] }] }
        });

        assert!(supports_any(&kcp_only, &pluggable_transport_pairs(true)));
        assert!(!supports_any(&kcp_only, &pluggable_transport_pairs(false)));
        assert!(supports_any(&kcp_only, &experimental_pluggable_transport_pairs()));
        assert!(!supports_any(&obfs4_gateway(), &experimental_pluggable_transport_pairs()));
    }
}
