//! Provider Descriptors
//!
//! Typed views of the JSON documents a provider publishes: the eip-service
//! definition, its gateway and location entries, the geo/load ordering and
//! the client secrets bundle.
//!
//! This is the one place malformed provider input is dealt with. Optional
//! fields fall back to empty values; shape errors that matter (a broken
//! capability matrix) surface later as typed errors for the single gateway
//! that carries them.

use crate::capability::{self, CapabilityError, TransportDescriptor};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// Deserialize a field, falling back to its default on any shape mismatch
pub(crate) fn or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).unwrap_or_default())
}

/// Integer that may be published as a number or a numeric string ("+3", "-7")
pub(crate) fn lenient_int<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(int_from_value(&value).unwrap_or(0))
}

fn int_from_value(value: &Value) -> Option<i32> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(|i| i32::try_from(i).ok()),
        Value::String(s) => s
            .trim()
            .parse::<i32>()
            .ok()
            .or_else(|| s.trim().parse::<f64>().ok().map(|f| f as i32)),
        _ => None,
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Optional string that may be published as a number
pub(crate) fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(scalar_to_string(&value))
}

/// Port list with entries as numbers or strings; other entries are dropped
pub(crate) fn port_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value
        .as_array()
        .map(|ports| ports.iter().filter_map(scalar_to_string).collect())
        .unwrap_or_default())
}

/// String list; non-string entries are dropped
pub(crate) fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value
        .as_array()
        .map(|entries| entries.iter().filter_map(|e| e.as_str().map(str::to_owned)).collect())
        .unwrap_or_default())
}

/// Location entry of `eip-service.json`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LocationDescriptor {
    #[serde(default, deserialize_with = "or_default")]
    pub name: String,
    #[serde(default, deserialize_with = "or_default")]
    pub country_code: String,
    #[serde(default, deserialize_with = "or_default")]
    pub hemisphere: String,
    /// UTC offset in hours
    #[serde(default, deserialize_with = "lenient_int")]
    pub timezone: i32,
}

/// The provider's `eip-service.json`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EipService {
    /// Raw gateway entries, validated one at a time
    #[serde(default, deserialize_with = "or_default")]
    pub gateways: Vec<Value>,
    #[serde(default, deserialize_with = "or_default")]
    pub locations: Map<String, Value>,
    /// General OpenVPN directives in document order
    #[serde(default, deserialize_with = "or_default")]
    pub openvpn_configuration: Map<String, Value>,
    #[serde(default, deserialize_with = "lenient_int")]
    pub serial: i32,
    /// Api version selecting the rendering dialect
    #[serde(default, deserialize_with = "lenient_int")]
    pub version: i32,
}

impl EipService {
    /// Parse from JSON text
    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    /// Look up a location by key, empty if absent or malformed
    pub fn location(&self, key: &str) -> LocationDescriptor {
        self.locations
            .get(key)
            .and_then(|l| LocationDescriptor::deserialize(l).ok())
            .unwrap_or_default()
    }
}

/// Flat capabilities of api versions 1 and 2
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LegacyCapabilities {
    #[serde(default, deserialize_with = "port_list")]
    pub ports: Vec<String>,
    #[serde(default, deserialize_with = "string_list")]
    pub protocols: Vec<String>,
}

/// One gateway entry of `eip-service.json`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewayDescriptor {
    #[serde(default, deserialize_with = "or_default")]
    pub host: String,
    #[serde(default, deserialize_with = "or_default")]
    pub ip_address: String,
    /// Empty when the gateway has no IPv6 address
    #[serde(default, deserialize_with = "or_default")]
    pub ip_address6: String,
    /// Key into `locations`
    #[serde(default, deserialize_with = "or_default")]
    pub location: String,
    /// Shape depends on the api version, interpreted lazily
    #[serde(default)]
    pub capabilities: Option<Value>,
}

impl GatewayDescriptor {
    /// Parse a raw gateway entry; only a non-object entry fails
    pub fn from_value(value: &Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(value)
    }

    /// Capability matrix (api version 3 and later)
    pub fn transports(&self) -> Result<Vec<TransportDescriptor>, CapabilityError> {
        capability::transports_from_capabilities(self.capabilities.as_ref())
    }

    /// Flat ports/protocols (api versions 1 and 2), empty if absent
    pub fn legacy_capabilities(&self) -> LegacyCapabilities {
        self.capabilities
            .as_ref()
            .and_then(|c| LegacyCapabilities::deserialize(c).ok())
            .unwrap_or_default()
    }

    /// Addresses usable for remotes, IPv6 first; absent ones are skipped
    pub fn ip_addresses(&self) -> Vec<&str> {
        [self.ip_address6.as_str(), self.ip_address.as_str()]
            .into_iter()
            .filter(|a| !a.is_empty())
            .collect()
    }
}

/// Client secrets bundle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secrets {
    #[serde(default)]
    pub ca_cert: String,
    #[serde(default)]
    pub provider_private_key: String,
    #[serde(default)]
    pub provider_vpn_certificate: String,
}

impl Secrets {
    /// Parse from JSON text
    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }
}

/// Server-reported load of a gateway
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct GatewayLoad {
    /// 0.0 (idle) ..= 1.0 (full)
    #[serde(default, deserialize_with = "or_default")]
    pub fullness: f64,
    #[serde(default, deserialize_with = "or_default")]
    pub overload: bool,
}

/// Entry of `sorted_gateways`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SortedGateway {
    pub host: String,
    #[serde(flatten)]
    pub load: GatewayLoad,
}

/// Gateway ordering published by the provider's geo service
#[derive(Debug, Clone, PartialEq)]
pub enum GeoIpOrdering {
    /// `sorted_gateways`: hosts with load metrics, best first
    LoadAnnotated(Vec<SortedGateway>),
    /// `gateways`: plain host names, best first
    HostNames(Vec<String>),
}

impl GeoIpOrdering {
    /// Interpret a geo document; `sorted_gateways` wins over `gateways`.
    ///
    /// Returns `None` when neither list is present.
    pub fn from_value(value: &Value) -> Option<Self> {
        if let Some(sorted) = value.get("sorted_gateways") {
            let entries = sorted
                .as_array()
                .map(|entries| {
                    entries
                        .iter()
                        .filter_map(|entry| match SortedGateway::deserialize(entry) {
                            Ok(gateway) => Some(gateway),
                            Err(e) => {
                                debug!("Skipping sorted gateway entry: {}", e);
                                None
                            }
                        })
                        .collect()
                })
                .unwrap_or_default();
            return Some(GeoIpOrdering::LoadAnnotated(entries));
        }

        let hosts = value.get("gateways")?.as_array()?;
        Some(GeoIpOrdering::HostNames(
            hosts
                .iter()
                .filter_map(|h| h.as_str().map(str::to_owned))
                .collect(),
        ))
    }

    /// Parse from JSON text
    pub fn from_json(content: &str) -> Result<Option<Self>, serde_json::Error> {
        let value: Value = serde_json::from_str(content)?;
        Ok(Self::from_value(&value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lenient_eip_service() {
        let eip: EipService = serde_json::from_value(json!({
            "gateways": "not-a-list",
            "locations": { "ams": { "name": "Amsterdam", "timezone": "+1" } },
            "version": "3"
        }))
        .unwrap();

        assert!(eip.gateways.is_empty());
        assert_eq!(eip.version, 3);
        assert_eq!(eip.location("ams").timezone, 1);
        assert_eq!(eip.location("ams").name, "Amsterdam");
        assert_eq!(eip.location("nowhere"), LocationDescriptor::default());
    }

    #[test]
    fn test_timezone_variants() {
        assert_eq!(int_from_value(&json!(-7)), Some(-7));
        assert_eq!(int_from_value(&json!("-3")), Some(-3));
        assert_eq!(int_from_value(&json!("5.5")), Some(5));
        assert_eq!(int_from_value(&json!(null)), None);
    }

    #[test]
    fn test_gateway_descriptor() {
        let gateway = GatewayDescriptor::from_value(&json!({
            "host": "gw.example.net",
            "ip_address": "198.51.100.7",
            "ip_address6": "2001:db8::7",
            "location": "ams",
            "capabilities": { "ports": [443, "80"], "protocols": ["tcp"], "transport": ["openvpn"] }
        }))
        .unwrap();

        assert_eq!(gateway.ip_addresses(), vec!["2001:db8::7", "198.51.100.7"]);
        assert_eq!(gateway.legacy_capabilities().ports, vec!["443", "80"]);
        assert!(matches!(gateway.transports(), Err(CapabilityError::Malformed(_))));
        assert!(GatewayDescriptor::from_value(&json!("gw.example.net")).is_err());
    }

    #[test]
    fn test_missing_addresses_are_skipped() {
        let ipv6_only = GatewayDescriptor::from_value(&json!({
            "host": "v6.example.net",
            "ip_address6": "2001:db8::7"
        }))
        .unwrap();
        assert_eq!(ipv6_only.ip_addresses(), vec!["2001:db8::7"]);

        let bare = GatewayDescriptor::from_value(&json!({ "host": "bare.example.net" })).unwrap();
        assert!(bare.ip_addresses().is_empty());
    }

    #[test]
    fn test_legacy_protocols_keep_string_entries() {
        let gateway = GatewayDescriptor::from_value(&json!({
            "host": "legacy.example.net",
            "capabilities": { "ports": ["443"], "protocols": ["tcp", 7, null, "udp"] }
        }))
        .unwrap();

        assert_eq!(gateway.legacy_capabilities().protocols, vec!["tcp", "udp"]);
    }

    #[test]
    fn test_geo_ordering_precedence() {
        let geo = json!({
            "gateways": ["a.example.net"],
            "sorted_gateways": [
                { "host": "b.example.net", "fullness": 0.4, "overload": false },
                { "fullness": 0.1 },
                { "host": "c.example.net" }
            ]
        });

        match GeoIpOrdering::from_value(&geo) {
            Some(GeoIpOrdering::LoadAnnotated(entries)) => {
                assert_eq!(entries.len(), 2);
                assert_eq!(entries[0].host, "b.example.net");
                assert_eq!(entries[0].load.fullness, 0.4);
                assert_eq!(entries[1].load, GatewayLoad::default());
            }
            other => panic!("unexpected ordering: {:?}", other),
        }

        let simple = json!({ "gateways": ["a.example.net", 7, "b.example.net"] });
        assert_eq!(
            GeoIpOrdering::from_value(&simple),
            Some(GeoIpOrdering::HostNames(vec![
                "a.example.net".to_string(),
                "b.example.net".to_string()
            ]))
        );

        assert_eq!(GeoIpOrdering::from_value(&json!({ "cc": "NL" })), None);
    }
}
