//! Gateway Locations
//!
//! Per-location aggregates shown to the user when picking a city.

use crate::capability::TransportType;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// Coarse load bucket of a location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Load {
    /// No data, or a value outside `0.0..=1.0`
    Unknown,
    Good,
    Average,
    Critical,
}

impl Load {
    /// Bucket a fullness value
    pub fn from_value(value: f64) -> Self {
        if value <= 0.0 || value.is_nan() {
            Load::Unknown
        } else if value <= 0.25 {
            Load::Good
        } else if value <= 0.75 {
            Load::Average
        } else if value <= 1.0 {
            Load::Critical
        } else {
            Load::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Load::Unknown => "unknown",
            Load::Good => "good",
            Load::Average => "average",
            Load::Critical => "critical",
        }
    }
}

impl fmt::Display for Load {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Aggregated view of all gateways sharing a location name
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Location {
    pub name: String,
    /// Running average of gateway fullness
    pub average_load: f64,
    pub number_of_gateways: usize,
    /// Matches the preferred city
    pub selected: bool,
    /// Transports offered by at least one gateway here
    pub transports: BTreeSet<TransportType>,
}

impl Location {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            average_load: 0.0,
            number_of_gateways: 0,
            selected: false,
            transports: BTreeSet::new(),
        }
    }

    /// Fold one more gateway into the aggregate
    pub fn add_gateway(&mut self, fullness: f64, transports: impl IntoIterator<Item = TransportType>) {
        let n = self.number_of_gateways as f64;
        self.average_load = (n * self.average_load + fullness) / (n + 1.0);
        self.number_of_gateways += 1;
        self.transports.extend(transports);
    }

    pub fn load(&self) -> Load {
        Load::from_value(self.average_load)
    }

    pub fn supports_transport(&self, transport: TransportType) -> bool {
        self.transports.contains(&transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_buckets() {
        assert_eq!(Load::from_value(0.0), Load::Unknown);
        assert_eq!(Load::from_value(0.1), Load::Good);
        assert_eq!(Load::from_value(0.25), Load::Good);
        assert_eq!(Load::from_value(0.5), Load::Average);
        assert_eq!(Load::from_value(0.75), Load::Average);
        assert_eq!(Load::from_value(0.9), Load::Critical);
        assert_eq!(Load::from_value(1.0), Load::Critical);
        assert_eq!(Load::from_value(1.5), Load::Unknown);
        assert_eq!(Load::from_value(f64::NAN), Load::Unknown);
    }

    #[test]
    fn test_running_average() {
        let mut location = Location::new("Amsterdam");
        location.add_gateway(0.2, [TransportType::Openvpn]);
        location.add_gateway(0.4, [TransportType::Openvpn, TransportType::Obfs4]);
        location.add_gateway(0.9, std::iter::empty());

        assert_eq!(location.number_of_gateways, 3);
        assert!((location.average_load - 0.5).abs() < 1e-9);
        assert_eq!(location.load(), Load::Average);
        assert!(location.supports_transport(TransportType::Obfs4));
        assert!(!location.supports_transport(TransportType::Obfs4Hop));
    }
}
