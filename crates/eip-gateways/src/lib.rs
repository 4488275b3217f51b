//! EIP Gateways - Gateway Selection and VPN Profile Generation
//!
//! Turns the documents an encrypted-internet-proxy (EIP) provider publishes
//! into ready-to-use VPN profiles and picks the gateway to connect to.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Provider (eip-service.json, geoip.json, secrets.json)       │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                │
//!                                ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │  GatewaysManager                                             │
//! │                                                              │
//! │  ┌───────────┐   ┌────────────────────┐   ┌──────────────┐   │
//! │  │  Gateway  │──▶│ VpnConfigGenerator │──▶│ ConfigParser │   │
//! │  └───────────┘   └────────────────────┘   └──────┬───────┘   │
//! │        ▲                                         │           │
//! │        │ ranking                                 ▼           │
//! │  ┌─────┴─────────────────────┐            ┌──────────────┐   │
//! │  │ server order / timezone   │            │  VpnProfile  │   │
//! │  └───────────────────────────┘            └──────────────┘   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Features
//!
//! - **Versioned descriptors**: flat (api v1-v2) and per-transport (v3+)
//!   capability formats
//! - **Transports**: plain OpenVPN, obfs4 via the local dispatcher or
//!   directly, obfs4 port hopping
//! - **Ordering**: server load list, server host list, or timezone distance
//! - **Locations**: per-city load aggregates

mod capability;
mod config;
mod descriptor;
mod gateway;
mod generator;
mod location;
mod manager;
mod profile;
mod provider;
mod selector;
pub mod timezone;

pub use capability::{
    CapabilityError, TransportDescriptor, TransportOptions, TransportPair, TransportProtocol,
    TransportType,
};
pub use config::{ClientPreferences, ConfigError, ObfuscationPinning};
pub use descriptor::{
    EipService, GatewayDescriptor, GatewayLoad, GeoIpOrdering, LegacyCapabilities,
    LocationDescriptor, Secrets, SortedGateway,
};
pub use gateway::{Gateway, GatewayError};
pub use generator::VpnConfigGenerator;
pub use location::{Load, Location};
pub use manager::{GatewaysManager, SelectionStrategy};
pub use profile::{
    ConfigParseError, ConfigParser, Connection, Directive, Obfs4Options, Route, SocksProxy,
    VpnProfile,
};
pub use provider::{Provider, ProviderError};
pub use selector::{GatewayRanking, GatewaySelector, PresortedRanking};

/// Capability matching on raw gateway descriptors
pub mod capabilities {
    pub use crate::capability::{
        experimental_pluggable_transport_pairs, gateway_transports, offered_pairs,
        pluggable_transport_pairs, supports_any, supports_transport,
    };
}
