//! Gateways Manager
//!
//! Builds every gateway of a provider and answers selection queries:
//! the n-th best gateway for a transport and city, the position of a
//! profile in that order, and per-location aggregates.
//!
//! # Usage
//!
//! ```rust,ignore
//! let provider = Provider::load(eip_path, secrets_path, Some(geo_path))?;
//! let manager = GatewaysManager::new(&provider, ClientPreferences::default());
//!
//! if let Some(gateway) = manager.select(0, None) {
//!     let profile = gateway.profile(manager.transport());
//! }
//! ```
//!
//! The ordering is resolved once per manager: a server list with load
//! data wins over a plain server host list, which wins over ranking by
//! client timezone.

use crate::capability::TransportType;
use crate::config::ClientPreferences;
use crate::descriptor::{GatewayLoad, GeoIpOrdering};
use crate::gateway::Gateway;
use crate::location::{Load, Location};
use crate::profile::VpnProfile;
use crate::provider::Provider;
use crate::selector::{GatewaySelector, PresortedRanking, ranked};
use crate::timezone;
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::{debug, error, info};

/// Where the gateway order comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionStrategy {
    /// `sorted_gateways` from the geo service, with load data
    ServerLoadOrdered,
    /// `gateways` host list from the geo service
    ServerNameOrdered,
    /// Timezone distance to the client
    ClientTimezoneRanked,
}

impl SelectionStrategy {
    /// Does this strategy follow a server-supplied list?
    pub fn is_presorted(&self) -> bool {
        !matches!(self, SelectionStrategy::ClientTimezoneRanked)
    }
}

impl fmt::Display for SelectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SelectionStrategy::ServerLoadOrdered => "server load",
            SelectionStrategy::ServerNameOrdered => "server order",
            SelectionStrategy::ClientTimezoneRanked => "client timezone",
        };
        f.write_str(name)
    }
}

/// Gateway selection over one provider snapshot
#[derive(Debug)]
pub struct GatewaysManager {
    /// Gateways in descriptor order
    gateways: Vec<Gateway>,
    /// Host → index into `gateways`
    index: HashMap<String, usize>,
    /// Server-supplied order, indices into `gateways`
    presorted: Vec<usize>,
    strategy: SelectionStrategy,
    preferences: ClientPreferences,
    client_timezone: i32,
}

impl GatewaysManager {
    /// Build all gateways using the local timezone
    pub fn new(provider: &Provider, preferences: ClientPreferences) -> Self {
        Self::with_timezone(provider, preferences, timezone::current_offset())
    }

    /// Build all gateways for a client at `client_timezone`
    pub fn with_timezone(provider: &Provider, preferences: ClientPreferences, client_timezone: i32) -> Self {
        let mut manager = Self {
            gateways: Vec::new(),
            index: HashMap::new(),
            presorted: Vec::new(),
            strategy: SelectionStrategy::ClientTimezoneRanked,
            preferences,
            client_timezone,
        };

        manager.parse_gateways(provider);
        manager.resolve_strategy(provider.geo_ip.as_ref());

        info!(
            "Gateways manager ready: {} gateway(s), {} ordering",
            manager.gateways.len(),
            manager.strategy
        );
        manager
    }

    fn parse_gateways(&mut self, provider: &Provider) {
        for descriptor in &provider.eip_service.gateways {
            let gateway = match Gateway::new(&provider.eip_service, &provider.secrets, descriptor, &self.preferences) {
                Ok(gateway) => gateway,
                Err(e) => {
                    error!("Skipping gateway: {}", e);
                    continue;
                }
            };

            if self.index.contains_key(gateway.host()) {
                debug!("Duplicate gateway {} ignored", gateway.host());
                continue;
            }
            self.index.insert(gateway.host().to_string(), self.gateways.len());
            self.gateways.push(gateway);
        }
    }

    fn resolve_strategy(&mut self, geo_ip: Option<&GeoIpOrdering>) {
        let strategy = match geo_ip {
            Some(GeoIpOrdering::LoadAnnotated(entries)) => {
                for entry in entries {
                    self.push_presorted(&entry.host, Some(entry.load));
                }
                SelectionStrategy::ServerLoadOrdered
            }
            Some(GeoIpOrdering::HostNames(hosts)) => {
                for host in hosts {
                    self.push_presorted(host, None);
                }
                SelectionStrategy::ServerNameOrdered
            }
            None => SelectionStrategy::ClientTimezoneRanked,
        };

        self.strategy = if self.presorted.is_empty() {
            if strategy.is_presorted() {
                info!("No known gateway in server ordering, ranking by timezone");
            }
            SelectionStrategy::ClientTimezoneRanked
        } else {
            strategy
        };
    }

    fn push_presorted(&mut self, host: &str, load: Option<GatewayLoad>) {
        let Some(&i) = self.index.get(host) else {
            debug!("Server ordering names unknown gateway {}", host);
            return;
        };
        if self.presorted.contains(&i) {
            return;
        }
        if let Some(load) = load {
            self.gateways[i].update_load(load);
        }
        self.presorted.push(i);
    }

    /// All gateways in strategy order
    fn ordered(&self) -> Vec<&Gateway> {
        match self.strategy {
            SelectionStrategy::ClientTimezoneRanked => {
                ranked(&GatewaySelector::new(&self.gateways, self.client_timezone)).collect()
            }
            _ => ranked(&PresortedRanking::new(&self.gateways, &self.presorted)).collect(),
        }
    }

    /// Transport implied by the preferences
    pub fn transport(&self) -> TransportType {
        self.preferences.transport()
    }

    /// The `nth` best gateway for the preferred transport, optionally in `city`
    pub fn select(&self, nth: usize, city: Option<&str>) -> Option<&Gateway> {
        self.select_for(nth, self.transport(), city)
    }

    /// The `nth` best gateway supporting `transport`, optionally in `city`
    pub fn select_for(&self, nth: usize, transport: TransportType, city: Option<&str>) -> Option<&Gateway> {
        self.ordered()
            .into_iter()
            .filter(|g| g.supports_transport(transport))
            .filter(|g| city.is_none_or(|c| g.name() == c))
            .nth(nth)
    }

    /// Selection honouring the pinned gateway and preferred city
    pub fn select_preferred(&self, nth: usize) -> Option<&Gateway> {
        if let Some(host) = &self.preferences.pinned_gateway {
            debug!("Using pinned gateway {}", host);
            return self
                .gateway(host)
                .filter(|g| nth == 0 && g.supports_transport(self.transport()));
        }
        self.select(nth, self.preferences.preferred_city.as_deref())
    }

    /// Index of the gateway owning `profile` in selection order.
    ///
    /// The transport is taken from the profile's pluggable-transport flag.
    pub fn position(&self, profile: &VpnProfile) -> Option<usize> {
        let transport = if profile.use_pluggable_transports {
            TransportType::Obfs4
        } else {
            TransportType::Openvpn
        };

        self.ordered()
            .into_iter()
            .filter(|g| g.supports_transport(transport))
            .position(|g| g.profile(transport) == Some(profile))
    }

    /// One record per distinct location name, walking the selection order
    /// for the preferred transport
    pub fn gateway_locations(&self) -> Vec<Location> {
        let transport = self.transport();
        self.aggregate_locations(|g| g.supports_transport(transport))
    }

    /// Locations with gateways supporting `transport`, least loaded first
    pub fn sorted_gateway_locations(&self, transport: TransportType) -> Vec<Location> {
        let mut locations = self.aggregate_locations(|g| g.supports_transport(transport));
        locations.sort_by(|a, b| a.average_load.total_cmp(&b.average_load));
        locations
    }

    fn aggregate_locations(&self, include: impl Fn(&Gateway) -> bool) -> Vec<Location> {
        let mut locations: Vec<Location> = Vec::new();
        let mut by_name: HashMap<&str, usize> = HashMap::new();

        for gateway in self.ordered().into_iter().filter(|g| include(g)) {
            let i = *by_name.entry(gateway.name()).or_insert_with(|| {
                let mut location = Location::new(gateway.name());
                location.selected = self.preferences.preferred_city.as_deref() == Some(gateway.name());
                locations.push(location);
                locations.len() - 1
            });
            locations[i].add_gateway(gateway.fullness(self.client_timezone), gateway.transports());
        }

        locations
    }

    /// Aggregate for one location name
    pub fn location(&self, name: &str) -> Option<Location> {
        self.gateway_locations().into_iter().find(|l| l.name == name)
    }

    /// Load bucket of a location for `transport`
    pub fn load_for_location(&self, name: &str, transport: TransportType) -> Load {
        self.aggregate_locations(|g| g.name() == name && g.supports_transport(transport))
            .first()
            .map(Location::load)
            .unwrap_or(Load::Unknown)
    }

    /// Location name of the gateway with `ip`
    pub fn location_name_for_ip(&self, ip: &str) -> Option<&str> {
        self.gateways
            .iter()
            .find(|g| g.remote_ip() == ip)
            .map(Gateway::name)
    }

    /// Are the gateways spread over more than one location?
    pub fn has_gateways_in_different_locations(&self) -> bool {
        let names: HashSet<&str> = self.gateways.iter().map(Gateway::name).collect();
        names.len() > 1
    }

    pub fn gateway(&self, host: &str) -> Option<&Gateway> {
        self.index.get(host).map(|&i| &self.gateways[i])
    }

    /// Gateways in descriptor order
    pub fn gateways(&self) -> &[Gateway] {
        &self.gateways
    }

    pub fn strategy(&self) -> SelectionStrategy {
        self.strategy
    }

    pub fn client_timezone(&self) -> i32 {
        self.client_timezone
    }

    pub fn preferences(&self) -> &ClientPreferences {
        &self.preferences
    }

    pub fn len(&self) -> usize {
        self.gateways.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gateways.is_empty()
    }
}
