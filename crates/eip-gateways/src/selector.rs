//! Gateway Ranking
//!
//! Orderings the manager walks when selecting a gateway: the client-side
//! timezone ranking and a server-supplied presorted list.

use crate::gateway::Gateway;
use crate::timezone;
use std::cell::OnceCell;

/// An ordering of gateways, best first
pub trait GatewayRanking<'a> {
    /// The `nth` best gateway, `None` past the end
    fn select(&self, nth: usize) -> Option<&'a Gateway>;
}

/// Ranks gateways by timezone distance to the client
#[derive(Debug)]
pub struct GatewaySelector<'a> {
    gateways: &'a [Gateway],
    client_timezone: i32,
    order: OnceCell<Vec<usize>>,
}

impl<'a> GatewaySelector<'a> {
    pub fn new(gateways: &'a [Gateway], client_timezone: i32) -> Self {
        Self {
            gateways,
            client_timezone,
            order: OnceCell::new(),
        }
    }

    /// Stable ascending order by distance, computed on first use
    fn order(&self) -> &[usize] {
        self.order.get_or_init(|| {
            let mut order: Vec<usize> = (0..self.gateways.len()).collect();
            order.sort_by_key(|&i| self.distance(&self.gateways[i]));
            order
        })
    }

    /// Distance in hours between the client and `gateway`
    pub fn distance(&self, gateway: &Gateway) -> i32 {
        timezone::distance(self.client_timezone, gateway.timezone())
    }
}

impl<'a> GatewayRanking<'a> for GatewaySelector<'a> {
    fn select(&self, nth: usize) -> Option<&'a Gateway> {
        let gateways = self.gateways;
        self.order().get(nth).map(|&i| &gateways[i])
    }
}

/// Server-supplied ordering, indices into the gateway list
#[derive(Debug)]
pub struct PresortedRanking<'a> {
    gateways: &'a [Gateway],
    order: &'a [usize],
}

impl<'a> PresortedRanking<'a> {
    pub fn new(gateways: &'a [Gateway], order: &'a [usize]) -> Self {
        Self { gateways, order }
    }
}

impl<'a> GatewayRanking<'a> for PresortedRanking<'a> {
    fn select(&self, nth: usize) -> Option<&'a Gateway> {
        self.order.get(nth).and_then(|&i| self.gateways.get(i))
    }
}

/// Iterate a ranking from best to worst
pub fn ranked<'a, R>(ranking: &R) -> impl Iterator<Item = &'a Gateway>
where
    R: GatewayRanking<'a>,
{
    (0..).map_while(move |i| ranking.select(i))
}
