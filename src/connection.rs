// OFEPC: OpenFlow EPC Bearer Controller
// Copyright (C) 2026
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! Module defining the inter-switch link registry and backhaul routing.

use crate::types::{BackhaulGraph, LinkTier, LinkWeight, Rate, SwitchId, TopologyError};
use log::*;
use petgraph::algo::bellman_ford;
use std::collections::{hash_map::Values, HashMap};

/// Metadata of a single inter-switch link. The pair of switches is unordered;
/// `first` always holds the lower switch index.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionInfo {
    /// Lower-indexed switch of the pair
    pub first: SwitchId,
    /// Higher-indexed switch of the pair
    pub second: SwitchId,
    /// Port on `first` leading to `second`
    pub first_port: u32,
    /// Port on `second` leading to `first`
    pub second_port: u32,
    /// Link capacity per direction, in bits per second
    pub capacity: Rate,
    /// Layer of the backhaul this link belongs to
    pub tier: LinkTier,
    /// Guaranteed bandwidth currently reserved in downlink direction
    pub reserved_dl: Rate,
    /// Guaranteed bandwidth currently reserved in uplink direction
    pub reserved_ul: Rate,
}

impl ConnectionInfo {
    /// Create link metadata between two switches. The arguments may come in
    /// any order; the struct normalizes them so that `first < second`.
    pub fn new(
        sw_a: SwitchId,
        port_a: u32,
        sw_b: SwitchId,
        port_b: u32,
        capacity: Rate,
        tier: LinkTier,
    ) -> Self {
        let (first, first_port, second, second_port) = if sw_a.index() <= sw_b.index() {
            (sw_a, port_a, sw_b, port_b)
        } else {
            (sw_b, port_b, sw_a, port_a)
        };
        Self {
            first,
            second,
            first_port,
            second_port,
            capacity,
            tier,
            reserved_dl: 0.0,
            reserved_ul: 0.0,
        }
    }

    /// The unordered lookup key of this link
    pub fn key(&self) -> (SwitchId, SwitchId) {
        (self.first, self.second)
    }

    /// The port on `from` that leads to the other end of this link
    pub fn port_from(&self, from: SwitchId) -> u32 {
        if from == self.first {
            self.first_port
        } else {
            self.second_port
        }
    }

    /// Returns true if the requested guaranteed rates still fit on this link
    pub fn has_bandwidth(&self, dl: Rate, ul: Rate) -> bool {
        self.reserved_dl + dl <= self.capacity && self.reserved_ul + ul <= self.capacity
    }

    /// Reserve guaranteed bandwidth in both directions
    pub fn reserve(&mut self, dl: Rate, ul: Rate) {
        self.reserved_dl += dl;
        self.reserved_ul += ul;
    }

    /// Release previously reserved guaranteed bandwidth
    pub fn release(&mut self, dl: Rate, ul: Rate) {
        self.reserved_dl -= dl;
        self.reserved_ul -= ul;
        debug_assert!(self.reserved_dl >= -1e-6 && self.reserved_ul >= -1e-6);
    }
}

/// # Connection Registry
///
/// Records inter-switch link metadata keyed by the unordered switch pair, and
/// owns the backhaul graph. Once all expected links are registered, the
/// routing tables (next hop per switch pair) are computed from the graph and
/// used to resolve end-to-end paths for admission and rule installation.
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    graph: BackhaulGraph,
    links: HashMap<(SwitchId, SwitchId), ConnectionInfo>,
    /// Next hop of every (source, target) switch pair. `None` means the target
    /// is unreachable from the source.
    next_hops: HashMap<SwitchId, HashMap<SwitchId, Option<SwitchId>>>,
    routes_built: bool,
}

impl ConnectionRegistry {
    /// The unordered lookup key of a switch pair, in any argument order
    fn key_of(sw_a: SwitchId, sw_b: SwitchId) -> (SwitchId, SwitchId) {
        if sw_a.index() <= sw_b.index() {
            (sw_a, sw_b)
        } else {
            (sw_b, sw_a)
        }
    }

    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            graph: BackhaulGraph::default(),
            links: HashMap::new(),
            next_hops: HashMap::new(),
            routes_built: false,
        }
    }

    /// Add a new switch to the backhaul graph, returning its index
    pub fn add_switch(&mut self) -> SwitchId {
        self.graph.add_node(())
    }

    /// Number of switches in the backhaul graph
    pub fn num_switches(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of registered links
    pub fn num_links(&self) -> usize {
        self.links.len()
    }

    /// Register a newly discovered link. Fails if the switch pair is already
    /// known; two switches are discovered as neighbors exactly once.
    pub fn register_link(&mut self, info: ConnectionInfo) -> Result<(), TopologyError> {
        let key = info.key();
        if self.links.contains_key(&key) {
            return Err(TopologyError::DuplicateLink(key.0, key.1));
        }
        debug!(
            "Link {:?}:{} <-> {:?}:{} ({:?}, {} bps)",
            info.first, info.first_port, info.second, info.second_port, info.tier, info.capacity
        );
        self.graph.add_edge(info.first, info.second, 1.0 as LinkWeight);
        self.graph.add_edge(info.second, info.first, 1.0 as LinkWeight);
        self.links.insert(key, info);
        // any previously computed routes are stale now
        self.routes_built = false;
        Ok(())
    }

    /// Get the link metadata between two switches, in any argument order
    pub fn get_link(&self, sw_a: SwitchId, sw_b: SwitchId) -> Result<&ConnectionInfo, TopologyError> {
        self.links
            .get(&Self::key_of(sw_a, sw_b))
            .ok_or(TopologyError::UnknownLink(sw_a, sw_b))
    }

    /// Get mutable link metadata between two switches, in any argument order
    pub fn get_link_mut(
        &mut self,
        sw_a: SwitchId,
        sw_b: SwitchId,
    ) -> Result<&mut ConnectionInfo, TopologyError> {
        self.links
            .get_mut(&Self::key_of(sw_a, sw_b))
            .ok_or(TopologyError::UnknownLink(sw_a, sw_b))
    }

    /// The port on `from` that leads towards its neighbor `to`
    pub fn port_towards(&self, from: SwitchId, to: SwitchId) -> Result<u32, TopologyError> {
        Ok(self.get_link(from, to)?.port_from(from))
    }

    /// Iterate over all registered links
    pub fn iter_links(&self) -> Values<'_, (SwitchId, SwitchId), ConnectionInfo> {
        self.links.values()
    }

    /// Returns true if the routing tables are up to date
    pub fn routes_built(&self) -> bool {
        self.routes_built
    }

    /// Compute the next-hop table of every switch by running bellman ford on
    /// the backhaul graph. Must be re-run after new links are registered.
    pub fn build_routes(&mut self) {
        self.next_hops.clear();
        for source in self.graph.node_indices() {
            self.next_hops.insert(source, self.next_hops_from(source));
        }
        self.routes_built = true;
        info!("Backhaul routes built for {} switches", self.graph.node_count());
    }

    /// Compute the next-hop table of a single source switch. The paths are
    /// processed sorted by cost, so the next hop of every predecessor is
    /// already known when it is needed.
    fn next_hops_from(&self, source: SwitchId) -> HashMap<SwitchId, Option<SwitchId>> {
        let mut table: HashMap<SwitchId, Option<SwitchId>> = HashMap::new();
        let (path_weights, predecessors) =
            bellman_ford(&self.graph, source).expect("hop metrics are non-negative");
        let mut paths: Vec<(SwitchId, LinkWeight, Option<SwitchId>)> = path_weights
            .into_iter()
            .zip(predecessors.into_iter())
            .enumerate()
            .map(|(i, (w, p))| ((i as u32).into(), w, p))
            .collect();
        paths.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap());
        for (target, cost, predecessor) in paths {
            if cost.is_infinite() {
                table.insert(target, None);
                continue;
            }
            let next_hop = match predecessor {
                Some(predecessor) if predecessor == source => Some(target),
                // the predecessor was already processed because of the ordering
                Some(predecessor) => *table.get(&predecessor).unwrap(),
                None if target == source => Some(source),
                None => None,
            };
            table.insert(target, next_hop);
        }
        table
    }

    /// Resolve the ordered list of switches between `src` and `dst`, both
    /// included. Fails if the routing tables are not built, or if the target
    /// is unreachable.
    pub fn resolve_path(
        &self,
        src: SwitchId,
        dst: SwitchId,
    ) -> Result<Vec<SwitchId>, TopologyError> {
        if !self.routes_built {
            return Err(TopologyError::RoutesNotBuilt);
        }
        let mut path = vec![src];
        let mut current = src;
        while current != dst {
            let next = self
                .next_hops
                .get(&current)
                .and_then(|t| t.get(&dst))
                .copied()
                .flatten()
                .ok_or(TopologyError::NoRoute(src, dst))?;
            path.push(next);
            current = next;
            if path.len() > self.graph.node_count() {
                // a loop here means the next-hop tables are inconsistent
                return Err(TopologyError::NoRoute(src, dst));
            }
        }
        Ok(path)
    }
}
