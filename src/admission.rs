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

//! Module defining the admission engine gating bearer activation.

use crate::bearer::BearerRecord;
use crate::connection::ConnectionRegistry;
use crate::stats::{AdmissionStats, StatsSnapshot};
use crate::types::{BlockReason, LteIface, SwitchId};
use itertools::Itertools;
use log::*;
use std::collections::HashMap;

/// Flow entries one bearer consumes per switch (one rule per direction)
const ENTRIES_PER_BEARER: usize = 2;

/// The resolved end-to-end paths of a bearer, one per traversed interface
pub type BearerPaths = Vec<(LteIface, Vec<SwitchId>)>;

/// Resource usage of a single switch, tracked by the admission engine
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwitchUsage {
    /// Flow-table capacity in entries
    pub table_cap: usize,
    /// Flow entries currently committed
    pub entries: usize,
    /// Pipeline budget in bits per second
    pub max_load: f64,
    /// Committed throughput (sum of maximum bit rates) in bits per second
    pub load: f64,
}

/// Outcome of an admission run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionDecision {
    /// Sufficient resources exist along the path
    Accepted,
    /// At least one resource is exhausted; the bitmap carries the diagnosis
    Blocked(BlockReason),
}

impl AdmissionDecision {
    /// Returns true for [`AdmissionDecision::Accepted`]
    pub fn is_accepted(&self) -> bool {
        matches!(self, AdmissionDecision::Accepted)
    }
}

/// # Admission Engine
///
/// Gates the transition of a bearer from requested to active: checks
/// flow-table headroom and pipeline budget on every switch of the path, and
/// for GBR bearers the remaining guaranteed bandwidth on every link. On
/// acceptance the checked resources are reserved; on rejection the record
/// carries the block-reason bits for statistics.
#[derive(Debug, Clone)]
pub struct AdmissionEngine {
    usage: HashMap<SwitchId, SwitchUsage>,
    default_table_cap: usize,
    default_max_load: f64,
    /// Fraction of the flow table usable before blocking new bearers
    block_threshold: f64,
    stats: AdmissionStats,
}

impl AdmissionEngine {
    /// Create an engine with per-switch defaults. Individual switches can be
    /// overridden with [`AdmissionEngine::set_switch_capacity`].
    pub fn new(default_table_cap: usize, default_max_load: f64, block_threshold: f64) -> Self {
        debug_assert!(block_threshold > 0.0 && block_threshold <= 1.0);
        Self {
            usage: HashMap::new(),
            default_table_cap,
            default_max_load,
            block_threshold,
            stats: AdmissionStats::new(),
        }
    }

    /// Override the capacity of one switch
    pub fn set_switch_capacity(&mut self, switch: SwitchId, table_cap: usize, max_load: f64) {
        let usage = self.usage_mut(switch);
        usage.table_cap = table_cap;
        usage.max_load = max_load;
    }

    /// The current usage of one switch
    pub fn usage(&self, switch: SwitchId) -> SwitchUsage {
        self.usage.get(&switch).copied().unwrap_or(SwitchUsage {
            table_cap: self.default_table_cap,
            entries: 0,
            max_load: self.default_max_load,
            load: 0.0,
        })
    }

    fn usage_mut(&mut self, switch: SwitchId) -> &mut SwitchUsage {
        let default_table_cap = self.default_table_cap;
        let default_max_load = self.default_max_load;
        self.usage.entry(switch).or_insert(SwitchUsage {
            table_cap: default_table_cap,
            entries: 0,
            max_load: default_max_load,
            load: 0.0,
        })
    }

    /// Check whether the resources for this bearer are available along its
    /// paths, without reserving anything. On rejection the specific block
    /// bits are set on the record and counted; on acceptance the block
    /// diagnosis is cleared. Activation and install flags are never touched.
    pub fn review(
        &mut self,
        record: &mut BearerRecord,
        paths: &BearerPaths,
        registry: &ConnectionRegistry,
    ) -> AdmissionDecision {
        let mut reasons = BlockReason::empty();
        let throughput = record.qos.mbr_dl + record.qos.mbr_ul;

        for (iface, path) in paths.iter() {
            for sw in path.iter() {
                let usage = self.usage(*sw);
                let usable = usage.table_cap as f64 * self.block_threshold;
                if (usage.entries + ENTRIES_PER_BEARER) as f64 > usable {
                    reasons.insert(BlockReason::TABLE_FULL);
                }
                if usage.load + throughput > usage.max_load {
                    reasons.insert(BlockReason::CPU_OVERLOAD);
                }
            }
            if record.qos.is_gbr() && !record.is_gbr_reserved(*iface) {
                for (a, b) in path.iter().copied().tuple_windows() {
                    let link = registry
                        .get_link(a, b)
                        .expect("path hops are registered links");
                    if !link.has_bandwidth(record.qos.gbr_dl, record.qos.gbr_ul) {
                        reasons.insert(link.tier.block_bit());
                    }
                }
            }
        }

        if reasons.is_empty() {
            record.clear_blocked();
            self.stats.notify_accepted();
            AdmissionDecision::Accepted
        } else {
            debug!("{} blocked: {}", record.teid, reasons);
            record.set_blocked(reasons);
            self.stats.notify_blocked(reasons);
            AdmissionDecision::Blocked(reasons)
        }
    }

    /// Reserve the resources of an accepted bearer: flow entries and pipeline
    /// load on every switch, and for GBR bearers the guaranteed bandwidth on
    /// every link. Reserving bandwidth twice for the same interface is a
    /// caller bug, guarded by the per-interface reservation flag.
    pub fn reserve(
        &mut self,
        record: &mut BearerRecord,
        paths: &BearerPaths,
        registry: &mut ConnectionRegistry,
    ) {
        let throughput = record.qos.mbr_dl + record.qos.mbr_ul;
        for (iface, path) in paths.iter() {
            for sw in path.iter() {
                let usage = self.usage_mut(*sw);
                usage.entries += ENTRIES_PER_BEARER;
                usage.load += throughput;
            }
            if record.qos.is_gbr() {
                debug_assert!(
                    !record.is_gbr_reserved(*iface),
                    "double GBR reservation on {}",
                    record.teid
                );
                for (a, b) in path.iter().copied().tuple_windows() {
                    registry
                        .get_link_mut(a, b)
                        .expect("path hops are registered links")
                        .reserve(record.qos.gbr_dl, record.qos.gbr_ul);
                }
                record.set_gbr_reserved(*iface, true);
            }
        }
    }

    /// Release the resources of a deactivating bearer, the inverse of
    /// [`AdmissionEngine::reserve`].
    pub fn release(
        &mut self,
        record: &mut BearerRecord,
        paths: &BearerPaths,
        registry: &mut ConnectionRegistry,
    ) {
        let throughput = record.qos.mbr_dl + record.qos.mbr_ul;
        for (iface, path) in paths.iter() {
            for sw in path.iter() {
                let usage = self.usage_mut(*sw);
                usage.entries = usage.entries.saturating_sub(ENTRIES_PER_BEARER);
                usage.load = (usage.load - throughput).max(0.0);
            }
            if record.qos.is_gbr() && record.is_gbr_reserved(*iface) {
                for (a, b) in path.iter().copied().tuple_windows() {
                    registry
                        .get_link_mut(a, b)
                        .expect("path hops are registered links")
                        .release(record.qos.gbr_dl, record.qos.gbr_ul);
                }
                record.set_gbr_reserved(*iface, false);
            }
        }
    }

    /// Account for the default bearer, which is accepted by invariant and
    /// never reviewed. Keeps the accept counters consistent.
    pub fn account_default(&mut self) {
        self.stats.notify_accepted();
    }

    /// Read access to the running counters
    pub fn stats(&self) -> &AdmissionStats {
        &self.stats
    }

    /// Close the statistics interval, returning the snapshot
    pub fn dump_stats(&mut self) -> StatsSnapshot {
        self.stats.snapshot_and_reset()
    }
}
