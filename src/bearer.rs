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

//! Module defining the per-tunnel routing metadata (bearer records) and the
//! TEID table owning them.

use crate::flows::{PRIO_TUNNEL_DEDICATED, PRIO_TUNNEL_DEFAULT, PRIO_TUNNEL_LOCAL};
use crate::types::{BearerError, BlockReason, Imsi, LteIface, Qci, Rate, SliceId, SwitchId, Teid};
use log::*;
use std::collections::{hash_map::Values, HashMap};
use std::net::Ipv4Addr;

/// The EPS bearer id reserved for the default bearer of a UE
pub const DEFAULT_BEARER_ID: u8 = 1;

/// QoS parameters of a bearer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QosInfo {
    /// QoS class identifier
    pub qci: Qci,
    /// Guaranteed bit rate, downlink
    pub gbr_dl: Rate,
    /// Guaranteed bit rate, uplink
    pub gbr_ul: Rate,
    /// Maximum bit rate, downlink
    pub mbr_dl: Rate,
    /// Maximum bit rate, uplink
    pub mbr_ul: Rate,
}

impl QosInfo {
    /// QoS parameters of a non-GBR bearer (all rates zero)
    pub fn non_gbr(qci: Qci) -> Self {
        debug_assert!(!qci.is_gbr());
        Self { qci, gbr_dl: 0.0, gbr_ul: 0.0, mbr_dl: 0.0, mbr_ul: 0.0 }
    }

    /// QoS parameters of a GBR bearer. The maximum bit rate is set equal to
    /// the guaranteed rate.
    pub fn gbr(qci: Qci, gbr_dl: Rate, gbr_ul: Rate) -> Self {
        debug_assert!(qci.is_gbr());
        Self { qci, gbr_dl, gbr_ul, mbr_dl: gbr_dl, mbr_ul: gbr_ul }
    }

    /// Returns true if this bearer reserves guaranteed bandwidth
    pub fn is_gbr(&self) -> bool {
        self.qci.is_gbr()
    }
}

/// Source and destination of a bearer on one logical interface, with the
/// switches resolved from the topology index at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IfacePath {
    /// Address on the radio-facing side of the interface
    pub src_addr: Ipv4Addr,
    /// Address on the core-facing side of the interface
    pub dst_addr: Ipv4Addr,
    /// Switch serving `src_addr`
    pub src_sw: SwitchId,
    /// Switch serving `dst_addr`
    pub dst_sw: SwitchId,
}

/// Endpoints of a bearer, one entry per logical interface. An interface that
/// the bearer does not traverse (collapsed topologies) is left unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BearerEndpoints {
    ifaces: [Option<IfacePath>; 2],
}

impl BearerEndpoints {
    /// Endpoints traversing only the S1 interface
    pub fn s1_only(path: IfacePath) -> Self {
        let mut e = Self::default();
        e.ifaces[LteIface::S1.index()] = Some(path);
        e
    }

    /// Endpoints traversing both interfaces
    pub fn s1_s5(s1: IfacePath, s5: IfacePath) -> Self {
        let mut e = Self::default();
        e.ifaces[LteIface::S1.index()] = Some(s1);
        e.ifaces[LteIface::S5.index()] = Some(s5);
        e
    }

    /// The endpoints on one interface, if the bearer traverses it
    pub fn get(&self, iface: LteIface) -> Option<&IfacePath> {
        self.ifaces[iface.index()].as_ref()
    }

    /// Iterate over the interfaces the bearer traverses
    pub fn iter(&self) -> impl Iterator<Item = (LteIface, &IfacePath)> {
        LteIface::ALL
            .iter()
            .filter_map(move |i| self.ifaces[i.index()].as_ref().map(|p| (*i, p)))
    }
}

/// # Bearer Record
///
/// Per-tunnel routing metadata: identity, endpoints, QoS, install and
/// activation flags, flow-rule priority and idle timeout. There is exactly one
/// record per TEID, owned by the controller's [`BearerTable`].
///
/// The flag accessors enforce the record invariants: a default bearer is
/// always active, is never blocked, and the flow-rule priority of a record
/// only ever increases.
#[derive(Debug, Clone, PartialEq)]
pub struct BearerRecord {
    /// Tunnel endpoint identifier, the unique key of this record
    pub teid: Teid,
    /// The UE session this bearer belongs to
    pub imsi: Imsi,
    /// The logical slice this bearer belongs to
    pub slice: SliceId,
    /// EPS bearer id within the UE session (1 for the default bearer)
    pub bearer_id: u8,
    /// QoS parameters
    pub qos: QosInfo,
    /// Endpoints per logical interface
    pub endpoints: BearerEndpoints,
    is_default: bool,
    is_active: bool,
    installed: [bool; 2],
    gbr_reserved: [bool; 2],
    block_reason: BlockReason,
    priority: u16,
    timeout: u16,
}

impl BearerRecord {
    /// Create the default bearer record of a UE, active from the start, at
    /// priority [`PRIO_TUNNEL_DEFAULT`] with no idle timeout. The bearer id
    /// and class are taken as announced and validated on table insertion.
    pub fn new_default(
        teid: Teid,
        imsi: Imsi,
        slice: SliceId,
        bearer_id: u8,
        qos: QosInfo,
        endpoints: BearerEndpoints,
    ) -> Self {
        Self {
            teid,
            imsi,
            slice,
            bearer_id,
            qos,
            endpoints,
            is_default: true,
            is_active: true,
            installed: [false; 2],
            gbr_reserved: [false; 2],
            block_reason: BlockReason::empty(),
            priority: PRIO_TUNNEL_DEFAULT,
            timeout: 0,
        }
    }

    /// Create a dedicated bearer record. Dedicated bearers start inactive at
    /// priority [`PRIO_TUNNEL_DEDICATED`] and expire on idle.
    pub fn new_dedicated(
        teid: Teid,
        imsi: Imsi,
        slice: SliceId,
        bearer_id: u8,
        qos: QosInfo,
        endpoints: BearerEndpoints,
        timeout: u16,
    ) -> Self {
        debug_assert!(bearer_id != DEFAULT_BEARER_ID);
        debug_assert!(timeout > 0);
        Self {
            teid,
            imsi,
            slice,
            bearer_id,
            qos,
            endpoints,
            is_default: false,
            is_active: false,
            installed: [false; 2],
            gbr_reserved: [false; 2],
            block_reason: BlockReason::empty(),
            priority: PRIO_TUNNEL_DEDICATED,
            timeout,
        }
    }

    /// Returns true for the one default bearer of a UE
    pub fn is_default(&self) -> bool {
        self.is_default
    }

    /// Returns true if the bearer currently carries traffic
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Mark the bearer active or inactive. Deactivating a default bearer is an
    /// invariant violation, since it is active for the lifetime of its UE.
    pub fn set_active(&mut self, active: bool) {
        if self.is_default && !active {
            panic!("Cannot deactivate the default bearer {}", self.teid);
        }
        self.is_active = active;
    }

    /// Returns true if the rules for one interface are installed
    pub fn is_installed(&self, iface: LteIface) -> bool {
        self.installed[iface.index()]
    }

    /// Returns true if the rules for every traversed interface are installed
    pub fn is_fully_installed(&self) -> bool {
        self.endpoints.iter().all(|(i, _)| self.is_installed(i))
    }

    /// Mark the rules of one interface installed or removed
    pub(crate) fn set_installed(&mut self, iface: LteIface, installed: bool) {
        self.installed[iface.index()] = installed;
    }

    /// Returns true if guaranteed bandwidth is reserved on one interface
    pub fn is_gbr_reserved(&self, iface: LteIface) -> bool {
        self.gbr_reserved[iface.index()]
    }

    /// Mark the guaranteed bandwidth of one interface reserved or released
    pub(crate) fn set_gbr_reserved(&mut self, iface: LteIface, reserved: bool) {
        self.gbr_reserved[iface.index()] = reserved;
    }

    /// The reasons the last admission run rejected this bearer, if any
    pub fn block_reason(&self) -> BlockReason {
        self.block_reason
    }

    /// Record an admission rejection. Blocking a default bearer is an
    /// invariant violation.
    pub(crate) fn set_blocked(&mut self, reason: BlockReason) {
        if self.is_default {
            panic!("Admission blocked the default bearer {}", self.teid);
        }
        debug_assert!(!reason.is_empty());
        self.block_reason.insert(reason);
    }

    /// Clear the block diagnosis, on a successful admission run
    pub(crate) fn clear_blocked(&mut self) {
        self.block_reason.clear();
    }

    /// The current flow-rule priority of this bearer
    pub fn priority(&self) -> u16 {
        self.priority
    }

    /// The idle timeout of the flow rules, in seconds (0 = no expiry)
    pub fn timeout(&self) -> u16 {
        self.timeout
    }

    /// Bump the flow-rule priority before a reinstall. Strictly increasing:
    /// stale rules left on a switch at the old priority can never shadow the
    /// fresh ones. Panics when the priority would reach the local-delivery
    /// band, which is reserved for fixed rules.
    pub fn increase_priority(&mut self) -> u16 {
        let next = self
            .priority
            .checked_add(1)
            .unwrap_or_else(|| panic!("Priority overflow on {}", self.teid));
        if next >= PRIO_TUNNEL_LOCAL {
            panic!("Priority of {} reached the local-delivery band", self.teid);
        }
        self.priority = next;
        trace!("{}: priority raised to {}", self.teid, next);
        next
    }
}

/// # TEID Table
///
/// Owns every [`BearerRecord`] of the slice, keyed by TEID. Insertion of a
/// duplicate TEID fails loudly: it signals a controller bug, not a runtime
/// condition.
#[derive(Debug, Clone, Default)]
pub struct BearerTable {
    records: HashMap<Teid, BearerRecord>,
}

impl BearerTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self { records: HashMap::new() }
    }

    /// Insert a freshly created record. Fails with
    /// [`BearerError::DuplicateTeid`] if the TEID is already present, and with
    /// [`BearerError::InvalidDefaultBearer`] if a default record does not
    /// carry bearer id 1 and the reserved best-effort class.
    pub fn create(&mut self, record: BearerRecord) -> Result<(), BearerError> {
        if record.is_default
            && (record.bearer_id != DEFAULT_BEARER_ID || record.qos.qci != Qci::default_bearer())
        {
            return Err(BearerError::InvalidDefaultBearer(record.teid));
        }
        if self.records.contains_key(&record.teid) {
            return Err(BearerError::DuplicateTeid(record.teid));
        }
        debug!(
            "New {} record {} for {} (bearer id {})",
            if record.is_default { "default" } else { "dedicated" },
            record.teid,
            record.imsi,
            record.bearer_id
        );
        self.records.insert(record.teid, record);
        Ok(())
    }

    /// Look up a record, returning `None` if the TEID is unknown. Callers use
    /// this to distinguish first use from reuse of a dedicated bearer.
    pub fn lookup(&self, teid: Teid) -> Option<&BearerRecord> {
        self.records.get(&teid)
    }

    /// Look up a record mutably, returning `None` if the TEID is unknown
    pub fn lookup_mut(&mut self, teid: Teid) -> Option<&mut BearerRecord> {
        self.records.get_mut(&teid)
    }

    /// Get a record, failing with [`BearerError::UnknownTeid`] if absent
    pub fn get(&self, teid: Teid) -> Result<&BearerRecord, BearerError> {
        self.records.get(&teid).ok_or(BearerError::UnknownTeid(teid))
    }

    /// Get a record mutably, failing with [`BearerError::UnknownTeid`] if absent
    pub fn get_mut(&mut self, teid: Teid) -> Result<&mut BearerRecord, BearerError> {
        self.records.get_mut(&teid).ok_or(BearerError::UnknownTeid(teid))
    }

    /// Remove and return every record of one UE session. Used on session
    /// teardown only; an ordinary app stop keeps the record for reuse.
    pub fn remove_session(&mut self, imsi: Imsi) -> Vec<BearerRecord> {
        let teids: Vec<Teid> = self
            .records
            .values()
            .filter(|r| r.imsi == imsi)
            .map(|r| r.teid)
            .collect();
        teids
            .into_iter()
            .filter_map(|t| self.records.remove(&t))
            .collect()
    }

    /// Number of records in the table
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the table holds no record
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate over all records
    pub fn iter(&self) -> Values<'_, Teid, BearerRecord> {
        self.records.values()
    }
}
