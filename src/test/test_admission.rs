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

//! Tests of the admission engine: review, reservation and release.

use crate::admission::{AdmissionDecision, AdmissionEngine, BearerPaths};
use crate::bearer::{BearerEndpoints, BearerRecord, IfacePath, QosInfo};
use crate::connection::{ConnectionInfo, ConnectionRegistry};
use crate::types::{BlockReason, Imsi, LinkTier, LteIface, Qci, SliceId, SwitchId, Teid};
use assert_approx_eq::assert_approx_eq;

/// Two switches, one 10 Mbps access link between them
fn get_test_backhaul() -> (ConnectionRegistry, SwitchId, SwitchId) {
    let mut reg = ConnectionRegistry::new();
    let s0 = reg.add_switch();
    let s1 = reg.add_switch();
    reg.register_link(ConnectionInfo::new(s0, 1, s1, 1, 10e6, LinkTier::Access)).unwrap();
    reg.build_routes();
    (reg, s0, s1)
}

fn gbr_record(teid: u32, dl: f64, ul: f64, s0: SwitchId, s1: SwitchId) -> BearerRecord {
    let endpoints = BearerEndpoints::s1_only(IfacePath {
        src_addr: "10.0.0.1".parse().unwrap(),
        dst_addr: "10.0.1.1".parse().unwrap(),
        src_sw: s0,
        dst_sw: s1,
    });
    BearerRecord::new_dedicated(
        Teid(teid),
        Imsi(1),
        SliceId(0),
        2,
        QosInfo::gbr(Qci::Gbr1, dl, ul),
        endpoints,
        15,
    )
}

fn paths_of(record: &BearerRecord, reg: &ConnectionRegistry) -> BearerPaths {
    record
        .endpoints
        .iter()
        .map(|(iface, p)| (iface, reg.resolve_path(p.src_sw, p.dst_sw).unwrap()))
        .collect()
}

#[test]
fn test_gbr_within_capacity_is_accepted() {
    let (reg, s0, s1) = get_test_backhaul();
    let mut engine = AdmissionEngine::new(8192, 1e9, 0.95);
    let mut record = gbr_record(200, 4e6, 1e6, s0, s1);
    let paths = paths_of(&record, &reg);

    let decision = engine.review(&mut record, &paths, &reg);
    assert_eq!(decision, AdmissionDecision::Accepted);
    assert!(record.block_reason().is_empty());
    // review never activates or installs
    assert!(!record.is_active());
    assert!(!record.is_installed(LteIface::S1));
    assert_eq!(engine.stats().requests(), 1);
    assert_eq!(engine.stats().accepted(), 1);
}

#[test]
fn test_gbr_over_capacity_sets_tier_bit() {
    let (reg, s0, s1) = get_test_backhaul();
    let mut engine = AdmissionEngine::new(8192, 1e9, 0.95);
    let mut record = gbr_record(200, 20e6, 1e6, s0, s1);
    let paths = paths_of(&record, &reg);

    let decision = engine.review(&mut record, &paths, &reg);
    assert_eq!(decision, AdmissionDecision::Blocked(BlockReason::BAND_ACCESS));
    assert!(record.block_reason().contains(BlockReason::BAND_ACCESS));
    assert!(!record.is_active());
    assert_eq!(engine.stats().blocked(), 1);
}

#[test]
fn test_reservation_consumes_link_bandwidth() {
    let (mut reg, s0, s1) = get_test_backhaul();
    let mut engine = AdmissionEngine::new(8192, 1e9, 0.95);

    let mut first = gbr_record(200, 6e6, 2e6, s0, s1);
    let paths = paths_of(&first, &reg);
    assert!(engine.review(&mut first, &paths, &reg).is_accepted());
    engine.reserve(&mut first, &paths, &mut reg);
    assert!(first.is_gbr_reserved(LteIface::S1));
    assert_approx_eq!(reg.get_link(s0, s1).unwrap().reserved_dl, 6e6);

    // a second bearer no longer fits in downlink
    let mut second = gbr_record(201, 6e6, 2e6, s0, s1);
    assert_eq!(
        engine.review(&mut second, &paths, &reg),
        AdmissionDecision::Blocked(BlockReason::BAND_ACCESS)
    );

    // releasing the first makes room again
    engine.release(&mut first, &paths, &mut reg);
    assert!(!first.is_gbr_reserved(LteIface::S1));
    assert_approx_eq!(reg.get_link(s0, s1).unwrap().reserved_dl, 0.0);
    assert!(engine.review(&mut second, &paths, &reg).is_accepted());
}

#[test]
fn test_flow_table_full() {
    let (mut reg, s0, s1) = get_test_backhaul();
    let mut engine = AdmissionEngine::new(8192, 1e9, 1.0);
    engine.set_switch_capacity(s1, 2, 1e9);

    let mut first = gbr_record(200, 1e6, 1e6, s0, s1);
    let paths = paths_of(&first, &reg);
    assert!(engine.review(&mut first, &paths, &reg).is_accepted());
    engine.reserve(&mut first, &paths, &mut reg);
    assert_eq!(engine.usage(s1).entries, 2);

    let mut second = gbr_record(201, 1e6, 1e6, s0, s1);
    assert_eq!(
        engine.review(&mut second, &paths, &reg),
        AdmissionDecision::Blocked(BlockReason::TABLE_FULL)
    );
}

#[test]
fn test_pipeline_overload() {
    let (reg, s0, s1) = get_test_backhaul();
    let mut engine = AdmissionEngine::new(8192, 1e9, 0.95);
    engine.set_switch_capacity(s0, 8192, 3e6);

    // mbr_dl + mbr_ul = 4 Mbps against a 3 Mbps pipeline budget
    let mut record = gbr_record(200, 3e6, 1e6, s0, s1);
    let paths = paths_of(&record, &reg);
    assert_eq!(
        engine.review(&mut record, &paths, &reg),
        AdmissionDecision::Blocked(BlockReason::CPU_OVERLOAD)
    );
}

#[test]
fn test_multiple_reasons_accumulate() {
    let (mut reg, s0, s1) = get_test_backhaul();
    let mut engine = AdmissionEngine::new(8192, 1e9, 1.0);
    engine.set_switch_capacity(s0, 0, 1e9);
    reg.get_link_mut(s0, s1).unwrap().reserve(9e6, 9e6);

    let mut record = gbr_record(200, 2e6, 1e6, s0, s1);
    let paths = paths_of(&record, &reg);
    let expected = BlockReason::TABLE_FULL | BlockReason::BAND_ACCESS;
    assert_eq!(engine.review(&mut record, &paths, &reg), AdmissionDecision::Blocked(expected));
    assert_eq!(record.block_reason(), expected);

    // both reason counters are incremented for the one request
    let snapshot = engine.dump_stats();
    assert_eq!(snapshot.requests, 1);
    assert_eq!(snapshot.blocked, 1);
    assert_eq!(snapshot.blocked_by_reason[0], 1); // table-full
    assert_eq!(snapshot.blocked_by_reason[2], 1); // band-access
}

#[test]
fn test_default_accounting() {
    let mut engine = AdmissionEngine::new(8192, 1e9, 0.95);
    engine.account_default();
    assert_eq!(engine.stats().requests(), 1);
    assert_eq!(engine.stats().accepted(), 1);
    assert_eq!(engine.stats().blocked(), 0);
}

#[test]
fn test_stats_reset_on_dump() {
    let (reg, s0, s1) = get_test_backhaul();
    let mut engine = AdmissionEngine::new(8192, 1e9, 0.95);
    let mut record = gbr_record(200, 1e6, 1e6, s0, s1);
    let paths = paths_of(&record, &reg);
    engine.review(&mut record, &paths, &reg);

    let snapshot = engine.dump_stats();
    assert_eq!(snapshot.requests, 1);
    let empty = engine.dump_stats();
    assert_eq!(empty.requests, 0);
}

#[test]
fn test_non_gbr_skips_bandwidth_check() {
    let (mut reg, s0, s1) = get_test_backhaul();
    let mut engine = AdmissionEngine::new(8192, 1e9, 0.95);
    // saturate the link
    reg.get_link_mut(s0, s1).unwrap().reserve(10e6, 10e6);

    let endpoints = BearerEndpoints::s1_only(IfacePath {
        src_addr: "10.0.0.1".parse().unwrap(),
        dst_addr: "10.0.1.1".parse().unwrap(),
        src_sw: s0,
        dst_sw: s1,
    });
    let mut record = BearerRecord::new_dedicated(
        Teid(210),
        Imsi(1),
        SliceId(0),
        3,
        QosInfo::non_gbr(Qci::NonGbr8),
        endpoints,
        15,
    );
    let paths = paths_of(&record, &reg);
    assert!(engine.review(&mut record, &paths, &reg).is_accepted());
}
