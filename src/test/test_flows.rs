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

//! Tests of the flow rule installer and the in-memory switch backend.

use crate::bearer::{BearerEndpoints, BearerRecord, IfacePath, QosInfo};
use crate::connection::{ConnectionInfo, ConnectionRegistry};
use crate::flows::*;
use crate::types::{Imsi, LinkTier, LteIface, Qci, SliceId, Teid};
use maplit::hashmap;
use std::net::Ipv4Addr;

fn get_test_backhaul() -> (ConnectionRegistry, Vec<crate::types::SwitchId>) {
    // chain of three switches: s0 - s1 - s2
    let mut reg = ConnectionRegistry::new();
    let sw: Vec<_> = (0..3).map(|_| reg.add_switch()).collect();
    reg.register_link(ConnectionInfo::new(sw[0], 2, sw[1], 1, 10e6, LinkTier::Access)).unwrap();
    reg.register_link(ConnectionInfo::new(sw[1], 2, sw[2], 1, 10e6, LinkTier::Aggregation)).unwrap();
    reg.build_routes();
    (reg, sw)
}

fn get_installer() -> FlowRuleInstaller<SimSwitch> {
    FlowRuleInstaller::new(SimSwitch::new(), hashmap! {Qci::Gbr1 => 3, Qci::NonGbr9 => 0})
}

fn enb_addr() -> Ipv4Addr {
    "10.0.0.1".parse().unwrap()
}

fn sgw_addr() -> Ipv4Addr {
    "10.0.2.1".parse().unwrap()
}

fn default_record(sw: &[crate::types::SwitchId]) -> BearerRecord {
    let endpoints = BearerEndpoints::s1_only(IfacePath {
        src_addr: enb_addr(),
        dst_addr: sgw_addr(),
        src_sw: sw[0],
        dst_sw: sw[2],
    });
    BearerRecord::new_default(
        Teid(100),
        Imsi(1),
        SliceId(0),
        1,
        QosInfo::non_gbr(Qci::NonGbr9),
        endpoints,
    )
}

#[test]
fn test_priority_scheme() {
    // the bands that make shadowing impossible
    assert!(PRIO_TUNNEL_MISS < PRIO_TUNNEL_RING);
    assert!(PRIO_TUNNEL_RING < PRIO_TUNNEL_DEFAULT);
    assert!(PRIO_TUNNEL_DEFAULT < PRIO_TUNNEL_DEDICATED);
    assert!(PRIO_TUNNEL_DEDICATED < PRIO_TUNNEL_LOCAL);
    assert!(PRIO_INGRESS_MISS < PRIO_INGRESS_ARP);
    assert!(PRIO_INGRESS_ARP < PRIO_INGRESS_GTP);
}

#[test]
fn test_bootstrap_rules() {
    let (_, sw) = get_test_backhaul();
    let mut installer = get_installer();
    installer.bootstrap_switch(sw[0]);

    let rules = installer.backend().rules(sw[0]);
    assert_eq!(rules.len(), 4);
    // both table-miss entries punt to the controller
    for table in [TABLE_INGRESS, TABLE_TUNNEL].iter() {
        let miss = rules
            .iter()
            .find(|r| r.table == *table && r.matching == FlowMatch::Any)
            .unwrap();
        assert_eq!(miss.priority, 0);
        assert_eq!(miss.actions, vec![FlowAction::ToController]);
    }
    // tunneled traffic continues in the tunnel table
    let gtp = rules.iter().find(|r| r.matching == FlowMatch::Gtp).unwrap();
    assert_eq!(gtp.table, TABLE_INGRESS);
    assert_eq!(gtp.actions, vec![FlowAction::GotoTable(TABLE_TUNNEL)]);
    // every fixed rule is permanent and unattributed
    assert!(rules.iter().all(|r| r.idle_timeout == 0 && r.cookie == 0));
}

#[test]
fn test_local_delivery_rule() {
    let (_, sw) = get_test_backhaul();
    let mut installer = get_installer();
    installer.install_local_delivery(sw[0], enb_addr(), 1);

    let rules = installer.backend().rules(sw[0]);
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].table, TABLE_TUNNEL);
    assert_eq!(rules[0].priority, PRIO_TUNNEL_LOCAL);
    assert_eq!(rules[0].matching, FlowMatch::Local(enb_addr()));
    assert_eq!(rules[0].actions, vec![FlowAction::Output(1)]);
}

#[test]
fn test_install_tunnel_rules() {
    let (reg, sw) = get_test_backhaul();
    let mut installer = get_installer();
    let mut record = default_record(&sw);

    installer.install(&mut record, &reg).unwrap();
    assert!(record.is_installed(LteIface::S1));
    assert!(record.is_fully_installed());

    // 2 hops, one rule per direction per hop endpoint
    let installed = installer.backend().rules_with_cookie(100);
    assert_eq!(installed.len(), 4);
    for (_, rule) in installed.iter() {
        assert_eq!(rule.table, TABLE_TUNNEL);
        assert_eq!(rule.priority, PRIO_TUNNEL_DEFAULT);
        assert_eq!(rule.idle_timeout, 0);
    }

    // uplink on s0 towards the core endpoint, out the link port
    let up = installer
        .backend()
        .rules(sw[0])
        .iter()
        .find(|r| r.matching == FlowMatch::Tunnel { teid: Teid(100), dst: sgw_addr() })
        .cloned()
        .unwrap();
    assert_eq!(up.actions, vec![FlowAction::SetQueue(0), FlowAction::Output(2)]);

    // downlink on s2 towards the radio endpoint
    let down = installer
        .backend()
        .rules(sw[2])
        .iter()
        .find(|r| r.matching == FlowMatch::Tunnel { teid: Teid(100), dst: enb_addr() })
        .cloned()
        .unwrap();
    assert_eq!(down.actions, vec![FlowAction::SetQueue(0), FlowAction::Output(1)]);

    // the middle switch carries both directions
    assert_eq!(installer.backend().rules(sw[1]).len(), 2);
}

#[test]
fn test_gbr_rules_use_class_queue() {
    let (reg, sw) = get_test_backhaul();
    let mut installer = get_installer();
    let endpoints = BearerEndpoints::s1_only(IfacePath {
        src_addr: enb_addr(),
        dst_addr: sgw_addr(),
        src_sw: sw[0],
        dst_sw: sw[2],
    });
    let mut record = BearerRecord::new_dedicated(
        Teid(200),
        Imsi(1),
        SliceId(0),
        2,
        QosInfo::gbr(Qci::Gbr1, 1e6, 1e6),
        endpoints,
        15,
    );

    installer.install(&mut record, &reg).unwrap();
    for (_, rule) in installer.backend().rules_with_cookie(200) {
        assert_eq!(rule.priority, PRIO_TUNNEL_DEDICATED);
        assert_eq!(rule.idle_timeout, 15);
        assert_eq!(rule.actions[0], FlowAction::SetQueue(3));
    }
}

#[test]
fn test_remove_by_cookie() {
    let (reg, sw) = get_test_backhaul();
    let mut installer = get_installer();
    installer.install_local_delivery(sw[0], enb_addr(), 1);
    let mut record = default_record(&sw);
    installer.install(&mut record, &reg).unwrap();

    installer.remove(&mut record, &reg).unwrap();
    assert!(!record.is_installed(LteIface::S1));
    assert!(installer.backend().rules_with_cookie(100).is_empty());
    // the cookie-0 local-delivery rule is untouched
    assert_eq!(installer.backend().rules(sw[0]).len(), 1);
}

#[test]
fn test_reinstall_raises_priority() {
    let (reg, sw) = get_test_backhaul();
    let mut installer = get_installer();
    let mut record = default_record(&sw);
    installer.install(&mut record, &reg).unwrap();

    installer.reinstall(&mut record, &reg).unwrap();
    assert_eq!(record.priority(), PRIO_TUNNEL_DEFAULT + 1);
    // the fresh rules sit above the originals they replace
    let installed = installer.backend().rules_with_cookie(100);
    assert_eq!(installed.len(), 8);
    assert_eq!(
        installed.iter().filter(|(_, r)| r.priority == PRIO_TUNNEL_DEFAULT + 1).count(),
        4
    );
}

#[test]
fn test_expire_rule_reports_removed_event() {
    let (reg, sw) = get_test_backhaul();
    let mut installer = get_installer();
    let mut record = default_record(&sw);
    installer.install(&mut record, &reg).unwrap();

    let event = installer
        .backend_mut()
        .expire_rule(sw[1], TABLE_TUNNEL, 100)
        .unwrap();
    assert_eq!(event.switch, sw[1]);
    assert_eq!(event.table, TABLE_TUNNEL);
    assert_eq!(event.cookie, 100);
    assert_eq!(event.priority, PRIO_TUNNEL_DEFAULT);
    assert_eq!(installer.backend().rules(sw[1]).len(), 1);

    // expiring an absent rule reports nothing
    assert!(installer.backend_mut().expire_rule(sw[1], TABLE_INGRESS, 100).is_none());
}

#[test]
fn test_transit_fallback_rule() {
    let (_, sw) = get_test_backhaul();
    let mut installer = get_installer();
    installer.install_transit_fallback(sw[1], 2);

    let rules = installer.backend().rules(sw[1]);
    assert_eq!(rules[0].priority, PRIO_TUNNEL_RING);
    assert_eq!(rules[0].matching, FlowMatch::Gtp);
    assert_eq!(rules[0].actions, vec![FlowAction::Output(2)]);
}
