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

//! Module defining the abstract switch flow-table boundary and the
//! translation of bearer records into forwarding rules.

use crate::bearer::BearerRecord;
use crate::connection::ConnectionRegistry;
use crate::types::{MacAddr, Qci, SwitchId, Teid, TopologyError};
use itertools::Itertools;
use log::*;
use std::collections::HashMap;
use std::net::Ipv4Addr;

/// Ingress classification table
pub const TABLE_INGRESS: u8 = 0;
/// Tunnel forwarding table
pub const TABLE_TUNNEL: u8 = 1;

/// Ingress table: table-miss, punt to the controller
pub const PRIO_INGRESS_MISS: u16 = 0;
/// Ingress table: ARP frames, punt to the controller
pub const PRIO_INGRESS_ARP: u16 = 16;
/// Ingress table: tunneled traffic, go to the tunnel table
pub const PRIO_INGRESS_GTP: u16 = 32;

/// Tunnel table: table-miss, punt to the controller
pub const PRIO_TUNNEL_MISS: u16 = 0;
/// Tunnel table: generic transit fallback rules
pub const PRIO_TUNNEL_RING: u16 = 32;
/// Tunnel table: the one default-bearer rule per UE
pub const PRIO_TUNNEL_DEFAULT: u16 = 128;
/// Tunnel table: starting priority of freshly installed dedicated rules
pub const PRIO_TUNNEL_DEDICATED: u16 = 2048;
/// Tunnel table: local-delivery rules, fixed and never removed
pub const PRIO_TUNNEL_LOCAL: u16 = 64000;

/// Match half of a flow rule. The concrete wire encoding is out of scope; the
/// rule model only distinguishes the matches the controller uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowMatch {
    /// Matches every packet (table-miss)
    Any,
    /// Matches ARP frames
    Arp,
    /// Matches tunneled (GTP-encapsulated) traffic
    Gtp,
    /// Matches one tunnel, direction-qualified by the remote tunnel endpoint
    Tunnel {
        /// The tunnel id
        teid: Teid,
        /// The tunnel endpoint the packet is headed to
        dst: Ipv4Addr,
    },
    /// Matches tunneled traffic for a locally attached endpoint
    Local(Ipv4Addr),
}

/// Action half of a flow rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowAction {
    /// Punt the packet to the controller
    ToController,
    /// Continue matching in another table
    GotoTable(u8),
    /// Output on a port
    Output(u32),
    /// Enqueue in a priority queue before output
    SetQueue(u8),
}

/// A single match-action entry of a switch flow table
#[derive(Debug, Clone, PartialEq)]
pub struct FlowRule {
    /// Table the rule lives in
    pub table: u8,
    /// Rule priority within the table
    pub priority: u16,
    /// Match half
    pub matching: FlowMatch,
    /// Action list, applied in order
    pub actions: Vec<FlowAction>,
    /// Idle expiry in seconds, 0 for permanent rules
    pub idle_timeout: u16,
    /// Opaque tag, set to the TEID so flow-removed events can be attributed
    /// without a table scan
    pub cookie: u64,
}

/// A packet synthesized by the controller and sent out a switch port
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketOut {
    /// An ARP reply answering a punted request
    ArpReply {
        /// The address that was asked for
        target_ip: Ipv4Addr,
        /// The resolved hardware address
        target_mac: MacAddr,
    },
}

/// A packet punted to the controller by a switch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketIn {
    /// An ARP request for `target_ip`, punted by the ingress table
    ArpRequest {
        /// Switch that punted the request
        switch: SwitchId,
        /// Port the request came in on, used for the direct reply
        ingress_port: u32,
        /// The address being resolved
        target_ip: Ipv4Addr,
    },
    /// A tunneled packet that missed the tunnel table
    TunnelMiss {
        /// Switch that reported the miss
        switch: SwitchId,
        /// The tunnel id carried by the packet
        teid: Teid,
    },
    /// Any other punted packet; logged and dropped
    Other {
        /// Switch that punted the packet
        switch: SwitchId,
        /// Table the packet was punted from
        table: u8,
    },
}

/// A flow-removed event reported by a switch after an idle expiry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowRemoved {
    /// Switch the rule was removed from
    pub switch: SwitchId,
    /// Table the rule lived in
    pub table: u8,
    /// The rule cookie (the TEID for tunnel rules)
    pub cookie: u64,
    /// The priority the removed rule was installed at
    pub priority: u16,
}

/// The abstract switch boundary: the controller only needs the capability to
/// install and remove rules and to send synthesized packets. The wire encoding
/// of the corresponding OpenFlow messages belongs to the transport layer.
pub trait SwitchBackend {
    /// Write one flow rule onto a switch
    fn install_rule(&mut self, switch: SwitchId, rule: FlowRule);
    /// Delete every rule in `table` of `switch` carrying `cookie`
    fn remove_rules(&mut self, switch: SwitchId, table: u8, cookie: u64);
    /// Send a controller-synthesized packet out a port
    fn send_packet(&mut self, switch: SwitchId, port: u32, packet: PacketOut);
}

/// In-memory switch backend. Keeps the flow tables of every switch and a log
/// of all operations, so that tests and the simulation harness can inspect
/// what the controller installed.
#[derive(Debug, Clone, Default)]
pub struct SimSwitch {
    tables: HashMap<SwitchId, Vec<FlowRule>>,
    install_log: Vec<(SwitchId, FlowRule)>,
    sent_packets: Vec<(SwitchId, u32, PacketOut)>,
}

impl SimSwitch {
    /// Create a backend with empty flow tables
    pub fn new() -> Self {
        Self::default()
    }

    /// The current flow table of a switch
    pub fn rules(&self, switch: SwitchId) -> &[FlowRule] {
        self.tables.get(&switch).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All rules carrying a cookie, across all switches
    pub fn rules_with_cookie(&self, cookie: u64) -> Vec<(SwitchId, &FlowRule)> {
        let mut out = Vec::new();
        for (sw, rules) in self.tables.iter() {
            for r in rules.iter().filter(|r| r.cookie == cookie) {
                out.push((*sw, r));
            }
        }
        out
    }

    /// Every install operation issued so far, in order
    pub fn install_log(&self) -> &[(SwitchId, FlowRule)] {
        &self.install_log
    }

    /// Every packet sent out so far, in order
    pub fn sent_packets(&self) -> &[(SwitchId, u32, PacketOut)] {
        &self.sent_packets
    }

    /// Drop one rule from a table, as an idle expiry would, and return the
    /// flow-removed event a switch would report for it.
    pub fn expire_rule(&mut self, switch: SwitchId, table: u8, cookie: u64) -> Option<FlowRemoved> {
        let rules = self.tables.get_mut(&switch)?;
        let pos = rules
            .iter()
            .position(|r| r.table == table && r.cookie == cookie)?;
        let rule = rules.remove(pos);
        Some(FlowRemoved { switch, table, cookie, priority: rule.priority })
    }
}

impl SwitchBackend for SimSwitch {
    fn install_rule(&mut self, switch: SwitchId, rule: FlowRule) {
        self.install_log.push((switch, rule.clone()));
        self.tables.entry(switch).or_default().push(rule);
    }

    fn remove_rules(&mut self, switch: SwitchId, table: u8, cookie: u64) {
        if let Some(rules) = self.tables.get_mut(&switch) {
            rules.retain(|r| !(r.table == table && r.cookie == cookie));
        }
    }

    fn send_packet(&mut self, switch: SwitchId, port: u32, packet: PacketOut) {
        self.sent_packets.push((switch, port, packet));
    }
}

/// # Flow Rule Installer
///
/// Translates an accepted bearer record into the forwarding rules that must
/// exist on the switches along its path, and removes or re-installs them as
/// the bearer deactivates or is repaired. Owns the switch backend.
#[derive(Debug)]
pub struct FlowRuleInstaller<B> {
    backend: B,
    /// Priority queue per QoS class, applied as a SetQueue action
    queues: HashMap<Qci, u8>,
}

impl<B: SwitchBackend> FlowRuleInstaller<B> {
    /// Create an installer over a backend with a QCI to queue mapping
    pub fn new(backend: B, queues: HashMap<Qci, u8>) -> Self {
        Self { backend, queues }
    }

    /// Read access to the backend, for inspection
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Mutable access to the backend, for the simulation harness
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    fn queue_of(&self, qci: Qci) -> u8 {
        self.queues.get(&qci).copied().unwrap_or(0)
    }

    /// Install the fixed classification rules of a freshly discovered switch:
    /// table-miss and ARP punt to the controller, tunneled traffic to the
    /// tunnel table, and the tunnel-table miss back to the controller.
    pub fn bootstrap_switch(&mut self, switch: SwitchId) {
        self.backend.install_rule(
            switch,
            FlowRule {
                table: TABLE_INGRESS,
                priority: PRIO_INGRESS_MISS,
                matching: FlowMatch::Any,
                actions: vec![FlowAction::ToController],
                idle_timeout: 0,
                cookie: 0,
            },
        );
        self.backend.install_rule(
            switch,
            FlowRule {
                table: TABLE_INGRESS,
                priority: PRIO_INGRESS_ARP,
                matching: FlowMatch::Arp,
                actions: vec![FlowAction::ToController],
                idle_timeout: 0,
                cookie: 0,
            },
        );
        self.backend.install_rule(
            switch,
            FlowRule {
                table: TABLE_INGRESS,
                priority: PRIO_INGRESS_GTP,
                matching: FlowMatch::Gtp,
                actions: vec![FlowAction::GotoTable(TABLE_TUNNEL)],
                idle_timeout: 0,
                cookie: 0,
            },
        );
        self.backend.install_rule(
            switch,
            FlowRule {
                table: TABLE_TUNNEL,
                priority: PRIO_TUNNEL_MISS,
                matching: FlowMatch::Any,
                actions: vec![FlowAction::ToController],
                idle_timeout: 0,
                cookie: 0,
            },
        );
    }

    /// Install the fixed local-delivery rule of an attached endpoint. These
    /// rules sit at the highest tunnel-table priority and are never removed.
    pub fn install_local_delivery(&mut self, switch: SwitchId, addr: Ipv4Addr, port: u32) {
        self.backend.install_rule(
            switch,
            FlowRule {
                table: TABLE_TUNNEL,
                priority: PRIO_TUNNEL_LOCAL,
                matching: FlowMatch::Local(addr),
                actions: vec![FlowAction::Output(port)],
                idle_timeout: 0,
                cookie: 0,
            },
        );
    }

    /// Install a generic transit fallback rule, forwarding unmatched tunnel
    /// traffic out a fixed port. Installed by topology setup code on ring-like
    /// backhauls; the per-bearer rules below always take precedence.
    pub fn install_transit_fallback(&mut self, switch: SwitchId, out_port: u32) {
        self.backend.install_rule(
            switch,
            FlowRule {
                table: TABLE_TUNNEL,
                priority: PRIO_TUNNEL_RING,
                matching: FlowMatch::Gtp,
                actions: vec![FlowAction::Output(out_port)],
                idle_timeout: 0,
                cookie: 0,
            },
        );
    }

    /// Install the per-hop tunnel rules of a bearer on every switch along its
    /// resolved paths, one rule per direction, with the record's current
    /// priority and idle timeout and cookie = TEID. Marks the interfaces
    /// installed on success.
    pub fn install(
        &mut self,
        record: &mut BearerRecord,
        registry: &ConnectionRegistry,
    ) -> Result<(), TopologyError> {
        let queue = self.queue_of(record.qos.qci);
        let endpoints = record.endpoints;
        for (iface, ifpath) in endpoints.iter() {
            let path = registry.resolve_path(ifpath.src_sw, ifpath.dst_sw)?;
            debug!(
                "Install {} on {}: {} hops at priority {}",
                record.teid,
                iface,
                path.len(),
                record.priority()
            );
            for (a, b) in path.iter().copied().tuple_windows() {
                // uplink direction: towards the core-facing endpoint
                let up = registry.port_towards(a, b)?;
                self.install_tunnel_rule(a, record, ifpath.dst_addr, up, queue);
                // downlink direction: towards the radio-facing endpoint
                let down = registry.port_towards(b, a)?;
                self.install_tunnel_rule(b, record, ifpath.src_addr, down, queue);
            }
            record.set_installed(iface, true);
        }
        Ok(())
    }

    fn install_tunnel_rule(
        &mut self,
        switch: SwitchId,
        record: &BearerRecord,
        dst: Ipv4Addr,
        out_port: u32,
        queue: u8,
    ) {
        self.backend.install_rule(
            switch,
            FlowRule {
                table: TABLE_TUNNEL,
                priority: record.priority(),
                matching: FlowMatch::Tunnel { teid: record.teid, dst },
                actions: vec![FlowAction::SetQueue(queue), FlowAction::Output(out_port)],
                idle_timeout: record.timeout(),
                cookie: record.teid.0 as u64,
            },
        );
    }

    /// Remove every tunnel rule of a bearer, by cookie, from every switch
    /// along its paths. Marks the interfaces not installed.
    pub fn remove(
        &mut self,
        record: &mut BearerRecord,
        registry: &ConnectionRegistry,
    ) -> Result<(), TopologyError> {
        let endpoints = record.endpoints;
        for (iface, ifpath) in endpoints.iter() {
            let path = registry.resolve_path(ifpath.src_sw, ifpath.dst_sw)?;
            debug!("Remove {} on {} ({} hops)", record.teid, iface, path.len());
            for sw in path {
                self.backend.remove_rules(sw, TABLE_TUNNEL, record.teid.0 as u64);
            }
            record.set_installed(iface, false);
        }
        Ok(())
    }

    /// Re-install the rules of a live bearer after an unexpected expiry. The
    /// priority is raised first, so a stale rule still present at the old
    /// priority can never shadow the fresh ones.
    pub fn reinstall(
        &mut self,
        record: &mut BearerRecord,
        registry: &ConnectionRegistry,
    ) -> Result<(), TopologyError> {
        record.increase_priority();
        info!("Repairing {} at priority {}", record.teid, record.priority());
        self.install(record, registry)
    }

    /// Send a controller-synthesized packet out a switch port
    pub fn send_packet(&mut self, switch: SwitchId, port: u32, packet: PacketOut) {
        self.backend.send_packet(switch, port, packet);
    }
}
