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

//! # Top-level Bearer Controller module
//!
//! This module holds the slice policy and the controller orchestrating the
//! admission engine, the rule installer and the metadata tables. All events
//! are delivered as method calls from one single-threaded event queue; none of
//! the owned tables needs internal locking.

use crate::admission::{AdmissionEngine, BearerPaths};
use crate::bearer::{BearerEndpoints, BearerRecord, BearerTable, QosInfo};
use crate::connection::{ConnectionInfo, ConnectionRegistry};
use crate::event::{Notification, Observer, Timer, TimerQueue, TimerToken};
use crate::flows::{
    FlowRemoved, FlowRuleInstaller, PacketIn, PacketOut, SimSwitch, SwitchBackend, TABLE_TUNNEL,
};
use crate::topology::TopologyIndex;
use crate::types::{ControllerError, Imsi, MacAddr, Qci, SliceId, SwitchId, Teid, TopologyError};

use log::*;
use maplit::hashmap;
use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;

/// Slice-wide configuration of the controller. Replaces the per-slice
/// controller subclassing of classical designs with one explicit struct.
#[derive(Debug, Clone)]
pub struct SlicePolicy {
    /// The slice this controller is responsible for
    pub slice: SliceId,
    /// Default flow-table capacity of a switch, in entries
    pub table_cap: usize,
    /// Default pipeline budget of a switch, in bits per second
    pub max_load: f64,
    /// Fraction of the flow table usable before blocking new bearers
    pub block_threshold: f64,
    /// Idle timeout of dedicated-bearer rules, in seconds
    pub dedicated_timeout: u16,
    /// Number of backhaul links; routing tables are built once all are known
    pub expected_links: usize,
    /// Period of the admission statistics dump, in milliseconds
    pub stats_interval_ms: u64,
    /// Priority queue per QoS class
    pub queues: HashMap<Qci, u8>,
}

impl Default for SlicePolicy {
    fn default() -> Self {
        Self {
            slice: SliceId(0),
            table_cap: 8192,
            max_load: 1e9,
            block_threshold: 0.95,
            dedicated_timeout: 15,
            expected_links: 0,
            stats_interval_ms: 5_000,
            queues: hashmap! {
                Qci::Gbr1 => 3,
                Qci::Gbr2 => 3,
                Qci::Gbr3 => 2,
                Qci::Gbr4 => 2,
                Qci::NonGbr5 => 1,
                Qci::NonGbr6 => 1,
                Qci::NonGbr7 => 1,
                Qci::NonGbr8 => 0,
                Qci::NonGbr9 => 0,
            },
        }
    }
}

/// One bearer of a session-creation request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BearerContext {
    /// Tunnel id assigned to this bearer
    pub teid: Teid,
    /// EPS bearer id within the session
    pub bearer_id: u8,
    /// QoS parameters
    pub qos: QosInfo,
}

/// The bearer consumer side of an application: the tunnel its traffic-flow
/// template resolves to, and the QoS it requires.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Application {
    /// Tunnel id resolved from the application's traffic-flow template
    pub teid: Teid,
    /// The UE running the application
    pub imsi: Imsi,
    /// EPS bearer id of the tunnel
    pub bearer_id: u8,
    /// QoS the application requires
    pub qos: QosInfo,
    /// Endpoints of the tunnel
    pub endpoints: BearerEndpoints,
}

/// # Bearer Controller
///
/// The centralized control plane of the slice: owns the topology index, the
/// link registry, the TEID table and the admission ledger, and drives the
/// bearer state machine as sessions are created, applications start and stop,
/// and switches report rule expiries.
///
/// All handlers run to completion synchronously; any wait is a scheduled
/// timer, never a blocking call. Statistics collaborators subscribe at
/// construction and receive typed [`Notification`] events.
pub struct BearerController<B: SwitchBackend = SimSwitch> {
    policy: SlicePolicy,
    topology: TopologyIndex,
    connections: ConnectionRegistry,
    bearers: BearerTable,
    admission: AdmissionEngine,
    installer: FlowRuleInstaller<B>,
    timers: TimerQueue,
    observers: Vec<Observer>,
    stats_timer: Option<TimerToken>,
}

impl<B: SwitchBackend + fmt::Debug> fmt::Debug for BearerController<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerController")
            .field("policy", &self.policy)
            .field("topology", &self.topology)
            .field("connections", &self.connections)
            .field("bearers", &self.bearers)
            .field("admission", &self.admission)
            .field("installer", &self.installer)
            .field("timers", &self.timers)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl<B: SwitchBackend> BearerController<B> {
    /// Create a controller over a switch backend, governed by a slice policy.
    /// The periodic statistics dump is scheduled immediately.
    pub fn new(policy: SlicePolicy, backend: B) -> Self {
        let admission =
            AdmissionEngine::new(policy.table_cap, policy.max_load, policy.block_threshold);
        let installer = FlowRuleInstaller::new(backend, policy.queues.clone());
        let mut timers = TimerQueue::new();
        let stats_timer = Some(timers.schedule_after(policy.stats_interval_ms, Timer::StatsDump));
        Self {
            policy,
            topology: TopologyIndex::new(),
            connections: ConnectionRegistry::new(),
            bearers: BearerTable::new(),
            admission,
            installer,
            timers,
            observers: Vec::new(),
            stats_timer,
        }
    }

    /// Register a statistics/trace collaborator. Must happen before events
    /// are delivered.
    pub fn subscribe(&mut self, observer: Observer) {
        self.observers.push(observer);
    }

    /// Add a newly discovered switch: allocates its index and installs the
    /// fixed classification rules on it.
    pub fn add_switch(&mut self) -> SwitchId {
        let switch = self.connections.add_switch();
        self.installer.bootstrap_switch(switch);
        switch
    }

    /// Handle an endpoint attachment: populates the topology index and
    /// installs the fixed local-delivery rule for the endpoint.
    pub fn on_topology_attach(
        &mut self,
        addr: Ipv4Addr,
        mac: MacAddr,
        switch: SwitchId,
        port: u32,
    ) -> Result<(), ControllerError> {
        self.topology.register_attachment(addr, mac, switch, port)?;
        self.installer.install_local_delivery(switch, addr, port);
        Ok(())
    }

    /// Handle a discovered inter-switch link. Once all expected links are
    /// known, the backhaul routing tables are computed.
    pub fn on_link_discovered(&mut self, info: ConnectionInfo) -> Result<(), ControllerError> {
        self.connections.register_link(info)?;
        if self.policy.expected_links > 0 && self.connections.num_links() == self.policy.expected_links
        {
            self.connections.build_routes();
        }
        Ok(())
    }

    /// Handle a session/context-creation event: creates and installs the
    /// default bearer (the first context of the list), which is accepted by
    /// invariant, and creates inactive records for the remaining contexts.
    /// Returns the TEID of the default bearer.
    pub fn on_session_created(
        &mut self,
        imsi: Imsi,
        endpoints: BearerEndpoints,
        contexts: &[BearerContext],
    ) -> Result<Teid, ControllerError> {
        let default_ctx = contexts
            .first()
            .unwrap_or_else(|| panic!("Session of {} carries no bearer context", imsi));
        let teid = default_ctx.teid;
        info!("Session created for {}, default bearer {}", imsi, teid);

        self.bearers.create(BearerRecord::new_default(
            teid,
            imsi,
            self.policy.slice,
            default_ctx.bearer_id,
            default_ctx.qos,
            endpoints,
        ))?;
        let paths = self.resolve_paths(&endpoints)?;

        // the default bearer skips the resource review by invariant, but the
        // accounting must still run so the counters stay consistent
        self.admission.account_default();
        let record = self.bearers.get_mut(teid)?;
        self.admission.reserve(record, &paths, &mut self.connections);
        self.installer.install(record, &self.connections)?;
        assert!(record.is_active() && record.is_fully_installed());
        let snapshot = record.clone();
        self.notify(Notification::ContextCreated { imsi, record: snapshot });

        for ctx in &contexts[1..] {
            self.bearers.create(BearerRecord::new_dedicated(
                ctx.teid,
                imsi,
                self.policy.slice,
                ctx.bearer_id,
                ctx.qos,
                endpoints,
                self.policy.dedicated_timeout,
            ))?;
        }
        Ok(teid)
    }

    /// Handle an application start. Creates the dedicated record on first
    /// use, reuses it across restarts, and runs admission before activating
    /// and installing it. Returns whether the bearer is usable.
    pub fn on_app_start(&mut self, app: &Application) -> Result<bool, ControllerError> {
        if self.bearers.lookup(app.teid).is_none() {
            self.bearers.create(BearerRecord::new_dedicated(
                app.teid,
                app.imsi,
                self.policy.slice,
                app.bearer_id,
                app.qos,
                app.endpoints,
                self.policy.dedicated_timeout,
            ))?;
        }

        let endpoints = self.bearers.get(app.teid)?.endpoints;
        let paths = self.resolve_paths(&endpoints)?;
        let record = self.bearers.get_mut(app.teid)?;

        if record.is_default() {
            // precondition of the session contract
            assert!(record.is_active() && record.is_fully_installed());
            return Ok(true);
        }
        if record.is_active() {
            // paired applications share one bearer; the second start is a no-op
            debug!("{} already active, reusing", record.teid);
            return Ok(true);
        }

        if !self.admission.review(record, &paths, &self.connections).is_accepted() {
            let reasons = record.block_reason();
            let snapshot = record.clone();
            warn!("{} blocked: {}", app.teid, reasons);
            self.notify(Notification::BearerBlocked { record: snapshot, reasons });
            return Ok(false);
        }

        self.admission.reserve(record, &paths, &mut self.connections);
        record.set_active(true);
        self.installer.install(record, &self.connections)?;
        let snapshot = record.clone();
        self.notify(Notification::BearerAccepted { record: snapshot });
        Ok(true)
    }

    /// Handle an application stop. Deactivates the bearer, releases its
    /// resources and removes its rules; a no-op for inactive bearers and for
    /// the default bearer, which stays up for the lifetime of the session.
    pub fn on_app_stop(&mut self, app: &Application) -> Result<(), ControllerError> {
        let endpoints = self.bearers.get(app.teid)?.endpoints;
        let paths = self.resolve_paths(&endpoints)?;
        let record = self.bearers.get_mut(app.teid)?;
        if record.is_default() || !record.is_active() {
            return Ok(());
        }
        debug!("Deactivating {}", record.teid);
        record.set_active(false);
        self.admission.release(record, &paths, &mut self.connections);
        self.installer.remove(record, &self.connections)?;
        Ok(())
    }

    /// Handle a flow-removed event reported by a switch. Rules from outside
    /// the tunnel table are ignored; for tunnel rules, exactly one of the
    /// following applies, in order:
    ///
    /// 1. the bearer is inactive: the expiry is expected, nothing to do;
    /// 2. the stored priority is above the removed one: the rule was stale,
    ///    superseded by a reinstall, nothing to do;
    /// 3. the priorities match and the bearer is active: a genuine idle
    ///    expiry on a live bearer, repair by reinstalling at higher priority;
    /// 4. anything else means the priority invariant was broken elsewhere and
    ///    aborts.
    pub fn on_flow_removed(&mut self, event: FlowRemoved) -> Result<(), ControllerError> {
        if event.table != TABLE_TUNNEL {
            debug!("Ignoring flow-removed from table {}", event.table);
            return Ok(());
        }
        let teid = Teid(event.cookie as u32);
        // a removed tunnel rule for an unknown teid is a controller bug
        let record = match self.bearers.get_mut(teid) {
            Ok(r) => r,
            Err(e) => panic!("Flow removed for unknown bearer: {}", e),
        };

        if !record.is_active() {
            debug!("{} expired after app stop", teid);
            return Ok(());
        }
        if record.priority() > event.priority {
            debug!(
                "{}: stale rule at priority {} expired (current {})",
                teid,
                event.priority,
                record.priority()
            );
            return Ok(());
        }
        if record.priority() == event.priority {
            self.installer.reinstall(record, &self.connections)?;
            return Ok(());
        }
        unreachable!(
            "{}: switch reported priority {} above the stored {}",
            teid,
            event.priority,
            record.priority()
        );
    }

    /// Handle a packet punted to the controller. ARP requests are answered
    /// directly out the ingress port; tunnel-table misses for a known active
    /// bearer trigger a repair; everything else is logged and dropped.
    pub fn on_packet_in(&mut self, packet: PacketIn) -> Result<(), ControllerError> {
        match packet {
            PacketIn::ArpRequest { switch, ingress_port, target_ip } => {
                let target_mac = self.topology.resolve_mac(target_ip)?;
                self.installer.send_packet(
                    switch,
                    ingress_port,
                    PacketOut::ArpReply { target_ip, target_mac },
                );
                Ok(())
            }
            PacketIn::TunnelMiss { switch, teid } => {
                match self.bearers.lookup(teid) {
                    Some(r) if r.is_active() => {
                        info!("Tunnel miss for active {} at {:?}, repairing", teid, switch);
                        let record = self.bearers.get_mut(teid)?;
                        self.installer.reinstall(record, &self.connections)?;
                    }
                    _ => debug!("Dropping tunnel miss for {} at {:?}", teid, switch),
                }
                Ok(())
            }
            PacketIn::Other { switch, table } => {
                debug!("Dropping unexpected packet-in from {:?} table {}", switch, table);
                Ok(())
            }
        }
    }

    /// Pre-check a dedicated bearer request before the actual session
    /// signaling: runs the admission review on a scratch record without
    /// reserving anything or touching stored state.
    pub fn request_dedicated_bearer(
        &mut self,
        imsi: Imsi,
        endpoints: BearerEndpoints,
        qos: QosInfo,
    ) -> Result<bool, ControllerError> {
        let mut scratch = BearerRecord::new_dedicated(
            Teid(0),
            imsi,
            self.policy.slice,
            2,
            qos,
            endpoints,
            self.policy.dedicated_timeout,
        );
        let paths = self.resolve_paths(&endpoints)?;
        Ok(self.admission.review(&mut scratch, &paths, &self.connections).is_accepted())
    }

    /// [`BearerController::on_session_created`] under its external name
    pub fn notify_session_created(
        &mut self,
        imsi: Imsi,
        endpoints: BearerEndpoints,
        contexts: &[BearerContext],
    ) -> Result<Teid, ControllerError> {
        self.on_session_created(imsi, endpoints, contexts)
    }

    /// [`BearerController::on_app_start`] under its external name
    pub fn notify_app_start(&mut self, app: &Application) -> Result<bool, ControllerError> {
        self.on_app_start(app)
    }

    /// [`BearerController::on_app_stop`] under its external name
    pub fn notify_app_stop(&mut self, app: &Application) -> Result<(), ControllerError> {
        self.on_app_stop(app)
    }

    /// Tear down a UE session: destroys every bearer record of the UE,
    /// releasing resources and removing rules of the active ones.
    pub fn remove_session(&mut self, imsi: Imsi) -> Result<(), ControllerError> {
        for mut record in self.bearers.remove_session(imsi) {
            if record.is_active() {
                let paths = self.resolve_paths(&record.endpoints)?;
                self.admission.release(&mut record, &paths, &mut self.connections);
                self.installer.remove(&mut record, &self.connections)?;
            }
        }
        info!("Session of {} removed", imsi);
        Ok(())
    }

    /// Advance simulated time, firing due timers in order. The periodic
    /// statistics dump reschedules itself.
    pub fn process_timers(&mut self, until_ms: u64) {
        while let Some(timer) = self.timers.pop_due(until_ms) {
            match timer {
                Timer::StatsDump => self.dump_admission_stats(),
            }
        }
    }

    /// Close the statistics interval: read and reset the counters, hand the
    /// snapshot to the observers, and reschedule the dump.
    pub fn dump_admission_stats(&mut self) {
        let snapshot = self.admission.dump_stats();
        info!("Admission stats: {}", snapshot);
        let time_ms = self.timers.now();
        self.notify(Notification::StatsReport { time_ms, snapshot });
        self.stats_timer =
            Some(self.timers.schedule_after(self.policy.stats_interval_ms, Timer::StatsDump));
    }

    /// Cancel the periodic timers before dropping the controller, so nothing
    /// fires against destroyed state.
    pub fn teardown(&mut self) {
        if let Some(token) = self.stats_timer.take() {
            self.timers.cancel(token);
        }
    }

    fn resolve_paths(&self, endpoints: &BearerEndpoints) -> Result<BearerPaths, TopologyError> {
        endpoints
            .iter()
            .map(|(iface, p)| Ok((iface, self.connections.resolve_path(p.src_sw, p.dst_sw)?)))
            .collect()
    }

    fn notify(&mut self, event: Notification) {
        for observer in self.observers.iter_mut() {
            observer(&event);
        }
    }

    /// The slice policy this controller is governed by
    pub fn policy(&self) -> &SlicePolicy {
        &self.policy
    }

    /// Read access to the topology index
    pub fn topology(&self) -> &TopologyIndex {
        &self.topology
    }

    /// Read access to the link registry
    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    /// Read access to the TEID table
    pub fn bearers(&self) -> &BearerTable {
        &self.bearers
    }

    /// Read access to the admission engine and its counters
    pub fn admission(&self) -> &AdmissionEngine {
        &self.admission
    }

    /// Mutable access to the admission engine, for capacity overrides
    pub fn admission_mut(&mut self) -> &mut AdmissionEngine {
        &mut self.admission
    }

    /// Read access to the switch backend
    pub fn backend(&self) -> &B {
        self.installer.backend()
    }

    /// Mutable access to the switch backend, for the simulation harness
    pub fn backend_mut(&mut self) -> &mut B {
        self.installer.backend_mut()
    }

    /// Number of pending timers (after teardown this drops to zero)
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }
}
