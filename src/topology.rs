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

//! Module defining the endpoint attachment table (IP to switch, and ARP).

use crate::types::{MacAddr, SwitchId, TopologyError};
use log::*;
use std::collections::{hash_map::Iter, HashMap};
use std::net::Ipv4Addr;

/// A single endpoint attachment. Attachments are immutable after creation:
/// every address attaches to exactly one switch for the life of the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attachment {
    /// The switch the endpoint is wired to
    pub switch: SwitchId,
    /// The endpoint MAC address, answered on ARP requests
    pub mac: MacAddr,
    /// The switch port the endpoint is wired to
    pub port: u32,
}

/// # Topology Index
///
/// Maps an endpoint IP address to the switch it is attached to, and keeps the
/// MAC address for ARP resolution. A lookup miss is a topology bug, not a
/// runtime condition: callers treat [`TopologyError::UnknownAddress`] as fatal.
#[derive(Debug, Clone, Default)]
pub struct TopologyIndex {
    attachments: HashMap<Ipv4Addr, Attachment>,
}

impl TopologyIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self { attachments: HashMap::new() }
    }

    /// Register a new endpoint attachment. Fails if the address is already
    /// attached, since each address may attach to exactly one switch.
    pub fn register_attachment(
        &mut self,
        addr: Ipv4Addr,
        mac: MacAddr,
        switch: SwitchId,
        port: u32,
    ) -> Result<(), TopologyError> {
        if self.attachments.contains_key(&addr) {
            return Err(TopologyError::DuplicateAttachment(addr));
        }
        debug!("Attach {} ({}) at switch {:?} port {}", addr, mac, switch, port);
        self.attachments.insert(addr, Attachment { switch, mac, port });
        Ok(())
    }

    /// Return the switch an address is attached to
    pub fn resolve_switch(&self, addr: Ipv4Addr) -> Result<SwitchId, TopologyError> {
        self.get(addr).map(|a| a.switch)
    }

    /// ARP-style lookup of the MAC address of an endpoint
    pub fn resolve_mac(&self, addr: Ipv4Addr) -> Result<MacAddr, TopologyError> {
        self.get(addr).map(|a| a.mac)
    }

    /// Return the switch port an address is attached to
    pub fn resolve_port(&self, addr: Ipv4Addr) -> Result<u32, TopologyError> {
        self.get(addr).map(|a| a.port)
    }

    /// Return the full attachment for an address
    pub fn get(&self, addr: Ipv4Addr) -> Result<Attachment, TopologyError> {
        self.attachments
            .get(&addr)
            .copied()
            .ok_or(TopologyError::UnknownAddress(addr))
    }

    /// Number of registered attachments
    pub fn len(&self) -> usize {
        self.attachments.len()
    }

    /// Returns true if no endpoint is attached
    pub fn is_empty(&self) -> bool {
        self.attachments.is_empty()
    }

    /// Iterate over all attachments
    pub fn iter(&self) -> Iter<'_, Ipv4Addr, Attachment> {
        self.attachments.iter()
    }
}
