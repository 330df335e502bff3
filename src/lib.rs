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

#![deny(missing_docs)]

//! # OFEPC: OpenFlow EPC Bearer Controller
//!
//! This is a library simulating the control plane of an SDN-based mobile
//! backhaul: a centralized controller that tracks which switch every endpoint
//! is attached to, admits or blocks GTP-tunnel (bearer) requests based on
//! resource availability, and installs, removes and repairs the per-tunnel
//! forwarding rules on OpenFlow-like switches.
//!
//! The model is single-threaded and event-driven: every handler of the
//! [`BearerController`](controller::BearerController) runs to completion when
//! invoked, and any wait is a scheduled timer on its internal queue.
//!
//! ## Example usage
//!
//! The following example builds a two-switch backhaul, attaches an eNB and a
//! gateway, and establishes a UE session with its default bearer.
//!
//! ```rust
//! use ofepc::bearer::{BearerEndpoints, IfacePath, QosInfo};
//! use ofepc::connection::ConnectionInfo;
//! use ofepc::controller::{BearerContext, BearerController, SlicePolicy};
//! use ofepc::flows::SimSwitch;
//! use ofepc::types::{Imsi, LinkTier, MacAddr, Qci, Teid};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let policy = SlicePolicy { expected_links: 1, ..SlicePolicy::default() };
//!     let mut ctrl = BearerController::new(policy, SimSwitch::new());
//!
//!     let enb_sw = ctrl.add_switch();
//!     let gw_sw = ctrl.add_switch();
//!     ctrl.on_link_discovered(ConnectionInfo::new(
//!         enb_sw, 1, gw_sw, 1, 100e6, LinkTier::Access,
//!     ))?;
//!
//!     let enb = "10.0.0.1".parse()?;
//!     let gw = "10.0.1.1".parse()?;
//!     ctrl.on_topology_attach(enb, MacAddr(0x01), enb_sw, 2)?;
//!     ctrl.on_topology_attach(gw, MacAddr(0x02), gw_sw, 2)?;
//!
//!     let endpoints = BearerEndpoints::s1_only(IfacePath {
//!         src_addr: enb,
//!         dst_addr: gw,
//!         src_sw: enb_sw,
//!         dst_sw: gw_sw,
//!     });
//!     let teid = ctrl.on_session_created(
//!         Imsi(1),
//!         endpoints,
//!         &[BearerContext {
//!             teid: Teid(100),
//!             bearer_id: 1,
//!             qos: QosInfo::non_gbr(Qci::NonGbr9),
//!         }],
//!     )?;
//!
//!     assert!(ctrl.bearers().get(teid)?.is_active());
//!     Ok(())
//! }
//! ```

pub mod admission;
pub mod bearer;
pub mod connection;
pub mod controller;
pub mod event;
pub mod flows;
pub mod stats;
pub mod topology;
pub mod types;

#[cfg(test)]
mod test;

pub use controller::{Application, BearerContext, BearerController, SlicePolicy};
pub use types::{
    BearerError, BlockReason, ControllerError, Imsi, LinkTier, LteIface, Qci, SliceId, SwitchId,
    Teid, TopologyError,
};
