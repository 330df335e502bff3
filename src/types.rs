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

//! Module containing all type definitions

use petgraph::prelude::*;
use petgraph::stable_graph::StableGraph;
use std::fmt;
use std::net::Ipv4Addr;
use thiserror::Error;

type IndexType = u32;
/// Switch Identification (and index into the backhaul graph)
pub type SwitchId = NodeIndex<IndexType>;
/// Link weight (hop metric) for the backhaul graph
pub type LinkWeight = f64;
/// Bit rate in bits per second
pub type Rate = f64;
/// Backhaul network graph. Node weights are unused, edge weights are hop metrics.
pub type BackhaulGraph = StableGraph<(), LinkWeight, Directed, IndexType>;

/// GTP Tunnel Endpoint Identifier, the unique key of a bearer
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy)]
pub struct Teid(pub u32);

impl fmt::Display for Teid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "teid {:#x}", self.0)
    }
}

/// International Mobile Subscriber Identity, the key of a UE session
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy)]
pub struct Imsi(pub u64);

impl fmt::Display for Imsi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "imsi {}", self.0)
    }
}

/// Logical network slice identifier
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy)]
pub struct SliceId(pub u16);

/// MAC address, stored in the lower 48 bits
#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy)]
pub struct MacAddr(pub u64);

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0.to_be_bytes();
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[2], b[3], b[4], b[5], b[6], b[7]
        )
    }
}

/// QoS Class Identifier. Classes 1 through 4 are GBR, 5 through 9 are non-GBR.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy)]
pub enum Qci {
    /// Conversational voice (GBR)
    Gbr1,
    /// Conversational video (GBR)
    Gbr2,
    /// Real-time gaming (GBR)
    Gbr3,
    /// Buffered video (GBR)
    Gbr4,
    /// IMS signalling (non-GBR)
    NonGbr5,
    /// Interactive video (non-GBR)
    NonGbr6,
    /// Voice and interactive gaming (non-GBR)
    NonGbr7,
    /// TCP premium (non-GBR)
    NonGbr8,
    /// TCP best effort (non-GBR), the class of every default bearer
    NonGbr9,
}

impl Qci {
    /// Returns true if this class carries a guaranteed bit rate
    pub fn is_gbr(&self) -> bool {
        matches!(self, Qci::Gbr1 | Qci::Gbr2 | Qci::Gbr3 | Qci::Gbr4)
    }

    /// The reserved class of the default bearer
    pub fn default_bearer() -> Self {
        Qci::NonGbr9
    }
}

/// The two logical interfaces a bearer traverses
#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy)]
pub enum LteIface {
    /// Radio-side interface (eNB to gateway)
    S1,
    /// Core-side interface (gateway to gateway)
    S5,
}

impl LteIface {
    /// Both interfaces, in installation order
    pub const ALL: [LteIface; 2] = [LteIface::S1, LteIface::S5];

    /// Index into the per-interface flag arrays of a bearer record
    pub fn index(&self) -> usize {
        match self {
            LteIface::S1 => 0,
            LteIface::S5 => 1,
        }
    }
}

impl fmt::Display for LteIface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LteIface::S1 => write!(f, "S1"),
            LteIface::S5 => write!(f, "S5"),
        }
    }
}

/// Position of a link in the backhaul hierarchy, used to attribute bandwidth
/// block reasons to a layer.
#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy)]
pub enum LinkTier {
    /// eNB facing links
    Access,
    /// Intermediate backhaul links
    Aggregation,
    /// Gateway facing links
    Core,
}

impl LinkTier {
    /// The bandwidth block bit charged to this tier
    pub fn block_bit(&self) -> BlockReason {
        match self {
            LinkTier::Access => BlockReason::BAND_ACCESS,
            LinkTier::Aggregation => BlockReason::BAND_AGGREG,
            LinkTier::Core => BlockReason::BAND_CORE,
        }
    }
}

/// Bitmap of reasons why admission rejected a bearer. A record carries its own
/// diagnosis so that statistics can be derived without a separate lookup.
#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy, Default)]
pub struct BlockReason(u16);

impl BlockReason {
    /// Flow table of a switch on the path is full
    pub const TABLE_FULL: BlockReason = BlockReason(0b00001);
    /// Pipeline load of a switch on the path is exhausted
    pub const CPU_OVERLOAD: BlockReason = BlockReason(0b00010);
    /// Insufficient guaranteed bandwidth on an access link
    pub const BAND_ACCESS: BlockReason = BlockReason(0b00100);
    /// Insufficient guaranteed bandwidth on an aggregation link
    pub const BAND_AGGREG: BlockReason = BlockReason(0b01000);
    /// Insufficient guaranteed bandwidth on a core link
    pub const BAND_CORE: BlockReason = BlockReason(0b10000);

    /// All individual reason bits, with printable names
    pub const ALL: [(BlockReason, &'static str); 5] = [
        (BlockReason::TABLE_FULL, "table-full"),
        (BlockReason::CPU_OVERLOAD, "cpu-overload"),
        (BlockReason::BAND_ACCESS, "band-access"),
        (BlockReason::BAND_AGGREG, "band-aggreg"),
        (BlockReason::BAND_CORE, "band-core"),
    ];

    /// The empty bitmap
    pub fn empty() -> Self {
        BlockReason(0)
    }

    /// Returns true if no bit is set
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Set all bits of `other` in self
    pub fn insert(&mut self, other: BlockReason) {
        self.0 |= other.0;
    }

    /// Clear every bit
    pub fn clear(&mut self) {
        self.0 = 0;
    }

    /// Returns true if every bit of `other` is set in self
    pub fn contains(&self, other: BlockReason) -> bool {
        self.0 & other.0 == other.0
    }

    /// Iterate over the individual bits set in self
    pub fn iter(&self) -> impl Iterator<Item = (BlockReason, &'static str)> + '_ {
        let bits = self.0;
        BlockReason::ALL
            .iter()
            .copied()
            .filter(move |(b, _)| bits & b.0 == b.0)
    }
}

impl std::ops::BitOr for BlockReason {
    type Output = BlockReason;
    fn bitor(self, rhs: BlockReason) -> BlockReason {
        BlockReason(self.0 | rhs.0)
    }
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        let mut first = true;
        for (_, name) in self.iter() {
            if !first {
                write!(f, "|")?;
            }
            write!(f, "{}", name)?;
            first = false;
        }
        Ok(())
    }
}

/// Topology Errors
#[derive(Error, Debug, PartialEq)]
pub enum TopologyError {
    /// The address is already attached to a switch
    #[error("Address {0} is already attached to a switch!")]
    DuplicateAttachment(Ipv4Addr),
    /// The address is not attached anywhere
    #[error("Address {0} is not attached to any switch")]
    UnknownAddress(Ipv4Addr),
    /// The switch pair is already registered as neighbors
    #[error("Link between {0:?} and {1:?} is already registered!")]
    DuplicateLink(SwitchId, SwitchId),
    /// The switch pair is not registered as neighbors
    #[error("Link between {0:?} and {1:?} is not registered")]
    UnknownLink(SwitchId, SwitchId),
    /// No path exists between the two switches
    #[error("No route between {0:?} and {1:?}")]
    NoRoute(SwitchId, SwitchId),
    /// Routing tables were queried before being built
    #[error("Routing tables have not been built yet")]
    RoutesNotBuilt,
}

/// Bearer Errors
#[derive(Error, Debug, PartialEq)]
pub enum BearerError {
    /// A record with the same TEID already exists
    #[error("A bearer record for {0} already exists!")]
    DuplicateTeid(Teid),
    /// The default bearer failed validation (bearer id or QoS class)
    #[error("Invalid default bearer for {0}: id must be 1 and class must be NonGbr9")]
    InvalidDefaultBearer(Teid),
    /// No record exists for the TEID
    #[error("No bearer record for {0}")]
    UnknownTeid(Teid),
}

/// Controller Errors
#[derive(Error, Debug, PartialEq)]
pub enum ControllerError {
    /// Topology error which cannot be handled
    #[error("Topology Error: {0}")]
    Topology(#[from] TopologyError),
    /// Bearer error which cannot be handled
    #[error("Bearer Error: {0}")]
    Bearer(#[from] BearerError),
}
