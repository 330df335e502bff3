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

//! Module defining the admission statistics counters.

use crate::types::BlockReason;
use std::fmt;

/// Counters of one statistics interval. Incremented by the admission engine,
/// read and reset by the periodic dump.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdmissionStats {
    requests: u64,
    accepted: u64,
    blocked: u64,
    blocked_by_reason: [u64; BlockReason::ALL.len()],
}

/// An immutable copy of the counters of one closed interval, handed to the
/// statistics collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Bearer requests seen in the interval
    pub requests: u64,
    /// Requests accepted
    pub accepted: u64,
    /// Requests blocked
    pub blocked: u64,
    /// Requests blocked per individual reason bit. A request blocked for two
    /// reasons counts once per reason.
    pub blocked_by_reason: [u64; BlockReason::ALL.len()],
}

impl AdmissionStats {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Count an accepted request
    pub fn notify_accepted(&mut self) {
        self.requests += 1;
        self.accepted += 1;
    }

    /// Count a blocked request with its diagnosis
    pub fn notify_blocked(&mut self, reason: BlockReason) {
        self.requests += 1;
        self.blocked += 1;
        for (i, (bit, _)) in BlockReason::ALL.iter().enumerate() {
            if reason.contains(*bit) {
                self.blocked_by_reason[i] += 1;
            }
        }
    }

    /// Requests seen in the current interval
    pub fn requests(&self) -> u64 {
        self.requests
    }

    /// Requests accepted in the current interval
    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    /// Requests blocked in the current interval
    pub fn blocked(&self) -> u64 {
        self.blocked
    }

    /// Close the interval: return a snapshot and reset every counter
    pub fn snapshot_and_reset(&mut self) -> StatsSnapshot {
        let snapshot = StatsSnapshot {
            requests: self.requests,
            accepted: self.accepted,
            blocked: self.blocked,
            blocked_by_reason: self.blocked_by_reason,
        };
        *self = Self::default();
        snapshot
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "requests: {}, accepted: {}, blocked: {}",
            self.requests, self.accepted, self.blocked
        )?;
        for (i, (_, name)) in BlockReason::ALL.iter().enumerate() {
            if self.blocked_by_reason[i] > 0 {
                write!(f, ", {}: {}", name, self.blocked_by_reason[i])?;
            }
        }
        Ok(())
    }
}
