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

//! Module defining the controller timers and the typed notification events
//! handed to statistics collaborators.

use crate::bearer::BearerRecord;
use crate::stats::StatsSnapshot;
use crate::types::{BlockReason, Imsi};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};

/// A scheduled controller callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Timer {
    /// Periodic read-and-reset of the admission counters
    StatsDump,
}

/// Handle of a scheduled timer, used for cancellation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken(u64);

/// # Timer Queue
///
/// Discrete, single-threaded scheduler. Timers fire in deadline order, with
/// insertion order breaking ties, and can be cancelled before firing. All of
/// time is simulated: the queue only moves forward when the owner pops due
/// timers.
#[derive(Debug, Clone, Default)]
pub struct TimerQueue {
    heap: BinaryHeap<Reverse<(u64, u64, Timer)>>,
    cancelled: HashSet<u64>,
    now: u64,
    next_token: u64,
}

impl TimerQueue {
    /// Create an empty queue at time zero
    pub fn new() -> Self {
        Self::default()
    }

    /// The current simulated time in milliseconds
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Schedule a timer `delay_ms` after the current time
    pub fn schedule_after(&mut self, delay_ms: u64, timer: Timer) -> TimerToken {
        let token = self.next_token;
        self.next_token += 1;
        self.heap.push(Reverse((self.now + delay_ms, token, timer)));
        TimerToken(token)
    }

    /// Cancel a scheduled timer. Cancelling an already fired timer is a no-op.
    pub fn cancel(&mut self, token: TimerToken) {
        if self.heap.iter().any(|Reverse((_, t, _))| *t == token.0) {
            self.cancelled.insert(token.0);
        }
    }

    /// Pop the next timer due at or before `until_ms`, advancing the clock to
    /// its deadline. Returns `None` once no timer is due, leaving the clock at
    /// `until_ms`.
    pub fn pop_due(&mut self, until_ms: u64) -> Option<Timer> {
        while let Some(Reverse((deadline, token, timer))) = self.heap.peek().copied() {
            if deadline > until_ms {
                break;
            }
            self.heap.pop();
            if self.cancelled.remove(&token) {
                continue;
            }
            self.now = deadline;
            return Some(timer);
        }
        self.now = self.now.max(until_ms);
        None
    }

    /// Number of pending (non-cancelled) timers
    pub fn len(&self) -> usize {
        self.heap.len() - self.cancelled.len()
    }

    /// Returns true if no timer is pending
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Typed trace events emitted by the controller. Each carries an immutable
/// snapshot of the relevant record; observers never see mutable state.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// A UE session and its default bearer were established
    ContextCreated {
        /// The UE the context belongs to
        imsi: Imsi,
        /// Snapshot of the installed default bearer
        record: BearerRecord,
    },
    /// Admission accepted a dedicated bearer request
    BearerAccepted {
        /// Snapshot of the activated record
        record: BearerRecord,
    },
    /// Admission blocked a dedicated bearer request
    BearerBlocked {
        /// Snapshot of the rejected record
        record: BearerRecord,
        /// The diagnosis bits
        reasons: BlockReason,
    },
    /// A statistics interval was closed
    StatsReport {
        /// Simulated time of the dump, in milliseconds
        time_ms: u64,
        /// The counters of the closed interval
        snapshot: StatsSnapshot,
    },
}

/// A statistics/trace collaborator, registered at controller construction
pub type Observer = Box<dyn FnMut(&Notification)>;
