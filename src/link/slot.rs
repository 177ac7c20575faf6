// Copyright (c) 2023 The TQUIC Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Global time-keeping of the link.
//!
//! Time is divided into cycles of `2T`, each made of a measuring sub-slot of
//! `T` followed by an adjusting sub-slot of `T`. Window growth is allowed in
//! the adjusting sub-slot only. The sub-slot length is the traffic-weighted
//! mean RTT of the flows, `T = sum(w_i * RTT_i)`, where `w_i` is the share of
//! flow `i` in the traffic volume since the last recomputation.

use std::time::Duration;
use std::time::Instant;

use log::*;
use slab::Slab;

use crate::Error;
use crate::Result;

/// Phase of the current cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotPhase {
    /// Bandwidth and throughput are being measured. No window growth.
    Measuring,

    /// Window growth is permitted, subject to quota.
    Adjusting,
}

/// Volume and RTT reported by a flow.
#[derive(Debug, Default, Clone)]
struct FlowSample {
    /// Bytes delivered since the last recomputation of `T`.
    bytes: u64,

    /// The latest RTT reported.
    rtt: Option<Duration>,

    /// Normalized traffic share computed at the last recomputation.
    weight: f64,
}

/// Changes made by [`SlotScheduler::advance`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SlotTransition {
    /// A new cycle started.
    pub new_cycle: bool,

    /// An adjusting sub-slot was entered, with the given epoch.
    pub adjusting_epoch: Option<u32>,
}

#[derive(Debug)]
pub struct SlotScheduler {
    /// Sub-slot length `T`.
    slot_duration: Duration,

    /// Lower bound of `T`.
    min_slot_duration: Duration,

    /// Start of the current cycle.
    cycle_start: Instant,

    /// Epoch of the latest adjusting sub-slot.
    epoch: u32,

    /// Whether the adjusting sub-slot of the current cycle was entered.
    adjusting_entered: bool,

    /// Flows registered on the link.
    flows: Slab<FlowSample>,
}

impl SlotScheduler {
    pub fn new(min_slot_duration: Duration, now: Instant) -> Self {
        Self {
            slot_duration: min_slot_duration,
            min_slot_duration,
            cycle_start: now,
            epoch: 0,
            adjusting_entered: false,
            flows: Slab::new(),
        }
    }

    /// Register a flow and return its key.
    pub fn register(&mut self) -> usize {
        self.flows.insert(FlowSample::default())
    }

    /// Remove a flow.
    pub fn release(&mut self, key: usize) -> Result<()> {
        if self.flows.try_remove(key).is_none() {
            return Err(Error::InvalidState(format!("unknown flow {}", key)));
        }
        Ok(())
    }

    /// Record bytes delivered by a flow and its current RTT.
    pub fn report(&mut self, key: usize, bytes: u64, rtt: Duration) -> Result<()> {
        let flow = self
            .flows
            .get_mut(key)
            .ok_or_else(|| Error::InvalidState(format!("unknown flow {}", key)))?;

        flow.bytes = flow.bytes.saturating_add(bytes);
        if !rtt.is_zero() {
            flow.rtt = Some(rtt);
        }
        Ok(())
    }

    /// Return the traffic share of a flow computed at the last recomputation.
    pub fn weight(&self, key: usize) -> Option<f64> {
        self.flows.get(key).map(|f| f.weight)
    }

    /// Return the number of registered flows.
    pub fn flow_count(&self) -> usize {
        self.flows.len()
    }

    /// Recompute `T` from the volumes reported since the last recomputation,
    /// and start a new accumulation period.
    ///
    /// Flows without fresh bytes get no weight. If no flow has fresh bytes,
    /// `T` is the plain mean RTT of the flows, or the minimum slot duration if
    /// no RTT is known at all.
    pub fn recompute_slot_duration(&mut self) -> Duration {
        let total: u64 = self
            .flows
            .iter()
            .filter(|(_, f)| f.rtt.is_some())
            .map(|(_, f)| f.bytes)
            .fold(0, u64::saturating_add);

        let mut weighted = 0.0;
        let mut rtt_sum = Duration::ZERO;
        let mut rtt_count = 0_u32;
        for (_, flow) in self.flows.iter_mut() {
            flow.weight = 0.0;
            if let Some(rtt) = flow.rtt {
                if total > 0 {
                    flow.weight = flow.bytes as f64 / total as f64;
                    weighted += flow.weight * rtt.as_secs_f64();
                }
                rtt_sum = rtt_sum.saturating_add(rtt);
                rtt_count += 1;
            }
            flow.bytes = 0;
        }

        let t = if total > 0 {
            Duration::from_secs_f64(weighted)
        } else if rtt_count > 0 {
            rtt_sum / rtt_count
        } else {
            self.min_slot_duration
        };

        self.slot_duration = t.max(self.min_slot_duration);
        trace!(
            "slot duration = {}us, flows = {}, total bytes = {}",
            self.slot_duration.as_micros(),
            self.flows.len(),
            total
        );
        self.slot_duration
    }

    /// Return the phase at `now`. It is a pure function of the time elapsed
    /// since the cycle start and `T`.
    pub fn current_phase(&self, now: Instant) -> SlotPhase {
        let elapsed = now.saturating_duration_since(self.cycle_start).as_nanos();
        let t = self.slot_duration.as_nanos().max(1);
        if elapsed % (2 * t) < t {
            SlotPhase::Measuring
        } else {
            SlotPhase::Adjusting
        }
    }

    /// Move the cycle forward to `now`.
    ///
    /// Whole elapsed cycles are skipped at once; `T` is recomputed once for
    /// the new cycle. Entering an adjusting sub-slot bumps the epoch.
    pub fn advance(&mut self, now: Instant) -> SlotTransition {
        let mut transition = SlotTransition::default();

        let cycle = self.slot_duration * 2;
        let elapsed = now.saturating_duration_since(self.cycle_start);
        if elapsed >= cycle {
            let cycles = elapsed.as_nanos() / cycle.as_nanos().max(1);
            let skipped = cycle.as_nanos().saturating_mul(cycles);
            self.cycle_start += Duration::from_nanos(skipped.min(u64::MAX as u128) as u64);
            self.adjusting_entered = false;
            self.recompute_slot_duration();
            transition.new_cycle = true;
        }

        if !self.adjusting_entered && self.current_phase(now) == SlotPhase::Adjusting {
            self.adjusting_entered = true;
            self.epoch = self.epoch.wrapping_add(1);
            transition.adjusting_epoch = Some(self.epoch);
        }

        transition
    }

    /// Return the sub-slot length `T`.
    pub fn slot_duration(&self) -> Duration {
        self.slot_duration
    }

    /// Return the start of the current cycle.
    pub fn cycle_start(&self) -> Instant {
        self.cycle_start
    }

    /// Return the epoch of the latest adjusting sub-slot.
    pub fn epoch(&self) -> u32 {
        self.epoch
    }
}
