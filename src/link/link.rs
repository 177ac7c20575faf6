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

//! State shared by all connections on one network interface.
//!
//! A [`Link`] owns the incoming bandwidth monitor, the slot scheduler with
//! its flow table, and the growth quota. Connections hold a reference to the
//! link and identify themselves with a [`FlowId`]; the link keeps no
//! reference back to them.

use std::fmt;
use std::time::Duration;
use std::time::Instant;

use log::*;
use parking_lot::Mutex;

use self::bandwidth::LinkBandwidthMonitor;
use self::quota::GrowthQuota;
use self::slot::SlotScheduler;
pub use self::slot::SlotPhase;
use crate::Config;
use crate::Result;

/// Identifier of a flow registered on a link.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FlowId(usize);

impl FlowId {
    /// Return the raw slab key.
    pub fn as_usize(&self) -> usize {
        self.0
    }
}

impl fmt::Debug for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "flow-{}", self.0)
    }
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Snapshot of the slot state at a given time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotView {
    /// Phase of the current cycle.
    pub phase: SlotPhase,

    /// Epoch of the latest adjusting sub-slot. Quota claims must carry it.
    pub epoch: u32,

    /// Sub-slot length `T`.
    pub slot_duration: Duration,
}

/// Link state shared by all connections on an interface.
pub struct Link {
    /// Segment size used to convert available bandwidth into quota.
    segment_size: u64,

    /// Incoming bandwidth monitor.
    monitor: Mutex<LinkBandwidthMonitor>,

    /// Slot scheduler and flow table. Always locked before `monitor`.
    slots: Mutex<SlotScheduler>,

    /// Growth quota of the current adjusting sub-slot.
    quota: GrowthQuota,
}

impl Link {
    /// Create the link state at interface activation. The first cycle, and
    /// its bandwidth measurement, start at `now`.
    pub fn new(conf: &Config, now: Instant) -> Result<Self> {
        conf.validate()?;

        let mut monitor = LinkBandwidthMonitor::new(
            conf.link_capacity,
            conf.alpha,
            conf.bandwidth_sample_window,
        );
        monitor.start_measurement(now);

        Ok(Self {
            segment_size: conf.segment_size,
            monitor: Mutex::new(monitor),
            slots: Mutex::new(SlotScheduler::new(conf.min_slot_duration, now)),
            quota: GrowthQuota::new(),
        })
    }

    /// Account bytes arrived on the interface, from any connection.
    ///
    /// The slot state is brought up to `now` first, so the bytes are
    /// measured only if they arrive in a measuring sub-slot.
    pub fn on_bytes_arrived(&self, bytes: u64, now: Instant) {
        let mut slots = self.slots.lock();
        self.roll(&mut slots, now);
        self.monitor.lock().on_bytes_arrived(bytes);
    }

    /// Return the incoming rate `BWT` in bytes per second.
    pub fn incoming_rate(&self) -> u64 {
        self.monitor.lock().incoming_rate()
    }

    /// Return the available bandwidth `BWA` in bytes per second.
    pub fn available_bandwidth(&self) -> u64 {
        self.monitor.lock().available_bandwidth()
    }

    /// Bring the slot state up to `now` and return a snapshot of it.
    pub fn slot(&self, now: Instant) -> SlotView {
        let mut slots = self.slots.lock();
        self.roll(&mut slots, now);

        SlotView {
            phase: slots.current_phase(now),
            epoch: slots.epoch(),
            slot_duration: slots.slot_duration(),
        }
    }

    /// Advance the slot scheduler to `now`.
    ///
    /// A new cycle opens a bandwidth measurement at its start and expires
    /// the unused quota. Entering an adjusting sub-slot finishes the
    /// measurement at the end of the measuring sub-slot and refills the
    /// quota with `BWA * T / segment_size` segments.
    fn roll(&self, slots: &mut SlotScheduler, now: Instant) {
        let measuring_end = slots.cycle_start() + slots.slot_duration();
        let transition = slots.advance(now);

        if transition.new_cycle {
            self.quota.expire();

            let mut monitor = self.monitor.lock();
            if monitor.is_measuring() {
                // The adjusting sub-slot of the previous cycle was never seen.
                monitor.finish_measurement(measuring_end);
            }
            monitor.start_measurement(slots.cycle_start());
        }

        if let Some(epoch) = transition.adjusting_epoch {
            let mut monitor = self.monitor.lock();
            let t = slots.slot_duration();
            monitor.finish_measurement(slots.cycle_start() + t);

            let bwa = monitor.available_bandwidth();
            let segments = bwa as u128 * t.as_nanos()
                / (1_000_000_000_u128 * self.segment_size.max(1) as u128);
            let segments = segments.min(u32::MAX as u128) as u32;
            self.quota.refill(epoch, segments);

            debug!(
                "link adjusting sub-slot {}: BWT = {}, BWA = {}, T = {}us, quota = {}",
                epoch,
                monitor.incoming_rate(),
                bwa,
                t.as_micros(),
                segments
            );
        }
    }

    /// Try to claim up to `want` segments of window growth in the sub-slot
    /// described by `view`. Return the number of segments granted.
    ///
    /// Nothing is granted outside an adjusting sub-slot or once the
    /// sub-slot has expired.
    pub fn try_claim(&self, view: &SlotView, want: u32) -> u32 {
        if view.phase != SlotPhase::Adjusting {
            return 0;
        }
        self.quota.try_claim(view.epoch, want)
    }

    /// Return the quota left for the sub-slot described by `view`.
    pub fn remaining_quota(&self, view: &SlotView) -> u32 {
        if view.phase != SlotPhase::Adjusting {
            return 0;
        }
        self.quota.remaining(view.epoch)
    }

    /// Register a new flow.
    pub fn register_flow(&self) -> FlowId {
        FlowId(self.slots.lock().register())
    }

    /// Remove a flow. Quota it already claimed is not refunded.
    pub fn release_flow(&self, flow: FlowId) -> Result<()> {
        self.slots.lock().release(flow.0)
    }

    /// Report the bytes a flow delivered over its last RTT, and that RTT.
    pub fn report_flow(&self, flow: FlowId, bytes: u64, rtt: Duration) -> Result<()> {
        self.slots.lock().report(flow.0, bytes, rtt)
    }

    /// Return the traffic share of a flow.
    pub fn flow_weight(&self, flow: FlowId) -> Option<f64> {
        self.slots.lock().weight(flow.0)
    }

    /// Return the number of registered flows.
    pub fn flow_count(&self) -> usize {
        self.slots.lock().flow_count()
    }

    /// Recompute `T` now instead of waiting for the next cycle, e.g. after a
    /// large change in the set of flows.
    pub fn recompute_slot_duration(&self) -> Duration {
        self.slots.lock().recompute_slot_duration()
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link segment_size={}", self.segment_size)
    }
}


pub mod bandwidth;
pub mod quota;
pub mod slot;
