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

//! Per-connection state of the receive window control policy.

use std::time::Instant;

use self::rtt::RttTracker;
use self::throughput::ThroughputEstimator;

/// State kept for each connection governed by the policy.
#[derive(Debug, Clone)]
pub struct ConnectionRecord {
    /// RTT bookkeeping.
    pub(crate) rtt: RttTracker,

    /// Throughput estimation.
    pub(crate) throughput: ThroughputEstimator,

    /// Time of the last accepted increase. Increases are at least
    /// `min_increase_spacing_rtts` RTTs apart.
    pub(crate) last_increase_time: Option<Instant>,

    /// Time of the last decrease. At most one decrease per RTT.
    pub(crate) last_decrease_time: Option<Instant>,

    /// Consecutive RTTs with a deficit ratio above gamma2.
    pub(crate) high_deficit_rtts: u32,

    /// Sequence number marking the end of the current measurement cycle.
    pub(crate) cycle_right_edge: u64,

    /// Bytes delivered in the current measurement cycle.
    pub(crate) delivered: u64,

    /// The connection's normalized share of the traffic volume on the link,
    /// as weighted in the latest slot duration. Reported for observation
    /// only; quota claims are first come, first served.
    pub(crate) quota_share: f64,
}

impl ConnectionRecord {
    pub fn new(beta: f64, filter_enabled: bool) -> Self {
        Self {
            rtt: RttTracker::new(),
            throughput: ThroughputEstimator::new(beta, filter_enabled),
            last_increase_time: None,
            last_decrease_time: None,
            high_deficit_rtts: 0,
            cycle_right_edge: 0,
            delivered: 0,
            quota_share: 0.0,
        }
    }

    /// Start a new measurement cycle ending at the given sequence number.
    pub(crate) fn start_cycle(&mut self, right_edge: u64) {
        self.cycle_right_edge = right_edge;
        self.delivered = 0;
        self.rtt.reset_cycle();
    }

    /// Account bytes delivered in the current cycle.
    pub(crate) fn on_delivered(&mut self, bytes: u64) {
        self.delivered = self.delivered.saturating_add(bytes);
    }

    /// Check if the cycle has completed, i.e. the acknowledged sequence
    /// number caught up with the recorded right edge.
    pub fn cycle_completed(&self, last_acked_seq: u64) -> bool {
        last_acked_seq >= self.cycle_right_edge
    }

    /// Return the RTT tracker.
    pub fn rtt(&self) -> &RttTracker {
        &self.rtt
    }

    /// Return the throughput estimator.
    pub fn throughput(&self) -> &ThroughputEstimator {
        &self.throughput
    }

    /// Return the time of the last accepted increase.
    pub fn last_increase_time(&self) -> Option<Instant> {
        self.last_increase_time
    }

    /// Return the number of consecutive RTTs with a high deficit ratio.
    pub fn high_deficit_rtts(&self) -> u32 {
        self.high_deficit_rtts
    }

    /// Return the right edge of the current cycle.
    pub fn cycle_right_edge(&self) -> u64 {
        self.cycle_right_edge
    }

    /// Return the bytes delivered in the current cycle.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Return the connection's normalized share of the link traffic.
    pub fn quota_share(&self) -> f64 {
        self.quota_share
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn record_cycle() {
        let mut r = ConnectionRecord::new(0.85, false);
        assert!(r.cycle_completed(0));

        r.rtt.on_sample(Duration::from_micros(100));
        r.on_delivered(1460);
        r.on_delivered(1460);
        assert_eq!(r.delivered(), 2920);

        r.start_cycle(10000);
        assert_eq!(r.cycle_right_edge(), 10000);
        assert_eq!(r.delivered(), 0);
        assert_eq!(r.rtt().sample_count(), 0);
        assert_eq!(r.rtt().base_rtt(), Some(Duration::from_micros(100)));

        for (acked, completed) in [(0, false), (9999, false), (10000, true), (10001, true)] {
            assert_eq!(r.cycle_completed(acked), completed);
        }
    }
}

pub mod rtt;
pub mod throughput;
