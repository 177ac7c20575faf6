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

//! NewReno linear window growth, see RFC 5681 Section 3.1.

use std::cmp;
use std::time::Instant;

use log::*;

use super::TransportState;
use super::WindowController;
use super::WindowGrowthStrategy;

/// The default window growth function: slow start up to the threshold, then
/// about one segment per window of acked data.
#[derive(Debug, Clone)]
pub struct DefaultLinearGrowth {
    /// Receive window ceiling in bytes.
    max_window: u64,
}

impl DefaultLinearGrowth {
    pub fn new(max_window: u64) -> Self {
        Self { max_window }
    }
}

impl WindowGrowthStrategy for DefaultLinearGrowth {
    fn name(&self) -> &str {
        "NEWRENO"
    }

    fn grow(&mut self, _now: Instant, tcb: &TransportState, segments_acked: u32) -> u64 {
        let seg = cmp::max(tcb.segment_size, 1);
        let mut window = tcb.window;
        let mut acked = segments_acked as u64;

        if window < tcb.ssthresh && acked > 0 {
            // Slow start, bounded by ssthresh. Leftover acked segments are
            // carried into congestion avoidance.
            let grown = cmp::min(window.saturating_add(acked.saturating_mul(seg)), tcb.ssthresh);
            acked = acked.saturating_sub((grown - window) / seg);
            window = grown;
            trace!("{}. slow start, window = {}", self.name(), window);
        }

        if window >= tcb.ssthresh && acked > 0 {
            // Congestion avoidance.
            let adder = cmp::max(1, seg.saturating_mul(seg) / cmp::max(window, 1));
            window = window.saturating_add(adder);
            trace!("{}. congestion avoidance, window = {}", self.name(), window);
        }

        window.clamp(seg, cmp::max(self.max_window, seg))
    }
}

/// NewReno used on its own, without receive-side coordination.
#[derive(Debug)]
pub struct NewReno {
    growth: DefaultLinearGrowth,
}

impl NewReno {
    pub fn new(max_window: u64) -> Self {
        Self {
            growth: DefaultLinearGrowth::new(max_window),
        }
    }
}

impl WindowController for NewReno {
    fn name(&self) -> &str {
        self.growth.name()
    }

    fn increase_window(&mut self, now: Instant, tcb: &TransportState, segments_acked: u32) -> u64 {
        self.growth.grow(now, tcb, segments_acked)
    }

    fn ssthresh(&self, tcb: &TransportState, bytes_in_flight: u64) -> u64 {
        cmp::max(bytes_in_flight / 2, 2 * tcb.segment_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slow_start() {
        let mut g = DefaultLinearGrowth::new(u64::MAX);
        let now = Instant::now();
        let mut tcb = TransportState::new(1, 4);

        // (segments acked, window)
        for (acked, window) in [(0, 4), (1, 5), (3, 8), (8, 16)] {
            tcb.window = g.grow(now, &tcb, acked);
            assert_eq!(tcb.window, window);
        }
    }

    #[test]
    fn slow_start_into_congestion_avoidance() {
        let mut g = DefaultLinearGrowth::new(u64::MAX);
        let now = Instant::now();
        let mut tcb = TransportState::new(100, 4);
        tcb.ssthresh = 600;

        // 2 of the 5 acked segments reach ssthresh, the rest is used in
        // congestion avoidance: 600 + 100 * 100 / 600.
        assert_eq!(g.grow(now, &tcb, 5), 616);

        // Congestion avoidance from the start.
        tcb.window = 1000;
        for (acked, window) in [(0, 1000), (1, 1010), (10, 1010)] {
            assert_eq!(g.grow(now, &tcb, acked), window);
        }
    }

    #[test]
    fn window_bounds() {
        let mut g = DefaultLinearGrowth::new(5000);
        let now = Instant::now();
        let mut tcb = TransportState::new(1460, 3);
        assert_eq!(g.grow(now, &tcb, 2), 5000);

        tcb.window = 0;
        assert_eq!(g.grow(now, &tcb, 0), 1460);
    }

    #[test]
    fn new_reno_controller() {
        let mut cc = NewReno::new(u64::MAX);
        let now = Instant::now();
        let tcb = TransportState::new(1460, 10);

        assert_eq!(cc.name(), "NEWRENO");
        assert_eq!(cc.increase_window(now, &tcb, 1), 16060);

        for (in_flight, ssthresh) in [(0, 2920), (4000, 2920), (14600, 7300)] {
            assert_eq!(cc.ssthresh(&tcb, in_flight), ssthresh);
        }
    }
}
