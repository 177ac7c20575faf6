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

use std::cmp;
use std::time::Duration;

/// RTT bookkeeping for a connection under receive window control.
///
/// The tracker min-filters the samples of the current measurement cycle to
/// find the current propagation plus queueing delay (`min_rtt`). Taking the
/// minimum avoids the effects of delayed ACKs. It also min-filters all
/// samples seen to find the propagation delay (`base_rtt`).
#[derive(Debug, Clone)]
pub struct RttTracker {
    /// The most recent valid RTT sample.
    latest_rtt: Option<Duration>,

    /// The minimum RTT in the current cycle. `Duration::MAX` when the cycle
    /// has no sample yet.
    min_rtt: Duration,

    /// The minimum RTT over the connection lifetime.
    base_rtt: Duration,

    /// Number of samples in the current cycle.
    sample_count: u32,
}

impl RttTracker {
    pub fn new() -> Self {
        Self {
            latest_rtt: None,
            min_rtt: Duration::MAX,
            base_rtt: Duration::MAX,
            sample_count: 0,
        }
    }

    /// Feed an RTT sample. Zero samples are discarded.
    ///
    /// Return true if the sample was accepted.
    pub fn on_sample(&mut self, rtt: Duration) -> bool {
        if rtt.is_zero() {
            return false;
        }

        self.latest_rtt = Some(rtt);
        self.min_rtt = cmp::min(self.min_rtt, rtt);
        self.base_rtt = cmp::min(self.base_rtt, rtt);
        self.sample_count = self.sample_count.saturating_add(1);
        true
    }

    /// Start a new measurement cycle. The lifetime minimum is kept.
    pub fn reset_cycle(&mut self) {
        self.min_rtt = Duration::MAX;
        self.sample_count = 0;
    }

    /// Return the minimum RTT of the current cycle, if any sample was taken.
    pub fn min_rtt(&self) -> Option<Duration> {
        if self.min_rtt == Duration::MAX {
            return None;
        }
        Some(self.min_rtt)
    }

    /// Return the minimum RTT observed over the connection lifetime.
    pub fn base_rtt(&self) -> Option<Duration> {
        if self.base_rtt == Duration::MAX {
            return None;
        }
        Some(self.base_rtt)
    }

    /// Return the latest valid RTT sample.
    pub fn latest_rtt(&self) -> Option<Duration> {
        self.latest_rtt
    }

    /// Return the number of samples in the current cycle.
    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }
}

impl Default for RttTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial() {
        let r = RttTracker::new();
        assert_eq!(r.min_rtt(), None);
        assert_eq!(r.base_rtt(), None);
        assert_eq!(r.latest_rtt(), None);
        assert_eq!(r.sample_count(), 0);
    }

    #[test]
    fn zero_sample_ignored() {
        let mut r = RttTracker::new();
        assert!(!r.on_sample(Duration::ZERO));
        assert_eq!(r.min_rtt(), None);
        assert_eq!(r.sample_count(), 0);
    }

    #[test]
    fn update() {
        let mut r = RttTracker::new();

        // (sample, min_rtt, base_rtt, sample_count)
        for (sample, min_rtt, base_rtt, count) in [
            (400, 400, 400, 1),
            (700, 400, 400, 2),
            (225, 225, 225, 3),
            (300, 225, 225, 4),
        ] {
            assert!(r.on_sample(Duration::from_micros(sample)));
            assert_eq!(r.latest_rtt(), Some(Duration::from_micros(sample)));
            assert_eq!(r.min_rtt(), Some(Duration::from_micros(min_rtt)));
            assert_eq!(r.base_rtt(), Some(Duration::from_micros(base_rtt)));
            assert_eq!(r.sample_count(), count);
        }

        // A new cycle forgets the cycle minimum but not the lifetime one.
        r.reset_cycle();
        assert_eq!(r.min_rtt(), None);
        assert_eq!(r.sample_count(), 0);
        assert_eq!(r.base_rtt(), Some(Duration::from_micros(225)));

        for (sample, min_rtt, base_rtt) in [(500, 500, 225), (250, 250, 225), (100, 100, 100)] {
            r.on_sample(Duration::from_micros(sample));
            assert_eq!(r.min_rtt(), Some(Duration::from_micros(min_rtt)));
            assert_eq!(r.base_rtt(), Some(Duration::from_micros(base_rtt)));
        }
    }

    #[test]
    fn minimum_is_order_independent() {
        let samples = [310_u64, 120, 560, 90, 90, 240, 1000, 95];

        let mut forward = RttTracker::new();
        let mut backward = RttTracker::new();
        let mut last_min = Duration::MAX;
        for (a, b) in samples.iter().zip(samples.iter().rev()) {
            forward.on_sample(Duration::from_micros(*a));
            backward.on_sample(Duration::from_micros(*b));

            // Non-increasing over time.
            let min_rtt = forward.min_rtt().unwrap();
            assert!(min_rtt <= last_min);
            last_min = min_rtt;
        }

        assert_eq!(forward.min_rtt(), Some(Duration::from_micros(90)));
        assert_eq!(forward.min_rtt(), backward.min_rtt());
        assert_eq!(forward.base_rtt(), backward.base_rtt());
    }
}
