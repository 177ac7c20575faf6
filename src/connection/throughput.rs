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

//! Per-connection throughput estimation.
//!
//! Once per RTT the receiver samples the throughput of a connection as
//! `bs = delivered / rtt` and folds it into the measured throughput:
//!
//! `bm_new = max(bs, beta * bm_old + (1 - beta) * bs)`
//!
//! The max makes `bm` follow a real increase at once, so a just-granted
//! window increase is reflected immediately, while decreases are smoothed.
//! The expected throughput `be = max(bm, rwnd / rtt)` is what the current
//! window would allow, and the deficit ratio `db = (be - bm) / be` tells how
//! much of the window goes unused.

use std::time::Duration;

/// Tustin filter gain of the secondary bandwidth filter.
const TUSTIN_ALPHA: f64 = 0.9;

/// Outcome of one per-RTT throughput sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThroughputSample {
    /// The RTT used for this sample.
    pub rtt: Duration,

    /// Raw throughput sample `bs` in bytes per second.
    pub sample: f64,

    /// Measured throughput `bm` in bytes per second.
    pub measured: f64,

    /// Expected throughput `be` in bytes per second.
    pub expected: f64,

    /// Deficit ratio `db`, in [0, 1].
    pub deficit: f64,

    /// Output of the secondary bandwidth filter, if enabled.
    pub filtered: Option<f64>,
}

impl ThroughputSample {
    /// The throughput gap `(be - bm) * rtt`, expressed as a window in bytes.
    pub fn gap_bytes(&self) -> f64 {
        (self.expected - self.measured) * self.rtt.as_secs_f64()
    }
}

/// Throughput estimator of a connection.
#[derive(Debug, Clone)]
pub struct ThroughputEstimator {
    /// EWMA factor.
    beta: f64,

    /// Measured throughput `bm` in bytes per second.
    measured: f64,

    /// The previous raw sample `bs`.
    last_sample: Option<f64>,

    /// Secondary filter state. None if the filter is disabled.
    filtered: Option<f64>,

    /// Whether the secondary filter is enabled.
    filter_enabled: bool,
}

impl ThroughputEstimator {
    pub fn new(beta: f64, filter_enabled: bool) -> Self {
        Self {
            beta,
            measured: 0.0,
            last_sample: None,
            filtered: None,
            filter_enabled,
        }
    }

    /// Fold the bytes delivered over the last RTT into the estimation and
    /// derive the expected throughput and deficit ratio for the given
    /// receive window.
    pub fn on_round(&mut self, delivered: u64, rtt: Duration, window: u64) -> ThroughputSample {
        let secs = rtt.max(Duration::from_micros(1)).as_secs_f64();
        let sample = delivered as f64 / secs;

        let smoothed = self.beta * self.measured + (1.0 - self.beta) * sample;
        self.measured = sample.max(smoothed);

        if self.filter_enabled {
            self.filtered = Some(match (self.filtered, self.last_sample) {
                (Some(bw), Some(last)) => {
                    TUSTIN_ALPHA * bw + (1.0 - TUSTIN_ALPHA) * (sample + last) / 2.0
                }
                _ => sample,
            });
        }
        self.last_sample = Some(sample);

        let expected = self.measured.max(window as f64 / secs);
        let deficit = if expected <= 0.0 {
            0.0
        } else {
            ((expected - self.measured) / expected).clamp(0.0, 1.0)
        };

        ThroughputSample {
            rtt,
            sample,
            measured: self.measured,
            expected,
            deficit,
            filtered: self.filtered,
        }
    }

    /// Return the measured throughput `bm` in bytes per second.
    pub fn measured(&self) -> f64 {
        self.measured
    }

    /// Return the previous raw sample.
    pub fn last_sample(&self) -> Option<f64> {
        self.last_sample
    }

    /// Return the output of the secondary bandwidth filter.
    pub fn filtered_bandwidth(&self) -> Option<f64> {
        self.filtered
    }
}
