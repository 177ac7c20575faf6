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

use std::time::Duration;
use std::time::Instant;

use log::*;

/// Incoming bandwidth monitor of a network interface.
///
/// The incoming rate `BWT` is measured over measuring sub-slots only: the
/// link opens a measurement when a measuring sub-slot starts and finishes it
/// when the sub-slot ends. Spans shorter than the sampling window are
/// accumulated across sub-slots until they cover it. The monitor derives the
/// available bandwidth `BWA = max(0, alpha * C - BWT)`.
#[derive(Debug)]
pub struct LinkBandwidthMonitor {
    /// Link capacity `C` in bytes per second.
    capacity: u64,

    /// Absorption factor.
    alpha: f64,

    /// Minimum measured span of a full sample.
    window: Duration,

    /// Start of the open measurement, if any.
    measure_start: Option<Instant>,

    /// Measured time accumulated toward the next full sample.
    span: Duration,

    /// Bytes arrived during the accumulated span.
    span_bytes: u64,

    /// Whether a full sample has been taken.
    has_full_sample: bool,

    /// Incoming rate `BWT` of the latest sample.
    incoming_rate: u64,

    /// Total bytes arrived.
    total_bytes: u64,
}

impl LinkBandwidthMonitor {
    pub fn new(capacity: u64, alpha: f64, window: Duration) -> Self {
        Self {
            capacity,
            alpha,
            window,
            measure_start: None,
            span: Duration::ZERO,
            span_bytes: 0,
            has_full_sample: false,
            incoming_rate: 0,
            total_bytes: 0,
        }
    }

    /// Account bytes arrived on the interface. Only bytes arrived while a
    /// measurement is open count toward `BWT`.
    pub fn on_bytes_arrived(&mut self, bytes: u64) {
        if self.measure_start.is_some() {
            self.span_bytes = self.span_bytes.saturating_add(bytes);
        }
        self.total_bytes = self.total_bytes.saturating_add(bytes);
    }

    /// Open a measurement at `start`, the beginning of a measuring sub-slot.
    /// A measurement still open is discarded.
    pub fn start_measurement(&mut self, start: Instant) {
        if let Some(open) = self.measure_start {
            trace!("bandwidth measurement opened at {:?} discarded", open);
        }
        self.measure_start = Some(start);
    }

    /// Return whether a measurement is open.
    pub fn is_measuring(&self) -> bool {
        self.measure_start.is_some()
    }

    /// Finish the open measurement at `end`, the end of the measuring
    /// sub-slot.
    ///
    /// The rate is updated once the accumulated span covers the sampling
    /// window. Until the first full sample, a shorter span is used as is.
    pub fn finish_measurement(&mut self, end: Instant) {
        let start = match self.measure_start.take() {
            Some(v) => v,
            None => return,
        };

        self.span = self.span.saturating_add(end.saturating_duration_since(start));
        if self.span.is_zero() {
            return;
        }

        let full = self.span >= self.window;
        if full || !self.has_full_sample {
            let rate = self.span_bytes as u128 * 1_000_000_000 / self.span.as_nanos();
            self.incoming_rate = rate.min(u64::MAX as u128) as u64;
        }

        if full {
            self.has_full_sample = true;
            self.span = Duration::ZERO;
            self.span_bytes = 0;
        }
    }

    /// Return the incoming rate `BWT` in bytes per second.
    pub fn incoming_rate(&self) -> u64 {
        self.incoming_rate
    }

    /// Return the available bandwidth `BWA` in bytes per second.
    pub fn available_bandwidth(&self) -> u64 {
        let usable = self.alpha * self.capacity as f64;
        (usable - self.incoming_rate as f64).max(0.0) as u64
    }

    /// Return the link capacity in bytes per second.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Return the total bytes arrived.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }
}
