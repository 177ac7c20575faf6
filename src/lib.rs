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

//! An incast-aware receive window control policy for TCP (ICTCP).
//!
//! In data center incast, many senders answer a single receiver at once and
//! overflow the switch buffer in front of it. ICTCP lets the receiver, not the
//! senders, govern how fast each connection's advertised receive window may
//! grow:
//!
//! * The receiver measures the total incoming traffic on the interface as
//!   `BWT` and derives the available bandwidth `BWA = max(0, alpha*C - BWT)`.
//! * Time is divided into slots of `2T`. The first sub-slot of `T` measures
//!   `BWA`; in the second one, connections may grow their windows as long as
//!   the shared quota derived from `BWA` lasts.
//! * Once per RTT each connection compares its measured throughput against
//!   the throughput its window would allow, and grows, shrinks or holds its
//!   window depending on the deficit ratio.
//!
//! The crate is a decision layer only. The host transport stack feeds it
//! acknowledgment, RTT and congestion state events through
//! [`WindowController`], and applies the returned windows.
//!
//! ## Get started
//!
//! ```
//! use std::sync::Arc;
//! use std::time::{Duration, Instant};
//!
//! use ictcp::{CongestionState, Config, IcTcp, Link, TransportState, WindowController};
//!
//! let conf = Config::new();
//! let now = Instant::now();
//! let link = Arc::new(Link::new(&conf, now)?);
//!
//! let mut cc = IcTcp::new(&conf, link.clone())?;
//! let mut tcb = TransportState::new(1460, 10);
//! cc.on_congestion_state_change(&tcb, CongestionState::Open);
//!
//! tcb.last_acked_seq += 1460;
//! cc.on_ack(now, &tcb, 1, Duration::from_micros(200));
//! tcb.window = cc.increase_window(now, &tcb, 1);
//! # Ok::<(), ictcp::Error>(())
//! ```

use std::time::Duration;

/// The default maximum segment size in bytes.
pub const DEFAULT_SEGMENT_SIZE: u64 = 1460;

/// Fraction of the link capacity that may be allocated to receive windows.
/// The remaining headroom absorbs bursts and oversubscription.
const DEFAULT_ALPHA: f64 = 0.9;

/// Weight of the previous measured throughput in the EWMA filter.
const DEFAULT_BETA: f64 = 0.85;

/// Deficit ratio at or below which the window may grow.
const DEFAULT_GAMMA1: f64 = 0.1;

/// Deficit ratio above which the window is a candidate for decrease.
const DEFAULT_GAMMA2: f64 = 0.5;

/// Two increases on the same connection are at least this many RTTs apart.
const DEFAULT_MIN_INCREASE_SPACING_RTTS: u32 = 2;

/// A measurement cycle needs strictly more RTT samples than this to be used.
/// Fewer samples may all come from delayed ACKs and bias the RTT minimum.
const DEFAULT_MIN_SAMPLES_REQUIRED: u32 = 2;

/// Number of consecutive high-deficit RTTs that trigger a decrease.
const DEFAULT_DECREASE_TRIGGER_RTTS: u32 = 3;

/// Default link capacity in bytes per second (1 Gbps).
const DEFAULT_LINK_CAPACITY: u64 = 125_000_000;

/// Lower bound of the slot duration `T`.
const DEFAULT_MIN_SLOT_DURATION: Duration = Duration::from_millis(1);

/// Minimum measured time behind an incoming rate sample. Shorter measuring
/// sub-slots are accumulated until they cover it.
const DEFAULT_BANDWIDTH_SAMPLE_WINDOW: Duration = Duration::from_millis(2);

/// Max number of segments granted by a single increase.
const DEFAULT_MAX_INCREASE_PER_STEP: u32 = 1;

/// Default ceiling of the receive window in bytes.
const DEFAULT_MAX_RECEIVE_WINDOW: u64 = 1024 * 1024;

/// Result type for receive window control operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Configurations about the receive window control policy and the shared
/// link it governs.
#[derive(Debug, Clone)]
pub struct Config {
    /// The window control algorithm built by [`build_window_controller`].
    algorithm: ReceiveWindowAlgorithm,

    /// Absorption factor, the share of the capacity usable by windows.
    alpha: f64,

    /// EWMA factor of the measured throughput.
    beta: f64,

    /// Increase threshold of the deficit ratio.
    gamma1: f64,

    /// Decrease threshold of the deficit ratio.
    gamma2: f64,

    /// Minimum spacing between two increases, in RTTs.
    min_increase_spacing_rtts: u32,

    /// RTT samples a cycle must exceed to be used.
    min_samples_required: u32,

    /// Consecutive high-deficit RTTs before a decrease.
    decrease_trigger_rtts: u32,

    /// Link capacity in bytes per second.
    link_capacity: u64,

    /// Lower bound of the slot duration.
    min_slot_duration: Duration,

    /// Minimum measured time of an incoming rate sample.
    bandwidth_sample_window: Duration,

    /// Max segments granted per increase.
    max_increase_per_step: u32,

    /// Receive window ceiling in bytes.
    max_receive_window: u64,

    /// Segment size used to convert available bandwidth into growth quota.
    segment_size: u64,

    /// Enable the secondary Tustin bandwidth filter.
    bandwidth_filter_enabled: bool,
}

impl Config {
    /// Create default configuration.
    ///
    /// The configuration may be customized by calling related set methods.
    pub fn new() -> Self {
        Self {
            algorithm: ReceiveWindowAlgorithm::IcTcp,
            alpha: DEFAULT_ALPHA,
            beta: DEFAULT_BETA,
            gamma1: DEFAULT_GAMMA1,
            gamma2: DEFAULT_GAMMA2,
            min_increase_spacing_rtts: DEFAULT_MIN_INCREASE_SPACING_RTTS,
            min_samples_required: DEFAULT_MIN_SAMPLES_REQUIRED,
            decrease_trigger_rtts: DEFAULT_DECREASE_TRIGGER_RTTS,
            link_capacity: DEFAULT_LINK_CAPACITY,
            min_slot_duration: DEFAULT_MIN_SLOT_DURATION,
            bandwidth_sample_window: DEFAULT_BANDWIDTH_SAMPLE_WINDOW,
            max_increase_per_step: DEFAULT_MAX_INCREASE_PER_STEP,
            max_receive_window: DEFAULT_MAX_RECEIVE_WINDOW,
            segment_size: DEFAULT_SEGMENT_SIZE,
            bandwidth_filter_enabled: false,
        }
    }

    /// Set the window control algorithm.
    /// The default value is `ReceiveWindowAlgorithm::IcTcp`.
    pub fn set_algorithm(&mut self, v: ReceiveWindowAlgorithm) {
        self.algorithm = v;
    }

    /// Set the absorption factor alpha, in (0, 1].
    /// The default value is `0.9`.
    pub fn set_alpha(&mut self, v: f64) {
        self.alpha = v;
    }

    /// Set the EWMA factor beta of the measured throughput, in (0, 1).
    /// The default value is `0.85`.
    pub fn set_beta(&mut self, v: f64) {
        self.beta = v;
    }

    /// Set the deficit ratio threshold at or below which the window may grow.
    /// The default value is `0.1`.
    pub fn set_gamma1(&mut self, v: f64) {
        self.gamma1 = v;
    }

    /// Set the deficit ratio threshold above which the window may shrink.
    /// The default value is `0.5`.
    pub fn set_gamma2(&mut self, v: f64) {
        self.gamma2 = v;
    }

    /// Set the minimum spacing between two increases, in RTTs.
    /// The default value is `2`.
    pub fn set_min_increase_spacing_rtts(&mut self, v: u32) {
        self.min_increase_spacing_rtts = v;
    }

    /// Set the number of RTT samples a measurement cycle must exceed before
    /// it is used for window adjustment. The default value is `2`.
    pub fn set_min_samples_required(&mut self, v: u32) {
        self.min_samples_required = v;
    }

    /// Set the number of consecutive high-deficit RTTs that trigger a
    /// decrease. The default value is `3`.
    pub fn set_decrease_trigger_rtts(&mut self, v: u32) {
        self.decrease_trigger_rtts = v;
    }

    /// Set the link capacity in bytes per second.
    /// The default value is `125000000` (1 Gbps).
    pub fn set_link_capacity(&mut self, v: u64) {
        self.link_capacity = v;
    }

    /// Set the lower bound of the slot duration in microseconds.
    /// The default value is `1000`.
    pub fn set_min_slot_duration(&mut self, v: u64) {
        self.min_slot_duration = Duration::from_micros(v);
    }

    /// Set the minimum measured time of an incoming rate sample in
    /// microseconds.
    /// The default value is `2000`.
    pub fn set_bandwidth_sample_window(&mut self, v: u64) {
        self.bandwidth_sample_window = Duration::from_micros(v);
    }

    /// Set the max number of segments granted by a single increase.
    /// The default value is `1`.
    pub fn set_max_increase_per_step(&mut self, v: u32) {
        self.max_increase_per_step = v;
    }

    /// Set the receive window ceiling in bytes.
    /// The default value is `1048576`.
    pub fn set_max_receive_window(&mut self, v: u64) {
        self.max_receive_window = v;
    }

    /// Set the segment size used to convert available bandwidth into growth
    /// quota. The default value is `1460`.
    pub fn set_segment_size(&mut self, v: u64) {
        self.segment_size = v;
    }

    /// Enable the secondary bandwidth filter. It is observational only and
    /// does not change window decisions. The default value is false.
    pub fn enable_bandwidth_filter(&mut self, v: bool) {
        self.bandwidth_filter_enabled = v;
    }

    /// Check the configuration for inconsistencies.
    pub fn validate(&self) -> Result<()> {
        if !(self.alpha > 0.0 && self.alpha <= 1.0) {
            return Err(Error::InvalidConfig(format!("alpha {} out of (0, 1]", self.alpha)));
        }
        if !(self.beta > 0.0 && self.beta < 1.0) {
            return Err(Error::InvalidConfig(format!("beta {} out of (0, 1)", self.beta)));
        }
        if !(self.gamma1 >= 0.0 && self.gamma2 <= 1.0) {
            return Err(Error::InvalidConfig("gamma out of [0, 1]".into()));
        }
        if self.gamma1 >= self.gamma2 {
            return Err(Error::InvalidConfig(format!(
                "gamma1 {} >= gamma2 {}",
                self.gamma1, self.gamma2
            )));
        }
        if self.min_increase_spacing_rtts == 0 || self.decrease_trigger_rtts == 0 {
            return Err(Error::InvalidConfig("zero rtt count".into()));
        }
        if self.link_capacity == 0 {
            return Err(Error::InvalidConfig("zero link capacity".into()));
        }
        if self.min_slot_duration.is_zero() || self.bandwidth_sample_window.is_zero() {
            return Err(Error::InvalidConfig("zero duration".into()));
        }
        if self.max_increase_per_step == 0 {
            return Err(Error::InvalidConfig("zero increase step".into()));
        }
        if self.segment_size == 0 || self.max_receive_window < self.segment_size {
            return Err(Error::InvalidConfig(format!(
                "max receive window {} below segment size {}",
                self.max_receive_window, self.segment_size
            )));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_default() {
        let conf = Config::default();
        assert_eq!(conf.algorithm, ReceiveWindowAlgorithm::IcTcp);
        assert_eq!(conf.alpha, 0.9);
        assert_eq!(conf.beta, 0.85);
        assert_eq!(conf.gamma1, 0.1);
        assert_eq!(conf.gamma2, 0.5);
        assert_eq!(conf.min_increase_spacing_rtts, 2);
        assert_eq!(conf.min_samples_required, 2);
        assert_eq!(conf.decrease_trigger_rtts, 3);
        assert!(conf.validate().is_ok());
    }

    #[test]
    fn config_validate() {
        let cases: [(fn(&mut Config), bool); 10] = [
            (|c| c.set_gamma1(0.5), false),
            (|c| c.set_gamma1(0.6), false),
            (|c| c.set_gamma1(0.49), true),
            (|c| c.set_alpha(0.0), false),
            (|c| c.set_alpha(-0.1), false),
            (|c| c.set_alpha(1.0), true),
            (|c| c.set_beta(0.0), false),
            (|c| c.set_beta(1.0), false),
            (|c| c.set_link_capacity(0), false),
            (|c| c.set_max_receive_window(100), false),
        ];

        for (update, valid) in cases {
            let mut conf = Config::new();
            update(&mut conf);
            assert_eq!(conf.validate().is_ok(), valid, "{:?}", conf);
        }
    }

    #[test]
    fn config_validate_error() {
        let mut conf = Config::new();
        conf.set_gamma2(0.1);
        assert_eq!(
            conf.validate(),
            Err(Error::InvalidConfig("gamma1 0.1 >= gamma2 0.1".into()))
        );
    }
}

pub use crate::congestion_control::build_window_controller;
pub use crate::congestion_control::Adjustment;
pub use crate::congestion_control::CongestionState;
pub use crate::congestion_control::ControlState;
pub use crate::congestion_control::DefaultLinearGrowth;
pub use crate::congestion_control::HoldReason;
pub use crate::congestion_control::IcTcp;
pub use crate::congestion_control::IncastAwareGrowth;
pub use crate::congestion_control::NewReno;
pub use crate::congestion_control::ReceiveWindowAlgorithm;
pub use crate::congestion_control::TransportState;
pub use crate::congestion_control::WindowAdjuster;
pub use crate::congestion_control::WindowController;
pub use crate::congestion_control::WindowGrowthStrategy;
pub use crate::connection::rtt::RttTracker;
pub use crate::connection::throughput::ThroughputEstimator;
pub use crate::connection::throughput::ThroughputSample;
pub use crate::connection::ConnectionRecord;
pub use crate::error::Error;
pub use crate::link::FlowId;
pub use crate::link::Link;
pub use crate::link::SlotPhase;
pub use crate::link::SlotView;
pub use crate::trace::EventObserver;
pub use crate::trace::EventQueue;
pub use crate::trace::WindowEvent;

#[path = "connection/connection.rs"]
pub mod connection;

#[path = "congestion_control/congestion_control.rs"]
mod congestion_control;

#[path = "link/link.rs"]
pub mod link;

pub mod error;
pub mod trace;
