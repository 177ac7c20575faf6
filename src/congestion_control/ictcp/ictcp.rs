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

//! ICTCP: incast congestion control for TCP in data-center networks.
//!
//! The receiver adjusts its advertised window per connection from the
//! measured throughput deficit, and shares the spare capacity of its
//! last-hop link among connections with a per-slot growth quota.
//!
//! See "ICTCP: Incast Congestion Control for TCP in Data-Center Networks",
//! IEEE/ACM Transactions on Networking, 2013.

use std::cmp;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use log::*;

use super::CongestionState;
use super::TransportState;
use super::WindowController;
use super::WindowGrowthStrategy;
use crate::congestion_control::DefaultLinearGrowth;
use crate::connection::ConnectionRecord;
use crate::link::FlowId;
use crate::link::Link;
use crate::trace::EventObserver;
use crate::trace::WindowEvent;
use crate::Config;
use crate::Result;

pub use adjuster::Adjustment;
pub use adjuster::HoldReason;
pub use adjuster::WindowAdjuster;
pub use growth::IncastAwareGrowth;

/// Whether the policy governs a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    /// The connection is recovering from loss. Growth is left to the
    /// default linear growth.
    Disabled,

    /// Enabled, but the current cycle may not have enough RTT samples.
    /// Growth is left to the default linear growth until a cycle completes
    /// with enough samples.
    Sampling,

    /// The window is adjusted once per completed cycle.
    Governing,
}

/// ICTCP receive window controller of one connection.
pub struct IcTcp {
    /// Current control state.
    state: ControlState,

    /// A cycle needs more than this many RTT samples to be governed.
    min_samples_required: u32,

    /// Growth used while the policy does not govern the connection.
    fallback: DefaultLinearGrowth,

    /// Growth used while the policy governs the connection.
    incast: IncastAwareGrowth,

    /// Receiver of window events.
    observer: Option<Box<dyn EventObserver + Send>>,
}

impl IcTcp {
    /// Create a controller for a new connection on `link`. The connection is
    /// registered on the link until the controller is dropped.
    pub fn new(conf: &Config, link: Arc<Link>) -> Result<Self> {
        let incast = IncastAwareGrowth::new(conf, link)?;
        debug!("ICTCP. {:?} registered", incast.flow());

        Ok(Self {
            state: ControlState::Sampling,
            min_samples_required: conf.min_samples_required,
            fallback: DefaultLinearGrowth::new(conf.max_receive_window),
            incast,
            observer: None,
        })
    }

    /// Install a receiver of window events.
    pub fn set_observer(&mut self, observer: Box<dyn EventObserver + Send>) {
        self.observer = Some(observer);
        self.incast.set_tracing(true);
    }

    pub fn state(&self) -> ControlState {
        self.state
    }

    /// Return whether the policy is enabled on the connection.
    pub fn is_active(&self) -> bool {
        self.state != ControlState::Disabled
    }

    pub fn flow(&self) -> FlowId {
        self.incast.flow()
    }

    pub fn record(&self) -> &ConnectionRecord {
        self.incast.record()
    }

    /// Return the decision of the latest governed cycle.
    pub fn last_adjustment(&self) -> Option<Adjustment> {
        self.incast.last_adjustment()
    }

    fn emit(&mut self, event: WindowEvent) {
        if let Some(observer) = self.observer.as_mut() {
            observer.on_event(self.incast.flow(), &event);
        }
    }

    /// Deliver events buffered by the incast-aware growth.
    fn flush_events(&mut self) {
        while let Some(event) = self.incast.next_event() {
            self.emit(event);
        }
    }
}

impl WindowController for IcTcp {
    fn name(&self) -> &str {
        "ICTCP"
    }

    fn on_ack(&mut self, _now: Instant, tcb: &TransportState, segments_acked: u32, rtt: Duration) {
        if self.state == ControlState::Disabled {
            return;
        }

        // An invalid RTT sample is dropped, the data it acked still counts.
        let bytes = (segments_acked as u64).saturating_mul(tcb.segment_size);
        self.incast.on_ack(bytes, rtt);
    }

    fn on_congestion_state_change(&mut self, tcb: &TransportState, state: CongestionState) {
        match (state, self.state) {
            (CongestionState::Open, ControlState::Disabled) => {
                self.state = ControlState::Sampling;
                self.incast.start_cycle(tcb.next_tx_seq);
                info!(
                    "{}. {:?} enabled, cycle ends at {}",
                    self.name(),
                    self.flow(),
                    tcb.next_tx_seq
                );
                self.emit(WindowEvent::PolicyEnabled {
                    cycle_right_edge: tcb.next_tx_seq,
                });
            }

            (CongestionState::Open, _) | (_, ControlState::Disabled) => (),

            (_, _) => {
                self.state = ControlState::Disabled;
                info!("{}. {:?} disabled in {:?}", self.name(), self.flow(), state);
                self.emit(WindowEvent::PolicyDisabled {
                    congestion_state: state,
                });
            }
        }
    }

    fn increase_window(&mut self, now: Instant, tcb: &TransportState, segments_acked: u32) -> u64 {
        if self.state == ControlState::Disabled {
            return self.fallback.grow(now, tcb, segments_acked);
        }

        if !self.incast.record().cycle_completed(tcb.last_acked_seq) {
            return match self.state {
                ControlState::Governing => tcb.window,
                _ => self.fallback.grow(now, tcb, segments_acked),
            };
        }

        let samples = self.incast.record().rtt().sample_count();
        let window = if samples <= self.min_samples_required {
            if self.state == ControlState::Governing {
                debug!("{}. {:?} too few rtt samples {}", self.name(), self.flow(), samples);
            }
            self.state = ControlState::Sampling;

            let window = self.fallback.grow(now, tcb, segments_acked);
            self.emit(WindowEvent::FallbackGrowth {
                rtt_samples: samples,
                window,
            });
            window
        } else {
            if self.state == ControlState::Sampling {
                debug!("{}. {:?} governing", self.name(), self.flow());
            }
            self.state = ControlState::Governing;

            let window = self.incast.grow(now, tcb, segments_acked);
            self.flush_events();
            window
        };

        self.incast.start_cycle(tcb.next_tx_seq);
        window
    }

    fn ssthresh(&self, tcb: &TransportState, _bytes_in_flight: u64) -> u64 {
        let seg = tcb.segment_size;
        cmp::max(
            cmp::min(tcb.ssthresh, tcb.window.saturating_sub(seg)),
            seg.saturating_mul(2),
        )
    }
}

impl std::fmt::Debug for IcTcp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ICTCP {:?} {:?}", self.flow(), self.state)
    }
}


mod adjuster;
mod growth;
