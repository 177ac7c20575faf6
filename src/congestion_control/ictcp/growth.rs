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
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use log::*;

use super::Adjustment;
use super::WindowAdjuster;
use crate::congestion_control::TransportState;
use crate::congestion_control::WindowGrowthStrategy;
use crate::connection::ConnectionRecord;
use crate::link::FlowId;
use crate::link::Link;
use crate::trace::WindowEvent;
use crate::Config;
use crate::Result;

/// Window growth governed by per-connection throughput and the shared link
/// state. Called once per completed RTT cycle.
#[derive(Debug)]
pub struct IncastAwareGrowth {
    /// Per-connection measurements.
    record: ConnectionRecord,

    /// Per-RTT decision function.
    adjuster: WindowAdjuster,

    /// The shared link state.
    link: Arc<Link>,

    /// The slot of this connection on the link.
    flow: FlowId,

    /// Receive window ceiling in bytes.
    max_window: u64,

    /// Decision of the latest call to `grow`.
    last_adjustment: Option<Adjustment>,

    /// Events waiting to be delivered to an observer.
    events: VecDeque<WindowEvent>,

    /// Whether events are buffered.
    tracing: bool,
}

impl IncastAwareGrowth {
    /// Create a growth strategy and register a new flow on the link.
    pub fn new(conf: &Config, link: Arc<Link>) -> Result<Self> {
        conf.validate()?;
        let flow = link.register_flow();

        Ok(Self {
            record: ConnectionRecord::new(conf.beta, conf.bandwidth_filter_enabled),
            adjuster: WindowAdjuster::new(conf),
            link,
            flow,
            max_window: conf.max_receive_window,
            last_adjustment: None,
            events: VecDeque::new(),
            tracing: false,
        })
    }

    pub fn record(&self) -> &ConnectionRecord {
        &self.record
    }

    pub fn flow(&self) -> FlowId {
        self.flow
    }

    pub fn link(&self) -> &Arc<Link> {
        &self.link
    }

    pub fn last_adjustment(&self) -> Option<Adjustment> {
        self.last_adjustment
    }

    /// Account an ack carrying `bytes` of new data and an RTT sample.
    pub(crate) fn on_ack(&mut self, bytes: u64, rtt: Duration) {
        self.record.on_delivered(bytes);
        self.record.rtt.on_sample(rtt);
    }

    /// Start a new RTT cycle ending at `right_edge`.
    pub(crate) fn start_cycle(&mut self, right_edge: u64) {
        self.record.start_cycle(right_edge);
    }

    pub(crate) fn set_tracing(&mut self, enabled: bool) {
        self.tracing = enabled;
        if !enabled {
            self.events.clear();
        }
    }

    /// Take the next buffered event.
    pub(crate) fn next_event(&mut self) -> Option<WindowEvent> {
        self.events.pop_front()
    }

    fn emit(&mut self, event: WindowEvent) {
        if self.tracing {
            self.events.push_back(event);
        }
    }
}

impl WindowGrowthStrategy for IncastAwareGrowth {
    fn name(&self) -> &str {
        "ICTCP"
    }

    fn grow(&mut self, now: Instant, tcb: &TransportState, _segments_acked: u32) -> u64 {
        let seg = cmp::max(tcb.segment_size, 1);
        let ceiling = cmp::max(self.max_window, seg);

        let rtt = match self.record.rtt.min_rtt() {
            Some(v) => v,
            None => {
                debug!("{}. {:?} no rtt sample in cycle", self.name(), self.flow);
                return tcb.window;
            }
        };

        let delivered = self.record.delivered;
        if let Err(e) = self.link.report_flow(self.flow, delivered, rtt) {
            warn!("{}. {:?} report failed: {:?}", self.name(), self.flow, e);
        }

        let sample = self.record.throughput.on_round(delivered, rtt, tcb.window);
        self.emit(WindowEvent::ThroughputSampled {
            rtt_us: rtt.as_micros() as u64,
            sample: sample.sample,
            measured: sample.measured,
            expected: sample.expected,
            deficit: sample.deficit,
            filtered: sample.filtered,
        });

        let view = self.link.slot(now);
        self.record.quota_share = self.link.flow_weight(self.flow).unwrap_or(0.0);

        let headroom = (ceiling.saturating_sub(tcb.window) / seg).min(u32::MAX as u64) as u32;
        let link = &self.link;
        let adjustment = self.adjuster.adjust(
            now,
            &mut self.record,
            &sample,
            seg,
            view.phase,
            headroom,
            |want| link.try_claim(&view, want),
        );
        self.last_adjustment = Some(adjustment);

        let old = tcb.window;
        let window = match adjustment {
            Adjustment::Increase(n) => old.saturating_add(n as u64 * seg),
            Adjustment::Decrease => old.saturating_sub(seg),
            Adjustment::Hold(_) => old,
        }
        .clamp(seg, ceiling);

        trace!(
            "{}. {:?} db={:.3} bs={:.0} bm={:.0} be={:.0} phase={:?} -> {:?}",
            self.name(),
            self.flow,
            sample.deficit,
            sample.sample,
            sample.measured,
            sample.expected,
            view.phase,
            adjustment
        );

        match adjustment {
            Adjustment::Increase(granted) => {
                debug!("{}. {:?} window {} -> {}", self.name(), self.flow, old, window);
                self.emit(WindowEvent::WindowIncreased {
                    old,
                    new: window,
                    granted,
                });
            }
            Adjustment::Decrease => {
                debug!("{}. {:?} window {} -> {}", self.name(), self.flow, old, window);
                self.emit(WindowEvent::WindowDecreased { old, new: window });
            }
            Adjustment::Hold(reason) => {
                self.emit(WindowEvent::WindowHeld { window, reason });
            }
        }

        window
    }
}

impl Drop for IncastAwareGrowth {
    fn drop(&mut self) {
        if let Err(e) = self.link.release_flow(self.flow) {
            warn!("{}. {:?} release failed: {:?}", self.name(), self.flow, e);
        }
    }
}
