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

//! Telemetry events about receive window decisions.
//!
//! Events are delivered to an [`EventObserver`] installed on a controller.
//! They are serializable in the same `{"name": ..., "data": ...}` shape as
//! qlog events.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Deserialize;
use serde::Serialize;

use crate::congestion_control::CongestionState;
use crate::congestion_control::HoldReason;
use crate::link::FlowId;
use crate::Error;
use crate::Result;

#[serde_with::skip_serializing_none]
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "name", content = "data")]
pub enum WindowEvent {
    /// The policy started governing the connection.
    #[serde(rename = "ictcp:policy_enabled")]
    PolicyEnabled { cycle_right_edge: u64 },

    /// The policy handed the connection back to the default growth.
    #[serde(rename = "ictcp:policy_disabled")]
    PolicyDisabled { congestion_state: CongestionState },

    /// A cycle had too few RTT samples and fell back to default growth.
    #[serde(rename = "ictcp:fallback_growth")]
    FallbackGrowth { rtt_samples: u32, window: u64 },

    /// A per-RTT throughput sample was taken.
    #[serde(rename = "ictcp:throughput_sampled")]
    ThroughputSampled {
        rtt_us: u64,
        sample: f64,
        measured: f64,
        expected: f64,
        deficit: f64,
        filtered: Option<f64>,
    },

    /// The receive window grew.
    #[serde(rename = "ictcp:window_increased")]
    WindowIncreased { old: u64, new: u64, granted: u32 },

    /// The receive window shrank.
    #[serde(rename = "ictcp:window_decreased")]
    WindowDecreased { old: u64, new: u64 },

    /// The receive window was held.
    #[serde(rename = "ictcp:window_held")]
    WindowHeld { window: u64, reason: HoldReason },
}

/// Receiver of window events.
pub trait EventObserver {
    /// Called for every event of the flow.
    fn on_event(&mut self, flow: FlowId, event: &WindowEvent);
}

/// An observer buffering events for later polling. Clones share the buffer.
#[derive(Clone, Default)]
pub struct EventQueue(Arc<Mutex<VecDeque<(FlowId, WindowEvent)>>>);

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the oldest buffered event.
    pub fn poll(&self) -> Result<(FlowId, WindowEvent)> {
        self.0.lock().pop_front().ok_or(Error::Done)
    }

    /// Return the number of buffered events.
    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    /// Check whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }
}

impl EventObserver for EventQueue {
    fn on_event(&mut self, flow: FlowId, event: &WindowEvent) {
        self.0.lock().push_back((flow, event.clone()));
    }
}
