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

#![allow(unused_variables)]

use core::str::FromStr;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use serde::Deserialize;
use serde::Serialize;

use crate::link::Link;
use crate::Config;
use crate::Error;
use crate::Result;
pub use ictcp::Adjustment;
pub use ictcp::ControlState;
pub use ictcp::HoldReason;
pub use ictcp::IcTcp;
pub use ictcp::IncastAwareGrowth;
pub use ictcp::WindowAdjuster;
pub use new_reno::DefaultLinearGrowth;
pub use new_reno::NewReno;

/// Congestion state of the host transport, as seen by the window policy.
#[derive(Serialize, Deserialize, Eq, PartialEq, Debug, Clone, Copy, Default)]
#[serde(rename_all = "snake_case")]
pub enum CongestionState {
    /// Normal state, no dubious events.
    #[default]
    Open,

    /// Dubious ACKs or SACKs were received.
    Disorder,

    /// The window was reduced on an explicit congestion notification.
    Cwr,

    /// Fast retransmit and recovery are in progress.
    Recovery,

    /// A retransmission timeout fired.
    Loss,
}

/// Transmission control block of a connection, as exposed by the host.
///
/// All sizes are in bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportState {
    /// The current receive window.
    pub window: u64,

    /// The slow start threshold.
    pub ssthresh: u64,

    /// The segment size.
    pub segment_size: u64,

    /// The highest acknowledged sequence number.
    pub last_acked_seq: u64,

    /// The next sequence number to be transmitted.
    pub next_tx_seq: u64,
}

impl TransportState {
    /// Create a transmission control block with a window of the given number
    /// of segments and no slow start threshold.
    pub fn new(segment_size: u64, initial_window: u64) -> Self {
        Self {
            window: initial_window.saturating_mul(segment_size),
            ssthresh: u64::MAX,
            segment_size,
            last_acked_seq: 0,
            next_tx_seq: 0,
        }
    }
}

/// Available receive window control algorithms.
#[repr(C)]
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default)]
pub enum ReceiveWindowAlgorithm {
    /// NewReno grows the window linearly, regardless of the other
    /// connections sharing the receiver's link.
    NewReno,

    /// ICTCP governs the window growth of every connection from the
    /// receiver side, based on the available bandwidth of the link and the
    /// throughput deficit of each connection, to avoid incast congestion.
    #[default]
    IcTcp,
}

impl FromStr for ReceiveWindowAlgorithm {
    type Err = Error;

    fn from_str(algor: &str) -> Result<ReceiveWindowAlgorithm> {
        if algor.eq_ignore_ascii_case("newreno") {
            Ok(ReceiveWindowAlgorithm::NewReno)
        } else if algor.eq_ignore_ascii_case("ictcp") {
            Ok(ReceiveWindowAlgorithm::IcTcp)
        } else {
            Err(Error::UnknownAlgorithm)
        }
    }
}

/// A window growth function.
pub trait WindowGrowthStrategy {
    /// Name of the growth function.
    fn name(&self) -> &str;

    /// Return the new window after `segments_acked` segments were acked.
    fn grow(&mut self, now: Instant, tcb: &TransportState, segments_acked: u32) -> u64;
}

/// Receive window control interfaces exposed to the host transport.
pub trait WindowController {
    /// Name of the algorithm.
    fn name(&self) -> &str;

    /// Callback for acked segments carrying an RTT sample.
    fn on_ack(&mut self, now: Instant, tcb: &TransportState, segments_acked: u32, rtt: Duration) {
    }

    /// Callback for congestion state changes.
    fn on_congestion_state_change(&mut self, tcb: &TransportState, state: CongestionState) {}

    /// Return the new window after `segments_acked` segments were acked.
    fn increase_window(&mut self, now: Instant, tcb: &TransportState, segments_acked: u32)
        -> u64;

    /// Return the slow start threshold after a congestion event.
    fn ssthresh(&self, tcb: &TransportState, bytes_in_flight: u64) -> u64;
}

impl fmt::Debug for dyn WindowController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "window controller {}.", self.name())
    }
}

/// Build a window controller for a connection on the given link.
pub fn build_window_controller(
    conf: &Config,
    link: Arc<Link>,
) -> Result<Box<dyn WindowController>> {
    conf.validate()?;

    match conf.algorithm {
        ReceiveWindowAlgorithm::NewReno => Ok(Box::new(NewReno::new(conf.max_receive_window))),
        ReceiveWindowAlgorithm::IcTcp => Ok(Box::new(IcTcp::new(conf, link)?)),
    }
}


#[path = "ictcp/ictcp.rs"]
mod ictcp;

mod new_reno;
