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

use std::time::Instant;

use serde::Deserialize;
use serde::Serialize;

use crate::connection::throughput::ThroughputSample;
use crate::connection::ConnectionRecord;
use crate::link::SlotPhase;
use crate::Config;

/// Why a window was left unchanged.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HoldReason {
    /// The link is in a measuring sub-slot.
    Measuring,

    /// The deficit ratio is neither low enough to grow nor high enough for
    /// long enough to shrink.
    Deficit,

    /// The last increase happened less than the minimum spacing ago.
    Spacing,

    /// The shared growth quota of the sub-slot is used up.
    QuotaExhausted,

    /// A decrease is due but one already happened within the last RTT.
    DecreaseRateLimited,

    /// The window is already at its ceiling.
    WindowLimit,
}

/// Decision of the window adjuster for one RTT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjustment {
    /// Grow the window by the given number of segments.
    Increase(u32),

    /// Shrink the window by one segment.
    Decrease,

    /// Keep the window.
    Hold(HoldReason),
}

/// The per-RTT window decision function.
///
/// * If `db > gamma2` for `decrease_trigger_rtts` consecutive RTTs, shrink
///   the window by one segment, at most once per RTT.
/// * If `db <= gamma1`, or the throughput gap is less than one segment, grow
///   the window, provided the last increase is at least
///   `min_increase_spacing_rtts` RTTs old and the shared quota allows it.
/// * Otherwise keep the window.
#[derive(Debug, Clone)]
pub struct WindowAdjuster {
    gamma1: f64,
    gamma2: f64,
    min_increase_spacing_rtts: u32,
    decrease_trigger_rtts: u32,
    max_increase_per_step: u32,
}

impl WindowAdjuster {
    pub fn new(conf: &Config) -> Self {
        Self {
            gamma1: conf.gamma1,
            gamma2: conf.gamma2,
            min_increase_spacing_rtts: conf.min_increase_spacing_rtts,
            decrease_trigger_rtts: conf.decrease_trigger_rtts,
            max_increase_per_step: conf.max_increase_per_step,
        }
    }

    /// Decide the window change of a connection for the RTT summarized by
    /// `sample`.
    ///
    /// `headroom` is the number of segments the window may still grow before
    /// reaching its ceiling. `claim` is called with the number of segments
    /// wanted and returns the number granted from the shared quota.
    #[allow(clippy::too_many_arguments)]
    pub fn adjust<F>(
        &self,
        now: Instant,
        record: &mut ConnectionRecord,
        sample: &ThroughputSample,
        segment_size: u64,
        phase: SlotPhase,
        headroom: u32,
        claim: F,
    ) -> Adjustment
    where
        F: FnOnce(u32) -> u32,
    {
        if phase != SlotPhase::Adjusting {
            return Adjustment::Hold(HoldReason::Measuring);
        }

        let rtt = sample.rtt;
        if sample.deficit > self.gamma2 {
            record.high_deficit_rtts = record.high_deficit_rtts.saturating_add(1);
        } else {
            record.high_deficit_rtts = 0;
        }

        // A due decrease wins over any increase.
        if record.high_deficit_rtts >= self.decrease_trigger_rtts {
            if let Some(last) = record.last_decrease_time {
                if now.saturating_duration_since(last) < rtt {
                    return Adjustment::Hold(HoldReason::DecreaseRateLimited);
                }
            }

            record.high_deficit_rtts = 0;
            record.last_decrease_time = Some(now);
            return Adjustment::Decrease;
        }

        if sample.deficit > self.gamma1 && sample.gap_bytes() >= segment_size as f64 {
            return Adjustment::Hold(HoldReason::Deficit);
        }

        if let Some(last) = record.last_increase_time {
            if now.saturating_duration_since(last) < rtt * self.min_increase_spacing_rtts {
                return Adjustment::Hold(HoldReason::Spacing);
            }
        }

        if headroom == 0 {
            return Adjustment::Hold(HoldReason::WindowLimit);
        }

        let granted = claim(self.max_increase_per_step.min(headroom));
        if granted == 0 {
            return Adjustment::Hold(HoldReason::QuotaExhausted);
        }

        record.last_increase_time = Some(now);
        Adjustment::Increase(granted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const RTT: Duration = Duration::from_millis(1);
    const SEG: u64 = 1460;

    /// A sample with the given deficit ratio and a throughput gap of many
    /// segments.
    fn sample(deficit: f64) -> ThroughputSample {
        let expected = 100_000_000.0;
        let measured = expected * (1.0 - deficit);
        ThroughputSample {
            rtt: RTT,
            sample: measured,
            measured,
            expected,
            deficit,
            filtered: None,
        }
    }

    fn new_adjuster() -> (WindowAdjuster, ConnectionRecord) {
        let conf = Config::new();
        (WindowAdjuster::new(&conf), ConnectionRecord::new(0.85, false))
    }

    #[test]
    fn measuring_holds() {
        let (adj, mut record) = new_adjuster();
        let now = Instant::now();

        for deficit in [0.0, 0.3, 0.9] {
            let s = sample(deficit);
            let a = adj.adjust(now, &mut record, &s, SEG, SlotPhase::Measuring, 10, |_| {
                panic!("no claim while measuring")
            });
            assert_eq!(a, Adjustment::Hold(HoldReason::Measuring));
        }
        assert_eq!(record.high_deficit_rtts(), 0);
    }

    #[test]
    fn decrease_after_consecutive_high_deficit() {
        let (adj, mut record) = new_adjuster();
        let now = Instant::now();

        // (deficit ratio, counter after, decision)
        let cases = [
            (0.6, 1, Adjustment::Hold(HoldReason::Deficit)),
            (0.6, 2, Adjustment::Hold(HoldReason::Deficit)),
            (0.4, 0, Adjustment::Hold(HoldReason::Deficit)),
            (0.6, 1, Adjustment::Hold(HoldReason::Deficit)),
            (0.6, 2, Adjustment::Hold(HoldReason::Deficit)),
            (0.6, 0, Adjustment::Decrease),
        ];

        for (i, (deficit, counter, decision)) in cases.into_iter().enumerate() {
            let t = now + RTT * i as u32;
            let s = sample(deficit);
            let a = adj.adjust(t, &mut record, &s, SEG, SlotPhase::Adjusting, 10, |_| 0);
            assert_eq!(a, decision, "sample {}", i);
            assert_eq!(record.high_deficit_rtts(), counter, "sample {}", i);
        }
    }

    #[test]
    fn decrease_at_most_once_per_rtt() {
        let (adj, mut record) = new_adjuster();
        let now = Instant::now();
        let high = sample(0.8);

        for i in 0..3 {
            adj.adjust(now, &mut record, &high, SEG, SlotPhase::Adjusting, 10, |_| 0);
            assert_eq!(record.high_deficit_rtts(), if i < 2 { i + 1 } else { 0 });
        }

        // Three more high-deficit RTTs, all within one RTT of the decrease.
        let soon = now + RTT / 2;
        for _ in 0..2 {
            adj.adjust(soon, &mut record, &high, SEG, SlotPhase::Adjusting, 10, |_| 0);
        }
        let a = adj.adjust(soon, &mut record, &high, SEG, SlotPhase::Adjusting, 10, |_| 0);
        assert_eq!(a, Adjustment::Hold(HoldReason::DecreaseRateLimited));

        // The pending decrease fires one RTT later.
        let a = adj.adjust(now + RTT, &mut record, &high, SEG, SlotPhase::Adjusting, 10, |_| 0);
        assert_eq!(a, Adjustment::Decrease);
    }

    #[test]
    fn increase_spacing() {
        let (adj, mut record) = new_adjuster();
        let now = Instant::now();
        let low = sample(0.05);

        let a = adj.adjust(now, &mut record, &low, SEG, SlotPhase::Adjusting, 10, |want| want);
        assert_eq!(a, Adjustment::Increase(1));
        assert_eq!(record.last_increase_time(), Some(now));

        // 1.5 RTT later: too soon, even with quota and a low deficit.
        let t = now + RTT * 3 / 2;
        let a = adj.adjust(t, &mut record, &low, SEG, SlotPhase::Adjusting, 10, |want| want);
        assert_eq!(a, Adjustment::Hold(HoldReason::Spacing));
        assert_eq!(record.last_increase_time(), Some(now));

        let t = now + RTT * 2;
        let a = adj.adjust(t, &mut record, &low, SEG, SlotPhase::Adjusting, 10, |want| want);
        assert_eq!(a, Adjustment::Increase(1));
        assert_eq!(record.last_increase_time(), Some(t));
    }

    #[test]
    fn increase_on_small_gap() {
        let (adj, mut record) = new_adjuster();
        let now = Instant::now();

        // db = 0.3 is above gamma1, but the gap is below one segment:
        // (1000000 - 700000) * 1ms = 300 bytes.
        let s = ThroughputSample {
            rtt: RTT,
            sample: 700_000.0,
            measured: 700_000.0,
            expected: 1_000_000.0,
            deficit: 0.3,
            filtered: None,
        };
        let a = adj.adjust(now, &mut record, &s, SEG, SlotPhase::Adjusting, 10, |want| want);
        assert_eq!(a, Adjustment::Increase(1));
    }

    #[test]
    fn increase_denied() {
        let (adj, mut record) = new_adjuster();
        let now = Instant::now();
        let low = sample(0.0);

        let a = adj.adjust(now, &mut record, &low, SEG, SlotPhase::Adjusting, 10, |_| 0);
        assert_eq!(a, Adjustment::Hold(HoldReason::QuotaExhausted));
        assert_eq!(record.last_increase_time(), None);

        let a = adj.adjust(now, &mut record, &low, SEG, SlotPhase::Adjusting, 0, |_| {
            panic!("no claim at the window ceiling")
        });
        assert_eq!(a, Adjustment::Hold(HoldReason::WindowLimit));
    }

    #[test]
    fn increase_capped_per_step() {
        let mut conf = Config::new();
        conf.set_max_increase_per_step(4);
        let adj = WindowAdjuster::new(&conf);
        let mut record = ConnectionRecord::new(0.85, false);
        let now = Instant::now();
        let low = sample(0.0);

        // Capped by the headroom, then by what the quota grants.
        let a = adj.adjust(now, &mut record, &low, SEG, SlotPhase::Adjusting, 3, |want| {
            assert_eq!(want, 3);
            want
        });
        assert_eq!(a, Adjustment::Increase(3));

        let t = now + RTT * 2;
        let a = adj.adjust(t, &mut record, &low, SEG, SlotPhase::Adjusting, 10, |want| {
            assert_eq!(want, 4);
            2
        });
        assert_eq!(a, Adjustment::Increase(2));
    }

    #[test]
    fn decrease_wins_over_increase() {
        // gamma1 >= gamma2 is rejected by validation, but a small gap can
        // still make both rules apply.
        let (adj, mut record) = new_adjuster();
        let now = Instant::now();
        let s = ThroughputSample {
            rtt: RTT,
            sample: 100_000.0,
            measured: 100_000.0,
            expected: 1_000_000.0,
            deficit: 0.9,
            filtered: None,
        };
        assert!(s.gap_bytes() < SEG as f64);

        let mut decisions = vec![];
        for i in 0..3 {
            let t = now + RTT * 2 * i;
            decisions.push(adj.adjust(t, &mut record, &s, SEG, SlotPhase::Adjusting, 10, |w| w));
        }
        assert_eq!(
            decisions,
            vec![
                Adjustment::Increase(1),
                Adjustment::Increase(1),
                Adjustment::Decrease
            ]
        );
    }
}
