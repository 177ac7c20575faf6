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

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

/// Window growth quota shared by all connections on a link, in segments.
///
/// The quota belongs to one adjusting sub-slot, identified by an epoch. Both
/// values are packed into a single word as `(epoch << 32) | remaining` so that
/// a claim checks the epoch and decrements the remainder in one
/// compare-and-swap. A claim carrying a stale epoch always fails.
#[derive(Debug, Default)]
pub struct GrowthQuota {
    state: AtomicU64,
}

impl GrowthQuota {
    pub fn new() -> Self {
        Self::default()
    }

    fn pack(epoch: u32, remaining: u32) -> u64 {
        (epoch as u64) << 32 | remaining as u64
    }

    fn unpack(v: u64) -> (u32, u32) {
        ((v >> 32) as u32, v as u32)
    }

    /// Start a new sub-slot with the given quota.
    pub fn refill(&self, epoch: u32, segments: u32) {
        self.state
            .store(Self::pack(epoch, segments), Ordering::Release);
    }

    /// Drop whatever is left of the current sub-slot's quota. Unused quota is
    /// never carried over.
    pub fn expire(&self) {
        let (epoch, _) = Self::unpack(self.state.load(Ordering::Acquire));
        self.refill(epoch, 0);
    }

    /// Try to claim up to `want` segments from the quota of sub-slot `epoch`.
    ///
    /// Return the number of segments granted, possibly zero.
    pub fn try_claim(&self, epoch: u32, want: u32) -> u32 {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            let (cur_epoch, remaining) = Self::unpack(current);
            if cur_epoch != epoch || remaining == 0 || want == 0 {
                return 0;
            }

            let granted = remaining.min(want);
            let next = Self::pack(cur_epoch, remaining - granted);
            match self.state.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return granted,
                Err(v) => current = v,
            }
        }
    }

    /// Return the current epoch.
    pub fn epoch(&self) -> u32 {
        Self::unpack(self.state.load(Ordering::Acquire)).0
    }

    /// Return the remaining quota of sub-slot `epoch`, zero if the epoch is
    /// not current.
    pub fn remaining(&self, epoch: u32) -> u32 {
        let (cur_epoch, remaining) = Self::unpack(self.state.load(Ordering::Acquire));
        if cur_epoch != epoch {
            return 0;
        }
        remaining
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn quota_claim() {
        let q = GrowthQuota::new();
        assert_eq!(q.try_claim(0, 1), 0);

        q.refill(1, 3);
        assert_eq!(q.epoch(), 1);

        // (epoch, want, granted, remaining)
        for (epoch, want, granted, remaining) in [
            (1, 0, 0, 3),
            (1, 2, 2, 1),
            (0, 1, 0, 1),
            (2, 1, 0, 1),
            (1, 5, 1, 0),
            (1, 1, 0, 0),
        ] {
            assert_eq!(q.try_claim(epoch, want), granted);
            assert_eq!(q.remaining(1), remaining);
        }
    }

    #[test]
    fn quota_expire() {
        let q = GrowthQuota::new();
        q.refill(7, 10);
        q.expire();
        assert_eq!(q.epoch(), 7);
        assert_eq!(q.remaining(7), 0);
        assert_eq!(q.try_claim(7, 1), 0);

        q.refill(u32::MAX, u32::MAX);
        assert_eq!(q.try_claim(u32::MAX, 1), 1);
        assert_eq!(q.remaining(u32::MAX), u32::MAX - 1);
    }

    #[test]
    fn quota_concurrent_claims() {
        let q = GrowthQuota::new();
        let total = AtomicU32::new(0);
        q.refill(3, 1000);

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..500 {
                        let granted = q.try_claim(3, 1);
                        total.fetch_add(granted, Ordering::Relaxed);
                    }
                });
            }
        });

        assert_eq!(total.load(Ordering::Relaxed), 1000);
        assert_eq!(q.remaining(3), 0);
    }
}
