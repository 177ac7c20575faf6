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

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use criterion::criterion_group;
use criterion::criterion_main;
use criterion::Criterion;

use ictcp::Config;
use ictcp::IcTcp;
use ictcp::Link;
use ictcp::NewReno;
use ictcp::TransportState;
use ictcp::WindowController;

const SEGMENT_SIZE: u64 = 1460;
const RTT: Duration = Duration::from_micros(200);

/// Ack one segment per call, completing a cycle every window of data.
fn run_acks(cc: &mut dyn WindowController, tcb: &mut TransportState, now: Instant, acks: u64) {
    for i in 0..acks {
        tcb.last_acked_seq += SEGMENT_SIZE;
        if tcb.last_acked_seq >= tcb.next_tx_seq {
            tcb.next_tx_seq = tcb.last_acked_seq + tcb.window;
        }

        let t = now + RTT * (i / 10) as u32;
        cc.on_ack(t, tcb, 1, RTT);
        tcb.window = cc.increase_window(t, tcb, 1);
    }
}

pub fn ack_benchmark(c: &mut Criterion) {
    const ACKS: u64 = 10_000;
    let conf = Config::new();

    c.bench_function("ictcp on_ack", |b| {
        b.iter(|| {
            let now = Instant::now();
            let link = Arc::new(Link::new(&conf, now).unwrap());
            let mut cc = IcTcp::new(&conf, link).unwrap();
            let mut tcb = TransportState::new(SEGMENT_SIZE, 10);
            run_acks(&mut cc, &mut tcb, now, ACKS);
        })
    });

    c.bench_function("newreno on_ack", |b| {
        b.iter(|| {
            let now = Instant::now();
            let mut cc = NewReno::new(1024 * 1024);
            let mut tcb = TransportState::new(SEGMENT_SIZE, 10);
            run_acks(&mut cc, &mut tcb, now, ACKS);
        })
    });
}

pub fn shared_link_benchmark(c: &mut Criterion) {
    const FLOWS: usize = 64;
    const ACKS: u64 = 1_000;
    let conf = Config::new();

    c.bench_function("ictcp shared link", |b| {
        b.iter(|| {
            let now = Instant::now();
            let link = Arc::new(Link::new(&conf, now).unwrap());
            let mut flows: Vec<(IcTcp, TransportState)> = (0..FLOWS)
                .map(|_| {
                    (
                        IcTcp::new(&conf, link.clone()).unwrap(),
                        TransportState::new(SEGMENT_SIZE, 2),
                    )
                })
                .collect();

            for (cc, tcb) in flows.iter_mut() {
                link.on_bytes_arrived(ACKS * SEGMENT_SIZE, now);
                run_acks(cc, tcb, now, ACKS);
            }
        })
    });
}

criterion_group!(benches, ack_benchmark, shared_link_benchmark);
criterion_main!(benches);
