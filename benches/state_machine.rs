//! Session state machine benchmark suite.
//!
//! Benchmarks the pure transition function on the paths a session takes
//! most often:
//! - Connect and open on the primary transport
//! - Failed primary attempt followed by the long-poll swap
//! - Reconnect cycles after an established session drops
//!
//! Run with: cargo bench --bench state_machine
//! Results saved to: target/criterion/

use std::hint::black_box;
use std::time::Duration;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use live_socket::{AttemptId, CloseCode, Effect, Input, Selector, SocketConfig};

// ============================================================================
// Benchmark Parameters
// ============================================================================

const RECONNECT_CYCLES: &[usize] = &[1, 10, 100];

// ============================================================================
// Helpers
// ============================================================================

fn config() -> SocketConfig {
    SocketConfig::new()
        .with_reconnect_delays(Duration::from_millis(10), Duration::from_secs(5))
        .with_jitter(0.0)
}

fn opened(effects: &[Effect]) -> Option<AttemptId> {
    effects.iter().find_map(|effect| match effect {
        Effect::OpenTransport { attempt, .. } => Some(*attempt),
        _ => None,
    })
}

// ============================================================================
// Benchmark: Connect
// ============================================================================

fn bench_connect_open(c: &mut Criterion) {
    c.bench_function("connect_open", |b| {
        b.iter(|| {
            let mut selector = Selector::new(config());
            let effects = selector.step(Input::Connect);
            if let Some(attempt) = opened(&effects) {
                black_box(selector.step(Input::TransportOpen { attempt }));
            }
            selector.snapshot()
        });
    });
}

// ============================================================================
// Benchmark: Fallback Swap
// ============================================================================

fn bench_fallback_swap(c: &mut Criterion) {
    c.bench_function("fallback_swap", |b| {
        b.iter(|| {
            let mut selector = Selector::new(config());
            let mut pending = opened(&selector.step(Input::Connect));

            // Primary fails, the swap starts a long-poll attempt
            if let Some(attempt) = pending.take() {
                pending = opened(&selector.step(Input::TransportError {
                    attempt,
                    reason: "handshake refused".to_string(),
                }));
            }
            if let Some(attempt) = pending {
                black_box(selector.step(Input::TransportOpen { attempt }));
            }
            selector.snapshot()
        });
    });
}

// ============================================================================
// Benchmark: Reconnect Cycles
// ============================================================================

fn bench_reconnect_cycles(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconnect_cycles");

    for &cycles in RECONNECT_CYCLES {
        group.bench_with_input(BenchmarkId::new("cycles", cycles), &cycles, |b, &n| {
            b.iter(|| {
                let mut selector = Selector::new(config());
                let mut pending = opened(&selector.step(Input::Connect));

                for _ in 0..n {
                    let Some(attempt) = pending.take() else {
                        break;
                    };
                    selector.step(Input::TransportOpen { attempt });
                    selector.step(Input::TransportClose {
                        attempt,
                        code: CloseCode::ABNORMAL,
                        reason: "network".to_string(),
                    });
                    pending = opened(&selector.step(Input::ReconnectTimerFired));
                }
                black_box(selector.snapshot())
            });
        });
    }

    group.finish();
}

// ============================================================================
// Main
// ============================================================================

criterion_group!(
    benches,
    bench_connect_open,
    bench_fallback_swap,
    bench_reconnect_cycles
);
criterion_main!(benches);
