// ─────────────────────────────────────────────────────────────────────
// LHC Optics Core — Tracking Benchmark
// © 1998–2026 Miroslav Šotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use optics_core::bunch::{matched_gaussian_bunch, BunchSpec};
use optics_core::fodo::FodoRingSpec;
use optics_core::tracker::{track, TrackOptions};
use optics_core::twiss::twiss;
use optics_types::config::{TrackingConfig, TwissConfig};
use optics_types::constants::LHC_INJECTION_P0C_EV;
use optics_types::state::ReferenceParticle;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::hint::black_box;

fn bench_tracking(c: &mut Criterion) {
    let lat = FodoRingSpec::default()
        .build(ReferenceParticle::proton(LHC_INJECTION_P0C_EV).expect("valid reference"))
        .expect("valid ring");
    let tw = twiss(&lat, &TwissConfig::default()).expect("stable ring");
    let spec = BunchSpec {
        nemitt_x: 2.5e-6,
        nemitt_y: 2.5e-6,
        sigma_z: 0.08,
        sigma_delta: 3e-4,
        num_particles: 1000,
    };
    let bunch = matched_gaussian_bunch(&tw, &spec, &mut StdRng::seed_from_u64(1)).expect("bunch");

    let mut group = c.benchmark_group("tracking");
    for (label, threshold) in [("serial", usize::MAX), ("parallel", 1)] {
        let cfg = TrackingConfig {
            parallel_threshold: threshold,
            ..TrackingConfig::default()
        };
        group.bench_function(format!("bunch_1000_x_10_turns_{label}"), |b| {
            b.iter_batched(
                || bunch.clone(),
                |mut parts| {
                    let report = track(&lat, &mut parts, &TrackOptions::turns(10), &mut [], &cfg)
                        .expect("track");
                    black_box(report.lost_fraction);
                },
                BatchSize::LargeInput,
            )
        });
    }
    group.finish();
}

criterion_group!(benches, bench_tracking);
criterion_main!(benches);
