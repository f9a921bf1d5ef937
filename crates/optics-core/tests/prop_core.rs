// ─────────────────────────────────────────────────────────────────────
// LHC Optics Core — Property-Based Tests (proptest) for optics-core
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Property-based tests for optics-core using proptest.
//!
//! Covers: polygon membership (convex and non-convex), loss monotonicity
//! under a shrinking aperture, particle conservation, Twiss determinism and
//! periodicity.

use optics_core::aperture::Polygon;
use optics_core::fodo::FodoRingSpec;
use optics_core::lattice::Lattice;
use optics_core::particles::Particles;
use optics_core::tracker::{track, TrackOptions};
use optics_core::twiss::twiss;
use optics_types::config::{TrackingConfig, TwissConfig};
use optics_types::constants::LHC_INJECTION_P0C_EV;
use optics_types::state::{PhaseSpace, ReferenceParticle};
use proptest::prelude::*;

fn reference() -> ReferenceParticle {
    ReferenceParticle::proton(LHC_INJECTION_P0C_EV).unwrap()
}

fn ring_with_k1(k1: f64) -> Lattice {
    FodoRingSpec {
        k1,
        ..FodoRingSpec::default()
    }
    .build(reference())
    .unwrap()
}

fn ensemble(amplitudes: &[(f64, f64)]) -> Particles {
    let states = amplitudes
        .iter()
        .map(|&(x, y)| PhaseSpace {
            x,
            y,
            ..PhaseSpace::default()
        })
        .collect();
    Particles::new(states, reference()).unwrap()
}

// ── Polygon Properties ───────────────────────────────────────────────

proptest! {
    /// Rectangle membership agrees with the box test away from the edges.
    #[test]
    fn rectangle_membership(
        x0 in -1e-2f64..1e-2,
        y0 in -1e-2f64..1e-2,
        hw in 1e-4f64..1e-2,
        hh in 1e-4f64..1e-2,
        px in -3e-2f64..3e-2,
        py in -3e-2f64..3e-2,
    ) {
        let (dx, dy) = ((px - x0).abs(), (py - y0).abs());
        prop_assume!((dx - hw).abs() > 1e-9 && (dy - hh).abs() > 1e-9);
        let poly = Polygon::rectangle(x0, y0, hw, hh).unwrap();
        let expected = dx < hw && dy < hh;
        prop_assert_eq!(poly.contains(px, py), expected,
            "point ({}, {}) vs box centre ({}, {}) half ({}, {})", px, py, x0, y0, hw, hh);
    }

    /// L-shaped (non-convex) polygon membership is the union of its two boxes.
    #[test]
    fn l_shape_membership(
        px in -0.5f64..2.5,
        py in -0.5f64..2.5,
    ) {
        let near = |v: f64, edge: f64| (v - edge).abs() < 1e-9;
        prop_assume!(![0.0, 1.0, 2.0].iter().any(|&e| near(px, e) || near(py, e)));
        let poly = Polygon::from_points(&[
            (0.0, 0.0), (2.0, 0.0), (2.0, 1.0), (1.0, 1.0), (1.0, 2.0), (0.0, 2.0),
        ]).unwrap();
        let in_base = (0.0..2.0).contains(&px) && (0.0..1.0).contains(&py);
        let in_stem = (0.0..1.0).contains(&px) && (0.0..2.0).contains(&py);
        prop_assert_eq!(poly.contains(px, py), in_base || in_stem);
    }

    /// Orientation does not change membership.
    #[test]
    fn reversed_vertices_same_membership(
        px in -2.0f64..2.0,
        py in -2.0f64..2.0,
    ) {
        let pts = [(-1.0, -1.0), (1.5, -0.5), (1.0, 1.2), (-0.8, 1.0)];
        let fwd = Polygon::from_points(&pts).unwrap();
        let rev: Vec<(f64, f64)> = pts.iter().rev().copied().collect();
        let rev = Polygon::from_points(&rev).unwrap();
        prop_assert_eq!(fwd.contains(px, py), rev.contains(px, py));
        prop_assert!((fwd.signed_area() + rev.signed_area()).abs() < 1e-12);
    }
}

// ── Tracking Properties ──────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// A smaller global aperture never loses fewer particles.
    #[test]
    fn loss_is_monotone_in_aperture(
        amps in prop::collection::vec((-6e-3f64..6e-3, -6e-3f64..6e-3), 1..12),
        wide in 4e-3f64..2e-2,
        shrink in 0.2f64..1.0,
    ) {
        let lat = ring_with_k1(0.165);
        let run = |aperture: f64| {
            let cfg = TrackingConfig { global_aperture_m: aperture, ..TrackingConfig::default() };
            let mut parts = ensemble(&amps);
            track(&lat, &mut parts, &TrackOptions::turns(3), &mut [], &cfg).unwrap();
            parts
        };
        let loose = run(wide);
        let tight = run(wide * shrink);
        prop_assert!(tight.num_lost() >= loose.num_lost());
        for (a, b) in loose.iter().zip(tight.iter()) {
            prop_assert!(a.alive || !b.alive, "lost with the wide aperture but alive with the tight one");
        }
    }

    /// Tracking never creates or drops particles and the loss count only grows.
    #[test]
    fn particles_are_conserved(
        amps in prop::collection::vec((-4e-3f64..4e-3, -4e-3f64..4e-3), 1..16),
        aperture in 1e-3f64..1e-2,
        turns in 1usize..5,
    ) {
        let lat = ring_with_k1(0.165);
        let cfg = TrackingConfig { global_aperture_m: aperture, ..TrackingConfig::default() };
        let mut parts = ensemble(&amps);
        let report = track(&lat, &mut parts, &TrackOptions::turns(turns), &mut [], &cfg).unwrap();
        prop_assert_eq!(parts.len(), amps.len());
        prop_assert_eq!(parts.num_alive() + parts.num_lost(), amps.len());
        prop_assert_eq!(report.lost_per_turn.len(), turns);
        prop_assert!(report.lost_per_turn.windows(2).all(|w| w[0] <= w[1]));
        prop_assert_eq!(report.lost_per_turn.last().copied(), Some(parts.num_lost()));
        for p in parts.iter().filter(|p| !p.alive) {
            prop_assert!(p.lost_at_element.is_some() && p.lost_at_turn.is_some());
        }
    }
}

// ── Twiss Properties ─────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    /// Periodic optics close on themselves and repeated calls agree exactly.
    #[test]
    fn twiss_is_periodic_and_deterministic(k1 in 0.10f64..0.20) {
        let lat = ring_with_k1(k1);
        let a = twiss(&lat, &TwissConfig::default()).unwrap();
        let b = twiss(&lat, &TwissConfig::default()).unwrap();
        prop_assert_eq!(&a, &b);

        let first = &a.rows()[0];
        let last = a.rows().last().unwrap();
        prop_assert!((first.betx - last.betx).abs() < 1e-8 * first.betx);
        prop_assert!((first.bety - last.bety).abs() < 1e-8 * first.bety);
        prop_assert!((first.alfx - last.alfx).abs() < 1e-8);
        prop_assert!((first.dx - last.dx).abs() < 1e-8);
        prop_assert!((last.mux - a.qx).abs() < 1e-12);
        prop_assert!(a.rows().windows(2).all(|w| w[1].mux >= w[0].mux));
        prop_assert!(a.rows().iter().all(|r| r.betx > 0.0 && r.bety > 0.0));
    }
}
