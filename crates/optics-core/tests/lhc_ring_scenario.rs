// ─────────────────────────────────────────────────────────────────────
// LHC Optics Core — End-to-End Ring Scenario
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Build a ring, compute its optics, track a matched bunch with and without
//! an obstacle, close an orbit bump and cross-check tunes against tracking.

use optics_core::aperture::Polygon;
use optics_core::bunch::{matched_gaussian_bunch, BunchSpec};
use optics_core::element::{Element, Slot};
use optics_core::fodo::FodoRingSpec;
use optics_core::lattice::{InsertAt, Lattice};
use optics_core::matching::{match_knobs, MatchProblem, Observable, Target, Vary};
use optics_core::monitor::{Coordinate, MonitorPlacement, TurnByTurnMonitor};
use optics_core::particles::Particles;
use optics_core::survey::survey;
use optics_core::tracker::{measure_tunes, track, TrackOptions};
use optics_core::twiss::{twiss, twiss_open, twiss_ring, TwissInit};
use optics_types::config::OpticsConfig;
use optics_types::constants::LHC_INJECTION_P0C_EV;
use optics_types::state::ReferenceParticle;
use rand::rngs::StdRng;
use rand::SeedableRng;

const SEED: u64 = 20_240_611;

fn ring() -> Lattice {
    FodoRingSpec::default()
        .build(ReferenceParticle::proton(LHC_INJECTION_P0C_EV).unwrap())
        .unwrap()
}

fn bunch_spec(num_particles: usize) -> BunchSpec {
    BunchSpec {
        nemitt_x: 2.5e-6,
        nemitt_y: 2.5e-6,
        sigma_z: 0.08,
        sigma_delta: 3e-4,
        num_particles,
    }
}

#[test]
fn test_matched_bunch_survives_and_obstacle_causes_losses() {
    let cfg = OpticsConfig::default();
    let lat = ring();
    let tw = twiss(&lat, &cfg.twiss).unwrap();
    let initial = matched_gaussian_bunch(&tw, &bunch_spec(1000), &mut StdRng::seed_from_u64(SEED))
        .unwrap();

    let mut clean = initial.clone();
    let report = track(&lat, &mut clean, &TrackOptions::turns(5), &mut [], &cfg.tracking).unwrap();
    assert_eq!(report.lost_fraction, 0.0);
    assert_eq!(report.lost_per_turn, vec![0; 5]);
    assert!(report.most_lossy_element.is_none());

    // Allowed region starts 0.1 mm to the right of the closed orbit.
    let mut blocked = lat.clone();
    let jaw = Polygon::rectangle(3.0e-3, 0.0, 2.9e-3, 1e-2).unwrap();
    blocked
        .insert(InsertAt::After("qf.5".into()), "tcp.5", Element::limit(jaw))
        .unwrap();
    let mut parts = initial.clone();
    let report = track(&blocked, &mut parts, &TrackOptions::turns(5), &mut [], &cfg.tracking).unwrap();
    assert!(report.lost_fraction > 0.0);
    assert_eq!(report.most_lossy_element.unwrap().name, "tcp.5");
    assert!(parts
        .filter_lost()
        .iter()
        .all(|p| p.lost_at_element == Some(blocked.index_of("tcp.5").unwrap())));
}

#[test]
fn test_serial_and_parallel_tracking_agree_on_a_bunch() {
    let cfg = OpticsConfig::default();
    let lat = ring();
    let tw = twiss(&lat, &cfg.twiss).unwrap();
    let initial = matched_gaussian_bunch(&tw, &bunch_spec(200), &mut StdRng::seed_from_u64(SEED))
        .unwrap();

    let mut serial_cfg = cfg.tracking.clone();
    serial_cfg.parallel_threshold = usize::MAX;
    let mut parallel_cfg = cfg.tracking.clone();
    parallel_cfg.parallel_threshold = 1;

    let mut a = initial.clone();
    let mut b = initial;
    track(&lat, &mut a, &TrackOptions::turns(3), &mut [], &serial_cfg).unwrap();
    track(&lat, &mut b, &TrackOptions::turns(3), &mut [], &parallel_cfg).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_orbit_bump_closes_in_the_ring() {
    let cfg = OpticsConfig::default();
    let mut lat = ring();
    for (i, corr) in ["mcb.6f", "mcb.7f", "mcb.8f", "mcb.9f"].iter().enumerate() {
        let knob = format!("on_x5.{i}");
        lat.define_knob(&knob, 0.0).unwrap();
        lat.bind_knob(&knob, corr, Slot::HKick, 1.0).unwrap();
    }
    let before = twiss(&lat, &cfg.twiss).unwrap();
    let problem = MatchProblem {
        ele_start: "qf.6".to_string(),
        ele_stop: "d1.9".to_string(),
        init: TwissInit::from_row(before.row("qf.6").unwrap()),
        vary: (0..4).map(|i| Vary::new(&format!("on_x5.{i}"), 1e-6)).collect(),
        targets: vec![
            Target::new(Observable::X, "ip5", 2e-3, 1e-8),
            Target::new(Observable::Px, "ip5", 0.0, 1e-9),
            Target::new(Observable::X, "d1.9", 0.0, 1e-8),
            Target::new(Observable::Px, "d1.9", 0.0, 1e-9),
        ],
    };
    let result = match_knobs(&mut lat, &problem, &cfg.twiss, &cfg.matching).unwrap();
    assert!(result.iterations >= 2);
    assert!(!before.is_current(&lat));

    let open = twiss_open(&lat, "qf.6", "d1.9", &problem.init, &cfg.twiss).unwrap();
    assert!((open.row("ip5").unwrap().x - 2e-3).abs() <= 1e-8);

    let after = twiss(&lat, &cfg.twiss).unwrap();
    assert!((after.row("ip5").unwrap().x - 2e-3).abs() < 1e-7);
    assert!(after.row("ip1").unwrap().x.abs() < 1e-7);
    assert!(after.row("qf.12").unwrap().x.abs() < 1e-7);
    assert!((after.qx - before.qx).abs() < 1e-6);
}

#[test]
fn test_tunes_and_chromaticity_match_tracking() {
    let cfg = OpticsConfig::default();
    let lat = ring();
    let tw = twiss(&lat, &cfg.twiss).unwrap();
    let fold = |q: f64| {
        let f = q.rem_euclid(1.0);
        f.min(1.0 - f)
    };

    let (qx, qy) = measure_tunes(&lat, &tw, (1e-5, 1e-5), 1024, &cfg.tracking).unwrap();
    assert!((qx - fold(tw.qx)).abs() < 1e-3, "qx {qx} vs {}", fold(tw.qx));
    assert!((qy - fold(tw.qy)).abs() < 1e-3, "qy {qy} vs {}", fold(tw.qy));

    let dp = 2e-3;
    let plus = twiss_ring(&lat, dp, &cfg.twiss).unwrap();
    let minus = twiss_ring(&lat, -dp, &cfg.twiss).unwrap();
    let (qx_p, qy_p) = measure_tunes(&lat, &plus, (1e-5, 1e-5), 2048, &cfg.tracking).unwrap();
    let (qx_m, qy_m) = measure_tunes(&lat, &minus, (1e-5, 1e-5), 2048, &cfg.tracking).unwrap();
    let tracked_dqx = ((qx_p - qx_m) / (2.0 * dp)).abs();
    let tracked_dqy = ((qy_p - qy_m) / (2.0 * dp)).abs();
    let dqx = tw.dqx.unwrap().abs();
    let dqy = tw.dqy.unwrap().abs();
    assert!((tracked_dqx - dqx).abs() < 0.05 * dqx, "dqx {tracked_dqx} vs {dqx}");
    assert!((tracked_dqy - dqy).abs() < 0.05 * dqy, "dqy {tracked_dqy} vs {dqy}");
}

#[test]
fn test_turn_by_turn_monitor_sees_betatron_motion() {
    let cfg = OpticsConfig::default();
    let lat = ring();
    let tw = twiss(&lat, &cfg.twiss).unwrap();
    let mut state = tw.particle_on_co();
    state.x += 1e-4;
    let mut parts = Particles::from_template(state, 2, tw.reference).unwrap();
    let mut monitors = [TurnByTurnMonitor::new("bpm.4f", 0, 9, 2, MonitorPlacement::AfterElement)
        .unwrap()];
    track(&lat, &mut parts, &TrackOptions::turns(10), &mut monitors, &cfg.tracking).unwrap();

    let series = monitors[0].particle_series(0, Coordinate::X);
    assert_eq!(series.len(), 10);
    let start = &tw.rows()[0];
    let gamma0 = (1.0 + start.alfx * start.alfx) / start.betx;
    let bound = 1e-4 * (gamma0 * tw.row("bpm.4f").unwrap().betx).sqrt() * 1.01;
    assert!(series.iter().all(|x| x.abs() <= bound));
    assert!(series.windows(2).any(|w| w[0].signum() != w[1].signum()));
    assert_eq!(series, monitors[0].particle_series(1, Coordinate::X));
}

#[test]
fn test_survey_closes_and_config_file_parses() {
    let lat = ring();
    let sv = survey(&lat, None).unwrap();
    assert!(sv.closure_error() < 1e-9);

    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../configs/lhc_injection.json");
    let cfg = OpticsConfig::from_file(path).unwrap();
    assert!(twiss(&lat, &cfg.twiss).is_ok());
}
