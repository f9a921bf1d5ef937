//! Spectral tune estimation from turn-by-turn data, built on rustfft.
//!
//! The signal is mean-subtracted and Hann-windowed; the peak bin is refined
//! with the two-bin Hann interpolation `d = (2a - 1) / (a + 1)` where `a` is
//! the ratio of the larger neighbour to the peak.

use num_complex::Complex64;
use optics_types::error::{OpticsError, OpticsResult};
use rustfft::FftPlanner;
use std::f64::consts::PI;

const MIN_TURNS: usize = 16;

/// Single-sided amplitude spectrum of the Hann-windowed, mean-free signal.
/// Bin `k` corresponds to frequency `k / n` (tune units).
pub fn amplitude_spectrum(signal: &[f64]) -> Vec<f64> {
    let n = signal.len();
    if n == 0 {
        return Vec::new();
    }
    let mean = signal.iter().sum::<f64>() / n as f64;
    let mut data: Vec<Complex64> = signal
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            let w = 0.5 - 0.5 * (2.0 * PI * i as f64 / n as f64).cos();
            Complex64::new((v - mean) * w, 0.0)
        })
        .collect();

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(n);
    fft.process(&mut data);

    data.iter().take(n / 2 + 1).map(|c| c.norm()).collect()
}

/// Fractional tune in [0, 0.5] of the dominant line of `signal`.
pub fn fractional_tune(signal: &[f64]) -> OpticsResult<f64> {
    let n = signal.len();
    if n < MIN_TURNS {
        return Err(OpticsError::ConfigError(format!(
            "tune estimation needs at least {MIN_TURNS} turns, got {n}"
        )));
    }
    if signal.iter().any(|v| !v.is_finite()) {
        return Err(OpticsError::ConfigError(
            "turn-by-turn signal contains non-finite values".to_string(),
        ));
    }

    let spectrum = amplitude_spectrum(signal);
    let last = spectrum.len() - 1;
    let mut peak = 1usize;
    for k in 1..=last {
        if spectrum[k] > spectrum[peak] {
            peak = k;
        }
    }
    if spectrum[peak] <= 0.0 {
        return Err(OpticsError::ConfigError(
            "turn-by-turn signal has no oscillating component".to_string(),
        ));
    }

    let left = if peak > 0 { spectrum[peak - 1] } else { 0.0 };
    let right = if peak < last { spectrum[peak + 1] } else { 0.0 };
    let offset = if right >= left {
        let a = right / spectrum[peak];
        (2.0 * a - 1.0) / (a + 1.0)
    } else {
        let a = left / spectrum[peak];
        -(2.0 * a - 1.0) / (a + 1.0)
    };

    Ok(((peak as f64 + offset) / n as f64).clamp(0.0, 0.5))
}
