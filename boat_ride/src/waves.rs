//! Fetch-limited wave growth.
//!
//! SMB/JONSWAP style growth curves, used when wind and fetch are known but no
//! wave observation exists for a point:
//!
//! - `Hs = (U²/g) · 0.283 · tanh(0.0125 · X^0.42)`
//! - `Tp = (U/g) · 7.54 · tanh(0.077 · X^0.25)`
//!
//! with the dimensionless fetch `X = g·F/U²`.

use crate::models::{WaveSource, WaveState};

const G: f64 = 9.81;
const M_PER_NM: f64 = 1852.0;
const FT_PER_M: f64 = 3.28084;
const MPS_PER_KT: f64 = 0.514444;

const MIN_FETCH_NM: f64 = 0.05;
const MAX_FETCH_NM: f64 = 25.0;
const MAX_HEIGHT_FT: f64 = 6.0;
const MAX_PERIOD_S: f64 = 8.5;
/// Depth-limited breaking cap, fraction of depth.
const DEPTH_BREAKING_RATIO: f64 = 0.6;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GrowthInputs {
    pub wind_kt: f64,
    pub fetch_nm: f64,
    /// Hours the wind has been blowing; `None` assumes a steady, fetch-limited sea.
    pub duration_hr: Option<f64>,
    pub depth_m: Option<f64>,
}

/// Fetch equivalent to a wind duration (duration-limited growth, CEM form).
fn duration_limited_fetch_m(wind_mps: f64, duration_hr: f64) -> f64 {
    let t = duration_hr * 3600.0;
    (t * wind_mps.powf(0.34) * G.powf(0.33) / 77.23).powf(1.0 / 0.67)
}

/// Synthesize significant wave height (ft) and peak period (s).
///
/// Returns `None` for calm wind or unknown/zero fetch instead of a degenerate
/// zero-height wave.
pub fn synthesize(inputs: GrowthInputs) -> Option<WaveState> {
    if !(inputs.wind_kt > 0.0) || !(inputs.fetch_nm > 0.0) {
        return None;
    }

    let fetch_nm = inputs.fetch_nm.clamp(MIN_FETCH_NM, MAX_FETCH_NM);
    let u = inputs.wind_kt * MPS_PER_KT;
    let mut fetch_m = fetch_nm * M_PER_NM;
    if let Some(hours) = inputs.duration_hr.filter(|h| *h > 0.0) {
        fetch_m = fetch_m.min(duration_limited_fetch_m(u, hours));
    }

    let x = G * fetch_m / (u * u);
    let mut hs_m = (u * u / G) * 0.283 * (0.0125 * x.powf(0.42)).tanh();
    let mut tp_s = (u / G) * 7.54 * (0.077 * x.powf(0.25)).tanh();

    if let Some(depth) = inputs.depth_m.filter(|d| *d > 0.0) {
        hs_m = hs_m.min(DEPTH_BREAKING_RATIO * depth);
        tp_s *= (depth / 20.0).powf(0.25).min(1.0);
    }

    let height_ft = (hs_m * FT_PER_M).clamp(0.0, MAX_HEIGHT_FT);
    let min_period = 2.0 + 0.2 * fetch_nm;
    let period_s = tp_s.min(MAX_PERIOD_S).max(min_period);

    Some(WaveState {
        height_ft,
        period_s: Some(period_s),
        dir_deg: None,
        source: WaveSource::Synthesized,
    })
}
