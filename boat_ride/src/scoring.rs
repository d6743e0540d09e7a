//! Ride comfort heuristic.
//!
//! Starts from 100 and subtracts one penalty per factor. Unknown inputs
//! contribute nothing; every penalty is capped so it alone cannot push the
//! score below zero.

use std::f64::consts::PI;

use crate::models::{BoatProfile, EnvAtPoint, Label, Penalties, RideScore};
use crate::providers::chain::estimate_flow_dir;
use crate::route::angle_diff_deg;

const G: f64 = 9.81;
const FT_PER_M: f64 = 3.28084;
const MAX_PENALTY: f64 = 100.0;
const BIAS_POINTS: f64 = 8.0;

/// Deep-water wavelength `g T² / 2π`, metres.
pub fn deepwater_wavelength_m(period_s: f64) -> Option<f64> {
    (period_s > 0.0).then(|| G * period_s * period_s / (2.0 * PI))
}

/// Wave steepness H/L.
pub fn steepness(height_ft: f64, period_s: f64) -> Option<f64> {
    if height_ft <= 0.0 {
        return None;
    }
    deepwater_wavelength_m(period_s).map(|l| (height_ft / FT_PER_M) / l)
}

fn capped(p: f64) -> f64 {
    p.max(0.0).min(MAX_PENALTY)
}

fn clamp01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

/// Add-on for wind blowing against the estimated tidal flow in confined water.
///
/// Only near-opposition counts (135..180 deg, squared ramp), scaled by tide
/// rate between 1 and 3 ft/hr, wind between 3 and 15 kt and how small the
/// fetch is (full at 4 nm, none above 12 nm).
fn wind_against_tide(
    wind_kt: f64,
    wind_dir_deg: f64,
    flow_dir_deg: f64,
    rate_ft_per_hr: f64,
    fetch_nm: Option<f64>,
) -> Option<(f64, f64)> {
    const TIDE_MIN: f64 = 1.0;
    const TIDE_FULL: f64 = 3.0;
    const WIND_MIN: f64 = 3.0;
    const WIND_FULL: f64 = 15.0;
    const MAX_FETCH_NM: f64 = 12.0;
    const MAX_ADDON: f64 = 4.0;

    let rate = rate_ft_per_hr.abs();
    if rate < TIDE_MIN || wind_kt < WIND_MIN || fetch_nm.is_some_and(|f| f > MAX_FETCH_NM) {
        return None;
    }
    let delta = angle_diff_deg(wind_dir_deg, flow_dir_deg);
    if delta < 135.0 {
        return None;
    }

    let rate_factor = clamp01((rate - TIDE_MIN) / (TIDE_FULL - TIDE_MIN));
    let wind_factor = clamp01((wind_kt - WIND_MIN) / (WIND_FULL - WIND_MIN));
    let angle = clamp01((delta - 135.0) / 45.0);
    let context = fetch_nm.map_or(1.0, |f| clamp01((MAX_FETCH_NM - f) / 8.0));

    let penalty = MAX_ADDON * angle * angle * rate_factor * wind_factor * context;
    (penalty > 0.0).then_some((penalty, delta))
}

/// Chop from wind blowing into a measured current.
///
/// `current_dir_deg` is the set (where the water goes) and `wind_dir_deg`
/// where the wind comes from, so the two agree when they oppose. Counts
/// within 45 deg of full opposition, scaled by current between 0.5 and
/// 2 kt and wind between 3 and 15 kt.
fn wind_against_current(wind_kt: f64, wind_dir_deg: f64, current_kt: f64, current_dir_deg: f64) -> Option<(f64, f64)> {
    const CURRENT_MIN: f64 = 0.5;
    const CURRENT_FULL: f64 = 2.0;
    const WIND_MIN: f64 = 3.0;
    const WIND_FULL: f64 = 15.0;
    const MAX_ADDON: f64 = 6.0;

    let opposition = 180.0 - angle_diff_deg(wind_dir_deg, current_dir_deg);
    if current_kt < CURRENT_MIN || wind_kt < WIND_MIN || opposition < 135.0 {
        return None;
    }
    let current_factor = clamp01((current_kt - CURRENT_MIN) / (CURRENT_FULL - CURRENT_MIN));
    let wind_factor = clamp01((wind_kt - WIND_MIN) / (WIND_FULL - WIND_MIN));
    let angle = clamp01((opposition - 135.0) / 45.0);

    let penalty = MAX_ADDON * angle * angle * current_factor * wind_factor;
    (penalty > 0.0).then_some((penalty, opposition))
}

pub fn score_point(boat: &BoatProfile, env: &EnvAtPoint) -> RideScore {
    let mut reasons = Vec::new();
    let mut penalties = Penalties::default();

    let max_wind = boat.max_safe_wind_kt.max(1.0);
    let wind = env.wind_speed_kt.map(|w| w.max(0.0));
    let wave = env.wave_height_ft().map(|h| h.max(0.0));
    let period = env.wave_period_s().filter(|t| *t > 0.0);
    let wave_steepness = match (wave, period) {
        (Some(h), Some(t)) => steepness(h, t),
        _ => None,
    };

    if let Some(wind) = wind {
        let ratio = wind / max_wind;
        penalties.wind = Some(capped(35.0 * ratio.powf(1.3)));
        if ratio > 1.0 {
            reasons.push(format!("Wind {:.0} kt above comfort limit", wind));
        }
    }

    if let (Some(wind), Some(gust)) = (wind, env.wind_gust_kt) {
        let excess = (gust - wind).max(0.0);
        let ratio = excess / (0.35 * boat.max_safe_wind_kt).max(1.0);
        penalties.gust = Some(capped(10.0 * ratio.powf(1.2)));
        if excess >= 8.0 {
            reasons.push(format!("Gusty (+{:.0} kt)", excess));
        }
    }

    if let Some(wave) = wave {
        let ratio = wave / boat.max_safe_wave_ft.max(0.5);
        penalties.wave_height = Some(capped(50.0 * ratio.powf(1.4)));
        if ratio > 1.0 {
            reasons.push(format!("Seas {:.1} ft above comfort limit", wave));
        }
    }

    if let (Some(wave), Some(period)) = (wave, period) {
        let short = if wave > 0.0 && period < 8.0 {
            12.0 * ((8.0 - period) / 4.0).powf(1.4)
        } else {
            0.0
        };
        penalties.wave_period = Some(capped(short));
        if wave > 0.0 && period <= 6.0 {
            reasons.push(format!("Short period seas ({:.0}s)", period));
        }
    }

    if let Some(s) = wave_steepness {
        let steep = if s > 0.02 {
            14.0 * ((s - 0.02) / 0.02).powf(1.2)
        } else {
            0.0
        };
        penalties.steepness = Some(capped(steep));
        if s >= 0.03 {
            reasons.push("Steep seas".to_string());
        }
    }

    if let (Some(wind), Some(wind_dir), Some(wave), Some(wave_dir)) =
        (wind, env.wind_dir_deg, wave, env.wave_dir_deg())
    {
        let delta = angle_diff_deg(wind_dir, wave_dir);
        let opposition = ((delta - 90.0) / 90.0).max(0.0);
        let against = if wave > 0.0 {
            10.0 * opposition * (wind / max_wind).min(1.0)
        } else {
            0.0
        };
        penalties.wind_against_waves = Some(capped(against));
        if against > 0.0 && delta >= 140.0 {
            reasons.push("Wind against seas".to_string());
        }
    }

    if let Some(tide) = &env.tide {
        if let Some(rate) = tide.rate_ft_per_hr {
            let abs_rate = rate.abs();
            let flow = if abs_rate > 0.3 {
                8.0 * ((abs_rate - 0.3) / 1.2).min(1.0).powf(1.3)
            } else {
                0.0
            };
            penalties.tide_flow = Some(capped(flow));
            if abs_rate >= 1.0 {
                reasons.push("Strong tidal flow".to_string());
            }

            let flow_dir = tide
                .flow_dir_deg
                .or_else(|| estimate_flow_dir(env.route_heading_deg, tide.phase));
            if let (true, Some(wind), Some(wind_dir), Some(flow_dir)) =
                (abs_rate > 0.3, wind, env.wind_dir_deg, flow_dir)
            {
                let addon = wind_against_tide(wind, wind_dir, flow_dir, rate, env.fetch_nm);
                penalties.wind_against_tide = Some(addon.map_or(0.0, |(p, _)| capped(p)));
                if let Some((_, delta)) = addon {
                    reasons.push(format!("Wind vs tide flow (est) ({:.0} deg)", delta));
                }
            }
        }
    }

    if let Some(current) = env.current_kt.map(|c| c.max(0.0)) {
        let drag = if current > 0.5 {
            8.0 * ((current - 0.5) / 1.5).min(1.0).powf(1.3)
        } else {
            0.0
        };
        penalties.current = Some(capped(drag));
        if current >= 1.5 {
            reasons.push(format!("Strong current ({:.1} kt)", current));
        }

        if let (Some(wind), Some(wind_dir), Some(current_dir)) = (wind, env.wind_dir_deg, env.current_dir_deg) {
            let addon = wind_against_current(wind, wind_dir, current, current_dir);
            penalties.wind_against_current = Some(addon.map_or(0.0, |(p, _)| capped(p)));
            if addon.is_some() {
                reasons.push("Wind against current".to_string());
            }
        }
    }

    if let Some(pop) = env.precip_prob {
        let pop = clamp01(pop);
        penalties.precipitation = Some(capped(15.0 * pop));
        if pop >= 0.6 {
            reasons.push(format!("High rain chance ({:.0}%)", pop * 100.0));
        }
    }

    let raw = 100.0 - penalties.total() + BIAS_POINTS * boat.comfort_bias;
    let score = if raw.is_nan() { 0.0 } else { raw.clamp(0.0, 100.0) };
    let score = (score * 10.0).round() / 10.0;

    RideScore {
        lat: env.lat,
        lon: env.lon,
        time: env.time,
        t_local: env.t_local.clone(),
        score,
        label: Label::from_score(score),
        reasons,
        wave_steepness,
        penalties,
        env: env.clone(),
    }
}
