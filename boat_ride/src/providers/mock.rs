use async_trait::async_trait;
use chrono::Timelike;
use std::f64::consts::TAU;

use super::{EnvProvider, PartialEnv, ProviderError, ProviderKind};
use crate::models::{NormalizedPoint, TidePhase, TideState, WaveSource, WaveState};

/// Deterministic synthetic conditions so the pipeline runs without upstreams.
///
/// Varies with time of day and along the route.
pub struct MockProvider;

fn round(v: f64, digits: i32) -> f64 {
    let f = 10f64.powi(digits);
    (v * f).round() / f
}

#[async_trait]
impl EnvProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Weather
    }

    async fn query(&self, point: &NormalizedPoint) -> Result<PartialEnv, ProviderError> {
        let seconds = point.time.num_seconds_from_midnight() as f64;
        let phase = seconds / 86_400.0;
        let wiggle = (phase * TAU).sin();
        let geo = ((point.lat + point.lon) * 10.0).sin();

        let wind = 10.0 + 8.0 * wiggle.max(0.0) + 2.0 * geo;
        let gust = wind + 5.0 + 2.0 * (-wiggle).max(0.0);
        let waves = 1.0 + 1.5 * wiggle.max(0.0) + 0.5 * geo.abs();
        let period = 6.0 + 2.0 * (1.0 - phase);
        let precip = (0.15 + 0.35 * (-wiggle).max(0.0)).clamp(0.0, 1.0);
        let tide_rate = 1.5 * (phase * TAU).cos() * TAU / 24.0;

        Ok(PartialEnv {
            wind_speed_kt: Some(round(wind, 2)),
            wind_gust_kt: Some(round(gust, 2)),
            wind_dir_deg: Some(round((220.0 + 40.0 * wiggle).rem_euclid(360.0), 1)),
            precip_prob: Some(round(precip, 3)),
            wave: Some(WaveState {
                height_ft: round(waves, 2),
                period_s: Some(round(period, 2)),
                dir_deg: Some(round((200.0 + 30.0 * geo).rem_euclid(360.0), 1)),
                source: WaveSource::Forecast {
                    model: "mock".to_string(),
                },
            }),
            tide: Some(TideState {
                height_ft: Some(round(1.5 * (phase * TAU).sin(), 2)),
                rate_ft_per_hr: Some(round(tide_rate, 3)),
                phase: Some(if tide_rate > 0.05 {
                    TidePhase::Flood
                } else if tide_rate < -0.05 {
                    TidePhase::Ebb
                } else {
                    TidePhase::Slack
                }),
                flow_dir_deg: None,
            }),
            current_kt: Some(round(0.5 + 0.6 * (phase * TAU).cos().abs(), 2)),
            current_dir_deg: Some(round((90.0 + 60.0 * geo).rem_euclid(360.0), 1)),
            ..Default::default()
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::RouteHints;
    use chrono::{TimeZone, Utc};

    pub(crate) fn sample_point() -> NormalizedPoint {
        let time = Utc.with_ymd_and_hms(2026, 6, 1, 14, 0, 0).unwrap();
        NormalizedPoint {
            index: 0,
            lat: 41.0,
            lon: -71.0,
            cum_dist_nm: 0.0,
            heading_deg: 90.0,
            time,
            t_local: "2026-06-01 14:00 UTC".to_string(),
            hints: RouteHints::default(),
        }
    }

    #[tokio::test]
    async fn test_mock_is_deterministic() {
        let point = sample_point();
        let a = MockProvider.query(&point).await.unwrap();
        let b = MockProvider.query(&point).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_mock_fills_everything_but_fetch() {
        let env = MockProvider.query(&sample_point()).await.unwrap();
        assert!(env.wind_speed_kt.unwrap() > 0.0);
        assert!(env.wind_gust_kt.unwrap() > env.wind_speed_kt.unwrap());
        assert!((0.0..=1.0).contains(&env.precip_prob.unwrap()));
        assert!(!env.wave.unwrap().source.is_buoy());
        assert!(env.tide.unwrap().phase.is_some());
        assert!(env.fetch.is_none());
    }
}
