use futures::future::join_all;

use super::{EnvProvider, PartialEnv};
use crate::fetch::FetchProfile;
use crate::models::{EnvAtPoint, NormalizedPoint, RouteHints, TidePhase, WaveSource, WaveState, Waterway};
use crate::waves::{self, GrowthInputs};

/// Effective fetch at or below which coastal water counts as sheltered.
pub const GATE_SMALL_FETCH_NM: f64 = 2.0;
/// Buoys at least this far away report swell irrelevant to sheltered water.
pub const GATE_FAR_BUOY_NM: f64 = 10.0;

/// Runs providers in fixed order (weather, waves, fetch, tide) and merges
/// their partial results into one snapshot per point.
pub struct ProviderChain {
    providers: Vec<Box<dyn EnvProvider>>,
}

impl ProviderChain {
    pub fn new(mut providers: Vec<Box<dyn EnvProvider>>) -> Self {
        providers.sort_by_key(|p| p.kind());
        ProviderChain { providers }
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Query every provider concurrently and merge in chain order.
    ///
    /// A failing provider contributes nothing; the snapshot may be partial.
    pub async fn evaluate(&self, point: &NormalizedPoint) -> EnvAtPoint {
        let results = join_all(self.providers.iter().map(|p| p.query(point))).await;

        let mut merged = Merged::new(point);
        for (provider, result) in self.providers.iter().zip(results) {
            match result {
                Ok(partial) => merged.absorb(partial),
                Err(e) => {
                    log::warn!("Provider {} failed at point {}: {}", provider.name(), point.index, e);
                    merged
                        .env
                        .notes
                        .insert(format!("{}_error", provider.name()), e.to_string());
                }
            }
        }
        merged.finish()
    }
}

struct Merged {
    env: EnvAtPoint,
    fetch: Option<FetchProfile>,
    hints: RouteHints,
}

fn fill<T>(slot: &mut Option<T>, value: Option<T>) {
    if slot.is_none() {
        *slot = value;
    }
}

impl Merged {
    fn new(point: &NormalizedPoint) -> Self {
        Merged {
            env: EnvAtPoint::empty(point),
            fetch: None,
            hints: point.hints.clone(),
        }
    }

    /// First writer wins, field by field.
    fn absorb(&mut self, partial: PartialEnv) {
        let env = &mut self.env;
        fill(&mut env.wind_speed_kt, partial.wind_speed_kt);
        fill(&mut env.wind_gust_kt, partial.wind_gust_kt);
        fill(&mut env.wind_dir_deg, partial.wind_dir_deg);
        fill(&mut env.precip_prob, partial.precip_prob);
        fill(&mut env.wave, partial.wave);
        fill(&mut env.tide, partial.tide);
        fill(&mut env.current_kt, partial.current_kt);
        fill(&mut env.current_dir_deg, partial.current_dir_deg);
        fill(&mut env.wind_duration_hr, partial.wind_duration_hr);
        fill(&mut self.fetch, partial.fetch);
        for (key, value) in partial.notes {
            env.notes.entry(key).or_insert(value);
        }
    }

    /// Plan-supplied vertex hints beat anything computed from the coastline.
    fn apply_hints(&mut self) {
        let env = &mut self.env;
        env.depth_m = self.hints.depth_m;
        if let Some(name) = &self.hints.name {
            env.notes.insert("route_name".into(), name.clone());
        }
        if let Some(fetch_nm) = self.hints.fetch_nm {
            env.fetch_nm = Some(fetch_nm);
            env.notes.insert("fetch_source".into(), "route_hint".into());
        }
        if let Some(waterway) = self.hints.waterway {
            env.waterway = Some(waterway);
            env.notes.insert("waterway_source".into(), "route_hint".into());
        }
    }

    fn finish(mut self) -> EnvAtPoint {
        if let Some(profile) = &self.fetch {
            self.env.min_fetch_nm = Some(profile.min_nm());
            self.env.waterway = Some(profile.waterway());
            self.env.fetch_nm = Some(profile.effective_nm(self.env.wind_dir_deg));
        }
        self.apply_hints();

        apply_inland_gate(&mut self.env);

        if self.env.wave.is_none() {
            if let (Some(wind_kt), Some(fetch_nm)) = (self.env.wind_speed_kt, self.env.fetch_nm) {
                let wind_dir = self.env.wind_dir_deg;
                // Wind sea arrives from where the wind blows.
                self.env.wave = waves::synthesize(GrowthInputs {
                    wind_kt,
                    fetch_nm,
                    duration_hr: self.env.wind_duration_hr,
                    depth_m: self.env.depth_m,
                })
                .map(|w| WaveState {
                    dir_deg: w.dir_deg.or(wind_dir),
                    ..w
                });
                if self.env.wave.is_some() {
                    self.env
                        .notes
                        .insert("wave_source_note".into(), format!("fetch_growth({:.1}nm)", fetch_nm));
                }
            }
        }

        let heading = self.env.route_heading_deg;
        if let Some(tide) = self.env.tide.as_mut() {
            fill(&mut tide.flow_dir_deg, estimate_flow_dir(heading, tide.phase));
        }

        self.env
    }
}

/// Whether a buoy wave observation should be discarded for this point.
///
/// Inland water always drops buoy waves. Coastal water drops them when the
/// effective fetch is small and the buoy is far (or its distance unknown).
/// Non-buoy sources and unclassified points keep their observation.
pub fn should_suppress(wave: &WaveState, waterway: Option<Waterway>, fetch_nm: Option<f64>) -> bool {
    let distance_nm = match &wave.source {
        WaveSource::Buoy { distance_nm, .. } => *distance_nm,
        _ => return false,
    };
    match waterway {
        Some(Waterway::Inland) => true,
        Some(Waterway::Coastal) => {
            fetch_nm.map_or(false, |f| f <= GATE_SMALL_FETCH_NM)
                && distance_nm.map_or(true, |d| d >= GATE_FAR_BUOY_NM)
        }
        _ => false,
    }
}

fn apply_inland_gate(env: &mut EnvAtPoint) {
    let suppress = env
        .wave
        .as_ref()
        .map_or(false, |w| should_suppress(w, env.waterway, env.fetch_nm));
    if suppress {
        log::debug!(
            "Suppressing buoy waves at {:.4},{:.4} ({:?}, fetch {:?} nm)",
            env.lat,
            env.lon,
            env.waterway,
            env.fetch_nm
        );
        env.wave = None;
        env.waves_suppressed = true;
        env.notes
            .insert("wave_suppressed_reason".into(), "sheltered_water_buoy_swell".into());
    }
}

/// Flood runs along the route heading, ebb against it; slack has no direction.
pub fn estimate_flow_dir(route_heading_deg: Option<f64>, phase: Option<TidePhase>) -> Option<f64> {
    let heading = route_heading_deg?;
    match phase? {
        TidePhase::Flood => Some(heading.rem_euclid(360.0)),
        TidePhase::Ebb => Some((heading + 180.0).rem_euclid(360.0)),
        TidePhase::Slack => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TideState;
    use crate::providers::mock::tests::sample_point;
    use crate::providers::{ProviderError, ProviderKind};
    use async_trait::async_trait;
    use std::time::Duration;

    struct Fixed {
        name: &'static str,
        kind: ProviderKind,
        env: PartialEnv,
        delay_ms: u64,
    }

    #[async_trait]
    impl EnvProvider for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn kind(&self) -> ProviderKind {
            self.kind
        }

        async fn query(&self, _point: &NormalizedPoint) -> Result<PartialEnv, ProviderError> {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            Ok(self.env.clone())
        }
    }

    struct Broken;

    #[async_trait]
    impl EnvProvider for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn kind(&self) -> ProviderKind {
            ProviderKind::Waves
        }

        async fn query(&self, _point: &NormalizedPoint) -> Result<PartialEnv, ProviderError> {
            Err(ProviderError::Transient("upstream down".into()))
        }
    }

    fn fixed(name: &'static str, kind: ProviderKind, env: PartialEnv) -> Box<dyn EnvProvider> {
        Box::new(Fixed {
            name,
            kind,
            env,
            delay_ms: 0,
        })
    }

    fn wind(speed: f64, dir: f64) -> PartialEnv {
        PartialEnv {
            wind_speed_kt: Some(speed),
            wind_dir_deg: Some(dir),
            ..Default::default()
        }
    }

    fn buoy_waves(height_ft: f64, distance_nm: f64) -> PartialEnv {
        PartialEnv {
            wave: Some(WaveState {
                height_ft,
                period_s: Some(9.0),
                dir_deg: Some(120.0),
                source: WaveSource::Buoy {
                    station: "44017".into(),
                    distance_nm: Some(distance_nm),
                },
            }),
            ..Default::default()
        }
    }

    fn fetch_all(nm: f64) -> PartialEnv {
        PartialEnv {
            fetch: Some(FetchProfile::from_distances(&[Some(nm); 16], 50.0)),
            ..Default::default()
        }
    }

    // =========================================================================
    // Merge precedence
    // =========================================================================

    #[tokio::test]
    async fn test_earlier_provider_wins_regardless_of_completion_order() {
        let slow_weather = Box::new(Fixed {
            name: "slow",
            kind: ProviderKind::Weather,
            env: wind(10.0, 180.0),
            delay_ms: 30,
        });
        let fast_tide = fixed("fast", ProviderKind::Tide, wind(25.0, 0.0));
        // Registered out of order on purpose
        let chain = ProviderChain::new(vec![fast_tide, slow_weather]);
        assert_eq!(chain.provider_names(), vec!["slow", "fast"]);

        let env = chain.evaluate(&sample_point()).await;
        assert_eq!(env.wind_speed_kt, Some(10.0));
        assert_eq!(env.wind_dir_deg, Some(180.0));
    }

    #[tokio::test]
    async fn test_later_provider_fills_gaps_only() {
        let chain = ProviderChain::new(vec![
            fixed("wx", ProviderKind::Weather, wind(10.0, 180.0)),
            fixed(
                "tide",
                ProviderKind::Tide,
                PartialEnv {
                    wind_speed_kt: Some(99.0),
                    precip_prob: Some(0.4),
                    ..Default::default()
                },
            ),
        ]);
        let env = chain.evaluate(&sample_point()).await;
        assert_eq!(env.wind_speed_kt, Some(10.0));
        assert_eq!(env.precip_prob, Some(0.4));
    }

    #[tokio::test]
    async fn test_failed_provider_does_not_abort_chain() {
        let chain = ProviderChain::new(vec![
            fixed("wx", ProviderKind::Weather, wind(12.0, 90.0)),
            Box::new(Broken),
            fixed("fetch", ProviderKind::Fetch, fetch_all(8.0)),
        ]);
        let env = chain.evaluate(&sample_point()).await;
        assert_eq!(env.wind_speed_kt, Some(12.0));
        assert_eq!(env.waterway, Some(Waterway::Coastal));
        assert!(env.notes.contains_key("broken_error"));
        // Wave slot was empty, so growth filled it
        assert!(env.wave.unwrap().source.is_synthesized());
    }

    #[tokio::test]
    async fn test_everything_unknown_without_providers() {
        let chain = ProviderChain::new(vec![]);
        let env = chain.evaluate(&sample_point()).await;
        assert!(env.wind_speed_kt.is_none());
        assert!(env.wave.is_none());
        assert!(env.fetch_nm.is_none());
        assert!(env.waterway.is_none());
    }

    // =========================================================================
    // Inland gate
    // =========================================================================

    #[tokio::test]
    async fn test_inland_drops_buoy_waves_and_synthesizes() {
        let chain = ProviderChain::new(vec![
            fixed("wx", ProviderKind::Weather, wind(15.0, 90.0)),
            fixed("ndbc", ProviderKind::Waves, buoy_waves(6.5, 40.0)),
            fixed("fetch", ProviderKind::Fetch, fetch_all(1.5)),
        ]);
        let env = chain.evaluate(&sample_point()).await;
        assert_eq!(env.waterway, Some(Waterway::Inland));
        assert!(env.waves_suppressed);
        let wave = env.wave.unwrap();
        assert!(wave.source.is_synthesized());
        assert_ne!(wave.height_ft, 6.5);
    }

    #[tokio::test]
    async fn test_inland_drops_buoy_waves_even_without_wind() {
        let chain = ProviderChain::new(vec![
            fixed("ndbc", ProviderKind::Waves, buoy_waves(6.5, 40.0)),
            fixed("fetch", ProviderKind::Fetch, fetch_all(1.5)),
        ]);
        let env = chain.evaluate(&sample_point()).await;
        assert!(env.waves_suppressed);
        assert!(env.wave.is_none());
    }

    #[tokio::test]
    async fn test_offshore_keeps_buoy_waves() {
        let chain = ProviderChain::new(vec![
            fixed("wx", ProviderKind::Weather, wind(15.0, 90.0)),
            fixed("ndbc", ProviderKind::Waves, buoy_waves(6.5, 40.0)),
            fixed("fetch", ProviderKind::Fetch, fetch_all(45.0)),
        ]);
        let env = chain.evaluate(&sample_point()).await;
        assert!(!env.waves_suppressed);
        assert_eq!(env.wave_height_ft(), Some(6.5));
    }

    #[tokio::test]
    async fn test_observed_waves_trusted_without_classification() {
        let chain = ProviderChain::new(vec![
            fixed("wx", ProviderKind::Weather, wind(15.0, 90.0)),
            fixed("ndbc", ProviderKind::Waves, buoy_waves(3.0, 40.0)),
        ]);
        let env = chain.evaluate(&sample_point()).await;
        assert!(env.waterway.is_none());
        assert_eq!(env.wave_height_ft(), Some(3.0));
    }

    #[test]
    fn test_should_suppress_rules() {
        let buoy = |d: Option<f64>| WaveState {
            height_ft: 4.0,
            period_s: None,
            dir_deg: None,
            source: WaveSource::Buoy {
                station: "x".into(),
                distance_nm: d,
            },
        };
        let forecast = WaveState {
            source: WaveSource::Forecast { model: "nwps".into() },
            ..buoy(None)
        };

        assert!(should_suppress(&buoy(Some(1.0)), Some(Waterway::Inland), Some(10.0)));
        assert!(should_suppress(&buoy(Some(15.0)), Some(Waterway::Coastal), Some(2.0)));
        assert!(should_suppress(&buoy(None), Some(Waterway::Coastal), Some(1.0)));
        assert!(!should_suppress(&buoy(Some(5.0)), Some(Waterway::Coastal), Some(1.0)));
        assert!(!should_suppress(&buoy(Some(15.0)), Some(Waterway::Coastal), Some(2.1)));
        assert!(!should_suppress(&buoy(Some(15.0)), Some(Waterway::Offshore), Some(1.0)));
        assert!(!should_suppress(&buoy(Some(15.0)), None, None));
        assert!(!should_suppress(&forecast, Some(Waterway::Inland), Some(1.0)));
    }

    // =========================================================================
    // Fetch and tide post-processing
    // =========================================================================

    #[tokio::test]
    async fn test_effective_fetch_uses_merged_wind_direction() {
        let mut distances = [Some(2.0); 16];
        distances[4] = Some(30.0); // 90 deg
        let profile = PartialEnv {
            fetch: Some(FetchProfile::from_distances(&distances, 50.0)),
            ..Default::default()
        };

        let east = ProviderChain::new(vec![
            fixed("wx", ProviderKind::Weather, wind(10.0, 90.0)),
            fixed("fetch", ProviderKind::Fetch, profile.clone()),
        ])
        .evaluate(&sample_point())
        .await;
        let west = ProviderChain::new(vec![
            fixed("wx", ProviderKind::Weather, wind(10.0, 270.0)),
            fixed("fetch", ProviderKind::Fetch, profile),
        ])
        .evaluate(&sample_point())
        .await;

        assert!(east.fetch_nm.unwrap() > west.fetch_nm.unwrap());
        assert_eq!(east.min_fetch_nm, Some(2.0));
    }

    // =========================================================================
    // Route hints and growth limits
    // =========================================================================

    fn hinted_point(hints: RouteHints) -> NormalizedPoint {
        NormalizedPoint {
            hints,
            ..sample_point()
        }
    }

    #[tokio::test]
    async fn test_shallow_depth_hint_caps_synthesized_height() {
        let providers = || {
            vec![
                fixed("wx", ProviderKind::Weather, wind(25.0, 90.0)),
                fixed("fetch", ProviderKind::Fetch, fetch_all(12.0)),
            ]
        };
        let deep = ProviderChain::new(providers()).evaluate(&sample_point()).await;
        let shallow = ProviderChain::new(providers())
            .evaluate(&hinted_point(RouteHints {
                depth_m: Some(0.5),
                ..Default::default()
            }))
            .await;

        assert_eq!(shallow.depth_m, Some(0.5));
        let deep_ft = deep.wave_height_ft().unwrap();
        let shallow_ft = shallow.wave_height_ft().unwrap();
        assert!(shallow_ft < deep_ft, "{} vs {}", shallow_ft, deep_ft);
        // 0.6 * 0.5 m
        assert!((shallow_ft - 0.3 * 3.28084).abs() < 1e-6, "{}", shallow_ft);
    }

    #[tokio::test]
    async fn test_fresh_wind_limits_synthesized_height() {
        let mut young = wind(25.0, 90.0);
        young.wind_duration_hr = Some(0.25);
        let fetch = || fixed("fetch", ProviderKind::Fetch, fetch_all(20.0));

        let steady = ProviderChain::new(vec![fixed("wx", ProviderKind::Weather, wind(25.0, 90.0)), fetch()])
            .evaluate(&sample_point())
            .await;
        let fresh = ProviderChain::new(vec![fixed("wx", ProviderKind::Weather, young), fetch()])
            .evaluate(&sample_point())
            .await;

        assert_eq!(fresh.wind_duration_hr, Some(0.25));
        assert!(fresh.wave_height_ft().unwrap() < steady.wave_height_ft().unwrap());
    }

    #[tokio::test]
    async fn test_fetch_and_waterway_hints_override_coastline() {
        let chain = ProviderChain::new(vec![
            fixed("wx", ProviderKind::Weather, wind(15.0, 90.0)),
            fixed("ndbc", ProviderKind::Waves, buoy_waves(6.5, 40.0)),
            fixed("fetch", ProviderKind::Fetch, fetch_all(45.0)),
        ]);
        let env = chain
            .evaluate(&hinted_point(RouteHints {
                fetch_nm: Some(1.0),
                waterway: Some(Waterway::Inland),
                ..Default::default()
            }))
            .await;

        assert_eq!(env.fetch_nm, Some(1.0));
        assert_eq!(env.min_fetch_nm, Some(45.0));
        assert_eq!(env.waterway, Some(Waterway::Inland));
        assert!(env.waves_suppressed);
        assert!(env.wave.unwrap().source.is_synthesized());
        assert_eq!(env.notes.get("fetch_source").map(String::as_str), Some("route_hint"));
        assert!(!env.notes.contains_key("route_name"));
    }

    #[tokio::test]
    async fn test_fetch_hint_synthesizes_without_coastline() {
        let chain = ProviderChain::new(vec![fixed("wx", ProviderKind::Weather, wind(12.0, 200.0))]);
        let env = chain
            .evaluate(&hinted_point(RouteHints {
                name: Some("Narrows".into()),
                fetch_nm: Some(3.0),
                ..Default::default()
            }))
            .await;
        assert!(env.waterway.is_none());
        assert_eq!(env.notes.get("route_name").map(String::as_str), Some("Narrows"));
        let wave = env.wave.unwrap();
        assert!(wave.source.is_synthesized());
        assert_eq!(wave.dir_deg, Some(200.0));
    }

    #[tokio::test]
    async fn test_tide_flow_direction_estimated_from_heading() {
        let tide = PartialEnv {
            tide: Some(TideState {
                height_ft: Some(2.0),
                rate_ft_per_hr: Some(-1.2),
                phase: Some(TidePhase::Ebb),
                flow_dir_deg: None,
            }),
            ..Default::default()
        };
        let env = ProviderChain::new(vec![fixed("coops", ProviderKind::Tide, tide)])
            .evaluate(&sample_point())
            .await;
        // sample point heads east, ebb flows west
        assert_eq!(env.tide.unwrap().flow_dir_deg, Some(270.0));
    }

    #[test]
    fn test_estimate_flow_dir() {
        assert_eq!(estimate_flow_dir(Some(350.0), Some(TidePhase::Flood)), Some(350.0));
        assert_eq!(estimate_flow_dir(Some(350.0), Some(TidePhase::Ebb)), Some(170.0));
        assert_eq!(estimate_flow_dir(Some(350.0), Some(TidePhase::Slack)), None);
        assert_eq!(estimate_flow_dir(None, Some(TidePhase::Flood)), None);
        assert_eq!(estimate_flow_dir(Some(10.0), None), None);
    }
}
