use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        LatLon { lat, lon }
    }
}

/// What the plan author knows about the water at a route vertex.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RouteHints {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth_m: Option<f64>,
    /// Replaces the computed effective fetch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch_nm: Option<f64>,
    /// Replaces the computed classification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waterway: Option<Waterway>,
}

impl RouteHints {
    /// Hints for a point `frac` of the way from `a` to `b`.
    ///
    /// Depth and fetch interpolate when both ends know them; otherwise every
    /// hint comes from the nearer vertex.
    pub fn between(a: &RouteHints, b: &RouteHints, frac: f64) -> RouteHints {
        let near = if frac < 0.5 { a } else { b };
        let lerp = |x: Option<f64>, y: Option<f64>, fallback: Option<f64>| match (x, y) {
            (Some(x), Some(y)) => Some(x + frac * (y - x)),
            _ => fallback,
        };
        RouteHints {
            name: near.name.clone(),
            depth_m: lerp(a.depth_m, b.depth_m, near.depth_m),
            fetch_nm: lerp(a.fetch_nm, b.fetch_nm, near.fetch_nm),
            waterway: near.waterway,
        }
    }
}

/// A trip plan vertex.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct RoutePoint {
    pub lat: f64,
    pub lon: f64,
    #[serde(flatten)]
    pub hints: RouteHints,
}

impl RoutePoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        RoutePoint {
            lat,
            lon,
            hints: RouteHints::default(),
        }
    }

    pub fn position(&self) -> LatLon {
        LatLon::new(self.lat, self.lon)
    }
}

impl From<LatLon> for RoutePoint {
    fn from(p: LatLon) -> Self {
        RoutePoint::new(p.lat, p.lon)
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BoatProfile {
    pub name: String,
    pub length_ft: f64,
    pub beam_ft: f64,
    pub draft_ft: f64,
    pub max_safe_wind_kt: f64,
    pub max_safe_wave_ft: f64,
    /// -1..+1, more tolerant hulls get a positive bias.
    pub comfort_bias: f64,
}

impl Default for BoatProfile {
    fn default() -> Self {
        BoatProfile {
            name: "My Boat".to_string(),
            length_ft: 22.0,
            beam_ft: 8.5,
            draft_ft: 1.5,
            max_safe_wind_kt: 25.0,
            max_safe_wave_ft: 4.0,
            comfort_bias: 0.0,
        }
    }
}

/// A resampled route point with its assigned sample time.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct NormalizedPoint {
    pub index: usize,
    pub lat: f64,
    pub lon: f64,
    pub cum_dist_nm: f64,
    /// Forward route heading, degrees true.
    pub heading_deg: f64,
    pub time: DateTime<Utc>,
    pub t_local: String,
    #[serde(default)]
    pub hints: RouteHints,
}

impl NormalizedPoint {
    pub fn position(&self) -> LatLon {
        LatLon::new(self.lat, self.lon)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Waterway {
    Inland,
    Coastal,
    Offshore,
}

pub const INLAND_MAX_NM: f64 = 3.0;
pub const COASTAL_MAX_NM: f64 = 20.0;

impl Waterway {
    /// Classify from the minimum fetch of a full ray fan. Lower bounds are inclusive.
    pub fn classify(min_fetch_nm: f64) -> Self {
        if min_fetch_nm < INLAND_MAX_NM {
            Waterway::Inland
        } else if min_fetch_nm < COASTAL_MAX_NM {
            Waterway::Coastal
        } else {
            Waterway::Offshore
        }
    }
}

impl fmt::Display for Waterway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Waterway::Inland => "inland",
            Waterway::Coastal => "coastal",
            Waterway::Offshore => "offshore",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum WaveSource {
    /// Offshore buoy observation.
    Buoy {
        station: String,
        distance_nm: Option<f64>,
    },
    /// Forecast model output or any other non-buoy source.
    Forecast { model: String },
    /// Produced by the wave growth model from wind and fetch.
    Synthesized,
}

impl WaveSource {
    pub fn is_buoy(&self) -> bool {
        matches!(self, WaveSource::Buoy { .. })
    }

    pub fn is_synthesized(&self) -> bool {
        matches!(self, WaveSource::Synthesized)
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct WaveState {
    pub height_ft: f64,
    pub period_s: Option<f64>,
    pub dir_deg: Option<f64>,
    pub source: WaveSource,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TidePhase {
    Flood,
    Ebb,
    Slack,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct TideState {
    pub height_ft: Option<f64>,
    /// Rate of change of tide height; magnitude is the flow proxy.
    pub rate_ft_per_hr: Option<f64>,
    pub phase: Option<TidePhase>,
    /// Estimated flow direction, degrees true.
    pub flow_dir_deg: Option<f64>,
}

/// Merged environment for one (point, time). `None` always means unknown.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct EnvAtPoint {
    pub lat: f64,
    pub lon: f64,
    pub time: DateTime<Utc>,
    pub t_local: String,
    pub route_heading_deg: Option<f64>,

    pub wind_speed_kt: Option<f64>,
    pub wind_gust_kt: Option<f64>,
    pub wind_dir_deg: Option<f64>,
    /// Probability of precipitation, 0..1.
    pub precip_prob: Option<f64>,

    pub wave: Option<WaveState>,
    pub tide: Option<TideState>,
    pub current_kt: Option<f64>,
    pub current_dir_deg: Option<f64>,
    pub depth_m: Option<f64>,
    /// Hours the wind has held roughly steady before this time.
    pub wind_duration_hr: Option<f64>,

    /// Effective (wind-weighted) fetch.
    pub fetch_nm: Option<f64>,
    pub min_fetch_nm: Option<f64>,
    pub waterway: Option<Waterway>,
    /// Set when a buoy wave observation was discarded as irrelevant to sheltered water.
    pub waves_suppressed: bool,

    pub notes: BTreeMap<String, String>,
}

impl EnvAtPoint {
    pub fn empty(point: &NormalizedPoint) -> Self {
        EnvAtPoint {
            lat: point.lat,
            lon: point.lon,
            time: point.time,
            t_local: point.t_local.clone(),
            route_heading_deg: Some(point.heading_deg),
            wind_speed_kt: None,
            wind_gust_kt: None,
            wind_dir_deg: None,
            precip_prob: None,
            wave: None,
            tide: None,
            current_kt: None,
            current_dir_deg: None,
            depth_m: None,
            wind_duration_hr: None,
            fetch_nm: None,
            min_fetch_nm: None,
            waterway: None,
            waves_suppressed: false,
            notes: BTreeMap::new(),
        }
    }

    pub fn wave_height_ft(&self) -> Option<f64> {
        self.wave.as_ref().map(|w| w.height_ft)
    }

    pub fn wave_period_s(&self) -> Option<f64> {
        self.wave.as_ref().and_then(|w| w.period_s)
    }

    pub fn wave_dir_deg(&self) -> Option<f64> {
        self.wave.as_ref().and_then(|w| w.dir_deg)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Avoid,
    Rough,
    Ok,
    Great,
}

impl Label {
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            Label::Great
        } else if score >= 60.0 {
            Label::Ok
        } else if score >= 40.0 {
            Label::Rough
        } else {
            Label::Avoid
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Label::Great => "great",
            Label::Ok => "ok",
            Label::Rough => "rough",
            Label::Avoid => "avoid",
        };
        f.write_str(s)
    }
}

/// Points deducted per factor. `None` when the factor's input was unknown.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Penalties {
    pub wind: Option<f64>,
    pub gust: Option<f64>,
    pub wave_height: Option<f64>,
    pub wave_period: Option<f64>,
    pub steepness: Option<f64>,
    pub wind_against_waves: Option<f64>,
    pub tide_flow: Option<f64>,
    pub wind_against_tide: Option<f64>,
    pub current: Option<f64>,
    pub wind_against_current: Option<f64>,
    pub precipitation: Option<f64>,
}

impl Penalties {
    pub fn total(&self) -> f64 {
        [
            self.wind,
            self.gust,
            self.wave_height,
            self.wave_period,
            self.steepness,
            self.wind_against_waves,
            self.tide_flow,
            self.wind_against_tide,
            self.current,
            self.wind_against_current,
            self.precipitation,
        ]
        .iter()
        .flatten()
        .sum()
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct RideScore {
    pub lat: f64,
    pub lon: f64,
    pub time: DateTime<Utc>,
    pub t_local: String,
    pub score: f64,
    pub label: Label,
    pub reasons: Vec<String>,
    pub wave_steepness: Option<f64>,
    pub penalties: Penalties,
    pub env: EnvAtPoint,
}
