//! National Weather Service forecast provider.
//!
//! Resolves a point to its forecast office grid through `/points`, then reads
//! the hourly forecast for wind and precipitation. The raw grid data fills
//! gusts and anything the hourly forecast left empty.

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use serde::Deserialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::http::{client_builder, get_json, get_text};
use super::{EnvProvider, PartialEnv, ProviderError, ProviderKind};
use crate::config::Config;
use crate::models::NormalizedPoint;
use crate::route::angle_diff_deg;

const NWS_BASE_URL: &str = "https://api.weather.gov";

const MPH_TO_KT: f64 = 0.868976;
const KMH_TO_KT: f64 = 0.539957;
const MPS_TO_KT: f64 = 1.943844;

/// Hourly periods this far from the sample time are still used when none contains it.
const MAX_PERIOD_GAP_MINUTES: i64 = 90;

/// How far speed (fraction) and direction (degrees) may drift while the wind counts as steady.
const STEADY_SPEED_FRACTION: f64 = 0.3;
const STEADY_DIR_DEG: f64 = 45.0;
const MIN_STEADY_HOURS: f64 = 1.0;

#[derive(Clone, Debug, Deserialize)]
struct PointsResponse {
    properties: PointsProperties,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PointsProperties {
    forecast_hourly: Option<String>,
    forecast_grid_data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HourlyResponse {
    properties: HourlyProperties,
}

#[derive(Debug, Deserialize)]
struct HourlyProperties {
    #[serde(default)]
    periods: Vec<RawPeriod>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPeriod {
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    wind_speed: Option<String>,
    wind_gust: Option<String>,
    wind_direction: Option<String>,
    probability_of_precipitation: Option<QuantitativeValue>,
}

#[derive(Debug, Deserialize)]
struct QuantitativeValue {
    value: Option<f64>,
}

/// One forecastHourly period, converted to knots, degrees and 0..1.
#[derive(Clone, Debug, PartialEq)]
pub struct HourlyPeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub wind_speed_kt: Option<f64>,
    pub wind_gust_kt: Option<f64>,
    pub wind_dir_deg: Option<f64>,
    pub precip_prob: Option<f64>,
}

impl From<RawPeriod> for HourlyPeriod {
    fn from(raw: RawPeriod) -> Self {
        HourlyPeriod {
            start: raw.start_time,
            end: raw.end_time,
            wind_speed_kt: raw.wind_speed.as_deref().and_then(parse_wind_speed_kt),
            wind_gust_kt: raw.wind_gust.as_deref().and_then(parse_wind_speed_kt),
            wind_dir_deg: raw.wind_direction.as_deref().and_then(parse_direction_deg),
            precip_prob: raw
                .probability_of_precipitation
                .and_then(|q| q.value)
                .map(|v| (v / 100.0).clamp(0.0, 1.0)),
        }
    }
}

pub fn parse_hourly(json: &str) -> serde_json::Result<Vec<HourlyPeriod>> {
    let response: HourlyResponse = serde_json::from_str(json)?;
    Ok(response.properties.periods.into_iter().map(HourlyPeriod::from).collect())
}

/// Parse "10 mph" or "5 to 10 mph" into knots. Ranges use their midpoint.
pub fn parse_wind_speed_kt(text: &str) -> Option<f64> {
    let lower = text.trim().to_lowercase();
    let (number, factor) = if let Some(rest) = lower.strip_suffix("mph") {
        (rest, MPH_TO_KT)
    } else if let Some(rest) = lower.strip_suffix("km/h") {
        (rest, KMH_TO_KT)
    } else if let Some(rest) = lower.strip_suffix("kt") {
        (rest, 1.0)
    } else {
        (lower.as_str(), MPH_TO_KT)
    };
    let number = number.trim();
    let mph = match number.split_once(" to ") {
        Some((lo, hi)) => (lo.trim().parse::<f64>().ok()? + hi.trim().parse::<f64>().ok()?) / 2.0,
        None => number.parse::<f64>().ok()?,
    };
    Some(mph * factor)
}

/// Compass point ("SSW") or numeric degrees to degrees true.
pub fn parse_direction_deg(text: &str) -> Option<f64> {
    const COMPASS: [&str; 16] = [
        "N", "NNE", "NE", "ENE", "E", "ESE", "SE", "SSE", "S", "SSW", "SW", "WSW", "W", "WNW", "NW", "NNW",
    ];
    let upper = text.trim().to_uppercase();
    if let Ok(deg) = upper.parse::<f64>() {
        return Some(deg.rem_euclid(360.0));
    }
    COMPASS
        .iter()
        .position(|c| *c == upper)
        .map(|i| i as f64 * 22.5)
}

/// The period containing `time`, else the one starting nearest to it within a short gap.
pub fn pick_period(periods: &[HourlyPeriod], time: DateTime<Utc>) -> Option<&HourlyPeriod> {
    if let Some(p) = periods.iter().find(|p| p.start <= time && time < p.end) {
        return Some(p);
    }
    periods
        .iter()
        .map(|p| (p, (p.start - time).num_minutes().abs()))
        .filter(|(_, gap)| *gap <= MAX_PERIOD_GAP_MINUTES)
        .min_by_key(|(_, gap)| *gap)
        .map(|(p, _)| p)
}

/// Hours the wind at `time` has held its speed and direction, counted back
/// through contiguous hourly periods.
///
/// `None` when the series runs out before the wind changes: the history is
/// unknown, so the sea is treated as fully developed.
pub fn steady_wind_hours(periods: &[HourlyPeriod], time: DateTime<Utc>) -> Option<f64> {
    let idx = periods.iter().position(|p| p.start <= time && time < p.end)?;
    let current = &periods[idx];
    let (speed, dir) = (current.wind_speed_kt?, current.wind_dir_deg?);
    let tolerance_kt = STEADY_SPEED_FRACTION * speed.max(1.0);

    let mut since = current.start;
    for p in periods[..idx].iter().rev() {
        let steady = p.end == since
            && p.wind_speed_kt.map_or(false, |s| (s - speed).abs() <= tolerance_kt)
            && p.wind_dir_deg.map_or(false, |d| angle_diff_deg(d, dir) <= STEADY_DIR_DEG);
        if !steady {
            let hours = (time - since).num_minutes() as f64 / 60.0;
            return Some(hours.max(MIN_STEADY_HOURS));
        }
        since = p.start;
    }
    None
}

// Grid data

#[derive(Debug, Deserialize)]
struct GridResponse {
    properties: GridProperties,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GridProperties {
    wind_speed: Option<GridLayer>,
    wind_gust: Option<GridLayer>,
    wind_direction: Option<GridLayer>,
    probability_of_precipitation: Option<GridLayer>,
}

#[derive(Debug, Deserialize)]
struct GridLayer {
    #[serde(alias = "unitCode")]
    uom: Option<String>,
    #[serde(default)]
    values: Vec<GridValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GridValue {
    valid_time: String,
    value: Option<f64>,
}

/// Values keyed by their validity interval `[start, end)`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GridSeries(Vec<(DateTime<Utc>, DateTime<Utc>, Option<f64>)>);

impl GridSeries {
    fn from_layer(layer: Option<GridLayer>, convert: impl Fn(f64, &str) -> f64) -> Self {
        let Some(layer) = layer else {
            return GridSeries::default();
        };
        let uom = layer.uom.unwrap_or_default();
        let entries = layer
            .values
            .into_iter()
            .filter_map(|v| {
                let (start, end) = parse_valid_time(&v.valid_time)?;
                Some((start, end, v.value.map(|x| convert(x, &uom))))
            })
            .collect();
        GridSeries(entries)
    }

    pub fn at(&self, time: DateTime<Utc>) -> Option<f64> {
        self.0
            .iter()
            .find(|(start, end, _)| *start <= time && time < *end)
            .and_then(|(_, _, v)| *v)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct GridForecast {
    pub wind_speed_kt: GridSeries,
    pub wind_gust_kt: GridSeries,
    pub wind_dir_deg: GridSeries,
    pub precip_prob: GridSeries,
}

fn speed_to_kt(value: f64, uom: &str) -> f64 {
    if uom.contains("m_s-1") {
        value * MPS_TO_KT
    } else if uom.contains("km_h-1") {
        value * KMH_TO_KT
    } else {
        value
    }
}

pub fn parse_grid(json: &str) -> serde_json::Result<GridForecast> {
    let grid: GridResponse = serde_json::from_str(json)?;
    let props = grid.properties;
    Ok(GridForecast {
        wind_speed_kt: GridSeries::from_layer(props.wind_speed, speed_to_kt),
        wind_gust_kt: GridSeries::from_layer(props.wind_gust, speed_to_kt),
        wind_dir_deg: GridSeries::from_layer(props.wind_direction, |v, _| v.rem_euclid(360.0)),
        precip_prob: GridSeries::from_layer(props.probability_of_precipitation, |v, _| {
            (v / 100.0).clamp(0.0, 1.0)
        }),
    })
}

/// Parse an ISO 8601 interval such as `2026-01-22T14:00:00+00:00/PT1H`.
pub fn parse_valid_time(text: &str) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let (start, duration) = text.split_once('/')?;
    let start = DateTime::parse_from_rfc3339(start).ok()?.with_timezone(&Utc);
    Some((start, start + parse_iso_duration(duration)?))
}

/// Parse the day/hour/minute subset of ISO 8601 durations (`P1DT6H`, `PT30M`).
pub fn parse_iso_duration(text: &str) -> Option<TimeDelta> {
    let body = text.strip_prefix('P')?;
    let (date_part, time_part) = body.split_once('T').unwrap_or((body, ""));
    let mut total = TimeDelta::zero();
    let mut number = String::new();
    for (in_time, c) in date_part
        .chars()
        .map(|c| (false, c))
        .chain(time_part.chars().map(|c| (true, c)))
    {
        if c.is_ascii_digit() {
            number.push(c);
            continue;
        }
        let n: i64 = number.parse().ok()?;
        number.clear();
        total += match (in_time, c) {
            (false, 'W') => TimeDelta::weeks(n),
            (false, 'D') => TimeDelta::days(n),
            (true, 'H') => TimeDelta::hours(n),
            (true, 'M') => TimeDelta::minutes(n),
            (true, 'S') => TimeDelta::seconds(n),
            _ => return None,
        };
    }
    if !number.is_empty() || total <= TimeDelta::zero() {
        return None;
    }
    Some(total)
}

async fn cached<T, Fut>(
    cache: &RwLock<HashMap<String, T>>,
    key: &str,
    load: Fut,
) -> Result<T, ProviderError>
where
    T: Clone,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    if let Some(hit) = cache.read().await.get(key) {
        return Ok(hit.clone());
    }
    let value = load.await?;
    cache.write().await.insert(key.to_string(), value.clone());
    Ok(value)
}

pub struct NwsProvider {
    client: reqwest::Client,
    base_url: String,
    /// `None` marks a point outside NWS coverage.
    points: RwLock<HashMap<String, Option<PointsProperties>>>,
    hourly: RwLock<HashMap<String, Arc<Vec<HourlyPeriod>>>>,
    grids: RwLock<HashMap<String, Arc<GridForecast>>>,
}

impl NwsProvider {
    pub fn new(config: &Config) -> reqwest::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/geo+json"));
        let client = client_builder(config).default_headers(headers).build()?;
        Ok(NwsProvider {
            client,
            base_url: NWS_BASE_URL.to_string(),
            points: RwLock::new(HashMap::new()),
            hourly: RwLock::new(HashMap::new()),
            grids: RwLock::new(HashMap::new()),
        })
    }

    pub fn build_points_url(base_url: &str, lat: f64, lon: f64) -> String {
        format!("{}/points/{:.4},{:.4}", base_url, lat, lon)
    }

    async fn points(&self, lat: f64, lon: f64) -> Result<Option<PointsProperties>, ProviderError> {
        let url = Self::build_points_url(&self.base_url, lat, lon);
        cached(&self.points, &url, async {
            let response: Option<PointsResponse> = get_json(&self.client, &url).await?;
            Ok(response.map(|r| r.properties))
        })
        .await
    }

    async fn hourly(&self, url: &str) -> Result<Arc<Vec<HourlyPeriod>>, ProviderError> {
        cached(&self.hourly, url, async {
            let response: Option<HourlyResponse> = get_json(&self.client, url).await?;
            let periods = response
                .map(|r| r.properties.periods.into_iter().map(HourlyPeriod::from).collect())
                .unwrap_or_default();
            Ok(Arc::new(periods))
        })
        .await
    }

    async fn grid(&self, url: &str) -> Result<Arc<GridForecast>, ProviderError> {
        cached(&self.grids, url, async {
            let text = get_text(&self.client, url).await?;
            let grid = match text {
                Some(body) => parse_grid(&body).map_err(|e| ProviderError::Permanent(format!("grid data: {}", e)))?,
                None => GridForecast::default(),
            };
            Ok(Arc::new(grid))
        })
        .await
    }
}

#[async_trait]
impl EnvProvider for NwsProvider {
    fn name(&self) -> &str {
        "nws"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Weather
    }

    async fn query(&self, point: &NormalizedPoint) -> Result<PartialEnv, ProviderError> {
        let Some(props) = self.points(point.lat, point.lon).await? else {
            return Ok(PartialEnv::default().note("nws_path", "outside_coverage"));
        };

        let mut env = PartialEnv::default();
        let mut path: Option<&str> = None;
        let mut hourly_error = None;

        if let Some(url) = &props.forecast_hourly {
            match self.hourly(url).await {
                Ok(periods) => {
                    if let Some(p) = pick_period(&periods, point.time) {
                        env.wind_speed_kt = p.wind_speed_kt;
                        env.wind_gust_kt = p.wind_gust_kt;
                        env.wind_dir_deg = p.wind_dir_deg;
                        env.precip_prob = p.precip_prob;
                        env.wind_duration_hr = steady_wind_hours(&periods, point.time);
                        path = Some("forecastHourly");
                    }
                }
                Err(e) => {
                    log::warn!("NWS hourly forecast failed for {}: {}", url, e);
                    hourly_error = Some(e);
                }
            }
        }

        let incomplete = env.wind_speed_kt.is_none()
            || env.wind_gust_kt.is_none()
            || env.wind_dir_deg.is_none()
            || env.precip_prob.is_none();
        if let (true, Some(url)) = (incomplete, &props.forecast_grid_data) {
            match self.grid(url).await {
                Ok(grid) => {
                    let t = point.time;
                    env.wind_speed_kt = env.wind_speed_kt.or_else(|| grid.wind_speed_kt.at(t));
                    env.wind_gust_kt = env.wind_gust_kt.or_else(|| grid.wind_gust_kt.at(t));
                    env.wind_dir_deg = env.wind_dir_deg.or_else(|| grid.wind_dir_deg.at(t));
                    env.precip_prob = env.precip_prob.or_else(|| grid.precip_prob.at(t));
                    if path.is_none() && env.wind_speed_kt.is_some() {
                        path = Some("forecastGridData");
                    }
                }
                Err(e) if path.is_some() => log::warn!("NWS grid data failed for {}: {}", url, e),
                Err(e) => return Err(e),
            }
        }

        if path.is_none() {
            if let Some(e) = hourly_error {
                return Err(e);
            }
        }

        Ok(env.note("weather_source", "nws").note("nws_path", path.unwrap_or("none")))
    }
}
