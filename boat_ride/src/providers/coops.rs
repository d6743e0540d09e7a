//! NOAA CO-OPS tide predictions.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};

use super::http::{build_client, get_json};
use super::{EnvProvider, PartialEnv, ProviderError, ProviderKind};
use crate::config::Config;
use crate::models::{LatLon, NormalizedPoint, TidePhase, TideState};
use crate::route::haversine_nm;

const COOPS_API_URL: &str = "https://api.tidesandcurrents.noaa.gov/api/prod/datagetter";
const COOPS_STATIONS_URL: &str =
    "https://api.tidesandcurrents.noaa.gov/mdapi/prod/webapi/stations.json?type=tidepredictions";

/// Tide stations further than this say little about the water at the point.
pub const MAX_STATION_NM: f64 = 30.0;
/// Rates within this band (ft/hr) count as slack water.
pub const SLACK_RATE_FT_PER_HR: f64 = 0.05;
const PADDING_HOURS: i64 = 6;

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct TideStation {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub lat: f64,
    #[serde(rename = "lng")]
    pub lon: f64,
}

#[derive(Debug, Deserialize)]
struct StationsResponse {
    #[serde(default)]
    stations: Vec<serde_json::Value>,
}

pub fn parse_stations(json: &str) -> serde_json::Result<Vec<TideStation>> {
    let response: StationsResponse = serde_json::from_str(json)?;
    Ok(stations_from(response))
}

// Malformed entries are dropped rather than failing the whole list.
fn stations_from(response: StationsResponse) -> Vec<TideStation> {
    response
        .stations
        .into_iter()
        .filter_map(|v| serde_json::from_value(v).ok())
        .collect()
}

pub fn nearest_station(stations: &[TideStation], at: LatLon) -> Option<(&TideStation, f64)> {
    stations
        .iter()
        .map(|s| (s, haversine_nm(at, LatLon::new(s.lat, s.lon))))
        .min_by(|a, b| a.1.total_cmp(&b.1))
}

#[derive(Debug, Deserialize)]
struct PredictionsResponse {
    #[serde(default)]
    predictions: Vec<PredictionRow>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct PredictionRow {
    t: String,
    v: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// Predicted tide heights (ft above MLLW), sorted by time.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TideSeries {
    pub times: Vec<DateTime<Utc>>,
    pub heights: Vec<f64>,
}

impl TideSeries {
    /// Build from `("YYYY-MM-DD HH:MM" in GMT, height)` pairs; unparsable rows are skipped.
    pub fn from_rows<'a>(rows: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut points: Vec<(DateTime<Utc>, f64)> = rows
            .into_iter()
            .filter_map(|(t, v)| {
                let time = NaiveDateTime::parse_from_str(t.trim(), "%Y-%m-%d %H:%M").ok()?.and_utc();
                Some((time, v.trim().parse().ok()?))
            })
            .collect();
        points.sort_by_key(|(t, _)| *t);
        let (times, heights) = points.into_iter().unzip();
        TideSeries { times, heights }
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Linear interpolation; `None` outside the covered range.
    pub fn height_at(&self, time: DateTime<Utc>) -> Option<f64> {
        let first = *self.times.first()?;
        let last = *self.times.last()?;
        if time < first || time > last {
            return None;
        }
        let i = self.times.partition_point(|t| *t < time);
        if self.times[i] == time || i == 0 {
            return Some(self.heights[i]);
        }
        let (t0, t1) = (self.times[i - 1], self.times[i]);
        let span = (t1 - t0).num_milliseconds() as f64;
        if span <= 0.0 {
            return Some(self.heights[i - 1]);
        }
        let w = (time - t0).num_milliseconds() as f64 / span;
        Some(self.heights[i - 1] + w * (self.heights[i] - self.heights[i - 1]))
    }

    /// Central difference around the sample nearest `time`, in ft/hr.
    pub fn rate_at(&self, time: DateTime<Utc>) -> Option<f64> {
        if self.times.len() < 3 {
            return None;
        }
        let nearest = (0..self.times.len()).min_by_key(|&i| (self.times[i] - time).abs())?;
        let lo = nearest.saturating_sub(1);
        let hi = (nearest + 1).min(self.times.len() - 1);
        let hours = (self.times[hi] - self.times[lo]).num_seconds() as f64 / 3600.0;
        if hours <= 0.0 {
            return None;
        }
        Some((self.heights[hi] - self.heights[lo]) / hours)
    }
}

pub fn phase_from_rate(rate_ft_per_hr: f64) -> TidePhase {
    if rate_ft_per_hr > SLACK_RATE_FT_PER_HR {
        TidePhase::Flood
    } else if rate_ft_per_hr < -SLACK_RATE_FT_PER_HR {
        TidePhase::Ebb
    } else {
        TidePhase::Slack
    }
}

pub struct CoopsProvider {
    client: reqwest::Client,
    stations: OnceCell<Arc<Vec<TideStation>>>,
    /// Keyed by `station:date`.
    series: RwLock<HashMap<String, Arc<TideSeries>>>,
}

impl CoopsProvider {
    pub fn new(config: &Config) -> reqwest::Result<Self> {
        Ok(CoopsProvider {
            client: build_client(config)?,
            stations: OnceCell::new(),
            series: RwLock::new(HashMap::new()),
        })
    }

    /// Predictions for one UTC day, padded on both sides for interpolation at the edges.
    pub fn build_predictions_url(station: &str, date: NaiveDate) -> String {
        let start = date.and_time(NaiveTime::default()).and_utc();
        let begin = start - TimeDelta::hours(PADDING_HOURS);
        let end = start + TimeDelta::hours(24 + PADDING_HOURS);
        format!(
            "{}?product=predictions&application=boat_ride&station={}&begin_date={}&end_date={}\
             &datum=MLLW&units=english&time_zone=gmt&interval=6&format=json",
            COOPS_API_URL,
            station,
            begin.format("%Y%m%d%%20%H:%M"),
            end.format("%Y%m%d%%20%H:%M"),
        )
    }

    async fn stations(&self) -> Result<Arc<Vec<TideStation>>, ProviderError> {
        self.stations
            .get_or_try_init(|| async {
                let response: Option<StationsResponse> = get_json(&self.client, COOPS_STATIONS_URL).await?;
                let stations = response.map(stations_from).unwrap_or_default();
                log::info!("Loaded {} CO-OPS tide stations", stations.len());
                Ok(Arc::new(stations))
            })
            .await
            .cloned()
    }

    async fn series(&self, station: &str, date: NaiveDate) -> Result<Arc<TideSeries>, ProviderError> {
        let key = format!("{}:{}", station, date);
        if let Some(hit) = self.series.read().await.get(&key) {
            return Ok(hit.clone());
        }
        let url = Self::build_predictions_url(station, date);
        let response: Option<PredictionsResponse> = get_json(&self.client, &url).await?;
        let series = match response {
            Some(PredictionsResponse { error: Some(err), .. }) => {
                log::warn!("CO-OPS station {} returned no predictions: {}", station, err.message);
                TideSeries::default()
            }
            Some(r) => TideSeries::from_rows(r.predictions.iter().map(|row| (row.t.as_str(), row.v.as_str()))),
            None => TideSeries::default(),
        };
        let series = Arc::new(series);
        self.series.write().await.insert(key, series.clone());
        Ok(series)
    }
}

#[async_trait]
impl EnvProvider for CoopsProvider {
    fn name(&self) -> &str {
        "coops"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Tide
    }

    async fn query(&self, point: &NormalizedPoint) -> Result<PartialEnv, ProviderError> {
        let stations = self.stations().await?;
        let Some((station, distance_nm)) = nearest_station(&stations, point.position()) else {
            return Ok(PartialEnv::default().note("coops_station", "none"));
        };
        if distance_nm > MAX_STATION_NM {
            log::debug!(
                "Nearest tide station {} is {:.1} nm from point {}",
                station.id,
                distance_nm,
                point.index
            );
            return Ok(PartialEnv::default().note("coops_station", "none_nearby"));
        }

        let series = self.series(&station.id, point.time.date_naive()).await?;
        let env = PartialEnv::default()
            .note("tide_source", "coops")
            .note("coops_station", &station.id)
            .note("coops_station_name", &station.name)
            .note("coops_distance_nm", format!("{:.1}", distance_nm));
        if series.is_empty() {
            return Ok(env);
        }

        let rate = series.rate_at(point.time);
        let mut env = env;
        env.tide = Some(TideState {
            height_ft: series.height_at(point.time),
            rate_ft_per_hr: rate,
            phase: rate.map(phase_from_rate),
            flow_dir_deg: None,
        });
        Ok(env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, h, m, 0).unwrap()
    }

    fn series() -> TideSeries {
        TideSeries::from_rows(vec![
            ("2026-06-01 12:00", "1.000"),
            ("2026-06-01 12:06", "1.100"),
            ("2026-06-01 12:12", "1.200"),
            ("2026-06-01 12:18", "1.250"),
            ("bad", "1.0"),
            ("2026-06-01 12:24", "n/a"),
        ])
    }

    // =========================================================================
    // Stations
    // =========================================================================

    #[test]
    fn test_parse_stations_skips_malformed() {
        let json = r#"{"count": 3, "stations": [
            {"id": "8452660", "name": "Newport", "lat": 41.505, "lng": -71.3267, "state": "RI"},
            {"id": "8454000", "name": "Providence", "lat": 41.8071, "lng": -71.4012},
            {"id": "0000000", "name": "No position"}
        ]}"#;
        let stations = parse_stations(json).unwrap();
        assert_eq!(stations.len(), 2);
        assert_eq!(stations[0].name, "Newport");

        let (nearest, d) = nearest_station(&stations, LatLon::new(41.49, -71.33)).unwrap();
        assert_eq!(nearest.id, "8452660");
        assert!(d < MAX_STATION_NM);
        assert!(nearest_station(&[], LatLon::new(0.0, 0.0)).is_none());
    }

    // =========================================================================
    // Tide math
    // =========================================================================

    #[test]
    fn test_height_interpolation() {
        let s = series();
        assert_eq!(s.times.len(), 4);
        assert!((s.height_at(utc(12, 3)).unwrap() - 1.05).abs() < 1e-9);
        assert!((s.height_at(utc(12, 12)).unwrap() - 1.2).abs() < 1e-9);
        assert_eq!(s.height_at(utc(12, 0)), Some(1.0));
        assert!(s.height_at(utc(11, 0)).is_none());
        assert!(s.height_at(utc(13, 0)).is_none());
    }

    #[test]
    fn test_rate_central_difference() {
        let s = series();
        // (1.2 - 1.0) over 12 minutes
        assert!((s.rate_at(utc(12, 6)).unwrap() - 1.0).abs() < 1e-9);
        // Edge uses one-sided difference
        assert!((s.rate_at(utc(12, 0)).unwrap() - 1.0).abs() < 1e-9);
        assert!(TideSeries::default().rate_at(utc(12, 0)).is_none());
    }

    #[test]
    fn test_phase_from_rate() {
        assert_eq!(phase_from_rate(0.8), TidePhase::Flood);
        assert_eq!(phase_from_rate(-0.8), TidePhase::Ebb);
        assert_eq!(phase_from_rate(0.05), TidePhase::Slack);
        assert_eq!(phase_from_rate(-0.01), TidePhase::Slack);
    }

    #[test]
    fn test_build_predictions_url() {
        let url = CoopsProvider::build_predictions_url("8452660", NaiveDate::from_ymd_opt(2026, 6, 1).unwrap());
        assert!(url.starts_with(COOPS_API_URL));
        assert!(url.contains("station=8452660"));
        assert!(url.contains("begin_date=20260531%2018:00"));
        assert!(url.contains("end_date=20260602%2006:00"));
        assert!(url.contains("time_zone=gmt"));
    }
}
