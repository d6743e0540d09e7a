//! NDBC realtime buoy waves.
//!
//! Picks the nearest active station whose realtime file reports wave height
//! and reads the observation closest to the sample time.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};

use super::http::{build_client, get_text};
use super::{EnvProvider, PartialEnv, ProviderError, ProviderKind};
use crate::config::Config;
use crate::models::{LatLon, NormalizedPoint, WaveSource, WaveState};
use crate::route::haversine_nm;

const NDBC_BASE_URL: &str = "https://www.ndbc.noaa.gov";

pub const MAX_STATION_NM: f64 = 200.0;
pub const MAX_OBS_AGE_HOURS: i64 = 6;
/// Stations tried per query before giving up.
const MAX_CANDIDATES: usize = 50;
const M_TO_FT: f64 = 3.28084;

#[derive(Clone, Debug, PartialEq)]
pub struct Station {
    pub id: String,
    pub lat: f64,
    pub lon: f64,
    pub name: String,
}

fn attr<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    let needle = format!(" {}=\"", name);
    let start = tag.find(&needle)? + needle.len();
    let len = tag[start..].find('"')?;
    Some(&tag[start..start + len])
}

/// Read `<station id=".." lat=".." lon=".." name=".."/>` elements.
pub fn parse_active_stations(xml: &str) -> Vec<Station> {
    xml.split("<station")
        .skip(1)
        .filter_map(|chunk| {
            let tag = &chunk[..chunk.find('>')?];
            let tag = format!(" {}", tag.trim_start());
            Some(Station {
                id: attr(&tag, "id")?.trim().to_string(),
                lat: attr(&tag, "lat")?.trim().parse().ok()?,
                lon: attr(&tag, "lon")?.trim().parse().ok()?,
                name: attr(&tag, "name").unwrap_or_default().trim().to_string(),
            })
        })
        .filter(|s| !s.id.is_empty())
        .collect()
}

/// Stations within `max_nm`, nearest first.
pub fn rank_stations(stations: &[Station], at: LatLon, max_nm: f64) -> Vec<(&Station, f64)> {
    let mut ranked: Vec<(&Station, f64)> = stations
        .iter()
        .map(|s| (s, haversine_nm(at, LatLon::new(s.lat, s.lon))))
        .filter(|(_, d)| *d <= max_nm)
        .collect();
    ranked.sort_by(|a, b| a.1.total_cmp(&b.1));
    ranked
}

#[derive(Clone, Debug, PartialEq)]
pub struct WaveObservation {
    pub time: DateTime<Utc>,
    pub height_ft: f64,
    pub period_s: Option<f64>,
    pub dir_deg: Option<f64>,
}

fn value(parts: &[&str], idx: Option<usize>) -> Option<f64> {
    let raw = *parts.get(idx?)?;
    if raw == "MM" {
        return None;
    }
    raw.parse().ok()
}

/// Parse a realtime2 standard meteorological file, keeping rows with a wave height.
///
/// Rows are UTC. Heights convert from metres to feet; the dominant period is
/// preferred over the average period.
pub fn parse_realtime(txt: &str) -> Vec<WaveObservation> {
    let mut lines = txt.lines().map(str::trim).filter(|l| !l.is_empty());
    let Some(header) = lines.next().and_then(|l| l.strip_prefix('#')) else {
        return Vec::new();
    };
    let columns: Vec<&str> = header.split_whitespace().collect();
    let col = |name: &str| columns.iter().position(|c| *c == name);

    let (Some(i_yy), Some(i_mo), Some(i_dd), Some(i_hh)) = (col("YY").or(col("YYYY")), col("MM"), col("DD"), col("hh"))
    else {
        return Vec::new();
    };
    let i_wvht = col("WVHT");
    if i_wvht.is_none() {
        return Vec::new();
    }
    let (i_min, i_dpd, i_apd, i_mwd) = (col("mm"), col("DPD"), col("APD"), col("MWD"));

    lines
        .filter(|l| !l.starts_with('#'))
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            let year: i32 = parts.get(i_yy)?.parse().ok()?;
            let year = match year {
                y if y >= 1900 => y,
                y if y < 70 => 2000 + y,
                y => 1900 + y,
            };
            let month: u32 = parts.get(i_mo)?.parse().ok()?;
            let day: u32 = parts.get(i_dd)?.parse().ok()?;
            let hour: u32 = parts.get(i_hh)?.parse().ok()?;
            let minute: u32 = i_min.and_then(|i| parts.get(i)?.parse().ok()).unwrap_or(0);
            let time = NaiveDate::from_ymd_opt(year, month, day)?
                .and_hms_opt(hour, minute, 0)?
                .and_utc();

            let height_m = value(&parts, i_wvht)?;
            Some(WaveObservation {
                time,
                height_ft: height_m * M_TO_FT,
                period_s: value(&parts, i_dpd).or_else(|| value(&parts, i_apd)),
                dir_deg: value(&parts, i_mwd),
            })
        })
        .collect()
}

/// The observation nearest `time`, if within the age limit.
pub fn nearest_observation(
    observations: &[WaveObservation],
    time: DateTime<Utc>,
    max_gap: TimeDelta,
) -> Option<&WaveObservation> {
    observations
        .iter()
        .map(|o| (o, (o.time - time).abs()))
        .filter(|(_, gap)| *gap <= max_gap)
        .min_by_key(|(_, gap)| *gap)
        .map(|(o, _)| o)
}

pub struct NdbcProvider {
    client: reqwest::Client,
    base_url: String,
    stations: OnceCell<Arc<Vec<Station>>>,
    observations: RwLock<HashMap<String, Arc<Vec<WaveObservation>>>>,
}

impl NdbcProvider {
    pub fn new(config: &Config) -> reqwest::Result<Self> {
        Ok(NdbcProvider {
            client: build_client(config)?,
            base_url: NDBC_BASE_URL.to_string(),
            stations: OnceCell::new(),
            observations: RwLock::new(HashMap::new()),
        })
    }

    pub fn build_realtime_url(base_url: &str, station: &str) -> String {
        format!("{}/data/realtime2/{}.txt", base_url, station.to_uppercase())
    }

    async fn stations(&self) -> Result<Arc<Vec<Station>>, ProviderError> {
        self.stations
            .get_or_try_init(|| async {
                let url = format!("{}/activestations.xml", self.base_url);
                let xml = get_text(&self.client, &url)
                    .await?
                    .ok_or_else(|| ProviderError::Permanent(format!("{} not found", url)))?;
                let stations = parse_active_stations(&xml);
                log::info!("Loaded {} NDBC stations", stations.len());
                Ok(Arc::new(stations))
            })
            .await
            .cloned()
    }

    /// Observations for one station; empty when it has no realtime file or no waves.
    async fn observations(&self, station: &str) -> Result<Arc<Vec<WaveObservation>>, ProviderError> {
        if let Some(hit) = self.observations.read().await.get(station) {
            return Ok(hit.clone());
        }
        let url = Self::build_realtime_url(&self.base_url, station);
        let parsed = match get_text(&self.client, &url).await? {
            Some(txt) => parse_realtime(&txt),
            None => Vec::new(),
        };
        let parsed = Arc::new(parsed);
        self.observations
            .write()
            .await
            .insert(station.to_string(), parsed.clone());
        Ok(parsed)
    }
}

#[async_trait]
impl EnvProvider for NdbcProvider {
    fn name(&self) -> &str {
        "ndbc"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Waves
    }

    async fn query(&self, point: &NormalizedPoint) -> Result<PartialEnv, ProviderError> {
        let stations = self.stations().await?;
        let ranked = rank_stations(&stations, point.position(), MAX_STATION_NM);

        for (station, distance_nm) in ranked.into_iter().take(MAX_CANDIDATES) {
            let observations = self.observations(&station.id).await?;
            if observations.is_empty() {
                continue;
            }

            let env = PartialEnv::default()
                .note("waves_source", "ndbc")
                .note("ndbc_station", &station.id)
                .note("ndbc_distance_nm", format!("{:.1}", distance_nm));
            let max_gap = TimeDelta::hours(MAX_OBS_AGE_HOURS);
            let Some(obs) = nearest_observation(&observations, point.time, max_gap) else {
                return Ok(env.note("ndbc_obs_time", "none_recent"));
            };
            let mut env = env.note("ndbc_obs_time", obs.time.format("%Y-%m-%d %H:%M"));
            env.wave = Some(WaveState {
                height_ft: obs.height_ft,
                period_s: obs.period_s,
                dir_deg: obs.dir_deg,
                source: WaveSource::Buoy {
                    station: station.id.clone(),
                    distance_nm: Some(distance_nm),
                },
            });
            return Ok(env);
        }

        log::debug!("No NDBC wave station within {} nm of point {}", MAX_STATION_NM, point.index);
        Ok(PartialEnv::default().note("ndbc_station", "none"))
    }
}
