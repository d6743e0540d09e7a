//! Trip plan ingestion.
//!
//! Every timestamp is normalised to UTC here. Local times only survive as
//! display strings rendered in the plan's IANA zone.

use chrono::{DateTime, LocalResult, NaiveDateTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{BoatProfile, RoutePoint};

const LOCAL_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%dT%H:%M:%S",
];

const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M %Z";

const NANOS_PER_SEC: i128 = 1_000_000_000;

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TripPlan {
    #[serde(default = "default_trip_id")]
    pub trip_id: String,
    #[serde(default)]
    pub boat: Option<BoatProfile>,
    pub route: Vec<RoutePoint>,
    /// RFC 3339, or a naive local time in `timezone`.
    #[serde(alias = "start_time_local")]
    pub start: String,
    #[serde(alias = "end_time_local")]
    pub end: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_sample_every_minutes")]
    pub sample_every_minutes: i64,
    /// Overrides the interval-derived sample count when set.
    #[serde(default)]
    pub sample_count: Option<usize>,
    /// Provider selector, e.g. `nws+ndbc+fetch+coops`.
    #[serde(default)]
    pub providers: Option<String>,
}

fn default_trip_id() -> String {
    "trip".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_sample_every_minutes() -> i64 {
    15
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub tz: Tz,
}

impl TimeWindow {
    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }

    /// Whole nanoseconds in the window, exact for any representable span.
    fn duration_ns(&self) -> i128 {
        let d = self.duration();
        d.num_seconds() as i128 * NANOS_PER_SEC + d.subsec_nanos() as i128
    }

    /// Time of sample `k` out of `count`: `start + k * duration / count`.
    ///
    /// Distinct `k` map to distinct instants as long as `count` does not
    /// exceed the window length in nanoseconds.
    pub fn sample_time(&self, k: usize, count: usize) -> DateTime<Utc> {
        let count = count.max(1) as i128;
        let offset = self.duration_ns() * k as i128 / count;
        self.start
            + TimeDelta::seconds((offset / NANOS_PER_SEC) as i64)
            + TimeDelta::nanoseconds((offset % NANOS_PER_SEC) as i64)
    }

    pub fn local_string(&self, time: DateTime<Utc>) -> String {
        local_string(time, self.tz)
    }
}

/// A trip plan that passed validation.
#[derive(Clone, Debug)]
pub struct Trip {
    pub trip_id: String,
    pub boat: BoatProfile,
    pub route: Vec<RoutePoint>,
    pub window: TimeWindow,
    pub samples: usize,
    pub providers: Option<String>,
}

impl TripPlan {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::validation(format!("malformed trip plan: {}", e)))
    }

    pub fn validate(&self) -> Result<Trip> {
        if self.route.len() < 2 {
            return Err(Error::validation(format!(
                "route needs at least two vertices, got {}",
                self.route.len()
            )));
        }
        if let Some(p) = self
            .route
            .iter()
            .find(|p| !p.lat.is_finite() || !p.lon.is_finite() || p.lat.abs() > 90.0)
        {
            return Err(Error::validation(format!("invalid vertex {:?}", p)));
        }
        if let Some(p) = self.route.iter().find(|p| {
            [p.hints.depth_m, p.hints.fetch_nm]
                .iter()
                .flatten()
                .any(|v| !v.is_finite() || *v <= 0.0)
        }) {
            return Err(Error::validation(format!(
                "depth and fetch hints must be positive, got {:?}",
                p
            )));
        }
        if self.sample_every_minutes <= 0 {
            return Err(Error::validation("sample interval must be positive"));
        }
        if self.sample_count == Some(0) {
            return Err(Error::validation("sample count must be positive"));
        }

        let tz = parse_timezone(&self.timezone)?;
        let start = parse_timestamp(&self.start, tz)?;
        let end = parse_timestamp(&self.end, tz)?;
        if end <= start {
            return Err(Error::validation(format!(
                "end ({}) must be after start ({})",
                end, start
            )));
        }

        let window = TimeWindow { start, end, tz };
        let samples = match self.sample_count {
            Some(n) => n,
            None => {
                // An interval too large to express in seconds is longer than any window.
                let interval_s = self.sample_every_minutes.saturating_mul(60);
                (window.duration().num_seconds() / interval_s).max(1) as usize
            }
        };
        if samples as u128 > window.duration_ns() as u128 {
            return Err(Error::validation(format!(
                "{} samples cannot be told apart within a {} window",
                samples,
                window.duration()
            )));
        }

        Ok(Trip {
            trip_id: self.trip_id.clone(),
            boat: self.boat.clone().unwrap_or_default(),
            route: self.route.clone(),
            window,
            samples,
            providers: self.providers.clone(),
        })
    }
}

pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|_| Error::validation(format!("unknown timezone '{}'", name)))
}

/// Parse an RFC 3339 timestamp, or a naive local time interpreted in `tz`.
///
/// Ambiguous local times (DST fall-back) resolve to the earlier instant;
/// local times inside a DST gap are rejected.
pub fn parse_timestamp(s: &str, tz: Tz) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    let naive = LOCAL_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .ok_or_else(|| Error::validation(format!("unparseable timestamp '{}'", s)))?;

    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest.with_timezone(&Utc)),
        LocalResult::None => Err(Error::validation(format!(
            "local time '{}' does not exist in {}",
            s, tz
        ))),
    }
}

pub fn local_string(time: DateTime<Utc>, tz: Tz) -> String {
    time.with_timezone(&tz).format(DISPLAY_FORMAT).to_string()
}
