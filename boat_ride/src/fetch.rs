use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::{LatLon, Waterway};
use crate::route::angle_diff_deg;
use crate::shoreline::ShorelineIndex;

pub const NUM_RAYS: usize = 16;
/// Half-width of the SPM weighting window around the wind direction.
pub const SPM_HALF_WINDOW_DEG: f64 = 45.0;

#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
pub struct FetchRay {
    pub bearing_deg: f64,
    /// `None` when no coastline was hit within the search radius.
    pub hit_nm: Option<f64>,
}

/// The ray fan cast from one point.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct FetchProfile {
    pub rays: Vec<FetchRay>,
    pub max_ray_nm: f64,
}

impl FetchProfile {
    /// Build a profile from ray distances at evenly spaced bearings starting north.
    pub fn from_distances(distances: &[Option<f64>], max_ray_nm: f64) -> Self {
        let step = 360.0 / distances.len().max(1) as f64;
        let rays = distances
            .iter()
            .enumerate()
            .map(|(i, &hit_nm)| FetchRay {
                bearing_deg: i as f64 * step,
                hit_nm,
            })
            .collect();
        FetchProfile { rays, max_ray_nm }
    }

    fn ray_nm(&self, ray: &FetchRay) -> f64 {
        ray.hit_nm.unwrap_or(self.max_ray_nm).min(self.max_ray_nm)
    }

    pub fn min_nm(&self) -> f64 {
        self.rays
            .iter()
            .map(|r| self.ray_nm(r))
            .fold(self.max_ray_nm, f64::min)
    }

    pub fn mean_nm(&self) -> f64 {
        if self.rays.is_empty() {
            return self.max_ray_nm;
        }
        self.rays.iter().map(|r| self.ray_nm(r)).sum::<f64>() / self.rays.len() as f64
    }

    pub fn waterway(&self) -> Waterway {
        Waterway::classify(self.min_nm())
    }

    /// SPM cos² weighted fetch toward the direction the wind blows from.
    ///
    /// Only rays within ±45° of the wind contribute. Without a wind direction the
    /// unweighted mean of the fan is used.
    pub fn effective_nm(&self, wind_dir_deg: Option<f64>) -> f64 {
        let wind_dir = match wind_dir_deg {
            Some(d) => d,
            None => return self.mean_nm(),
        };

        let (weighted, total) = self
            .rays
            .iter()
            .filter_map(|ray| {
                let offset = angle_diff_deg(ray.bearing_deg, wind_dir);
                if offset <= SPM_HALF_WINDOW_DEG {
                    let w = offset.to_radians().cos().powi(2);
                    Some((w * self.ray_nm(ray), w))
                } else {
                    None
                }
            })
            .fold((0.0, 0.0), |(s, t), (ws, w)| (s + ws, t + w));

        if total > 0.0 {
            weighted / total
        } else {
            self.min_nm()
        }
    }
}

/// Casts the ray fan against a shoreline index.
#[derive(Clone)]
pub struct FetchCalculator {
    shoreline: Arc<ShorelineIndex>,
    max_ray_nm: f64,
}

impl FetchCalculator {
    pub fn new(shoreline: Arc<ShorelineIndex>, max_ray_nm: f64) -> Self {
        FetchCalculator {
            shoreline,
            max_ray_nm,
        }
    }

    /// Calculator over the process-wide coastline.
    pub fn shared(config: &Config) -> Result<Self> {
        Self::with_shoreline(ShorelineIndex::shared(config), config)
    }

    fn with_shoreline(shoreline: Result<Arc<ShorelineIndex>>, config: &Config) -> Result<Self> {
        let shoreline =
            shoreline.map_err(|e| Error::DataUnavailable(format!("fetch needs the coastline: {}", e)))?;
        Ok(Self::new(shoreline, config.max_ray_nm))
    }

    pub fn compute(&self, at: LatLon) -> FetchProfile {
        let distances: Vec<Option<f64>> = (0..NUM_RAYS)
            .map(|i| {
                let bearing = i as f64 * 360.0 / NUM_RAYS as f64;
                self.shoreline.ray_distance_nm(at, bearing, self.max_ray_nm)
            })
            .collect();
        FetchProfile::from_distances(&distances, self.max_ray_nm)
    }
}
