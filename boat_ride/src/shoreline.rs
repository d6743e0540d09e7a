//! Coastline geometry for ray intersection queries.
//!
//! The dataset is a GeoJSON coastline (Natural Earth 1:10m by default),
//! downloaded once into the data directory and reused forever. Segments are
//! kept in an R-tree keyed by their lon/lat bounding box; rays are intersected
//! in a local equirectangular projection measured in nautical miles.

use anyhow::Context;
use geo::algorithm::line_intersection::{line_intersection, LineIntersection};
use geo::{coord, Coord, Line, LineString};
use once_cell::sync::OnceCell;
use rstar::{RTree, RTreeObject, AABB};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::LatLon;
use crate::route::normalize_lon;

const NM_PER_DEG_LAT: f64 = 60.0;
/// Floor for cos(lat) so polar queries degrade instead of dividing by zero.
const MIN_COS_LAT: f64 = 0.01;
pub const MIN_RAY_NM: f64 = 0.01;

static SHARED: OnceCell<Arc<ShorelineIndex>> = OnceCell::new();

#[derive(Clone, Debug)]
struct Segment {
    a: Coord<f64>,
    b: Coord<f64>,
}

impl RTreeObject for Segment {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners([self.a.x, self.a.y], [self.b.x, self.b.y])
    }
}

pub struct ShorelineIndex {
    tree: RTree<Segment>,
}

impl ShorelineIndex {
    /// Build from lon/lat line strings (x = lon, y = lat).
    pub fn from_lines(lines: impl IntoIterator<Item = LineString<f64>>) -> Self {
        let segments: Vec<Segment> = lines
            .into_iter()
            .flat_map(|line| {
                line.lines()
                    .filter(|l| l.start != l.end)
                    .map(|l| Segment { a: l.start, b: l.end })
                    .collect::<Vec<_>>()
            })
            .collect();
        ShorelineIndex {
            tree: RTree::bulk_load(segments),
        }
    }

    pub fn from_geojson(bytes: &[u8]) -> Result<Self> {
        let collection: FeatureCollection = serde_json::from_slice(bytes)
            .map_err(|e| Error::Shoreline(format!("corrupt coastline GeoJSON: {}", e)))?;

        let lines: Vec<LineString<f64>> = collection
            .features
            .into_iter()
            .filter_map(|f| f.geometry)
            .flat_map(Geometry::into_rings)
            .map(|ring| ring_to_line(&ring))
            .filter(|line| line.0.len() >= 2)
            .collect();

        if lines.is_empty() {
            return Err(Error::Shoreline("coastline dataset has no line geometry".into()));
        }
        Ok(Self::from_lines(lines))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| Error::Shoreline(format!("cannot read {}: {}", path.display(), e)))?;
        let index = Self::from_geojson(&bytes)?;
        log::info!(
            "Loaded coastline from {} ({} segments)",
            path.display(),
            index.segment_count()
        );
        Ok(index)
    }

    /// Process-wide index, loaded at most once from the cached dataset.
    pub fn shared(config: &Config) -> Result<Arc<ShorelineIndex>> {
        Self::cached_in(&SHARED, config)
    }

    /// Load the cached dataset into `cell` unless it already holds an index.
    ///
    /// Concurrent callers block on the first load; a failed load leaves the
    /// cell empty so nothing half-initialised is ever shared.
    pub fn cached_in(cell: &OnceCell<Arc<ShorelineIndex>>, config: &Config) -> Result<Arc<ShorelineIndex>> {
        cell.get_or_try_init(|| Self::load(&config.coastline_path()).map(Arc::new))
            .cloned()
    }

    pub fn segment_count(&self) -> usize {
        self.tree.size()
    }

    /// Distance to the nearest coastline crossing along a ray, or `None` when
    /// nothing is hit within `max_nm`.
    pub fn ray_distance_nm(&self, origin: LatLon, bearing_deg: f64, max_nm: f64) -> Option<f64> {
        let kx = NM_PER_DEG_LAT * origin.lat.to_radians().cos().abs().max(MIN_COS_LAT);
        let theta = bearing_deg.to_radians();
        let end = coord! { x: max_nm * theta.sin(), y: max_nm * theta.cos() };
        let ray = Line::new(coord! { x: 0.0, y: 0.0 }, end);

        let end_lon = origin.lon + end.x / kx;
        let end_lat = origin.lat + end.y / NM_PER_DEG_LAT;
        let min = [origin.lon.min(end_lon), origin.lat.min(end_lat)];
        let max = [origin.lon.max(end_lon), origin.lat.max(end_lat)];

        let mut envelopes = vec![AABB::from_corners(min, max)];
        if min[0] < -180.0 {
            envelopes.push(AABB::from_corners([min[0] + 360.0, min[1]], [180.0, max[1]]));
        }
        if max[0] > 180.0 {
            envelopes.push(AABB::from_corners([-180.0, min[1]], [max[0] - 360.0, max[1]]));
        }

        let project = |c: Coord<f64>| {
            coord! {
                x: wrap_lon(c.x - origin.lon) * kx,
                y: (c.y - origin.lat) * NM_PER_DEG_LAT,
            }
        };

        let mut nearest: Option<f64> = None;
        for envelope in &envelopes {
            for segment in self.tree.locate_in_envelope_intersecting(envelope) {
                let local = Line::new(project(segment.a), project(segment.b));
                let hit = match line_intersection(ray, local) {
                    Some(LineIntersection::SinglePoint { intersection, .. }) => {
                        intersection.x.hypot(intersection.y)
                    }
                    Some(LineIntersection::Collinear { intersection }) => intersection
                        .start
                        .x
                        .hypot(intersection.start.y)
                        .min(intersection.end.x.hypot(intersection.end.y)),
                    None => continue,
                };
                if hit <= max_nm && nearest.map_or(true, |n| hit < n) {
                    nearest = Some(hit);
                }
            }
        }
        nearest.map(|d| d.max(MIN_RAY_NM))
    }
}

/// Download the coastline dataset unless it is already cached.
pub async fn ensure_cached(config: &Config) -> anyhow::Result<PathBuf> {
    let path = config.coastline_path();
    if path.exists() {
        return Ok(path);
    }

    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("Failed to create {}", config.data_dir.display()))?;

    log::info!("Downloading coastline from {}", config.coastline_url);
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(300))
        .user_agent(config.user_agent.as_str())
        .build()
        .context("Failed to create HTTP client")?;
    let response = client
        .get(&config.coastline_url)
        .send()
        .await
        .context("Failed to initiate coastline download")?;
    if !response.status().is_success() {
        anyhow::bail!("Coastline download failed with status: {}", response.status());
    }
    let bytes = response.bytes().await.context("Error reading coastline body")?;

    // Refuse to cache something that will not load later.
    ShorelineIndex::from_geojson(&bytes)?;

    let partial = path.with_extension("part");
    std::fs::write(&partial, &bytes)
        .with_context(|| format!("Failed to write {}", partial.display()))?;
    std::fs::rename(&partial, &path)
        .with_context(|| format!("Failed to move coastline into {}", path.display()))?;

    log::info!("Cached coastline at {} ({} KB)", path.display(), bytes.len() / 1024);
    Ok(path)
}

fn wrap_lon(d: f64) -> f64 {
    let w = normalize_lon(d);
    if w == -180.0 {
        180.0
    } else {
        w
    }
}

fn ring_to_line(ring: &[Vec<f64>]) -> LineString<f64> {
    ring.iter()
        .filter(|p| p.len() >= 2)
        .map(|p| coord! { x: p[0], y: p[1] })
        .collect::<Vec<_>>()
        .into()
}

#[derive(Deserialize)]
struct FeatureCollection {
    features: Vec<Feature>,
}

#[derive(Deserialize)]
struct Feature {
    geometry: Option<Geometry>,
}

type Ring = Vec<Vec<f64>>;

#[derive(Deserialize)]
#[serde(tag = "type")]
enum Geometry {
    LineString { coordinates: Ring },
    MultiLineString { coordinates: Vec<Ring> },
    Polygon { coordinates: Vec<Ring> },
    MultiPolygon { coordinates: Vec<Vec<Ring>> },
    #[serde(other)]
    Other,
}

impl Geometry {
    fn into_rings(self) -> Vec<Ring> {
        match self {
            Geometry::LineString { coordinates } => vec![coordinates],
            Geometry::MultiLineString { coordinates } | Geometry::Polygon { coordinates } => coordinates,
            Geometry::MultiPolygon { coordinates } => coordinates.into_iter().flatten().collect(),
            Geometry::Other => vec![],
        }
    }
}
