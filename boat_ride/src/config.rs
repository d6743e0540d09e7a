use once_cell::sync::Lazy;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::retry::RetryConfig;

/// Natural Earth 1:10m coastline, GeoJSON flavour.
pub const DEFAULT_COASTLINE_URL: &str =
    "https://raw.githubusercontent.com/nvkelso/natural-earth-vector/master/geojson/ne_10m_coastline.geojson";

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_coastline_url")]
    pub coastline_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    #[serde(default = "default_retry_max")]
    pub retry_max: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_max_ray_nm")]
    pub max_ray_nm: f64,
    /// Number of sample points evaluated concurrently.
    #[serde(default = "default_point_concurrency")]
    pub point_concurrency: usize,
}

impl Config {
    pub fn coastline_path(&self) -> PathBuf {
        self.data_dir.join("ne_10m_coastline.geojson")
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn retry(&self) -> RetryConfig {
        RetryConfig::new(self.retry_max, self.retry_base_delay_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: default_data_dir(),
            coastline_url: default_coastline_url(),
            user_agent: default_user_agent(),
            http_timeout_secs: default_http_timeout_secs(),
            retry_max: default_retry_max(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            max_ray_nm: default_max_ray_nm(),
            point_concurrency: default_point_concurrency(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".boat_ride")
        .join("data")
}

fn default_coastline_url() -> String {
    DEFAULT_COASTLINE_URL.to_string()
}

fn default_user_agent() -> String {
    format!("boat-ride/{}", env!("CARGO_PKG_VERSION"))
}

fn default_http_timeout_secs() -> u64 {
    25
}

fn default_retry_max() -> u32 {
    4
}

fn default_retry_base_delay_ms() -> u64 {
    800
}

fn default_max_ray_nm() -> f64 {
    50.0
}

fn default_point_concurrency() -> usize {
    4
}

pub static CONFIG: Lazy<Config> = Lazy::new(|| match envy::prefixed("BOAT_RIDE_").from_env::<Config>() {
    Ok(config) => config,
    Err(e) => {
        log::warn!("Invalid BOAT_RIDE_* configuration, using defaults: {}", e);
        Config::default()
    }
});

pub fn config() -> &'static Config {
    &CONFIG
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.max_ray_nm, 50.0);
        assert_eq!(config.retry_max, 4);
        assert!(config.coastline_path().ends_with("ne_10m_coastline.geojson"));
    }

    #[test]
    fn test_from_env_iter() {
        let vars = vec![
            ("BOAT_RIDE_DATA_DIR".to_string(), "/tmp/boat".to_string()),
            ("BOAT_RIDE_MAX_RAY_NM".to_string(), "30".to_string()),
        ];
        let config: Config = envy::prefixed("BOAT_RIDE_").from_iter(vars).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/boat"));
        assert_eq!(config.max_ray_nm, 30.0);
        assert_eq!(config.http_timeout_secs, 25);
    }
}
