//! Environmental data providers.
//!
//! Each provider answers for one normalized point with the subset of fields it
//! can supply. "No data" is an empty [`PartialEnv`], not an error; errors are
//! reserved for transport faults and malformed upstream payloads.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::fetch::{FetchCalculator, FetchProfile};
use crate::models::{NormalizedPoint, TideState, WaveState};

pub mod chain;
pub mod coops;
pub mod fetch;
pub mod http;
pub mod mock;
pub mod ndbc;
pub mod nws;
pub mod retrying;

pub use chain::ProviderChain;
pub use retrying::RetryingProvider;

pub const DEFAULT_SELECTOR: &str = "nws+ndbc+fetch+coops";

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("transient upstream failure: {0}")]
    Transient(String),
    #[error("upstream rejected the request: {0}")]
    Permanent(String),
    #[error("upstream timed out after {0:?}")]
    Timeout(Duration),
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ProviderError::Permanent(_))
    }
}

/// Position of a provider in the fixed chain order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProviderKind {
    Weather,
    Waves,
    Fetch,
    Tide,
}

/// Fields one provider could supply for a point. Unset means "not from me".
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PartialEnv {
    pub wind_speed_kt: Option<f64>,
    pub wind_gust_kt: Option<f64>,
    pub wind_dir_deg: Option<f64>,
    pub precip_prob: Option<f64>,
    pub wave: Option<WaveState>,
    pub tide: Option<TideState>,
    pub current_kt: Option<f64>,
    pub current_dir_deg: Option<f64>,
    /// Hours the wind has held roughly steady up to the sample time.
    pub wind_duration_hr: Option<f64>,
    pub fetch: Option<FetchProfile>,
    pub notes: BTreeMap<String, String>,
}

impl PartialEnv {
    pub fn note(mut self, key: &str, value: impl ToString) -> Self {
        self.notes.insert(key.to_string(), value.to_string());
        self
    }
}

#[async_trait]
pub trait EnvProvider: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> ProviderKind;

    async fn query(&self, point: &NormalizedPoint) -> std::result::Result<PartialEnv, ProviderError>;
}

/// Build providers from a selector such as `nws+ndbc+fetch+coops`.
///
/// Upstream providers are wrapped with timeout and retry. Selecting `fetch`
/// requires the coastline dataset; its absence fails the whole build.
pub fn build_providers(selector: &str, config: &Config) -> Result<Vec<Box<dyn EnvProvider>>> {
    let mut tokens: Vec<String> = selector
        .split('+')
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
    if tokens.is_empty() {
        tokens = DEFAULT_SELECTOR.split('+').map(String::from).collect();
    }

    let retry = config.retry().with_timeout(config.http_timeout());
    let mut providers: Vec<Box<dyn EnvProvider>> = Vec::new();
    for token in tokens {
        let provider: Box<dyn EnvProvider> = match token.as_str() {
            "nws" => Box::new(RetryingProvider::new(
                nws::NwsProvider::new(config).map_err(|e| Error::Config(e.to_string()))?,
                retry.clone(),
            )),
            "ndbc" => Box::new(RetryingProvider::new(
                ndbc::NdbcProvider::new(config).map_err(|e| Error::Config(e.to_string()))?,
                retry.clone(),
            )),
            "coops" | "tide" => Box::new(RetryingProvider::new(
                coops::CoopsProvider::new(config).map_err(|e| Error::Config(e.to_string()))?,
                retry.clone(),
            )),
            "fetch" => Box::new(fetch::FetchProvider::new(FetchCalculator::shared(config)?)),
            "mock" => Box::new(mock::MockProvider),
            other => {
                return Err(Error::Config(format!(
                    "unknown provider token '{}' (supported: nws, ndbc, fetch, coops, mock)",
                    other
                )))
            }
        };
        providers.push(provider);
    }
    Ok(providers)
}
