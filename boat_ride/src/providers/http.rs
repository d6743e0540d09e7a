use serde::de::DeserializeOwned;

use super::ProviderError;
use crate::config::Config;

pub fn client_builder(config: &Config) -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .timeout(config.http_timeout())
        .user_agent(config.user_agent.as_str())
}

pub fn build_client(config: &Config) -> reqwest::Result<reqwest::Client> {
    client_builder(config).build()
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return ProviderError::Permanent(format!("malformed payload: {}", err));
        }
        match err.status() {
            Some(status) if status.is_client_error() => ProviderError::Permanent(err.to_string()),
            _ => ProviderError::Transient(err.to_string()),
        }
    }
}

async fn get(client: &reqwest::Client, url: &str) -> Result<Option<reqwest::Response>, ProviderError> {
    let response = client.get(url).send().await?;
    match response.status() {
        reqwest::StatusCode::NOT_FOUND => {
            log::debug!("Upstream not found: {}", url);
            Ok(None)
        }
        status if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS => Err(
            ProviderError::Transient(format!("{} returned {}", url, status)),
        ),
        status if !status.is_success() => Err(ProviderError::Permanent(format!("{} returned {}", url, status))),
        _ => Ok(Some(response)),
    }
}

/// GET and decode JSON. `Ok(None)` on 404.
pub async fn get_json<T: DeserializeOwned>(client: &reqwest::Client, url: &str) -> Result<Option<T>, ProviderError> {
    match get(client, url).await? {
        Some(response) => Ok(Some(response.json::<T>().await?)),
        None => Ok(None),
    }
}

/// GET a text body. `Ok(None)` on 404.
pub async fn get_text(client: &reqwest::Client, url: &str) -> Result<Option<String>, ProviderError> {
    match get(client, url).await? {
        Some(response) => Ok(Some(response.text().await?)),
        None => Ok(None),
    }
}
