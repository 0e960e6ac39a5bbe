//! Token-authenticated client for the private backend API

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::config::BackendConfig;
use crate::errors::{AppError, AppResult, BackendError};
use crate::models::{TvChannel, TvRecord};

/// Request header carrying the API token
pub const API_TOKEN_HEADER: &str = "X-PT-API-TOKEN";

/// Client for the reservation backend.
///
/// Every request carries the configured API token; non-OK responses and
/// undecodable bodies surface as typed [`BackendError`]s so the poller
/// can log-and-skip without aborting.
#[derive(Clone, Debug)]
pub struct BackendClient {
    client: Client,
    endpoint: Url,
    token: String,
}

impl BackendClient {
    pub fn new(config: &BackendConfig) -> AppResult<Self> {
        let endpoint = Url::parse(&config.endpoint).map_err(|e| AppError::Configuration {
            message: format!("invalid backend endpoint '{}': {e}", config.endpoint),
        })?;
        let client = Client::builder()
            .connect_timeout(config.connect_timeout()?)
            .build()
            .map_err(BackendError::Http)?;
        Ok(Self {
            client,
            endpoint,
            token: config.token.clone(),
        })
    }

    /// Connectivity and authentication check.
    pub async fn ping(&self) -> AppResult<serde_json::Value> {
        self.get_json("/api/auth/me").await
    }

    /// Fetch the full reservation list.
    pub async fn fetch_records(&self) -> AppResult<Vec<TvRecord>> {
        self.get_json("/api/pt/records/").await
    }

    /// Fetch the channel list.
    pub async fn fetch_channels(&self) -> AppResult<Vec<TvChannel>> {
        self.get_json("/api/pt/channels/").await
    }

    fn build_url(&self, path: &str) -> AppResult<Url> {
        self.endpoint.join(path).map_err(|e| AppError::Configuration {
            message: format!("invalid backend path '{path}': {e}"),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> AppResult<T> {
        let url = self.build_url(path)?;
        debug!("[api] GET {}", url.path());

        let response = self
            .client
            .get(url.clone())
            .header(API_TOKEN_HEADER, &self.token)
            .send()
            .await
            .map_err(BackendError::Http)?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(BackendError::UnexpectedStatus {
                expected: StatusCode::OK.as_u16(),
                actual: status.as_u16(),
                url: url.to_string(),
            }
            .into());
        }

        let body = response.text().await.map_err(BackendError::Http)?;
        serde_json::from_str(&body).map_err(|e| {
            BackendError::Decode {
                type_name: std::any::type_name::<T>().to_string(),
                message: e.to_string(),
                body,
            }
            .into()
        })
    }
}
