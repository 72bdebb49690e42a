use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::{fmt::Debug, time::Duration};
use tracing::{debug, warn};

use crate::{
    error::FetchError,
    model::{EchoMessage, EchoRequest, HealthStatus, UsersResponse, WeatherData},
};

pub const USERS_PATH: &str = "/api/users";
pub const WEATHER_PATH: &str = "/api/weather/omsk";
pub const ECHO_PATH: &str = "/api/echo";
pub const HEALTH_PATH: &str = "/api/health";

/// The HTTP collaborator the view talks to.
#[async_trait]
pub trait Backend: Send + Sync + Debug {
    async fn fetch_users(&self) -> Result<UsersResponse, FetchError>;

    async fn fetch_weather(&self) -> Result<WeatherData, FetchError>;

    async fn echo(&self, request: &EchoRequest) -> Result<EchoMessage, FetchError>;

    async fn health(&self) -> Result<HealthStatus, FetchError>;
}

#[derive(Debug, Clone)]
pub struct HttpBackend {
    base_url: String,
    http: Client,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(base_url, http))
    }

    pub fn with_client(base_url: impl Into<String>, http: Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, http }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &'static str) -> Result<T, FetchError> {
        debug!(path, "GET");
        let res = self
            .http
            .get(self.url(path))
            .send()
            .await
            .map_err(|source| FetchError::Network { path, source })?;

        read_json(path, res).await
    }

    /// POSTs `body` and parses the reply whatever its status. The echo route
    /// answers with JSON on error statuses too, and that JSON is still shown.
    async fn post_json_any_status<T: DeserializeOwned>(
        &self,
        path: &'static str,
        body: &impl serde::Serialize,
    ) -> Result<T, FetchError> {
        debug!(path, "POST");
        // `.json()` sets `Content-Type: application/json`.
        let res = self
            .http
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|source| FetchError::Network { path, source })?;

        let status = res.status();
        if !status.is_success() {
            warn!(path, %status, "non-success status, parsing body anyway");
        }
        let body = res
            .text()
            .await
            .map_err(|source| FetchError::Network { path, source })?;

        serde_json::from_str(&body).map_err(|source| FetchError::Parse { path, source })
    }
}

async fn read_json<T: DeserializeOwned>(
    path: &'static str,
    res: reqwest::Response,
) -> Result<T, FetchError> {
    let status = res.status();
    let body = res
        .text()
        .await
        .map_err(|source| FetchError::Network { path, source })?;

    if !status.is_success() {
        return Err(FetchError::Status {
            path,
            status,
            body: truncate_body(&body),
        });
    }

    serde_json::from_str(&body).map_err(|source| FetchError::Parse { path, source })
}

#[async_trait]
impl Backend for HttpBackend {
    async fn fetch_users(&self) -> Result<UsersResponse, FetchError> {
        self.get_json(USERS_PATH).await
    }

    async fn fetch_weather(&self) -> Result<WeatherData, FetchError> {
        self.get_json(WEATHER_PATH).await
    }

    async fn echo(&self, request: &EchoRequest) -> Result<EchoMessage, FetchError> {
        self.post_json_any_status(ECHO_PATH, request).await
    }

    async fn health(&self) -> Result<HealthStatus, FetchError> {
        self.get_json(HEALTH_PATH).await
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() <= MAX {
        return body.to_string();
    }
    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
