//! HTTP client for the daemon API.

pub mod types;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;

use crate::alarm::Alarm;
use types::{ActiveAlarm, CubeStatus, StopResponse, SystemStatus};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5001";

pub struct Client {
    http: reqwest::Client,
    base_url: String,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub async fn status(&self) -> Result<SystemStatus> {
        self.get("/status").await
    }

    pub async fn alarms(&self) -> Result<Vec<Alarm>> {
        self.get("/alarms").await
    }

    pub async fn active_alarm(&self) -> Result<Option<ActiveAlarm>> {
        self.get("/alarms/active").await
    }

    pub async fn cube(&self) -> Result<CubeStatus> {
        self.get("/cube").await
    }

    pub async fn stop(&self) -> Result<StopResponse> {
        self.post("/alarms/stop").await
    }

    pub async fn emergency_stop(&self) -> Result<StopResponse> {
        self.post("/alarms/emergency-stop").await
    }

    pub async fn cube_connect(&self) -> Result<CubeStatus> {
        self.post("/cube/connect").await
    }

    pub async fn cube_disconnect(&self) -> Result<CubeStatus> {
        self.post("/cube/disconnect").await
    }

    pub async fn cube_reset(&self) -> Result<CubeStatus> {
        self.post("/cube/reset").await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        Self::decode(response, &url).await
    }

    async fn post<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .post(&url)
            .send()
            .await
            .with_context(|| format!("POST {url}"))?;
        Self::decode(response, &url).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response, url: &str) -> Result<T> {
        let response = response
            .error_for_status()
            .with_context(|| format!("{url} failed"))?;
        response
            .json()
            .await
            .with_context(|| format!("decoding response from {url}"))
    }
}
