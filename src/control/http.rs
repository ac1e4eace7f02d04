//! One-shot HTTP access to the control-plane API.
//!
//! Used for artifact fetches, the heartbeat fallback, and by the
//! `bot-supervisor-ctl` companion for listing and control requests.
//! Every request is bounded by [`REQUEST_TIMEOUT`].

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use crate::control::ArtifactSource;
use crate::models::artifact::ArtifactBundle;
use crate::models::host::HostStatus;
use crate::models::remote::{BotRecord, ControlReply};
use crate::models::worker::ControlAction;
use crate::{AppError, Result};

/// Upper bound on any single control-plane request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Thin client for the control-plane REST API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base: String,
}

impl ApiClient {
    /// Build a client for the API rooted at `base` (e.g. `http://host:3001`).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Http` if the HTTP client cannot be constructed.
    pub fn new(base: &str) -> Result<Self> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base: base.trim_end_matches('/').to_owned(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/{path}", self.base)
    }

    /// `GET /api/bot/{id}`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Http` for transport failures and non-200 statuses,
    /// `AppError::Sync` for bodies that do not match the artifact schema.
    pub async fn fetch_bundle(&self, bot_id: &str) -> Result<ArtifactBundle> {
        let url = self.endpoint(&format!("bot/{bot_id}"));
        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(AppError::Http(format!("GET {url} returned {status}")));
        }
        let body = response.bytes().await?;
        serde_json::from_slice(&body)
            .map_err(|err| AppError::Sync(format!("malformed artifact response for {bot_id}: {err}")))
    }

    /// `POST /api/raspberry/heartbeat`; only HTTP 200 counts as delivered.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Http` on transport failure or any other status.
    pub async fn post_heartbeat(&self, status: &HostStatus) -> Result<()> {
        let url = self.endpoint("raspberry/heartbeat");
        let response = self.http.post(&url).json(status).send().await?;
        match response.status() {
            StatusCode::OK => {
                debug!("heartbeat delivered over http");
                Ok(())
            }
            other => Err(AppError::Http(format!("POST {url} returned {other}"))),
        }
    }

    /// `GET /api/bots`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Http` on transport failure, bad status, or a
    /// malformed body.
    pub async fn list_bots(&self) -> Result<Vec<BotRecord>> {
        self.get_json(&self.endpoint("bots")).await
    }

    /// `POST /api/bot/{id}/control` with `source = "cli"`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Http` on transport failure, bad status, or a
    /// malformed body.
    pub async fn control_bot(&self, bot_id: &str, action: ControlAction) -> Result<ControlReply> {
        let url = self.endpoint(&format!("bot/{bot_id}/control"));
        let response = self
            .http
            .post(&url)
            .json(&json!({ "action": action.as_str(), "source": "cli" }))
            .send()
            .await?;
        Self::decode(&url, response).await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self.http.get(url).send().await?;
        Self::decode(url, response).await
    }

    async fn decode<T: DeserializeOwned>(url: &str, response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Http(format!("{url} returned {status}")));
        }
        let body = response.bytes().await?;
        serde_json::from_slice(&body)
            .map_err(|err| AppError::Http(format!("malformed response from {url}: {err}")))
    }
}

impl ArtifactSource for ApiClient {
    fn fetch<'a>(
        &'a self,
        bot_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<ArtifactBundle>> + Send + 'a>> {
        Box::pin(self.fetch_bundle(bot_id))
    }
}
