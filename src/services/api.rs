// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! HTTP client for the walks backend.
//!
//! Handles:
//! - Route calculation
//! - Walk creation, listing and detail reads
//! - Lifecycle transitions (cancel, accept, start, end)
//!
//! Every call is a single request bounded by the configured timeout.
//! Nothing here retries: a transition that timed out may still have been
//! applied server-side, so retrying is left to the caller after a read.

use crate::config::Config;
use crate::error::{classify_status, AppError, Result};
use crate::models::walk::{AcceptWalkRequest, PositionRequest};
use crate::models::{
    CreateWalkRequest, LatLng, RouteCandidate, RouteRequest, Walk, WalkAck, WalkListing,
    WalkSummary,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Backend operations the lifecycle and routing layers depend on.
#[async_trait]
pub trait WalksApi: Send + Sync {
    /// `POST /walks/calculate-route`
    async fn calculate_route(&self, request: &RouteRequest) -> Result<Vec<RouteCandidate>>;

    /// `POST /walks`. Returns the id of the new walk.
    async fn create_walk(&self, request: &CreateWalkRequest) -> Result<String>;

    /// One of the four list reads.
    async fn list_walks(&self, listing: WalkListing) -> Result<Vec<WalkSummary>>;

    /// `GET /walks/{id}`
    async fn get_walk(&self, walk_id: &str) -> Result<Walk>;

    /// `GET /walks/available/{id}` (walker view of a pending walk)
    async fn get_available_walk(&self, walk_id: &str) -> Result<Walk>;

    /// `DELETE /walks/{id}`
    async fn cancel_walk(&self, walk_id: &str) -> Result<WalkAck>;

    /// `POST /walks/{id}/accept`
    async fn accept_walk(&self, walk_id: &str, agreed_payment_method_id: &str) -> Result<Walk>;

    /// `POST /walks/{id}/start`
    async fn start_walk(&self, walk_id: &str, position: LatLng) -> Result<Walk>;

    /// `POST /walks/{id}/end`
    async fn end_walk(&self, walk_id: &str, position: LatLng) -> Result<Walk>;
}

/// Source of the bearer token attached to every request.
pub trait TokenProvider: Send + Sync {
    fn bearer_token(&self) -> Option<String>;
}

/// A fixed token, e.g. from `WALKS_API_TOKEN`.
#[derive(Debug, Clone)]
pub struct StaticToken(pub Option<String>);

impl TokenProvider for StaticToken {
    fn bearer_token(&self) -> Option<String> {
        self.0.clone()
    }
}

/// `{success, message?, walk}`
#[derive(Debug, Deserialize)]
struct WalkEnvelope<T> {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    walk: Option<T>,
}

/// `{success, walks}`
#[derive(Debug, Deserialize)]
struct WalkListEnvelope {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    walks: Vec<WalkSummary>,
}

/// `{success, routes}`
#[derive(Debug, Deserialize)]
struct RoutesEnvelope {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    routes: Vec<RouteCandidate>,
}

/// Creation only echoes the id back.
#[derive(Debug, Deserialize)]
struct CreatedWalk {
    id: String,
}

fn default_success() -> bool {
    true
}

/// A 2xx answer that still reports failure is a backend error, not a
/// transport one.
fn ensure_success(success: bool, message: Option<String>, what: &str) -> Result<()> {
    if success {
        Ok(())
    } else {
        Err(AppError::Backend(format!(
            "{} failed: {}",
            what,
            message.unwrap_or_else(|| "no message".to_string())
        )))
    }
}

fn unwrap_walk<T>(envelope: WalkEnvelope<T>, what: &str) -> Result<T> {
    ensure_success(envelope.success, envelope.message, what)?;
    envelope
        .walk
        .ok_or_else(|| AppError::Backend(format!("{} response has no walk", what)))
}

/// reqwest implementation of [`WalksApi`].
#[derive(Clone)]
pub struct WalksApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Arc<dyn TokenProvider>,
}

impl WalksApiClient {
    pub fn new(config: &Config, token: Arc<dyn TokenProvider>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("HTTP client setup failed: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Client using the token from the config.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config, Arc::new(StaticToken(config.api_token.clone())))
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn walk_url(&self, walk_id: &str, suffix: &str) -> String {
        let id = urlencoding::encode(walk_id);
        if suffix.is_empty() {
            self.url(&format!("walks/{}", id))
        } else {
            self.url(&format!("walks/{}/{}", id, suffix))
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.token.bearer_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Generic GET request with JSON response.
    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self.authorize(self.http.get(url)).send().await?;
        self.check_response_json(response).await
    }

    /// Generic POST request with JSON body and response.
    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T> {
        let response = self
            .authorize(self.http.post(url))
            .json(body)
            .send()
            .await?;
        self.check_response_json(response).await
    }

    /// Check response and parse JSON body.
    async fn check_response_json<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = classify_status(status, &body);
            if status.as_u16() == 429 {
                tracing::warn!("Walks backend rate limit hit (429)");
            } else {
                tracing::debug!(status = %status, error = %err, "Walks backend request failed");
            }
            return Err(err);
        }

        response.json().await.map_err(AppError::from)
    }
}

#[async_trait]
impl WalksApi for WalksApiClient {
    async fn calculate_route(&self, request: &RouteRequest) -> Result<Vec<RouteCandidate>> {
        let envelope: RoutesEnvelope = self
            .post_json(&self.url("walks/calculate-route"), request)
            .await?;
        ensure_success(envelope.success, envelope.message, "Route calculation")?;
        Ok(envelope.routes)
    }

    async fn create_walk(&self, request: &CreateWalkRequest) -> Result<String> {
        let envelope: WalkEnvelope<CreatedWalk> =
            self.post_json(&self.url("walks"), request).await?;
        let created = unwrap_walk(envelope, "Walk creation")?;
        tracing::info!(walk_id = %created.id, "Walk created");
        Ok(created.id)
    }

    async fn list_walks(&self, listing: WalkListing) -> Result<Vec<WalkSummary>> {
        let envelope: WalkListEnvelope = self.get_json(&self.url(listing.path())).await?;
        ensure_success(envelope.success, envelope.message, "Walk listing")?;
        Ok(envelope.walks)
    }

    async fn get_walk(&self, walk_id: &str) -> Result<Walk> {
        let envelope = self.get_json(&self.walk_url(walk_id, "")).await?;
        unwrap_walk(envelope, "Walk read")
    }

    async fn get_available_walk(&self, walk_id: &str) -> Result<Walk> {
        let url = self.url(&format!(
            "walks/available/{}",
            urlencoding::encode(walk_id)
        ));
        let envelope = self.get_json(&url).await?;
        unwrap_walk(envelope, "Available walk read")
    }

    async fn cancel_walk(&self, walk_id: &str) -> Result<WalkAck> {
        let response = self
            .authorize(self.http.delete(self.walk_url(walk_id, "")))
            .send()
            .await?;
        let envelope = self.check_response_json(response).await?;
        unwrap_walk(envelope, "Cancel")
    }

    async fn accept_walk(&self, walk_id: &str, agreed_payment_method_id: &str) -> Result<Walk> {
        let body = AcceptWalkRequest {
            agreed_payment_method_id: agreed_payment_method_id.to_string(),
        };
        let envelope = self.post_json(&self.walk_url(walk_id, "accept"), &body).await?;
        unwrap_walk(envelope, "Accept")
    }

    async fn start_walk(&self, walk_id: &str, position: LatLng) -> Result<Walk> {
        let body = PositionRequest::from(position);
        let envelope = self.post_json(&self.walk_url(walk_id, "start"), &body).await?;
        unwrap_walk(envelope, "Start")
    }

    async fn end_walk(&self, walk_id: &str, position: LatLng) -> Result<Walk> {
        let body = PositionRequest::from(position);
        let envelope = self.post_json(&self.walk_url(walk_id, "end"), &body).await?;
        unwrap_walk(envelope, "End")
    }
}
