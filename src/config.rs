// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.

use std::env;
use std::time::Duration;

/// Which store backs the tracking channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingStoreKind {
    /// Shared Firestore document store (production).
    Firestore,
    /// In-process store, for local runs and tests.
    Memory,
}

impl std::str::FromStr for TrackingStoreKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "firestore" => Ok(Self::Firestore),
            "memory" => Ok(Self::Memory),
            _ => Err(ConfigError::Invalid("TRACKING_STORE", s.to_string())),
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the walks backend, e.g. `https://api.example.com/api/v1`
    pub api_base_url: String,
    /// Opaque bearer token issued by the auth collaborator
    pub api_token: Option<String>,
    /// GCP project ID (tracking documents)
    pub gcp_project_id: String,
    /// Tracking store implementation
    pub tracking_store: TrackingStoreKind,
    /// Bound for lifecycle transition and route calculation calls
    pub request_timeout: Duration,
    /// Location sampling cadence while a walk is active
    pub tracking_interval: Duration,
    /// Samples closer than this to the last published one are skipped
    pub min_displacement_meters: f64,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3000/api/v1".to_string(),
            api_token: Some("test_token".to_string()),
            gcp_project_id: "test-project".to_string(),
            tracking_store: TrackingStoreKind::Memory,
            request_timeout: Duration::from_secs(60),
            tracking_interval: Duration::from_secs(10),
            min_displacement_meters: 5.0,
        }
    }
}

impl Config {
    /// Config used by integration tests.
    pub fn test_default() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            api_base_url: env::var("WALKS_API_BASE_URL")
                .map(|v| v.trim().trim_end_matches('/').to_string())
                .map_err(|_| ConfigError::Missing("WALKS_API_BASE_URL"))?,
            api_token: env::var("WALKS_API_TOKEN")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            tracking_store: env::var("TRACKING_STORE")
                .unwrap_or_else(|_| "firestore".to_string())
                .parse()?,
            request_timeout: Duration::from_secs(parse_var("REQUEST_TIMEOUT_SECS", 60)?),
            tracking_interval: Duration::from_secs(parse_var("TRACKING_INTERVAL_SECS", 10)?),
            min_displacement_meters: parse_var("MIN_DISPLACEMENT_METERS", 5.0)?,
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(name, raw)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}
