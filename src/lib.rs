// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Walk-Tracker: dog-walk lifecycle and live location tracking
//!
//! This crate drives a walk from route selection through PENDING,
//! ACCEPTED, STARTED and COMPLETED against the walks backend, and streams
//! the walker's position to the client while the walk is under way.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod time_utils;

use config::{Config, TrackingStoreKind};
use db::{FirestoreDb, MemoryTrackingStore};
use error::Result;
use services::{
    LocationPublisher, LocationSource, NoopBackground, PublisherConfig, RouteCandidateService,
    TrackingChannel, TrackingStore, WalkLifecycleManager, WalksApi, WalksApiClient,
};
use std::sync::Arc;

/// Shared application context.
#[derive(Clone)]
pub struct AppContext {
    pub config: Config,
    pub api: Arc<dyn WalksApi>,
    pub channel: TrackingChannel,
}

impl AppContext {
    /// Connect to the walks backend and the configured tracking store.
    pub async fn connect(config: Config) -> Result<Self> {
        let api: Arc<dyn WalksApi> = Arc::new(WalksApiClient::from_config(&config)?);
        let store: Arc<dyn TrackingStore> = match config.tracking_store {
            TrackingStoreKind::Firestore => {
                Arc::new(FirestoreDb::new(&config.gcp_project_id).await?)
            }
            TrackingStoreKind::Memory => {
                tracing::warn!("Using in-memory tracking store; positions stay in this process");
                Arc::new(MemoryTrackingStore::new())
            }
        };
        Ok(Self::with_parts(config, api, store))
    }

    /// Assemble a context from already-built parts (tests, embedding).
    pub fn with_parts(
        config: Config,
        api: Arc<dyn WalksApi>,
        store: Arc<dyn TrackingStore>,
    ) -> Self {
        Self {
            config,
            api,
            channel: TrackingChannel::new(store),
        }
    }

    pub fn routes(&self) -> RouteCandidateService {
        RouteCandidateService::new(self.api.clone())
    }

    /// Lifecycle manager for the client side.
    pub fn client_manager(&self) -> WalkLifecycleManager {
        WalkLifecycleManager::new(self.api.clone())
    }

    /// Lifecycle manager for the walker side, publishing from `source`.
    pub fn walker_manager(&self, source: Arc<dyn LocationSource>) -> WalkLifecycleManager {
        let publisher = LocationPublisher::new(
            self.channel.clone(),
            source,
            Arc::new(NoopBackground),
            PublisherConfig::from(&self.config),
        );
        WalkLifecycleManager::new(self.api.clone()).with_tracking(publisher)
    }
}
