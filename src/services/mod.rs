// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - walk lifecycle and live tracking.

pub mod api;
pub mod lifecycle;
pub mod location;
pub mod observer;
pub mod publisher;
pub mod routing;
pub mod tracking;

pub use api::{StaticToken, TokenProvider, WalksApi, WalksApiClient};
pub use lifecycle::WalkLifecycleManager;
pub use location::{LocationPermission, LocationSample, LocationSource, RouteReplaySource};
pub use observer::TrackingObserver;
pub use publisher::{
    BackgroundExecution, BackgroundGrant, LocationPublisher, NoopBackground, PublisherConfig,
    PublisherHandle, PublisherStats,
};
pub use routing::{RouteCandidateService, RoutePlanner, RoutePlannerState, RouteUpdate};
pub use tracking::{Subscription, TrackingChannel, TrackingStore};
