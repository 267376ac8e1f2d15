// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod route;
pub mod tracking;
pub mod walk;

pub use route::{RouteCandidate, RouteOutcome, RouteRequest};
pub use tracking::{TrackingMeta, TrackingPosition, TrackingView};
pub use walk::{
    CreateWalkRequest, LatLng, NewWalk, Walk, WalkAck, WalkListing, WalkStatus, WalkSummary,
    WalkTrigger, WalkType,
};
