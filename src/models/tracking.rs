// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Live tracking records and the merged view shown to the client.

use crate::models::walk::LatLng;
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Last known walker position (`tracking/{walkId}/latest`).
///
/// Overwritten in place; only the most recent write matters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct TrackingPosition {
    pub lat: f64,
    pub lng: f64,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub timestamp_millis: i64,
}

impl TrackingPosition {
    pub fn new(point: LatLng, timestamp_millis: i64) -> Self {
        Self {
            lat: point.lat,
            lng: point.lng,
            timestamp_millis,
        }
    }

    pub fn point(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }

    /// Whether this write should replace `current`. Deliveries are not
    /// ordered, so the larger timestamp wins.
    pub fn supersedes(&self, current: Option<&TrackingPosition>) -> bool {
        current.map_or(true, |c| self.timestamp_millis > c.timestamp_millis)
    }
}

/// Tracking session flag and route (`tracking/{walkId}/meta`).
///
/// An absent record reads as the default: inactive, no route.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingMeta {
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub polyline_encoded: String,
}

/// Merged view of one walk's tracking records for the presentation layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct TrackingView {
    pub walk_id: String,
    pub active: bool,
    pub walker_position: Option<TrackingPosition>,
    pub route_polyline: Option<String>,
    /// Incremented on every inactive -> active edge.
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub session: u64,
    pub error: Option<String>,
}
