// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Device position sources for the location publisher.

use crate::error::Result;
use crate::models::route::decode_route;
use crate::models::LatLng;
use crate::time_utils::now_millis;
use async_trait::async_trait;
use geo::{Distance, Haversine};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Whether the process may read the device position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationPermission {
    Granted,
    Denied,
}

/// One position reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationSample {
    pub point: LatLng,
    pub timestamp_millis: i64,
}

/// Provider of the walker's current position.
#[async_trait]
pub trait LocationSource: Send + Sync {
    /// Checked once when tracking starts.
    fn permission(&self) -> LocationPermission;

    /// Read the current position. `Ok(None)` means no fix is available yet.
    async fn current_position(&self) -> Result<Option<LocationSample>>;
}

/// Great-circle distance in meters.
pub fn displacement_meters(a: LatLng, b: LatLng) -> f64 {
    Haversine.distance(a.to_point(), b.to_point())
}

/// Replays the vertices of an encoded route, one per sample, then stays at
/// the last vertex. Stands in for a GPS receiver in the walker binary.
pub struct RouteReplaySource {
    points: Vec<LatLng>,
    cursor: AtomicUsize,
}

impl RouteReplaySource {
    pub fn new(points: Vec<LatLng>) -> Self {
        Self {
            points,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn from_polyline(encoded: &str) -> Result<Self> {
        let line = decode_route(encoded)?;
        let points = line.points().map(|p| LatLng::new(p.y(), p.x())).collect();
        Ok(Self::new(points))
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[async_trait]
impl LocationSource for RouteReplaySource {
    fn permission(&self) -> LocationPermission {
        LocationPermission::Granted
    }

    async fn current_position(&self) -> Result<Option<LocationSample>> {
        if self.points.is_empty() {
            return Ok(None);
        }
        let i = self.cursor.fetch_add(1, Ordering::Relaxed);
        let point = self.points[i.min(self.points.len() - 1)];
        Ok(Some(LocationSample {
            point,
            timestamp_millis: now_millis(),
        }))
    }
}
