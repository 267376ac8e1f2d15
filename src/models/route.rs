// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Route calculation request and priced route candidates.

use crate::error::{AppError, Result};
use crate::models::walk::{LatLng, WalkType};
use geo::LineString;
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Google-style encoded polylines use 5 decimal places.
pub const POLYLINE_PRECISION: u32 = 5;

/// Body of `POST /walks/calculate-route`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRequest {
    #[serde(rename = "type")]
    pub walk_type: WalkType,
    pub origin: LatLng,
    pub destination: Option<LatLng>,
    pub time_minutes: Option<u32>,
    pub distance_km: Option<f64>,
}

impl RouteRequest {
    pub fn a_to_b(origin: LatLng, destination: LatLng) -> Self {
        Self {
            walk_type: WalkType::AToB,
            origin,
            destination: Some(destination),
            time_minutes: None,
            distance_km: None,
        }
    }

    pub fn by_time(origin: LatLng, minutes: u32) -> Self {
        Self {
            walk_type: WalkType::Time,
            origin,
            destination: None,
            time_minutes: Some(minutes),
            distance_km: None,
        }
    }

    pub fn by_distance(origin: LatLng, km: f64) -> Self {
        Self {
            walk_type: WalkType::Distance,
            origin,
            destination: None,
            time_minutes: None,
            distance_km: Some(km),
        }
    }

    /// Check the type-specific required parameters and strip the ones that
    /// do not apply, so only the relevant fields reach the routing API.
    pub fn validated(&self) -> Result<RouteRequest> {
        self.origin.check("origin")?;

        let mut out = RouteRequest {
            walk_type: self.walk_type,
            origin: self.origin,
            destination: None,
            time_minutes: None,
            distance_km: None,
        };

        match self.walk_type {
            WalkType::AToB => {
                let dest = self.destination.ok_or_else(|| {
                    AppError::Validation("A_TO_B routes require a destination".to_string())
                })?;
                dest.check("destination")?;
                out.destination = Some(dest);
            }
            WalkType::Time => match self.time_minutes {
                Some(minutes) if minutes > 0 => out.time_minutes = Some(minutes),
                _ => {
                    return Err(AppError::Validation(
                        "TIME routes require a positive duration".to_string(),
                    ))
                }
            },
            WalkType::Distance => match self.distance_km {
                Some(km) if km.is_finite() && km > 0.0 => out.distance_km = Some(km),
                _ => {
                    return Err(AppError::Validation(
                        "DISTANCE routes require a positive distance".to_string(),
                    ))
                }
            },
        }

        Ok(out)
    }
}

/// A priced, timed path proposed by the routing service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct RouteCandidate {
    pub polyline_encoded: String,
    pub distance_km: f64,
    pub duration_min: u32,
    #[serde(rename = "priceAmount", alias = "price")]
    pub price: f64,
    #[serde(default)]
    pub price_currency: Option<String>,
}

impl RouteCandidate {
    pub fn estimated_distance_meters(&self) -> u32 {
        (self.distance_km * 1000.0).round().max(0.0) as u32
    }

    pub fn estimated_duration_seconds(&self) -> u32 {
        self.duration_min.saturating_mul(60)
    }

    /// Decode the route into coordinates (x = longitude, y = latitude).
    pub fn points(&self) -> Result<LineString<f64>> {
        decode_route(&self.polyline_encoded)
    }
}

/// Decode an encoded route polyline.
pub fn decode_route(encoded: &str) -> Result<LineString<f64>> {
    polyline::decode_polyline(encoded, POLYLINE_PRECISION)
        .map_err(|e| AppError::Backend(format!("Failed to decode polyline: {}", e)))
}

/// Result of a route calculation that reached the routing service.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    Candidates(Vec<RouteCandidate>),
    /// The service answered but found nothing feasible. Not an error.
    NoFeasibleRoute,
}

impl RouteOutcome {
    pub fn candidates(&self) -> &[RouteCandidate] {
        match self {
            RouteOutcome::Candidates(list) => list,
            RouteOutcome::NoFeasibleRoute => &[],
        }
    }
}
