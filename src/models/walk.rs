// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Walk record, its status graph and the requests that create or move it.

use crate::error::{AppError, Result};
use crate::models::route::RouteCandidate;
use crate::time_utils::format_utc_rfc3339;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

/// Lead time applied when the client does not choose a start time.
const DEFAULT_START_LEAD_MINUTES: i64 = 10;

/// A WGS84 coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Reject non-finite or out-of-range coordinates.
    pub fn check(&self, field: &str) -> Result<()> {
        if !self.lat.is_finite() || !self.lng.is_finite() {
            return Err(AppError::Validation(format!("{} is not a finite coordinate", field)));
        }
        if !(-90.0..=90.0).contains(&self.lat) || !(-180.0..=180.0).contains(&self.lng) {
            return Err(AppError::Validation(format!(
                "{} is out of range ({}, {})",
                field, self.lat, self.lng
            )));
        }
        Ok(())
    }

    /// As a `geo` point (x = longitude, y = latitude).
    pub fn to_point(self) -> geo::Point<f64> {
        geo::Point::new(self.lng, self.lat)
    }
}

/// How the walk's route is shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WalkType {
    /// Point to point; the only type with a destination.
    #[serde(alias = "AB")]
    AToB,
    /// Loop of a target duration.
    Time,
    /// Loop of a target distance.
    Distance,
}

impl WalkType {
    pub fn requires_destination(self) -> bool {
        matches!(self, WalkType::AToB)
    }
}

/// Lifecycle status. Only ever moves forward along [`WalkStatus::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WalkStatus {
    Pending,
    Accepted,
    Started,
    Completed,
    Cancelled,
}

/// A lifecycle trigger issued by one of the two actors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkTrigger {
    /// Client withdraws a pending request.
    Cancel,
    /// Walker takes the walk.
    Accept,
    /// Walker picks up the pets.
    Start,
    /// Walker drops them off.
    End,
}

impl WalkStatus {
    /// The status reached by applying `trigger`, or `None` if no such edge exists.
    pub fn apply(self, trigger: WalkTrigger) -> Option<WalkStatus> {
        match (self, trigger) {
            (WalkStatus::Pending, WalkTrigger::Cancel) => Some(WalkStatus::Cancelled),
            (WalkStatus::Pending, WalkTrigger::Accept) => Some(WalkStatus::Accepted),
            (WalkStatus::Accepted, WalkTrigger::Start) => Some(WalkStatus::Started),
            (WalkStatus::Started, WalkTrigger::End) => Some(WalkStatus::Completed),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, WalkStatus::Completed | WalkStatus::Cancelled)
    }

    /// Position along the graph; later statuses never rank lower.
    pub fn rank(self) -> u8 {
        match self {
            WalkStatus::Pending => 0,
            WalkStatus::Accepted => 1,
            WalkStatus::Started => 2,
            WalkStatus::Completed | WalkStatus::Cancelled => 3,
        }
    }
}

impl std::fmt::Display for WalkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WalkStatus::Pending => "PENDING",
            WalkStatus::Accepted => "ACCEPTED",
            WalkStatus::Started => "STARTED",
            WalkStatus::Completed => "COMPLETED",
            WalkStatus::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

/// Walk detail as owned by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Walk {
    pub id: String,
    pub client_id: String,
    pub walker_id: Option<String>,
    #[serde(rename = "type")]
    pub walk_type: WalkType,
    pub status: WalkStatus,
    pub origin: LatLng,
    pub destination: Option<LatLng>,
    pub estimated_distance_meters: u32,
    pub estimated_duration_seconds: u32,
    pub selected_route_polyline_encoded: Option<String>,
    pub price_amount: f64,
    pub price_currency: String,
    #[serde(default)]
    pub payment_method_ids: Vec<String>,
    pub agreed_payment_method_id: Option<String>,
    pub requested_start_time: String,
    pub actual_start_time: Option<String>,
    pub actual_end_time: Option<String>,
    #[serde(default)]
    pub pet_ids: Vec<String>,
}

impl Walk {
    /// Check the record-level invariants that must hold in every status.
    pub fn check_invariants(&self) -> std::result::Result<(), String> {
        let pending = self.status == WalkStatus::Pending;

        // Cancellation only happens from PENDING, so a cancelled walk never
        // had a walker either.
        let unassigned = pending || self.status == WalkStatus::Cancelled;
        if unassigned != self.walker_id.is_none() {
            return Err(format!("walkerId does not match status {}", self.status));
        }
        if unassigned != self.agreed_payment_method_id.is_none() {
            return Err(format!(
                "agreedPaymentMethodId does not match status {}",
                self.status
            ));
        }
        if self.walk_type.requires_destination() != self.destination.is_some() {
            return Err(format!(
                "destination presence does not match type {:?}",
                self.walk_type
            ));
        }
        let started = matches!(self.status, WalkStatus::Started | WalkStatus::Completed);
        if started != self.actual_start_time.is_some() {
            return Err(format!("actualStartTime does not match status {}", self.status));
        }
        if (self.status == WalkStatus::Completed) != self.actual_end_time.is_some() {
            return Err(format!("actualEndTime does not match status {}", self.status));
        }
        if self.pet_ids.is_empty() {
            return Err("walk has no pets".to_string());
        }
        Ok(())
    }
}

/// Row returned by the list endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalkSummary {
    pub id: String,
    #[serde(rename = "type")]
    pub walk_type: WalkType,
    pub status: WalkStatus,
    pub requested_start_time: String,
    pub estimated_distance_meters: u32,
    pub estimated_duration_seconds: u32,
    pub price_amount: f64,
    pub price_currency: String,
}

/// Reduced record returned by the cancel endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalkAck {
    pub id: String,
    pub status: WalkStatus,
}

/// Which list endpoint to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkListing {
    /// The client's requests still waiting for a walker.
    ClientPending,
    /// The client's accepted or started walks.
    ClientActive,
    /// The walker's accepted or started walks.
    WalkerActive,
    /// Pending walks a walker may accept.
    Available,
}

impl WalkListing {
    pub fn path(self) -> &'static str {
        match self {
            WalkListing::ClientPending => "walks/pending",
            WalkListing::ClientActive => "walks/active",
            WalkListing::WalkerActive => "walker/walks/active",
            WalkListing::Available => "walks/available",
        }
    }
}

/// The client's selection before a route candidate is attached.
#[derive(Debug, Clone)]
pub struct NewWalk {
    pub walk_type: WalkType,
    pub origin: LatLng,
    pub destination: Option<LatLng>,
    pub pet_ids: Vec<String>,
    pub payment_method_ids: Vec<String>,
    pub requested_start_time: Option<DateTime<Utc>>,
}

/// Body of `POST /walks`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateWalkRequest {
    #[serde(rename = "type")]
    pub walk_type: WalkType,
    pub origin: LatLng,
    pub destination: Option<LatLng>,
    pub pickup: LatLng,
    pub dropoff: LatLng,
    #[validate(range(min = 1))]
    pub estimated_distance_meters: u32,
    #[validate(range(min = 1))]
    pub estimated_duration_seconds: u32,
    #[validate(length(min = 1))]
    pub selected_route_polyline_encoded: String,
    pub requested_start_time: String,
    #[validate(range(min = 0.0))]
    pub price_amount: f64,
    pub price_currency: Option<String>,
    #[validate(length(min = 1, message = "select at least one pet"))]
    pub pet_ids: Vec<String>,
    #[validate(length(min = 1, message = "select at least one payment method"))]
    pub payment_method_ids: Vec<String>,
}

impl CreateWalkRequest {
    /// Build the creation body from the client's selection and the chosen
    /// route candidate. Price and estimates are taken from the candidate
    /// as-is and never recomputed.
    pub fn from_selection(walk: &NewWalk, candidate: &RouteCandidate) -> Result<Self> {
        walk.origin.check("origin")?;
        match (walk.walk_type.requires_destination(), walk.destination) {
            (true, Some(dest)) => dest.check("destination")?,
            (true, None) => {
                return Err(AppError::Validation(
                    "A_TO_B walks require a destination".to_string(),
                ))
            }
            (false, Some(_)) => {
                return Err(AppError::Validation(format!(
                    "{:?} walks must not carry a destination",
                    walk.walk_type
                )))
            }
            (false, None) => {}
        }

        let start = walk
            .requested_start_time
            .unwrap_or_else(|| Utc::now() + Duration::minutes(DEFAULT_START_LEAD_MINUTES));

        let request = Self {
            walk_type: walk.walk_type,
            origin: walk.origin,
            destination: walk.destination,
            pickup: walk.origin,
            dropoff: walk.destination.unwrap_or(walk.origin),
            estimated_distance_meters: candidate.estimated_distance_meters(),
            estimated_duration_seconds: candidate.estimated_duration_seconds(),
            selected_route_polyline_encoded: candidate.polyline_encoded.clone(),
            requested_start_time: format_utc_rfc3339(start),
            price_amount: candidate.price,
            price_currency: candidate.price_currency.clone(),
            pet_ids: clean_ids(&walk.pet_ids),
            payment_method_ids: clean_ids(&walk.payment_method_ids),
        };
        request.validate()?;
        Ok(request)
    }
}

/// Trim, drop blanks and de-duplicate opaque ids, keeping first-seen order.
fn clean_ids(ids: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(ids.len());
    for id in ids.iter().map(|id| id.trim()).filter(|id| !id.is_empty()) {
        if !out.iter().any(|existing| existing == id) {
            out.push(id.to_string());
        }
    }
    out
}

/// Body of `POST /walks/{id}/accept`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptWalkRequest {
    pub agreed_payment_method_id: String,
}

/// Body of `POST /walks/{id}/start` and `/end`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionRequest {
    pub lat: f64,
    pub lng: f64,
}

impl From<LatLng> for PositionRequest {
    fn from(point: LatLng) -> Self {
        Self {
            lat: point.lat,
            lng: point.lng,
        }
    }
}
