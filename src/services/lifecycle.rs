// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Walk lifecycle manager.
//!
//! Owns one process's confirmed snapshot of a walk. Every transition is a
//! single backend call; the snapshot changes only after the backend confirms
//! it, and never moves backwards along the status graph. The backend is the
//! only arbiter between the two actors: a `Conflict` from it is final, and
//! the manager reloads instead of retrying.

use crate::error::{AppError, Result};
use crate::models::{
    CreateWalkRequest, LatLng, NewWalk, RouteCandidate, Walk, WalkListing, WalkStatus,
    WalkSummary, WalkTrigger,
};
use crate::services::api::WalksApi;
use crate::services::publisher::{LocationPublisher, PublisherHandle, PublisherStats};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

/// Walker-side tracking hook: the publisher plus the handle of the task
/// currently running for the loaded walk.
struct WalkerTracking {
    publisher: LocationPublisher,
    running: Mutex<Option<PublisherHandle>>,
}

pub struct WalkLifecycleManager {
    api: Arc<dyn WalksApi>,
    snapshot: watch::Sender<Option<Walk>>,
    tracking: Option<WalkerTracking>,
}

impl WalkLifecycleManager {
    pub fn new(api: Arc<dyn WalksApi>) -> Self {
        Self {
            api,
            snapshot: watch::Sender::new(None),
            tracking: None,
        }
    }

    /// Activate tracking on confirmed START and deactivate it on confirmed
    /// END (walker process only).
    pub fn with_tracking(mut self, publisher: LocationPublisher) -> Self {
        self.tracking = Some(WalkerTracking {
            publisher,
            running: Mutex::new(None),
        });
        self
    }

    /// Last confirmed walk, if any.
    pub fn snapshot(&self) -> Option<Walk> {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Walk>> {
        self.snapshot.subscribe()
    }

    /// Create a PENDING walk from the client's selection and chosen route.
    pub async fn create(&self, selection: &NewWalk, candidate: &RouteCandidate) -> Result<Walk> {
        let request = CreateWalkRequest::from_selection(selection, candidate)?;
        let walk_id = self.api.create_walk(&request).await?;

        let walk = self.api.get_walk(&walk_id).await?;
        verify(&walk, &walk_id, WalkStatus::Pending)?;
        if walk.price_amount != request.price_amount {
            tracing::warn!(
                walk_id = %walk.id,
                requested = request.price_amount,
                stored = walk.price_amount,
                "Backend stored a different price than the chosen candidate"
            );
        }

        self.snapshot.send_replace(Some(walk.clone()));
        tracing::info!(walk_id = %walk.id, walk_type = ?walk.walk_type, "Walk requested");
        Ok(walk)
    }

    /// Load a walk the caller is a party to.
    pub async fn load(&self, walk_id: &str) -> Result<Walk> {
        let walk = self.api.get_walk(walk_id).await?;
        self.adopt(walk)
    }

    /// Load a pending walk offered to walkers.
    pub async fn load_available(&self, walk_id: &str) -> Result<Walk> {
        let walk = self.api.get_available_walk(walk_id).await?;
        self.adopt(walk)
    }

    /// Re-read the loaded walk's true state.
    pub async fn reload(&self) -> Result<Walk> {
        let walk_id = self.current()?.id;
        self.load(&walk_id).await
    }

    /// Pure read, safe to retry.
    pub async fn list(&self, listing: WalkListing) -> Result<Vec<WalkSummary>> {
        self.api.list_walks(listing).await
    }

    /// Client withdraws the loaded walk (PENDING only).
    pub async fn cancel(&self) -> Result<Walk> {
        let current = self.ready(WalkTrigger::Cancel).await?;

        let ack = match self.api.cancel_walk(&current.id).await {
            Ok(ack) => ack,
            Err(e) => return Err(self.on_failure(&current.id, WalkTrigger::Cancel, e).await),
        };
        if ack.id != current.id || ack.status != WalkStatus::Cancelled {
            return Err(AppError::Backend(format!(
                "cancel of {} answered with {} {}",
                current.id, ack.id, ack.status
            )));
        }

        let mut walk = current;
        walk.status = WalkStatus::Cancelled;
        self.apply_confirmed(&walk);
        tracing::info!(walk_id = %walk.id, "Walk cancelled");

        if let Some(tracking) = &self.tracking {
            // A pending walk never had tracking; this only clears leftovers.
            if let Err(e) = tracking.publisher.channel().set_active(&walk.id, false, None).await {
                tracing::warn!(walk_id = %walk.id, error = %e, "Failed to clear tracking after cancel");
            }
        }
        Ok(walk)
    }

    /// Walker takes the loaded walk, agreeing on one of the proposed
    /// payment methods.
    pub async fn accept(&self, agreed_payment_method_id: &str) -> Result<Walk> {
        let current = self.ready(WalkTrigger::Accept).await?;
        let method = agreed_payment_method_id.trim();
        if method.is_empty() {
            return Err(AppError::Validation("a payment method is required".to_string()));
        }
        if !current.payment_method_ids.iter().any(|m| m == method) {
            return Err(AppError::Validation(format!(
                "payment method {} was not proposed for this walk",
                method
            )));
        }

        let result = self.api.accept_walk(&current.id, method).await;
        let walk = self
            .confirm(&current.id, WalkTrigger::Accept, WalkStatus::Accepted, result)
            .await?;
        tracing::info!(
            walk_id = %walk.id,
            walker_id = walk.walker_id.as_deref().unwrap_or_default(),
            "Walk accepted"
        );
        Ok(walk)
    }

    /// Walker starts the loaded walk at `position`.
    ///
    /// With tracking configured, activation follows the confirmed
    /// transition. An activation failure is returned while the snapshot
    /// stays STARTED; the walk is not rolled back.
    pub async fn start(&self, position: LatLng) -> Result<Walk> {
        position.check("position")?;
        let current = self.ready(WalkTrigger::Start).await?;

        let result = self.api.start_walk(&current.id, position).await;
        let walk = self
            .confirm(&current.id, WalkTrigger::Start, WalkStatus::Started, result)
            .await?;
        tracing::info!(walk_id = %walk.id, "Walk started");

        if let Some(tracking) = &self.tracking {
            tracking.activate(&walk).await?;
        }
        Ok(walk)
    }

    /// Walker ends the loaded walk at `position`. Tracking stops before the
    /// meta record is flipped to inactive.
    ///
    /// If the flip fails the walk is still COMPLETED (the snapshot says so)
    /// and the error is returned; [`Self::deactivate_tracking`] retries it.
    pub async fn end(&self, position: LatLng) -> Result<Walk> {
        position.check("position")?;
        let current = self.ready(WalkTrigger::End).await?;

        let result = self.api.end_walk(&current.id, position).await;
        let walk = self
            .confirm(&current.id, WalkTrigger::End, WalkStatus::Completed, result)
            .await?;
        tracing::info!(walk_id = %walk.id, "Walk completed");

        if let Some(tracking) = &self.tracking {
            if let Err(e) = tracking.deactivate(&walk.id).await {
                tracing::warn!(
                    walk_id = %walk.id,
                    error = %e,
                    "Walk completed but tracking meta is still active"
                );
                return Err(e);
            }
        }
        Ok(walk)
    }

    /// Stop the publisher and mark tracking inactive for the loaded walk.
    ///
    /// Idempotent. Refused while the walk is STARTED, since observers would
    /// lose a walk that is still under way.
    pub async fn deactivate_tracking(&self) -> Result<()> {
        let current = self.current()?;
        if current.status == WalkStatus::Started {
            return Err(AppError::Conflict(format!(
                "walk {} is still started",
                current.id
            )));
        }
        match &self.tracking {
            Some(tracking) => tracking.deactivate(&current.id).await,
            None => Ok(()),
        }
    }

    /// Stop any running publisher without touching the walk, e.g. on
    /// process shutdown.
    pub async fn shutdown(&self) -> Option<PublisherStats> {
        let tracking = self.tracking.as_ref()?;
        let handle = tracking.running.lock().await.take()?;
        Some(handle.stop().await)
    }

    fn current(&self) -> Result<Walk> {
        self.snapshot()
            .ok_or_else(|| AppError::Validation("no walk loaded".to_string()))
    }

    /// The loaded walk, if `trigger` has an edge from its status.
    ///
    /// The snapshot may lag the backend (the other actor moves the walk
    /// too), so a trigger with no local edge is checked again against a
    /// fresh read. Only a trigger invalid in the backend's status is
    /// refused without sending the transition.
    async fn ready(&self, trigger: WalkTrigger) -> Result<Walk> {
        let current = self.current()?;
        if current.status.apply(trigger).is_some() {
            return Ok(current);
        }

        tracing::debug!(walk_id = %current.id, ?trigger, status = %current.status, "No local edge, reloading");
        let fresh = match self.load(&current.id).await {
            Ok(walk) => walk,
            Err(e) => {
                tracing::warn!(walk_id = %current.id, error = %e, "Reload before transition failed");
                current
            }
        };
        match fresh.status.apply(trigger) {
            Some(_) => Ok(fresh),
            None => Err(AppError::Conflict(format!(
                "cannot {:?} walk {} in status {}",
                trigger, fresh.id, fresh.status
            ))),
        }
    }

    async fn confirm(
        &self,
        walk_id: &str,
        trigger: WalkTrigger,
        expected: WalkStatus,
        result: Result<Walk>,
    ) -> Result<Walk> {
        let walk = match result {
            Ok(walk) => walk,
            Err(e) => return Err(self.on_failure(walk_id, trigger, e).await),
        };
        verify(&walk, walk_id, expected)?;
        self.apply_confirmed(&walk);
        Ok(walk)
    }

    /// Local state is untouched on failure. A conflict means the snapshot
    /// is stale, so it is refreshed before the error is handed back.
    async fn on_failure(&self, walk_id: &str, trigger: WalkTrigger, err: AppError) -> AppError {
        if err.requires_reload() {
            tracing::info!(walk_id, ?trigger, "Transition rejected by backend, reloading");
            if let Err(reload_err) = self.load(walk_id).await {
                tracing::warn!(walk_id, error = %reload_err, "Reload after conflict failed");
            }
        } else {
            tracing::warn!(walk_id, ?trigger, error = %err, "Transition failed");
        }
        err
    }

    fn adopt(&self, walk: Walk) -> Result<Walk> {
        walk.check_invariants().map_err(|msg| {
            AppError::Backend(format!("walk {} violates invariants: {}", walk.id, msg))
        })?;
        self.apply_confirmed(&walk);
        Ok(walk)
    }

    /// Replace the snapshot unless that would move the same walk backwards.
    fn apply_confirmed(&self, walk: &Walk) -> bool {
        self.snapshot.send_if_modified(|current| {
            if let Some(cur) = current.as_ref().filter(|c| c.id == walk.id) {
                let forward = walk.status.rank() > cur.status.rank();
                if !forward && walk.status != cur.status {
                    tracing::warn!(
                        walk_id = %walk.id,
                        current = %cur.status,
                        received = %walk.status,
                        "Ignoring stale walk status"
                    );
                    return false;
                }
                if cur == walk {
                    return false;
                }
            }
            *current = Some(walk.clone());
            true
        })
    }
}

impl WalkerTracking {
    async fn activate(&self, walk: &Walk) -> Result<()> {
        // Meta must never read active without a publisher behind it.
        self.publisher.check_permission(&walk.id)?;

        let channel = self.publisher.channel();
        let polyline = walk.selected_route_polyline_encoded.as_deref().unwrap_or("");
        channel.set_active(&walk.id, true, Some(polyline)).await?;

        let mut running = self.running.lock().await;
        if let Some(previous) = running.take() {
            tracing::warn!(walk_id = %previous.walk_id(), "Replacing running location publisher");
            previous.stop().await;
        }

        match self.publisher.start(&walk.id) {
            Ok(handle) => {
                *running = Some(handle);
                Ok(())
            }
            Err(e) => {
                // Leave the walk STARTED but visibly untracked.
                if let Err(reset_err) = channel.set_active(&walk.id, false, None).await {
                    tracing::warn!(walk_id = %walk.id, error = %reset_err, "Failed to reset tracking meta");
                }
                Err(e)
            }
        }
    }

    async fn deactivate(&self, walk_id: &str) -> Result<()> {
        let handle = self.running.lock().await.take();
        if let Some(handle) = handle {
            handle.stop().await;
        }
        self.publisher.channel().set_active(walk_id, false, None).await
    }
}

/// A confirmed record must be the walk asked about, in the expected status,
/// and internally consistent.
fn verify(walk: &Walk, walk_id: &str, expected: WalkStatus) -> Result<()> {
    if walk.id != walk_id {
        return Err(AppError::Backend(format!(
            "expected walk {}, got {}",
            walk_id, walk.id
        )));
    }
    if walk.status != expected {
        return Err(AppError::Backend(format!(
            "walk {} is {} after transition, expected {}",
            walk.id, walk.status, expected
        )));
    }
    walk.check_invariants()
        .map_err(|msg| AppError::Backend(format!("walk {} violates invariants: {}", walk.id, msg)))
}
