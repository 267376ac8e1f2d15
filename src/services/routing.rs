// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Route candidate calculation and the "last request wins" planner state.

use crate::error::{AppError, Result};
use crate::models::{RouteCandidate, RouteOutcome, RouteRequest};
use crate::services::api::WalksApi;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Stateless front of the external routing service.
#[derive(Clone)]
pub struct RouteCandidateService {
    api: Arc<dyn WalksApi>,
}

impl RouteCandidateService {
    pub fn new(api: Arc<dyn WalksApi>) -> Self {
        Self { api }
    }

    /// Calculate candidates for `request`.
    ///
    /// Missing or non-positive type-specific parameters fail with
    /// `Validation` before any request is sent. An empty answer is
    /// [`RouteOutcome::NoFeasibleRoute`], not an error.
    pub async fn calculate(&self, request: &RouteRequest) -> Result<RouteOutcome> {
        let request = request.validated()?;
        let candidates = self.api.calculate_route(&request).await?;

        tracing::debug!(
            walk_type = ?request.walk_type,
            count = candidates.len(),
            "Route candidates received"
        );

        if candidates.is_empty() {
            Ok(RouteOutcome::NoFeasibleRoute)
        } else {
            Ok(RouteOutcome::Candidates(candidates))
        }
    }
}

/// Presentation state of the route picker.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoutePlannerState {
    /// Token of the request this state reflects.
    pub token: u64,
    pub loading: bool,
    pub candidates: Vec<RouteCandidate>,
    /// Index into `candidates`.
    pub selected: Option<usize>,
    /// `true` when the routing service answered with no candidates.
    pub no_feasible_route: bool,
    pub error: Option<String>,
}

impl RoutePlannerState {
    pub fn selected_candidate(&self) -> Option<&RouteCandidate> {
        self.selected.and_then(|i| self.candidates.get(i))
    }
}

/// What happened to the result of one [`RoutePlanner::submit`] call.
#[derive(Debug)]
pub enum RouteUpdate {
    /// The result was the newest and is now the visible state.
    Applied(Result<RouteOutcome>),
    /// A newer request was issued while this one was in flight.
    Superseded { token: u64 },
}

/// Route picker that applies only the result of the latest request.
pub struct RoutePlanner {
    service: RouteCandidateService,
    next_token: AtomicU64,
    state: watch::Sender<RoutePlannerState>,
}

impl RoutePlanner {
    pub fn new(service: RouteCandidateService) -> Self {
        Self {
            service,
            next_token: AtomicU64::new(0),
            state: watch::Sender::new(RoutePlannerState::default()),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<RoutePlannerState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> RoutePlannerState {
        self.state.borrow().clone()
    }

    /// Highest token issued so far.
    pub fn latest_token(&self) -> u64 {
        self.next_token.load(Ordering::SeqCst)
    }

    /// Calculate routes for new parameters.
    ///
    /// Issuing the token happens before validation, so even an invalid
    /// parameter set supersedes whatever is still in flight.
    pub async fn submit(&self, request: RouteRequest) -> RouteUpdate {
        let token = self.next_token.fetch_add(1, Ordering::SeqCst) + 1;

        self.apply_if_current(token, |state| {
            state.token = token;
            state.loading = true;
            state.error = None;
        });

        let result = self.service.calculate(&request).await;

        let applied = self.apply_if_current(token, |state| {
            state.loading = false;
            state.no_feasible_route = false;
            state.error = None;
            match &result {
                Ok(RouteOutcome::Candidates(list)) => {
                    state.candidates = list.clone();
                    state.selected = Some(0);
                }
                Ok(RouteOutcome::NoFeasibleRoute) => {
                    state.candidates.clear();
                    state.selected = None;
                    state.no_feasible_route = true;
                }
                Err(e) => {
                    state.candidates.clear();
                    state.selected = None;
                    state.error = Some(e.user_message());
                }
            }
        });

        if applied {
            RouteUpdate::Applied(result)
        } else {
            tracing::debug!(token, latest = self.latest_token(), "Discarding superseded route result");
            RouteUpdate::Superseded { token }
        }
    }

    /// Choose one of the visible candidates.
    pub fn select(&self, index: usize) -> Result<RouteCandidate> {
        let mut chosen = None;
        self.state.send_if_modified(|state| match state.candidates.get(index) {
            Some(candidate) => {
                chosen = Some(candidate.clone());
                let changed = state.selected != Some(index);
                state.selected = Some(index);
                changed
            }
            None => false,
        });
        chosen.ok_or_else(|| AppError::Validation(format!("No route candidate at index {}", index)))
    }

    /// Mutate the state only while `token` is still the latest one issued.
    /// The check and the write happen under the watch lock.
    fn apply_if_current(&self, token: u64, f: impl FnOnce(&mut RoutePlannerState)) -> bool {
        let mut applied = false;
        self.state.send_if_modified(|state| {
            if self.next_token.load(Ordering::SeqCst) != token {
                return false;
            }
            f(state);
            applied = true;
            true
        });
        applied
    }
}
