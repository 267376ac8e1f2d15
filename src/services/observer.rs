// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Client-side tracking observer.
//!
//! Merges a walk's Meta and Position streams into one [`TrackingView`].
//! Stream items are handled on the observer's own task and handed to the
//! presentation layer through a `watch` channel, which is the only place
//! the view is written.

use crate::error::Result;
use crate::models::{TrackingMeta, TrackingPosition, TrackingView, Walk, WalkStatus};
use crate::services::tracking::{Subscription, TrackingChannel};
use futures_util::StreamExt;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

/// Pure merge logic behind the observer.
///
/// `active` is reported only while the Meta record says so and the
/// client's own confirmed snapshot of the walk is STARTED. Each
/// inactive -> active edge opens a new session; positions from before the
/// last deactivation are never shown again.
#[derive(Debug, Clone)]
pub struct ObserverState {
    view: TrackingView,
    meta_active: bool,
    walk_started: bool,
    latest: Option<TrackingPosition>,
    high_water: Option<i64>,
    floor: Option<i64>,
}

impl ObserverState {
    pub fn new(walk_id: &str) -> Self {
        Self {
            view: TrackingView {
                walk_id: walk_id.to_string(),
                ..TrackingView::default()
            },
            meta_active: false,
            walk_started: false,
            latest: None,
            high_water: None,
            floor: None,
        }
    }

    pub fn view(&self) -> &TrackingView {
        &self.view
    }

    pub fn on_meta(&mut self, meta: &TrackingMeta) {
        self.meta_active = meta.active;
        self.view.route_polyline = Some(meta.polyline_encoded.clone()).filter(|p| !p.is_empty());
        self.refresh();
    }

    /// Feed the client's confirmed walk snapshot.
    pub fn on_walk(&mut self, walk: Option<&Walk>) {
        self.walk_started = walk.is_some_and(|w| {
            w.id == self.view.walk_id && w.status == WalkStatus::Started
        });
        self.refresh();
    }

    /// Returns whether the position was kept.
    pub fn on_position(&mut self, position: TrackingPosition) -> bool {
        if self.floor.is_some_and(|f| position.timestamp_millis <= f) {
            return false;
        }
        if !position.supersedes(self.latest.as_ref()) {
            return false;
        }
        self.high_water = Some(
            self.high_water
                .map_or(position.timestamp_millis, |h| h.max(position.timestamp_millis)),
        );
        self.latest = Some(position);
        self.refresh();
        true
    }

    pub fn on_error(&mut self, message: String) {
        self.view.error = Some(message);
    }

    fn clear_error(&mut self) {
        self.view.error = None;
    }

    fn refresh(&mut self) {
        let active = self.meta_active && self.walk_started;
        if active && !self.view.active {
            self.view.session += 1;
        } else if !active && self.view.active {
            self.floor = self.high_water;
            self.latest = None;
        }
        self.view.active = active;
        self.view.walker_position = if active { self.latest } else { None };
    }
}

enum Event {
    Shutdown,
    Meta(Option<Result<TrackingMeta>>),
    Position(Option<Result<TrackingPosition>>),
    WalkChanged,
    GateClosed,
}

/// Next item of an optional subscription; never resolves once it is gone.
async fn next_item<T>(sub: &mut Option<Subscription<T>>) -> Option<Result<T>> {
    match sub {
        Some(s) => s.next().await,
        None => std::future::pending().await,
    }
}

struct ObserverLoop {
    walk_id: String,
    channel: TrackingChannel,
    gate: watch::Receiver<Option<Walk>>,
    view_tx: watch::Sender<TrackingView>,
}

impl ObserverLoop {
    async fn run(mut self, mut state: ObserverState, mut shutdown: oneshot::Receiver<()>) -> ObserverState {
        let mut meta = Some(self.channel.subscribe_meta(&self.walk_id).await);
        let mut positions = Some(self.channel.subscribe(&self.walk_id).await);
        let mut gate_open = true;

        state.on_walk(self.gate.borrow_and_update().as_ref());
        self.publish(&state);

        loop {
            let event = tokio::select! {
                biased;
                _ = &mut shutdown => Event::Shutdown,
                changed = self.gate.changed(), if gate_open => match changed {
                    Ok(()) => Event::WalkChanged,
                    Err(_) => Event::GateClosed,
                },
                item = next_item(&mut meta) => Event::Meta(item),
                item = next_item(&mut positions) => Event::Position(item),
            };

            match event {
                Event::Shutdown => break,
                Event::WalkChanged => state.on_walk(self.gate.borrow_and_update().as_ref()),
                Event::GateClosed => gate_open = false,
                Event::Meta(Some(Ok(m))) => state.on_meta(&m),
                Event::Position(Some(Ok(p))) => {
                    if !state.on_position(p) {
                        tracing::debug!(
                            walk_id = %self.walk_id,
                            ts = p.timestamp_millis,
                            "Dropping stale position"
                        );
                    }
                }
                // A failed stream stays closed until the caller reconnects.
                Event::Meta(Some(Err(e))) => {
                    tracing::warn!(walk_id = %self.walk_id, error = %e, "Meta stream failed");
                    state.on_error(e.user_message());
                    meta = None;
                }
                Event::Position(Some(Err(e))) => {
                    tracing::warn!(walk_id = %self.walk_id, error = %e, "Position stream failed");
                    state.on_error(e.user_message());
                    positions = None;
                }
                Event::Meta(None) => meta = None,
                Event::Position(None) => positions = None,
            }

            self.publish(&state);
        }

        if let Some(sub) = meta.take() {
            sub.unsubscribe();
        }
        if let Some(sub) = positions.take() {
            sub.unsubscribe();
        }
        tracing::debug!(walk_id = %self.walk_id, "Tracking observer closed");
        state
    }

    fn publish(&self, state: &ObserverState) {
        self.view_tx.send_if_modified(|view| {
            if view == state.view() {
                false
            } else {
                *view = state.view().clone();
                true
            }
        });
    }
}

/// Observes one walk's tracking records until closed.
pub struct TrackingObserver {
    walk_id: String,
    channel: TrackingChannel,
    gate: watch::Receiver<Option<Walk>>,
    view_tx: watch::Sender<TrackingView>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<ObserverState>>,
}

impl TrackingObserver {
    /// Subscribe to `walk_id`. `gate` is the client's own confirmed walk
    /// snapshot, e.g. from `WalkLifecycleManager::subscribe`.
    pub fn start(
        channel: TrackingChannel,
        walk_id: &str,
        gate: watch::Receiver<Option<Walk>>,
    ) -> Self {
        let state = ObserverState::new(walk_id);
        let view_tx = watch::Sender::new(state.view().clone());
        let mut observer = Self {
            walk_id: walk_id.to_string(),
            channel,
            gate,
            view_tx,
            shutdown: None,
            task: None,
        };
        observer.spawn(state);
        tracing::info!(walk_id, "Tracking observer started");
        observer
    }

    fn spawn(&mut self, state: ObserverState) {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let worker = ObserverLoop {
            walk_id: self.walk_id.clone(),
            channel: self.channel.clone(),
            gate: self.gate.clone(),
            view_tx: self.view_tx.clone(),
        };
        self.shutdown = Some(shutdown_tx);
        self.task = Some(tokio::spawn(worker.run(state, shutdown_rx)));
    }

    pub fn view(&self) -> TrackingView {
        self.view_tx.borrow().clone()
    }

    pub fn subscribe_view(&self) -> watch::Receiver<TrackingView> {
        self.view_tx.subscribe()
    }

    /// Stop the task and wait for it, returning the final state.
    async fn join(&mut self) -> Option<ObserverState> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        let task = self.task.take()?;
        match task.await {
            Ok(state) => Some(state),
            Err(e) => {
                tracing::error!(walk_id = %self.walk_id, error = %e, "Tracking observer task failed");
                None
            }
        }
    }

    /// Resubscribe both streams, e.g. after a stream error. The session
    /// and high-water mark carry over.
    pub async fn reconnect(&mut self) {
        let mut state = self
            .join()
            .await
            .unwrap_or_else(|| ObserverState::new(&self.walk_id));
        state.clear_error();
        tracing::info!(walk_id = %self.walk_id, "Tracking observer reconnecting");
        self.spawn(state);
    }

    /// Unsubscribe both streams and wait for the task to end.
    pub async fn close(mut self) -> TrackingView {
        self.join().await;
        self.view()
    }
}

impl Drop for TrackingObserver {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
