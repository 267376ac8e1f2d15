// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-walk publish/subscribe channel over two tracking records.
//!
//! Each walk has a Position record (last-value-wins) and a Meta record
//! (`active` flag plus route). Delivery to subscribers is push-based and
//! at-least-once with no ordering between writes; subscribers compare
//! `timestampMillis` to drop stale positions.

use crate::error::{AppError, Result};
use crate::models::{LatLng, TrackingMeta, TrackingPosition};
use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Backing store for the tracking records.
#[async_trait]
pub trait TrackingStore: Send + Sync {
    async fn write_position(&self, walk_id: &str, position: &TrackingPosition) -> Result<()>;

    async fn write_meta(&self, walk_id: &str, meta: &TrackingMeta) -> Result<()>;

    async fn read_position(&self, walk_id: &str) -> Result<Option<TrackingPosition>>;

    /// Absent meta reads as [`TrackingMeta::default`].
    async fn read_meta(&self, walk_id: &str) -> Result<TrackingMeta>;

    /// Stream of the Position record: current value first (if any), then
    /// every later write.
    async fn watch_position(&self, walk_id: &str) -> Result<Subscription<TrackingPosition>>;

    /// Stream of the Meta record: current value (or default) first, then
    /// every later write.
    async fn watch_meta(&self, walk_id: &str) -> Result<Subscription<TrackingMeta>>;
}

/// A long-lived subscription to one tracking record.
///
/// Ends after the first error. Dropping it releases the underlying
/// listener; [`Subscription::unsubscribe`] does the same explicitly.
pub struct Subscription<T> {
    key: String,
    stream: BoxStream<'static, Result<T>>,
    cancel: Option<oneshot::Sender<()>>,
    failed: bool,
}

impl<T: Send + 'static> Subscription<T> {
    /// Wrap a stream. `cancel` is fired when the subscription goes away.
    pub fn new(
        key: impl Into<String>,
        stream: BoxStream<'static, Result<T>>,
        cancel: Option<oneshot::Sender<()>>,
    ) -> Self {
        Self {
            key: key.into(),
            stream,
            cancel,
            failed: false,
        }
    }

    /// A subscription that could not be established: yields `err` once.
    pub fn failed(key: impl Into<String>, err: AppError) -> Self {
        let err = match err {
            AppError::Stream(msg) => AppError::Stream(msg),
            other => AppError::Stream(other.to_string()),
        };
        Self::new(key, stream::once(async move { Err(err) }).boxed(), None)
    }

    /// Record key, e.g. `tracking/{walkId}/meta`.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Stop receiving updates and release the listener.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
            tracing::debug!(key = %self.key, "Tracking subscription released");
        }
    }
}

impl<T> Stream for Subscription<T> {
    type Item = Result<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.failed {
            return Poll::Ready(None);
        }
        let item = self.stream.as_mut().poll_next(cx);
        if let Poll::Ready(Some(Err(_))) = &item {
            // Errors are terminal; reconnecting is the caller's call.
            self.failed = true;
        }
        item
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }
}

/// Position and Meta record keys for a walk.
pub fn position_key(walk_id: &str) -> String {
    format!("tracking/{}/latest", walk_id)
}

pub fn meta_key(walk_id: &str) -> String {
    format!("tracking/{}/meta", walk_id)
}

/// Typed operations over a [`TrackingStore`].
#[derive(Clone)]
pub struct TrackingChannel {
    store: Arc<dyn TrackingStore>,
}

impl TrackingChannel {
    pub fn new(store: Arc<dyn TrackingStore>) -> Self {
        Self { store }
    }

    /// Overwrite the walk's Position record.
    pub async fn publish(&self, walk_id: &str, point: LatLng, timestamp_millis: i64) -> Result<()> {
        let position = TrackingPosition::new(point, timestamp_millis);
        self.store.write_position(walk_id, &position).await
    }

    /// Overwrite the walk's Meta record.
    ///
    /// With `polyline_encoded = None` the currently stored route is kept.
    pub async fn set_active(
        &self,
        walk_id: &str,
        active: bool,
        polyline_encoded: Option<&str>,
    ) -> Result<()> {
        let polyline_encoded = match polyline_encoded {
            Some(p) => p.to_string(),
            None => self.store.read_meta(walk_id).await?.polyline_encoded,
        };
        let meta = TrackingMeta {
            active,
            polyline_encoded,
        };
        self.store.write_meta(walk_id, &meta).await?;
        tracing::info!(walk_id, active, "Tracking meta updated");
        Ok(())
    }

    pub async fn meta(&self, walk_id: &str) -> Result<TrackingMeta> {
        self.store.read_meta(walk_id).await
    }

    pub async fn latest(&self, walk_id: &str) -> Result<Option<TrackingPosition>> {
        self.store.read_position(walk_id).await
    }

    /// Subscribe to the walk's Position record. A subscription that cannot be
    /// established yields a single terminal error.
    pub async fn subscribe(&self, walk_id: &str) -> Subscription<TrackingPosition> {
        match self.store.watch_position(walk_id).await {
            Ok(sub) => sub,
            Err(e) => {
                tracing::warn!(walk_id, error = %e, "Position subscription failed");
                Subscription::failed(position_key(walk_id), e)
            }
        }
    }

    /// Subscribe to the walk's Meta record.
    pub async fn subscribe_meta(&self, walk_id: &str) -> Subscription<TrackingMeta> {
        match self.store.watch_meta(walk_id).await {
            Ok(sub) => sub,
            Err(e) => {
                tracing::warn!(walk_id, error = %e, "Meta subscription failed");
                Subscription::failed(meta_key(walk_id), e)
            }
        }
    }
}
