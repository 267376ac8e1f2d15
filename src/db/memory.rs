// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process tracking store.
//!
//! Each record is a `watch` channel: writers overwrite in place, and every
//! subscriber sees the current value on subscribe plus each later write
//! (intermediate writes may coalesce, which last-value-wins records allow).

use crate::error::Result;
use crate::models::{TrackingMeta, TrackingPosition};
use crate::services::tracking::{meta_key, position_key, Subscription, TrackingStore};
use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use tokio::sync::watch;

struct WalkRecords {
    position: watch::Sender<Option<TrackingPosition>>,
    meta: watch::Sender<Option<TrackingMeta>>,
}

impl WalkRecords {
    fn new() -> Self {
        Self {
            position: watch::Sender::new(None),
            meta: watch::Sender::new(None),
        }
    }
}

/// Tracking store kept in memory, shared by cloning.
#[derive(Clone, Default)]
pub struct MemoryTrackingStore {
    records: Arc<DashMap<String, Arc<WalkRecords>>>,
}

impl MemoryTrackingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self, walk_id: &str) -> Arc<WalkRecords> {
        self.records
            .entry(walk_id.to_string())
            .or_insert_with(|| Arc::new(WalkRecords::new()))
            .clone()
    }

    /// Number of live subscribers to a walk's Position and Meta records.
    pub fn subscriber_counts(&self, walk_id: &str) -> (usize, usize) {
        match self.records.get(walk_id) {
            Some(r) => (r.position.receiver_count(), r.meta.receiver_count()),
            None => (0, 0),
        }
    }
}

/// Turn a watch receiver into a stream of its current and later values,
/// skipping values `project` maps to `None`.
fn watch_stream<W, T, F>(rx: watch::Receiver<W>, project: F) -> BoxStream<'static, Result<T>>
where
    W: Send + Sync + 'static,
    T: Send + 'static,
    F: Fn(&W) -> Option<T> + Send + Sync + 'static,
{
    let project = Arc::new(project);
    stream::unfold((rx, project, true), |(mut rx, project, first)| async move {
        if !first && rx.changed().await.is_err() {
            return None;
        }
        loop {
            let current = project(&rx.borrow_and_update());
            if let Some(value) = current {
                return Some((Ok(value), (rx, project, false)));
            }
            if rx.changed().await.is_err() {
                return None;
            }
        }
    })
    .boxed()
}

#[async_trait]
impl TrackingStore for MemoryTrackingStore {
    async fn write_position(&self, walk_id: &str, position: &TrackingPosition) -> Result<()> {
        self.records(walk_id).position.send_replace(Some(*position));
        Ok(())
    }

    async fn write_meta(&self, walk_id: &str, meta: &TrackingMeta) -> Result<()> {
        self.records(walk_id).meta.send_replace(Some(meta.clone()));
        Ok(())
    }

    async fn read_position(&self, walk_id: &str) -> Result<Option<TrackingPosition>> {
        Ok(*self.records(walk_id).position.borrow())
    }

    async fn read_meta(&self, walk_id: &str) -> Result<TrackingMeta> {
        Ok(self
            .records(walk_id)
            .meta
            .borrow()
            .clone()
            .unwrap_or_default())
    }

    async fn watch_position(&self, walk_id: &str) -> Result<Subscription<TrackingPosition>> {
        let rx = self.records(walk_id).position.subscribe();
        Ok(Subscription::new(
            position_key(walk_id),
            watch_stream(rx, |p: &Option<TrackingPosition>| *p),
            None,
        ))
    }

    async fn watch_meta(&self, walk_id: &str) -> Result<Subscription<TrackingMeta>> {
        let rx = self.records(walk_id).meta.subscribe();
        Ok(Subscription::new(
            meta_key(walk_id),
            watch_stream(rx, |m: &Option<TrackingMeta>| {
                Some(m.clone().unwrap_or_default())
            }),
            None,
        ))
    }
}
