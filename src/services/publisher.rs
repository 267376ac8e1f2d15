// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Walker-side location publisher.
//!
//! One background task per started walk samples the device position on a
//! fixed interval and overwrites the walk's Position record. Missed ticks
//! are skipped rather than replayed, and a failed publish is logged and
//! the loop moves on to the next sample.

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::LatLng;
use crate::services::location::{
    displacement_meters, LocationPermission, LocationSample, LocationSource,
};
use crate::services::tracking::TrackingChannel;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Sampling parameters.
#[derive(Debug, Clone, Copy)]
pub struct PublisherConfig {
    pub interval: Duration,
    pub min_displacement_meters: f64,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            min_displacement_meters: 5.0,
        }
    }
}

impl From<&Config> for PublisherConfig {
    fn from(config: &Config) -> Self {
        Self {
            interval: config.tracking_interval,
            min_displacement_meters: config.min_displacement_meters,
        }
    }
}

/// Keeps the process allowed to run while backgrounded.
///
/// The platform-specific part (a foreground service, a wake lock) lives
/// behind this trait; the publisher only holds the grant for as long as it
/// samples.
pub trait BackgroundExecution: Send + Sync {
    fn acquire(&self, walk_id: &str) -> Result<BackgroundGrant>;
}

/// Scoped background-execution grant. Released exactly once, on drop.
pub struct BackgroundGrant {
    walk_id: String,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl BackgroundGrant {
    pub fn new(walk_id: impl Into<String>, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            walk_id: walk_id.into(),
            release: Some(Box::new(release)),
        }
    }

    pub fn walk_id(&self) -> &str {
        &self.walk_id
    }
}

impl Drop for BackgroundGrant {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
            tracing::debug!(walk_id = %self.walk_id, "Background execution grant released");
        }
    }
}

/// For processes that are never suspended (servers, the CLI).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopBackground;

impl BackgroundExecution for NoopBackground {
    fn acquire(&self, walk_id: &str) -> Result<BackgroundGrant> {
        Ok(BackgroundGrant::new(walk_id, || {}))
    }
}

/// Counters returned when a publisher stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublisherStats {
    pub published: u64,
    /// Samples dropped by the displacement filter or with no fix.
    pub skipped: u64,
    pub failed: u64,
}

/// Starts publisher tasks for walks.
#[derive(Clone)]
pub struct LocationPublisher {
    channel: TrackingChannel,
    source: Arc<dyn LocationSource>,
    background: Arc<dyn BackgroundExecution>,
    config: PublisherConfig,
}

impl LocationPublisher {
    pub fn new(
        channel: TrackingChannel,
        source: Arc<dyn LocationSource>,
        background: Arc<dyn BackgroundExecution>,
        config: PublisherConfig,
    ) -> Self {
        Self {
            channel,
            source,
            background,
            config,
        }
    }

    pub fn channel(&self) -> &TrackingChannel {
        &self.channel
    }

    /// `PermissionDenied` unless the source may be sampled.
    pub fn check_permission(&self, walk_id: &str) -> Result<()> {
        if self.source.permission() == LocationPermission::Denied {
            tracing::warn!(walk_id, "Location permission denied, tracking not started");
            return Err(AppError::PermissionDenied(format!(
                "location access is required to track walk {}",
                walk_id
            )));
        }
        Ok(())
    }

    /// Start sampling for `walk_id`.
    ///
    /// Fails fast with `PermissionDenied` when location access is off; no
    /// task is spawned and no grant is held in that case.
    pub fn start(&self, walk_id: &str) -> Result<PublisherHandle> {
        self.check_permission(walk_id)?;

        let grant = self.background.acquire(walk_id)?;
        let (stop_tx, stop_rx) = oneshot::channel();

        let worker = PublishLoop {
            walk_id: walk_id.to_string(),
            channel: self.channel.clone(),
            source: self.source.clone(),
            config: self.config,
        };
        let task = tokio::spawn(worker.run(stop_rx, grant));

        tracing::info!(
            walk_id,
            every_ms = self.config.interval.as_millis() as u64,
            min_displacement_m = self.config.min_displacement_meters,
            "Location publisher started"
        );

        Ok(PublisherHandle {
            walk_id: walk_id.to_string(),
            stop_tx: Some(stop_tx),
            task: Some(task),
        })
    }
}

struct PublishLoop {
    walk_id: String,
    channel: TrackingChannel,
    source: Arc<dyn LocationSource>,
    config: PublisherConfig,
}

impl PublishLoop {
    /// Runs until the stop signal fires or its sender is dropped. Every
    /// await is raced against the signal, so nothing is written once it
    /// has fired.
    async fn run(self, mut stop_rx: oneshot::Receiver<()>, grant: BackgroundGrant) -> PublisherStats {
        let _grant = grant;
        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut stats = PublisherStats::default();
        let mut last_published: Option<LatLng> = None;

        loop {
            tokio::select! {
                biased;
                _ = &mut stop_rx => break,
                _ = ticker.tick() => {}
            }

            let sample = tokio::select! {
                biased;
                _ = &mut stop_rx => break,
                sample = self.source.current_position() => sample,
            };

            let sample = match sample {
                Ok(Some(sample)) => sample,
                Ok(None) => {
                    stats.skipped += 1;
                    continue;
                }
                Err(e) => {
                    tracing::warn!(walk_id = %self.walk_id, error = %e, "Location read failed");
                    stats.failed += 1;
                    continue;
                }
            };

            if !self.should_publish(last_published, &sample) {
                tracing::debug!(
                    walk_id = %self.walk_id,
                    ts = sample.timestamp_millis,
                    "Sample within displacement threshold, skipped"
                );
                stats.skipped += 1;
                continue;
            }

            let result = tokio::select! {
                biased;
                _ = &mut stop_rx => break,
                result = self.channel.publish(&self.walk_id, sample.point, sample.timestamp_millis) => result,
            };

            match result {
                Ok(()) => {
                    stats.published += 1;
                    last_published = Some(sample.point);
                }
                Err(e) => {
                    tracing::warn!(walk_id = %self.walk_id, error = %e, "Position publish failed");
                    stats.failed += 1;
                }
            }
        }

        tracing::info!(
            walk_id = %self.walk_id,
            published = stats.published,
            skipped = stats.skipped,
            failed = stats.failed,
            "Location publisher stopped"
        );
        stats
    }

    fn should_publish(&self, last: Option<LatLng>, sample: &LocationSample) -> bool {
        match last {
            None => true,
            Some(prev) => {
                displacement_meters(prev, sample.point) >= self.config.min_displacement_meters
            }
        }
    }
}

/// Handle to a running publisher.
///
/// [`PublisherHandle::stop`] ends the task and waits for it. Dropping the
/// handle without stopping aborts the task; either way the background
/// grant is released.
pub struct PublisherHandle {
    walk_id: String,
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<PublisherStats>>,
}

impl PublisherHandle {
    pub fn walk_id(&self) -> &str {
        &self.walk_id
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Stop sampling. Once this returns, no further publish happens.
    pub async fn stop(mut self) -> PublisherStats {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        match self.task.take() {
            Some(task) => match task.await {
                Ok(stats) => stats,
                Err(e) => {
                    tracing::error!(walk_id = %self.walk_id, error = %e, "Location publisher task failed");
                    PublisherStats::default()
                }
            },
            None => PublisherStats::default(),
        }
    }
}

impl Drop for PublisherHandle {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
