// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper backing the tracking channel.
//!
//! Layout, one parent document per walk:
//! - `tracking/{walkId}/latest/latest` (Position)
//! - `tracking/{walkId}/meta/meta` (Meta)

use crate::db::collections;
use crate::error::{AppError, Result};
use crate::models::{TrackingMeta, TrackingPosition};
use crate::services::tracking::{meta_key, position_key, Subscription, TrackingStore};
use async_trait::async_trait;
use firestore::{FirestoreListenEvent, FirestoreListenerTarget, FirestoreMemListenStateStorage};
use futures_util::stream::{self, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

/// Each subscription owns its listener, so a single target id suffices.
const LISTENER_TARGET_ID: u32 = 1;

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All operations return an error, and subscriptions fail to establish.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    fn parent_path(
        client: &firestore::FirestoreDb,
        walk_id: &str,
    ) -> Result<firestore::ParentPathBuilder> {
        client
            .parent_path(collections::TRACKING, walk_id)
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Overwrite the single document `{col}/{col}` under the walk's parent.
    async fn write_record<T>(&self, walk_id: &str, col: &str, record: &T) -> Result<()>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
    {
        let client = self.get_client()?;
        let parent = Self::parent_path(client, walk_id)?;

        let _: T = client
            .fluent()
            .update()
            .in_col(col)
            .document_id(col)
            .parent(&parent)
            .object(record)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn read_record<T>(&self, walk_id: &str, col: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        let client = self.get_client()?;
        let parent = Self::parent_path(client, walk_id)?;

        client
            .fluent()
            .select()
            .by_id_in(col)
            .parent(&parent)
            .obj()
            .one(col)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Listen to one tracking document.
    ///
    /// The current value (or `fallback` when the document is absent) is
    /// delivered first, then every change pushed by the listener.
    async fn listen_record<T>(
        &self,
        walk_id: &str,
        col: &'static str,
        key: String,
        fallback: Option<T>,
    ) -> Result<Subscription<T>>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        let client = self.get_client()?.clone();
        let parent = Self::parent_path(&client, walk_id)?;
        let (tx, rx) = mpsc::unbounded_channel::<Result<T>>();

        let current: Option<T> = self.read_record(walk_id, col).await?;
        if let Some(value) = current.or(fallback) {
            let _ = tx.send(Ok(value));
        }

        let mut listener = client
            .create_listener(FirestoreMemListenStateStorage::new())
            .await
            .map_err(|e| AppError::Stream(format!("Failed to create listener: {}", e)))?;

        client
            .fluent()
            .select()
            .by_id_in(col)
            .parent(&parent)
            .batch_listen([col])
            .add_target(FirestoreListenerTarget::new(LISTENER_TARGET_ID), &mut listener)
            .map_err(|e| AppError::Stream(format!("Failed to add listen target: {}", e)))?;

        let event_tx = tx.clone();
        listener
            .start(move |event| {
                let tx = event_tx.clone();
                async move {
                    if let FirestoreListenEvent::DocumentChange(ref change) = event {
                        if let Some(doc) = &change.document {
                            let item = firestore::FirestoreDb::deserialize_doc_to::<T>(doc)
                                .map_err(|e| AppError::Stream(e.to_string()));
                            let _ = tx.send(item);
                        }
                    }
                    Ok::<(), Box<dyn std::error::Error + Send + Sync>>(())
                }
            })
            .await
            .map_err(|e| AppError::Stream(format!("Failed to start listener: {}", e)))?;
        drop(tx);

        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        let listener_key = key.clone();
        tokio::spawn(async move {
            // Resolves on explicit unsubscribe and on drop of the subscription.
            let _ = cancel_rx.await;
            if let Err(e) = listener.shutdown().await {
                tracing::warn!(key = %listener_key, error = %e, "Listener shutdown failed");
            }
        });

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed();

        tracing::debug!(key = %key, "Firestore listener started");
        Ok(Subscription::new(key, stream, Some(cancel_tx)))
    }
}

#[async_trait]
impl TrackingStore for FirestoreDb {
    async fn write_position(&self, walk_id: &str, position: &TrackingPosition) -> Result<()> {
        self.write_record(walk_id, collections::LATEST, position).await
    }

    async fn write_meta(&self, walk_id: &str, meta: &TrackingMeta) -> Result<()> {
        self.write_record(walk_id, collections::META, meta).await
    }

    async fn read_position(&self, walk_id: &str) -> Result<Option<TrackingPosition>> {
        self.read_record(walk_id, collections::LATEST).await
    }

    async fn read_meta(&self, walk_id: &str) -> Result<TrackingMeta> {
        Ok(self
            .read_record(walk_id, collections::META)
            .await?
            .unwrap_or_default())
    }

    async fn watch_position(&self, walk_id: &str) -> Result<Subscription<TrackingPosition>> {
        self.listen_record(walk_id, collections::LATEST, position_key(walk_id), None)
            .await
    }

    async fn watch_meta(&self, walk_id: &str) -> Result<Subscription<TrackingMeta>> {
        self.listen_record(
            walk_id,
            collections::META,
            meta_key(walk_id),
            Some(TrackingMeta::default()),
        )
        .await
    }
}
