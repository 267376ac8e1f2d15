// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Tracking record stores (Firestore and in-memory).

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryTrackingStore;

/// Collection names as constants.
pub mod collections {
    /// Parent collection, one document per walk id
    pub const TRACKING: &str = "tracking";
    /// Position sub-collection (single `latest` document)
    pub const LATEST: &str = "latest";
    /// Meta sub-collection (single `meta` document)
    pub const META: &str = "meta";
}
