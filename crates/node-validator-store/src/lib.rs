// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

pub mod auth;
pub mod backend;
pub mod backend_gcs;
pub mod cache;
#[cfg(any(test, feature = "test-support"))]
pub mod fake;
pub mod whitelist;

pub const CRATE_NAME: &str = "node-validator-store";

pub use auth::{Anonymous, MetadataServerToken, StaticToken, TokenSource};
pub use backend::{ObjectAttrs, ObjectStore, StoreError, StoreErrorCode};
pub use backend_gcs::GcsObjectStore;
pub use cache::{cache_key, ObjectCache};
#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeObjectStore;
pub use whitelist::{CloudStorageWhitelistProvider, MAX_OBJECT_BYTES};
