// Copyright (c) 2025 Tokenpool Developers.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0

mod client;
#[cfg(any(test, feature = "test-util"))]
mod memory;
pub mod metric_definitions;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use bytestring::ByteString;

use tokenpool_types::errors::{GenericError, MaybeRetryableError};
use tokenpool_types::time::MillisSinceEpoch;
use tokenpool_types::{Version, Versioned};

pub use client::{ReadError, StateStoreClient};
#[cfg(any(test, feature = "test-util"))]
pub use memory::InMemoryStateStore;

/// A versioned record of the state store.
///
/// When passed to [`StateStore::update`] or [`StateStore::delete`], `version` is the version the
/// caller expects to be stored. Records returned by the store carry the stored version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateRecord {
    pub key: ByteString,
    pub value: Bytes,
    pub version: Version,
    pub modified_time: MillisSinceEpoch,
}

impl StateRecord {
    pub fn new(
        key: impl Into<ByteString>,
        value: Bytes,
        version: Version,
        modified_time: MillisSinceEpoch,
    ) -> Self {
        Self {
            key: key.into(),
            value,
            version,
            modified_time,
        }
    }
}

impl Versioned for StateRecord {
    fn version(&self) -> Version {
        self.version
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("state store unavailable: {0}")]
    Unavailable(GenericError),
    #[error("record '{0}' does not exist")]
    NotFound(ByteString),
    #[error("internal error: {0}")]
    Internal(String),
}

impl StoreError {
    pub fn unavailable(err: impl Into<GenericError>) -> Self {
        StoreError::Unavailable(err.into())
    }
}

impl MaybeRetryableError for StoreError {
    fn retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Versioned key-value store holding the authoritative pool states. Implementations must apply
/// the records of a single call atomically and compare versions linearizably.
#[async_trait]
pub trait StateStore {
    /// Returns the stored records for the given keys. Keys without a record are absent from the
    /// result.
    async fn get(
        &self,
        keys: Vec<ByteString>,
    ) -> Result<HashMap<ByteString, StateRecord>, StoreError>;

    /// Stores the given records at [`Version::MIN`] unless a record with the same key exists.
    /// Returns the keys which already existed; those records are left untouched.
    async fn create(&self, records: Vec<StateRecord>) -> Result<Vec<ByteString>, StoreError>;

    /// Conditionally replaces the stored records. Each record is stored at `version.next()` if the
    /// stored version equals `version`. Otherwise nothing is written and the authoritative records
    /// of all mismatching keys are returned. An empty result means every record was written.
    async fn update(&self, records: Vec<StateRecord>) -> Result<Vec<StateRecord>, StoreError>;

    /// Conditionally deletes the stored records. Returns the authoritative records of all keys
    /// whose version did not match, in which case nothing is deleted. Missing keys are ignored.
    async fn delete(&self, records: Vec<StateRecord>) -> Result<Vec<StateRecord>, StoreError>;
}

#[async_trait]
impl<T: StateStore + Send + Sync + ?Sized> StateStore for Arc<T> {
    async fn get(
        &self,
        keys: Vec<ByteString>,
    ) -> Result<HashMap<ByteString, StateRecord>, StoreError> {
        (**self).get(keys).await
    }

    async fn create(&self, records: Vec<StateRecord>) -> Result<Vec<ByteString>, StoreError> {
        (**self).create(records).await
    }

    async fn update(&self, records: Vec<StateRecord>) -> Result<Vec<StateRecord>, StoreError> {
        (**self).update(records).await
    }

    async fn delete(&self, records: Vec<StateRecord>) -> Result<Vec<StateRecord>, StoreError> {
        (**self).delete(records).await
    }
}
