// Copyright (c) 2025 Tokenpool Developers.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use bytestring::ByteString;
use metrics::{counter, histogram};
use tokio::time::Instant;
use tracing::debug;

use tokenpool_types::errors::MaybeRetryableError;
use tokenpool_types::retries::RetryPolicy;
use tokenpool_types::time::MillisSinceEpoch;
use tokenpool_types::Version;

use crate::metric_definitions::{
    STATE_STORE_CLIENT_CREATE_DURATION, STATE_STORE_CLIENT_CREATE_TOTAL,
    STATE_STORE_CLIENT_DELETE_DURATION, STATE_STORE_CLIENT_DELETE_TOTAL,
    STATE_STORE_CLIENT_GET_DURATION, STATE_STORE_CLIENT_GET_TOTAL,
    STATE_STORE_CLIENT_UPDATE_DURATION, STATE_STORE_CLIENT_UPDATE_TOTAL, STATUS_COMPLETED,
    STATUS_FAILED,
};
use crate::{StateRecord, StateStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("record '{0}' was removed while being created")]
    RemovedConcurrently(ByteString),
}

impl MaybeRetryableError for ReadError {
    fn retryable(&self) -> bool {
        match self {
            ReadError::Store(err) => err.retryable(),
            ReadError::RemovedConcurrently(_) => true,
        }
    }
}

/// Client of a [`StateStore`] which records call metrics.
#[derive(Clone)]
pub struct StateStoreClient {
    inner: Arc<dyn StateStore + Send + Sync>,
}

impl StateStoreClient {
    pub fn new<S>(state_store: S) -> Self
    where
        S: StateStore + Send + Sync + 'static,
    {
        crate::metric_definitions::describe_metrics();

        Self {
            inner: Arc::new(state_store),
        }
    }

    #[cfg(any(test, feature = "test-util"))]
    pub fn new_in_memory() -> Self {
        StateStoreClient::new(crate::InMemoryStateStore::default())
    }

    pub async fn get(
        &self,
        keys: Vec<ByteString>,
    ) -> Result<HashMap<ByteString, StateRecord>, StoreError> {
        let start_time = Instant::now();
        let result = self.inner.get(keys).await;

        histogram!(STATE_STORE_CLIENT_GET_DURATION).record(start_time.elapsed());
        counter!(STATE_STORE_CLIENT_GET_TOTAL, "status" => status(&result)).increment(1);

        result
    }

    /// Gets the record stored under a single key.
    pub async fn get_one(&self, key: ByteString) -> Result<Option<StateRecord>, StoreError> {
        let mut records = self.get(vec![key.clone()]).await?;
        Ok(records.remove(&key))
    }

    pub async fn create(&self, records: Vec<StateRecord>) -> Result<Vec<ByteString>, StoreError> {
        let start_time = Instant::now();
        let result = self.inner.create(records).await;

        histogram!(STATE_STORE_CLIENT_CREATE_DURATION).record(start_time.elapsed());
        counter!(STATE_STORE_CLIENT_CREATE_TOTAL, "status" => status(&result)).increment(1);

        result
    }

    /// Conditionally updates the given records. See [`StateStore::update`].
    pub async fn update(&self, records: Vec<StateRecord>) -> Result<Vec<StateRecord>, StoreError> {
        let start_time = Instant::now();
        let result = self.inner.update(records).await;

        histogram!(STATE_STORE_CLIENT_UPDATE_DURATION).record(start_time.elapsed());
        counter!(STATE_STORE_CLIENT_UPDATE_TOTAL, "status" => status(&result)).increment(1);

        result
    }

    pub async fn delete(&self, records: Vec<StateRecord>) -> Result<Vec<StateRecord>, StoreError> {
        let start_time = Instant::now();
        let result = self.inner.delete(records).await;

        histogram!(STATE_STORE_CLIENT_DELETE_DURATION).record(start_time.elapsed());
        counter!(STATE_STORE_CLIENT_DELETE_TOTAL, "status" => status(&result)).increment(1);

        result
    }

    /// Gets the record under the specified key or creates it with the given initial value.
    ///
    /// This method won't overwrite an existing record. Retryable store errors and lost creation
    /// races are retried following the given retry policy.
    pub async fn get_or_create(
        &self,
        key: ByteString,
        initial_value: Bytes,
        modified_time: MillisSinceEpoch,
        retry_policy: &RetryPolicy,
    ) -> Result<StateRecord, ReadError> {
        retry_policy
            .clone()
            .retry_if(
                || self.try_get_or_create(&key, &initial_value, modified_time),
                |err: &ReadError| {
                    let retryable = err.retryable();
                    if retryable {
                        debug!("Failed loading record '{key}': {err}; retrying");
                    }
                    retryable
                },
            )
            .await
    }

    async fn try_get_or_create(
        &self,
        key: &ByteString,
        initial_value: &Bytes,
        modified_time: MillisSinceEpoch,
    ) -> Result<StateRecord, ReadError> {
        if let Some(record) = self.get_one(key.clone()).await? {
            return Ok(record);
        }

        let record = StateRecord::new(
            key.clone(),
            initial_value.clone(),
            Version::MIN,
            modified_time,
        );

        let existing = self.create(vec![record.clone()]).await?;
        if existing.is_empty() {
            debug!("Created record '{key}' at {}", Version::MIN);
            return Ok(record);
        }

        // somebody else created it in the meantime
        self.get_one(key.clone())
            .await?
            .ok_or_else(|| ReadError::RemovedConcurrently(key.clone()))
    }
}

fn status<T>(result: &Result<T, StoreError>) -> &'static str {
    if result.is_ok() {
        STATUS_COMPLETED
    } else {
        STATUS_FAILED
    }
}
