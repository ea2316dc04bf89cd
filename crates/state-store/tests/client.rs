// Copyright (c) 2025 Tokenpool Developers.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use bytestring::ByteString;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use googletest::prelude::*;
use test_log::test;

use tokenpool_state_store::{
    InMemoryStateStore, ReadError, StateRecord, StateStore, StateStoreClient, StoreError,
};
use tokenpool_test_util::let_assert;
use tokenpool_types::errors::MaybeRetryableError;
use tokenpool_types::retries::RetryPolicy;
use tokenpool_types::time::MillisSinceEpoch;
use tokenpool_types::Version;

/// Fails the first `failing_gets` reads with a retryable error. The first `lost_creates` creations
/// report every key as existing without storing anything, as if a concurrent creator had won and
/// removed the record right after.
#[derive(Default)]
struct FlakyStore {
    inner: InMemoryStateStore,
    failing_gets: AtomicUsize,
    lost_creates: AtomicUsize,
}

#[async_trait]
impl StateStore for FlakyStore {
    async fn get(
        &self,
        keys: Vec<ByteString>,
    ) -> std::result::Result<HashMap<ByteString, StateRecord>, StoreError> {
        if self
            .failing_gets
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(StoreError::unavailable("connection reset"));
        }
        self.inner.get(keys).await
    }

    async fn create(&self, records: Vec<StateRecord>) -> std::result::Result<Vec<ByteString>, StoreError> {
        if self
            .lost_creates
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
        {
            return Ok(records.into_iter().map(|record| record.key).collect());
        }
        self.inner.create(records).await
    }

    async fn update(&self, records: Vec<StateRecord>) -> std::result::Result<Vec<StateRecord>, StoreError> {
        self.inner.update(records).await
    }

    async fn delete(&self, records: Vec<StateRecord>) -> std::result::Result<Vec<StateRecord>, StoreError> {
        self.inner.delete(records).await
    }
}

fn retry_policy(max_attempts: usize) -> RetryPolicy {
    RetryPolicy::fixed_delay(Duration::from_millis(10), Some(max_attempts))
}

#[test(tokio::test)]
async fn get_or_create_creates_missing_record() -> anyhow::Result<()> {
    let store = Arc::new(InMemoryStateStore::default());
    let client = StateStoreClient::new(Arc::clone(&store));
    let key = ByteString::from_static("pool");

    let record = client
        .get_or_create(
            key.clone(),
            Bytes::from_static(b"initial"),
            MillisSinceEpoch::new(42),
            &retry_policy(3),
        )
        .await?;

    assert_that!(record.version, eq(Version::MIN));
    assert_that!(store.record(&key), some(eq(record)));
    Ok(())
}

#[test(tokio::test)]
async fn get_or_create_keeps_existing_record() -> anyhow::Result<()> {
    let store = Arc::new(InMemoryStateStore::default());
    let client = StateStoreClient::new(Arc::clone(&store));
    let existing = StateRecord::new(
        "pool",
        Bytes::from_static(b"existing"),
        Version::from(9),
        MillisSinceEpoch::new(1),
    );
    store.put(existing.clone());

    let record = client
        .get_or_create(
            existing.key.clone(),
            Bytes::from_static(b"initial"),
            MillisSinceEpoch::new(42),
            &retry_policy(3),
        )
        .await?;

    assert_that!(record, eq(existing));
    Ok(())
}

#[test(tokio::test(start_paused = true))]
async fn get_or_create_retries_transient_errors() -> anyhow::Result<()> {
    let store = FlakyStore::default();
    store.failing_gets.store(2, Ordering::Release);
    let client = StateStoreClient::new(store);

    let record = client
        .get_or_create(
            ByteString::from_static("pool"),
            Bytes::from_static(b"initial"),
            MillisSinceEpoch::new(42),
            &retry_policy(3),
        )
        .await?;

    assert_that!(record.value, eq(Bytes::from_static(b"initial")));
    Ok(())
}

#[test(tokio::test(start_paused = true))]
async fn get_or_create_gives_up_after_retries() {
    let store = FlakyStore::default();
    store.failing_gets.store(10, Ordering::Release);
    let client = StateStoreClient::new(store);

    let result = client
        .get_or_create(
            ByteString::from_static("pool"),
            Bytes::from_static(b"initial"),
            MillisSinceEpoch::new(42),
            &retry_policy(2),
        )
        .await;

    let_assert!(Err(ReadError::Store(StoreError::Unavailable(_))) = result);
}

#[test(tokio::test(start_paused = true))]
async fn get_or_create_retries_when_record_vanishes_after_lost_creation() -> anyhow::Result<()> {
    let store = FlakyStore::default();
    store.lost_creates.store(1, Ordering::Release);
    let client = StateStoreClient::new(store);

    let record = client
        .get_or_create(
            ByteString::from_static("pool"),
            Bytes::from_static(b"initial"),
            MillisSinceEpoch::new(42),
            &retry_policy(3),
        )
        .await?;

    assert_that!(record.version, eq(Version::MIN));
    assert_that!(record.value, eq(Bytes::from_static(b"initial")));
    Ok(())
}

#[test(tokio::test)]
async fn get_or_create_reports_vanished_record_without_retries() {
    let store = FlakyStore::default();
    store.lost_creates.store(1, Ordering::Release);
    let client = StateStoreClient::new(store);

    let result = client
        .get_or_create(
            ByteString::from_static("pool"),
            Bytes::from_static(b"initial"),
            MillisSinceEpoch::new(42),
            &RetryPolicy::None,
        )
        .await;

    let_assert!(Err(err @ ReadError::RemovedConcurrently(_)) = result);
    assert!(err.retryable());
}

#[test(tokio::test(flavor = "multi_thread", worker_threads = 2))]
async fn concurrent_get_or_create_agrees_on_one_record() -> anyhow::Result<()> {
    let client = StateStoreClient::new_in_memory();
    let key = ByteString::from_static("pool");

    let mut concurrent_loads = FuturesUnordered::new();
    for i in 0..10u8 {
        let client = client.clone();
        let key = key.clone();
        concurrent_loads.push(async move {
            client
                .get_or_create(
                    key,
                    Bytes::from(vec![i]),
                    MillisSinceEpoch::new(u64::from(i)),
                    &retry_policy(10),
                )
                .await
        });
    }

    let mut records = Vec::new();
    while let Some(record) = concurrent_loads.next().await {
        records.push(record?);
    }

    let stored = client.get_one(key).await?;
    let_assert!(Some(stored) = stored);
    assert_that!(stored.version, eq(Version::MIN));
    assert_that!(records, each(eq(stored)));

    Ok(())
}
