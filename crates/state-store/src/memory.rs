// Copyright (c) 2025 Tokenpool Developers.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytestring::ByteString;
use parking_lot::Mutex;

use tokenpool_types::Version;

use crate::{StateRecord, StateStore, StoreError};

/// In-memory [`StateStore`] with fault injection for tests.
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    records: Mutex<HashMap<ByteString, StateRecord>>,
    update_delay: Mutex<Option<Duration>>,
    failing_gets: AtomicUsize,
    failing_updates: AtomicUsize,
    update_calls: AtomicUsize,
    updates_in_flight: AtomicUsize,
    max_concurrent_updates: AtomicUsize,
}

impl InMemoryStateStore {
    /// Overwrites the record unconditionally, keeping its version. Simulates a writer outside of
    /// this process.
    pub fn put(&self, record: StateRecord) {
        self.records.lock().insert(record.key.clone(), record);
    }

    pub fn record(&self, key: &ByteString) -> Option<StateRecord> {
        self.records.lock().get(key).cloned()
    }

    /// The next `count` calls to [`StateStore::get`] fail with [`StoreError::Unavailable`].
    pub fn fail_next_gets(&self, count: usize) {
        self.failing_gets.store(count, Ordering::Release);
    }

    /// The next `count` calls to [`StateStore::update`] fail with [`StoreError::Unavailable`].
    pub fn fail_next_updates(&self, count: usize) {
        self.failing_updates.store(count, Ordering::Release);
    }

    /// Delays every subsequent [`StateStore::update`] by `delay`.
    pub fn set_update_delay(&self, delay: Option<Duration>) {
        *self.update_delay.lock() = delay;
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::Acquire)
    }

    /// Highest number of [`StateStore::update`] calls observed running at the same time.
    pub fn max_concurrent_updates(&self) -> usize {
        self.max_concurrent_updates.load(Ordering::Acquire)
    }

    fn apply_update(&self, records: Vec<StateRecord>) -> Result<Vec<StateRecord>, StoreError> {
        let mut stored = self.records.lock();

        let mut mismatches = Vec::new();
        for record in &records {
            match stored.get(&record.key) {
                None => return Err(StoreError::NotFound(record.key.clone())),
                Some(current) if current.version != record.version => {
                    mismatches.push(current.clone())
                }
                Some(_) => {}
            }
        }

        if mismatches.is_empty() {
            for mut record in records {
                record.version = record.version.next();
                stored.insert(record.key.clone(), record);
            }
        }

        Ok(mismatches)
    }
}

/// Tracks running updates, including those dropped by a caller's timeout.
struct InFlightGuard<'a>(&'a InMemoryStateStore);

impl<'a> InFlightGuard<'a> {
    fn enter(store: &'a InMemoryStateStore) -> Self {
        let in_flight = store.updates_in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        store
            .max_concurrent_updates
            .fetch_max(in_flight, Ordering::AcqRel);
        Self(store)
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.updates_in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn get(
        &self,
        keys: Vec<ByteString>,
    ) -> Result<HashMap<ByteString, StateRecord>, StoreError> {
        if self
            .failing_gets
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(StoreError::unavailable("injected get failure"));
        }

        let stored = self.records.lock();
        Ok(keys
            .into_iter()
            .filter_map(|key| stored.get(&key).cloned().map(|record| (key, record)))
            .collect())
    }

    async fn create(&self, records: Vec<StateRecord>) -> Result<Vec<ByteString>, StoreError> {
        let mut stored = self.records.lock();
        let mut existing = Vec::new();

        for mut record in records {
            if stored.contains_key(&record.key) {
                existing.push(record.key);
            } else {
                record.version = Version::MIN;
                stored.insert(record.key.clone(), record);
            }
        }

        Ok(existing)
    }

    async fn update(&self, records: Vec<StateRecord>) -> Result<Vec<StateRecord>, StoreError> {
        self.update_calls.fetch_add(1, Ordering::AcqRel);
        let _in_flight = InFlightGuard::enter(self);

        let delay = *self.update_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let result = if self
            .failing_updates
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
        {
            Err(StoreError::unavailable("injected update failure"))
        } else {
            self.apply_update(records)
        };

        result
    }

    async fn delete(&self, records: Vec<StateRecord>) -> Result<Vec<StateRecord>, StoreError> {
        let mut stored = self.records.lock();

        let mismatches: Vec<_> = records
            .iter()
            .filter_map(|record| {
                stored
                    .get(&record.key)
                    .filter(|current| current.version != record.version)
                    .cloned()
            })
            .collect();

        if mismatches.is_empty() {
            for record in records {
                stored.remove(&record.key);
            }
        }

        Ok(mismatches)
    }
}
