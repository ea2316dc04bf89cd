// Copyright (c) 2025 Tokenpool Developers.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0

use std::sync::Arc;

use dashmap::DashMap;
use metrics::gauge;
use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use tokenpool_clock::{Clock, SharedClock};
use tokenpool_state_store::StateStoreClient;
use tokenpool_types::config::{ClaimStoreOptions, InvalidConfigurationError};
use tokenpool_types::identifiers::PoolKey;
use tokenpool_types::pool_state::PoolState;
use tokenpool_types::storage::StorageCodec;

use crate::drain::DrainWorker;
use crate::metric_definitions::{self, CLAIM_STORE_LOADED_STORES};
use crate::pool_cache::PoolCache;
use crate::store::ClaimStateStore;
use crate::stored_state::StoredPoolState;
use crate::RegistryError;

/// Owns the [`ClaimStateStore`] of every pool. Stores are loaded from the state store on first
/// access and live until [`ClaimStateStoreRegistry::shutdown`].
pub struct ClaimStateStoreRegistry {
    client: StateStoreClient,
    pool_cache: PoolCache,
    clock: SharedClock,
    options: ClaimStoreOptions,
    stores: DashMap<PoolKey, Arc<OnceCell<ClaimStateStore>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    cancellation: CancellationToken,
}

impl ClaimStateStoreRegistry {
    /// Creates an empty registry. Fails if `options` do not pass [`ClaimStoreOptions::validate`].
    pub fn new(
        client: StateStoreClient,
        pool_cache: PoolCache,
        clock: SharedClock,
        options: ClaimStoreOptions,
    ) -> Result<Self, InvalidConfigurationError> {
        options.validate()?;
        metric_definitions::describe_metrics();

        Ok(Self {
            client,
            pool_cache,
            clock,
            options,
            stores: DashMap::default(),
            workers: Mutex::default(),
            cancellation: CancellationToken::new(),
        })
    }

    pub fn pool_cache(&self) -> &PoolCache {
        &self.pool_cache
    }

    /// Returns the store of the given pool if it has been loaded.
    pub fn get(&self, pool_key: &PoolKey) -> Option<ClaimStateStore> {
        self.stores
            .get(pool_key)
            .and_then(|cell| cell.get().cloned())
    }

    /// Returns the store of the given pool, loading its state first if needed. Concurrent callers
    /// for the same pool share a single load. A failed load is retried by the next caller.
    pub async fn get_or_load(&self, pool_key: &PoolKey) -> Result<ClaimStateStore, RegistryError> {
        if self.cancellation.is_cancelled() {
            return Err(RegistryError::Shutdown);
        }

        let cell = Arc::clone(self.stores.entry(pool_key.clone()).or_default().value());

        cell.get_or_try_init(|| self.load(pool_key))
            .await
            .cloned()
    }

    async fn load(&self, pool_key: &PoolKey) -> Result<ClaimStateStore, RegistryError> {
        let initial_value = StorageCodec::encode_to_bytes(PoolState::new(pool_key.clone()))
            .map_err(|source| RegistryError::Encode {
                key: pool_key.clone(),
                source,
            })?;

        let record = self
            .client
            .get_or_create(
                pool_key.to_record_key(),
                initial_value,
                self.clock.now(),
                self.options.load_retry_policy(),
            )
            .await
            .map_err(|source| RegistryError::Load {
                key: pool_key.clone(),
                source,
            })?;

        let stored = StoredPoolState::from_record(pool_key.clone(), &record).map_err(|source| {
            RegistryError::Decode {
                key: pool_key.clone(),
                source,
            }
        })?;

        let mut workers = self.workers.lock();
        if self.cancellation.is_cancelled() {
            return Err(RegistryError::Shutdown);
        }

        debug!("Loaded pool '{pool_key}' at {}", stored.db_version);
        let store = ClaimStateStore::new(stored, self.pool_cache.get(pool_key));
        let worker = DrainWorker::new(
            &store,
            self.client.clone(),
            Arc::clone(&self.clock),
            &self.options,
            self.cancellation.child_token(),
        );
        workers.push(tokio::spawn(
            worker
                .run()
                .instrument(info_span!("claim-state-store", pool_key = %pool_key)),
        ));
        gauge!(CLAIM_STORE_LOADED_STORES).set(workers.len() as f64);

        Ok(store)
    }

    /// Stops all drain workers after they committed the requests queued so far. Afterwards new
    /// requests resolve to [`crate::RequestError::Shutdown`] and no stores can be loaded.
    pub async fn shutdown(&self) {
        let workers = {
            let mut workers = self.workers.lock();
            self.cancellation.cancel();
            std::mem::take(&mut *workers)
        };

        info!("Shutting down {} claim state stores", workers.len());

        for result in futures::future::join_all(workers).await {
            if let Err(err) = result {
                warn!("Drain worker terminated abnormally: {err}");
            }
        }

        gauge!(CLAIM_STORE_LOADED_STORES).set(0.0);
    }
}
