// Copyright (c) 2025 Tokenpool Developers.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use bytestring::ByteString;
use metrics::{counter, histogram};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use tokenpool_clock::{Clock, SharedClock};
use tokenpool_state_store::{StateRecord, StateStoreClient};
use tokenpool_types::config::ClaimStoreOptions;
use tokenpool_types::pool_state::PoolState;
use tokenpool_types::storage::StorageCodec;

use crate::metric_definitions::{
    CLAIM_STORE_BATCH_SIZE, CLAIM_STORE_BATCH_TOTAL, CLAIM_STORE_CACHE_INVALIDATION_TOTAL,
    CLAIM_STORE_COMMIT_DURATION, CLAIM_STORE_COMMIT_TOTAL, CLAIM_STORE_MUTATION_FAILED_TOTAL,
    OUTCOME_COMMITTED, OUTCOME_CONFLICT, OUTCOME_STORE_FAILURE,
};
use crate::request::QueuedRequest;
use crate::store::{ClaimStateStore, Shared};
use crate::stored_state::StoredPoolState;

enum CommitOutcome {
    Committed(StoredPoolState),
    /// The store rejected the batch and returned its authoritative state.
    Conflict(StoredPoolState),
    /// The outcome of the batch is unknown; carries the pre-batch state with an unknown version.
    StoreFailure(StoredPoolState),
}

impl CommitOutcome {
    fn label(&self) -> &'static str {
        match self {
            CommitOutcome::Committed(_) => OUTCOME_COMMITTED,
            CommitOutcome::Conflict(_) => OUTCOME_CONFLICT,
            CommitOutcome::StoreFailure(_) => OUTCOME_STORE_FAILURE,
        }
    }
}

/// The single writer of a pool. Drains the request queue whenever triggered until it is
/// empty, then waits for the next trigger.
pub(crate) struct DrainWorker {
    shared: Arc<Shared>,
    record_key: ByteString,
    client: StateStoreClient,
    clock: SharedClock,
    commit_timeout: Duration,
    max_batch_size: usize,
    cancellation: CancellationToken,
}

impl DrainWorker {
    pub(crate) fn new(
        store: &ClaimStateStore,
        client: StateStoreClient,
        clock: SharedClock,
        options: &ClaimStoreOptions,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            shared: Arc::clone(store.shared()),
            record_key: store.pool_key().to_record_key(),
            client,
            clock,
            commit_timeout: options.commit_timeout(),
            max_batch_size: options.max_batch_size(),
            cancellation,
        }
    }

    pub(crate) async fn run(self) {
        debug!("Running drain worker");

        loop {
            tokio::select! {
                biased;
                _ = self.cancellation.cancelled() => {
                    break;
                },
                _ = self.shared.trigger.notified() => {
                    self.drain().await;
                }
            }
        }

        // requests queued so far are still committed, later ones are rejected
        self.shared.queue.lock().close();
        self.drain().await;

        debug!("Stopped drain worker");
    }

    async fn drain(&self) {
        let was_draining = self.shared.draining.swap(true, Ordering::AcqRel);
        debug_assert!(!was_draining, "only a single drain may run per pool");

        loop {
            let batch = self.shared.queue.lock().take_batch(self.max_batch_size);
            if batch.is_empty() {
                break;
            }

            self.process_batch(batch).await;
        }

        self.shared.draining.store(false, Ordering::Release);
    }

    async fn process_batch(&self, batch: Vec<QueuedRequest>) {
        counter!(CLAIM_STORE_BATCH_TOTAL).increment(1);
        histogram!(CLAIM_STORE_BATCH_SIZE).record(batch.len() as f64);

        let pre_batch = self.shared.stored.lock().clone();
        let batch_size = batch.len();

        let mut candidate = pre_batch.state.clone();
        let mut pending = Vec::with_capacity(batch_size);
        for request in batch {
            if let Some((next_state, completion)) = request.apply(&candidate) {
                candidate = next_state;
                pending.push(completion);
            } else {
                counter!(CLAIM_STORE_MUTATION_FAILED_TOTAL).increment(1);
            }
        }

        if pending.is_empty() {
            trace!("All {batch_size} mutations of the batch failed; committing unchanged state");
        }

        let start_time = Instant::now();
        let outcome = self.commit(&pre_batch, candidate).await;
        histogram!(CLAIM_STORE_COMMIT_DURATION).record(start_time.elapsed());
        counter!(CLAIM_STORE_COMMIT_TOTAL, "outcome" => outcome.label()).increment(1);

        let (committed, stored) = match outcome {
            CommitOutcome::Committed(stored) => {
                trace!(
                    "Committed batch of {} requests at {}",
                    pending.len(),
                    stored.db_version
                );
                (true, stored)
            }
            CommitOutcome::Conflict(stored) | CommitOutcome::StoreFailure(stored) => {
                // no claim may be served from the stale cache once the rollback is visible
                self.shared.token_cache.remove_all();
                counter!(CLAIM_STORE_CACHE_INVALIDATION_TOTAL).increment(1);
                (false, stored)
            }
        };

        *self.shared.stored.lock() = stored;

        for completion in pending {
            completion.resolve(committed);
        }
    }

    async fn commit(&self, pre_batch: &StoredPoolState, candidate: PoolState) -> CommitOutcome {
        let value = match StorageCodec::encode_to_bytes(&candidate) {
            Ok(value) => value,
            Err(err) => {
                warn!("Failed encoding the pool state; rolling back batch: {err}");
                return CommitOutcome::StoreFailure(pre_batch.clone().into_unknown_version());
            }
        };

        let record = StateRecord::new(
            self.record_key.clone(),
            value,
            pre_batch.db_version,
            self.clock.now(),
        );

        let result = tokio::time::timeout(self.commit_timeout, self.client.update(vec![record]))
            .await
            .map_err(|_| {
                format!(
                    "update did not complete within '{}'",
                    humantime::format_duration(self.commit_timeout)
                )
            })
            .and_then(|result| result.map_err(|err| err.to_string()));

        let mismatches = match result {
            Ok(mismatches) => mismatches,
            Err(err) => {
                warn!(
                    "Failed committing batch at {}; rolling back: {err}",
                    pre_batch.db_version
                );
                return CommitOutcome::StoreFailure(pre_batch.clone().into_unknown_version());
            }
        };

        let Some(authoritative) = mismatches
            .into_iter()
            .find(|record| record.key == self.record_key)
        else {
            return CommitOutcome::Committed(StoredPoolState::new(
                pre_batch.db_version.next(),
                pre_batch.key.clone(),
                candidate,
            ));
        };

        match StoredPoolState::from_record(pre_batch.key.clone(), &authoritative) {
            Ok(stored) => {
                warn!(
                    "Version conflict: expected {} but store holds {}; rolling back batch",
                    pre_batch.db_version, stored.db_version
                );
                CommitOutcome::Conflict(stored)
            }
            Err(err) => {
                warn!(
                    "Failed decoding the conflicting state at {}; rolling back batch: {err}",
                    authoritative.version
                );
                CommitOutcome::StoreFailure(pre_batch.clone().into_unknown_version())
            }
        }
    }
}
