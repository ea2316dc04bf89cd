// Copyright (c) 2025 Tokenpool Developers.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use tokenpool_types::errors::GenericError;
use tokenpool_types::identifiers::PoolKey;
use tokenpool_types::pool_state::PoolState;

use crate::pool_cache::PoolTokenCache;
use crate::request::{QueuedRequest, RequestCompletion, RequestQueue};
use crate::stored_state::StoredPoolState;
use crate::RequestError;

/// State shared between the [`ClaimStateStore`] handles and the drain worker of one pool.
pub(crate) struct Shared {
    pub(crate) key: PoolKey,
    pub(crate) queue: Mutex<RequestQueue>,
    /// Coalescing drain trigger. A notification without a waiting worker leaves a single permit.
    pub(crate) trigger: Notify,
    pub(crate) draining: AtomicBool,
    /// Only written by the drain worker.
    pub(crate) stored: Mutex<StoredPoolState>,
    pub(crate) token_cache: Arc<PoolTokenCache>,
}

/// Serializes the mutations of a single pool into batches which are committed to the state store
/// by a dedicated drain worker.
///
/// Handles are cheap to clone. All handles of a pool share the same queue and worker.
#[derive(Clone)]
pub struct ClaimStateStore {
    shared: Arc<Shared>,
}

impl ClaimStateStore {
    pub(crate) fn new(stored: StoredPoolState, token_cache: Arc<PoolTokenCache>) -> Self {
        Self {
            shared: Arc::new(Shared {
                key: stored.key.clone(),
                queue: Mutex::new(RequestQueue::default()),
                trigger: Notify::new(),
                draining: AtomicBool::new(false),
                stored: Mutex::new(stored),
                token_cache,
            }),
        }
    }

    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    pub fn pool_key(&self) -> &PoolKey {
        &self.shared.key
    }

    /// Queues the mutation and triggers the drain worker. Never blocks.
    ///
    /// The mutation is applied exactly once to the pool state, after all mutations enqueued
    /// before it. Its effect becomes visible once the returned future resolved to `Ok(true)`.
    pub fn enqueue_request<F, E>(&self, mutation: F) -> RequestCompletion
    where
        F: FnOnce(&PoolState) -> Result<PoolState, E> + Send + 'static,
        E: Into<GenericError>,
    {
        let (request, completion) = QueuedRequest::new(Box::new(move |state: &PoolState| {
            mutation(state).map_err(|err| -> GenericError { err.into() })
        }));

        let pushed = self.shared.queue.lock().push(request);
        match pushed {
            Ok(()) => self.shared.trigger.notify_one(),
            Err(request) => request.reject(RequestError::Shutdown),
        }

        completion
    }

    /// Copy of the last known authoritative state of the pool.
    pub fn snapshot(&self) -> StoredPoolState {
        self.shared.stored.lock().clone()
    }

    /// Whether the drain worker is currently processing a batch.
    pub fn is_draining(&self) -> bool {
        self.shared.draining.load(Ordering::Acquire)
    }

    pub fn queued_requests(&self) -> usize {
        self.shared.queue.lock().len()
    }

    /// Cache slice of this pool, invalidated whenever a batch is rolled back.
    pub fn token_cache(&self) -> &Arc<PoolTokenCache> {
        &self.shared.token_cache
    }
}

impl fmt::Debug for ClaimStateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClaimStateStore")
            .field("pool_key", &self.shared.key)
            .field("db_version", &self.shared.stored.lock().db_version)
            .field("draining", &self.is_draining())
            .finish()
    }
}
