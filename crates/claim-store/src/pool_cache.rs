// Copyright (c) 2025 Tokenpool Developers.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use tokenpool_types::identifiers::{PoolKey, StateRef};

/// Index of the unclaimed tokens of every pool, from which claims are selected.
#[derive(Debug, Default, Clone)]
pub struct PoolCache {
    pools: Arc<DashMap<PoolKey, Arc<PoolTokenCache>>>,
}

impl PoolCache {
    /// Returns the cache slice of the given pool, creating an empty one if missing.
    pub fn get(&self, pool_key: &PoolKey) -> Arc<PoolTokenCache> {
        if let Some(cache) = self.pools.get(pool_key) {
            return Arc::clone(cache.value());
        }

        Arc::clone(self.pools.entry(pool_key.clone()).or_default().value())
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}

/// Available tokens of a single pool.
///
/// A miss is always safe: an invalidated cache is refilled from the authoritative state by the
/// token selection.
#[derive(Debug, Default)]
pub struct PoolTokenCache {
    tokens: Mutex<BTreeMap<StateRef, u64>>,
    invalidations: AtomicU64,
}

impl PoolTokenCache {
    pub fn add(&self, state_ref: StateRef, amount: u64) {
        self.tokens.lock().insert(state_ref, amount);
    }

    pub fn remove(&self, state_ref: &StateRef) -> Option<u64> {
        self.tokens.lock().remove(state_ref)
    }

    pub fn get(&self, state_ref: &StateRef) -> Option<u64> {
        self.tokens.lock().get(state_ref).copied()
    }

    /// Drops all cached tokens. Idempotent.
    pub fn remove_all(&self) {
        self.tokens.lock().clear();
        self.invalidations.fetch_add(1, Ordering::AcqRel);
    }

    pub fn len(&self) -> usize {
        self.tokens.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.lock().is_empty()
    }

    pub fn total_units(&self) -> u64 {
        self.tokens
            .lock()
            .values()
            .fold(0u64, |total, amount| total.saturating_add(*amount))
    }

    /// Number of times [`Self::remove_all`] was called.
    pub fn invalidations(&self) -> u64 {
        self.invalidations.load(Ordering::Acquire)
    }
}
