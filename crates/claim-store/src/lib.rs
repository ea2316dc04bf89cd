// Copyright (c) 2025 Tokenpool Developers.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0

//! Optimistic, batched claim state store.
//!
//! Every pool is served by one [`ClaimStateStore`] which queues mutation requests and commits
//! them in batches to the versioned state store. A single drain worker per pool applies the
//! mutations in enqueue order and resolves every request with the outcome of its batch. Rolled
//! back batches invalidate the pool's [`PoolTokenCache`] and resynchronize with the
//! authoritative state.

mod drain;
mod error;
pub mod metric_definitions;
mod pool_cache;
mod registry;
mod request;
mod store;
mod stored_state;

pub use error::{MutationPanic, RegistryError, RequestError};
pub use pool_cache::{PoolCache, PoolTokenCache};
pub use registry::ClaimStateStoreRegistry;
pub use request::RequestCompletion;
pub use store::ClaimStateStore;
pub use stored_state::StoredPoolState;
