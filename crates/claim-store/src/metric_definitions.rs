// Copyright (c) 2025 Tokenpool Developers.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0

/// Optional to have but adds description/help message to the metrics emitted to
/// the metrics' sink.
use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

// values of label `outcome` in CLAIM_STORE_COMMIT_TOTAL
pub const OUTCOME_COMMITTED: &str = "committed";
pub const OUTCOME_CONFLICT: &str = "conflict";
pub const OUTCOME_STORE_FAILURE: &str = "store_failure";

pub(crate) const CLAIM_STORE_BATCH_TOTAL: &str = "tokenpool.claim_store.batch.total";
pub(crate) const CLAIM_STORE_BATCH_SIZE: &str = "tokenpool.claim_store.batch_size";
pub(crate) const CLAIM_STORE_COMMIT_TOTAL: &str = "tokenpool.claim_store.commit.total";
pub(crate) const CLAIM_STORE_COMMIT_DURATION: &str =
    "tokenpool.claim_store.commit_duration.seconds";
pub(crate) const CLAIM_STORE_MUTATION_FAILED_TOTAL: &str =
    "tokenpool.claim_store.mutation_failed.total";
pub(crate) const CLAIM_STORE_CACHE_INVALIDATION_TOTAL: &str =
    "tokenpool.claim_store.cache_invalidation.total";
pub(crate) const CLAIM_STORE_LOADED_STORES: &str = "tokenpool.claim_store.loaded_stores";

pub fn describe_metrics() {
    describe_counter!(
        CLAIM_STORE_BATCH_TOTAL,
        Unit::Count,
        "Number of drained request batches"
    );

    describe_histogram!(
        CLAIM_STORE_BATCH_SIZE,
        Unit::Count,
        "Number of requests per drained batch"
    );

    describe_counter!(
        CLAIM_STORE_COMMIT_TOTAL,
        Unit::Count,
        "Number of batch commits by outcome"
    );

    describe_histogram!(
        CLAIM_STORE_COMMIT_DURATION,
        Unit::Seconds,
        "Duration of a batch commit against the state store in seconds"
    );

    describe_counter!(
        CLAIM_STORE_MUTATION_FAILED_TOTAL,
        Unit::Count,
        "Number of requests whose mutation failed or panicked"
    );

    describe_counter!(
        CLAIM_STORE_CACHE_INVALIDATION_TOTAL,
        Unit::Count,
        "Number of pool cache invalidations after a rolled back batch"
    );

    describe_gauge!(
        CLAIM_STORE_LOADED_STORES,
        Unit::Count,
        "Number of claim state stores loaded by the registry"
    );
}
