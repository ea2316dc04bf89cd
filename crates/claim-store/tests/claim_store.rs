// Copyright (c) 2025 Tokenpool Developers.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use googletest::prelude::*;
use test_log::test;

use tokenpool_claim_store::{
    ClaimStateStore, ClaimStateStoreRegistry, PoolCache, RegistryError, RequestError,
    StoredPoolState,
};
use tokenpool_clock::MockClock;
use tokenpool_state_store::{
    InMemoryStateStore, ReadError, StateRecord, StateStoreClient, StoreError,
};
use tokenpool_test_util::matchers::storage_decoded;
use tokenpool_test_util::{assert_pending, let_assert};
use tokenpool_types::config::{
    ClaimStoreOptions, ClaimStoreOptionsBuilder, InvalidConfigurationError,
};
use tokenpool_types::identifiers::{ClaimId, PoolKey, StateRef};
use tokenpool_types::pool_state::{ClaimedToken, PoolState, PoolStateError, TokenClaim};
use tokenpool_types::retries::RetryPolicy;
use tokenpool_types::storage::StorageCodec;
use tokenpool_types::time::MillisSinceEpoch;
use tokenpool_types::Version;

struct TestEnv {
    state_store: Arc<InMemoryStateStore>,
    clock: Arc<MockClock>,
    registry: ClaimStateStoreRegistry,
}

impl TestEnv {
    fn new() -> Self {
        Self::with_options(ClaimStoreOptions::default())
    }

    fn with_options(options: ClaimStoreOptions) -> Self {
        let state_store = Arc::new(InMemoryStateStore::default());
        let clock = Arc::new(MockClock::with_timestamp(MillisSinceEpoch::new(1_000)));
        let registry = ClaimStateStoreRegistry::new(
            StateStoreClient::new(Arc::clone(&state_store)),
            PoolCache::default(),
            clock.clone(),
            options,
        )
        .expect("options should be valid");

        Self {
            state_store,
            clock,
            registry,
        }
    }

    async fn store(&self) -> ClaimStateStore {
        self.registry
            .get_or_load(&pool_key())
            .await
            .expect("pool state should load")
    }

    fn stored_record(&self) -> StateRecord {
        self.state_store
            .record(&pool_key().to_record_key())
            .expect("pool record should exist")
    }

    /// Overwrites the stored pool state as another process would.
    fn put_external(&self, version: u32, state: &PoolState) {
        self.state_store.put(StateRecord::new(
            pool_key().to_record_key(),
            StorageCodec::encode_to_bytes(state).unwrap(),
            Version::from(version),
            MillisSinceEpoch::new(1),
        ));
    }
}

fn pool_key() -> PoolKey {
    PoolKey::new("holder-a", "fungible", "SHA256-1A2B", "notary-1", "EUR")
}

fn claim(claim_id: &str, tokens: &[(&str, u64)]) -> TokenClaim {
    TokenClaim::new(
        claim_id,
        tokens
            .iter()
            .map(|(state_ref, amount)| ClaimedToken::new(*state_ref, *amount))
            .collect(),
    )
}

fn decode(record: &StateRecord) -> PoolState {
    let mut value: Bytes = record.value.clone();
    StorageCodec::decode(&mut value).unwrap()
}

#[test(tokio::test)]
async fn loads_missing_pool_as_empty_state() -> anyhow::Result<()> {
    let env = TestEnv::new();

    let store = env.store().await;

    assert_that!(
        store.snapshot(),
        eq(StoredPoolState::new(
            Version::MIN,
            pool_key(),
            PoolState::new(pool_key())
        ))
    );
    assert_that!(env.stored_record().version, eq(Version::MIN));
    assert_that!(env.stored_record().modified_time, eq(MillisSinceEpoch::new(1_000)));
    Ok(())
}

#[test(tokio::test)]
async fn loads_existing_pool_state() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let existing = PoolState::new(pool_key()).deposit(42)?;
    env.put_external(3, &existing);

    let store = env.store().await;

    assert_that!(store.snapshot().db_version, eq(Version::from(3)));
    assert_that!(store.snapshot().state, eq(existing));
    Ok(())
}

#[test(tokio::test)]
async fn commits_batch_and_advances_version() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let store = env.store().await;
    env.clock.set(MillisSinceEpoch::new(2_000));

    let first = store.enqueue_request(|state| state.deposit(5));
    let second = store.enqueue_request(|state| state.deposit(7));

    assert_that!(first.await, ok(eq(true)));
    assert_that!(second.await, ok(eq(true)));

    let snapshot = store.snapshot();
    assert_that!(snapshot.db_version, eq(Version::from(2)));
    assert_that!(snapshot.state.available_units(), eq(12));

    let record = env.stored_record();
    assert_that!(record.version, eq(snapshot.db_version));
    assert_that!(record.modified_time, eq(MillisSinceEpoch::new(2_000)));
    assert_that!(decode(&record), eq(snapshot.state));
    assert_that!(env.state_store.update_calls(), eq(1));
    Ok(())
}

#[test(tokio::test)]
async fn applies_mutations_in_enqueue_order() -> anyhow::Result<()> {
    let env = TestEnv::with_options(
        ClaimStoreOptionsBuilder::default()
            .max_batch_size(NonZeroUsize::new(3))
            .build()?,
    );
    let store = env.store().await;

    let mut completions = vec![store.enqueue_request(|state| state.deposit(100))];
    for i in 0..10 {
        completions.push(store.enqueue_request(move |state| {
            let state_ref = format!("tx-{i}:0");
            state.claim(claim(&format!("claim-{i}"), &[(state_ref.as_str(), 10)]))
        }));
    }
    // only succeeds if every claim before it was applied
    completions.push(store.enqueue_request(|state| {
        state.claim(claim("claim-overdraft", &[("tx-x:0", 1)]))
    }));

    let last = completions.pop().unwrap();
    for completion in completions {
        assert_that!(completion.await, ok(eq(true)));
    }
    let_assert!(Err(RequestError::Mutation(err)) = last.await);
    assert_that!(
        err.downcast_ref::<PoolStateError>(),
        some(eq(&PoolStateError::InsufficientUnits {
            requested: 1,
            available: 0
        }))
    );

    let state = store.snapshot().state;
    let claim_ids: Vec<_> = state
        .claims()
        .iter()
        .map(|claim| claim.claim_id.as_str().to_owned())
        .collect();
    let expected: Vec<_> = (0..10).map(|i| format!("claim-{i}")).collect();
    assert_that!(claim_ids, eq(expected));
    assert_that!(state.claimed_units(), eq(100));

    // 12 requests in batches of at most 3
    assert_that!(env.state_store.update_calls(), eq(4));
    assert_that!(env.stored_record().version, eq(Version::from(5)));
    Ok(())
}

#[test(tokio::test)]
async fn failing_mutation_is_isolated() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let store = env.store().await;

    let first = store.enqueue_request(|state| state.deposit(1));
    let second = store.enqueue_request(|state| state.release(&ClaimId::new("unknown")));
    let third = store.enqueue_request(|state| state.deposit(2));

    assert_that!(first.await, ok(eq(true)));
    let_assert!(Err(RequestError::Mutation(err)) = second.await);
    assert_that!(
        err.downcast_ref::<PoolStateError>(),
        some(eq(&PoolStateError::UnknownClaim(ClaimId::new("unknown"))))
    );
    assert_that!(third.await, ok(eq(true)));

    assert_that!(store.snapshot().state.available_units(), eq(3));
    assert_that!(store.snapshot().db_version, eq(Version::from(2)));
    Ok(())
}

#[test(tokio::test)]
async fn panicking_mutation_is_isolated() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let store = env.store().await;

    let first = store.enqueue_request(|state| state.deposit(1));
    let second = store.enqueue_request(|_| -> std::result::Result<PoolState, PoolStateError> {
        panic!("selection bug")
    });
    let third = store.enqueue_request(|state| state.deposit(2));

    assert_that!(first.await, ok(eq(true)));
    let_assert!(Err(RequestError::Mutation(err)) = second.await);
    assert_that!(err.to_string(), contains_substring("selection bug"));
    assert_that!(third.await, ok(eq(true)));

    assert_that!(store.snapshot().state.available_units(), eq(3));
    Ok(())
}

/// Waits until the drain worker finished the batch it is working on.
async fn drain_finished(store: &ClaimStateStore) {
    while store.is_draining() {
        tokio::task::yield_now().await;
    }
}

#[test(tokio::test)]
async fn batch_of_only_failing_mutations_commits_unchanged_state() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let store = env.store().await;

    let result = store
        .enqueue_request(|state| state.consume(&ClaimId::new("unknown")))
        .await;
    drain_finished(&store).await;

    assert!(matches!(result, Err(RequestError::Mutation(_))));
    assert_that!(env.state_store.update_calls(), eq(1));
    assert_that!(
        store.snapshot(),
        eq(StoredPoolState::new(
            Version::from(2),
            pool_key(),
            PoolState::new(pool_key())
        ))
    );
    assert_that!(env.stored_record().version, eq(Version::from(2)));
    Ok(())
}

#[test(tokio::test)]
async fn batch_of_only_failing_mutations_resyncs_on_conflict() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let store = env.store().await;
    store.token_cache().add(StateRef::new("tx-1:0"), 10);
    let authoritative = PoolState::new(pool_key()).deposit(3)?;
    env.put_external(4, &authoritative);

    let result = store
        .enqueue_request(|state| state.release(&ClaimId::new("unknown")))
        .await;
    drain_finished(&store).await;

    assert!(matches!(result, Err(RequestError::Mutation(_))));
    assert_that!(
        store.snapshot(),
        eq(StoredPoolState::new(Version::from(4), pool_key(), authoritative))
    );
    assert!(store.token_cache().is_empty());
    assert_that!(store.token_cache().invalidations(), eq(1));
    Ok(())
}

#[test(tokio::test)]
async fn pools_with_separators_in_key_components_are_independent() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let first_key = PoolKey::new("h:x", "t", "i", "n", "EUR");
    let second_key = PoolKey::new("h", "x:t", "i", "n", "EUR");
    assert_that!(
        first_key.to_record_key(),
        not(eq(second_key.to_record_key()))
    );

    let first = env.registry.get_or_load(&first_key).await?;
    let second = env.registry.get_or_load(&second_key).await?;

    let first_result = first.enqueue_request(|state| state.deposit(5));
    let second_result = second.enqueue_request(|state| state.deposit(1));

    assert_that!(first_result.await, ok(eq(true)));
    assert_that!(second_result.await, ok(eq(true)));

    let snapshot = second.snapshot();
    assert_that!(snapshot.state.pool_key(), eq(&second_key));
    assert_that!(snapshot.state.available_units(), eq(1));
    assert_that!(first.snapshot().state.available_units(), eq(5));

    let stored = env.state_store.record(&second_key.to_record_key());
    let_assert!(Some(stored) = stored);
    assert_that!(decode(&stored).pool_key(), eq(&second_key));
    Ok(())
}

#[test(tokio::test)]
async fn conflict_rolls_back_batch_and_adopts_stored_state() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let store = env.store().await;
    store.token_cache().add(StateRef::new("tx-1:0"), 10);
    store.token_cache().add(StateRef::new("tx-2:0"), 5);

    let authoritative = PoolState::new(pool_key()).deposit(7)?;
    env.put_external(5, &authoritative);

    let first = store.enqueue_request(|state| state.deposit(1));
    let second = store.enqueue_request(|state| state.deposit(2));

    assert_that!(first.await, ok(eq(false)));
    assert_that!(second.await, ok(eq(false)));

    assert_that!(
        store.snapshot(),
        eq(StoredPoolState::new(
            Version::from(5),
            pool_key(),
            authoritative.clone()
        ))
    );
    assert!(store.token_cache().is_empty());
    assert_that!(store.token_cache().invalidations(), eq(1));
    assert_that!(env.stored_record().value, storage_decoded(eq(authoritative)));

    // the next batch builds on the adopted state
    let third = store.enqueue_request(|state| state.deposit(1));
    assert_that!(third.await, ok(eq(true)));
    assert_that!(store.snapshot().db_version, eq(Version::from(6)));
    assert_that!(store.snapshot().state.available_units(), eq(8));
    assert_that!(store.token_cache().invalidations(), eq(1));
    Ok(())
}

#[test(tokio::test)]
async fn store_failure_resyncs_on_next_batches() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let store = env.store().await;
    store.token_cache().add(StateRef::new("tx-1:0"), 10);
    env.state_store.fail_next_updates(1);

    let failed = store.enqueue_request(|state| state.deposit(5));
    assert_that!(failed.await, ok(eq(false)));

    let snapshot = store.snapshot();
    assert_that!(snapshot.db_version, eq(Version::INVALID));
    assert_that!(snapshot.state, eq(PoolState::new(pool_key())));
    assert!(store.token_cache().is_empty());
    assert_that!(env.stored_record().version, eq(Version::MIN));

    // rejected as stale; adopts the stored state
    let resync = store.enqueue_request(|state| state.deposit(5));
    assert_that!(resync.await, ok(eq(false)));
    assert_that!(store.snapshot().db_version, eq(Version::MIN));
    assert_that!(store.token_cache().invalidations(), eq(2));

    let committed = store.enqueue_request(|state| state.deposit(5));
    assert_that!(committed.await, ok(eq(true)));
    assert_that!(store.snapshot().db_version, eq(Version::from(2)));
    assert_that!(env.stored_record().version, eq(Version::from(2)));
    assert_that!(decode(&env.stored_record()).available_units(), eq(5));
    Ok(())
}

#[test(tokio::test(start_paused = true))]
async fn commit_timeout_is_a_store_failure() -> anyhow::Result<()> {
    let env = TestEnv::with_options(
        ClaimStoreOptionsBuilder::default()
            .commit_timeout(Duration::from_secs(1).into())
            .build()?,
    );
    let store = env.store().await;
    env.state_store
        .set_update_delay(Some(Duration::from_secs(10)));

    let timed_out = store.enqueue_request(|state| state.deposit(5));
    assert_that!(timed_out.await, ok(eq(false)));
    assert_that!(store.snapshot().db_version, eq(Version::INVALID));
    assert_that!(env.stored_record().version, eq(Version::MIN));

    env.state_store.set_update_delay(None);
    let resync = store.enqueue_request(|state| state.deposit(5));
    assert_that!(resync.await, ok(eq(false)));
    let committed = store.enqueue_request(|state| state.deposit(5));
    assert_that!(committed.await, ok(eq(true)));
    assert_that!(store.snapshot().state.available_units(), eq(5));
    Ok(())
}

#[test(tokio::test)]
async fn claim_and_release_in_one_batch_nets_to_zero() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let store = env.store().await;
    assert_that!(
        store.enqueue_request(|state| state.deposit(25)).await,
        ok(eq(true))
    );

    let claimed =
        store.enqueue_request(|state| state.claim(claim("claim-1", &[("tx-1:0", 10)])));
    let released = store.enqueue_request(|state| state.release(&ClaimId::new("claim-1")));

    assert_that!(claimed.await, ok(eq(true)));
    assert_that!(released.await, ok(eq(true)));

    let state = store.snapshot().state;
    assert_that!(state.available_units(), eq(25));
    assert!(state.claims().is_empty());
    assert_that!(state.claimed_by(&StateRef::new("tx-1:0")), none());
    Ok(())
}

#[test(tokio::test(start_paused = true))]
async fn reports_draining_while_committing() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let store = env.store().await;
    env.state_store
        .set_update_delay(Some(Duration::from_millis(500)));
    assert!(!store.is_draining());

    let mut completion = store.enqueue_request(|state| state.deposit(1));
    assert_pending!(&mut completion);

    assert!(store.is_draining());
    assert_that!(store.queued_requests(), eq(0));

    let queued = store.enqueue_request(|state| state.deposit(1));
    assert_that!(store.queued_requests(), eq(1));

    assert_that!(completion.await, ok(eq(true)));
    assert_that!(queued.await, ok(eq(true)));
    tokio::task::yield_now().await;
    assert!(!store.is_draining());
    assert_that!(env.state_store.update_calls(), eq(2));
    Ok(())
}

#[test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn concurrent_requests_are_committed_by_a_single_writer() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let store = env.store().await;
    env.state_store
        .set_update_delay(Some(Duration::from_millis(2)));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let mut committed = 0;
            for _ in 0..25 {
                if store.enqueue_request(|state| state.deposit(1)).await? {
                    committed += 1;
                }
            }
            Ok::<_, RequestError>(committed)
        }));
    }

    let mut committed = 0;
    for handle in handles {
        committed += handle.await??;
    }

    assert_that!(committed, eq(200));
    assert_that!(env.state_store.max_concurrent_updates(), eq(1));
    assert_that!(store.snapshot().state.available_units(), eq(200));
    assert_that!(decode(&env.stored_record()).available_units(), eq(200));
    Ok(())
}

#[test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn concurrent_first_access_loads_one_store() -> anyhow::Result<()> {
    let env = Arc::new(TestEnv::new());

    let mut loads = FuturesUnordered::new();
    for _ in 0..10 {
        let env = Arc::clone(&env);
        loads.push(tokio::spawn(async move {
            let store = env.store().await;
            store.enqueue_request(|state| state.deposit(1)).await
        }));
    }

    while let Some(result) = loads.next().await {
        assert_that!(result?, ok(eq(true)));
    }

    let store = env.registry.get(&pool_key());
    let_assert!(Some(store) = store);
    assert_that!(store.snapshot().state.available_units(), eq(10));
    assert_that!(env.registry.pool_cache().len(), eq(1));
    Ok(())
}

#[test(tokio::test)]
async fn pools_are_independent() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let eur = env.store().await;
    let usd_key = PoolKey::new("holder-a", "fungible", "SHA256-1A2B", "notary-1", "USD");
    let usd = env.registry.get_or_load(&usd_key).await?;

    env.put_external(9, &PoolState::new(pool_key()));
    let eur_result = eur.enqueue_request(|state| state.deposit(1));
    let usd_result = usd.enqueue_request(|state| state.deposit(1));

    assert_that!(eur_result.await, ok(eq(false)));
    assert_that!(usd_result.await, ok(eq(true)));
    assert_that!(usd.snapshot().db_version, eq(Version::from(2)));
    assert_that!(usd.token_cache().invalidations(), eq(0));
    Ok(())
}

#[test(tokio::test)]
async fn shutdown_drains_queued_requests() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let store = env.store().await;

    let completions: Vec<_> = (1..=3)
        .map(|amount| store.enqueue_request(move |state| state.deposit(amount)))
        .collect();

    env.registry.shutdown().await;

    for completion in completions {
        assert_that!(completion.await, ok(eq(true)));
    }
    assert_that!(decode(&env.stored_record()).available_units(), eq(6));

    let late = store.enqueue_request(|state| state.deposit(1)).await;
    assert!(matches!(late, Err(RequestError::Shutdown)));

    let reload = env.registry.get_or_load(&pool_key()).await;
    assert!(matches!(reload, Err(RegistryError::Shutdown)));
    Ok(())
}

#[test(tokio::test)]
async fn failed_load_is_retried_by_next_caller() -> anyhow::Result<()> {
    let env = TestEnv::with_options(
        ClaimStoreOptionsBuilder::default()
            .load_retry_policy(RetryPolicy::None)
            .build()?,
    );
    env.state_store.fail_next_gets(1);

    let failed = env.registry.get_or_load(&pool_key()).await;
    let_assert!(
        Err(RegistryError::Load {
            source: ReadError::Store(StoreError::Unavailable(_)),
            ..
        }) = failed
    );
    assert!(env.registry.get(&pool_key()).is_none());

    let store = env.registry.get_or_load(&pool_key()).await?;
    assert_that!(store.snapshot().db_version, eq(Version::MIN));
    assert!(env.registry.get(&pool_key()).is_some());
    Ok(())
}

#[test]
fn registry_rejects_zero_commit_timeout() -> anyhow::Result<()> {
    let options = ClaimStoreOptionsBuilder::default()
        .commit_timeout(Duration::ZERO.into())
        .build()?;

    let result = ClaimStateStoreRegistry::new(
        StateStoreClient::new_in_memory(),
        PoolCache::default(),
        Arc::new(MockClock::default()),
        options,
    );

    assert!(matches!(
        result,
        Err(InvalidConfigurationError::ZeroDuration("commit-timeout"))
    ));
    Ok(())
}
