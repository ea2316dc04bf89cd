// Copyright (c) 2025 Tokenpool Developers.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use super::InvalidConfigurationError;
use crate::retries::RetryPolicy;

/// # Claim store options
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, derive_builder::Builder)]
#[serde(rename_all = "kebab-case")]
#[builder(default)]
pub struct ClaimStoreOptions {
    /// # Commit timeout
    ///
    /// Upper bound for a single conditional update against the state store. An update that does
    /// not complete in time is treated like an unavailable store: the batch is rolled back and
    /// the pool resynchronizes on its next commit.
    ///
    /// Can be configured using the [`humantime`](https://docs.rs/humantime/latest/humantime/fn.parse_duration.html) format.
    #[serde_as(as = "serde_with::DisplayFromStr")]
    commit_timeout: humantime::Duration,

    /// # Load retry policy
    ///
    /// Retry policy applied to retryable errors while loading a pool's record from the state
    /// store on first access.
    load_retry_policy: RetryPolicy,

    /// # Max batch size
    ///
    /// Maximum number of queued requests committed together. Requests beyond the limit stay
    /// queued in order for the next batch. Unlimited if unset.
    max_batch_size: Option<NonZeroUsize>,
}

impl ClaimStoreOptions {
    pub fn commit_timeout(&self) -> Duration {
        self.commit_timeout.into()
    }

    pub fn load_retry_policy(&self) -> &RetryPolicy {
        &self.load_retry_policy
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size.map(NonZeroUsize::get).unwrap_or(usize::MAX)
    }

    pub fn validate(&self) -> Result<(), InvalidConfigurationError> {
        if self.commit_timeout().is_zero() {
            return Err(InvalidConfigurationError::ZeroDuration("commit-timeout"));
        }

        if let RetryPolicy::Exponential { factor, .. } = self.load_retry_policy {
            if factor < 1.0 {
                return Err(InvalidConfigurationError::RetryFactor(factor));
            }
        }

        Ok(())
    }
}

impl Default for ClaimStoreOptions {
    fn default() -> Self {
        Self {
            commit_timeout: Duration::from_secs(5).into(),
            load_retry_policy: RetryPolicy::exponential(
                Duration::from_millis(10),
                2.0,
                Some(10),
                Some(Duration::from_secs(1)),
            ),
            max_batch_size: None,
        }
    }
}
