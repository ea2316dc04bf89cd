// Copyright (c) 2025 Tokenpool Developers.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0

mod claim_store;

pub use claim_store::*;

use serde::{Deserialize, Serialize};

use crate::errors::GenericError;

/// # Token pool configuration file
///
/// Configuration of the claim state stores of one process.
#[derive(Debug, Clone, Default, Serialize, Deserialize, derive_builder::Builder)]
#[builder(default)]
#[serde(rename_all = "kebab-case")]
pub struct Configuration {
    pub claim_store: ClaimStoreOptions,
}

impl Configuration {
    /// Dumps the configuration to a string
    pub fn dump(&self) -> Result<String, GenericError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), InvalidConfigurationError> {
        self.claim_store.validate()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InvalidConfigurationError {
    #[error("'{0}' must be greater than zero")]
    ZeroDuration(&'static str),
    #[error("retry policy factor must be >= 1.0 but was {0}")]
    RetryFactor(f32),
}
