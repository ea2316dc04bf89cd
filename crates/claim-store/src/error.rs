// Copyright (c) 2025 Tokenpool Developers.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0

use std::any::Any;

use tokenpool_state_store::ReadError;
use tokenpool_types::errors::GenericError;
use tokenpool_types::identifiers::PoolKey;
use tokenpool_types::storage::{StorageDecodeError, StorageEncodeError};

/// Failure outcome of an enqueued request. Rolled back batches are not errors; they resolve to
/// `Ok(false)`.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("mutation failed: {0}")]
    Mutation(GenericError),
    #[error("claim state store has been shut down")]
    Shutdown,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("failed loading state of pool '{key}': {source}")]
    Load {
        key: PoolKey,
        #[source]
        source: ReadError,
    },
    #[error("failed encoding initial state of pool '{key}': {source}")]
    Encode {
        key: PoolKey,
        #[source]
        source: StorageEncodeError,
    },
    #[error("failed decoding stored state of pool '{key}': {source}")]
    Decode {
        key: PoolKey,
        #[source]
        source: StorageDecodeError,
    },
    #[error("claim state store registry has been shut down")]
    Shutdown,
}

#[derive(Debug, thiserror::Error)]
#[error("mutation panicked: {0}")]
pub struct MutationPanic(String);

impl MutationPanic {
    pub(crate) fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(message) = payload.downcast_ref::<&'static str>() {
            (*message).to_owned()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "<non-string panic payload>".to_owned()
        };

        MutationPanic(message)
    }
}
