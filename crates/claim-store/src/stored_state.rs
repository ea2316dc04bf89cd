// Copyright (c) 2025 Tokenpool Developers.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0

use tokenpool_state_store::StateRecord;
use tokenpool_types::identifiers::PoolKey;
use tokenpool_types::pool_state::PoolState;
use tokenpool_types::storage::{StorageCodec, StorageDecodeError};
use tokenpool_types::{Version, Versioned};

/// Last known authoritative state of a pool together with the version it is stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPoolState {
    pub db_version: Version,
    pub key: PoolKey,
    pub state: PoolState,
}

impl StoredPoolState {
    pub fn new(db_version: Version, key: PoolKey, state: PoolState) -> Self {
        Self {
            db_version,
            key,
            state,
        }
    }

    /// Decodes the state stored in `record`.
    pub fn from_record(key: PoolKey, record: &StateRecord) -> Result<Self, StorageDecodeError> {
        let mut value = record.value.clone();
        let state = StorageCodec::decode::<PoolState, _>(&mut value)?;

        Ok(Self::new(record.version, key, state))
    }

    /// Keeps the state but forgets the version, which forces the next commit to resync.
    pub fn into_unknown_version(self) -> Self {
        Self {
            db_version: Version::INVALID,
            ..self
        }
    }
}

impl Versioned for StoredPoolState {
    fn version(&self) -> Version {
        self.db_version
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use tokenpool_types::time::MillisSinceEpoch;

    use super::*;

    #[test]
    fn decodes_record() {
        let key = PoolKey::new("holder", "coin", "issuer", "notary", "EUR");
        let state = PoolState::new(key.clone()).deposit(100).unwrap();
        let record = StateRecord::new(
            key.to_record_key(),
            StorageCodec::encode_to_bytes(&state).unwrap(),
            Version::from(4),
            MillisSinceEpoch::new(10),
        );

        let stored = StoredPoolState::from_record(key.clone(), &record).unwrap();

        assert_eq!(stored, StoredPoolState::new(Version::from(4), key, state));
        assert!(!stored.into_unknown_version().db_version.is_valid());
    }

    #[test]
    fn rejects_garbage() {
        let key = PoolKey::new("holder", "coin", "issuer", "notary", "EUR");
        let record = StateRecord::new(
            key.to_record_key(),
            Bytes::new(),
            Version::MIN,
            MillisSinceEpoch::new(10),
        );

        assert!(StoredPoolState::from_record(key, &record).is_err());
    }
}
