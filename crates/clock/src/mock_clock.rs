// Copyright (c) 2025 Tokenpool Developers.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::{Clock, MillisSinceEpoch, WallClock};

/// Manually driven clock. Clones share the same time.
#[derive(Debug, Clone)]
pub struct MockClock {
    storage: Arc<AtomicU64>,
}

impl Default for MockClock {
    fn default() -> Self {
        let clock = Self {
            storage: Arc::new(AtomicU64::default()),
        };
        clock.refresh_from_wall_clock();
        clock
    }
}

impl MockClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timestamp(timestamp: MillisSinceEpoch) -> Self {
        Self {
            storage: Arc::new(AtomicU64::new(timestamp.as_u64())),
        }
    }

    pub fn advance_ms(&self, ms: u64) {
        self.storage.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn refresh_from_wall_clock(&self) {
        self.set(WallClock.now());
    }

    pub fn set(&self, timestamp: MillisSinceEpoch) {
        self.storage.store(timestamp.as_u64(), Ordering::SeqCst);
    }
}

impl Clock for MockClock {
    fn now(&self) -> MillisSinceEpoch {
        MillisSinceEpoch::new(self.storage.load(Ordering::SeqCst))
    }
}
