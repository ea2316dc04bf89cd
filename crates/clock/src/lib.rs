// Copyright (c) 2025 Tokenpool Developers.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0

//! Time sources used to stamp records written to the state store.
//!
//! Components take a [`SharedClock`] so tests can substitute [`MockClock`] for the
//! [`WallClock`].

mod wall_clock;

#[cfg(any(test, feature = "test-util"))]
mod mock_clock;

use std::sync::Arc;

pub use tokenpool_types::time::MillisSinceEpoch;
pub use wall_clock::WallClock;

#[cfg(any(test, feature = "test-util"))]
pub use mock_clock::MockClock;

/// A source of unix timestamps.
pub trait Clock {
    /// Current time in milliseconds since the unix epoch.
    fn now(&self) -> MillisSinceEpoch;
}

impl<T: Clock + ?Sized> Clock for Arc<T> {
    fn now(&self) -> MillisSinceEpoch {
        (**self).now()
    }
}

impl<T: Clock + ?Sized> Clock for &T {
    fn now(&self) -> MillisSinceEpoch {
        (**self).now()
    }
}

pub type SharedClock = Arc<dyn Clock + Send + Sync>;
