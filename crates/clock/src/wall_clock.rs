// Copyright (c) 2025 Tokenpool Developers.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0

use std::time::SystemTime;

use crate::{Clock, MillisSinceEpoch};

/// Production implementation of [`Clock`] backed by system time.
///
/// `WallClock` is `Copy` and can be shared freely across threads.
#[derive(Debug, Default, Copy, Clone)]
pub struct WallClock;

impl WallClock {
    /// Returns the current unix timestamp in milliseconds via `SystemTime::now()`.
    #[inline]
    pub fn now_ms() -> MillisSinceEpoch {
        MillisSinceEpoch::from(SystemTime::now())
    }
}

impl Clock for WallClock {
    #[inline]
    fn now(&self) -> MillisSinceEpoch {
        WallClock::now_ms()
    }
}
