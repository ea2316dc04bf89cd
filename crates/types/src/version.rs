// Copyright (c) 2025 Tokenpool Developers.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0

use std::fmt;

/// Version of a record in the versioned state store.
///
/// Stored records always carry a version `>= Version::MIN`. [`Version::INVALID`] is never
/// persisted, which makes it usable as a sentinel that is guaranteed to fail any version check.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
    derive_more::From,
    derive_more::Into,
)]
#[serde(transparent)]
pub struct Version(u32);

impl Version {
    pub const INVALID: Version = Version(0);
    pub const MIN: Version = Version(1);

    /// The version following this one. Wraps around to [`Version::MIN`] after `u32::MAX`, never
    /// yielding [`Version::INVALID`].
    pub fn next(self) -> Self {
        self.0.checked_add(1).map(Version).unwrap_or(Version::MIN)
    }

    pub fn invalid() -> Self {
        Version::INVALID
    }

    pub fn is_valid(&self) -> bool {
        *self != Version::INVALID
    }
}

impl Default for Version {
    fn default() -> Self {
        Version::MIN
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "v{}", self.0)
        } else {
            f.write_str("v<invalid>")
        }
    }
}

/// Trait for types that carry a [`Version`].
pub trait Versioned {
    fn version(&self) -> Version;
}

impl<T: Versioned> Versioned for &T {
    fn version(&self) -> Version {
        (**self).version()
    }
}

impl<T: Versioned> Versioned for std::sync::Arc<T> {
    fn version(&self) -> Version {
        (**self).version()
    }
}
