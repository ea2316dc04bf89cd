// Copyright (c) 2025 Tokenpool Developers.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0

//! Useful test utilities for the token pool crates. Import them with:
//!
//! ```rust
//! use tokenpool_test_util::{assert, assert_eq, assert_ne};
//! ```
//!
//! Note: You cannot import them with a glob import, as the compiler won't be able to distinguish our imports and the stdlib imports.

/// Macro to assert that a future does not complete within 100 ms.
#[macro_export]
macro_rules! assert_pending {
    ($fut:expr) => {
        $crate::assert!(
            let Err(_) = tokio::time::timeout(std::time::Duration::from_millis(100), $fut).await
        );
    };
}

// A couple of useful re-exports
pub use assert2::{assert, check, let_assert};
pub use pretty_assertions::{assert_eq, assert_ne};

pub mod matchers;
