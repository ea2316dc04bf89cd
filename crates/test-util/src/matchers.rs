// Copyright (c) 2025 Tokenpool Developers.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0

//! This module contains a collection of matchers

pub use googletest::matchers::*;

pub use storage::storage_decoded;

mod storage {
    use std::fmt::Debug;
    use std::marker::PhantomData;

    use googletest::matcher::{Matcher, MatcherResult};
    use tokenpool_types::storage::{StorageCodec, StorageDecode};

    struct StorageDecodeMatcher<InnerMatcher, T>(InnerMatcher, PhantomData<T>);

    impl<T, InnerMatcher> Matcher for StorageDecodeMatcher<InnerMatcher, T>
    where
        T: StorageDecode + Debug,
        InnerMatcher: Matcher<ActualT = T>,
    {
        type ActualT = bytes::Bytes;

        fn matches(&self, actual: &Self::ActualT) -> MatcherResult {
            let mut buf = actual.clone();
            if let Ok(value) = StorageCodec::decode::<T, _>(&mut buf) {
                self.0.matches(&value)
            } else {
                MatcherResult::NoMatch
            }
        }

        fn describe(&self, matcher_result: MatcherResult) -> String {
            match matcher_result {
                MatcherResult::Match => {
                    format!(
                        "can be decoded from the storage codec which {:?}",
                        self.0.describe(MatcherResult::Match)
                    )
                }
                MatcherResult::NoMatch => "cannot be decoded from the storage codec".to_string(),
            }
        }
    }

    /// Decodes [`bytes::Bytes`] written by the [`StorageCodec`] and matches the value.
    pub fn storage_decoded<T: StorageDecode + Debug>(
        inner: impl Matcher<ActualT = T>,
    ) -> impl Matcher<ActualT = bytes::Bytes> {
        StorageDecodeMatcher(inner, PhantomData)
    }

}
