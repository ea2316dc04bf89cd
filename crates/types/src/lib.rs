// Copyright (c) 2025 Tokenpool Developers.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0

//! This crate contains the core types shared by the token pool claim components.

mod version;

pub mod config;
pub mod config_loader;
pub mod errors;
pub mod identifiers;
pub mod pool_state;
pub mod retries;
pub mod storage;
pub mod time;

pub use version::*;
