// Copyright (c) 2025 Tokenpool Developers.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0

//! Identifiers of token pools, claims and the ledger states backing claimed tokens.

use std::fmt::{self, Write as _};
use std::str::FromStr;

use bytestring::ByteString;

/// Identifies one claimable token pool.
///
/// A pool groups all tokens of one holding identity that share token type, issuer, notary and
/// symbol. The string form joins the components with `:` and is used as the record key in the
/// versioned state store. `:` and `\` inside a component are escaped with `\`, so distinct keys
/// never share a string form.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub struct PoolKey {
    pub holding_id: String,
    pub token_type: String,
    pub issuer_hash: String,
    pub notary: String,
    pub symbol: String,
}

const POOL_KEY_SEPARATOR: char = ':';
const POOL_KEY_ESCAPE: char = '\\';
const POOL_KEY_COMPONENTS: usize = 5;

impl PoolKey {
    pub fn new(
        holding_id: impl Into<String>,
        token_type: impl Into<String>,
        issuer_hash: impl Into<String>,
        notary: impl Into<String>,
        symbol: impl Into<String>,
    ) -> Self {
        Self {
            holding_id: holding_id.into(),
            token_type: token_type.into(),
            issuer_hash: issuer_hash.into(),
            notary: notary.into(),
            symbol: symbol.into(),
        }
    }

    /// Key under which the pool's claim state is stored.
    pub fn to_record_key(&self) -> ByteString {
        ByteString::from(self.to_string())
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let components = [
            &self.holding_id,
            &self.token_type,
            &self.issuer_hash,
            &self.notary,
            &self.symbol,
        ];

        for (idx, component) in components.into_iter().enumerate() {
            if idx > 0 {
                f.write_char(POOL_KEY_SEPARATOR)?;
            }
            for ch in component.chars() {
                if ch == POOL_KEY_SEPARATOR || ch == POOL_KEY_ESCAPE {
                    f.write_char(POOL_KEY_ESCAPE)?;
                }
                f.write_char(ch)?;
            }
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PoolKeyParseError {
    #[error("expected {POOL_KEY_COMPONENTS} ':'-separated components but found {0}")]
    ComponentCount(usize),
    #[error("component '{0}' must not be empty")]
    EmptyComponent(&'static str),
    #[error("escape character at the end of the input")]
    DanglingEscape,
}

/// Splits at unescaped separators and removes the escapes.
fn split_components(s: &str) -> Result<Vec<String>, PoolKeyParseError> {
    let mut components = Vec::with_capacity(POOL_KEY_COMPONENTS);
    let mut current = String::new();
    let mut chars = s.chars();

    while let Some(ch) = chars.next() {
        match ch {
            POOL_KEY_ESCAPE => {
                current.push(chars.next().ok_or(PoolKeyParseError::DanglingEscape)?)
            }
            POOL_KEY_SEPARATOR => components.push(std::mem::take(&mut current)),
            ch => current.push(ch),
        }
    }
    components.push(current);

    Ok(components)
}

impl FromStr for PoolKey {
    type Err = PoolKeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let components = split_components(s)?;
        let [holding_id, token_type, issuer_hash, notary, symbol] = components.as_slice() else {
            return Err(PoolKeyParseError::ComponentCount(components.len()));
        };

        for (name, value) in [
            ("holding-id", holding_id),
            ("token-type", token_type),
            ("issuer-hash", issuer_hash),
            ("notary", notary),
            ("symbol", symbol),
        ] {
            if value.is_empty() {
                return Err(PoolKeyParseError::EmptyComponent(name));
            }
        }

        Ok(PoolKey::new(
            holding_id.as_str(),
            token_type.as_str(),
            issuer_hash.as_str(),
            notary.as_str(),
            symbol.as_str(),
        ))
    }
}

/// Identifier of a claim, chosen by the claimant.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
    derive_more::Display,
    derive_more::From,
)]
#[serde(transparent)]
pub struct ClaimId(String);

impl ClaimId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ClaimId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// Reference to the ledger state that backs a token.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
    derive_more::Display,
    derive_more::From,
)]
#[serde(transparent)]
pub struct StateRef(String);

impl StateRef {
    pub fn new(state_ref: impl Into<String>) -> Self {
        Self(state_ref.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StateRef {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}
