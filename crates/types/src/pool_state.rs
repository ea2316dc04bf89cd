// Copyright (c) 2025 Tokenpool Developers.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0

//! Claim state of a single token pool.
//!
//! [`PoolState`] is an immutable value. Every transition is a pure function that borrows the
//! current state and returns a new one, which lets the claim store fold a batch of requests over
//! a working copy and discard it if the batch does not commit.

use std::collections::BTreeSet;

use crate::flexbuffers_storage_encode_decode;
use crate::identifiers::{ClaimId, PoolKey, StateRef};

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ClaimedToken {
    pub state_ref: StateRef,
    pub amount: u64,
}

impl ClaimedToken {
    pub fn new(state_ref: impl Into<StateRef>, amount: u64) -> Self {
        Self {
            state_ref: state_ref.into(),
            amount,
        }
    }
}

/// A set of tokens exclusively allocated to one claimant.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TokenClaim {
    pub claim_id: ClaimId,
    pub tokens: Vec<ClaimedToken>,
}

impl TokenClaim {
    pub fn new(claim_id: impl Into<ClaimId>, tokens: Vec<ClaimedToken>) -> Self {
        Self {
            claim_id: claim_id.into(),
            tokens,
        }
    }

    /// Sum of the claimed token amounts. Saturates instead of overflowing.
    pub fn amount(&self) -> u64 {
        self.tokens
            .iter()
            .fold(0u64, |acc, token| acc.saturating_add(token.amount))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolStateError {
    #[error("claim '{0}' already exists")]
    DuplicateClaim(ClaimId),
    #[error("claim '{0}' is unknown")]
    UnknownClaim(ClaimId),
    #[error("token '{state_ref}' is already claimed by '{claim_id}'")]
    TokenAlreadyClaimed {
        state_ref: StateRef,
        claim_id: ClaimId,
    },
    #[error("token '{0}' is listed more than once")]
    DuplicateToken(StateRef),
    #[error("claim requires {requested} units but only {available} are available")]
    InsufficientUnits { requested: u64, available: u64 },
    #[error("claim '{0}' does not contain any tokens")]
    EmptyClaim(ClaimId),
    #[error("depositing {amount} units would overflow the pool balance of {available}")]
    Overflow { amount: u64, available: u64 },
}

/// Available units and outstanding claims of one token pool.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PoolState {
    pool_key: PoolKey,
    available_units: u64,
    claims: Vec<TokenClaim>,
}

flexbuffers_storage_encode_decode!(PoolState);

impl PoolState {
    /// Empty pool without available units or claims.
    pub fn new(pool_key: PoolKey) -> Self {
        Self {
            pool_key,
            available_units: 0,
            claims: Vec::new(),
        }
    }

    pub fn pool_key(&self) -> &PoolKey {
        &self.pool_key
    }

    pub fn available_units(&self) -> u64 {
        self.available_units
    }

    pub fn claims(&self) -> &[TokenClaim] {
        &self.claims
    }

    pub fn claim_of(&self, claim_id: &ClaimId) -> Option<&TokenClaim> {
        self.claims.iter().find(|claim| &claim.claim_id == claim_id)
    }

    pub fn claimed_units(&self) -> u64 {
        self.claims
            .iter()
            .fold(0u64, |acc, claim| acc.saturating_add(claim.amount()))
    }

    /// Returns the claim holding the given token, if any.
    pub fn claimed_by(&self, state_ref: &StateRef) -> Option<&ClaimId> {
        self.claims
            .iter()
            .find(|claim| claim.tokens.iter().any(|t| &t.state_ref == state_ref))
            .map(|claim| &claim.claim_id)
    }

    /// Adds units to the pool.
    pub fn deposit(&self, amount: u64) -> Result<PoolState, PoolStateError> {
        let available_units =
            self.available_units
                .checked_add(amount)
                .ok_or(PoolStateError::Overflow {
                    amount,
                    available: self.available_units,
                })?;

        Ok(PoolState {
            available_units,
            ..self.clone()
        })
    }

    /// Allocates the claim's tokens exclusively to the claimant.
    ///
    /// Fails if the claim id is taken, if any token is already held by another claim or listed
    /// twice, or if the pool does not have enough units available.
    pub fn claim(&self, claim: TokenClaim) -> Result<PoolState, PoolStateError> {
        if claim.tokens.is_empty() {
            return Err(PoolStateError::EmptyClaim(claim.claim_id));
        }

        if self.claim_of(&claim.claim_id).is_some() {
            return Err(PoolStateError::DuplicateClaim(claim.claim_id));
        }

        let mut seen = BTreeSet::new();
        for token in &claim.tokens {
            if !seen.insert(&token.state_ref) {
                return Err(PoolStateError::DuplicateToken(token.state_ref.clone()));
            }
            if let Some(holder) = self.claimed_by(&token.state_ref) {
                return Err(PoolStateError::TokenAlreadyClaimed {
                    state_ref: token.state_ref.clone(),
                    claim_id: holder.clone(),
                });
            }
        }

        let requested = claim.amount();
        if requested > self.available_units {
            return Err(PoolStateError::InsufficientUnits {
                requested,
                available: self.available_units,
            });
        }

        let mut claims = self.claims.clone();
        claims.push(claim);

        Ok(PoolState {
            pool_key: self.pool_key.clone(),
            available_units: self.available_units - requested,
            claims,
        })
    }

    /// Drops the claim and returns its units to the pool.
    pub fn release(&self, claim_id: &ClaimId) -> Result<PoolState, PoolStateError> {
        let (released, claims) = self.split_off_claim(claim_id)?;
        let amount = released.amount();

        let available_units =
            self.available_units
                .checked_add(amount)
                .ok_or(PoolStateError::Overflow {
                    amount,
                    available: self.available_units,
                })?;

        Ok(PoolState {
            pool_key: self.pool_key.clone(),
            available_units,
            claims,
        })
    }

    /// Drops the claim because its tokens have been spent. The units do not return to the pool.
    pub fn consume(&self, claim_id: &ClaimId) -> Result<PoolState, PoolStateError> {
        let (_, claims) = self.split_off_claim(claim_id)?;

        Ok(PoolState {
            pool_key: self.pool_key.clone(),
            available_units: self.available_units,
            claims,
        })
    }

    fn split_off_claim(
        &self,
        claim_id: &ClaimId,
    ) -> Result<(TokenClaim, Vec<TokenClaim>), PoolStateError> {
        let position = self
            .claims
            .iter()
            .position(|claim| &claim.claim_id == claim_id)
            .ok_or_else(|| PoolStateError::UnknownClaim(claim_id.clone()))?;

        let mut claims = self.claims.clone();
        let released = claims.remove(position);
        Ok((released, claims))
    }
}
