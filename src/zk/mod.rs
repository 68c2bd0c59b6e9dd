// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Non-interactive zero-knowledge proofs, made non-interactive with the
//! [`Hash`](crate::hash::Hash) transcript.
//!
//! - [`modulus`]: `N` is a Paillier-Blum modulus.
//! - [`prm`]: ring-Pedersen parameters are well formed (`s ∈ <t>`).
//! - [`sch`]: knowledge of a discrete logarithm.

pub mod modulus;
pub mod prm;
pub mod sch;

use thiserror::Error;

/// The check that caused a proof to be rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProofError {
    #[error("modulus is even")]
    EvenModulus,
    #[error("modulus is prime")]
    PrimeModulus,
    #[error("w is not a unit with Jacobi symbol -1")]
    BadW,
    #[error("expected {expected} responses, got {actual}")]
    ResponseCount { expected: usize, actual: usize },
    #[error("response {0} is out of range")]
    ResponseRange(usize),
    #[error("response {0} does not satisfy the verification equation")]
    ResponseEquation(usize),
    #[error("challenge derivation failed")]
    Challenge,
}
