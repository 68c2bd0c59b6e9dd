// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

/// Computational security parameter, in bytes.
pub const SEC_BYTES: usize = 32;

/// Statistical security parameter; also the number of challenges in the
/// modulus and ring-Pedersen proofs.
pub const STAT_PARAM: usize = 80;

/// Bit length of every Paillier modulus.
pub const PAILLIER_BITS: usize = 2048;

/// Bit length of each Blum prime factor of a Paillier modulus.
pub const BLUM_PRIME_BITS: usize = PAILLIER_BITS / 2;

/// Size bound for Paillier plaintexts produced by the MtA exchange.
pub const ELL_PRIME: usize = 1280;

/// Upper bound on rejection sampling loops.
pub(crate) const CRYPTOGRAPHIC_RETRY_MAX: usize = 500usize;

/// Maximal length in bytes of a party identifier.
pub const MAX_ID_BYTES: usize = 31;
