// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Shamir polynomials, their commitments "in the exponent", and Lagrange
//! interpolation at zero.

use crate::{
    curve::{random_scalar, CurvePoint},
    errors::{InternalError, Result},
    party::PartyId,
};
use k256::Scalar;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::error;
use zeroize::ZeroizeOnDrop;

/// A polynomial over the scalar field. Coefficient `i` multiplies `x^i`.
#[derive(Clone, ZeroizeOnDrop)]
pub(crate) struct Polynomial {
    coefficients: Vec<Scalar>,
}

impl std::fmt::Debug for Polynomial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Polynomial([redacted])")
    }
}

impl Polynomial {
    /// Sample a random polynomial of degree `degree` with the given constant
    /// term.
    pub(crate) fn sample<R: RngCore + CryptoRng>(
        rng: &mut R,
        degree: usize,
        constant: Scalar,
    ) -> Self {
        let mut coefficients = Vec::with_capacity(degree + 1);
        coefficients.push(constant);
        for _ in 0..degree {
            coefficients.push(random_scalar(rng));
        }
        Self { coefficients }
    }

    pub(crate) fn degree(&self) -> usize {
        self.coefficients.len().saturating_sub(1)
    }

    pub(crate) fn constant(&self) -> Scalar {
        self.coefficients.first().copied().unwrap_or(Scalar::ZERO)
    }

    pub(crate) fn evaluate(&self, x: &Scalar) -> Scalar {
        self.coefficients
            .iter()
            .rev()
            .fold(Scalar::ZERO, |acc, coef| acc * x + coef)
    }

    pub(crate) fn coefficients(&self) -> &[Scalar] {
        &self.coefficients
    }

    /// Commit to every coefficient: `F_i = a_i·G`.
    pub(crate) fn exponent(&self) -> Exponent {
        Exponent {
            coefficients: self.coefficients.iter().map(CurvePoint::base_mul).collect(),
        }
    }
}

/// A polynomial with coefficients in the group, `F(x) = Σ x^i·F_i`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Exponent {
    coefficients: Vec<CurvePoint>,
}

impl Exponent {
    pub(crate) fn degree(&self) -> usize {
        self.coefficients.len().saturating_sub(1)
    }

    pub(crate) fn len(&self) -> usize {
        self.coefficients.len()
    }

    pub(crate) fn constant(&self) -> CurvePoint {
        self.coefficients
            .first()
            .copied()
            .unwrap_or(CurvePoint::IDENTITY)
    }

    pub(crate) fn coefficients(&self) -> &[CurvePoint] {
        &self.coefficients
    }

    pub(crate) fn evaluate(&self, x: &Scalar) -> CurvePoint {
        self.coefficients
            .iter()
            .rev()
            .fold(CurvePoint::IDENTITY, |acc, coef| acc.mul(x) + *coef)
    }

    #[cfg(test)]
    pub(crate) fn coefficients_mut(&mut self) -> &mut Vec<CurvePoint> {
        &mut self.coefficients
    }
}

/// Lagrange coefficient of `me` for interpolation at zero over `points`.
pub(crate) fn lagrange_coefficient(me: &PartyId, points: &[PartyId]) -> Result<Scalar> {
    let x_i = me.scalar();
    let mut result = Scalar::ONE;
    for point in points.iter().filter(|p| *p != me) {
        let x_j = point.scalar();
        let inv: Option<Scalar> = (x_j - x_i).invert().into();
        let inv = inv.ok_or_else(|| {
            error!("Evaluation points of {me} and {point} coincide");
            InternalError::InternalInvariantFailed
        })?;
        result *= x_j * inv;
    }
    Ok(result)
}
