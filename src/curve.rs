// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! secp256k1 helpers: a serializable point wrapper, scalar conversions and
//! ECDSA verification.

use crate::errors::{InternalError, Result};
use generic_array::GenericArray;
use k256::{
    ecdsa::{signature::DigestVerifier, Signature, VerifyingKey},
    elliptic_curve::{
        bigint::Encoding,
        ops::Reduce,
        point::AffineCoordinates,
        scalar::IsHigh,
        sec1::{FromEncodedPoint, ToEncodedPoint},
        Curve, Field, PrimeField,
    },
    AffinePoint, EncodedPoint, ProjectivePoint, Scalar, U256,
};
use libpaillier::unknown_order::BigNumber;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::Digest;
use sha3::Keccak256;
use std::ops::{Add, Sub};
use tracing::error;
use zeroize::Zeroizing;

/// Wrapper around [`k256::ProjectivePoint`] with a canonical byte encoding.
///
/// Points are encoded as SEC1 compressed bytes; the identity encodes as the
/// single byte `0x00`.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct CurvePoint(pub ProjectivePoint);

impl CurvePoint {
    pub const GENERATOR: Self = CurvePoint(ProjectivePoint::GENERATOR);
    pub const IDENTITY: Self = CurvePoint(ProjectivePoint::IDENTITY);

    /// `s·G`
    pub fn base_mul(s: &Scalar) -> Self {
        Self(ProjectivePoint::GENERATOR * s)
    }

    pub fn mul(&self, s: &Scalar) -> Self {
        Self(self.0 * s)
    }

    pub fn is_identity(&self) -> bool {
        self.0 == ProjectivePoint::IDENTITY
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.to_affine().to_encoded_point(true).as_bytes().to_vec()
    }

    pub fn try_from_bytes(bytes: &[u8]) -> Result<Self> {
        let encoded = EncodedPoint::from_bytes(bytes).map_err(|_| {
            error!("Failed to parse bytes as a SEC1 point");
            InternalError::Serialization
        })?;
        let point: Option<AffinePoint> = AffinePoint::from_encoded_point(&encoded).into();
        match point {
            Some(point) => Ok(Self(point.into())),
            None => {
                error!("Bytes do not encode a point on secp256k1");
                Err(InternalError::Serialization)
            }
        }
    }

    /// x-coordinate of the point, reduced modulo the group order.
    pub fn x_projection(&self) -> Scalar {
        <Scalar as Reduce<U256>>::reduce_bytes(&self.0.to_affine().x())
    }
}

impl Add for CurvePoint {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for CurvePoint {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl std::iter::Sum for CurvePoint {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::IDENTITY, |acc, p| acc + p)
    }
}

impl From<ProjectivePoint> for CurvePoint {
    fn from(p: ProjectivePoint) -> Self {
        Self(p)
    }
}

impl Serialize for CurvePoint {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_bytes().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CurvePoint {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bytes = Vec::<u8>::deserialize(deserializer)?;
        CurvePoint::try_from_bytes(&bytes)
            .map_err(|_| serde::de::Error::custom("invalid secp256k1 point"))
    }
}

/// The group order `q`.
pub(crate) fn order() -> BigNumber {
    let order_bytes: [u8; 32] = k256::Secp256k1::ORDER.to_be_bytes();
    BigNumber::from_slice(order_bytes)
}

pub(crate) fn random_scalar<R: RngCore + CryptoRng>(rng: &mut R) -> Scalar {
    Scalar::random(rng)
}

/// Interpret `x` modulo `q`, respecting its sign.
pub(crate) fn bn_to_scalar(x: &BigNumber) -> Result<Scalar> {
    let x_modded = x.nmod(&order());

    let bytes = Zeroizing::new(x_modded.to_bytes());
    if bytes.len() > 32 {
        error!("Reduced BigNumber does not fit in 32 bytes");
        return Err(InternalError::InternalInvariantFailed);
    }
    let mut slice = Zeroizing::new(vec![0u8; 32 - bytes.len()]);
    slice.extend_from_slice(&bytes);

    Option::from(Scalar::from_repr(GenericArray::clone_from_slice(&slice))).ok_or_else(|| {
        error!("Failed to convert BigNumber into k256::Scalar");
        InternalError::InternalInvariantFailed
    })
}

/// Non-negative integer representative of `s`.
pub(crate) fn scalar_to_bn(s: &Scalar) -> BigNumber {
    BigNumber::from_slice(s.to_bytes())
}

/// Keccak-256 digest of `message`, reduced to a scalar.
pub fn message_scalar(message: &[u8]) -> Scalar {
    let digest = Keccak256::new_with_prefix(message).finalize();
    <Scalar as Reduce<U256>>::reduce_bytes(&digest)
}

/// Assemble a low-S ECDSA signature from its scalars.
pub(crate) fn signature_from_scalars(r: &Scalar, s: &Scalar) -> Result<Signature> {
    let s = if bool::from(s.is_high()) { -*s } else { *s };
    Signature::from_scalars(*r, s).map_err(|_| {
        error!("Signature scalars are out of range");
        InternalError::InternalInvariantFailed
    })
}

/// Verify an ECDSA signature over the Keccak-256 digest of `message`.
pub fn verify_signature(public_key: &CurvePoint, message: &[u8], signature: &Signature) -> bool {
    let Ok(key) = VerifyingKey::from_affine(public_key.0.to_affine()) else {
        return false;
    };
    key.verify_digest(Keccak256::new_with_prefix(message), signature)
        .is_ok()
}
