// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Party identifiers.

use crate::{
    errors::{CallerError, Result},
    parameters::MAX_ID_BYTES,
};
use generic_array::GenericArray;
use k256::{elliptic_curve::PrimeField, Scalar};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use tracing::error;

/// Identifier of a protocol party.
///
/// An identifier is a non-empty string of at most [`MAX_ID_BYTES`] bytes whose
/// first byte is not `0x00`. Its big-endian byte value is the party's
/// evaluation point for Shamir sharing, which is therefore never zero and
/// distinct for distinct identifiers.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PartyId(String);

impl PartyId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let bytes = id.as_bytes();
        if bytes.is_empty() || bytes.len() > MAX_ID_BYTES {
            error!("Party id must be between 1 and {MAX_ID_BYTES} bytes long");
            return Err(CallerError::BadPartyId(id).into());
        }
        if bytes[0] == 0 {
            error!("Party id must not start with a NUL byte");
            return Err(CallerError::BadPartyId(id).into());
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// The evaluation point of this party.
    pub fn scalar(&self) -> Scalar {
        let bytes = self.0.as_bytes();
        let mut repr = [0u8; 32];
        repr[32 - bytes.len()..].copy_from_slice(bytes);
        // At most 31 bytes, so the value is always below the group order.
        Option::from(Scalar::from_repr(GenericArray::clone_from_slice(&repr)))
            .unwrap_or(Scalar::ZERO)
    }
}

impl TryFrom<String> for PartyId {
    type Error = CallerError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        PartyId::new(value).map_err(|_| CallerError::DeserializationFailed)
    }
}

impl From<PartyId> for String {
    fn from(value: PartyId) -> Self {
        value.0
    }
}

impl Display for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parse a list of identifiers, checking that they are all distinct.
pub fn party_ids<I, S>(ids: I) -> Result<Vec<PartyId>>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let ids = ids
        .into_iter()
        .map(PartyId::new)
        .collect::<Result<Vec<_>>>()?;
    let mut sorted = ids.clone();
    sorted.sort();
    sorted.dedup();
    if sorted.len() != ids.len() {
        error!("Party ids must be distinct");
        Err(CallerError::BadPartySet("duplicate party id".into()))?
    }
    Ok(ids)
}
