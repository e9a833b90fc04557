//! Obligation identifiers and the read-only obligation record.

use primitive_types::U256;
use starknet::core::types::Felt;
use std::fmt;
use std::str::FromStr;

use crate::core::codec;
use crate::utils::error::{KeeperError, Result};

/// Identifier of a recurring-payment obligation.
///
/// The ledger program stores identifiers as `u256`; on the wire they travel
/// as a `(low, high)` pair of 128-bit halves (see [`crate::core::codec`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ObligationId(pub U256);

impl ObligationId {
    /// Builds an identifier from its wire halves.
    #[must_use]
    pub fn from_parts(low: u128, high: u128) -> Self {
        Self(codec::join(low, high))
    }

    /// Returns the `(low, high)` halves.
    #[must_use]
    pub fn parts(&self) -> (u128, u128) {
        codec::split(self.0)
    }

    /// Calldata representation: `[low, high]`.
    #[must_use]
    pub fn to_calldata(&self) -> Vec<Felt> {
        codec::to_calldata(self.0).to_vec()
    }
}

impl From<u64> for ObligationId {
    fn from(value: u64) -> Self {
        Self(U256::from(value))
    }
}

impl From<u128> for ObligationId {
    fn from(value: u128) -> Self {
        Self(U256::from(value))
    }
}

impl FromStr for ObligationId {
    type Err = KeeperError;

    fn from_str(s: &str) -> Result<Self> {
        codec::parse_id(s).map(Self)
    }
}

impl fmt::Display for ObligationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A recurring-payment commitment as stored by the ledger program.
///
/// The keeper never evaluates dueness itself; this record is only read for
/// diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Obligation {
    pub id: ObligationId,
    pub payer: Felt,
    pub payee: Felt,
    pub amount: U256,
    pub asset: Felt,
    /// Seconds between payments.
    pub periodicity: u64,
    /// Absolute expiry, unix seconds.
    pub expiry: u64,
    /// Absolute time of the last payment, unix seconds.
    pub last_payment: u64,
    pub active: bool,
}
