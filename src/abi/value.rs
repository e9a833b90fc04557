//! Positional felt decoding guided by ABI type names.

use primitive_types::U256;
use starknet::core::types::Felt;

use super::ContractAbi;
use crate::core::codec;
use crate::utils::error::{KeeperError, Result};

const FELT_TYPES: &[&str] = &[
    "core::felt252",
    "core::starknet::contract_address::ContractAddress",
    "core::starknet::class_hash::ClassHash",
    "core::starknet::eth_address::EthAddress",
    "core::bytes_31::bytes31",
];

const ARRAY_PREFIXES: &[&str] = &["core::array::Array::<", "core::array::Span::<"];

fn uint_bits(ty: &str) -> Option<u32> {
    match ty {
        "core::integer::u8" => Some(8),
        "core::integer::u16" => Some(16),
        "core::integer::u32" | "core::integer::usize" => Some(32),
        "core::integer::u64" => Some(64),
        "core::integer::u128" => Some(128),
        _ => None,
    }
}

/// A decoded ABI value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbiValue {
    Unit,
    Felt(Felt),
    /// Any unsigned integer up to 128 bits.
    Uint(u128),
    Struct(Vec<(String, AbiValue)>),
    Enum {
        variant: String,
        value: Box<AbiValue>,
    },
    Array(Vec<AbiValue>),
}

impl AbiValue {
    /// Member of a struct value by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&AbiValue> {
        match self {
            AbiValue::Struct(members) => members.iter().find(|(n, _)| n == name).map(|(_, v)| v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_felt(&self) -> Option<Felt> {
        match self {
            AbiValue::Felt(f) => Some(*f),
            AbiValue::Uint(v) => Some(Felt::from(*v)),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_u128(&self) -> Option<u128> {
        match self {
            AbiValue::Uint(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        self.as_u128().and_then(|v| u64::try_from(v).ok())
    }

    /// A `core::integer::u256` struct value.
    #[must_use]
    pub fn as_u256(&self) -> Option<U256> {
        let low = self.field("low")?.as_u128()?;
        let high = self.field("high")?.as_u128()?;
        Some(codec::join(low, high))
    }

    /// A `core::bool` enum value.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AbiValue::Enum { variant, .. } if variant == "True" => Some(true),
            AbiValue::Enum { variant, .. } if variant == "False" => Some(false),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&[AbiValue]> {
        match self {
            AbiValue::Array(items) => Some(items),
            _ => None,
        }
    }
}

/// Cursor over a felt slice.
#[derive(Debug)]
pub struct FeltReader<'a> {
    felts: &'a [Felt],
    pos: usize,
}

impl<'a> FeltReader<'a> {
    #[must_use]
    pub fn new(felts: &'a [Felt]) -> Self {
        Self { felts, pos: 0 }
    }

    /// Next felt.
    ///
    /// # Errors
    ///
    /// Returns `KeeperError::DecodingError` when the input is exhausted.
    pub fn next_felt(&mut self) -> Result<Felt> {
        let felt = self.felts.get(self.pos).copied().ok_or_else(|| {
            KeeperError::DecodingError(format!(
                "unexpected end of input after {} felts",
                self.pos
            ))
        })?;
        self.pos += 1;
        Ok(felt)
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.felts.len() - self.pos
    }

    /// Ensures every felt was consumed.
    ///
    /// # Errors
    ///
    /// Returns `KeeperError::DecodingError` if trailing felts remain.
    pub fn finish(self) -> Result<()> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(KeeperError::DecodingError(format!("{n} trailing felts"))),
        }
    }
}

fn array_element(ty: &str) -> Option<&str> {
    ARRAY_PREFIXES
        .iter()
        .find_map(|prefix| ty.strip_prefix(prefix))
        .and_then(|rest| rest.strip_suffix('>'))
}

pub(super) fn decode(abi: &ContractAbi, ty: &str, reader: &mut FeltReader<'_>) -> Result<AbiValue> {
    if ty == "()" {
        return Ok(AbiValue::Unit);
    }

    if FELT_TYPES.contains(&ty) {
        return reader.next_felt().map(AbiValue::Felt);
    }

    if let Some(bits) = uint_bits(ty) {
        let felt = reader.next_felt()?;
        let value = codec::felt_to_u128(&felt)
            .map_err(|_| KeeperError::DecodingError(format!("{felt:#x} out of range for {ty}")))?;
        if bits < 128 && value >> bits != 0 {
            return Err(KeeperError::DecodingError(format!(
                "{value} out of range for {ty}"
            )));
        }
        return Ok(AbiValue::Uint(value));
    }

    if let Some(element) = array_element(ty) {
        let len_felt = reader.next_felt()?;
        let len = codec::felt_to_u64(&len_felt)
            .ok()
            .and_then(|l| usize::try_from(l).ok())
            .filter(|l| *l <= reader.remaining())
            .ok_or_else(|| {
                KeeperError::DecodingError(format!(
                    "array length {len_felt:#x} exceeds remaining input"
                ))
            })?;
        let items = (0..len)
            .map(|_| decode(abi, element, reader))
            .collect::<Result<Vec<_>>>()?;
        return Ok(AbiValue::Array(items));
    }

    if let Some(def) = abi.struct_def(ty) {
        let members = def
            .members
            .iter()
            .map(|m| Ok((m.name.clone(), decode(abi, &m.ty, reader)?)))
            .collect::<Result<Vec<_>>>()?;
        return Ok(AbiValue::Struct(members));
    }

    if let Some(def) = abi.enum_def(ty) {
        let index_felt = reader.next_felt()?;
        let variant = codec::felt_to_u64(&index_felt)
            .ok()
            .and_then(|i| usize::try_from(i).ok())
            .and_then(|i| def.variants.get(i))
            .ok_or_else(|| {
                KeeperError::DecodingError(format!(
                    "variant index {index_felt:#x} out of range for {ty}"
                ))
            })?;
        let value = decode(abi, &variant.ty, reader)?;
        return Ok(AbiValue::Enum {
            variant: variant.name.clone(),
            value: Box::new(value),
        });
    }

    Err(KeeperError::AbiError(format!("Unknown type '{ty}'")))
}
