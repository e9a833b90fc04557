//! Decoding of raw ledger records into due signals and obligations.
//!
//! The due event's selector is the keccak of its short name, which is how the
//! program's event enum serializes nested variants. Every other key position
//! and all data felts are decoded positionally from the ABI's member list.

use starknet::core::types::Felt;
use starknet::core::utils::get_selector_from_name;
use std::sync::Arc;

use crate::abi::{short_name, AbiEventMember, AbiValue, ContractAbi, EventMemberKind, FeltReader};
use crate::types::{DueSignal, Obligation, ObligationId, RawEvent};
use crate::utils::error::{KeeperError, Result};

/// Short name of the event the program emits for each payable obligation.
pub const DUE_EVENT: &str = "DuePayment";

/// View function returning one obligation.
pub const GET_OBLIGATION_ENTRYPOINT: &str = "get_subscription";

/// A record that matched the due-event selector but failed to decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeFailure {
    pub transaction_hash: Felt,
    pub block_number: Option<u64>,
    pub error: String,
}

/// Result of decoding a batch of raw records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeReport {
    pub signals: Vec<DueSignal>,
    pub failures: Vec<DecodeFailure>,
    /// Records carrying a different selector.
    pub ignored: usize,
}

/// Decodes `DuePayment` records.
#[derive(Debug, Clone)]
pub struct DueEventDecoder {
    abi: Arc<ContractAbi>,
    event_name: String,
    selector: Felt,
    members: Vec<AbiEventMember>,
}

impl DueEventDecoder {
    /// Resolves the due event in `abi` and computes its selector.
    ///
    /// # Errors
    ///
    /// Returns `KeeperError::AbiError` if the event is missing, is not a
    /// struct event, or has members with an unsupported kind.
    pub fn new(abi: Arc<ContractAbi>) -> Result<Self> {
        let (event_name, members) = abi.struct_event(DUE_EVENT)?;
        let event_name = event_name.to_string();
        let members = members.to_vec();

        if let Some(m) = members
            .iter()
            .find(|m| !matches!(m.kind, EventMemberKind::Key | EventMemberKind::Data))
        {
            return Err(KeeperError::AbiError(format!(
                "Member '{}' of '{event_name}' has unsupported kind {:?}",
                m.name, m.kind
            )));
        }

        let selector = get_selector_from_name(short_name(&event_name))
            .map_err(|e| KeeperError::AbiError(format!("Invalid event name '{event_name}': {e}")))?;

        Ok(Self {
            abi,
            event_name,
            selector,
            members,
        })
    }

    #[must_use]
    pub fn selector(&self) -> Felt {
        self.selector
    }

    #[must_use]
    pub fn event_name(&self) -> &str {
        &self.event_name
    }

    /// Key filter for the event query: the selector in position zero.
    #[must_use]
    pub fn key_filter(&self) -> Vec<Vec<Felt>> {
        vec![vec![self.selector]]
    }

    /// Decodes one record. `Ok(None)` if the record is a different event.
    ///
    /// # Errors
    ///
    /// Returns `KeeperError::DecodingError` if a matching record does not
    /// fit the ABI layout exactly.
    pub fn decode(&self, raw: &RawEvent) -> Result<Option<DueSignal>> {
        match raw.keys.first() {
            Some(selector) if *selector == self.selector => {}
            _ => return Ok(None),
        }

        let mut keys = FeltReader::new(&raw.keys[1..]);
        let mut data = FeltReader::new(&raw.data);
        let mut id = None;
        let mut time = None;

        for member in &self.members {
            let reader = match member.kind {
                EventMemberKind::Key => &mut keys,
                _ => &mut data,
            };
            let value = self.abi.decode(&member.ty, reader)?;
            match member.name.as_str() {
                "id" => id = Some(value),
                "time" => time = Some(value),
                _ => {}
            }
        }
        keys.finish()?;
        data.finish()?;

        let id = id
            .as_ref()
            .and_then(AbiValue::as_u256)
            .ok_or_else(|| KeeperError::DecodingError("missing or invalid 'id'".to_string()))?;
        let time = time
            .as_ref()
            .and_then(AbiValue::as_u64)
            .ok_or_else(|| KeeperError::DecodingError("missing or invalid 'time'".to_string()))?;

        Ok(Some(DueSignal::from_event(ObligationId(id), time, raw)))
    }

    /// Decodes a batch, isolating failures per record and preserving order.
    #[must_use]
    pub fn decode_all(&self, records: &[RawEvent]) -> DecodeReport {
        let mut report = DecodeReport::default();

        for raw in records {
            match self.decode(raw) {
                Ok(Some(signal)) => report.signals.push(signal),
                Ok(None) => report.ignored += 1,
                Err(e) => {
                    tracing::warn!(
                        tx = %format!("{:#x}", raw.transaction_hash),
                        block = ?raw.block_number,
                        error = %e,
                        "Skipping malformed {} record",
                        DUE_EVENT
                    );
                    report.failures.push(DecodeFailure {
                        transaction_hash: raw.transaction_hash,
                        block_number: raw.block_number,
                        error: e.to_string(),
                    });
                }
            }
        }

        report
    }
}

/// Decodes the return data of `get_subscription` into an [`Obligation`].
///
/// # Errors
///
/// Returns `KeeperError::DecodingError` if the data does not match the
/// function's declared output.
pub fn decode_obligation(abi: &ContractAbi, felts: &[Felt]) -> Result<Obligation> {
    let outputs = abi.decode_outputs(GET_OBLIGATION_ENTRYPOINT, felts)?;
    let record = outputs
        .first()
        .ok_or_else(|| KeeperError::DecodingError("empty obligation record".to_string()))?;

    let missing = |field: &str| KeeperError::DecodingError(format!("obligation field '{field}'"));
    let felt = |field: &str| {
        record
            .field(field)
            .and_then(AbiValue::as_felt)
            .ok_or_else(|| missing(field))
    };
    let u256 = |field: &str| {
        record
            .field(field)
            .and_then(AbiValue::as_u256)
            .ok_or_else(|| missing(field))
    };
    let seconds = |field: &str| {
        record
            .field(field)
            .and_then(AbiValue::as_u64)
            .ok_or_else(|| missing(field))
    };

    Ok(Obligation {
        id: ObligationId(u256("id")?),
        payer: felt("user")?,
        payee: felt("recipient")?,
        amount: u256("amount")?,
        asset: felt("token_address")?,
        periodicity: seconds("periodicity")?,
        expiry: seconds("expires_on")?,
        last_payment: seconds("last_payment")?,
        active: record
            .field("is_active")
            .and_then(AbiValue::as_bool)
            .ok_or_else(|| missing("is_active"))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use primitive_types::U256;

    fn decoder() -> DueEventDecoder {
        DueEventDecoder::new(Arc::new(ContractAbi::bundled().unwrap())).unwrap()
    }

    fn due_record(decoder: &DueEventDecoder, data: Vec<Felt>) -> RawEvent {
        RawEvent {
            from_address: Felt::from(0x99u64),
            keys: vec![decoder.selector()],
            data,
            block_number: Some(1000),
            transaction_hash: Felt::from(0xabcu64),
        }
    }

    #[test]
    fn test_selector_is_short_name_keccak() {
        let decoder = decoder();
        assert_eq!(
            decoder.selector(),
            get_selector_from_name("DuePayment").unwrap()
        );
        assert_eq!(decoder.key_filter(), vec![vec![decoder.selector()]]);
    }

    #[test]
    fn test_decode_due_payment() {
        let decoder = decoder();
        let raw = due_record(
            &decoder,
            vec![Felt::from(42u64), Felt::ZERO, Felt::from(1_700_000_000u64)],
        );

        let signal = decoder.decode(&raw).unwrap().unwrap();
        assert_eq!(signal.obligation_id, ObligationId::from(42u64));
        assert_eq!(signal.time, Some(1_700_000_000));
        assert_eq!(signal.block_number(), Some(1000));
    }

    #[test]
    fn test_decode_wide_id() {
        let decoder = decoder();
        let raw = due_record(&decoder, vec![Felt::from(1u64), Felt::from(2u64), Felt::ONE]);
        let signal = decoder.decode(&raw).unwrap().unwrap();
        assert_eq!(signal.obligation_id.0, (U256::from(2u64) << 128) + 1);
    }

    #[test]
    fn test_other_selector_ignored() {
        let decoder = decoder();
        let mut raw = due_record(&decoder, vec![]);
        raw.keys = vec![get_selector_from_name("SubscriptionCreated").unwrap()];
        assert_eq!(decoder.decode(&raw).unwrap(), None);
    }

    #[test]
    fn test_one_good_one_malformed() {
        let decoder = decoder();
        let good = due_record(&decoder, vec![Felt::from(7u64), Felt::ZERO, Felt::ONE]);
        let short = due_record(&decoder, vec![Felt::from(8u64)]);

        let report = decoder.decode_all(&[short, good]);
        assert_eq!(report.signals.len(), 1);
        assert_eq!(report.signals[0].obligation_id, ObligationId::from(7u64));
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.ignored, 0);
    }

    #[test]
    fn test_trailing_data_rejected() {
        let decoder = decoder();
        let raw = due_record(
            &decoder,
            vec![Felt::from(7u64), Felt::ZERO, Felt::ONE, Felt::ONE],
        );
        assert!(matches!(
            decoder.decode(&raw),
            Err(KeeperError::DecodingError(_))
        ));
    }

    #[test]
    fn test_decode_obligation() {
        let abi = ContractAbi::bundled().unwrap();
        let felts: Vec<Felt> = [
            42u64,      // id.low
            0,          // id.high
            0x111,      // user
            0x222,      // recipient
            500,        // amount.low
            0,          // amount.high
            0x333,      // token_address
            86_400,     // periodicity
            2_000_000,  // expires_on
            1_000_000,  // last_payment
            1,          // is_active = True
        ]
        .into_iter()
        .map(Felt::from)
        .collect();

        let obligation = decode_obligation(&abi, &felts).unwrap();
        assert_eq!(obligation.id, ObligationId::from(42u64));
        assert_eq!(obligation.payee, Felt::from(0x222u64));
        assert_eq!(obligation.amount, U256::from(500u64));
        assert_eq!(obligation.periodicity, 86_400);
        assert!(obligation.active);
    }
}
