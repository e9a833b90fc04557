//! Due-query source: asks the program for every payable obligation id.

use async_trait::async_trait;
use starknet::core::types::Felt;
use std::sync::Arc;

use super::DueSource;
use crate::abi::{AbiValue, ContractAbi};
use crate::core::context::KeeperContext;
use crate::types::{DueSignal, ObligationId};
use crate::utils::error::{KeeperError, Result};
use crate::utils::rpc::LedgerGateway;

/// View function returning `Array<u256>` of payable obligation ids.
pub const DUE_QUERY_ENTRYPOINT: &str = "get_all_subscription_that_must_be_payed_ids";

/// Polls the program's payable-ids view. Bypasses event decoding entirely.
pub struct DueQuerySource {
    gateway: Arc<dyn LedgerGateway>,
    contract: Felt,
    abi: Arc<ContractAbi>,
}

impl DueQuerySource {
    #[must_use]
    pub fn new(ctx: &KeeperContext) -> Self {
        Self {
            gateway: ctx.gateway.clone(),
            contract: ctx.contract,
            abi: ctx.abi.clone(),
        }
    }
}

/// Decodes the view's return data into ids.
///
/// # Errors
///
/// Returns `KeeperError::DecodingError` if the data is not an array of `u256`.
pub fn decode_due_ids(abi: &ContractAbi, felts: &[Felt]) -> Result<Vec<ObligationId>> {
    let outputs = abi.decode_outputs(DUE_QUERY_ENTRYPOINT, felts)?;
    let items = outputs
        .first()
        .and_then(AbiValue::as_array)
        .ok_or_else(|| KeeperError::DecodingError("expected an id array".to_string()))?;

    items
        .iter()
        .map(|item| {
            item.as_u256()
                .map(ObligationId)
                .ok_or_else(|| KeeperError::DecodingError("id is not a u256".to_string()))
        })
        .collect()
}

#[async_trait]
impl DueSource for DueQuerySource {
    async fn next_batch(&mut self) -> Result<Vec<DueSignal>> {
        let felts = self
            .gateway
            .call(self.contract, DUE_QUERY_ENTRYPOINT, &[])
            .await?;
        let ids = decode_due_ids(&self.abi, &felts)?;
        tracing::debug!(count = ids.len(), "Due query returned");
        Ok(ids.into_iter().map(DueSignal::queried).collect())
    }

    fn source_name(&self) -> &str {
        "due-query"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_due_ids() {
        let abi = ContractAbi::bundled().unwrap();
        let felts: Vec<Felt> = [3u64, 3, 0, 7, 0, 9, 0].into_iter().map(Felt::from).collect();

        let ids = decode_due_ids(&abi, &felts).unwrap();
        assert_eq!(
            ids,
            vec![
                ObligationId::from(3u64),
                ObligationId::from(7u64),
                ObligationId::from(9u64)
            ]
        );
    }

    #[test]
    fn test_decode_empty_array() {
        let abi = ContractAbi::bundled().unwrap();
        assert!(decode_due_ids(&abi, &[Felt::ZERO]).unwrap().is_empty());
    }

    #[test]
    fn test_decode_truncated() {
        let abi = ContractAbi::bundled().unwrap();
        let felts = [Felt::from(2u64), Felt::ONE, Felt::ZERO];
        assert!(matches!(
            decode_due_ids(&abi, &felts),
            Err(KeeperError::DecodingError(_))
        ));
    }
}
