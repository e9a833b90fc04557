//! Process-wide keeper context, built once at startup.

use starknet::core::types::Felt;
use std::sync::Arc;

use crate::abi::ContractAbi;
use crate::config::KeeperConfig;
use crate::core::decoder::{decode_obligation, GET_OBLIGATION_ENTRYPOINT};
use crate::core::dispatcher::{Dispatcher, SubmitLock};
use crate::types::{Obligation, ObligationId};
use crate::utils::error::Result;
use crate::utils::retry::RetryingGateway;
use crate::utils::rpc::{LedgerGateway, StarknetGateway, StarknetGatewayOptions};

/// Gateway, contract binding, ABI and configuration shared by every task.
///
/// Immutable after construction; tasks hold it behind an `Arc`.
#[derive(Clone)]
pub struct KeeperContext {
    pub gateway: Arc<dyn LedgerGateway>,
    pub contract: Felt,
    pub abi: Arc<ContractAbi>,
    pub config: KeeperConfig,
    /// Held across every `invoke` signed by the account.
    pub submit_lock: SubmitLock,
}

impl KeeperContext {
    /// Assembles a context around an existing gateway.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured ABI cannot be loaded.
    pub fn new(gateway: Arc<dyn LedgerGateway>, config: KeeperConfig) -> Result<Self> {
        let abi = ContractAbi::load(config.abi_path.as_deref())?;
        Ok(Self {
            gateway,
            contract: config.contract_address,
            abi: Arc::new(abi),
            config,
            submit_lock: SubmitLock::default(),
        })
    }

    /// Connects a Starknet gateway wrapped in read retries.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is unreachable, the URL is invalid or
    /// the ABI cannot be loaded.
    pub async fn connect(config: KeeperConfig) -> Result<Self> {
        let options = StarknetGatewayOptions {
            confirmation_timeout: config.confirmation_timeout,
            ..StarknetGatewayOptions::default()
        };
        let raw = StarknetGateway::connect(
            &config.rpc_url,
            config.account_address,
            config.private_key,
            options,
        )
        .await?;
        let gateway: Arc<dyn LedgerGateway> = Arc::new(RetryingGateway::new(raw, config.retry));
        Self::new(gateway, config)
    }

    /// Dispatcher bound to this context's contract and settings.
    #[must_use]
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.gateway.clone(), self.contract)
            .with_fee_margin_percent(self.config.fee_margin_percent)
            .with_concurrency(self.config.dispatch_concurrency)
            .with_submit_lock(self.submit_lock.clone())
    }

    /// Reads an obligation record for diagnostics.
    ///
    /// # Errors
    ///
    /// Propagates gateway and decoding errors.
    pub async fn read_obligation(&self, id: ObligationId) -> Result<Obligation> {
        let felts = self
            .gateway
            .call(self.contract, GET_OBLIGATION_ENTRYPOINT, &id.to_calldata())
            .await?;
        decode_obligation(&self.abi, &felts)
    }
}
