//! Ledger gateway: the keeper's only view of the network.
//!
//! [`LedgerGateway`] is the seam every pipeline stage talks through.
//! [`StarknetGateway`] implements it over Starknet JSON-RPC with a single-owner
//! account for signing; tests substitute in-memory gateways.

use async_trait::async_trait;
use starknet::accounts::{Account, ConnectedAccount, ExecutionEncoding, SingleOwnerAccount};
use starknet::core::types::{
    BlockId, BlockTag, Call, EventFilter, ExecutionResult, Felt, FunctionCall, StarknetError,
    TransactionExecutionStatus, TransactionStatus,
};
use starknet::core::utils::get_selector_from_name;
use starknet::providers::jsonrpc::HttpTransport;
use starknet::providers::{JsonRpcClient, Provider, ProviderError, Url};
use starknet::signers::{LocalWallet, SigningKey};
use std::time::Duration;
use tokio::sync::Mutex;

use crate::core::codec::felt_to_u128;
use crate::core::window::BlockWindow;
use crate::types::{EventsPage, RawEvent};
use crate::utils::error::{KeeperError, Result};

/// Parameters of one paginated event query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventQuery {
    /// Emitting contract.
    pub address: Felt,
    pub window: BlockWindow,
    pub page_size: u64,
    /// Key filter, one slot per key position.
    pub keys: Vec<Vec<Felt>>,
}

/// Terminal ledger state of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalStatus {
    Succeeded,
    /// Included in a block but execution reverted.
    Reverted { reason: String },
    /// Never included.
    Rejected,
}

/// Abstract ledger access used by the keeper pipeline.
///
/// Implementations must be shareable across tasks; they are built once at
/// startup and never mutated afterwards.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// Current chain head block number.
    async fn get_chain_head(&self) -> Result<u64>;

    /// One page of events matching `query`; `continuation_token = None` asks for the first page.
    async fn get_events(
        &self,
        query: &EventQuery,
        continuation_token: Option<String>,
    ) -> Result<EventsPage>;

    /// Read-only call of a contract entrypoint.
    async fn call(&self, contract: Felt, entrypoint: &str, calldata: &[Felt]) -> Result<Vec<Felt>>;

    /// Expected execution cost of invoking `entrypoint`, in the fee token's base unit.
    async fn estimate_fee(&self, contract: Felt, entrypoint: &str, calldata: &[Felt])
        -> Result<u128>;

    /// Signs and submits an invocation capped at `fee_ceiling`. Returns the transaction hash.
    async fn invoke(
        &self,
        contract: Felt,
        entrypoint: &str,
        calldata: &[Felt],
        fee_ceiling: u128,
    ) -> Result<Felt>;

    /// Blocks until `tx` reaches a terminal state.
    async fn wait_for_confirmation(&self, tx: Felt) -> Result<TerminalStatus>;
}

fn selector(entrypoint: &str) -> Result<Felt> {
    get_selector_from_name(entrypoint)
        .map_err(|e| KeeperError::EncodingError(format!("invalid entrypoint '{entrypoint}': {e}")))
}

fn provider_error(err: ProviderError) -> KeeperError {
    match err {
        ProviderError::Other(inner) => KeeperError::ConnectionError(inner.to_string()),
        ProviderError::RateLimited => KeeperError::RpcError("rate limited".to_string()),
        other => KeeperError::RpcError(other.to_string()),
    }
}

/// Connection settings for [`StarknetGateway`].
#[derive(Debug, Clone)]
pub struct StarknetGatewayOptions {
    /// Delay between confirmation polls.
    pub poll_interval: Duration,
    /// Upper bound on a single confirmation wait.
    pub confirmation_timeout: Duration,
}

impl Default for StarknetGatewayOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            confirmation_timeout: Duration::from_secs(120),
        }
    }
}

/// [`LedgerGateway`] over Starknet JSON-RPC.
///
/// The account nonce is tracked locally: fetched on first use, advanced on
/// every accepted submission and re-read after a rejected one.
pub struct StarknetGateway {
    account: SingleOwnerAccount<JsonRpcClient<HttpTransport>, LocalWallet>,
    options: StarknetGatewayOptions,
    next_nonce: Mutex<Option<Felt>>,
}

impl StarknetGateway {
    /// Connects to `rpc_url`, reads the chain id and binds the signing account.
    ///
    /// # Errors
    ///
    /// Returns `KeeperError::ConfigError` for an unparsable URL and
    /// `KeeperError::RpcError`/`ConnectionError` if the chain id cannot be read.
    pub async fn connect(
        rpc_url: &str,
        account_address: Felt,
        private_key: Felt,
        options: StarknetGatewayOptions,
    ) -> Result<Self> {
        let url = Url::parse(rpc_url)
            .map_err(|e| KeeperError::ConfigError(format!("Invalid RPC URL: {e}")))?;
        let provider = JsonRpcClient::new(HttpTransport::new(url));
        let chain_id = provider.chain_id().await.map_err(provider_error)?;

        let signer = LocalWallet::from(SigningKey::from_secret_scalar(private_key));
        let mut account = SingleOwnerAccount::new(
            provider,
            signer,
            account_address,
            chain_id,
            ExecutionEncoding::New,
        );
        account.set_block_id(BlockId::Tag(BlockTag::Pending));

        tracing::debug!(chain_id = %format!("{chain_id:#x}"), "Connected to ledger");

        Ok(Self {
            account,
            options,
            next_nonce: Mutex::new(None),
        })
    }

    fn provider(&self) -> &JsonRpcClient<HttpTransport> {
        self.account.provider()
    }

    async fn revert_reason(&self, tx: Felt) -> String {
        match self.provider().get_transaction_receipt(tx).await {
            Ok(receipt) => match receipt.receipt.execution_result() {
                ExecutionResult::Reverted { reason } => reason.clone(),
                ExecutionResult::Succeeded => "reverted".to_string(),
            },
            Err(e) => format!("reverted (receipt unavailable: {e})"),
        }
    }

    async fn poll_status(&self, tx: Felt) -> Result<TerminalStatus> {
        loop {
            match self.provider().get_transaction_status(tx).await {
                Ok(TransactionStatus::Received) => {}
                Ok(TransactionStatus::Rejected) => return Ok(TerminalStatus::Rejected),
                Ok(
                    TransactionStatus::AcceptedOnL2(exec) | TransactionStatus::AcceptedOnL1(exec),
                ) => {
                    return Ok(match exec {
                        TransactionExecutionStatus::Succeeded => TerminalStatus::Succeeded,
                        TransactionExecutionStatus::Reverted => TerminalStatus::Reverted {
                            reason: self.revert_reason(tx).await,
                        },
                    });
                }
                // The node may not have seen the transaction yet.
                Err(ProviderError::StarknetError(StarknetError::TransactionHashNotFound)) => {}
                Err(e) => return Err(KeeperError::ConfirmationFailed(e.to_string())),
            }
            tokio::time::sleep(self.options.poll_interval).await;
        }
    }
}

#[async_trait]
impl LedgerGateway for StarknetGateway {
    async fn get_chain_head(&self) -> Result<u64> {
        self.provider().block_number().await.map_err(provider_error)
    }

    async fn get_events(
        &self,
        query: &EventQuery,
        continuation_token: Option<String>,
    ) -> Result<EventsPage> {
        let filter = EventFilter {
            from_block: Some(BlockId::Number(query.window.from_block)),
            to_block: Some(BlockId::Number(query.window.to_block)),
            address: Some(query.address),
            keys: Some(query.keys.clone()),
        };

        let page = self
            .provider()
            .get_events(filter, continuation_token, query.page_size)
            .await
            .map_err(provider_error)?;

        Ok(EventsPage {
            events: page
                .events
                .into_iter()
                .map(|event| RawEvent {
                    from_address: event.from_address,
                    keys: event.keys,
                    data: event.data,
                    block_number: event.block_number,
                    transaction_hash: event.transaction_hash,
                })
                .collect(),
            continuation_token: page.continuation_token,
        })
    }

    async fn call(&self, contract: Felt, entrypoint: &str, calldata: &[Felt]) -> Result<Vec<Felt>> {
        let request = FunctionCall {
            contract_address: contract,
            entry_point_selector: selector(entrypoint)?,
            calldata: calldata.to_vec(),
        };
        self.provider()
            .call(request, BlockId::Tag(BlockTag::Latest))
            .await
            .map_err(provider_error)
    }

    async fn estimate_fee(
        &self,
        contract: Felt,
        entrypoint: &str,
        calldata: &[Felt],
    ) -> Result<u128> {
        let call = Call {
            to: contract,
            selector: selector(entrypoint)?,
            calldata: calldata.to_vec(),
        };
        let estimate = self
            .account
            .execute_v1(vec![call])
            .estimate_fee()
            .await
            .map_err(|e| KeeperError::EstimationFailed(e.to_string()))?;

        felt_to_u128(&estimate.overall_fee)
            .map_err(|e| KeeperError::EstimationFailed(e.to_string()))
    }

    async fn invoke(
        &self,
        contract: Felt,
        entrypoint: &str,
        calldata: &[Felt],
        fee_ceiling: u128,
    ) -> Result<Felt> {
        let call = Call {
            to: contract,
            selector: selector(entrypoint)?,
            calldata: calldata.to_vec(),
        };

        // Held until the ledger answers, so submissions leave in nonce order.
        let mut next_nonce = self.next_nonce.lock().await;
        let nonce = match *next_nonce {
            Some(nonce) => nonce,
            None => self.account.get_nonce().await.map_err(|e| {
                KeeperError::SubmissionFailed(format!("account nonce unavailable: {e}"))
            })?,
        };

        match self
            .account
            .execute_v1(vec![call])
            .nonce(nonce)
            .max_fee(Felt::from(fee_ceiling))
            .send()
            .await
        {
            Ok(result) => {
                *next_nonce = Some(nonce + Felt::ONE);
                Ok(result.transaction_hash)
            }
            Err(e) => {
                *next_nonce = None;
                Err(KeeperError::SubmissionFailed(e.to_string()))
            }
        }
    }

    async fn wait_for_confirmation(&self, tx: Felt) -> Result<TerminalStatus> {
        tokio::time::timeout(self.options.confirmation_timeout, self.poll_status(tx))
            .await
            .map_err(|_| {
                KeeperError::ConfirmationFailed(format!(
                    "{tx:#x} not terminal after {}s",
                    self.options.confirmation_timeout.as_secs()
                ))
            })?
    }
}
