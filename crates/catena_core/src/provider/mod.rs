//! # Chain Provider Seam
//!
//! The only way the binding talks to a chain. Everything above this trait is
//! chain-agnostic; implementations are [`crate::ipc::IpcProvider`] for a
//! local node and `ChainSimulator` (behind the `simulator` feature) for tests.
//!
//! ## Quantities
//!
//! JSON-RPC carries numbers as `0x`-prefixed hex strings. The helpers at the
//! bottom of this module are the single place those are parsed and printed.

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use thiserror::Error;

/// Errors reported by a provider round-trip.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Failed to connect to the node.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The IPC socket file does not exist.
    #[error("socket not found: {0}")]
    SocketNotFound(String),

    /// The request did not complete in time.
    #[error("operation timed out")]
    Timeout,

    /// The node answered with something that is not a valid response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The node rejected the request, reverts included.
    #[error("rpc error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// Error message from the node.
        message: String,
    },

    /// Socket I/O failure.
    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ProviderError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => Self::SocketNotFound(e.to_string()),
            std::io::ErrorKind::TimedOut => Self::Timeout,
            _ => Self::Io(e.to_string()),
        }
    }
}

/// Result type for provider calls.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// A log entry emitted by a transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Log {
    /// Emitting contract.
    pub address: Address,
    /// Indexed topics; `topics[0]` is the event signature hash.
    pub topics: Vec<B256>,
    /// Non-indexed data.
    pub data: Bytes,
    /// Block the log was mined in.
    pub block_number: Option<u64>,
    /// Transaction that emitted the log.
    pub transaction_hash: Option<B256>,
    /// Position in the block.
    pub log_index: Option<u64>,
}

/// A mined transaction's receipt.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransactionReceipt {
    /// Transaction id the receipt belongs to.
    pub transaction_hash: B256,
    /// Block number, `None` while pending.
    pub block_number: Option<u64>,
    /// Block hash, `None` while pending.
    pub block_hash: Option<B256>,
    /// Execution status, when the node reports one.
    pub status: Option<bool>,
    /// Emitted logs.
    pub logs: Vec<Log>,
}

/// Block header fields the binding needs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Block {
    /// Block number.
    pub number: u64,
    /// Block hash.
    pub hash: B256,
    /// Unix timestamp in seconds.
    pub timestamp: u64,
}

/// A read-only call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallRequest {
    /// Caller, if the call depends on it.
    pub from: Option<Address>,
    /// Contract.
    pub to: Address,
    /// ABI-encoded call.
    pub data: Bytes,
}

/// A transaction for a node-managed account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionRequest {
    /// Sender.
    pub from: Address,
    /// Contract.
    pub to: Address,
    /// ABI-encoded call.
    pub data: Bytes,
    /// Value in wei.
    pub value: U256,
    /// Gas limit; the node estimates when absent.
    pub gas: Option<u64>,
    /// Gas price in wei; the node picks when absent.
    pub gas_price: Option<u128>,
    /// Nonce; the node assigns when absent.
    pub nonce: Option<u64>,
}

impl TransactionRequest {
    /// Creates a zero-value request with node-chosen gas and nonce.
    #[must_use]
    pub fn new(from: Address, to: Address, data: Bytes) -> Self {
        Self {
            from,
            to,
            data,
            value: U256::ZERO,
            gas: None,
            gas_price: None,
            nonce: None,
        }
    }
}

/// Filter for `eth_getLogs`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogFilter {
    /// Emitting contract.
    pub address: Address,
    /// Event signature hash.
    pub topic0: Option<B256>,
    /// First block, inclusive.
    pub from_block: u64,
    /// Last block, inclusive; `None` means latest.
    pub to_block: Option<u64>,
}

/// Async access to an Ethereum-compatible node.
#[async_trait]
pub trait ChainProvider: Send + Sync {
    /// `net_version`.
    async fn network_id(&self) -> ProviderResult<String>;

    /// `eth_accounts`.
    async fn accounts(&self) -> ProviderResult<Vec<Address>>;

    /// `eth_gasPrice`.
    async fn gas_price(&self) -> ProviderResult<u128>;

    /// `eth_getTransactionCount` against the pending block.
    async fn transaction_count(&self, address: Address) -> ProviderResult<u64>;

    /// `eth_estimateGas`.
    async fn estimate_gas(&self, request: &TransactionRequest) -> ProviderResult<u64>;

    /// `eth_call` against the latest block.
    async fn call(&self, request: &CallRequest) -> ProviderResult<Bytes>;

    /// `eth_sendTransaction`. Returns once the node accepted the transaction.
    async fn send_transaction(&self, request: &TransactionRequest) -> ProviderResult<B256>;

    /// `eth_getTransactionReceipt`. `None` while the transaction is unknown or pending.
    async fn transaction_receipt(&self, tx_id: B256)
        -> ProviderResult<Option<TransactionReceipt>>;

    /// `eth_getBlockByNumber`.
    async fn block_by_number(&self, number: u64) -> ProviderResult<Option<Block>>;

    /// `eth_blockNumber`.
    async fn block_number(&self) -> ProviderResult<u64>;

    /// `eth_getLogs`.
    async fn logs(&self, filter: &LogFilter) -> ProviderResult<Vec<Log>>;
}

/// Formats a quantity as `0x`-prefixed lowercase hex.
#[inline]
#[must_use]
pub fn format_quantity(value: impl Into<u128>) -> String {
    format!("0x{:x}", value.into())
}

/// Parses a `0x`-prefixed hex quantity into a `u64`.
///
/// # Errors
///
/// Fails with `InvalidResponse` on missing prefix or bad digits.
pub fn parse_quantity(value: &str) -> ProviderResult<u64> {
    let digits = strip_hex_prefix(value)?;
    u64::from_str_radix(digits, 16)
        .map_err(|e| ProviderError::InvalidResponse(format!("bad quantity {value}: {e}")))
}

/// Parses a `0x`-prefixed hex quantity into a `u128`.
///
/// # Errors
///
/// Fails with `InvalidResponse` on missing prefix or bad digits.
pub fn parse_quantity_u128(value: &str) -> ProviderResult<u128> {
    let digits = strip_hex_prefix(value)?;
    u128::from_str_radix(digits, 16)
        .map_err(|e| ProviderError::InvalidResponse(format!("bad quantity {value}: {e}")))
}

fn strip_hex_prefix(value: &str) -> ProviderResult<&str> {
    value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .filter(|digits| !digits.is_empty())
        .ok_or_else(|| ProviderError::InvalidResponse(format!("not a hex quantity: {value}")))
}
