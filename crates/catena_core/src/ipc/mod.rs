//! # IPC (Unix Socket) Provider
//!
//! JSON-RPC 2.0 against a local node over its Unix socket. No HTTP, no
//! websocket: one connection per request, one newline-terminated JSON
//! document each way.
//!
//! ## Default Paths
//!
//! - Geth: `~/.ethereum/geth.ipc`
//! - Reth: `~/.local/share/reth/mainnet/reth.ipc`
//! - Anvil: `/tmp/anvil.ipc` (with `--ipc` flag)

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use alloy_primitives::{Address, Bytes, B256};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use crate::config::ProviderSection;
use crate::provider::{
    format_quantity, parse_quantity, parse_quantity_u128, Block, CallRequest, ChainProvider, Log,
    LogFilter, ProviderError, ProviderResult, TransactionReceipt, TransactionRequest,
};

/// IPC connection configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IpcConfig {
    /// Path to the IPC socket file.
    pub socket_path: String,
    /// Limit for one request, connect included.
    pub request_timeout: Duration,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self::geth()
    }
}

impl IpcConfig {
    /// Creates config for Geth.
    #[must_use]
    pub fn geth() -> Self {
        Self {
            socket_path: format!("{}/.ethereum/geth.ipc", std::env::var("HOME").unwrap_or_default()),
            request_timeout: Duration::from_secs(5),
        }
    }

    /// Creates config for Reth.
    #[must_use]
    pub fn reth() -> Self {
        Self {
            socket_path: format!(
                "{}/.local/share/reth/mainnet/reth.ipc",
                std::env::var("HOME").unwrap_or_default()
            ),
            ..Self::geth()
        }
    }

    /// Creates config for local Anvil (testing).
    #[must_use]
    pub fn anvil() -> Self {
        Self {
            socket_path: "/tmp/anvil.ipc".to_string(),
            ..Self::geth()
        }
    }

    /// Sets a custom socket path.
    #[must_use]
    pub fn with_socket_path(mut self, path: impl Into<String>) -> Self {
        self.socket_path = path.into();
        self
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl From<&ProviderSection> for IpcConfig {
    fn from(section: &ProviderSection) -> Self {
        let config = Self::geth().with_request_timeout(section.request_timeout());
        match &section.ipc_path {
            Some(path) => config.with_socket_path(path.clone()),
            None => config,
        }
    }
}

/// Statistics for the IPC provider.
#[derive(Debug, Default)]
pub struct IpcStats {
    /// Requests written to the socket.
    pub requests_sent: AtomicU64,
    /// Responses read back, errors included.
    pub responses_received: AtomicU64,
    /// Responses carrying a JSON-RPC error.
    pub rpc_errors: AtomicU64,
    /// Connect, I/O or timeout failures.
    pub connection_errors: AtomicU64,
    /// Average round-trip latency (µs).
    pub avg_latency_us: AtomicU64,
    /// Maximum observed round-trip latency (µs).
    pub max_latency_us: AtomicU64,
}

impl IpcStats {
    fn record_latency(&self, latency: Duration) {
        let latency_us = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        let count = self.responses_received.fetch_add(1, Ordering::Relaxed) + 1;

        let _ = self
            .max_latency_us
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                (latency_us > current).then_some(latency_us)
            });

        let current_avg = self.avg_latency_us.load(Ordering::Relaxed);
        let new_avg = if count == 1 {
            latency_us
        } else {
            // Weighted average favoring recent values
            (current_avg * 7 + latency_us) / 8
        };
        self.avg_latency_us.store(new_avg, Ordering::Relaxed);
    }
}

/// Provider for a local node's IPC socket.
///
/// ```rust,ignore
/// let provider = IpcProvider::new(IpcConfig::anvil());
/// let latency = provider.test_connection().await?;
/// let client = CatenaClient::new(Arc::new(provider), ledger, CatenaConfig::default());
/// ```
pub struct IpcProvider {
    config: IpcConfig,
    next_id: AtomicU64,
    stats: Arc<IpcStats>,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

impl IpcProvider {
    /// Creates a provider. Nothing is connected until the first request.
    #[must_use]
    pub fn new(config: IpcConfig) -> Self {
        Self {
            config,
            next_id: AtomicU64::new(1),
            stats: Arc::new(IpcStats::default()),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &IpcConfig {
        &self.config
    }

    /// Returns a reference to the statistics.
    #[must_use]
    pub fn stats(&self) -> Arc<IpcStats> {
        Arc::clone(&self.stats)
    }

    /// Sends `eth_blockNumber` and returns the round-trip latency.
    ///
    /// # Errors
    ///
    /// Any connection or response error.
    pub async fn test_connection(&self) -> ProviderResult<Duration> {
        let start = Instant::now();
        let _: String = self.request("eth_blockNumber", json!([])).await?;
        Ok(start.elapsed())
    }

    /// Performs one JSON-RPC request and deserializes its result.
    ///
    /// # Errors
    ///
    /// - `Timeout` when the configured request timeout elapses
    /// - `Rpc` when the node answers with an error object
    /// - `InvalidResponse` when the answer is not the expected shape
    pub async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> ProviderResult<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let start = Instant::now();
        let line = match tokio::time::timeout(self.config.request_timeout, self.round_trip(&payload)).await {
            Ok(Ok(line)) => line,
            Ok(Err(e)) => {
                self.stats.connection_errors.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
            Err(_) => {
                self.stats.connection_errors.fetch_add(1, Ordering::Relaxed);
                return Err(ProviderError::Timeout);
            }
        };
        self.stats.record_latency(start.elapsed());

        let response: RpcResponse = serde_json::from_str(&line)
            .map_err(|e| ProviderError::InvalidResponse(format!("{method}: {e}")))?;
        if let Some(error) = response.error {
            self.stats.rpc_errors.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(method, code = error.code, message = %error.message, "rpc error");
            return Err(ProviderError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        serde_json::from_value(response.result.unwrap_or(Value::Null))
            .map_err(|e| ProviderError::InvalidResponse(format!("{method}: {e}")))
    }

    async fn round_trip(&self, payload: &Value) -> ProviderResult<String> {
        let mut stream = UnixStream::connect(&self.config.socket_path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    ProviderError::SocketNotFound(self.config.socket_path.clone())
                }
                _ => ProviderError::ConnectionFailed(e.to_string()),
            })?;

        let mut request = payload.to_string();
        request.push('\n');
        stream.write_all(request.as_bytes()).await?;
        stream.flush().await?;
        self.stats.requests_sent.fetch_add(1, Ordering::Relaxed);

        let mut reader = BufReader::new(stream);
        let mut response = String::new();
        if reader.read_line(&mut response).await? == 0 {
            return Err(ProviderError::InvalidResponse(
                "connection closed before a response was received".to_string(),
            ));
        }
        Ok(response)
    }
}

fn transaction_json(request: &TransactionRequest) -> Value {
    let mut tx = json!({
        "from": request.from,
        "to": request.to,
        "data": request.data,
        "value": format!("0x{:x}", request.value),
    });
    if let Some(gas) = request.gas {
        tx["gas"] = json!(format_quantity(gas));
    }
    if let Some(gas_price) = request.gas_price {
        tx["gasPrice"] = json!(format_quantity(gas_price));
    }
    if let Some(nonce) = request.nonce {
        tx["nonce"] = json!(format_quantity(nonce));
    }
    tx
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireLog {
    address: Address,
    topics: Vec<B256>,
    data: Bytes,
    block_number: Option<String>,
    transaction_hash: Option<B256>,
    log_index: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireReceipt {
    transaction_hash: B256,
    block_number: Option<String>,
    block_hash: Option<B256>,
    status: Option<String>,
    #[serde(default)]
    logs: Vec<WireLog>,
}

#[derive(Deserialize)]
struct WireBlock {
    number: String,
    hash: B256,
    timestamp: String,
}

fn optional_quantity(value: Option<&str>) -> ProviderResult<Option<u64>> {
    value.map(parse_quantity).transpose()
}

impl TryFrom<WireLog> for Log {
    type Error = ProviderError;

    fn try_from(wire: WireLog) -> ProviderResult<Self> {
        Ok(Self {
            address: wire.address,
            topics: wire.topics,
            data: wire.data,
            block_number: optional_quantity(wire.block_number.as_deref())?,
            transaction_hash: wire.transaction_hash,
            log_index: optional_quantity(wire.log_index.as_deref())?,
        })
    }
}

impl TryFrom<WireReceipt> for TransactionReceipt {
    type Error = ProviderError;

    fn try_from(wire: WireReceipt) -> ProviderResult<Self> {
        Ok(Self {
            transaction_hash: wire.transaction_hash,
            block_number: optional_quantity(wire.block_number.as_deref())?,
            block_hash: wire.block_hash,
            status: optional_quantity(wire.status.as_deref())?.map(|status| status == 1),
            logs: wire
                .logs
                .into_iter()
                .map(Log::try_from)
                .collect::<ProviderResult<_>>()?,
        })
    }
}

impl TryFrom<WireBlock> for Block {
    type Error = ProviderError;

    fn try_from(wire: WireBlock) -> ProviderResult<Self> {
        Ok(Self {
            number: parse_quantity(&wire.number)?,
            hash: wire.hash,
            timestamp: parse_quantity(&wire.timestamp)?,
        })
    }
}

#[async_trait]
impl ChainProvider for IpcProvider {
    async fn network_id(&self) -> ProviderResult<String> {
        self.request("net_version", json!([])).await
    }

    async fn accounts(&self) -> ProviderResult<Vec<Address>> {
        self.request("eth_accounts", json!([])).await
    }

    async fn gas_price(&self) -> ProviderResult<u128> {
        let price: String = self.request("eth_gasPrice", json!([])).await?;
        parse_quantity_u128(&price)
    }

    async fn transaction_count(&self, address: Address) -> ProviderResult<u64> {
        let count: String = self
            .request("eth_getTransactionCount", json!([address, "pending"]))
            .await?;
        parse_quantity(&count)
    }

    async fn estimate_gas(&self, request: &TransactionRequest) -> ProviderResult<u64> {
        let gas: String = self
            .request("eth_estimateGas", json!([transaction_json(request)]))
            .await?;
        parse_quantity(&gas)
    }

    async fn call(&self, request: &CallRequest) -> ProviderResult<Bytes> {
        let mut call = json!({ "to": request.to, "data": request.data });
        if let Some(from) = request.from {
            call["from"] = json!(from);
        }
        self.request("eth_call", json!([call, "latest"])).await
    }

    async fn send_transaction(&self, request: &TransactionRequest) -> ProviderResult<B256> {
        self.request("eth_sendTransaction", json!([transaction_json(request)]))
            .await
    }

    async fn transaction_receipt(
        &self,
        tx_id: B256,
    ) -> ProviderResult<Option<TransactionReceipt>> {
        let wire: Option<WireReceipt> = self
            .request("eth_getTransactionReceipt", json!([tx_id]))
            .await?;
        wire.map(TransactionReceipt::try_from).transpose()
    }

    async fn block_by_number(&self, number: u64) -> ProviderResult<Option<Block>> {
        let wire: Option<WireBlock> = self
            .request("eth_getBlockByNumber", json!([format_quantity(number), false]))
            .await?;
        wire.map(Block::try_from).transpose()
    }

    async fn block_number(&self) -> ProviderResult<u64> {
        let number: String = self.request("eth_blockNumber", json!([])).await?;
        parse_quantity(&number)
    }

    async fn logs(&self, filter: &LogFilter) -> ProviderResult<Vec<Log>> {
        let topics: Vec<B256> = filter.topic0.into_iter().collect();
        let to_block = filter
            .to_block
            .map_or_else(|| "latest".to_string(), |block| format_quantity(block));
        let wire: Vec<WireLog> = self
            .request(
                "eth_getLogs",
                json!([{
                    "address": filter.address,
                    "topics": topics,
                    "fromBlock": format_quantity(filter.from_block),
                    "toBlock": to_block,
                }]),
            )
            .await?;
        wire.into_iter().map(Log::try_from).collect()
    }
}
