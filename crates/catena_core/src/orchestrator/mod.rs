//! # Send/Confirm Orchestrator
//!
//! Two ways to run a mutating call:
//!
//! - [`send_only`] returns the transaction id as soon as the node accepts it.
//! - [`send_and_confirm`] additionally waits for the mined receipt.
//!
//! [`wait_for_receipt`] is the resumption path: it needs nothing but the
//! transaction id, so a process restarted after [`send_only`] gets the same
//! receipt it would have seen had it kept waiting.

use std::time::Duration;

use alloy_primitives::B256;
use tokio::time::Instant;

use crate::config::ConfirmationSection;
use crate::error::{CatenaError, CatenaResult};
use crate::provider::{ChainProvider, TransactionReceipt};
use crate::tx::TransactionBuilder;

/// How to wait for a receipt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConfirmationPolicy {
    /// Delay between receipt polls.
    pub poll_interval: Duration,
    /// Give up after this long; wait forever when `None`.
    pub timeout: Option<Duration>,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self::from(&ConfirmationSection::default())
    }
}

impl From<&ConfirmationSection> for ConfirmationPolicy {
    fn from(section: &ConfirmationSection) -> Self {
        Self {
            poll_interval: section.poll_interval(),
            timeout: section.timeout(),
        }
    }
}

/// Sends the transaction and returns its id without waiting for mining.
///
/// # Errors
///
/// Argument and sender errors before the send, network errors from it.
pub async fn send_only<P>(provider: &P, builder: &TransactionBuilder) -> CatenaResult<B256>
where
    P: ChainProvider + ?Sized,
{
    let request = builder.request(provider).await?;
    let tx_id = provider.send_transaction(&request).await?;
    tracing::debug!(
        function = builder.call().name(),
        %tx_id,
        from = %request.from,
        gas = ?request.gas,
        "transaction sent"
    );
    Ok(tx_id)
}

/// Sends the transaction and waits for its validated receipt.
///
/// # Errors
///
/// Everything [`send_only`] and [`wait_for_receipt`] can fail with.
pub async fn send_and_confirm<P>(
    provider: &P,
    builder: &TransactionBuilder,
    policy: ConfirmationPolicy,
) -> CatenaResult<(B256, TransactionReceipt)>
where
    P: ChainProvider + ?Sized,
{
    let tx_id = send_only(provider, builder).await?;
    let receipt = wait_for_receipt(provider, tx_id, policy).await?;
    Ok((tx_id, receipt))
}

/// Fetches the receipt once. `None` while the transaction is not mined.
///
/// # Errors
///
/// `InvalidReceipt` if a mined receipt fails [`validate_receipt`].
pub async fn fetch_receipt<P>(provider: &P, tx_id: B256) -> CatenaResult<Option<TransactionReceipt>>
where
    P: ChainProvider + ?Sized,
{
    match provider.transaction_receipt(tx_id).await? {
        Some(receipt) if receipt.block_number.is_some() => {
            validate_receipt(tx_id, &receipt)?;
            Ok(Some(receipt))
        }
        _ => Ok(None),
    }
}

/// Polls until the transaction is mined, then validates the receipt.
///
/// # Errors
///
/// - `InvalidReceipt` if the receipt fails [`validate_receipt`]
/// - `ConfirmationTimeout` if the policy's timeout elapses first
/// - `Network` on any provider failure
pub async fn wait_for_receipt<P>(
    provider: &P,
    tx_id: B256,
    policy: ConfirmationPolicy,
) -> CatenaResult<TransactionReceipt>
where
    P: ChainProvider + ?Sized,
{
    let started = Instant::now();
    loop {
        if let Some(receipt) = fetch_receipt(provider, tx_id).await? {
            return Ok(receipt);
        }

        if let Some(timeout) = policy.timeout {
            let waited = started.elapsed();
            if waited >= timeout {
                return Err(CatenaError::ConfirmationTimeout {
                    tx_id,
                    waited_ms: u64::try_from(waited.as_millis()).unwrap_or(u64::MAX),
                });
            }
        }

        tracing::trace!(%tx_id, "receipt not available yet");
        tokio::time::sleep(policy.poll_interval).await;
    }
}

/// Checks that `receipt` belongs to `tx_id` and carries logs.
///
/// # Errors
///
/// `InvalidReceipt` on a hash mismatch or an empty log list.
pub fn validate_receipt(tx_id: B256, receipt: &TransactionReceipt) -> CatenaResult<()> {
    if receipt.transaction_hash != tx_id {
        return Err(CatenaError::InvalidReceipt {
            expected: tx_id,
            reason: format!("receipt is for {}", receipt.transaction_hash),
        });
    }
    if receipt.logs.is_empty() {
        return Err(CatenaError::InvalidReceipt {
            expected: tx_id,
            reason: "receipt has no logs".to_string(),
        });
    }
    Ok(())
}
