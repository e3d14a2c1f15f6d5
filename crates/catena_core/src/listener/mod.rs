//! # Live Subscription
//!
//! Standing watch for `disclosureAdded` on one ledger.
//!
//! ```text
//! ┌──────────────┐  eth_getLogs  ┌──────────────┐     ┌──────────────┐
//! │   Provider   │ ◀──────────── │  Poll task   │ ──▶ │   Channel    │ ──▶ next()
//! │              │               │  (correlate) │     │  (bounded)   │
//! └──────────────┘               └──────────────┘     └──────────────┘
//! ```
//!
//! The poll task runs until [`DisclosureSubscription::stop`] is called, a
//! [`CancelToken`] taken from it is cancelled, or the subscription is
//! dropped. Poll and decode errors are logged, counted
//! in [`SubscriptionStats`] and otherwise swallowed. A range whose logs could
//! not all be enriched is scanned again on the next poll, so no event is lost
//! to a transient node failure.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::Address;
use alloy_sol_types::SolEvent;
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};

use crate::config::SubscriptionSection;
use crate::contracts::{Disclosure, IDisclosureManager as ledger};
use crate::error::{CatenaError, CatenaResult};
use crate::events::{decode_disclosure_added, enrich, PublishedTransaction};
use crate::provider::{ChainProvider, Log, LogFilter};

/// Subscription settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubscriptionConfig {
    /// Delay between log polls.
    pub poll_interval: Duration,
    /// Capacity of the event channel.
    pub channel_buffer: usize,
    /// First block to deliver; the block after the current head when `None`.
    pub from_block: Option<u64>,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self::from(&SubscriptionSection::default())
    }
}

impl From<&SubscriptionSection> for SubscriptionConfig {
    fn from(section: &SubscriptionSection) -> Self {
        Self {
            poll_interval: section.poll_interval(),
            channel_buffer: section.channel_buffer.max(1),
            from_block: None,
        }
    }
}

impl SubscriptionConfig {
    /// Replays history starting at `block`.
    #[must_use]
    pub fn from_block(mut self, block: u64) -> Self {
        self.from_block = Some(block);
        self
    }

    /// Sets the poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

/// One delivered `disclosureAdded` occurrence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisclosureEvent {
    /// Correlated record, identical to what publishing returned.
    pub published: PublishedTransaction,
    /// Published fields.
    pub disclosure: Disclosure,
}

/// Counters for a running subscription.
#[derive(Debug, Default)]
pub struct SubscriptionStats {
    /// Completed polls.
    pub polls: AtomicU64,
    /// Events handed to the channel.
    pub events_delivered: AtomicU64,
    /// Poll or decode failures.
    pub errors: AtomicU64,
    /// Last block fully scanned.
    pub last_block: AtomicU64,
}

/// Handle to a running subscription.
///
/// Events arrive in chain order through [`Self::next`].
pub struct DisclosureSubscription {
    receiver: mpsc::Receiver<DisclosureEvent>,
    running: Arc<AtomicBool>,
    stats: Arc<SubscriptionStats>,
    task: JoinHandle<()>,
}

impl DisclosureSubscription {
    /// Starts watching `contract`. Must be called inside a tokio runtime.
    #[must_use]
    pub fn spawn<P>(provider: Arc<P>, contract: Address, config: SubscriptionConfig) -> Self
    where
        P: ChainProvider + ?Sized + 'static,
    {
        let (sender, receiver) = mpsc::channel(config.channel_buffer.max(1));
        let running = Arc::new(AtomicBool::new(true));
        let stats = Arc::new(SubscriptionStats::default());

        let worker = Worker {
            provider,
            contract,
            config,
            sender,
            running: Arc::clone(&running),
            stats: Arc::clone(&stats),
            network_id: None,
        };
        let task = tokio::spawn(worker.run());

        tracing::debug!(%contract, "disclosure subscription started");
        Self {
            receiver,
            running,
            stats,
            task,
        }
    }

    /// Waits for the next event. `None` once stopped and drained.
    pub async fn next(&mut self) -> Option<DisclosureEvent> {
        self.receiver.recv().await
    }

    /// Returns an event if one is already buffered.
    pub fn try_next(&mut self) -> Option<DisclosureEvent> {
        self.receiver.try_recv().ok()
    }

    /// Returns a reference to the statistics.
    #[must_use]
    pub fn stats(&self) -> Arc<SubscriptionStats> {
        Arc::clone(&self.stats)
    }

    /// Checks if the poll task is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed) && !self.task.is_finished()
    }

    /// Returns a token that ends this subscription when cancelled.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        CancelToken {
            running: Arc::clone(&self.running),
            abort: self.task.abort_handle(),
        }
    }

    /// Ends the subscription. Buffered events can still be drained.
    pub fn stop(&self) {
        self.cancel_token().cancel();
    }
}

/// Cloneable handle that ends a [`DisclosureSubscription`] from anywhere.
#[derive(Clone, Debug)]
pub struct CancelToken {
    running: Arc<AtomicBool>,
    abort: AbortHandle,
}

impl CancelToken {
    /// Stops the poll task. Idempotent.
    pub fn cancel(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.abort.abort();
    }

    /// Checks if the subscription has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        !self.running.load(Ordering::Relaxed)
    }
}

impl Drop for DisclosureSubscription {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker<P: ?Sized> {
    provider: Arc<P>,
    contract: Address,
    config: SubscriptionConfig,
    sender: mpsc::Sender<DisclosureEvent>,
    running: Arc<AtomicBool>,
    stats: Arc<SubscriptionStats>,
    network_id: Option<String>,
}

impl<P> Worker<P>
where
    P: ChainProvider + ?Sized,
{
    async fn run(mut self) {
        let mut next_block = self.config.from_block;

        while self.running.load(Ordering::Relaxed) {
            match self.poll(next_block).await {
                Ok((scanned_to, events)) => {
                    self.stats.polls.fetch_add(1, Ordering::Relaxed);
                    for event in events {
                        if self.sender.send(event).await.is_err() {
                            return;
                        }
                        self.stats.events_delivered.fetch_add(1, Ordering::Relaxed);
                    }
                    if let Some(block) = scanned_to {
                        self.stats.last_block.store(block, Ordering::Relaxed);
                        next_block = Some(block + 1);
                    } else if next_block.is_none() {
                        match self.head().await {
                            Ok(head) => next_block = Some(head + 1),
                            Err(e) => {
                                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                                tracing::warn!(contract = %self.contract, error = %e, "could not read the chain head");
                            }
                        }
                    }
                }
                Err(e) => {
                    self.stats.errors.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(contract = %self.contract, error = %e, "disclosure subscription poll failed");
                }
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    async fn head(&self) -> CatenaResult<u64> {
        Ok(self.provider.block_number().await?)
    }

    /// Scans `[from, head]`. Returns the last scanned block, `None` if there
    /// was nothing to scan yet.
    ///
    /// A provider failure while enriching any log fails the whole range so
    /// the next poll scans it again. Logs that do not decode are skipped.
    async fn poll(
        &mut self,
        from: Option<u64>,
    ) -> CatenaResult<(Option<u64>, Vec<DisclosureEvent>)> {
        let Some(from) = from else {
            return Ok((None, Vec::new()));
        };
        let head = self.head().await?;
        if head < from {
            return Ok((None, Vec::new()));
        }

        let filter = LogFilter {
            address: self.contract,
            topic0: Some(ledger::disclosureAdded::SIGNATURE_HASH),
            from_block: from,
            to_block: Some(head),
        };
        let logs = self.provider.logs(&filter).await?;

        let mut events = Vec::with_capacity(logs.len());
        for log in &logs {
            match self.correlate(log).await {
                Ok(event) => events.push(event),
                Err(e @ CatenaError::Network(_)) => return Err(e),
                Err(e) => {
                    self.stats.errors.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(contract = %self.contract, error = %e, "skipping undecodable disclosureAdded log");
                }
            }
        }
        Ok((Some(head), events))
    }

    async fn correlate(&mut self, log: &Log) -> CatenaResult<DisclosureEvent> {
        let added = decode_disclosure_added(log)?;
        let (Some(tx_id), Some(block_number)) = (log.transaction_hash, log.block_number) else {
            return Err(CatenaError::AbiDecode(
                "log is missing its transaction hash or block number".to_string(),
            ));
        };

        let network_id = match &self.network_id {
            Some(id) => id.clone(),
            None => {
                let id = self.provider.network_id().await?;
                self.network_id = Some(id.clone());
                id
            }
        };

        let published = enrich(
            self.provider.as_ref(),
            self.contract,
            tx_id,
            added.row_number,
            block_number,
            network_id,
        )
        .await?;
        Ok(DisclosureEvent {
            published,
            disclosure: added.disclosure,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Bytes, B256};
    use async_trait::async_trait;

    use crate::contracts::DISCLOSURE_MANAGER;
    use crate::provider::{
        Block, CallRequest, ProviderError, ProviderResult, TransactionReceipt, TransactionRequest,
    };
    use crate::resolver::resolve;
    use crate::simulator::ChainSimulator;

    /// Simulator whose block and head lookups fail a fixed number of times.
    struct FlakyBlocks {
        inner: ChainSimulator,
        block_failures: AtomicU64,
        head_failures: AtomicU64,
    }

    impl FlakyBlocks {
        fn new(inner: ChainSimulator, block_failures: u64, head_failures: u64) -> Self {
            Self {
                inner,
                block_failures: AtomicU64::new(block_failures),
                head_failures: AtomicU64::new(head_failures),
            }
        }
    }

    fn fail_once(remaining: &AtomicU64) -> ProviderResult<()> {
        match remaining.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)) {
            Ok(_) => Err(ProviderError::Timeout),
            Err(_) => Ok(()),
        }
    }

    #[async_trait]
    impl ChainProvider for FlakyBlocks {
        async fn network_id(&self) -> ProviderResult<String> {
            self.inner.network_id().await
        }
        async fn accounts(&self) -> ProviderResult<Vec<Address>> {
            self.inner.accounts().await
        }
        async fn gas_price(&self) -> ProviderResult<u128> {
            self.inner.gas_price().await
        }
        async fn transaction_count(&self, address: Address) -> ProviderResult<u64> {
            self.inner.transaction_count(address).await
        }
        async fn estimate_gas(&self, request: &TransactionRequest) -> ProviderResult<u64> {
            self.inner.estimate_gas(request).await
        }
        async fn call(&self, request: &CallRequest) -> ProviderResult<Bytes> {
            self.inner.call(request).await
        }
        async fn send_transaction(&self, request: &TransactionRequest) -> ProviderResult<B256> {
            self.inner.send_transaction(request).await
        }
        async fn transaction_receipt(&self, tx_id: B256) -> ProviderResult<Option<TransactionReceipt>> {
            self.inner.transaction_receipt(tx_id).await
        }
        async fn block_by_number(&self, number: u64) -> ProviderResult<Option<Block>> {
            fail_once(&self.block_failures)?;
            self.inner.block_by_number(number).await
        }
        async fn block_number(&self) -> ProviderResult<u64> {
            fail_once(&self.head_failures)?;
            self.inner.block_number().await
        }
        async fn logs(&self, filter: &LogFilter) -> ProviderResult<Vec<Log>> {
            self.inner.logs(filter).await
        }
    }

    async fn publish(sim: &ChainSimulator, organization: &str) -> B256 {
        let disclosure = Disclosure {
            organization: organization.to_string(),
            ..Disclosure::default()
        };
        let call = resolve(&DISCLOSURE_MANAGER, "newEntry", &disclosure.to_call_args().unwrap()).unwrap();
        let request = TransactionRequest::new(sim.owner(), sim.ledger_address(), call.calldata().unwrap());
        sim.send_transaction(&request).await.unwrap()
    }

    #[tokio::test]
    async fn test_transient_enrichment_failure_rescans_range() {
        let sim = ChainSimulator::new();
        let first = publish(&sim, "ORG A").await;
        let second = publish(&sim, "ORG B").await;
        let ledger_address = sim.ledger_address();
        let provider = Arc::new(FlakyBlocks::new(sim, 2, 0));

        let config = SubscriptionConfig::default()
            .with_poll_interval(Duration::from_millis(5))
            .from_block(0);
        let mut subscription = DisclosureSubscription::spawn(provider, ledger_address, config);

        let mut delivered = Vec::new();
        for _ in 0..2 {
            let event = tokio::time::timeout(Duration::from_secs(5), subscription.next())
                .await
                .unwrap()
                .unwrap();
            delivered.push((event.published.tx_id, event.published.row_number));
        }
        assert_eq!(delivered, vec![(first, 1), (second, 2)]);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(subscription.try_next().is_none());
        assert_eq!(subscription.stats().errors.load(Ordering::Relaxed), 2);
        subscription.stop();
    }

    #[test]
    fn test_config_from_section() {
        let section = SubscriptionSection {
            poll_interval_ms: 25,
            channel_buffer: 0,
        };
        let config = SubscriptionConfig::from(&section).from_block(4);
        assert_eq!(config.poll_interval, Duration::from_millis(25));
        assert_eq!(config.channel_buffer, 1);
        assert_eq!(config.from_block, Some(4));
    }

    #[tokio::test]
    async fn test_head_failure_is_counted_and_retried() {
        let provider = Arc::new(FlakyBlocks::new(ChainSimulator::new(), 0, 2));
        let ledger_address = provider.inner.ledger_address();
        let config = SubscriptionConfig::default().with_poll_interval(Duration::from_millis(5));
        let mut subscription = DisclosureSubscription::spawn(Arc::clone(&provider), ledger_address, config);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(subscription.is_running());
        assert_eq!(subscription.stats().errors.load(Ordering::Relaxed), 2);

        let tx_id = publish(&provider.inner, "ORG A").await;
        let event = tokio::time::timeout(Duration::from_secs(5), subscription.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.published.tx_id, tx_id);
        subscription.stop();
    }
}
