//! # Batch Publisher
//!
//! Walks the store in input order and drives every entry to `confirmed`.
//!
//! ```text
//! unpublished ──send──▶ sent ──confirm──▶ confirmed
//!                        ▲
//!            restart ────┘ (re-attached, never resent)
//! ```
//!
//! At most `max_unconfirmed` entries are in flight: a permit is taken before
//! each send and released when that entry confirms or fails. Confirmation
//! order may differ from submission order; the assigned row number is
//! authoritative.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use alloy_primitives::B256;
use catena_core::{CatenaClient, ChainProvider, TxOptions};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;

use crate::error::{PublisherError, PublisherResult};
use crate::store::{DisclosureStore, EntryState};
use crate::unconfirmed::UnconfirmedSet;

/// Default cap on in-flight transactions.
pub const DEFAULT_MAX_UNCONFIRMED: usize = 10;

/// Batch settings.
#[derive(Clone, Copy, Debug)]
pub struct PublisherConfig {
    /// Maximum number of sent but unconfirmed entries.
    pub max_unconfirmed: usize,
    /// Options applied to every send.
    pub tx_options: TxOptions,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            max_unconfirmed: DEFAULT_MAX_UNCONFIRMED,
            tx_options: TxOptions::default(),
        }
    }
}

impl PublisherConfig {
    /// Sets the in-flight cap. Zero is treated as one.
    #[must_use]
    pub fn with_max_unconfirmed(mut self, max_unconfirmed: usize) -> Self {
        self.max_unconfirmed = max_unconfirmed.max(1);
        self
    }

    /// Sets the options applied to every send.
    #[must_use]
    pub fn with_tx_options(mut self, tx_options: TxOptions) -> Self {
        self.tx_options = tx_options;
        self
    }
}

/// Counters updated while a batch runs.
#[derive(Debug, Default)]
pub struct PublisherStats {
    /// Transactions sent in this run.
    pub sent: AtomicU64,
    /// Entries confirmed in this run.
    pub confirmed: AtomicU64,
    /// Entries re-attached from an earlier run.
    pub resumed: AtomicU64,
    /// Entries that failed to send or confirm.
    pub failed: AtomicU64,
}

/// Outcome of [`BatchPublisher::run`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Entries in the store.
    pub total: usize,
    /// Entries already confirmed before this run.
    pub previously_confirmed: usize,
    /// Entries confirmed by this run, resumed ones included.
    pub newly_confirmed: usize,
    /// Entries found in the `sent` state and re-attached.
    pub resumed: usize,
    /// Entries that failed.
    pub failed: usize,
}

impl BatchSummary {
    /// Whether every entry in the store is now confirmed.
    #[inline]
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.previously_confirmed + self.newly_confirmed == self.total
    }
}

/// Publishes every entry of a [`DisclosureStore`].
pub struct BatchPublisher<P: ?Sized> {
    client: CatenaClient<P>,
    store: Arc<DisclosureStore>,
    unconfirmed: Arc<UnconfirmedSet>,
    stats: Arc<PublisherStats>,
    config: PublisherConfig,
}

impl<P> BatchPublisher<P>
where
    P: ChainProvider + ?Sized + 'static,
{
    /// Creates a publisher over `store`.
    #[must_use]
    pub fn new(client: CatenaClient<P>, store: Arc<DisclosureStore>, config: PublisherConfig) -> Self {
        Self {
            client,
            store,
            unconfirmed: Arc::new(UnconfirmedSet::new()),
            stats: Arc::new(PublisherStats::default()),
            config,
        }
    }

    /// Transactions currently in flight.
    #[must_use]
    pub fn unconfirmed(&self) -> &Arc<UnconfirmedSet> {
        &self.unconfirmed
    }

    /// Returns a reference to the statistics.
    #[must_use]
    pub fn stats(&self) -> Arc<PublisherStats> {
        Arc::clone(&self.stats)
    }

    /// Runs the batch to completion.
    ///
    /// A malformed entry, a failed send or a failed confirmation is logged
    /// and counted; the rest of the batch continues.
    ///
    /// # Errors
    ///
    /// Returns an error if a sent transaction id cannot be written to the
    /// store. In-flight confirmations are abandoned and resume on the next run.
    pub async fn run(&self) -> PublisherResult<BatchSummary> {
        let entries = self.store.snapshot();
        let total = entries.len();
        let previously_confirmed = entries
            .iter()
            .filter(|(_, record)| record.state() == EntryState::Confirmed)
            .count();

        let mut summary = BatchSummary {
            total,
            previously_confirmed,
            ..BatchSummary::default()
        };
        let progress = Arc::new(AtomicU64::new(previously_confirmed as u64));
        let permits = Arc::new(Semaphore::new(self.config.max_unconfirmed.max(1)));
        let mut tasks = JoinSet::new();

        for (id, record) in entries {
            let state = record.state();
            if state == EntryState::Confirmed {
                continue;
            }

            let permit = Arc::clone(&permits)
                .acquire_owned()
                .await
                .map_err(|_| PublisherError::Cancelled)?;

            let tx_id = if let EntryState::Sent(tx_id) = state {
                tracing::info!("Disclosure {id} already sent... waiting for confirmation: {tx_id}");
                self.stats.resumed.fetch_add(1, Ordering::Relaxed);
                summary.resumed += 1;
                tx_id
            } else {
                let sent = match record.disclosure() {
                    Ok(disclosure) => {
                        self.client
                            .publish_disclosure_tx(&disclosure, self.config.tx_options)
                            .await
                    }
                    Err(err) => Err(err),
                };
                match sent {
                    Ok(tx_id) => {
                        self.store.mark_sent(&id, tx_id)?;
                        self.stats.sent.fetch_add(1, Ordering::Relaxed);
                        tracing::info!("Sent transaction: {id} -> {tx_id}");
                        tx_id
                    }
                    Err(err) => {
                        tracing::error!("Failed to send {id}: {err}");
                        self.stats.failed.fetch_add(1, Ordering::Relaxed);
                        summary.failed += 1;
                        continue;
                    }
                }
            };

            self.unconfirmed.insert(tx_id, id.clone());
            let confirmation = Confirmation {
                client: self.client.clone(),
                store: Arc::clone(&self.store),
                unconfirmed: Arc::clone(&self.unconfirmed),
                stats: Arc::clone(&self.stats),
                progress: Arc::clone(&progress),
                total,
            };
            tasks.spawn(confirmation.run(id, tx_id, permit));
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(true) => summary.newly_confirmed += 1,
                Ok(false) => summary.failed += 1,
                Err(err) => {
                    tracing::error!("confirmation task ended abnormally: {err}");
                    summary.failed += 1;
                }
            }
        }

        tracing::info!(
            total = summary.total,
            previously_confirmed = summary.previously_confirmed,
            newly_confirmed = summary.newly_confirmed,
            resumed = summary.resumed,
            failed = summary.failed,
            "batch finished"
        );
        Ok(summary)
    }
}

/// Waits for one transaction and records the result.
struct Confirmation<P: ?Sized> {
    client: CatenaClient<P>,
    store: Arc<DisclosureStore>,
    unconfirmed: Arc<UnconfirmedSet>,
    stats: Arc<PublisherStats>,
    progress: Arc<AtomicU64>,
    total: usize,
}

impl<P> Confirmation<P>
where
    P: ChainProvider + ?Sized,
{
    async fn run(self, id: String, tx_id: B256, permit: OwnedSemaphorePermit) -> bool {
        let outcome = match self.client.wait_for_confirmation(tx_id).await {
            Ok(published) => self.store.mark_confirmed(&id, &published),
            Err(err) => Err(err.into()),
        };
        self.unconfirmed.remove(&tx_id);
        drop(permit);

        match outcome {
            Ok(()) => {
                let confirmed = self.progress.fetch_add(1, Ordering::Relaxed) + 1;
                self.stats.confirmed.fetch_add(1, Ordering::Relaxed);
                tracing::info!("Successfully published {confirmed}/{}: {id}", self.total);
                true
            }
            Err(err) => {
                tracing::error!("Failed to confirm {id} ({tx_id}): {err}");
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }
}
