//! # Session Client
//!
//! [`CatenaClient`] is the per-session context: one provider, the deployed
//! contract addresses and the configuration. Every operation goes through it;
//! there is no process-wide binding state.
//!
//! Clones are cheap and share the provider.

use std::collections::BTreeMap;
use std::sync::Arc;

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::SolCall;

use crate::config::CatenaConfig;
use crate::contracts::{
    Agreement, ContractDescriptor, Disclosure, IDisclosureAgreementTracker as tracker,
    IDisclosureManager as ledger, NewAgreement, AGREEMENT_TRACKER, DISCLOSURE_MANAGER,
};
use crate::encoding::ArgValue;
use crate::error::{CatenaError, CatenaResult};
use crate::events::{correlate, decode_agreement_events, AgreementEvent, PublishedTransaction};
use crate::listener::{DisclosureSubscription, SubscriptionConfig};
use crate::orchestrator::{
    fetch_receipt, send_and_confirm, send_only, wait_for_receipt, ConfirmationPolicy,
};
use crate::provider::{CallRequest, ChainProvider};
use crate::resolver::{resolve, CallArgs};
use crate::tx::{TransactionBuilder, TxOptions, UnsignedTransaction};

/// Typed access to the ledger and the agreement tracker.
pub struct CatenaClient<P: ?Sized> {
    provider: Arc<P>,
    disclosure_manager: Address,
    agreement_tracker: Option<Address>,
    config: Arc<CatenaConfig>,
}

impl<P: ?Sized> Clone for CatenaClient<P> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            disclosure_manager: self.disclosure_manager,
            agreement_tracker: self.agreement_tracker,
            config: Arc::clone(&self.config),
        }
    }
}

fn to_u64(value: U256, what: &str) -> CatenaResult<u64> {
    u64::try_from(value).map_err(|_| CatenaError::AbiDecode(format!("{what} {value} overflows u64")))
}

impl<P> CatenaClient<P>
where
    P: ChainProvider + ?Sized,
{
    /// Creates a client for the ledger at `disclosure_manager`.
    ///
    /// The tracker address is taken from `config` when present.
    #[must_use]
    pub fn new(provider: Arc<P>, disclosure_manager: Address, config: CatenaConfig) -> Self {
        Self {
            provider,
            disclosure_manager,
            agreement_tracker: config.contracts.agreement_tracker,
            config: Arc::new(config),
        }
    }

    /// Creates a client from the addresses in `config`.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` when no ledger address is configured.
    pub fn from_config(provider: Arc<P>, config: CatenaConfig) -> CatenaResult<Self> {
        let ledger = config.contracts.disclosure_manager.ok_or_else(|| {
            CatenaError::InvalidConfig("contracts.disclosure_manager is not set".to_string())
        })?;
        Ok(Self::new(provider, ledger, config))
    }

    /// Binds the agreement tracker.
    #[must_use]
    pub fn with_agreement_tracker(mut self, address: Address) -> Self {
        self.agreement_tracker = Some(address);
        self
    }

    /// The provider.
    #[must_use]
    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }

    /// Ledger address.
    #[inline]
    #[must_use]
    pub fn disclosure_manager(&self) -> Address {
        self.disclosure_manager
    }

    /// Tracker address.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` when no tracker is bound.
    pub fn agreement_tracker(&self) -> CatenaResult<Address> {
        self.agreement_tracker.ok_or_else(|| {
            CatenaError::InvalidConfig("contracts.agreement_tracker is not set".to_string())
        })
    }

    /// Session configuration.
    #[must_use]
    pub fn config(&self) -> &CatenaConfig {
        &self.config
    }

    fn confirmation_policy(&self) -> ConfirmationPolicy {
        ConfirmationPolicy::from(&self.config.confirmation)
    }

    async fn read(
        &self,
        contract: &ContractDescriptor,
        to: Address,
        function: &str,
        args: &CallArgs,
    ) -> CatenaResult<Bytes> {
        let calldata = resolve(contract, function, args)?.calldata()?;
        let request = CallRequest {
            from: None,
            to,
            data: calldata,
        };
        Ok(self.provider.call(&request).await?)
    }

    async fn read_ledger(&self, function: &str, args: &CallArgs) -> CatenaResult<Bytes> {
        self.read(&DISCLOSURE_MANAGER, self.disclosure_manager, function, args)
            .await
    }

    async fn read_tracker(&self, function: &str, args: &CallArgs) -> CatenaResult<Bytes> {
        let tracker = self.agreement_tracker()?;
        self.read(&AGREEMENT_TRACKER, tracker, function, args).await
    }

    // ---------------------------------------------------------------------
    // Ledger
    // ---------------------------------------------------------------------

    /// Account the ledger is gated on.
    ///
    /// # Errors
    ///
    /// Network or decoding errors.
    pub async fn owner(&self) -> CatenaResult<Address> {
        let data = self.read_ledger("owner", &CallArgs::default()).await?;
        Ok(ledger::ownerCall::abi_decode_returns(&data, true)?.owner)
    }

    /// Resolves the publish call. Pure, so argument errors surface here.
    fn publish_builder(
        &self,
        disclosure: &Disclosure,
        options: TxOptions,
    ) -> CatenaResult<TransactionBuilder> {
        let args = disclosure.to_call_args()?;
        let call = resolve(&DISCLOSURE_MANAGER, disclosure.function_name(), &args)?;
        let default_gas = if disclosure.is_amendment() {
            self.config.gas.amend_entry
        } else {
            self.config.gas.new_entry
        };
        Ok(TransactionBuilder::new(self.disclosure_manager, call)
            .with_options(options)
            .with_default_gas(default_gas)
            .with_default_gas_price(self.config.gas.gas_price.map(u128::from)))
    }

    async fn gated_publish_builder(
        &self,
        disclosure: &Disclosure,
        options: TxOptions,
    ) -> CatenaResult<TransactionBuilder> {
        let builder = self.publish_builder(disclosure, options)?;
        let owner = self.owner().await?;
        Ok(builder.owner_gated(owner))
    }

    /// Builds the fully resolved publish transaction without sending it.
    ///
    /// Identical inputs with identical `gas`, `gas_price` and `nonce`
    /// overrides yield identical transactions.
    ///
    /// # Errors
    ///
    /// Argument errors, `UnauthorizedSender`, or network errors.
    pub async fn create_publish_disclosure_tx(
        &self,
        disclosure: &Disclosure,
        options: TxOptions,
    ) -> CatenaResult<UnsignedTransaction> {
        let builder = self.gated_publish_builder(disclosure, options).await?;
        builder.build(self.provider.as_ref()).await
    }

    /// Sends the publish transaction and returns its id without waiting.
    ///
    /// # Errors
    ///
    /// Argument errors, `UnauthorizedSender`, or network errors.
    pub async fn publish_disclosure_tx(
        &self,
        disclosure: &Disclosure,
        options: TxOptions,
    ) -> CatenaResult<B256> {
        let builder = self.gated_publish_builder(disclosure, options).await?;
        send_only(self.provider.as_ref(), &builder).await
    }

    /// Publishes and waits for the correlated record.
    ///
    /// # Errors
    ///
    /// Everything [`Self::publish_disclosure_tx`] and
    /// [`Self::wait_for_confirmation`] can fail with.
    pub async fn publish_disclosure(
        &self,
        disclosure: &Disclosure,
        options: TxOptions,
    ) -> CatenaResult<PublishedTransaction> {
        let tx_id = self.publish_disclosure_tx(disclosure, options).await?;
        let published = self.wait_for_confirmation(tx_id).await?;
        tracing::debug!(%tx_id, row = published.row_number, "disclosure published");
        Ok(published)
    }

    /// Waits until `tx_id` is mined and correlates its receipt.
    ///
    /// Safe to call for a transaction sent by an earlier process.
    ///
    /// # Errors
    ///
    /// `InvalidReceipt`, `MissingEventLog`, `MalformedRowNumber`,
    /// `ConfirmationTimeout`, or network errors.
    pub async fn wait_for_confirmation(&self, tx_id: B256) -> CatenaResult<PublishedTransaction> {
        let receipt =
            wait_for_receipt(self.provider.as_ref(), tx_id, self.confirmation_policy()).await?;
        correlate(self.provider.as_ref(), self.disclosure_manager, &receipt).await
    }

    /// Correlates `tx_id` if it is already mined.
    ///
    /// # Errors
    ///
    /// Same as [`Self::wait_for_confirmation`], minus the timeout.
    pub async fn get_published_tx(&self, tx_id: B256) -> CatenaResult<Option<PublishedTransaction>> {
        match fetch_receipt(self.provider.as_ref(), tx_id).await? {
            Some(receipt) => {
                Ok(Some(correlate(self.provider.as_ref(), self.disclosure_manager, &receipt).await?))
            }
            None => Ok(None),
        }
    }

    /// Latest version of `row`, following amendments.
    ///
    /// # Errors
    ///
    /// Network or decoding errors.
    pub async fn get_disclosure(&self, row: u64) -> CatenaResult<Disclosure> {
        let data = self
            .read_ledger("pullRow", &CallArgs::positional().push(row))
            .await?;
        let r = ledger::pullRowCall::abi_decode_returns(&data, true)?;
        Ok(Disclosure::from_words(
            [
                &r.organization,
                &r.recipient,
                &r.location,
                &r.amount,
                &r.fundingType,
                &r.date,
                &r.purpose,
                &r.comment,
            ],
            to_u64(r.amends, "amends")?,
        ))
    }

    /// Entry `entry` exactly as published.
    ///
    /// # Errors
    ///
    /// Network or decoding errors.
    pub async fn get_disclosure_amendment(&self, entry: u64) -> CatenaResult<Disclosure> {
        let data = self
            .read_ledger("pullEntry", &CallArgs::positional().push(entry))
            .await?;
        let r = ledger::pullEntryCall::abi_decode_returns(&data, true)?;
        Ok(Disclosure::from_words(
            [
                &r.organization,
                &r.recipient,
                &r.location,
                &r.amount,
                &r.fundingType,
                &r.date,
                &r.purpose,
                &r.comment,
            ],
            to_u64(r.amends, "amends")?,
        ))
    }

    /// Number of published entries, amendments included.
    ///
    /// # Errors
    ///
    /// Network or decoding errors.
    pub async fn get_disclosure_count(&self) -> CatenaResult<u64> {
        let data = self.read_ledger("getListCount", &CallArgs::default()).await?;
        to_u64(
            ledger::getListCountCall::abi_decode_returns(&data, true)?.count,
            "count",
        )
    }

    // ---------------------------------------------------------------------
    // Agreements
    // ---------------------------------------------------------------------

    async fn write_tracker(
        &self,
        function: &str,
        args: &CallArgs,
        options: TxOptions,
    ) -> CatenaResult<Vec<AgreementEvent>> {
        let tracker = self.agreement_tracker()?;
        let call = resolve(&AGREEMENT_TRACKER, function, args)?;
        let builder = TransactionBuilder::new(tracker, call)
            .with_options(options)
            .with_default_gas_price(self.config.gas.gas_price.map(u128::from));
        let (tx_id, receipt) =
            send_and_confirm(self.provider.as_ref(), &builder, self.confirmation_policy()).await?;
        let events = decode_agreement_events(tracker, &receipt.logs)?;
        tracing::debug!(%tx_id, function, events = events.len(), "agreement transaction confirmed");
        Ok(events)
    }

    /// Registers an agreement and returns the events of its receipt.
    ///
    /// The sender defaults to the node's first account.
    ///
    /// # Errors
    ///
    /// `InvalidAgreement` before any network call, then anything a
    /// confirmed send can fail with.
    pub async fn add_agreement(
        &self,
        agreement: &NewAgreement,
        options: TxOptions,
    ) -> CatenaResult<Vec<AgreementEvent>> {
        agreement.validate()?;
        self.write_tracker("addAgreement", &agreement.to_call_args(), options)
            .await
    }

    /// Signs an agreement as `options.from` (first account by default).
    ///
    /// # Errors
    ///
    /// Network errors, reverts from non-signatories included.
    pub async fn sign_agreement(
        &self,
        agreement_hash: B256,
        options: TxOptions,
    ) -> CatenaResult<Vec<AgreementEvent>> {
        let args = CallArgs::named().with("agreementHash", agreement_hash);
        self.write_tracker("signAgreement", &args, options).await
    }

    /// Full agreement state.
    ///
    /// # Errors
    ///
    /// Network or decoding errors.
    pub async fn get_agreement(&self, agreement_hash: B256) -> CatenaResult<Agreement> {
        let tracker = self.agreement_tracker()?;
        let by_hash = CallArgs::named().with("agreementHash", agreement_hash);

        let data = self.read_tracker("getAgreement", &by_hash).await?;
        let r = tracker::getAgreementCall::abi_decode_returns(&data, true)?;
        let data = self.read_tracker("disclosureManager", &CallArgs::default()).await?;
        let manager = tracker::disclosureManagerCall::abi_decode_returns(&data, true)?.manager;

        let required_signatures: BTreeMap<Address, bool> = r
            .signatories
            .iter()
            .copied()
            .zip(r.requiredSignatures.iter().copied())
            .collect();

        Ok(Agreement {
            contract_address: tracker,
            disclosure_manager_address: manager,
            agreement_hash,
            previous: r.previous,
            disclosure_index: to_u64(r.disclosureIndex, "disclosureIndex")?,
            block_number: to_u64(r.blockNumber, "blockNumber")?,
            signed_count: to_u64(r.signedCount, "signedCount")?,
            signatories: r.signatories,
            required_signatures,
        })
    }

    async fn latest_agreement(&self, disclosure_index: u64) -> CatenaResult<tracker::latestMapReturn> {
        let args = CallArgs::named().with("disclosureIndex", disclosure_index);
        let data = self.read_tracker("latestMap", &args).await?;
        Ok(tracker::latestMapCall::abi_decode_returns(&data, true)?)
    }

    /// Hash of the latest agreement for a disclosure, `None` if there is none.
    ///
    /// # Errors
    ///
    /// Network or decoding errors.
    pub async fn get_disclosure_agreement_hash(
        &self,
        disclosure_index: u64,
    ) -> CatenaResult<Option<B256>> {
        let latest = self.latest_agreement(disclosure_index).await?.latest;
        Ok((!latest.is_zero()).then_some(latest))
    }

    /// Number of agreements registered for a disclosure.
    ///
    /// # Errors
    ///
    /// Network or decoding errors.
    pub async fn get_disclosure_agreement_count(&self, disclosure_index: u64) -> CatenaResult<u64> {
        to_u64(self.latest_agreement(disclosure_index).await?.count, "count")
    }

    async fn tracker_flag(&self, function: &str, key: (&str, ArgValue)) -> CatenaResult<bool> {
        let data = self
            .read_tracker(function, &CallArgs::named().with(key.0, key.1))
            .await?;
        // Every boolean view shares the `(bool result)` return shape.
        Ok(tracker::hasAgreementCall::abi_decode_returns(&data, true)?.result)
    }

    /// Whether an agreement with this hash exists.
    ///
    /// # Errors
    ///
    /// Network or decoding errors.
    pub async fn has_agreement(&self, agreement_hash: B256) -> CatenaResult<bool> {
        self.tracker_flag("hasAgreement", ("agreementHash", agreement_hash.into()))
            .await
    }

    /// Whether a disclosure has any agreement.
    ///
    /// # Errors
    ///
    /// Network or decoding errors.
    pub async fn has_disclosure_agreement(&self, disclosure_index: u64) -> CatenaResult<bool> {
        self.tracker_flag("hasDisclosureAgreement", ("disclosureIndex", disclosure_index.into()))
            .await
    }

    /// Whether every signatory signed the agreement.
    ///
    /// # Errors
    ///
    /// Network or decoding errors.
    pub async fn is_agreement_fully_signed(&self, agreement_hash: B256) -> CatenaResult<bool> {
        self.tracker_flag("isAgreementFullySigned", ("agreementHash", agreement_hash.into()))
            .await
    }

    /// Whether the latest agreement of a disclosure is fully signed.
    ///
    /// # Errors
    ///
    /// Network or decoding errors.
    pub async fn is_disclosure_fully_signed(&self, disclosure_index: u64) -> CatenaResult<bool> {
        self.tracker_flag("isDisclosureFullySigned", ("disclosureIndex", disclosure_index.into()))
            .await
    }
}

impl<P> CatenaClient<P>
where
    P: ChainProvider + ?Sized + 'static,
{
    /// Starts a live subscription to `disclosureAdded` on the ledger.
    ///
    /// Poll interval and buffer come from `[subscription]`; use
    /// [`SubscriptionConfig::from_block`] on `config` to replay history.
    #[must_use]
    pub fn watch_disclosure_added(&self, config: Option<SubscriptionConfig>) -> DisclosureSubscription {
        let config = config.unwrap_or_else(|| SubscriptionConfig::from(&self.config.subscription));
        DisclosureSubscription::spawn(Arc::clone(&self.provider), self.disclosure_manager, config)
    }

    /// Default subscription settings of this session.
    #[must_use]
    pub fn subscription_config(&self) -> SubscriptionConfig {
        SubscriptionConfig::from(&self.config.subscription)
    }
}
