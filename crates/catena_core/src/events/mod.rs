//! # Event Correlator
//!
//! Decodes the logs of a mined receipt into domain records.
//!
//! Correlation is stateless: given the receipt, the published record is
//! rebuilt from the `disclosureAdded` log plus two lookups (network id and
//! the block the receipt was mined in). That is what makes
//! `wait_for_confirmation` after a restart return the same record as an
//! uninterrupted `publish_disclosure`.

use alloy_primitives::{Address, B256, U256};
use alloy_sol_types::SolEvent;
use serde::{Deserialize, Serialize};

use crate::contracts::{
    Disclosure, IDisclosureAgreementTracker as tracker, IDisclosureManager as ledger,
    DISCLOSURE_ADDED_EVENT,
};
use crate::error::{CatenaError, CatenaResult};
use crate::provider::{ChainProvider, Log, ProviderError, TransactionReceipt};

/// The record returned once a disclosure is mined.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedTransaction {
    /// Transaction id.
    pub tx_id: B256,
    /// Ledger address.
    pub contract_address: Address,
    /// Network id as reported by the node.
    pub network_id: String,
    /// Row assigned by the ledger.
    pub row_number: u64,
    /// Block the transaction was mined in.
    pub block_number: u64,
    /// Timestamp of that block.
    pub block_timestamp: u64,
}

/// A decoded `disclosureAdded` log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisclosureAdded {
    /// Row assigned by the ledger.
    pub row_number: u64,
    /// Published fields.
    pub disclosure: Disclosure,
}

/// An event emitted by the agreement tracker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum AgreementEvent {
    /// A new agreement was registered.
    #[serde(rename = "agreementAdded", rename_all = "camelCase")]
    Added {
        /// Agreement hash.
        agreement_hash: B256,
        /// Disclosure row covered.
        disclosure_index: u64,
    },
    /// One signatory signed.
    #[serde(rename = "agreementSigned", rename_all = "camelCase")]
    Signed {
        /// Agreement hash.
        agreement_hash: B256,
        /// Account that signed.
        signatory: Address,
    },
    /// The last required signature was collected.
    #[serde(rename = "agreementFullySigned", rename_all = "camelCase")]
    FullySigned {
        /// Agreement hash.
        agreement_hash: B256,
    },
}

impl AgreementEvent {
    /// Hash of the agreement the event refers to.
    #[must_use]
    pub fn agreement_hash(&self) -> B256 {
        match self {
            Self::Added { agreement_hash, .. }
            | Self::Signed { agreement_hash, .. }
            | Self::FullySigned { agreement_hash } => *agreement_hash,
        }
    }
}

/// Builds the log a contract emits for `event`.
#[must_use]
pub fn encode_log<E: SolEvent>(address: Address, event: &E) -> Log {
    Log {
        address,
        topics: event.encode_topics().into_iter().map(|topic| topic.0).collect(),
        data: event.encode_data().into(),
        ..Log::default()
    }
}

/// Whether `log` is a `disclosureAdded` log of the ledger at `contract`.
#[inline]
#[must_use]
pub fn is_disclosure_added(contract: Address, log: &Log) -> bool {
    log.address == contract
        && log.topics.first() == Some(&ledger::disclosureAdded::SIGNATURE_HASH)
}

/// Decodes a `disclosureAdded` log.
///
/// # Errors
///
/// `MalformedRowNumber` if the log does not decode or the row does not fit
/// in a `u64`.
pub fn decode_disclosure_added(log: &Log) -> CatenaResult<DisclosureAdded> {
    let event =
        ledger::disclosureAdded::decode_raw_log(log.topics.iter().copied(), &log.data, true)
            .map_err(|e| CatenaError::MalformedRowNumber(e.to_string()))?;

    let row_number = row_number(event.rowNumber)?;
    let amends = u64::try_from(event.amends).unwrap_or(0);
    let disclosure = Disclosure::from_words(
        [
            &event.organization,
            &event.recipient,
            &event.location,
            &event.amount,
            &event.fundingType,
            &event.date,
            &event.purpose,
            &event.comment,
        ],
        amends,
    );
    Ok(DisclosureAdded {
        row_number,
        disclosure,
    })
}

fn row_number(value: U256) -> CatenaResult<u64> {
    u64::try_from(value).map_err(|_| CatenaError::MalformedRowNumber(value.to_string()))
}

/// Finds the `disclosureAdded` log of `contract` in a receipt.
///
/// # Errors
///
/// `MissingEventLog` when the receipt has no such log.
pub fn find_disclosure_added(
    contract: Address,
    receipt: &TransactionReceipt,
) -> CatenaResult<&Log> {
    receipt
        .logs
        .iter()
        .find(|log| is_disclosure_added(contract, log))
        .ok_or(CatenaError::MissingEventLog {
            tx_id: receipt.transaction_hash,
            event: DISCLOSURE_ADDED_EVENT,
        })
}

/// Decodes a mined receipt into its [`PublishedTransaction`].
///
/// # Errors
///
/// `MissingEventLog`, `MalformedRowNumber`, or a network error from the two
/// enrichment lookups.
pub async fn correlate<P>(
    provider: &P,
    contract: Address,
    receipt: &TransactionReceipt,
) -> CatenaResult<PublishedTransaction>
where
    P: ChainProvider + ?Sized,
{
    let log = find_disclosure_added(contract, receipt)?;
    let added = decode_disclosure_added(log)?;
    let block_number = receipt
        .block_number
        .or(log.block_number)
        .ok_or_else(|| pending(receipt.transaction_hash))?;
    let network_id = provider.network_id().await?;
    enrich(
        provider,
        contract,
        receipt.transaction_hash,
        added.row_number,
        block_number,
        network_id,
    )
    .await
}

/// Attaches network id and block timestamp to a decoded row.
///
/// # Errors
///
/// A network error if the block cannot be fetched.
pub async fn enrich<P>(
    provider: &P,
    contract: Address,
    tx_id: B256,
    row_number: u64,
    block_number: u64,
    network_id: String,
) -> CatenaResult<PublishedTransaction>
where
    P: ChainProvider + ?Sized,
{
    let block = provider.block_by_number(block_number).await?.ok_or_else(|| {
        ProviderError::InvalidResponse(format!("block {block_number} not found"))
    })?;

    Ok(PublishedTransaction {
        tx_id,
        contract_address: contract,
        network_id,
        row_number,
        block_number: block.number,
        block_timestamp: block.timestamp,
    })
}

fn pending(tx_id: B256) -> CatenaError {
    CatenaError::InvalidReceipt {
        expected: tx_id,
        reason: "receipt is not mined".to_string(),
    }
}

/// Decodes every agreement-tracker event of `contract` in `logs`, in order.
///
/// Logs of other contracts or other events are skipped.
///
/// # Errors
///
/// `AbiDecode` if a tracker log does not decode.
pub fn decode_agreement_events(contract: Address, logs: &[Log]) -> CatenaResult<Vec<AgreementEvent>> {
    let mut events = Vec::new();
    for log in logs.iter().filter(|log| log.address == contract) {
        let Some(topic0) = log.topics.first() else {
            continue;
        };
        let topics = log.topics.iter().copied();
        if *topic0 == tracker::agreementAdded::SIGNATURE_HASH {
            let event = tracker::agreementAdded::decode_raw_log(topics, &log.data, true)?;
            let disclosure_index = u64::try_from(event.disclosureIndex).map_err(|_| {
                CatenaError::AbiDecode(format!("disclosureIndex {} overflows", event.disclosureIndex))
            })?;
            events.push(AgreementEvent::Added {
                agreement_hash: event.agreementHash,
                disclosure_index,
            });
        } else if *topic0 == tracker::agreementSigned::SIGNATURE_HASH {
            let event = tracker::agreementSigned::decode_raw_log(topics, &log.data, true)?;
            events.push(AgreementEvent::Signed {
                agreement_hash: event.agreementHash,
                signatory: event.signatory,
            });
        } else if *topic0 == tracker::agreementFullySigned::SIGNATURE_HASH {
            let event = tracker::agreementFullySigned::decode_raw_log(topics, &log.data, true)?;
            events.push(AgreementEvent::FullySigned {
                agreement_hash: event.agreementHash,
            });
        }
    }
    Ok(events)
}
