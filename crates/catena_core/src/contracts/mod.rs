//! # Contract Definitions
//!
//! Solidity interfaces of the disclosure ledger and the agreement tracker,
//! plus the domain records the binding exchanges with callers.

// The sol! macro generates code that we can't document, so allow missing_docs
#![allow(missing_docs)]

pub mod descriptor;

use std::collections::BTreeMap;

use alloy_primitives::{Address, B256};
use alloy_sol_types::sol;
use serde::{Deserialize, Serialize};

use crate::encoding::decode_fixed_text;
use crate::error::{CatenaError, CatenaResult};
use crate::resolver::CallArgs;

pub use descriptor::{
    ContractDescriptor, FunctionDescriptor, ParamDescriptor, ParamType, AGREEMENT_TRACKER,
    DISCLOSURE_MANAGER,
};

sol! {
    /// The disclosure ledger. Every publication gets the next row number.
    #[derive(Debug, PartialEq, Eq)]
    interface IDisclosureManager {
        /// Emitted for every new entry and every amendment.
        event disclosureAdded(
            uint256 rowNumber,
            bytes32 organization,
            bytes32 recipient,
            bytes32 location,
            bytes32 amount,
            bytes32 fundingType,
            bytes32 date,
            bytes32 purpose,
            bytes32 comment,
            uint256 amends
        );

        /// Account allowed to publish.
        function owner() external view returns (address owner);

        /// Publishes a new entry.
        function newEntry(
            bytes32 organization,
            bytes32 recipient,
            bytes32 location,
            bytes32 amount,
            bytes32 fundingType,
            bytes32 date,
            bytes32 purpose,
            bytes32 comment
        ) external;

        /// Publishes an entry superseding `rowNumber`.
        function amendEntry(
            uint256 rowNumber,
            bytes32 organization,
            bytes32 recipient,
            bytes32 location,
            bytes32 amount,
            bytes32 fundingType,
            bytes32 date,
            bytes32 purpose,
            bytes32 comment
        ) external;

        /// Latest version of a row.
        function pullRow(uint256 rowNumber) external view returns (
            bytes32 organization,
            bytes32 recipient,
            bytes32 location,
            bytes32 amount,
            bytes32 fundingType,
            bytes32 date,
            bytes32 purpose,
            bytes32 comment,
            uint256 amends
        );

        /// A specific entry, amended or not.
        function pullEntry(uint256 entryNumber) external view returns (
            bytes32 organization,
            bytes32 recipient,
            bytes32 location,
            bytes32 amount,
            bytes32 fundingType,
            bytes32 date,
            bytes32 purpose,
            bytes32 comment,
            uint256 amends
        );

        /// Number of published entries.
        function getListCount() external view returns (uint256 count);
    }
}

sol! {
    /// Tracks agreements over disclosures and the signatures they collect.
    #[derive(Debug, PartialEq, Eq)]
    interface IDisclosureAgreementTracker {
        event agreementAdded(bytes32 agreementHash, uint256 disclosureIndex);
        event agreementSigned(bytes32 agreementHash, address signatory);
        event agreementFullySigned(bytes32 agreementHash);

        function disclosureManager() external view returns (address manager);
        function agreementCount() external view returns (uint256 count);
        function disclosureCount() external view returns (uint256 count);

        function addAgreement(
            bytes32 agreementHash,
            uint256 disclosureIndex,
            address[] signatories
        ) external;

        function signAgreement(bytes32 agreementHash) external;

        function getAgreement(bytes32 agreementHash) external view returns (
            bytes32 previous,
            uint256 disclosureIndex,
            uint256 blockNumber,
            uint256 signedCount,
            address[] signatories,
            bool[] requiredSignatures
        );

        function latestMap(uint256 disclosureIndex) external view returns (
            bytes32 latest,
            uint256 count
        );

        function hasAgreement(bytes32 agreementHash) external view returns (bool result);
        function hasDisclosureAgreement(uint256 disclosureIndex) external view returns (bool result);
        function isAgreementFullySigned(bytes32 agreementHash) external view returns (bool result);
        function isDisclosureFullySigned(uint256 disclosureIndex) external view returns (bool result);
    }
}

/// Name of the ledger event that carries the assigned row number.
pub const DISCLOSURE_ADDED_EVENT: &str = "disclosureAdded";

/// A disclosure as published to the ledger.
///
/// All eight text fields travel as `bytes32`. `amends`, when present, is the
/// row this entry supersedes and selects `amendEntry` over `newEntry`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Disclosure {
    /// Reporting organization.
    pub organization: String,
    /// Receiving party.
    pub recipient: String,
    /// Recipient location.
    pub location: String,
    /// Amount, currency included.
    pub amount: String,
    /// Funding type code.
    pub funding_type: String,
    /// Reporting period.
    pub date: String,
    /// Purpose code.
    pub purpose: String,
    /// Free-form comment.
    pub comment: String,
    /// Row this entry amends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amends: Option<i64>,
}

impl Disclosure {
    /// Names of the eight text fields, in contract argument order.
    pub const FIELD_NAMES: [&'static str; 8] = [
        "organization",
        "recipient",
        "location",
        "amount",
        "fundingType",
        "date",
        "purpose",
        "comment",
    ];

    /// Returns the eight text fields in contract argument order.
    #[must_use]
    pub fn fields(&self) -> [&str; 8] {
        [
            &self.organization,
            &self.recipient,
            &self.location,
            &self.amount,
            &self.funding_type,
            &self.date,
            &self.purpose,
            &self.comment,
        ]
    }

    /// Validates `amends` and returns the amended row, if any.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidArgumentType` when `amends` is zero or negative.
    pub fn amended_row(&self) -> CatenaResult<Option<u64>> {
        match self.amends {
            None => Ok(None),
            Some(row) if row > 0 => Ok(Some(row.unsigned_abs())),
            Some(row) => Err(CatenaError::invalid_argument(
                "amends",
                "uint256",
                format!("invalid 'amends' row number {row}: must be absent or a number > 0"),
            )),
        }
    }

    /// Whether publishing this disclosure goes through `amendEntry`.
    #[inline]
    #[must_use]
    pub fn is_amendment(&self) -> bool {
        self.amends.is_some()
    }

    /// Contract function that publishes this disclosure.
    #[inline]
    #[must_use]
    pub fn function_name(&self) -> &'static str {
        if self.is_amendment() {
            "amendEntry"
        } else {
            "newEntry"
        }
    }

    /// Builds the named argument bag for the publish call.
    ///
    /// # Errors
    ///
    /// Fails when `amends` is not a positive integer.
    pub fn to_call_args(&self) -> CatenaResult<CallArgs> {
        let mut args = CallArgs::named();
        if let Some(row) = self.amended_row()? {
            args = args.with("rowNumber", row);
        }
        for (name, value) in Self::FIELD_NAMES.into_iter().zip(self.fields()) {
            args = args.with(name, value);
        }
        Ok(args)
    }

    /// Rebuilds a disclosure from the words returned by `pullRow`/`pullEntry`.
    #[must_use]
    pub fn from_words(words: [&B256; 8], amends: u64) -> Self {
        let [organization, recipient, location, amount, funding_type, date, purpose, comment] =
            words.map(decode_fixed_text);
        Self {
            organization,
            recipient,
            location,
            amount,
            funding_type,
            date,
            purpose,
            comment,
            amends: i64::try_from(amends).ok().filter(|row| *row > 0),
        }
    }
}

/// Arguments for registering a new agreement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewAgreement {
    /// Hash identifying the agreement document.
    pub agreement_hash: B256,
    /// Disclosure row the agreement covers.
    pub disclosure_index: u64,
    /// Accounts that must sign, in order.
    pub signatories: Vec<Address>,
}

impl NewAgreement {
    /// Creates agreement arguments.
    #[must_use]
    pub fn new(agreement_hash: B256, disclosure_index: u64, signatories: Vec<Address>) -> Self {
        Self {
            agreement_hash,
            disclosure_index,
            signatories,
        }
    }

    /// Checks the invariants the tracker would otherwise revert on.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidAgreement` on an empty or duplicated signatory set,
    /// a zero address or a zero disclosure index.
    pub fn validate(&self) -> CatenaResult<()> {
        if self.signatories.is_empty() {
            return Err(CatenaError::InvalidAgreement(
                "signatories must not be empty".to_string(),
            ));
        }
        if self.disclosure_index == 0 {
            return Err(CatenaError::InvalidAgreement(
                "disclosureIndex must be a row number > 0".to_string(),
            ));
        }
        let mut seen = std::collections::BTreeSet::new();
        for signatory in &self.signatories {
            if signatory.is_zero() {
                return Err(CatenaError::InvalidAgreement(
                    "signatory must not be the zero address".to_string(),
                ));
            }
            if !seen.insert(*signatory) {
                return Err(CatenaError::InvalidAgreement(format!(
                    "duplicate signatory {signatory}"
                )));
            }
        }
        Ok(())
    }

    /// Builds the named argument bag for `addAgreement`.
    #[must_use]
    pub fn to_call_args(&self) -> CallArgs {
        CallArgs::named()
            .with("agreementHash", self.agreement_hash)
            .with("disclosureIndex", self.disclosure_index)
            .with("signatories", self.signatories.clone())
    }
}

/// An agreement as stored by the tracker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agreement {
    /// Tracker contract address.
    pub contract_address: Address,
    /// Ledger the tracker points at.
    pub disclosure_manager_address: Address,
    /// Hash of this agreement.
    pub agreement_hash: B256,
    /// Previous agreement for the same disclosure, zero if none.
    pub previous: B256,
    /// Disclosure row covered.
    pub disclosure_index: u64,
    /// Block the agreement was registered in.
    pub block_number: u64,
    /// Signatures collected so far.
    pub signed_count: u64,
    /// Required signatories, in order.
    pub signatories: Vec<Address>,
    /// `true` for every signatory that has not signed yet.
    pub required_signatures: BTreeMap<Address, bool>,
}

impl Agreement {
    /// Whether every signatory has signed.
    #[inline]
    #[must_use]
    pub fn is_fully_signed(&self) -> bool {
        self.signed_count == self.signatories.len() as u64
    }

    /// Signatories that still have to sign.
    #[must_use]
    pub fn pending_signatories(&self) -> Vec<Address> {
        self.signatories
            .iter()
            .filter(|address| self.required_signatures.get(*address).copied().unwrap_or(false))
            .copied()
            .collect()
    }
}
