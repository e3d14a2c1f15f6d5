//! # Binding Error Types
//!
//! All errors that can occur between a typed call and a decoded result.
//!
//! Argument and encoding errors are produced synchronously, before the
//! provider is touched. Everything the node reports comes back as
//! [`CatenaError::Network`] and is never retried here.

use alloy_primitives::{Address, B256};
use thiserror::Error;

use crate::provider::ProviderError;

/// Errors that can occur in the binding layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatenaError {
    /// A value cannot be coerced into the declared parameter type.
    #[error("invalid argument {param} ({expected}): {reason}")]
    InvalidArgumentType {
        /// Parameter name.
        param: String,
        /// Declared solidity type.
        expected: String,
        /// What was wrong with the value.
        reason: String,
    },

    /// A declared parameter has no value, or the value is null.
    #[error("missing arg {param} ({ty}) for function {function}")]
    MissingArgument {
        /// Function being resolved.
        function: String,
        /// Parameter name.
        param: String,
        /// Declared solidity type.
        ty: String,
    },

    /// The function is not part of the contract interface.
    #[error("function {function} does not exist on contract {contract}")]
    UnknownFunction {
        /// Contract name.
        contract: String,
        /// Requested function name.
        function: String,
    },

    /// The explicit sender is not the account the contract is gated on.
    #[error("invalid 'from' address {from}: contract is owned by {owner}")]
    UnauthorizedSender {
        /// Requested sender.
        from: Address,
        /// Contract owner.
        owner: Address,
    },

    /// The receipt does not belong to the requested transaction or has no logs.
    #[error("received invalid receipt for {expected}: {reason}")]
    InvalidReceipt {
        /// Transaction id that was requested.
        expected: B256,
        /// Why the receipt was rejected.
        reason: String,
    },

    /// No log of the expected event was found in the receipt.
    #[error("could not find {event} event in logs of transaction {tx_id}")]
    MissingEventLog {
        /// Transaction id.
        tx_id: B256,
        /// Expected event name.
        event: &'static str,
    },

    /// The row number carried by the event is not a usable integer.
    #[error("received invalid rowNumber: {0}")]
    MalformedRowNumber(String),

    /// Agreement arguments violate an invariant.
    #[error("invalid agreement: {0}")]
    InvalidAgreement(String),

    /// A configured confirmation timeout elapsed.
    #[error("timed out after {waited_ms}ms waiting for confirmation of {tx_id}")]
    ConfirmationTimeout {
        /// Transaction id.
        tx_id: B256,
        /// How long we waited.
        waited_ms: u64,
    },

    /// Return data or log data did not decode against the interface.
    #[error("abi decoding failed: {0}")]
    AbiDecode(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Any provider round-trip failure.
    #[error("network error: {0}")]
    Network(#[from] ProviderError),
}

impl CatenaError {
    /// Shorthand for an [`CatenaError::InvalidArgumentType`].
    pub(crate) fn invalid_argument(
        param: impl Into<String>,
        expected: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidArgumentType {
            param: param.into(),
            expected: expected.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error was raised before any network call.
    #[must_use]
    pub fn is_argument_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgumentType { .. }
                | Self::MissingArgument { .. }
                | Self::UnknownFunction { .. }
                | Self::InvalidAgreement(_)
        )
    }
}

impl From<alloy_sol_types::Error> for CatenaError {
    fn from(e: alloy_sol_types::Error) -> Self {
        Self::AbiDecode(e.to_string())
    }
}

/// Result type for binding operations.
pub type CatenaResult<T> = Result<T, CatenaError>;
