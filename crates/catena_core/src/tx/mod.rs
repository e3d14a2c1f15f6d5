//! # Transaction Builder
//!
//! Turns a [`ResolvedCall`] plus caller overrides into either a
//! [`TransactionRequest`] ready for `eth_sendTransaction` or a fully
//! resolved [`UnsignedTransaction`] for external signing.
//!
//! ## Resolution order
//!
//! | Field     | Override | Default                  | Fallback (network)        |
//! |-----------|----------|--------------------------|---------------------------|
//! | sender    | `from`   | contract owner           | first node account        |
//! | gas limit | `gas`    | per-operation default    | `eth_estimateGas`         |
//! | gas price | `gasPrice` | configured gas price   | `eth_gasPrice`            |
//! | nonce     | `nonce`  |                          | pending transaction count |
//!
//! An override always wins. For ownership-gated contracts an explicit `from`
//! must equal the owner.

use alloy_primitives::{hex, Address, Bytes};
use serde::{Deserialize, Serialize};

use crate::error::{CatenaError, CatenaResult};
use crate::provider::{format_quantity, ChainProvider, ProviderError, TransactionRequest};
use crate::resolver::ResolvedCall;

/// Caller-supplied transaction overrides.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TxOptions {
    /// Sender.
    pub from: Option<Address>,
    /// Gas limit.
    pub gas: Option<u64>,
    /// Gas price in wei.
    pub gas_price: Option<u128>,
    /// Nonce.
    pub nonce: Option<u64>,
}

impl TxOptions {
    /// Sets the sender.
    #[must_use]
    pub fn with_from(mut self, from: Address) -> Self {
        self.from = Some(from);
        self
    }

    /// Sets the gas limit.
    #[must_use]
    pub fn with_gas(mut self, gas: u64) -> Self {
        self.gas = Some(gas);
        self
    }

    /// Sets the gas price.
    #[must_use]
    pub fn with_gas_price(mut self, gas_price: u128) -> Self {
        self.gas_price = Some(gas_price);
        self
    }

    /// Sets the nonce.
    #[must_use]
    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = Some(nonce);
        self
    }
}

/// A transaction with every field resolved, numbers hex-encoded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsignedTransaction {
    /// Always `0x0`: calls move data, not value.
    pub value: String,
    /// ABI-encoded call data.
    pub data: String,
    /// Contract address.
    pub to: Address,
    /// Sender.
    pub from: Address,
    /// Gas limit.
    pub gas_limit: String,
    /// Gas price in wei.
    pub gas_price: String,
    /// Sender nonce.
    pub nonce: String,
    /// Network id reported by the node.
    pub chain_id: u64,
}

/// Decides the sender for a call.
///
/// # Errors
///
/// Fails with `UnauthorizedSender` when `owner` is set and an explicit
/// `from` differs from it.
pub fn resolve_sender(
    from: Option<Address>,
    owner: Option<Address>,
) -> CatenaResult<Option<Address>> {
    match (from, owner) {
        (Some(from), Some(owner)) if from != owner => {
            Err(CatenaError::UnauthorizedSender { from, owner })
        }
        (Some(from), _) => Ok(Some(from)),
        (None, owner) => Ok(owner),
    }
}

/// Builds transactions for one resolved call.
#[derive(Clone, Debug)]
pub struct TransactionBuilder {
    to: Address,
    call: ResolvedCall,
    options: TxOptions,
    owner: Option<Address>,
    default_gas: Option<u64>,
    default_gas_price: Option<u128>,
}

impl TransactionBuilder {
    /// Creates a builder for `call` on the contract at `to`.
    #[must_use]
    pub fn new(to: Address, call: ResolvedCall) -> Self {
        Self {
            to,
            call,
            options: TxOptions::default(),
            owner: None,
            default_gas: None,
            default_gas_price: None,
        }
    }

    /// Applies caller overrides.
    #[must_use]
    pub fn with_options(mut self, options: TxOptions) -> Self {
        self.options = options;
        self
    }

    /// Marks the contract as gated on `owner`.
    #[must_use]
    pub fn owner_gated(mut self, owner: Address) -> Self {
        self.owner = Some(owner);
        self
    }

    /// Gas limit used when no override is given.
    #[must_use]
    pub fn with_default_gas(mut self, gas: u64) -> Self {
        self.default_gas = Some(gas);
        self
    }

    /// Gas price used when no override is given.
    #[must_use]
    pub fn with_default_gas_price(mut self, gas_price: Option<u128>) -> Self {
        self.default_gas_price = gas_price;
        self
    }

    /// The call being built.
    #[inline]
    #[must_use]
    pub fn call(&self) -> &ResolvedCall {
        &self.call
    }

    /// Builds the request for `eth_sendTransaction`.
    ///
    /// Gas price and nonce are only set when overridden or configured; the
    /// node fills in the rest.
    ///
    /// # Errors
    ///
    /// Fails with `UnauthorizedSender` on an owner mismatch, or a network
    /// error if the sender has to be looked up.
    pub async fn request<P>(&self, provider: &P) -> CatenaResult<TransactionRequest>
    where
        P: ChainProvider + ?Sized,
    {
        let data = self.call.calldata()?;
        let from = match resolve_sender(self.options.from, self.owner)? {
            Some(from) => from,
            None => first_account(provider).await?,
        };

        let mut request = TransactionRequest::new(from, self.to, data);
        request.gas = self.options.gas.or(self.default_gas);
        request.gas_price = self.options.gas_price.or(self.default_gas_price);
        request.nonce = self.options.nonce;
        Ok(request)
    }

    /// Resolves every field, querying the network for whatever is unset.
    ///
    /// # Errors
    ///
    /// Fails with `UnauthorizedSender` on an owner mismatch or a network
    /// error from any lookup.
    pub async fn build<P>(&self, provider: &P) -> CatenaResult<UnsignedTransaction>
    where
        P: ChainProvider + ?Sized,
    {
        let mut request = self.request(provider).await?;

        let gas_price = match request.gas_price {
            Some(price) => price,
            None => provider.gas_price().await?,
        };
        let gas_limit = match request.gas {
            Some(gas) => gas,
            None => provider.estimate_gas(&request).await?,
        };
        let nonce = match request.nonce {
            Some(nonce) => nonce,
            None => provider.transaction_count(request.from).await?,
        };
        let network_id = provider.network_id().await?;
        let chain_id = network_id.trim().parse::<u64>().map_err(|e| {
            ProviderError::InvalidResponse(format!("network id {network_id} is not numeric: {e}"))
        })?;

        request.gas = Some(gas_limit);
        request.gas_price = Some(gas_price);
        request.nonce = Some(nonce);

        Ok(UnsignedTransaction {
            value: format_quantity(0_u64),
            data: encode_data(&request.data),
            to: request.to,
            from: request.from,
            gas_limit: format_quantity(gas_limit),
            gas_price: format_quantity(gas_price),
            nonce: format_quantity(nonce),
            chain_id,
        })
    }
}

fn encode_data(data: &Bytes) -> String {
    format!("0x{}", hex::encode(data))
}

/// First account managed by the node.
///
/// # Errors
///
/// Fails with `InvalidResponse` when the node manages no accounts.
pub async fn first_account<P>(provider: &P) -> CatenaResult<Address>
where
    P: ChainProvider + ?Sized,
{
    provider
        .accounts()
        .await?
        .first()
        .copied()
        .ok_or_else(|| ProviderError::InvalidResponse("node manages no accounts".to_string()).into())
}
