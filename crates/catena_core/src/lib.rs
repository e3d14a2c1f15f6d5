//! # Catena Core
//!
//! Typed client bindings for the disclosure ledger (`DisclosureManager`) and
//! the agreement tracker (`DisclosureAgreementTracker`).
//!
//! ## Architecture
//!
//! ```text
//! caller ──▶ Resolver ──▶ Coercion ──▶ TransactionBuilder ──▶ Orchestrator
//!                                                                │
//!                                                                ▼
//! caller ◀── PublishedTransaction ◀── Event Correlator ◀──── ChainProvider
//!                                            ▲                 (IPC / simulator)
//!                                            │
//!                               Live Subscription (poll task)
//! ```
//!
//! ## Guarantees
//!
//! - Argument errors are raised before any network round-trip
//! - Correlation is stateless: derivable from the mined receipt alone
//! - No retries: provider failures surface as [`CatenaError::Network`]

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod contracts;
pub mod encoding;
pub mod error;
pub mod events;
pub mod ipc;
pub mod listener;
pub mod orchestrator;
pub mod provider;
pub mod resolver;
#[cfg(feature = "simulator")]
pub mod simulator;
pub mod tx;

pub use client::CatenaClient;
pub use config::CatenaConfig;
pub use contracts::{Agreement, Disclosure, NewAgreement, AGREEMENT_TRACKER, DISCLOSURE_MANAGER};
pub use encoding::{AbiValue, ArgValue};
pub use error::{CatenaError, CatenaResult};
pub use events::{AgreementEvent, PublishedTransaction};
pub use ipc::{IpcConfig, IpcProvider, IpcStats};
pub use listener::{
    CancelToken, DisclosureEvent, DisclosureSubscription, SubscriptionConfig, SubscriptionStats,
};
pub use orchestrator::ConfirmationPolicy;
pub use provider::{ChainProvider, ProviderError, ProviderResult};
pub use resolver::{resolve, CallArgs, ResolvedCall};
#[cfg(feature = "simulator")]
pub use simulator::{ChainSimulator, ReceiptTampering, SimulatorConfig};
pub use tx::{TxOptions, UnsignedTransaction};
