//! # Catena Publisher
//!
//! Publishes a file of disclosures to the ledger, recording progress in the
//! same file so an interrupted run can be resumed.
//!
//! ## Usage
//!
//! ```bash
//! publish_disclosures -f disclosures.json -c 10
//! ```
//!
//! ## Components
//!
//! - [`DisclosureStore`]: order-preserving, atomically rewritten entry file
//! - [`UnconfirmedSet`]: transactions in flight
//! - [`BatchPublisher`]: bounded-concurrency send and confirm

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod publisher;
pub mod store;
pub mod unconfirmed;

pub use error::{PublisherError, PublisherResult};
pub use publisher::{BatchPublisher, BatchSummary, PublisherConfig, PublisherStats, DEFAULT_MAX_UNCONFIRMED};
pub use store::{DisclosureStore, EntryRecord, EntryState};
pub use unconfirmed::UnconfirmedSet;
