//! # Disclosure Store
//!
//! The batch input file is also the progress record.
//!
//! ## Format
//!
//! ```text
//! {
//!   "<id>": {
//!     "organization": ..., "comment": ..., "amends"?: <row>,
//!     "txId"?: "0x..", "blockNumber"?: n, "rowNumber"?: n,
//!     "blockTimestamp"?: n, "networkId"?: "..", "contractAddress"?: "0x.."
//!   }
//! }
//! ```
//!
//! ## Guarantees
//!
//! 1. **Order**: entries are written back in input order
//! 2. **Durability**: each transition is on disk when the call returns
//! 3. **Atomic replace**: the file is written to `<path>.tmp` and renamed,
//!    so a crash mid-write leaves the previous version intact
//!
//! Fields this crate does not know are carried through untouched, and a
//! malformed disclosure only fails its own entry when it is published.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use alloy_primitives::{Address, B256};
use catena_core::{CatenaError, CatenaResult, Disclosure, PublishedTransaction};
use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{PublisherError, PublisherResult};

const AMENDS: &str = "amends";

/// Where an entry is in the publishing lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryState {
    /// Never sent.
    Unpublished,
    /// Sent, confirmation not yet recorded.
    Sent(B256),
    /// Mined and correlated to a row.
    Confirmed,
}

/// One stored entry: the disclosure fields as read plus publishing progress.
///
/// The disclosure stays untyped until [`EntryRecord::disclosure`] is called,
/// so one malformed entry cannot keep the file from loading.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryRecord {
    /// Disclosure fields and anything else the input carried, in input order.
    #[serde(flatten)]
    pub payload: Map<String, Value>,
    /// Transaction id once sent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_id: Option<B256>,
    /// Block the transaction was mined in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    /// Row assigned by the ledger.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_number: Option<u64>,
    /// Timestamp of the mining block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_timestamp: Option<u64>,
    /// Network the entry was published on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_id: Option<String>,
    /// Ledger the entry was published to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_address: Option<Address>,
}

impl EntryRecord {
    /// Creates an unpublished record.
    #[must_use]
    pub fn new(disclosure: &Disclosure) -> Self {
        let mut payload = Map::new();
        for (name, value) in Disclosure::FIELD_NAMES.into_iter().zip(disclosure.fields()) {
            payload.insert(name.to_string(), Value::from(value));
        }
        if let Some(row) = disclosure.amends {
            payload.insert(AMENDS.to_string(), Value::from(row));
        }
        Self {
            payload,
            tx_id: None,
            block_number: None,
            row_number: None,
            block_timestamp: None,
            network_id: None,
            contract_address: None,
        }
    }

    /// Builds the typed disclosure from the stored fields.
    ///
    /// # Errors
    ///
    /// `InvalidArgumentType` when `amends` is not an integer or a text field
    /// is not a string, `MissingArgument` when a text field is absent.
    pub fn disclosure(&self) -> CatenaResult<Disclosure> {
        let amends = match self.payload.get(AMENDS) {
            None | Some(Value::Null) => None,
            Some(value) => Some(value.as_i64().ok_or_else(|| CatenaError::InvalidArgumentType {
                param: AMENDS.to_string(),
                expected: "uint256".to_string(),
                reason: format!("invalid 'amends' row number {value}: must be absent or a number > 0"),
            })?),
        };
        let function = if amends.is_some() { "amendEntry" } else { "newEntry" };

        let text = |name: &str| match self.payload.get(name) {
            Some(Value::String(text)) => Ok(text.clone()),
            None | Some(Value::Null) => Err(CatenaError::MissingArgument {
                function: function.to_string(),
                param: name.to_string(),
                ty: "bytes32".to_string(),
            }),
            Some(other) => Err(CatenaError::InvalidArgumentType {
                param: name.to_string(),
                expected: "bytes32".to_string(),
                reason: format!("expected a string, got {other}"),
            }),
        };
        let [organization, recipient, location, amount, funding_type, date, purpose, comment] =
            Disclosure::FIELD_NAMES;

        Ok(Disclosure {
            organization: text(organization)?,
            recipient: text(recipient)?,
            location: text(location)?,
            amount: text(amount)?,
            funding_type: text(funding_type)?,
            date: text(date)?,
            purpose: text(purpose)?,
            comment: text(comment)?,
            amends,
        })
    }

    /// A record is confirmed once both `txId` and `blockNumber` are present.
    #[must_use]
    pub fn state(&self) -> EntryState {
        match (self.tx_id, self.block_number) {
            (Some(_), Some(_)) => EntryState::Confirmed,
            (Some(tx_id), None) => EntryState::Sent(tx_id),
            (None, _) => EntryState::Unpublished,
        }
    }

    fn confirm(&mut self, published: &PublishedTransaction) {
        self.tx_id = Some(published.tx_id);
        self.block_number = Some(published.block_number);
        self.row_number = Some(published.row_number);
        self.block_timestamp = Some(published.block_timestamp);
        self.network_id = Some(published.network_id.clone());
        self.contract_address = Some(published.contract_address);
    }
}

/// File-backed, order-preserving map of entries.
pub struct DisclosureStore {
    path: PathBuf,
    entries: Mutex<Vec<(String, EntryRecord)>>,
}

impl DisclosureStore {
    /// Loads the store from `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not a JSON object, or
    /// holds an entry that is not an object. Disclosure fields are checked
    /// per entry by [`EntryRecord::disclosure`].
    pub fn open(path: impl AsRef<Path>) -> PublisherResult<Self> {
        let path = path.as_ref().to_path_buf();
        let source =
            fs::read_to_string(&path).map_err(|e| PublisherError::io("failed to read", &path, &e))?;
        let raw: Map<String, Value> =
            serde_json::from_str(&source).map_err(|e| PublisherError::InvalidStore {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;

        let entries = raw
            .into_iter()
            .map(|(id, value)| match serde_json::from_value(value) {
                Ok(record) => Ok((id, record)),
                Err(e) => Err(PublisherError::InvalidEntry {
                    id,
                    message: e.to_string(),
                }),
            })
            .collect::<PublisherResult<Vec<_>>>()?;

        tracing::debug!(path = %path.display(), entries = entries.len(), "store loaded");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Creates a store at `path` from in-memory entries and writes it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn create(
        path: impl AsRef<Path>,
        entries: impl IntoIterator<Item = (String, Disclosure)>,
    ) -> PublisherResult<Self> {
        let store = Self {
            path: path.as_ref().to_path_buf(),
            entries: Mutex::new(
                entries
                    .into_iter()
                    .map(|(id, disclosure)| (id, EntryRecord::new(&disclosure)))
                    .collect(),
            ),
        };
        store.save()?;
        Ok(store)
    }

    /// Path of the backing file.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Checks if the store has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Copy of all entries in file order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(String, EntryRecord)> {
        self.entries.lock().clone()
    }

    /// Copy of one entry.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<EntryRecord> {
        self.entries
            .lock()
            .iter()
            .find(|(key, _)| key == id)
            .map(|(_, record)| record.clone())
    }

    /// Copies the file to `<path>.<ISO-8601 timestamp>.bak`.
    ///
    /// # Errors
    ///
    /// Returns an error if the copy fails.
    pub fn backup(&self) -> PublisherResult<PathBuf> {
        let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let backup = PathBuf::from(format!("{}.{stamp}.bak", self.path.display()));
        fs::copy(&self.path, &backup).map_err(|e| PublisherError::io("failed to back up", &self.path, &e))?;
        Ok(backup)
    }

    /// Records the transaction id of a sent entry and saves.
    ///
    /// # Errors
    ///
    /// Unknown entry or a failed write.
    pub fn mark_sent(&self, id: &str, tx_id: B256) -> PublisherResult<()> {
        self.update(id, |record| record.tx_id = Some(tx_id))
    }

    /// Records the published result of an entry and saves.
    ///
    /// # Errors
    ///
    /// Unknown entry or a failed write.
    pub fn mark_confirmed(&self, id: &str, published: &PublishedTransaction) -> PublisherResult<()> {
        self.update(id, |record| record.confirm(published))
    }

    fn update(&self, id: &str, apply: impl FnOnce(&mut EntryRecord)) -> PublisherResult<()> {
        let mut entries = self.entries.lock();
        let (_, record) = entries
            .iter_mut()
            .find(|(key, _)| key == id)
            .ok_or_else(|| PublisherError::UnknownEntry(id.to_string()))?;
        apply(record);
        self.write(&entries)
    }

    /// Writes the current entries to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self) -> PublisherResult<()> {
        let entries = self.entries.lock();
        self.write(&entries)
    }

    fn write(&self, entries: &[(String, EntryRecord)]) -> PublisherResult<()> {
        let mut document = Map::with_capacity(entries.len());
        for (id, record) in entries {
            let value = serde_json::to_value(record).map_err(|e| PublisherError::InvalidEntry {
                id: id.clone(),
                message: e.to_string(),
            })?;
            document.insert(id.clone(), value);
        }

        let mut text = serde_json::to_string_pretty(&Value::Object(document)).map_err(|e| {
            PublisherError::InvalidStore {
                path: self.path.display().to_string(),
                message: e.to_string(),
            }
        })?;
        text.push('\n');

        let temp = PathBuf::from(format!("{}.tmp", self.path.display()));
        let mut file = File::create(&temp).map_err(|e| PublisherError::io("failed to create", &temp, &e))?;
        file.write_all(text.as_bytes())
            .map_err(|e| PublisherError::io("failed to write", &temp, &e))?;
        file.sync_all()
            .map_err(|e| PublisherError::io("failed to sync", &temp, &e))?;
        fs::rename(&temp, &self.path).map_err(|e| PublisherError::io("failed to replace", &self.path, &e))
    }
}

impl std::fmt::Debug for DisclosureStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisclosureStore")
            .field("path", &self.path)
            .field("entries", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store_path() -> PathBuf {
        let id = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("test_store_{id}.json"))
    }

    const INPUT: &str = r#"{
  "zeta": {
    "organization": "TEST ORG",
    "recipient": "GRANDMAS BAKING LTD.",
    "location": "WINNIPEG,MB,CA",
    "amount": "CAD 333770",
    "fundingType": "C",
    "date": "2016-Q1",
    "purpose": "NAICS:54321",
    "comment": "",
    "source": "sheet-4"
  },
  "alpha": {
    "organization": "TEST ORG",
    "recipient": "BITACCESS INC.",
    "location": "OTTAWA,ON,CA",
    "amount": "CAD 1234567",
    "fundingType": "G",
    "date": "2016-Q2",
    "purpose": "NAICS:44231",
    "comment": "MULTI_YEAR",
    "amends": 1,
    "txId": "0x1111111111111111111111111111111111111111111111111111111111111111"
  }
}
"#;

    fn published(tx_id: B256) -> PublishedTransaction {
        PublishedTransaction {
            tx_id,
            contract_address: Address::repeat_byte(0x42),
            network_id: "5777".to_string(),
            row_number: 12,
            block_number: 30,
            block_timestamp: 1_500_000_450,
        }
    }

    #[test]
    fn test_open_preserves_order_and_state() {
        let path = temp_store_path();
        fs::write(&path, INPUT).unwrap();

        let store = DisclosureStore::open(&path).unwrap();
        let entries = store.snapshot();
        assert_eq!(entries[0].0, "zeta");
        assert_eq!(entries[1].0, "alpha");
        assert_eq!(entries[0].1.state(), EntryState::Unpublished);
        assert_eq!(entries[1].1.state(), EntryState::Sent(B256::repeat_byte(0x11)));
        assert_eq!(entries[1].1.disclosure().unwrap().amends, Some(1));
        assert_eq!(entries[0].1.payload["source"], "sheet-4");

        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_unchanged_store_round_trips_byte_for_byte() {
        let path = temp_store_path();
        fs::write(&path, INPUT).unwrap();

        DisclosureStore::open(&path).unwrap().save().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), INPUT);

        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_transitions_are_persisted() {
        let path = temp_store_path();
        fs::write(&path, INPUT).unwrap();
        let store = DisclosureStore::open(&path).unwrap();
        let tx_id = B256::repeat_byte(0x22);

        store.mark_sent("zeta", tx_id).unwrap();
        let reopened = DisclosureStore::open(&path).unwrap();
        assert_eq!(reopened.get("zeta").unwrap().state(), EntryState::Sent(tx_id));

        store.mark_confirmed("zeta", &published(tx_id)).unwrap();
        let reopened = DisclosureStore::open(&path).unwrap();
        let record = reopened.get("zeta").unwrap();
        assert_eq!(record.state(), EntryState::Confirmed);
        assert_eq!(record.row_number, Some(12));
        assert_eq!(record.network_id.as_deref(), Some("5777"));
        assert_eq!(record.payload["source"], "sheet-4");

        assert!(!PathBuf::from(format!("{}.tmp", path.display())).exists());
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_unknown_entry() {
        let path = temp_store_path();
        fs::write(&path, INPUT).unwrap();
        let store = DisclosureStore::open(&path).unwrap();

        assert_eq!(
            store.mark_sent("missing", B256::ZERO),
            Err(PublisherError::UnknownEntry("missing".to_string()))
        );
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_invalid_entry_names_the_key() {
        let path = temp_store_path();
        fs::write(&path, r#"{"good": {"organization": "ORG"}, "broken": 5}"#).unwrap();

        let err = DisclosureStore::open(&path).unwrap_err();
        assert!(matches!(err, PublisherError::InvalidEntry { ref id, .. } if id == "broken"));
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_malformed_disclosure_loads_and_fails_alone() {
        let path = temp_store_path();
        fs::write(
            &path,
            r#"{"bad-amends": {"organization": "ORG", "amends": "3"}, "bad-text": {"organization": 5}}"#,
        )
        .unwrap();
        let store = DisclosureStore::open(&path).unwrap();
        assert_eq!(store.len(), 2);

        let err = store.get("bad-amends").unwrap().disclosure().unwrap_err();
        assert!(matches!(err, CatenaError::InvalidArgumentType { ref param, .. } if param == "amends"));
        let err = store.get("bad-text").unwrap().disclosure().unwrap_err();
        assert!(matches!(err, CatenaError::InvalidArgumentType { ref param, .. } if param == "organization"));
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_new_record_round_trips_to_disclosure() {
        let disclosure = Disclosure {
            organization: "TEST ORG".to_string(),
            comment: "MULTI_YEAR".to_string(),
            amends: Some(4),
            ..Disclosure::default()
        };
        let record = EntryRecord::new(&disclosure);
        assert_eq!(record.payload["fundingType"], "");
        assert_eq!(record.disclosure().unwrap(), disclosure);

        let mut missing = record;
        missing.payload.remove("recipient");
        assert!(matches!(
            missing.disclosure().unwrap_err(),
            CatenaError::MissingArgument { ref param, ref function, .. } if param == "recipient" && function == "amendEntry"
        ));
    }

    #[test]
    fn test_backup_copies_file() {
        let path = temp_store_path();
        fs::write(&path, INPUT).unwrap();
        let store = DisclosureStore::open(&path).unwrap();

        let backup = store.backup().unwrap();
        let name = backup.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.ends_with("Z.bak"), "{name}");
        assert_eq!(fs::read_to_string(&backup).unwrap(), INPUT);

        fs::remove_file(&backup).ok();
        fs::remove_file(&path).ok();
    }
}
