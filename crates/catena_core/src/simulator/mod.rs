//! # Chain Simulator
//!
//! An in-process chain that implements both contracts behind the
//! [`ChainProvider`] seam. Used by tests and benches in place of a node.
//!
//! Behaviour mirrors a development node:
//!
//! - node-managed accounts, the first one owning the ledger
//! - automine (one block per transaction) or manual mining via [`ChainSimulator::mine`]
//! - reverting transactions are rejected at send time with an RPC error
//! - deterministic transaction hashes, block hashes and timestamps
//!
//! Receipts can be tampered with per transaction to exercise receipt
//! validation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_sol_types::{SolCall, SolInterface};
use async_trait::async_trait;
use parking_lot::Mutex;

use crate::contracts::{
    IDisclosureAgreementTracker as tracker, IDisclosureManager as ledger,
};
use crate::events::encode_log;
use crate::provider::{
    Block, CallRequest, ChainProvider, Log, LogFilter, ProviderError, ProviderResult,
    TransactionReceipt, TransactionRequest,
};

/// Error code development nodes use for reverts.
pub const REVERT_CODE: i64 = -32000;

const BASE_GAS: u64 = 21_000;
const GAS_PER_DATA_BYTE: u64 = 68;
const STORAGE_GAS: u64 = 20_000;

/// Simulator settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SimulatorConfig {
    /// Value returned by `net_version`.
    pub network_id: String,
    /// Value returned by `eth_gasPrice`.
    pub gas_price: u128,
    /// Number of node-managed accounts.
    pub accounts: usize,
    /// Timestamp of block 0.
    pub genesis_timestamp: u64,
    /// Seconds between blocks.
    pub block_time: u64,
    /// Mine a block for every transaction.
    pub automine: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            network_id: "5777".to_string(),
            gas_price: 20_000_000_000,
            accounts: 5,
            genesis_timestamp: 1_500_000_000,
            block_time: 15,
            automine: true,
        }
    }
}

impl SimulatorConfig {
    /// Disables automine.
    #[must_use]
    pub fn manual_mining(mut self) -> Self {
        self.automine = false;
        self
    }

    /// Sets the network id.
    #[must_use]
    pub fn with_network_id(mut self, network_id: impl Into<String>) -> Self {
        self.network_id = network_id.into();
        self
    }
}

/// How a returned receipt is corrupted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReceiptTampering {
    /// Report another transaction's hash.
    ForeignHash,
    /// Drop every log.
    StripLogs,
}

/// In-process chain with both contracts deployed.
pub struct ChainSimulator {
    config: SimulatorConfig,
    state: Mutex<ChainState>,
    rpc_calls: AtomicU64,
}

struct PendingTransaction {
    hash: B256,
    from: Address,
    to: Address,
    data: Bytes,
}

struct ChainState {
    automine: bool,
    accounts: Vec<Address>,
    nonces: HashMap<Address, u64>,
    blocks: Vec<Block>,
    pending: Vec<PendingTransaction>,
    receipts: HashMap<B256, TransactionReceipt>,
    logs: Vec<Log>,
    contracts: Contracts,
    tampering: HashMap<B256, ReceiptTampering>,
}

#[derive(Clone)]
struct Entry {
    words: [B256; 8],
    amends: u64,
}

#[derive(Clone)]
struct AgreementRecord {
    previous: B256,
    disclosure_index: u64,
    block_number: u64,
    signatories: Vec<Address>,
    required: Vec<bool>,
}

impl AgreementRecord {
    fn signed_count(&self) -> u64 {
        self.required.iter().filter(|required| !**required).count() as u64
    }

    fn is_fully_signed(&self) -> bool {
        self.required.iter().all(|required| !*required)
    }
}

/// Contract storage. Cloned for dry runs.
#[derive(Clone)]
struct Contracts {
    owner: Address,
    ledger: Address,
    tracker: Address,
    entries: Vec<Entry>,
    amended_by: HashMap<u64, u64>,
    agreements: HashMap<B256, AgreementRecord>,
    latest: HashMap<u64, (B256, u64)>,
    agreement_count: u64,
}

fn derive_address(label: &str) -> Address {
    Address::from_word(keccak256(label.as_bytes()))
}

fn revert(reason: impl Into<String>) -> String {
    reason.into()
}

fn index(value: U256) -> Result<u64, String> {
    u64::try_from(value).map_err(|_| revert(format!("index {value} out of range")))
}

impl Contracts {
    fn new(owner: Address) -> Self {
        Self {
            owner,
            ledger: derive_address("catena-simulator/DisclosureManager"),
            tracker: derive_address("catena-simulator/DisclosureAgreementTracker"),
            entries: Vec::new(),
            amended_by: HashMap::new(),
            agreements: HashMap::new(),
            latest: HashMap::new(),
            agreement_count: 0,
        }
    }

    fn only_owner(&self, from: Address) -> Result<(), String> {
        if from == self.owner {
            Ok(())
        } else {
            Err(revert("caller is not the owner"))
        }
    }

    fn entry(&self, number: u64) -> Result<&Entry, String> {
        usize::try_from(number)
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|n| self.entries.get(n))
            .ok_or_else(|| revert(format!("entry {number} does not exist")))
    }

    fn latest_row(&self, mut row: u64) -> u64 {
        while let Some(next) = self.amended_by.get(&row) {
            row = *next;
        }
        row
    }

    fn push_entry(&mut self, words: [B256; 8], amends: u64) -> Log {
        self.entries.push(Entry { words, amends });
        let row = self.entries.len() as u64;
        if amends > 0 {
            self.amended_by.insert(amends, row);
        }
        let [organization, recipient, location, amount, funding_type, date, purpose, comment] =
            words;
        encode_log(
            self.ledger,
            &ledger::disclosureAdded {
                rowNumber: U256::from(row),
                organization,
                recipient,
                location,
                amount,
                fundingType: funding_type,
                date,
                purpose,
                comment,
                amends: U256::from(amends),
            },
        )
    }

    /// Runs a transaction. Returns the emitted logs or the revert reason.
    fn execute(
        &mut self,
        from: Address,
        to: Address,
        data: &[u8],
        block_number: u64,
    ) -> Result<Vec<Log>, String> {
        if to == self.ledger {
            let call = ledger::IDisclosureManagerCalls::abi_decode(data, true)
                .map_err(|e| revert(e.to_string()))?;
            match call {
                ledger::IDisclosureManagerCalls::newEntry(c) => {
                    self.only_owner(from)?;
                    let words = [
                        c.organization,
                        c.recipient,
                        c.location,
                        c.amount,
                        c.fundingType,
                        c.date,
                        c.purpose,
                        c.comment,
                    ];
                    Ok(vec![self.push_entry(words, 0)])
                }
                ledger::IDisclosureManagerCalls::amendEntry(c) => {
                    self.only_owner(from)?;
                    let target = index(c.rowNumber)?;
                    self.entry(target)?;
                    let words = [
                        c.organization,
                        c.recipient,
                        c.location,
                        c.amount,
                        c.fundingType,
                        c.date,
                        c.purpose,
                        c.comment,
                    ];
                    Ok(vec![self.push_entry(words, target)])
                }
                _ => Ok(Vec::new()),
            }
        } else if to == self.tracker {
            let call = tracker::IDisclosureAgreementTrackerCalls::abi_decode(data, true)
                .map_err(|e| revert(e.to_string()))?;
            match call {
                tracker::IDisclosureAgreementTrackerCalls::addAgreement(c) => {
                    self.add_agreement(c, block_number)
                }
                tracker::IDisclosureAgreementTrackerCalls::signAgreement(c) => {
                    self.sign_agreement(from, c.agreementHash)
                }
                _ => Ok(Vec::new()),
            }
        } else {
            Ok(Vec::new())
        }
    }

    fn add_agreement(
        &mut self,
        call: tracker::addAgreementCall,
        block_number: u64,
    ) -> Result<Vec<Log>, String> {
        if self.agreements.contains_key(&call.agreementHash) {
            return Err(revert("agreement already exists"));
        }
        if call.signatories.is_empty() {
            return Err(revert("agreement needs signatories"));
        }
        let disclosure_index = index(call.disclosureIndex)?;
        let (previous, count) = self
            .latest
            .get(&disclosure_index)
            .copied()
            .unwrap_or((B256::ZERO, 0));

        self.agreements.insert(
            call.agreementHash,
            AgreementRecord {
                previous,
                disclosure_index,
                block_number,
                required: vec![true; call.signatories.len()],
                signatories: call.signatories,
            },
        );
        self.latest
            .insert(disclosure_index, (call.agreementHash, count + 1));
        self.agreement_count += 1;

        Ok(vec![encode_log(
            self.tracker,
            &tracker::agreementAdded {
                agreementHash: call.agreementHash,
                disclosureIndex: call.disclosureIndex,
            },
        )])
    }

    fn sign_agreement(&mut self, from: Address, hash: B256) -> Result<Vec<Log>, String> {
        let tracker_address = self.tracker;
        let record = self
            .agreements
            .get_mut(&hash)
            .ok_or_else(|| revert("agreement does not exist"))?;
        let position = record
            .signatories
            .iter()
            .position(|signatory| *signatory == from)
            .ok_or_else(|| revert("sender is not a signatory"))?;
        if !record.required[position] {
            return Err(revert("sender already signed"));
        }
        record.required[position] = false;

        let mut logs = vec![encode_log(
            tracker_address,
            &tracker::agreementSigned {
                agreementHash: hash,
                signatory: from,
            },
        )];
        if record.is_fully_signed() {
            logs.push(encode_log(
                tracker_address,
                &tracker::agreementFullySigned { agreementHash: hash },
            ));
        }
        Ok(logs)
    }

    /// Runs a read-only call. Returns the ABI-encoded return data.
    fn view(&self, to: Address, data: &[u8]) -> Result<Vec<u8>, String> {
        if to == self.ledger {
            self.view_ledger(data)
        } else if to == self.tracker {
            self.view_tracker(data)
        } else {
            Ok(Vec::new())
        }
    }

    fn view_ledger(&self, data: &[u8]) -> Result<Vec<u8>, String> {
        use ledger::IDisclosureManagerCalls as Call;

        let call = Call::abi_decode(data, true).map_err(|e| revert(e.to_string()))?;
        let encode_entry = |entry: &Entry| {
            let [a, b, c, d, e, f, g, h] = entry.words;
            (a, b, c, d, e, f, g, h, U256::from(entry.amends))
        };
        Ok(match call {
            Call::owner(_) => ledger::ownerCall::abi_encode_returns(&(self.owner,)),
            Call::getListCount(_) => ledger::getListCountCall::abi_encode_returns(&(U256::from(
                self.entries.len(),
            ),)),
            Call::pullRow(c) => {
                let row = self.latest_row(index(c.rowNumber)?);
                ledger::pullRowCall::abi_encode_returns(&encode_entry(self.entry(row)?))
            }
            Call::pullEntry(c) => {
                let entry = self.entry(index(c.entryNumber)?)?;
                ledger::pullEntryCall::abi_encode_returns(&encode_entry(entry))
            }
            Call::newEntry(_) | Call::amendEntry(_) => Vec::new(),
        })
    }

    fn view_tracker(&self, data: &[u8]) -> Result<Vec<u8>, String> {
        use tracker::IDisclosureAgreementTrackerCalls as Call;

        let call = Call::abi_decode(data, true).map_err(|e| revert(e.to_string()))?;
        let fully_signed_disclosure = |disclosure: u64| {
            self.latest
                .get(&disclosure)
                .and_then(|(hash, _)| self.agreements.get(hash))
                .is_some_and(AgreementRecord::is_fully_signed)
        };
        Ok(match call {
            Call::disclosureManager(_) => {
                tracker::disclosureManagerCall::abi_encode_returns(&(self.ledger,))
            }
            Call::agreementCount(_) => {
                tracker::agreementCountCall::abi_encode_returns(&(U256::from(self.agreement_count),))
            }
            Call::disclosureCount(_) => {
                tracker::disclosureCountCall::abi_encode_returns(&(U256::from(self.latest.len()),))
            }
            Call::getAgreement(c) => {
                let record = self
                    .agreements
                    .get(&c.agreementHash)
                    .ok_or_else(|| revert("agreement does not exist"))?;
                tracker::getAgreementCall::abi_encode_returns(&(
                    record.previous,
                    U256::from(record.disclosure_index),
                    U256::from(record.block_number),
                    U256::from(record.signed_count()),
                    record.signatories.clone(),
                    record.required.clone(),
                ))
            }
            Call::latestMap(c) => {
                let (latest, count) = self
                    .latest
                    .get(&index(c.disclosureIndex)?)
                    .copied()
                    .unwrap_or((B256::ZERO, 0));
                tracker::latestMapCall::abi_encode_returns(&(latest, U256::from(count)))
            }
            Call::hasAgreement(c) => tracker::hasAgreementCall::abi_encode_returns(&(self
                .agreements
                .contains_key(&c.agreementHash),)),
            Call::hasDisclosureAgreement(c) => {
                let has = self.latest.contains_key(&index(c.disclosureIndex)?);
                tracker::hasDisclosureAgreementCall::abi_encode_returns(&(has,))
            }
            Call::isAgreementFullySigned(c) => {
                let signed = self
                    .agreements
                    .get(&c.agreementHash)
                    .is_some_and(AgreementRecord::is_fully_signed);
                tracker::isAgreementFullySignedCall::abi_encode_returns(&(signed,))
            }
            Call::isDisclosureFullySigned(c) => {
                let signed = fully_signed_disclosure(index(c.disclosureIndex)?);
                tracker::isDisclosureFullySignedCall::abi_encode_returns(&(signed,))
            }
            Call::addAgreement(_) | Call::signAgreement(_) => Vec::new(),
        })
    }
}

fn rpc_revert(reason: &str) -> ProviderError {
    ProviderError::Rpc {
        code: REVERT_CODE,
        message: format!("VM Exception while processing transaction: revert {reason}"),
    }
}

impl ChainSimulator {
    /// Creates a simulator with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(SimulatorConfig::default())
    }

    /// Creates a simulator with the given settings.
    #[must_use]
    pub fn with_config(config: SimulatorConfig) -> Self {
        let accounts: Vec<Address> = (0..config.accounts.max(1))
            .map(|i| derive_address(&format!("catena-simulator/account/{i}")))
            .collect();
        let genesis = Block {
            number: 0,
            hash: keccak256(b"catena-simulator/genesis"),
            timestamp: config.genesis_timestamp,
        };
        let state = ChainState {
            automine: config.automine,
            contracts: Contracts::new(accounts[0]),
            accounts,
            nonces: HashMap::new(),
            blocks: vec![genesis],
            pending: Vec::new(),
            receipts: HashMap::new(),
            logs: Vec::new(),
            tampering: HashMap::new(),
        };
        Self {
            config,
            state: Mutex::new(state),
            rpc_calls: AtomicU64::new(0),
        }
    }

    /// Ledger address.
    #[must_use]
    pub fn ledger_address(&self) -> Address {
        self.state.lock().contracts.ledger
    }

    /// Agreement tracker address.
    #[must_use]
    pub fn tracker_address(&self) -> Address {
        self.state.lock().contracts.tracker
    }

    /// Ledger owner, the first account.
    #[must_use]
    pub fn owner(&self) -> Address {
        self.state.lock().contracts.owner
    }

    /// Node-managed account by index.
    #[must_use]
    pub fn account(&self, index: usize) -> Option<Address> {
        self.state.lock().accounts.get(index).copied()
    }

    /// Number of provider calls served so far.
    #[must_use]
    pub fn rpc_calls(&self) -> u64 {
        self.rpc_calls.load(Ordering::Relaxed)
    }

    /// Transactions waiting for [`Self::mine`].
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Turns automine on or off.
    pub fn set_automine(&self, automine: bool) {
        self.state.lock().automine = automine;
    }

    /// Corrupts every receipt returned for `tx_id`.
    pub fn tamper_receipt(&self, tx_id: B256, tampering: ReceiptTampering) {
        self.state.lock().tampering.insert(tx_id, tampering);
    }

    /// Mines all pending transactions into one block. Returns its number.
    pub fn mine(&self) -> u64 {
        let mut state = self.state.lock();
        self.mine_block(&mut state)
    }

    fn count_call(&self) {
        self.rpc_calls.fetch_add(1, Ordering::Relaxed);
    }

    fn mine_block(&self, state: &mut ChainState) -> u64 {
        let parent = state.blocks.last().map_or(B256::ZERO, |block| block.hash);
        let number = state.blocks.len() as u64;
        let mut preimage = parent.to_vec();
        preimage.extend_from_slice(&number.to_be_bytes());
        let hash = keccak256(&preimage);
        let timestamp = self.config.genesis_timestamp + number * self.config.block_time;

        let mut log_index = 0_u64;
        for tx in std::mem::take(&mut state.pending) {
            let (status, logs) = match state.contracts.execute(tx.from, tx.to, &tx.data, number) {
                Ok(logs) => (true, logs),
                Err(reason) => {
                    tracing::debug!(tx_id = %tx.hash, %reason, "simulated transaction reverted");
                    (false, Vec::new())
                }
            };
            let logs: Vec<Log> = logs
                .into_iter()
                .map(|log| {
                    let log = Log {
                        block_number: Some(number),
                        transaction_hash: Some(tx.hash),
                        log_index: Some(log_index),
                        ..log
                    };
                    log_index += 1;
                    log
                })
                .collect();
            state.logs.extend(logs.iter().cloned());
            state.receipts.insert(
                tx.hash,
                TransactionReceipt {
                    transaction_hash: tx.hash,
                    block_number: Some(number),
                    block_hash: Some(hash),
                    status: Some(status),
                    logs,
                },
            );
        }

        state.blocks.push(Block {
            number,
            hash,
            timestamp,
        });
        number
    }

    fn intrinsic_gas(data: &[u8]) -> u64 {
        BASE_GAS + GAS_PER_DATA_BYTE * data.len() as u64
    }
}

impl Default for ChainSimulator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChainProvider for ChainSimulator {
    async fn network_id(&self) -> ProviderResult<String> {
        self.count_call();
        Ok(self.config.network_id.clone())
    }

    async fn accounts(&self) -> ProviderResult<Vec<Address>> {
        self.count_call();
        Ok(self.state.lock().accounts.clone())
    }

    async fn gas_price(&self) -> ProviderResult<u128> {
        self.count_call();
        Ok(self.config.gas_price)
    }

    async fn transaction_count(&self, address: Address) -> ProviderResult<u64> {
        self.count_call();
        Ok(self.state.lock().nonces.get(&address).copied().unwrap_or(0))
    }

    async fn estimate_gas(&self, request: &TransactionRequest) -> ProviderResult<u64> {
        self.count_call();
        let state = self.state.lock();
        let next_block = state.blocks.len() as u64;
        let logs = state
            .contracts
            .clone()
            .execute(request.from, request.to, &request.data, next_block)
            .map_err(|reason| rpc_revert(&reason))?;
        Ok(Self::intrinsic_gas(&request.data) + STORAGE_GAS * (logs.len() as u64 + 1))
    }

    async fn call(&self, request: &CallRequest) -> ProviderResult<Bytes> {
        self.count_call();
        let state = self.state.lock();
        state
            .contracts
            .view(request.to, &request.data)
            .map(Bytes::from)
            .map_err(|reason| rpc_revert(&reason))
    }

    async fn send_transaction(&self, request: &TransactionRequest) -> ProviderResult<B256> {
        self.count_call();
        let mut state = self.state.lock();

        if !state.accounts.contains(&request.from) {
            return Err(ProviderError::Rpc {
                code: REVERT_CODE,
                message: format!("sender account not recognized: {}", request.from),
            });
        }
        let nonce = state.nonces.get(&request.from).copied().unwrap_or(0);
        if let Some(requested) = request.nonce {
            if requested != nonce {
                return Err(ProviderError::Rpc {
                    code: REVERT_CODE,
                    message: format!("invalid nonce {requested}, expected {nonce}"),
                });
            }
        }
        if let Some(gas) = request.gas {
            let needed = Self::intrinsic_gas(&request.data);
            if gas < needed {
                return Err(ProviderError::Rpc {
                    code: REVERT_CODE,
                    message: format!("intrinsic gas too low: have {gas}, want {needed}"),
                });
            }
        }

        let next_block = state.blocks.len() as u64;
        state
            .contracts
            .clone()
            .execute(request.from, request.to, &request.data, next_block)
            .map_err(|reason| rpc_revert(&reason))?;

        let mut preimage = request.from.to_vec();
        preimage.extend_from_slice(&nonce.to_be_bytes());
        preimage.extend_from_slice(&request.data);
        let hash = keccak256(&preimage);

        state.nonces.insert(request.from, nonce + 1);
        state.pending.push(PendingTransaction {
            hash,
            from: request.from,
            to: request.to,
            data: request.data.clone(),
        });
        if state.automine {
            self.mine_block(&mut state);
        }
        Ok(hash)
    }

    async fn transaction_receipt(
        &self,
        tx_id: B256,
    ) -> ProviderResult<Option<TransactionReceipt>> {
        self.count_call();
        let state = self.state.lock();
        let Some(mut receipt) = state.receipts.get(&tx_id).cloned() else {
            return Ok(None);
        };
        match state.tampering.get(&tx_id) {
            Some(ReceiptTampering::ForeignHash) => {
                receipt.transaction_hash = keccak256(tx_id);
            }
            Some(ReceiptTampering::StripLogs) => receipt.logs.clear(),
            None => {}
        }
        Ok(Some(receipt))
    }

    async fn block_by_number(&self, number: u64) -> ProviderResult<Option<Block>> {
        self.count_call();
        let state = self.state.lock();
        Ok(usize::try_from(number)
            .ok()
            .and_then(|n| state.blocks.get(n))
            .copied())
    }

    async fn block_number(&self) -> ProviderResult<u64> {
        self.count_call();
        Ok(self.state.lock().blocks.len() as u64 - 1)
    }

    async fn logs(&self, filter: &LogFilter) -> ProviderResult<Vec<Log>> {
        self.count_call();
        let state = self.state.lock();
        Ok(state
            .logs
            .iter()
            .filter(|log| log.address == filter.address)
            .filter(|log| filter.topic0.map_or(true, |topic| log.topics.first() == Some(&topic)))
            .filter(|log| {
                let block = log.block_number.unwrap_or(0);
                block >= filter.from_block && filter.to_block.map_or(true, |to| block <= to)
            })
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_sol_types::SolEvent;

    fn entry_call(organization: &str) -> Bytes {
        let word = |text: &str| crate::encoding::encode_fixed_bytes("f", text, 32).unwrap();
        ledger::newEntryCall {
            organization: word(organization),
            recipient: word("r"),
            location: word("l"),
            amount: word("a"),
            fundingType: word("f"),
            date: word("d"),
            purpose: word("p"),
            comment: word("c"),
        }
        .abi_encode()
        .into()
    }

    #[tokio::test]
    async fn test_automine_assigns_rows() {
        let sim = ChainSimulator::new();
        let owner = sim.owner();
        let ledger_address = sim.ledger_address();

        for expected_row in 1..=3_u64 {
            let request = TransactionRequest::new(owner, ledger_address, entry_call("ORG"));
            let tx_id = sim.send_transaction(&request).await.unwrap();
            let receipt = sim.transaction_receipt(tx_id).await.unwrap().unwrap();
            assert_eq!(receipt.block_number, Some(expected_row));
            let event = ledger::disclosureAdded::decode_raw_log(
                receipt.logs[0].topics.iter().copied(),
                &receipt.logs[0].data,
                true,
            )
            .unwrap();
            assert_eq!(event.rowNumber, U256::from(expected_row));
        }
    }

    #[tokio::test]
    async fn test_manual_mining() {
        let sim = ChainSimulator::with_config(SimulatorConfig::default().manual_mining());
        let request = TransactionRequest::new(sim.owner(), sim.ledger_address(), entry_call("ORG"));
        let tx_id = sim.send_transaction(&request).await.unwrap();

        assert_eq!(sim.pending_count(), 1);
        assert_eq!(sim.transaction_receipt(tx_id).await.unwrap(), None);

        assert_eq!(sim.mine(), 1);
        let receipt = sim.transaction_receipt(tx_id).await.unwrap().unwrap();
        assert_eq!(receipt.status, Some(true));
    }

    #[tokio::test]
    async fn test_non_owner_reverts() {
        let sim = ChainSimulator::new();
        let stranger = sim.account(1).unwrap();
        let request = TransactionRequest::new(stranger, sim.ledger_address(), entry_call("ORG"));
        let err = sim.send_transaction(&request).await.unwrap_err();
        assert!(matches!(err, ProviderError::Rpc { code: REVERT_CODE, .. }));
        assert_eq!(sim.block_number().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_hashes_are_deterministic() {
        let first = ChainSimulator::new();
        let second = ChainSimulator::new();
        let request = TransactionRequest::new(first.owner(), first.ledger_address(), entry_call("X"));
        assert_eq!(
            first.send_transaction(&request).await.unwrap(),
            second.send_transaction(&request).await.unwrap()
        );
        assert_eq!(
            first.block_by_number(1).await.unwrap(),
            second.block_by_number(1).await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_tampering() {
        let sim = ChainSimulator::new();
        let request = TransactionRequest::new(sim.owner(), sim.ledger_address(), entry_call("ORG"));
        let tx_id = sim.send_transaction(&request).await.unwrap();

        sim.tamper_receipt(tx_id, ReceiptTampering::StripLogs);
        let receipt = sim.transaction_receipt(tx_id).await.unwrap().unwrap();
        assert!(receipt.logs.is_empty());

        sim.tamper_receipt(tx_id, ReceiptTampering::ForeignHash);
        let receipt = sim.transaction_receipt(tx_id).await.unwrap().unwrap();
        assert_ne!(receipt.transaction_hash, tx_id);
    }
}
