//! # Contract Function Descriptors
//!
//! Immutable tables of every function the binding may call: name and the
//! ordered `(parameter name, solidity type)` list. Calls are resolved and
//! validated against these before anything is encoded.

use std::fmt;

use alloy_primitives::keccak256;
use alloy_sol_types::SolCall;

use super::{IDisclosureAgreementTracker as tracker, IDisclosureManager as ledger};
use crate::error::{CatenaError, CatenaResult};

/// Semantic type of a contract parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParamType {
    /// `bytesN`, `N` in `1..=32`.
    FixedBytes(usize),
    /// `uintN`.
    Uint(usize),
    /// `address`.
    Address,
    /// `address[]`.
    AddressArray,
    /// `bool`.
    Bool,
    /// `string`.
    String,
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FixedBytes(n) => write!(f, "bytes{n}"),
            Self::Uint(bits) => write!(f, "uint{bits}"),
            Self::Address => write!(f, "address"),
            Self::AddressArray => write!(f, "address[]"),
            Self::Bool => write!(f, "bool"),
            Self::String => write!(f, "string"),
        }
    }
}

/// One declared parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParamDescriptor {
    /// Parameter name as published in the ABI.
    pub name: &'static str,
    /// Declared type.
    pub ty: ParamType,
}

/// One contract function.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FunctionDescriptor {
    /// Function name.
    pub name: &'static str,
    /// Ordered inputs.
    pub inputs: &'static [ParamDescriptor],
    /// 4-byte selector.
    pub selector: [u8; 4],
    /// Whether the function changes state (sent as a transaction).
    pub mutates: bool,
}

impl FunctionDescriptor {
    /// Canonical signature, e.g. `pullRow(uint256)`.
    #[must_use]
    pub fn signature(&self) -> String {
        let types: Vec<String> = self.inputs.iter().map(|p| p.ty.to_string()).collect();
        format!("{}({})", self.name, types.join(","))
    }

    /// Selector computed from [`Self::signature`].
    #[must_use]
    pub fn computed_selector(&self) -> [u8; 4] {
        let hash = keccak256(self.signature().as_bytes());
        [hash[0], hash[1], hash[2], hash[3]]
    }
}

/// A contract's published interface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContractDescriptor {
    /// Contract name, used in error messages.
    pub name: &'static str,
    /// Every callable function.
    pub functions: &'static [FunctionDescriptor],
}

impl ContractDescriptor {
    /// Looks up a function by name.
    ///
    /// # Errors
    ///
    /// Fails with `UnknownFunction` if the contract has no such function.
    pub fn function(&self, name: &str) -> CatenaResult<&'static FunctionDescriptor> {
        self.functions
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| CatenaError::UnknownFunction {
                contract: self.name.to_string(),
                function: name.to_string(),
            })
    }
}

const fn param(name: &'static str, ty: ParamType) -> ParamDescriptor {
    ParamDescriptor { name, ty }
}

const TEXT: ParamType = ParamType::FixedBytes(32);
const UINT: ParamType = ParamType::Uint(256);

static NO_INPUTS: [ParamDescriptor; 0] = [];

static NEW_ENTRY_INPUTS: [ParamDescriptor; 8] = [
    param("organization", TEXT),
    param("recipient", TEXT),
    param("location", TEXT),
    param("amount", TEXT),
    param("fundingType", TEXT),
    param("date", TEXT),
    param("purpose", TEXT),
    param("comment", TEXT),
];

static AMEND_ENTRY_INPUTS: [ParamDescriptor; 9] = [
    param("rowNumber", UINT),
    param("organization", TEXT),
    param("recipient", TEXT),
    param("location", TEXT),
    param("amount", TEXT),
    param("fundingType", TEXT),
    param("date", TEXT),
    param("purpose", TEXT),
    param("comment", TEXT),
];

static ROW_NUMBER_INPUT: [ParamDescriptor; 1] = [param("rowNumber", UINT)];
static ENTRY_NUMBER_INPUT: [ParamDescriptor; 1] = [param("entryNumber", UINT)];
static AGREEMENT_HASH_INPUT: [ParamDescriptor; 1] = [param("agreementHash", TEXT)];
static DISCLOSURE_INDEX_INPUT: [ParamDescriptor; 1] = [param("disclosureIndex", UINT)];

static ADD_AGREEMENT_INPUTS: [ParamDescriptor; 3] = [
    param("agreementHash", TEXT),
    param("disclosureIndex", UINT),
    param("signatories", ParamType::AddressArray),
];

static LEDGER_FUNCTIONS: [FunctionDescriptor; 6] = [
    FunctionDescriptor {
        name: "owner",
        inputs: &NO_INPUTS,
        selector: <ledger::ownerCall as SolCall>::SELECTOR,
        mutates: false,
    },
    FunctionDescriptor {
        name: "newEntry",
        inputs: &NEW_ENTRY_INPUTS,
        selector: <ledger::newEntryCall as SolCall>::SELECTOR,
        mutates: true,
    },
    FunctionDescriptor {
        name: "amendEntry",
        inputs: &AMEND_ENTRY_INPUTS,
        selector: <ledger::amendEntryCall as SolCall>::SELECTOR,
        mutates: true,
    },
    FunctionDescriptor {
        name: "pullRow",
        inputs: &ROW_NUMBER_INPUT,
        selector: <ledger::pullRowCall as SolCall>::SELECTOR,
        mutates: false,
    },
    FunctionDescriptor {
        name: "pullEntry",
        inputs: &ENTRY_NUMBER_INPUT,
        selector: <ledger::pullEntryCall as SolCall>::SELECTOR,
        mutates: false,
    },
    FunctionDescriptor {
        name: "getListCount",
        inputs: &NO_INPUTS,
        selector: <ledger::getListCountCall as SolCall>::SELECTOR,
        mutates: false,
    },
];

static TRACKER_FUNCTIONS: [FunctionDescriptor; 11] = [
    FunctionDescriptor {
        name: "disclosureManager",
        inputs: &NO_INPUTS,
        selector: <tracker::disclosureManagerCall as SolCall>::SELECTOR,
        mutates: false,
    },
    FunctionDescriptor {
        name: "agreementCount",
        inputs: &NO_INPUTS,
        selector: <tracker::agreementCountCall as SolCall>::SELECTOR,
        mutates: false,
    },
    FunctionDescriptor {
        name: "disclosureCount",
        inputs: &NO_INPUTS,
        selector: <tracker::disclosureCountCall as SolCall>::SELECTOR,
        mutates: false,
    },
    FunctionDescriptor {
        name: "addAgreement",
        inputs: &ADD_AGREEMENT_INPUTS,
        selector: <tracker::addAgreementCall as SolCall>::SELECTOR,
        mutates: true,
    },
    FunctionDescriptor {
        name: "signAgreement",
        inputs: &AGREEMENT_HASH_INPUT,
        selector: <tracker::signAgreementCall as SolCall>::SELECTOR,
        mutates: true,
    },
    FunctionDescriptor {
        name: "getAgreement",
        inputs: &AGREEMENT_HASH_INPUT,
        selector: <tracker::getAgreementCall as SolCall>::SELECTOR,
        mutates: false,
    },
    FunctionDescriptor {
        name: "latestMap",
        inputs: &DISCLOSURE_INDEX_INPUT,
        selector: <tracker::latestMapCall as SolCall>::SELECTOR,
        mutates: false,
    },
    FunctionDescriptor {
        name: "hasAgreement",
        inputs: &AGREEMENT_HASH_INPUT,
        selector: <tracker::hasAgreementCall as SolCall>::SELECTOR,
        mutates: false,
    },
    FunctionDescriptor {
        name: "hasDisclosureAgreement",
        inputs: &DISCLOSURE_INDEX_INPUT,
        selector: <tracker::hasDisclosureAgreementCall as SolCall>::SELECTOR,
        mutates: false,
    },
    FunctionDescriptor {
        name: "isAgreementFullySigned",
        inputs: &AGREEMENT_HASH_INPUT,
        selector: <tracker::isAgreementFullySignedCall as SolCall>::SELECTOR,
        mutates: false,
    },
    FunctionDescriptor {
        name: "isDisclosureFullySigned",
        inputs: &DISCLOSURE_INDEX_INPUT,
        selector: <tracker::isDisclosureFullySignedCall as SolCall>::SELECTOR,
        mutates: false,
    },
];

/// Interface of the disclosure ledger.
pub static DISCLOSURE_MANAGER: ContractDescriptor = ContractDescriptor {
    name: "DisclosureManager",
    functions: &LEDGER_FUNCTIONS,
};

/// Interface of the agreement tracker.
pub static AGREEMENT_TRACKER: ContractDescriptor = ContractDescriptor {
    name: "DisclosureAgreementTracker",
    functions: &TRACKER_FUNCTIONS,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selectors_match_interface() {
        for contract in [&DISCLOSURE_MANAGER, &AGREEMENT_TRACKER] {
            for function in contract.functions {
                assert_eq!(
                    function.selector,
                    function.computed_selector(),
                    "{} selector drifted from {}",
                    function.name,
                    function.signature()
                );
            }
        }
    }

    #[test]
    fn test_signature_format() {
        let amend = DISCLOSURE_MANAGER.function("amendEntry").unwrap();
        assert!(amend.signature().starts_with("amendEntry(uint256,bytes32,"));

        let add = AGREEMENT_TRACKER.function("addAgreement").unwrap();
        assert_eq!(add.signature(), "addAgreement(bytes32,uint256,address[])");
    }

    #[test]
    fn test_unknown_function() {
        let err = DISCLOSURE_MANAGER.function("burnEverything").unwrap_err();
        assert_eq!(
            err,
            CatenaError::UnknownFunction {
                contract: "DisclosureManager".to_string(),
                function: "burnEverything".to_string(),
            }
        );
    }
}
