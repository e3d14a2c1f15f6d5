//! # Argument Resolver
//!
//! Maps a caller's argument bag onto the exact parameter order of a contract
//! function and coerces every value. Pure: no provider is involved, so every
//! argument error surfaces before a transaction is even built.
//!
//! Callers pick one of two explicit forms, [`CallArgs::Positional`] or
//! [`CallArgs::Named`]; nothing is inferred from the shape of the values.

use std::collections::BTreeMap;

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::SolCall;

use crate::contracts::{
    ContractDescriptor, FunctionDescriptor, IDisclosureAgreementTracker as tracker,
    IDisclosureManager as ledger,
};
use crate::encoding::{coerce, AbiValue, ArgValue};
use crate::error::{CatenaError, CatenaResult};

/// Arguments for a contract call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallArgs {
    /// Values in declaration order.
    Positional(Vec<ArgValue>),
    /// Values keyed by parameter name.
    Named(BTreeMap<String, ArgValue>),
}

impl CallArgs {
    /// An empty named bag.
    #[must_use]
    pub fn named() -> Self {
        Self::Named(BTreeMap::new())
    }

    /// An empty positional list.
    #[must_use]
    pub fn positional() -> Self {
        Self::Positional(Vec::new())
    }

    /// Adds a value. Named bags key it by `name`; positional lists append it.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        match &mut self {
            Self::Named(map) => {
                map.insert(name.into(), value.into());
            }
            Self::Positional(list) => list.push(value.into()),
        }
        self
    }

    /// Appends a positional value.
    #[must_use]
    pub fn push(self, value: impl Into<ArgValue>) -> Self {
        self.with(String::new(), value)
    }

    fn get(&self, index: usize, name: &str) -> Option<&ArgValue> {
        match self {
            Self::Positional(list) => list.get(index),
            Self::Named(map) => map.get(name),
        }
    }
}

impl Default for CallArgs {
    fn default() -> Self {
        Self::positional()
    }
}

/// A function call with every argument coerced, in declaration order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedCall {
    /// Function being called.
    pub function: &'static FunctionDescriptor,
    /// Coerced arguments.
    pub args: Vec<AbiValue>,
}

/// Resolves `args` against `function` on `contract`.
///
/// # Errors
///
/// - `UnknownFunction` if the contract has no such function
/// - `MissingArgument` if a declared parameter is absent or null
/// - `InvalidArgumentType` if a value cannot be coerced
pub fn resolve(
    contract: &ContractDescriptor,
    function: &str,
    args: &CallArgs,
) -> CatenaResult<ResolvedCall> {
    let function = contract.function(function)?;
    let args = function
        .inputs
        .iter()
        .enumerate()
        .map(|(index, param)| {
            let value = args
                .get(index, param.name)
                .filter(|value| !value.is_null())
                .ok_or_else(|| CatenaError::MissingArgument {
                    function: function.name.to_string(),
                    param: param.name.to_string(),
                    ty: param.ty.to_string(),
                })?;
            coerce(param, value)
        })
        .collect::<CatenaResult<Vec<_>>>()?;

    Ok(ResolvedCall { function, args })
}

impl ResolvedCall {
    /// Function name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.function.name
    }

    /// ABI-encodes the call: selector followed by the arguments.
    ///
    /// # Errors
    ///
    /// Fails if an argument does not have the variant its parameter needs,
    /// which only happens for hand-built calls.
    pub fn calldata(&self) -> CatenaResult<Bytes> {
        let encoded = match self.function.name {
            "owner" => ledger::ownerCall {}.abi_encode(),
            "getListCount" => ledger::getListCountCall {}.abi_encode(),
            "newEntry" => {
                let [organization, recipient, location, amount, funding_type, date, purpose, comment] =
                    self.words::<8>(0)?;
                ledger::newEntryCall {
                    organization,
                    recipient,
                    location,
                    amount,
                    fundingType: funding_type,
                    date,
                    purpose,
                    comment,
                }
                .abi_encode()
            }
            "amendEntry" => {
                let row_number = self.uint(0)?;
                let [organization, recipient, location, amount, funding_type, date, purpose, comment] =
                    self.words::<8>(1)?;
                ledger::amendEntryCall {
                    rowNumber: row_number,
                    organization,
                    recipient,
                    location,
                    amount,
                    fundingType: funding_type,
                    date,
                    purpose,
                    comment,
                }
                .abi_encode()
            }
            "pullRow" => ledger::pullRowCall {
                rowNumber: self.uint(0)?,
            }
            .abi_encode(),
            "pullEntry" => ledger::pullEntryCall {
                entryNumber: self.uint(0)?,
            }
            .abi_encode(),
            "disclosureManager" => tracker::disclosureManagerCall {}.abi_encode(),
            "agreementCount" => tracker::agreementCountCall {}.abi_encode(),
            "disclosureCount" => tracker::disclosureCountCall {}.abi_encode(),
            "addAgreement" => tracker::addAgreementCall {
                agreementHash: self.word(0)?,
                disclosureIndex: self.uint(1)?,
                signatories: self.addresses(2)?,
            }
            .abi_encode(),
            "signAgreement" => tracker::signAgreementCall {
                agreementHash: self.word(0)?,
            }
            .abi_encode(),
            "getAgreement" => tracker::getAgreementCall {
                agreementHash: self.word(0)?,
            }
            .abi_encode(),
            "latestMap" => tracker::latestMapCall {
                disclosureIndex: self.uint(0)?,
            }
            .abi_encode(),
            "hasAgreement" => tracker::hasAgreementCall {
                agreementHash: self.word(0)?,
            }
            .abi_encode(),
            "hasDisclosureAgreement" => tracker::hasDisclosureAgreementCall {
                disclosureIndex: self.uint(0)?,
            }
            .abi_encode(),
            "isAgreementFullySigned" => tracker::isAgreementFullySignedCall {
                agreementHash: self.word(0)?,
            }
            .abi_encode(),
            "isDisclosureFullySigned" => tracker::isDisclosureFullySignedCall {
                disclosureIndex: self.uint(0)?,
            }
            .abi_encode(),
            other => {
                return Err(CatenaError::UnknownFunction {
                    contract: "binding".to_string(),
                    function: other.to_string(),
                })
            }
        };
        Ok(Bytes::from(encoded))
    }

    fn arg(&self, index: usize) -> CatenaResult<&AbiValue> {
        self.args.get(index).ok_or_else(|| CatenaError::MissingArgument {
            function: self.function.name.to_string(),
            param: format!("#{index}"),
            ty: self
                .function
                .inputs
                .get(index)
                .map_or_else(String::new, |p| p.ty.to_string()),
        })
    }

    fn mistyped(&self, index: usize, expected: &str) -> CatenaError {
        let param = self.function.inputs.get(index).map_or("?", |p| p.name);
        CatenaError::invalid_argument(param, expected, "resolved value has the wrong type")
    }

    fn word(&self, index: usize) -> CatenaResult<B256> {
        match self.arg(index)? {
            AbiValue::FixedBytes(word) => Ok(*word),
            _ => Err(self.mistyped(index, "bytes32")),
        }
    }

    fn words<const N: usize>(&self, start: usize) -> CatenaResult<[B256; N]> {
        let mut out = [B256::ZERO; N];
        for (offset, slot) in out.iter_mut().enumerate() {
            *slot = self.word(start + offset)?;
        }
        Ok(out)
    }

    fn uint(&self, index: usize) -> CatenaResult<U256> {
        match self.arg(index)? {
            AbiValue::Uint(value) => Ok(*value),
            _ => Err(self.mistyped(index, "uint256")),
        }
    }

    fn addresses(&self, index: usize) -> CatenaResult<Vec<Address>> {
        match self.arg(index)? {
            AbiValue::AddressArray(list) => Ok(list.clone()),
            _ => Err(self.mistyped(index, "address[]")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::{AGREEMENT_TRACKER, DISCLOSURE_MANAGER};
    use crate::encoding::encode_fixed_bytes;

    const FIELDS: [(&str, &str); 8] = [
        ("organization", "TEST ORG"),
        ("recipient", "BITACCESS INC."),
        ("location", "OTTAWA,ON,CA"),
        ("amount", "CAD 1234567"),
        ("fundingType", "G"),
        ("date", "2016-Q2"),
        ("purpose", "NAICS:44231"),
        ("comment", "MULTI_YEAR"),
    ];

    fn named_entry() -> CallArgs {
        FIELDS
            .iter()
            .fold(CallArgs::named(), |args, (name, value)| args.with(*name, *value))
    }

    fn positional_entry() -> CallArgs {
        FIELDS
            .iter()
            .fold(CallArgs::positional(), |args, (_, value)| args.push(*value))
    }

    #[test]
    fn test_named_and_positional_agree() {
        let named = resolve(&DISCLOSURE_MANAGER, "newEntry", &named_entry()).unwrap();
        let positional = resolve(&DISCLOSURE_MANAGER, "newEntry", &positional_entry()).unwrap();
        assert_eq!(named, positional);
        assert_eq!(named.calldata().unwrap(), positional.calldata().unwrap());
    }

    #[test]
    fn test_calldata_matches_interface_encoding() {
        let resolved = resolve(&DISCLOSURE_MANAGER, "newEntry", &named_entry()).unwrap();
        let word = |i: usize| encode_fixed_bytes("f", FIELDS[i].1, 32).unwrap();
        let expected = ledger::newEntryCall {
            organization: word(0),
            recipient: word(1),
            location: word(2),
            amount: word(3),
            fundingType: word(4),
            date: word(5),
            purpose: word(6),
            comment: word(7),
        }
        .abi_encode();
        assert_eq!(resolved.calldata().unwrap().to_vec(), expected);
        assert_eq!(&expected[..4], &resolved.function.selector);
    }

    #[test]
    fn test_missing_argument_names_param_and_type() {
        let args = CallArgs::named().with("organization", "TEST ORG");
        let err = resolve(&DISCLOSURE_MANAGER, "newEntry", &args).unwrap_err();
        assert_eq!(
            err,
            CatenaError::MissingArgument {
                function: "newEntry".to_string(),
                param: "recipient".to_string(),
                ty: "bytes32".to_string(),
            }
        );
    }

    #[test]
    fn test_null_counts_as_missing() {
        let args = named_entry().with("comment", ArgValue::Null);
        let err = resolve(&DISCLOSURE_MANAGER, "newEntry", &args).unwrap_err();
        assert!(matches!(err, CatenaError::MissingArgument { ref param, .. } if param == "comment"));
    }

    #[test]
    fn test_amend_entry_orders_row_first() {
        let args = named_entry().with("rowNumber", 343_u64);
        let resolved = resolve(&DISCLOSURE_MANAGER, "amendEntry", &args).unwrap();
        assert_eq!(resolved.args[0], AbiValue::Uint(U256::from(343)));
        assert_eq!(resolved.args.len(), 9);
    }

    #[test]
    fn test_unknown_function() {
        let err = resolve(&AGREEMENT_TRACKER, "newEntry", &CallArgs::default()).unwrap_err();
        assert!(matches!(err, CatenaError::UnknownFunction { .. }));
    }

    #[test]
    fn test_add_agreement_resolution() {
        let hash = "0xA0E4C2F76C58916EC258F246851BEA091D14D4247A2FC3E18694461B1816E13B";
        let args = CallArgs::positional()
            .push(hash)
            .push("1")
            .push(vec![Address::repeat_byte(1), Address::repeat_byte(2)]);
        let resolved = resolve(&AGREEMENT_TRACKER, "addAgreement", &args).unwrap();
        let calldata = resolved.calldata().unwrap();
        let decoded = tracker::addAgreementCall::abi_decode(&calldata, true).unwrap();
        assert_eq!(decoded.disclosureIndex, U256::from(1));
        assert_eq!(decoded.signatories.len(), 2);
        assert_eq!(decoded.agreementHash, hash.parse::<B256>().unwrap());
    }
}
