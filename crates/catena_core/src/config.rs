//! # Session Configuration
//!
//! Everything a [`crate::CatenaClient`] needs besides its provider, loaded
//! from TOML. Every section is optional:
//!
//! ```toml
//! [provider]
//! ipc_path = "/tmp/anvil.ipc"
//! request_timeout_ms = 5000
//!
//! [contracts]
//! disclosure_manager = "0x..."
//! agreement_tracker = "0x..."
//!
//! [gas]
//! new_entry = 250000
//! amend_entry = 500000
//! gas_price = 20000000000
//!
//! [confirmation]
//! poll_interval_ms = 500
//! timeout_ms = 600000
//!
//! [subscription]
//! poll_interval_ms = 1000
//! channel_buffer = 256
//! ```

use std::path::Path;
use std::time::Duration;

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::error::{CatenaError, CatenaResult};

/// Default gas limit for `newEntry`.
pub const DEFAULT_NEW_ENTRY_GAS: u64 = 250_000;

/// Default gas limit for `amendEntry`.
pub const DEFAULT_AMEND_ENTRY_GAS: u64 = 500_000;

/// Top-level configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CatenaConfig {
    /// Node connection.
    pub provider: ProviderSection,
    /// Deployed contract addresses.
    pub contracts: ContractsSection,
    /// Gas defaults.
    pub gas: GasSection,
    /// Receipt polling.
    pub confirmation: ConfirmationSection,
    /// Event subscription polling.
    pub subscription: SubscriptionSection,
}

/// `[provider]`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderSection {
    /// IPC socket path; `None` picks the Geth default.
    pub ipc_path: Option<String>,
    /// Per-request timeout in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            ipc_path: None,
            request_timeout_ms: 5_000,
        }
    }
}

/// `[contracts]`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ContractsSection {
    /// Ledger address.
    pub disclosure_manager: Option<Address>,
    /// Agreement tracker address.
    pub agreement_tracker: Option<Address>,
}

/// `[gas]`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GasSection {
    /// Gas limit for new entries.
    pub new_entry: u64,
    /// Gas limit for amendments.
    pub amend_entry: u64,
    /// Gas price in wei; the node's price when absent. TOML integers are
    /// 64-bit, so this is a `u64`.
    pub gas_price: Option<u64>,
}

impl Default for GasSection {
    fn default() -> Self {
        Self {
            new_entry: DEFAULT_NEW_ENTRY_GAS,
            amend_entry: DEFAULT_AMEND_ENTRY_GAS,
            gas_price: None,
        }
    }
}

/// `[confirmation]`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfirmationSection {
    /// Delay between receipt polls.
    pub poll_interval_ms: u64,
    /// Give up after this long; wait forever when absent.
    pub timeout_ms: Option<u64>,
}

impl Default for ConfirmationSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            timeout_ms: None,
        }
    }
}

/// `[subscription]`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SubscriptionSection {
    /// Delay between log polls.
    pub poll_interval_ms: u64,
    /// Capacity of the event channel.
    pub channel_buffer: usize,
}

impl Default for SubscriptionSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            channel_buffer: 256,
        }
    }
}

impl CatenaConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidConfig` on syntax errors, unknown keys or values
    /// that fail [`Self::validate`].
    pub fn from_toml_str(source: &str) -> CatenaResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| CatenaError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML file.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidConfig` if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> CatenaResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| CatenaError::InvalidConfig(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&source)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidConfig` on zero intervals, zero gas limits or an
    /// empty channel.
    pub fn validate(&self) -> CatenaResult<()> {
        if self.gas.new_entry == 0 || self.gas.amend_entry == 0 {
            return Err(CatenaError::InvalidConfig(
                "gas limits must be greater than zero".to_string(),
            ));
        }
        if self.confirmation.poll_interval_ms == 0 || self.subscription.poll_interval_ms == 0 {
            return Err(CatenaError::InvalidConfig(
                "poll intervals must be greater than zero".to_string(),
            ));
        }
        if self.subscription.channel_buffer == 0 {
            return Err(CatenaError::InvalidConfig(
                "subscription.channel_buffer must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Sets the ledger address.
    #[must_use]
    pub fn with_disclosure_manager(mut self, address: Address) -> Self {
        self.contracts.disclosure_manager = Some(address);
        self
    }

    /// Sets the agreement tracker address.
    #[must_use]
    pub fn with_agreement_tracker(mut self, address: Address) -> Self {
        self.contracts.agreement_tracker = Some(address);
        self
    }

    /// Sets the default gas price.
    #[must_use]
    pub fn with_gas_price(mut self, gas_price: u64) -> Self {
        self.gas.gas_price = Some(gas_price);
        self
    }

    /// Sets the IPC socket path.
    #[must_use]
    pub fn with_ipc_path(mut self, path: impl Into<String>) -> Self {
        self.provider.ipc_path = Some(path.into());
        self
    }

    /// Sets the receipt poll interval and timeout.
    #[must_use]
    pub fn with_confirmation(mut self, poll_interval: Duration, timeout: Option<Duration>) -> Self {
        self.confirmation.poll_interval_ms = duration_ms(poll_interval);
        self.confirmation.timeout_ms = timeout.map(duration_ms);
        self
    }

    /// Sets the log poll interval.
    #[must_use]
    pub fn with_subscription_poll(mut self, poll_interval: Duration) -> Self {
        self.subscription.poll_interval_ms = duration_ms(poll_interval);
        self
    }
}

impl ProviderSection {
    /// Request timeout.
    #[inline]
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl ConfirmationSection {
    /// Poll interval.
    #[inline]
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Timeout, if any.
    #[inline]
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

impl SubscriptionSection {
    /// Poll interval.
    #[inline]
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CatenaConfig::default();
        assert_eq!(config.gas.new_entry, 250_000);
        assert_eq!(config.gas.amend_entry, 500_000);
        assert!(config.gas.amend_entry > config.gas.new_entry);
        assert_eq!(config.confirmation.timeout(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(CatenaConfig::from_toml_str("").unwrap(), CatenaConfig::default());
    }

    #[test]
    fn test_full_document() {
        let config = CatenaConfig::from_toml_str(
            r#"
            [provider]
            ipc_path = "/tmp/anvil.ipc"

            [contracts]
            disclosure_manager = "0x1111111111111111111111111111111111111111"

            [gas]
            gas_price = 20000000000

            [confirmation]
            poll_interval_ms = 50
            timeout_ms = 1000
            "#,
        )
        .unwrap();

        assert_eq!(config.provider.ipc_path.as_deref(), Some("/tmp/anvil.ipc"));
        assert_eq!(config.contracts.disclosure_manager, Some(Address::repeat_byte(0x11)));
        assert_eq!(config.contracts.agreement_tracker, None);
        assert_eq!(config.gas.gas_price, Some(20_000_000_000));
        assert_eq!(config.gas.new_entry, DEFAULT_NEW_ENTRY_GAS);
        assert_eq!(config.confirmation.timeout(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_rejects_unknown_keys_and_bad_values() {
        assert!(matches!(
            CatenaConfig::from_toml_str("[gas]\nnew_entyr = 1\n"),
            Err(CatenaError::InvalidConfig(_))
        ));
        assert!(matches!(
            CatenaConfig::from_toml_str("[confirmation]\npoll_interval_ms = 0\n"),
            Err(CatenaError::InvalidConfig(_))
        ));
    }
}
