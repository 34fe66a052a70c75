//! Address Registry
//!
//! Classifies addresses as contracts or known exchanges so the driver can
//! skip spenders that cannot be phishing EOAs. Exchange knowledge comes from
//! a seeded label list and is cached permanently; contract probes go through
//! `eth_getCode` and are cached until the TTL sweep drops entries that have
//! not been touched recently.

use std::collections::HashMap;
use std::sync::Arc;

use alloy::primitives::Address;
use tracing::warn;

use crate::resolver::CodeReader;

/// Address classification cache with last-touch-based eviction.
pub struct AddressRegistry {
    reader: Arc<dyn CodeReader>,
    // last-touch timestamps; None marks a permanently cached seed
    lookups: HashMap<Address, Option<u64>>,
    contracts: HashMap<Address, bool>,
    exchanges: HashMap<Address, bool>,
}

impl AddressRegistry {
    pub fn new(
        reader: Arc<dyn CodeReader>,
        exchange_addresses: impl IntoIterator<Item = Address>,
    ) -> Self {
        let mut lookups = HashMap::new();
        let mut exchanges = HashMap::new();

        for address in exchange_addresses {
            exchanges.insert(address, true);
            lookups.insert(address, None);
        }

        Self {
            reader,
            lookups,
            contracts: HashMap::new(),
            exchanges,
        }
    }

    /// Whether `address` has deployed code.
    ///
    /// A failed probe is treated as a contract and left uncached, so the
    /// address is never reported on this block but gets re-probed later.
    pub async fn is_contract(&mut self, address: Address, now: u64) -> bool {
        self.touch(address, now);

        if let Some(&cached) = self.contracts.get(&address) {
            return cached;
        }

        let is_contract = match self.reader.has_code(address).await {
            Ok(has_code) => has_code,
            Err(e) => {
                warn!(address = %address, error = %e, "code probe failed, treating as contract");
                return true;
            }
        };

        self.contracts.insert(address, is_contract);
        is_contract
    }

    /// Whether `address` is a known centralized-exchange address.
    pub fn is_exchange(&mut self, address: Address, now: u64) -> bool {
        self.touch(address, now);
        self.exchanges.get(&address).copied().unwrap_or(false)
    }

    /// Drop cached classifications not touched since `min_timestamp`.
    /// Seeded exchange entries are permanent and survive every sweep.
    pub fn clear_outdated_cache(&mut self, min_timestamp: u64) {
        let stale: Vec<Address> = self
            .lookups
            .iter()
            .filter_map(|(&address, &touched)| match touched {
                Some(ts) if ts < min_timestamp => Some(address),
                _ => None,
            })
            .collect();

        for address in stale {
            self.lookups.remove(&address);
            self.contracts.remove(&address);
            self.exchanges.remove(&address);
        }
    }

    /// Number of addresses currently cached (seeds included).
    pub fn cached_addresses(&self) -> usize {
        self.lookups.len()
    }

    fn touch(&mut self, address: Address, now: u64) {
        match self.lookups.get_mut(&address) {
            // permanent seed
            Some(None) => {}
            Some(Some(ts)) => *ts = now,
            None => {
                self.lookups.insert(address, Some(now));
            }
        }
    }
}
