//! Token Ledger Entry
//!
//! Per-token record of observed approvals plus lazily-fetched token metadata.
//! Symbol and decimals are contract constants, so they are memoized forever,
//! failure sentinel included: a contract that reverts on `symbol()` today
//! will revert tomorrow. Balance and allowance are mutable chain state
//! and are re-read on every call; a failed read degrades to zero instead of
//! propagating, so one non-standard token never stops ingestion.

use std::collections::HashSet;

use alloy::primitives::{Address, U256};
use tracing::debug;

use crate::resolver::TokenReader;

/// Symbol substituted when a contract has no readable `symbol()`
pub const UNKNOWN_SYMBOL: &str = "UNKNOWN";

/// Decimals substituted when a contract has no readable `decimals()`
pub const FALLBACK_DECIMALS: u8 = 1;

/// A single observed approval, in chain order.
///
/// `amount` is always the absolute allowance resulting from the call: for a
/// direct `approve` that is the call argument, for `increaseAllowance` it is
/// the resolved on-chain total. It is never a delta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalRecord {
    pub owner: Address,
    pub spender: Address,
    pub amount: U256,
    pub timestamp: u64,
}

/// Approval history and memoized metadata for one token contract.
#[derive(Debug)]
pub struct TokenLedger {
    pub address: Address,
    pub approvals: Vec<ApprovalRecord>,
    symbol: Option<String>,
    decimals: Option<u8>,
}

impl TokenLedger {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            approvals: Vec::new(),
            symbol: None,
            decimals: None,
        }
    }

    /// Append an approval observation. Callers must deliver calls in chain
    /// order; records are never reordered.
    pub fn record_approval(
        &mut self,
        owner: Address,
        spender: Address,
        amount: U256,
        timestamp: u64,
    ) {
        self.approvals.push(ApprovalRecord {
            owner,
            spender,
            amount,
            timestamp,
        });
    }

    /// Token symbol, fetched once and memoized permanently.
    ///
    /// A failed read memoizes [`UNKNOWN_SYMBOL`] and is never retried.
    pub async fn symbol(&mut self, reader: &dyn TokenReader) -> String {
        if let Some(symbol) = &self.symbol {
            return symbol.clone();
        }

        let symbol = match reader.symbol(self.address).await {
            Ok(symbol) => symbol,
            Err(e) => {
                debug!(token = %self.address, error = %e, "symbol read failed, using sentinel");
                UNKNOWN_SYMBOL.to_string()
            }
        };

        self.symbol = Some(symbol.clone());
        symbol
    }

    /// Token decimals, fetched once and memoized permanently.
    ///
    /// A failed read memoizes [`FALLBACK_DECIMALS`] and is never retried.
    pub async fn decimals(&mut self, reader: &dyn TokenReader) -> u8 {
        if let Some(decimals) = self.decimals {
            return decimals;
        }

        let decimals = match reader.decimals(self.address).await {
            Ok(decimals) => decimals,
            Err(e) => {
                debug!(token = %self.address, error = %e, "decimals read failed, using sentinel");
                FALLBACK_DECIMALS
            }
        };

        self.decimals = Some(decimals);
        decimals
    }

    /// Owner balance at `block_number`. Never cached; a failed read returns
    /// zero because balances move and RPC failures may be transient.
    pub async fn balance_of(
        &self,
        reader: &dyn TokenReader,
        owner: Address,
        block_number: u64,
    ) -> U256 {
        match reader.balance_of(self.address, owner, block_number).await {
            Ok(balance) => balance,
            Err(e) => {
                debug!(token = %self.address, owner = %owner, error = %e, "balance read failed");
                U256::ZERO
            }
        }
    }

    /// Current allowance at `block_number`. Same never-cached, zero-on-failure
    /// policy as [`Self::balance_of`].
    pub async fn allowance(
        &self,
        reader: &dyn TokenReader,
        owner: Address,
        spender: Address,
        block_number: u64,
    ) -> U256 {
        match reader
            .allowance(self.address, owner, spender, block_number)
            .await
        {
            Ok(allowance) => allowance,
            Err(e) => {
                debug!(token = %self.address, owner = %owner, spender = %spender, error = %e, "allowance read failed");
                U256::ZERO
            }
        }
    }

    /// Drop approvals older than `min_timestamp`, keeping everything from
    /// spenders in the permanent exemption set.
    pub fn retain_since(&mut self, min_timestamp: u64, permanent_spenders: &HashSet<Address>) {
        self.approvals
            .retain(|a| a.timestamp >= min_timestamp || permanent_spenders.contains(&a.spender));
    }

    /// True once eviction has drained every approval; the owning store then
    /// drops the entry entirely.
    pub fn is_empty(&self) -> bool {
        self.approvals.is_empty()
    }

    /// True if at least one surviving approval names `spender`.
    pub fn has_approvals_for(&self, spender: Address) -> bool {
        self.approvals.iter().any(|a| a.spender == spender)
    }

    /// Number of surviving approvals naming `spender`.
    pub fn approvals_count_for(&self, spender: Address) -> usize {
        self.approvals.iter().filter(|a| a.spender == spender).count()
    }
}
