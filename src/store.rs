//! Allowance Store
//!
//! The single mutable source of truth for in-flight approval relationships.
//! Ingests `approve`/`increaseAllowance` observations, maintains a spender →
//! tokens index and per-(token, spender, owner) affected-balance estimates,
//! summarizes per spender, and evicts records outside the retention window.
//!
//! Callers must deliver ingestion calls in chain order: a later call
//! overwrites the affected-balance estimate of an earlier one, so reordering
//! corrupts the latest-observation-wins invariant. All mutating operations
//! take `&mut self`, which makes one logical caller stream the natural shape.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use alloy::primitives::{Address, U256};
use tracing::debug;

use crate::ledger::{TokenLedger, UNKNOWN_SYMBOL};
use crate::resolver::TokenReader;

/// Per-spender aggregate computed fresh on every [`AllowanceStore::spender_summaries`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpenderSummary {
    pub spender: Address,
    /// Token addresses the spender holds surviving approvals on, in index order
    pub tokens: Vec<Address>,
    /// Distinct owners across all tokens, first-seen order
    pub owners: Vec<Address>,
    /// Total surviving approvals across all tokens
    pub approvals_count: usize,
    /// Per-token sum of affected balances across owners
    pub amounts: HashMap<Address, U256>,
}

/// Tracks approval relationships across all observed tokens.
pub struct AllowanceStore {
    reader: Arc<dyn TokenReader>,
    ledgers: HashMap<Address, TokenLedger>,
    // Ordered so that summaries walk spenders and tokens deterministically
    spender_tokens: BTreeMap<Address, BTreeSet<Address>>,
    // token -> spender -> owner -> estimate
    affected_balances: HashMap<Address, HashMap<Address, HashMap<Address, U256>>>,
}

impl AllowanceStore {
    pub fn new(reader: Arc<dyn TokenReader>) -> Self {
        Self {
            reader,
            ledgers: HashMap::new(),
            spender_tokens: BTreeMap::new(),
            affected_balances: HashMap::new(),
        }
    }

    /// Ingest a direct `approve(spender, amount)` call.
    ///
    /// The call amount is the resulting allowance, so no allowance read is
    /// needed; one balance read bounds the affected estimate.
    pub async fn approve(
        &mut self,
        token: Address,
        owner: Address,
        spender: Address,
        amount: U256,
        timestamp: u64,
        block_number: u64,
    ) {
        let reader = Arc::clone(&self.reader);
        let ledger = self.link_ledger(token, spender);
        ledger.record_approval(owner, spender, amount, timestamp);

        let balance = ledger.balance_of(reader.as_ref(), owner, block_number).await;

        self.set_affected_balance(token, spender, owner, amount.min(balance));
    }

    /// Ingest an `increaseAllowance(spender, addedValue)` call.
    ///
    /// The pre-existing allowance is unknown here, so the recorded amount is
    /// the resulting allowance read back from the chain, not `added_value`.
    /// Note this reads post-transaction state: replaying out of chain order
    /// can record an allowance that never held at `timestamp`.
    pub async fn increase_allowance(
        &mut self,
        token: Address,
        owner: Address,
        spender: Address,
        _added_value: U256,
        timestamp: u64,
        block_number: u64,
    ) {
        let reader = Arc::clone(&self.reader);
        let ledger = self.link_ledger(token, spender);

        // independent reads, issued concurrently
        let (allowance, balance) = tokio::join!(
            ledger.allowance(reader.as_ref(), owner, spender, block_number),
            ledger.balance_of(reader.as_ref(), owner, block_number),
        );

        ledger.record_approval(owner, spender, allowance, timestamp);

        self.set_affected_balance(token, spender, owner, allowance.min(balance));
    }

    /// Aggregate every indexed spender. Pure read, computed fresh each call;
    /// O(total approvals), intended for a per-block cadence.
    pub fn spender_summaries(&self) -> Vec<SpenderSummary> {
        let mut summaries = Vec::with_capacity(self.spender_tokens.len());

        for (&spender, token_addresses) in &self.spender_tokens {
            let mut approvals_count = 0;
            let mut tokens = Vec::new();
            let mut owners = Vec::new();
            let mut seen_owners = HashSet::new();
            let mut amounts = HashMap::new();

            for &token in token_addresses {
                let Some(ledger) = self.ledgers.get(&token) else {
                    continue;
                };

                tokens.push(token);

                for record in ledger.approvals.iter().filter(|a| a.spender == spender) {
                    approvals_count += 1;
                    if seen_owners.insert(record.owner) {
                        owners.push(record.owner);
                    }
                }

                let amount = self
                    .affected_balances
                    .get(&token)
                    .and_then(|spenders| spenders.get(&spender))
                    .map(|owners| owners.values().fold(U256::ZERO, |acc, v| acc + *v))
                    .unwrap_or(U256::ZERO);
                amounts.insert(token, amount);
            }

            summaries.push(SpenderSummary {
                spender,
                tokens,
                owners,
                approvals_count,
                amounts,
            });
        }

        summaries
    }

    /// Evict approvals older than `min_timestamp`, exempting spenders in
    /// `permanent_spenders`, then cascade the cleanup: drained ledgers are
    /// dropped with their affected-balance sub-maps, and the spender index is
    /// re-derived from the surviving records. Idempotent.
    pub fn clear_outdated_data(
        &mut self,
        min_timestamp: u64,
        permanent_spenders: &HashSet<Address>,
    ) {
        self.ledgers.retain(|address, ledger| {
            ledger.retain_since(min_timestamp, permanent_spenders);
            if ledger.is_empty() {
                self.affected_balances.remove(address);
                false
            } else {
                true
            }
        });

        self.spender_tokens.retain(|&spender, tokens| {
            tokens.retain(|token| {
                self.ledgers
                    .get(token)
                    .is_some_and(|ledger| ledger.has_approvals_for(spender))
            });
            !tokens.is_empty()
        });

        debug!(
            tokens = self.ledgers.len(),
            spenders = self.spender_tokens.len(),
            "evicted outdated approvals"
        );
    }

    /// Latest affected-balance estimate for one relationship; zero when the
    /// relationship has never been observed.
    pub fn affected_balance(&self, token: Address, owner: Address, spender: Address) -> U256 {
        self.affected_balances
            .get(&token)
            .and_then(|spenders| spenders.get(&spender))
            .and_then(|owners| owners.get(&owner))
            .copied()
            .unwrap_or(U256::ZERO)
    }

    /// Memoized token symbol for reporting; `UNKNOWN` for untracked tokens.
    pub async fn token_symbol(&mut self, token: Address) -> String {
        let reader = Arc::clone(&self.reader);
        match self.ledgers.get_mut(&token) {
            Some(ledger) => ledger.symbol(reader.as_ref()).await,
            None => UNKNOWN_SYMBOL.to_string(),
        }
    }

    /// Memoized token decimals for reporting; the fallback sentinel for
    /// untracked tokens.
    pub async fn token_decimals(&mut self, token: Address) -> u8 {
        let reader = Arc::clone(&self.reader);
        match self.ledgers.get_mut(&token) {
            Some(ledger) => ledger.decimals(reader.as_ref()).await,
            None => crate::ledger::FALLBACK_DECIMALS,
        }
    }

    /// Ledger entry for a token, if it has surviving approvals.
    pub fn ledger(&self, token: Address) -> Option<&TokenLedger> {
        self.ledgers.get(&token)
    }

    /// Number of tokens with surviving approvals.
    pub fn tokens_tracked(&self) -> usize {
        self.ledgers.len()
    }

    /// Number of spenders with surviving approvals.
    pub fn spenders_tracked(&self) -> usize {
        self.spender_tokens.len()
    }

    fn link_ledger(&mut self, token: Address, spender: Address) -> &mut TokenLedger {
        self.spender_tokens.entry(spender).or_default().insert(token);
        self.ledgers
            .entry(token)
            .or_insert_with(|| TokenLedger::new(token))
    }

    fn set_affected_balance(
        &mut self,
        token: Address,
        spender: Address,
        owner: Address,
        estimate: U256,
    ) {
        self.affected_balances
            .entry(token)
            .or_default()
            .entry(spender)
            .or_default()
            .insert(owner, estimate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::{MockTokenReader, ReadError};

    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    fn store_with_balances(balances: Vec<U256>) -> AllowanceStore {
        let mut reader = MockTokenReader::new();
        let mut balances = balances.into_iter();
        reader
            .expect_balance_of()
            .returning(move |_, _, _| Ok(balances.next().expect("unexpected balance read")));
        AllowanceStore::new(Arc::new(reader))
    }

    // ==================== affected balance tests ====================

    #[tokio::test]
    async fn test_affected_balance_is_min_of_amount_and_balance() {
        let token = addr(0x01);
        let owner = addr(0x02);
        let spender = addr(0x03);

        // balance 50 < approved 100
        let mut store = store_with_balances(vec![U256::from(50u64)]);
        store
            .approve(token, owner, spender, U256::from(100u64), 1, 1)
            .await;

        assert_eq!(store.affected_balance(token, owner, spender), U256::from(50u64));
    }

    #[tokio::test]
    async fn test_affected_balance_is_last_write_wins() {
        let token = addr(0x01);
        let owner = addr(0x02);
        let spender = addr(0x03);

        let mut store = store_with_balances(vec![U256::from(50u64), U256::from(80u64)]);

        store
            .approve(token, owner, spender, U256::from(100u64), 1, 1)
            .await;
        assert_eq!(store.affected_balance(token, owner, spender), U256::from(50u64));

        // drops below the previous estimate: latest observation wins
        store
            .approve(token, owner, spender, U256::from(10u64), 2, 2)
            .await;
        assert_eq!(store.affected_balance(token, owner, spender), U256::from(10u64));
    }

    #[tokio::test]
    async fn test_affected_balance_unobserved_is_zero() {
        let store = AllowanceStore::new(Arc::new(MockTokenReader::new()));
        assert_eq!(
            store.affected_balance(addr(0x01), addr(0x02), addr(0x03)),
            U256::ZERO
        );
    }

    #[tokio::test]
    async fn test_approve_does_not_read_allowance() {
        let mut reader = MockTokenReader::new();
        reader
            .expect_balance_of()
            .times(1)
            .returning(|_, _, _| Ok(U256::from(1u64)));
        // no expect_allowance: an allowance read would panic the mock
        let mut store = AllowanceStore::new(Arc::new(reader));

        store
            .approve(addr(0x01), addr(0x02), addr(0x03), U256::from(5u64), 1, 1)
            .await;
    }

    #[tokio::test]
    async fn test_increase_allowance_records_resolved_total() {
        let token = addr(0x01);
        let owner = addr(0x02);
        let spender = addr(0x03);

        let mut reader = MockTokenReader::new();
        reader
            .expect_allowance()
            .times(1)
            .returning(|_, _, _, _| Ok(U256::from(200u64)));
        reader
            .expect_balance_of()
            .times(1)
            .returning(|_, _, _| Ok(U256::from(300u64)));

        let mut store = AllowanceStore::new(Arc::new(reader));
        // added_value is deliberately ignored in favor of the on-chain total
        store
            .increase_allowance(token, owner, spender, U256::from(5u64), 1, 1)
            .await;

        let ledger = store.ledger(token).unwrap();
        assert_eq!(ledger.approvals.len(), 1);
        assert_eq!(ledger.approvals[0].amount, U256::from(200u64));
        assert_eq!(store.affected_balance(token, owner, spender), U256::from(200u64));
    }

    #[tokio::test]
    async fn test_failed_balance_read_degrades_estimate_to_zero() {
        let token = addr(0x01);
        let owner = addr(0x02);
        let spender = addr(0x03);

        let mut reader = MockTokenReader::new();
        reader
            .expect_balance_of()
            .returning(|_, _, _| Err(ReadError::Call("revert".to_string())));

        let mut store = AllowanceStore::new(Arc::new(reader));
        store
            .approve(token, owner, spender, U256::from(100u64), 1, 1)
            .await;

        // the approval itself is still recorded, only the estimate degrades
        assert_eq!(store.ledger(token).unwrap().approvals.len(), 1);
        assert_eq!(store.affected_balance(token, owner, spender), U256::ZERO);
    }

    // ==================== summary tests ====================

    #[tokio::test]
    async fn test_empty_store_has_no_summaries() {
        let store = AllowanceStore::new(Arc::new(MockTokenReader::new()));
        assert!(store.spender_summaries().is_empty());
    }

    #[tokio::test]
    async fn test_summary_aggregation() {
        let token1 = addr(0x01);
        let token2 = addr(0x02);
        let owner1 = addr(0x11);
        let owner2 = addr(0x12);
        let spender = addr(0x21);

        // balances large enough that affected == approved amount
        let mut store = store_with_balances(vec![U256::from(1000u64); 5]);

        store.approve(token1, owner1, spender, U256::from(10u64), 1, 1).await;
        store.approve(token1, owner1, spender, U256::from(20u64), 2, 1).await;
        store.approve(token2, owner1, spender, U256::from(30u64), 3, 1).await;
        store.approve(token2, owner2, spender, U256::from(40u64), 4, 1).await;
        store.approve(token2, owner2, spender, U256::from(50u64), 5, 1).await;

        let summaries = store.spender_summaries();
        assert_eq!(summaries.len(), 1);

        let summary = &summaries[0];
        assert_eq!(summary.spender, spender);
        assert_eq!(summary.approvals_count, 5);
        assert_eq!(summary.tokens, vec![token1, token2]);
        // deduplicated, first-seen order
        assert_eq!(summary.owners, vec![owner1, owner2]);
        // per-token sums over the latest per-owner estimates
        assert_eq!(summary.amounts[&token1], U256::from(20u64));
        assert_eq!(summary.amounts[&token2], U256::from(30u64 + 50u64));
    }

    #[tokio::test]
    async fn test_summaries_walk_spenders_in_address_order() {
        let spender_hi = addr(0xbb);
        let spender_lo = addr(0xaa);

        let mut store = store_with_balances(vec![U256::from(1000u64); 2]);
        store.approve(addr(0x01), addr(0x11), spender_hi, U256::from(1u64), 1, 1).await;
        store.approve(addr(0x01), addr(0x11), spender_lo, U256::from(1u64), 2, 1).await;

        let summaries = store.spender_summaries();
        assert_eq!(summaries[0].spender, spender_lo);
        assert_eq!(summaries[1].spender, spender_hi);
    }

    // ==================== eviction tests ====================

    #[tokio::test]
    async fn test_eviction_monotonic_retention() {
        let token = addr(0x01);
        let owner = addr(0x02);
        let spender = addr(0x03);

        let mut store = store_with_balances(vec![U256::from(1000u64); 5]);
        for t in 1..=5u64 {
            store.approve(token, owner, spender, U256::from(t), t, 1).await;
        }

        store.clear_outdated_data(2, &HashSet::new());
        let survived_t2: Vec<u64> = store
            .ledger(token)
            .unwrap()
            .approvals
            .iter()
            .map(|a| a.timestamp)
            .collect();
        assert_eq!(survived_t2, vec![2, 3, 4, 5]);

        store.clear_outdated_data(4, &HashSet::new());
        let survived_t4: Vec<u64> = store
            .ledger(token)
            .unwrap()
            .approvals
            .iter()
            .map(|a| a.timestamp)
            .collect();
        assert_eq!(survived_t4, vec![4, 5]);
        assert!(survived_t4.iter().all(|t| survived_t2.contains(t)));
    }

    #[tokio::test]
    async fn test_eviction_is_idempotent() {
        let mut store = store_with_balances(vec![U256::from(1000u64); 4]);
        store.approve(addr(0x01), addr(0x11), addr(0x21), U256::from(1u64), 10, 1).await;
        store.approve(addr(0x01), addr(0x12), addr(0x21), U256::from(2u64), 20, 1).await;
        store.approve(addr(0x02), addr(0x11), addr(0x22), U256::from(3u64), 30, 1).await;
        store.approve(addr(0x03), addr(0x13), addr(0x23), U256::from(4u64), 5, 1).await;

        store.clear_outdated_data(15, &HashSet::new());
        let first_pass = store.spender_summaries();

        store.clear_outdated_data(15, &HashSet::new());
        let second_pass = store.spender_summaries();

        assert_eq!(first_pass, second_pass);
        assert_eq!(store.tokens_tracked(), 2);
    }

    #[tokio::test]
    async fn test_eviction_cascades_cleanup() {
        let token1 = addr(0x01);
        let token2 = addr(0x02);
        let owner = addr(0x11);
        let spender = addr(0x21);

        let mut store = store_with_balances(vec![U256::from(1000u64); 2]);
        store.approve(token1, owner, spender, U256::from(1u64), 1, 1).await;
        store.approve(token2, owner, spender, U256::from(2u64), 5, 1).await;

        store.clear_outdated_data(3, &HashSet::new());

        // token1's last approval evicted: pair disappears from summaries,
        // its affected estimate is gone
        let summaries = store.spender_summaries();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].tokens, vec![token2]);
        assert_eq!(store.affected_balance(token1, owner, spender), U256::ZERO);
        assert!(store.ledger(token1).is_none());

        // evicting the only remaining token drops the spender entirely
        store.clear_outdated_data(10, &HashSet::new());
        assert!(store.spender_summaries().is_empty());
        assert_eq!(store.tokens_tracked(), 0);
        assert_eq!(store.spenders_tracked(), 0);
    }

    #[tokio::test]
    async fn test_permanent_spender_survives_aggressive_eviction() {
        let token1 = addr(0x01);
        let token2 = addr(0x02);
        let owner = addr(0x11);
        let spender1 = addr(0x21);
        let attacker = addr(0x22);

        let mut store = store_with_balances(vec![U256::from(1000u64); 2]);
        store.approve(token1, owner, spender1, U256::from(1u64), 1, 1).await;
        store.approve(token2, owner, attacker, U256::from(2u64), 1, 1).await;

        let permanent = HashSet::from([attacker]);
        store.clear_outdated_data(1000, &permanent);

        let summaries = store.spender_summaries();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].spender, attacker);
        assert_eq!(store.affected_balance(token2, owner, attacker), U256::from(2u64));
        assert_eq!(store.affected_balance(token1, owner, spender1), U256::ZERO);
    }

    // ==================== metadata surface tests ====================

    #[tokio::test]
    async fn test_token_symbol_memoized_through_store() {
        let token = addr(0x01);

        let mut reader = MockTokenReader::new();
        reader
            .expect_balance_of()
            .returning(|_, _, _| Ok(U256::from(1u64)));
        reader
            .expect_symbol()
            .times(1)
            .returning(|_| Ok("WETH".to_string()));

        let mut store = AllowanceStore::new(Arc::new(reader));
        store
            .approve(token, addr(0x02), addr(0x03), U256::from(1u64), 1, 1)
            .await;

        assert_eq!(store.token_symbol(token).await, "WETH");
        assert_eq!(store.token_symbol(token).await, "WETH");
    }

    #[tokio::test]
    async fn test_token_symbol_for_untracked_token() {
        let mut store = AllowanceStore::new(Arc::new(MockTokenReader::new()));
        assert_eq!(store.token_symbol(addr(0x0f)).await, UNKNOWN_SYMBOL);
    }

    #[tokio::test]
    async fn test_token_decimals_memoized_through_store() {
        let token = addr(0x01);

        let mut reader = MockTokenReader::new();
        reader
            .expect_balance_of()
            .returning(|_, _, _| Ok(U256::from(1u64)));
        reader.expect_decimals().times(1).returning(|_| Ok(6));

        let mut store = AllowanceStore::new(Arc::new(reader));
        store
            .approve(token, addr(0x02), addr(0x03), U256::from(1u64), 1, 1)
            .await;

        assert_eq!(store.token_decimals(token).await, 6);
        assert_eq!(store.token_decimals(token).await, 6);
        // untracked tokens get the sentinel
        assert_eq!(
            store.token_decimals(addr(0x0f)).await,
            crate::ledger::FALLBACK_DECIMALS
        );
    }
}
