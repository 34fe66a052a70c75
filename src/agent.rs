//! Detection Driver
//!
//! Routes decoded transactions into the allowance store and turns per-block
//! summaries into findings. The transaction handler must be fed calls in
//! chain order (later observations overwrite earlier affected-balance
//! estimates); the block handler runs once per block, after that block's
//! transactions.
//!
//! Spenders that have been reported once become attacker traces: their store
//! data is exempt from the normal retention window so evidence keeps
//! accruing, and they are re-reported whenever their approval count grows,
//! until they stay quiet for the findings-retention window.

use std::collections::{HashMap, HashSet};

use alloy::primitives::{Address, U256};
use tracing::{debug, info};

use crate::config::MonitorConfig;
use crate::decoder::DecodedTransaction;
use crate::filter::ApprovalMethod;
use crate::findings::{create_phishing_finding, AffectedToken, Finding};
use crate::registry::AddressRegistry;
use crate::store::AllowanceStore;

#[derive(Debug, Clone, Copy)]
struct AttackerTrace {
    modified: u64,
    approvals_count: usize,
}

/// The approval-phishing detection agent.
pub struct PhishingAgent {
    config: MonitorConfig,
    store: AllowanceStore,
    registry: AddressRegistry,
    attackers: HashMap<Address, AttackerTrace>,
}

impl PhishingAgent {
    pub fn new(config: MonitorConfig, store: AllowanceStore, registry: AddressRegistry) -> Self {
        Self {
            config,
            store,
            registry,
            attackers: HashMap::new(),
        }
    }

    /// Ingest one transaction. Non-approval transactions and grants that
    /// cannot be phishing (zero amounts, zero-address or contract/exchange
    /// spenders, contract senders) are dropped here, before the store.
    pub async fn handle_transaction(
        &mut self,
        tx: &DecodedTransaction,
        timestamp: u64,
        block_number: u64,
    ) {
        let Some(call) = tx.approval else { return };
        let Some(token) = tx.to else { return };

        if call.amount.is_zero() || call.spender == Address::ZERO {
            return;
        }

        // approvals sent by contracts are protocol plumbing, not victims
        if self.registry.is_contract(tx.from, timestamp).await {
            return;
        }

        if self.registry.is_exchange(call.spender, timestamp)
            || self.registry.is_contract(call.spender, timestamp).await
        {
            return;
        }

        debug!(
            token = %token,
            owner = %tx.from,
            spender = %call.spender,
            method = call.method.name(),
            "recording allowance grant"
        );

        match call.method {
            ApprovalMethod::Approve => {
                self.store
                    .approve(token, tx.from, call.spender, call.amount, timestamp, block_number)
                    .await
            }
            ApprovalMethod::IncreaseAllowance => {
                self.store
                    .increase_allowance(
                        token,
                        tx.from,
                        call.spender,
                        call.amount,
                        timestamp,
                        block_number,
                    )
                    .await
            }
        }
    }

    /// Per-block pass: evict data outside the retention windows, then report
    /// spenders above the call-count threshold and known attackers with new
    /// activity.
    pub async fn handle_block(&mut self, timestamp: u64) -> Vec<Finding> {
        let permanent: HashSet<Address> = self.attackers.keys().copied().collect();
        self.store.clear_outdated_data(
            timestamp.saturating_sub(self.config.seconds_keep_approvals),
            &permanent,
        );
        self.registry
            .clear_outdated_cache(timestamp.saturating_sub(self.config.seconds_registry_cache));

        let mut findings = Vec::new();

        for summary in self.store.spender_summaries() {
            // known attacker with no new approvals: nothing to add
            if let Some(trace) = self.attackers.get(&summary.spender) {
                if trace.approvals_count == summary.approvals_count {
                    continue;
                }
            }

            let known_attacker = self.attackers.contains_key(&summary.spender);
            if !known_attacker
                && (summary.approvals_count <= self.config.calls_threshold
                    || self.registry.is_exchange(summary.spender, timestamp))
            {
                continue;
            }

            let mut tokens = Vec::with_capacity(summary.tokens.len());
            for &token in &summary.tokens {
                let symbol = self.store.token_symbol(token).await;
                let amount = summary.amounts.get(&token).copied().unwrap_or(U256::ZERO);
                tokens.push(AffectedToken::new(token, symbol, amount));
            }

            info!(
                spender = %summary.spender,
                approvals = summary.approvals_count,
                owners = summary.owners.len(),
                "reporting approval-phishing spender"
            );

            findings.push(create_phishing_finding(
                summary.approvals_count,
                summary.spender,
                &summary.owners,
                tokens,
            ));

            self.attackers.insert(
                summary.spender,
                AttackerTrace {
                    modified: timestamp,
                    approvals_count: summary.approvals_count,
                },
            );
        }

        // attackers quiet past the findings window stop being tracked
        let min_trace = timestamp.saturating_sub(self.config.seconds_keep_findings);
        self.attackers.retain(|_, trace| trace.modified >= min_trace);

        findings
    }

    /// Number of attacker traces currently held.
    pub fn tracked_attackers(&self) -> usize {
        self.attackers.len()
    }

    /// Read access to the underlying store.
    pub fn store(&self) -> &AllowanceStore {
        &self.store
    }
}
