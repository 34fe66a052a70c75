//! ApprovalScope Monitor Library
//!
//! This crate provides components for monitoring confirmed blockchain
//! transactions for ERC-20 approval-phishing campaigns: filtering
//! allowance-granting calls, tracking approvals per spender, and publishing
//! findings to Redis.

pub mod agent;
pub mod config;
pub mod decoder;
pub mod filter;
pub mod findings;
pub mod ipc;
pub mod ledger;
pub mod publisher;
pub mod registry;
pub mod resolver;
pub mod store;

// Re-export commonly used types
pub use agent::PhishingAgent;
pub use decoder::{decode_transaction, DecodedTransaction};
pub use filter::{filter_transaction, ApprovalCall, ApprovalMethod};
pub use findings::{create_phishing_finding, Finding};
pub use store::{AllowanceStore, SpenderSummary};
