//! Findings
//!
//! Alert payloads emitted when a spender crosses the reporting threshold.
//! Serialized as JSON with camelCase keys for downstream consumers.

use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};

/// Alert id for the approval-phishing detection
pub const PHISHING_ALERT_ID: &str = "ERC-20-EOA-ALLOWANCE";

/// Finding severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Finding classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FindingType {
    Info,
    Suspicious,
    Exploit,
}

/// A token a flagged spender holds allowances on
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AffectedToken {
    /// Token contract address with 0x prefix
    pub address: String,
    /// Token symbol, `UNKNOWN` for non-conformant contracts
    pub symbol: String,
    /// Summed affected balance as decimal string
    pub amount: String,
}

impl AffectedToken {
    pub fn new(address: Address, symbol: String, amount: U256) -> Self {
        Self {
            address: format_address(address),
            symbol,
            amount: format_value(amount),
        }
    }
}

/// Structured finding metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FindingMetadata {
    /// Flagged spender address
    pub attacker: String,
    /// Total approvals observed within the retention window
    pub approvals_count: String,
    /// Owners who granted allowances to the attacker
    pub affected_addresses: Vec<String>,
    /// Tokens involved, with per-token affected amounts
    pub tokens: Vec<AffectedToken>,
}

/// A detection result ready for publication
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub alert_id: String,
    pub name: String,
    pub description: String,
    pub severity: Severity,
    pub finding_type: FindingType,
    pub metadata: FindingMetadata,
}

impl Finding {
    /// Serialize the finding to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize a finding from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Build the approval-phishing finding for a flagged spender
pub fn create_phishing_finding(
    approvals_count: usize,
    attacker: Address,
    affected_addresses: &[Address],
    tokens: Vec<AffectedToken>,
) -> Finding {
    Finding {
        alert_id: PHISHING_ALERT_ID.to_string(),
        name: "Possible ERC20 Phishing Attack".to_string(),
        description: format!(
            "ERC20 approvals were called {} times to an EOA {}",
            approvals_count,
            format_address(attacker)
        ),
        severity: Severity::High,
        finding_type: FindingType::Suspicious,
        metadata: FindingMetadata {
            attacker: format_address(attacker),
            approvals_count: approvals_count.to_string(),
            affected_addresses: affected_addresses.iter().copied().map(format_address).collect(),
            tokens,
        },
    }
}

/// Format an address as lowercase hex string with 0x prefix
pub fn format_address(address: Address) -> String {
    format!("{:#x}", address)
}

/// Format a U256 value as decimal string
pub fn format_value(value: U256) -> String {
    value.to_string()
}
