//! Approval Method Filtering
//!
//! Filters transactions based on method IDs to identify ERC-20 allowance
//! grants, and decodes the call arguments the detection layer needs.
//! Targets `approve(address,uint256)` and `increaseAllowance(address,uint256)`.

use std::collections::HashMap;
use std::sync::LazyLock;

use alloy::primitives::{Address, U256};
use alloy::sol;
use alloy::sol_types::SolCall;

sol! {
    function approve(address spender, uint256 amount) external returns (bool);
    function increaseAllowance(address spender, uint256 addedValue) external returns (bool);
}

/// The two allowance-granting methods we're interested in filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApprovalMethod {
    /// approve - 0x095ea7b3
    Approve,
    /// increaseAllowance - 0x39509351
    IncreaseAllowance,
}

impl ApprovalMethod {
    /// Returns the 4-byte method selector
    pub fn selector(&self) -> [u8; 4] {
        match self {
            ApprovalMethod::Approve => [0x09, 0x5e, 0xa7, 0xb3],
            ApprovalMethod::IncreaseAllowance => [0x39, 0x50, 0x93, 0x51],
        }
    }

    /// Returns the human-readable method name
    pub fn name(&self) -> &'static str {
        match self {
            ApprovalMethod::Approve => "approve",
            ApprovalMethod::IncreaseAllowance => "increaseAllowance",
        }
    }

    /// Returns the hex-encoded method ID with 0x prefix
    pub fn hex(&self) -> &'static str {
        match self {
            ApprovalMethod::Approve => "0x095ea7b3",
            ApprovalMethod::IncreaseAllowance => "0x39509351",
        }
    }
}

/// Static lookup table for method IDs
static APPROVAL_METHODS: LazyLock<HashMap<[u8; 4], ApprovalMethod>> = LazyLock::new(|| {
    let mut map = HashMap::new();
    map.insert([0x09, 0x5e, 0xa7, 0xb3], ApprovalMethod::Approve);
    map.insert([0x39, 0x50, 0x93, 0x51], ApprovalMethod::IncreaseAllowance);
    map
});

/// An allowance-granting call decoded from transaction input.
///
/// For `Approve`, `amount` is the resulting allowance; for
/// `IncreaseAllowance` it is the added delta, since the resulting total is
/// only known to the chain and is resolved downstream by the allowance store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApprovalCall {
    pub method: ApprovalMethod,
    pub spender: Address,
    pub amount: U256,
}

/// Check if a 4-byte method ID is an allowance-granting method
pub fn is_approval_method(method_id: &[u8; 4]) -> bool {
    APPROVAL_METHODS.contains_key(method_id)
}

/// Get the approval method enum for a given selector, if it matches
pub fn get_approval_method(method_id: &[u8; 4]) -> Option<ApprovalMethod> {
    APPROVAL_METHODS.get(method_id).copied()
}

/// Get the human-readable method name for a given selector
pub fn get_method_name(method_id: &[u8; 4]) -> Option<&'static str> {
    get_approval_method(method_id).map(|m| m.name())
}

/// Extract method ID from transaction input data
///
/// Returns `Some([u8; 4])` if input has at least 4 bytes, `None` otherwise
pub fn extract_method_id(input: &[u8]) -> Option<[u8; 4]> {
    if input.len() < 4 {
        return None;
    }
    let mut method_id = [0u8; 4];
    method_id.copy_from_slice(&input[..4]);
    Some(method_id)
}

/// Filter transaction input - returns the decoded call if this is an
/// allowance-granting transaction
///
/// Returns `None` for non-approval methods and for approval selectors whose
/// arguments fail to ABI-decode.
pub fn filter_transaction(input: &[u8]) -> Option<ApprovalCall> {
    let method = extract_method_id(input).and_then(|id| get_approval_method(&id))?;

    match method {
        ApprovalMethod::Approve => approveCall::abi_decode(input, true)
            .ok()
            .map(|call| ApprovalCall {
                method,
                spender: call.spender,
                amount: call.amount,
            }),
        ApprovalMethod::IncreaseAllowance => increaseAllowanceCall::abi_decode(input, true)
            .ok()
            .map(|call| ApprovalCall {
                method,
                spender: call.spender,
                amount: call.addedValue,
            }),
    }
}
