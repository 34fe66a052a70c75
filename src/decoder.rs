//! Transaction Decoder
//!
//! Turns transactions into the monitor's working representation, classifying
//! allowance-granting calls along the way. Confirmed transactions arrive as
//! RPC objects ([`DecodedTransaction::from_rpc`]); raw RLP-encoded envelopes
//! are also supported for feeds that deliver wire bytes (legacy, EIP-2930,
//! EIP-1559 and EIP-4844 types).

use alloy::consensus::Transaction as _;
use alloy::consensus::TxEnvelope;
use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::rpc::types::Transaction;
use thiserror::Error;

use crate::filter::{extract_method_id, filter_transaction, ApprovalCall};

/// Errors that can occur during transaction decoding
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Failed to decode RLP: {0}")]
    RlpDecode(String),

    #[error("Empty input data")]
    EmptyInput,
}

/// Decoded transaction with the fields the detection layer consumes
#[derive(Debug, Clone)]
pub struct DecodedTransaction {
    /// Transaction hash
    pub hash: TxHash,
    /// Sender address (the token owner for approval calls)
    pub from: Address,
    /// Recipient address (the token contract for approval calls)
    pub to: Option<Address>,
    /// Transaction value in wei
    pub value: U256,
    /// Gas price (legacy/EIP-2930) or max fee per gas (EIP-1559/4844)
    pub gas_price: u128,
    /// Transaction input data (calldata)
    pub input: Bytes,
    /// Extracted method ID (first 4 bytes of input), if present
    pub method_id: Option<[u8; 4]>,
    /// Decoded allowance-granting call, if this is one
    pub approval: Option<ApprovalCall>,
    /// Transaction nonce
    pub nonce: u64,
    /// Gas limit
    pub gas_limit: u64,
}

impl DecodedTransaction {
    /// Build from an RPC transaction object (block subscription path).
    pub fn from_rpc(tx: &Transaction) -> Self {
        let input = tx.input().clone();
        Self {
            hash: *tx.inner.tx_hash(),
            from: tx.from,
            to: tx.to(),
            value: tx.value(),
            gas_price: tx.gas_price().unwrap_or_else(|| tx.max_fee_per_gas()),
            method_id: extract_method_id(&input),
            approval: filter_transaction(&input),
            nonce: tx.nonce(),
            gas_limit: tx.gas_limit(),
            input,
        }
    }

    /// Check if this transaction grants an ERC-20 allowance
    pub fn is_approval(&self) -> bool {
        self.approval.is_some()
    }

    /// Get the method ID as a hex string with 0x prefix
    pub fn method_id_hex(&self) -> Option<String> {
        self.method_id.map(|id| format!("0x{}", hex::encode(id)))
    }
}

/// Extract transaction fields from a TxEnvelope
fn extract_tx_fields(tx_envelope: &TxEnvelope) -> (Bytes, Option<Address>, U256, u128, u64, u64) {
    match tx_envelope {
        TxEnvelope::Legacy(signed) => {
            let tx = signed.tx();
            (
                tx.input.clone(),
                tx.to.to().copied(),
                tx.value,
                tx.gas_price,
                tx.nonce,
                tx.gas_limit,
            )
        }
        TxEnvelope::Eip2930(signed) => {
            let tx = signed.tx();
            (
                tx.input.clone(),
                tx.to.to().copied(),
                tx.value,
                tx.gas_price,
                tx.nonce,
                tx.gas_limit,
            )
        }
        TxEnvelope::Eip1559(signed) => {
            let tx = signed.tx();
            (
                tx.input.clone(),
                tx.to.to().copied(),
                tx.value,
                tx.max_fee_per_gas,
                tx.nonce,
                tx.gas_limit,
            )
        }
        TxEnvelope::Eip4844(signed) => {
            let tx = signed.tx().tx();
            (
                tx.input.clone(),
                Some(tx.to),
                tx.value,
                tx.max_fee_per_gas,
                tx.nonce,
                tx.gas_limit,
            )
        }
        _ => (Bytes::new(), None, U256::ZERO, 0, 0, 0),
    }
}

/// Decode a transaction from RLP-encoded bytes
///
/// # Arguments
/// * `rlp_bytes` - The RLP-encoded transaction bytes
/// * `from` - The sender address (recovered from signature or provided externally)
pub fn decode_transaction(
    rlp_bytes: &[u8],
    from: Address,
) -> Result<DecodedTransaction, DecodeError> {
    if rlp_bytes.is_empty() {
        return Err(DecodeError::EmptyInput);
    }

    let tx_envelope: TxEnvelope = alloy::rlp::Decodable::decode(&mut &rlp_bytes[..])
        .map_err(|e| DecodeError::RlpDecode(e.to_string()))?;

    let (input, to, value, gas_price, nonce, gas_limit) = extract_tx_fields(&tx_envelope);
    let method_id = extract_method_id(&input);
    let approval = filter_transaction(&input);

    Ok(DecodedTransaction {
        hash: *tx_envelope.tx_hash(),
        from,
        to,
        value,
        gas_price,
        input,
        method_id,
        approval,
        nonce,
        gas_limit,
    })
}

/// Parse a hex string to bytes (with or without 0x prefix)
pub fn hex_to_bytes(hex_str: &str) -> Result<Vec<u8>, DecodeError> {
    let hex_str = hex_str.strip_prefix("0x").unwrap_or(hex_str);
    hex::decode(hex_str).map_err(|e| DecodeError::RlpDecode(e.to_string()))
}
