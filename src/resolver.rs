//! Chain Read Layer
//!
//! Read-only access to ERC-20 contracts and account code over an RPC provider.
//! Everything here is honestly fallible; the sentinel substitution for
//! non-conformant contracts lives in the ledger layer, so callers there never
//! see an error surface.

use alloy::eips::BlockId;
use alloy::primitives::{Address, U256};
use alloy::providers::{Provider, RootProvider};
use alloy::pubsub::PubSubFrontend;
use alloy::sol;
use async_trait::async_trait;
use thiserror::Error;

sol! {
    #[sol(rpc)]
    contract Erc20 {
        function symbol() external view returns (string);
        function decimals() external view returns (uint8);
        function balanceOf(address owner) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
    }
}

/// Errors that can occur during chain reads
#[derive(Error, Debug)]
pub enum ReadError {
    #[error("contract call failed: {0}")]
    Call(String),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Read-only ERC-20 views needed by the allowance store.
///
/// Balance and allowance reads are point-in-time (`block_number`); symbol and
/// decimals are contract constants and take no block tag.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenReader: Send + Sync {
    async fn symbol(&self, token: Address) -> Result<String, ReadError>;

    async fn decimals(&self, token: Address) -> Result<u8, ReadError>;

    async fn balance_of(
        &self,
        token: Address,
        owner: Address,
        block_number: u64,
    ) -> Result<U256, ReadError>;

    async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
        block_number: u64,
    ) -> Result<U256, ReadError>;
}

/// Account-code probe used for contract/EOA classification.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CodeReader: Send + Sync {
    async fn has_code(&self, address: Address) -> Result<bool, ReadError>;
}

/// Chain reader backed by a live pub/sub provider.
#[derive(Clone)]
pub struct RpcTokenReader {
    provider: RootProvider<PubSubFrontend>,
}

impl RpcTokenReader {
    pub fn new(provider: RootProvider<PubSubFrontend>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl TokenReader for RpcTokenReader {
    async fn symbol(&self, token: Address) -> Result<String, ReadError> {
        let erc20 = Erc20::new(token, self.provider.clone());
        let ret = erc20
            .symbol()
            .call()
            .await
            .map_err(|e| ReadError::Call(e.to_string()))?;
        Ok(ret._0)
    }

    async fn decimals(&self, token: Address) -> Result<u8, ReadError> {
        let erc20 = Erc20::new(token, self.provider.clone());
        let ret = erc20
            .decimals()
            .call()
            .await
            .map_err(|e| ReadError::Call(e.to_string()))?;
        Ok(ret._0)
    }

    async fn balance_of(
        &self,
        token: Address,
        owner: Address,
        block_number: u64,
    ) -> Result<U256, ReadError> {
        let erc20 = Erc20::new(token, self.provider.clone());
        let ret = erc20
            .balanceOf(owner)
            .block(BlockId::number(block_number))
            .call()
            .await
            .map_err(|e| ReadError::Call(e.to_string()))?;
        Ok(ret._0)
    }

    async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
        block_number: u64,
    ) -> Result<U256, ReadError> {
        let erc20 = Erc20::new(token, self.provider.clone());
        let ret = erc20
            .allowance(owner, spender)
            .block(BlockId::number(block_number))
            .call()
            .await
            .map_err(|e| ReadError::Call(e.to_string()))?;
        Ok(ret._0)
    }
}

#[async_trait]
impl CodeReader for RpcTokenReader {
    async fn has_code(&self, address: Address) -> Result<bool, ReadError> {
        let code = self
            .provider
            .get_code_at(address)
            .await
            .map_err(|e| ReadError::Transport(e.to_string()))?;
        Ok(!code.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_error_display() {
        let err = ReadError::Call("execution reverted".to_string());
        assert!(err.to_string().contains("execution reverted"));

        let err = ReadError::Transport("connection refused".to_string());
        assert!(err.to_string().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_mock_token_reader_roundtrip() {
        let mut mock = MockTokenReader::new();
        mock.expect_symbol()
            .returning(|_| Ok("USDC".to_string()));
        mock.expect_balance_of()
            .returning(|_, _, _| Ok(U256::from(1000u64)));

        let token = Address::repeat_byte(0x01);
        let owner = Address::repeat_byte(0x02);

        assert_eq!(mock.symbol(token).await.unwrap(), "USDC");
        assert_eq!(
            mock.balance_of(token, owner, 1).await.unwrap(),
            U256::from(1000u64)
        );
    }

    #[tokio::test]
    async fn test_mock_code_reader() {
        let mut mock = MockCodeReader::new();
        mock.expect_has_code().returning(|_| Ok(false));

        assert!(!mock.has_code(Address::repeat_byte(0x03)).await.unwrap());
    }
}
