//! Operation DTOs for the REST surface.
//!
//! These mirror the JSON bodies accepted by the connector: pool creation and
//! activation, the four transaction-submitting operations (mint, transfer,
//! burn, approval), and the balance query. Field names follow the platform's
//! camelCase wire convention.

use serde::{Deserialize, Serialize};

use crate::locator::TokenType;

/// Request to create a token pool, either by indexing an existing contract
/// (`config.address` set) or by deploying through the configured factory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPool {
    #[serde(rename = "type")]
    pub token_type: TokenType,
    pub signer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default)]
    pub config: TokenPoolConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPoolConfig {
    /// Address of an already deployed contract to index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Base URI passed to URI-capable factories.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

/// Request to activate event delivery for a pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPoolActivate {
    pub pool_locator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default)]
    pub config: TokenPoolActivateConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPoolActivateConfig {
    /// First block to replay events from. Defaults to `"0"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_number: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenMint {
    pub pool_locator: String,
    pub signer: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_index: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenTransfer {
    pub pool_locator: String,
    pub signer: String,
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_index: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBurn {
    pub pool_locator: String,
    pub signer: String,
    pub from: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_index: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenApproval {
    pub pool_locator: String,
    pub signer: String,
    pub operator: String,
    pub approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default)]
    pub config: TokenApprovalConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenApprovalConfig {
    /// Explicit ERC-20 allowance; defaults depend on `approved`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowance: Option<String>,
    /// Selects per-token approval for ERC-721 when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_index: Option<String>,
}

/// Query parameters of `GET /balance`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalanceQuery {
    pub account: String,
    pub pool_locator: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBalance {
    pub balance: String,
}

/// 202 body for asynchronously submitted transactions; `id` correlates the
/// eventual receipt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsyncResponse {
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_mint_deserialize_minimal() {
        let dto: TokenMint = serde_json::from_value(json!({
            "poolLocator": "address=0x1&schema=ERC20NoData&type=fungible",
            "signer": "0x1",
            "to": "0x2",
            "amount": "10"
        }))
        .unwrap();
        assert_eq!(dto.amount.as_deref(), Some("10"));
        assert_eq!(dto.token_index, None);
        assert_eq!(dto.request_id, None);
    }

    #[test]
    fn test_approval_config_defaults() {
        let dto: TokenApproval = serde_json::from_value(json!({
            "poolLocator": "address=0x1&schema=ERC20NoData&type=fungible",
            "signer": "0x1",
            "operator": "0x2",
            "approved": true
        }))
        .unwrap();
        assert_eq!(dto.config.allowance, None);
        assert_eq!(dto.config.token_index, None);
    }

    #[test]
    fn test_pool_type_wire_names() {
        let pool: TokenPool = serde_json::from_value(json!({
            "type": "nonfungible",
            "signer": "0x1",
            "name": "token",
            "symbol": "TKN"
        }))
        .unwrap();
        assert_eq!(pool.token_type, TokenType::NonFungible);
        let round = serde_json::to_value(&pool).unwrap();
        assert_eq!(round["type"], "nonfungible");
    }
}
