//! Raw on-chain events and the semantic token events derived from them.
//!
//! The upstream event stream delivers [`RawEvent`] batches; the listener
//! classifies each into a [`TokenEvent`] that downstream WebSocket clients
//! consume. Semantic events carry a sortable id derived from the block
//! position plus a `blockchain` sub-object preserving the raw log context.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::locator::TokenType;

/// One log event as delivered by the upstream event stream.
///
/// `signature` may carry a colon-separated subscription qualifier in front of
/// the canonical Solidity form; consumers trim it before dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    #[serde(default)]
    pub sub_id: String,
    pub signature: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub block_number: String,
    #[serde(default)]
    pub transaction_index: String,
    #[serde(default)]
    pub transaction_hash: String,
    #[serde(default)]
    pub log_index: String,
    /// Either a string or a unix-seconds number, depending on the gateway.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Value>,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_args: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_signer: Option<String>,
}

impl RawEvent {
    /// The canonical signature with any subscription qualifier removed.
    pub fn trimmed_signature(&self) -> &str {
        match self.signature.find('(') {
            // A qualifier colon can only appear before the open paren.
            Some(paren) => match self.signature[..paren].rfind(':') {
                Some(colon) => &self.signature[colon + 1..],
                None => &self.signature,
            },
            None => self
                .signature
                .rsplit_once(':')
                .map(|(_, sig)| sig)
                .unwrap_or(&self.signature),
        }
    }
}

/// A batch of raw events plus the upstream sequence number to acknowledge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventBatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_number: Option<u64>,
    pub events: Vec<RawEvent>,
}

/// Raw log context carried on every semantic event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockchainEvent {
    pub id: String,
    pub name: String,
    pub location: String,
    pub signature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    pub output: Value,
    pub info: BlockchainEventInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockchainEventInfo {
    pub address: String,
    pub block_number: String,
    pub transaction_index: String,
    pub transaction_hash: String,
    pub log_index: String,
    pub signature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_id: Option<String>,
}

/// A semantic token event fanned out to WebSocket clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum TokenEvent {
    #[serde(rename = "token-pool")]
    TokenPool(TokenPoolEventData),
    #[serde(rename = "token-mint")]
    TokenMint(TokenTransferEventData),
    #[serde(rename = "token-burn")]
    TokenBurn(TokenTransferEventData),
    #[serde(rename = "token-transfer")]
    TokenTransfer(TokenTransferEventData),
    #[serde(rename = "token-approval")]
    TokenApproval(TokenApprovalEventData),
}

impl TokenEvent {
    /// The namespace this event is routed to, when its pool carried one.
    pub fn pool_data(&self) -> Option<&str> {
        match self {
            TokenEvent::TokenPool(data) => data.pool_data.as_deref(),
            TokenEvent::TokenMint(data)
            | TokenEvent::TokenBurn(data)
            | TokenEvent::TokenTransfer(data) => data.pool_data.as_deref(),
            TokenEvent::TokenApproval(data) => data.pool_data.as_deref(),
        }
    }
}

/// Payload of `token-pool`, also returned synchronously by pool creation and
/// activation (without the `blockchain` context in that case).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPoolEventData {
    /// Base contract standard, `ERC20` or `ERC721`.
    pub standard: String,
    pub pool_locator: String,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_data: Option<String>,
    pub info: TokenPoolInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blockchain: Option<BlockchainEvent>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPoolInfo {
    pub address: String,
    pub schema: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decimals: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

/// Payload of `token-mint`, `token-burn`, and `token-transfer`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenTransferEventData {
    pub id: String,
    pub pool_locator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    pub amount: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_index: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    pub blockchain: BlockchainEvent,
}

/// Payload of `token-approval`, covering per-token approvals, ERC-20
/// allowances, and operator-wide `ApprovalForAll`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenApprovalEventData {
    pub id: String,
    pub pool_locator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    /// Stable key identifying what the approval covers, e.g. `owner:spender`.
    pub subject: String,
    pub operator: String,
    pub approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_index: Option<String>,
    pub blockchain: BlockchainEvent,
}

/// Messages sent to connected WebSocket clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum WsMessage {
    Started { data: WsStarted },
    Batch { id: String, data: WsBatch },
    Receipt { data: Value },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsStarted {
    pub namespace: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WsBatch {
    pub events: Vec<TokenEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_number: Option<u64>,
}
