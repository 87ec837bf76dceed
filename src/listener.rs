//! Classification of raw on-chain events into semantic token events.
//!
//! Each raw event is resolved against the subscription it arrived on: the
//! subscription name carries the pool locator and optional pool data. The
//! canonical event signature then selects the transform. Transfers are
//! classified by zero-address analysis (mint/burn/transfer); non-fungible
//! transfers are enriched with a best-effort `tokenURI` lookup that never
//! stalls a batch.

use futures_util::future::join_all;
use serde_json::Value;
use std::sync::Arc;

use tokens_types::events::{BlockchainEvent, BlockchainEventInfo, RawEvent, TokenApprovalEventData, TokenEvent, TokenPoolEventData, TokenPoolInfo, TokenTransferEventData};
use tokens_types::hexstr::decode_hex;
use tokens_types::locator::{PoolLocator, TokenType};
use tokens_types::subscription::{ParsedSubscriptionName, unpack_subscription_name};

use crate::abi::signatures::{APPROVAL_FOR_ALL_SIGNATURE, APPROVAL_SIGNATURE, POOL_CREATION_SIGNATURE, TRANSFER_SIGNATURE};
use crate::abi::{AbiMapper, registry};
use crate::blockchain::{BlockchainConnector, RequestContext};
use crate::eventstream::EventStreamService;

pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// Transforms raw events into semantic token events.
pub struct TokenListener {
    mapper: Arc<AbiMapper>,
    blockchain: Arc<BlockchainConnector>,
    streams: Arc<EventStreamService>,
    topic: String,
}

impl TokenListener {
    pub fn new(
        mapper: Arc<AbiMapper>,
        blockchain: Arc<BlockchainConnector>,
        streams: Arc<EventStreamService>,
        topic: String,
    ) -> Self {
        TokenListener {
            mapper,
            blockchain,
            streams,
            topic,
        }
    }

    /// Transforms a full upstream batch, preserving event order. URI lookups
    /// for the batch run concurrently.
    pub async fn transform_batch(&self, events: &[RawEvent]) -> Vec<TokenEvent> {
        let transforms = events.iter().map(|event| self.transform(event));
        join_all(transforms).await.into_iter().flatten().collect()
    }

    async fn transform(&self, event: &RawEvent) -> Option<TokenEvent> {
        let Some(sub_name) = self.streams.subscription_name(&event.sub_id).await else {
            tracing::warn!(sub_id = %event.sub_id, "Unknown subscription for event, dropping");
            return None;
        };
        self.transform_with_name(&sub_name, event).await
    }

    /// Transform entry point once the subscription name is known.
    pub(crate) async fn transform_with_name(
        &self,
        sub_name: &str,
        event: &RawEvent,
    ) -> Option<TokenEvent> {
        let Some(parsed) = unpack_subscription_name(&self.topic, sub_name) else {
            tracing::warn!(sub_name, "Unparseable subscription name, dropping event");
            return None;
        };
        match event.trimmed_signature() {
            POOL_CREATION_SIGNATURE => self.transform_pool_creation(&parsed, event).await,
            TRANSFER_SIGNATURE => self.transform_transfer(&parsed, event).await,
            APPROVAL_SIGNATURE => self.transform_approval(&parsed, event),
            APPROVAL_FOR_ALL_SIGNATURE => self.transform_approval_for_all(&parsed, event),
            other => {
                tracing::debug!(signature = other, "Unhandled event signature");
                None
            }
        }
    }

    async fn transform_pool_creation(
        &self,
        parsed: &ParsedSubscriptionName,
        event: &RawEvent,
    ) -> Option<TokenEvent> {
        let address = str_field(&event.data, "contract_address")?.to_lowercase();
        let token_type = if bool_field(&event.data, "is_fungible")? {
            TokenType::Fungible
        } else {
            TokenType::NonFungible
        };
        let ctx = RequestContext::new();
        let with_data = self.mapper.supports_data(&ctx, &address, token_type).await;
        let schema = AbiMapper::token_schema(token_type, with_data);
        let locator = PoolLocator::new(&address, schema, token_type);
        Some(TokenEvent::TokenPool(TokenPoolEventData {
            standard: locator.standard().to_string(),
            pool_locator: locator.pack(),
            token_type,
            signer: event.input_signer.clone(),
            data: str_field(&event.data, "data").map(decode_hex),
            pool_data: parsed.pool_data.clone(),
            info: TokenPoolInfo {
                address,
                schema: schema.to_string(),
                name: str_field(&event.data, "name").map(str::to_string),
                symbol: str_field(&event.data, "symbol").map(str::to_string),
                decimals: None,
                uri: None,
            },
            blockchain: Some(blockchain_event(event)),
        }))
    }

    async fn transform_transfer(
        &self,
        parsed: &ParsedSubscriptionName,
        event: &RawEvent,
    ) -> Option<TokenEvent> {
        let locator = self.pool_locator(parsed)?;
        let from = str_field(&event.data, "from")?.to_string();
        let to = str_field(&event.data, "to")?.to_string();
        let is_mint = from == ZERO_ADDRESS;
        let is_burn = to == ZERO_ADDRESS;
        if is_mint && is_burn {
            // Neither endpoint is a real account; nothing to report.
            return None;
        }

        let (amount, token_index) = if locator.is_fungible() {
            (str_field(&event.data, "value")?.to_string(), None)
        } else {
            (
                "1".to_string(),
                Some(str_field(&event.data, "tokenId")?.to_string()),
            )
        };
        let uri = match (&token_index, is_burn) {
            (Some(token_id), false) => Some(self.token_uri(&locator, token_id).await),
            (Some(_), true) => Some(String::new()),
            (None, _) => None,
        };

        let data = TokenTransferEventData {
            id: event_id(event),
            pool_locator: parsed.pool_locator.clone(),
            pool_data: parsed.pool_data.clone(),
            signer: event.input_signer.clone(),
            data: decoded_input_data(event),
            amount,
            from: (!is_mint).then_some(from),
            to: (!is_burn).then_some(to),
            token_index,
            uri,
            blockchain: blockchain_event(event),
        };
        Some(if is_mint {
            TokenEvent::TokenMint(data)
        } else if is_burn {
            TokenEvent::TokenBurn(data)
        } else {
            TokenEvent::TokenTransfer(data)
        })
    }

    fn transform_approval(
        &self,
        parsed: &ParsedSubscriptionName,
        event: &RawEvent,
    ) -> Option<TokenEvent> {
        let locator = self.pool_locator(parsed)?;
        let owner = str_field(&event.data, "owner")?.to_string();
        let (operator, approved, subject, token_index) = if locator.is_fungible() {
            let spender = str_field(&event.data, "spender")?.to_string();
            let value = str_field(&event.data, "value")?;
            let subject = format!("{owner}:{spender}");
            (spender, value != "0", subject, None)
        } else {
            let operator = str_field(&event.data, "approved")?.to_string();
            let token_id = str_field(&event.data, "tokenId")?.to_string();
            let subject = format!("{owner}:{token_id}");
            let approved = operator != ZERO_ADDRESS;
            (operator, approved, subject, Some(token_id))
        };
        Some(TokenEvent::TokenApproval(TokenApprovalEventData {
            id: event_id(event),
            pool_locator: parsed.pool_locator.clone(),
            pool_data: parsed.pool_data.clone(),
            signer: Some(owner),
            data: decoded_input_data(event),
            subject,
            operator,
            approved,
            token_index,
            blockchain: blockchain_event(event),
        }))
    }

    fn transform_approval_for_all(
        &self,
        parsed: &ParsedSubscriptionName,
        event: &RawEvent,
    ) -> Option<TokenEvent> {
        self.pool_locator(parsed)?;
        let owner = str_field(&event.data, "owner")?.to_string();
        let operator = str_field(&event.data, "operator")?.to_string();
        let approved = bool_field(&event.data, "approved")?;
        Some(TokenEvent::TokenApproval(TokenApprovalEventData {
            id: event_id(event),
            pool_locator: parsed.pool_locator.clone(),
            pool_data: parsed.pool_data.clone(),
            signer: Some(owner.clone()),
            data: decoded_input_data(event),
            subject: format!("{owner}:{operator}"),
            operator,
            approved,
            token_index: None,
            blockchain: blockchain_event(event),
        }))
    }

    fn pool_locator(&self, parsed: &ParsedSubscriptionName) -> Option<PoolLocator> {
        let locator = PoolLocator::unpack(&parsed.pool_locator);
        if !locator.validate() {
            tracing::warn!(
                pool_locator = %parsed.pool_locator,
                "Invalid pool locator on subscription, dropping event"
            );
            return None;
        }
        Some(locator)
    }

    /// Best-effort URI lookup; any failure yields an empty string so the
    /// batch keeps moving.
    async fn token_uri(&self, locator: &PoolLocator, token_id: &str) -> String {
        let ctx = RequestContext::new();
        if !self.mapper.supports_nft_uri(&ctx, &locator.address, false).await {
            return String::new();
        }
        let Some(method) = registry::method_abi(registry::ERC721_WITH_DATA, "tokenURI") else {
            return String::new();
        };
        match self
            .blockchain
            .query(&ctx, &locator.address, method, &[Value::from(token_id)])
            .await
        {
            Ok(response) => response.output.as_str().unwrap_or_default().to_string(),
            Err(error) => {
                tracing::info!(%error, token_id, "tokenURI lookup failed");
                String::new()
            }
        }
    }
}

fn str_field<'a>(data: &'a Value, key: &str) -> Option<&'a str> {
    data.get(key)?.as_str()
}

fn bool_field(data: &Value, key: &str) -> Option<bool> {
    match data.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => Some(s == "true"),
        _ => None,
    }
}

fn decoded_input_data(event: &RawEvent) -> Option<String> {
    let args = event.input_args.as_ref()?;
    Some(decode_hex(args.get("data")?.as_str()?))
}

fn timestamp_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_number(raw: &str) -> u64 {
    match raw.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16).unwrap_or_default(),
        None => raw.parse().unwrap_or_default(),
    }
}

/// Sortable event id: `pad12(block)/pad6(txIndex)/pad6(logIndex)`.
fn event_id(event: &RawEvent) -> String {
    format!(
        "{:012}/{:06}/{:06}",
        parse_number(&event.block_number),
        parse_number(&event.transaction_index),
        parse_number(&event.log_index)
    )
}

fn blockchain_event(event: &RawEvent) -> BlockchainEvent {
    let signature = event.trimmed_signature().to_string();
    let name = signature
        .split('(')
        .next()
        .unwrap_or_default()
        .to_string();
    BlockchainEvent {
        id: event_id(event),
        name,
        location: format!("address={}", event.address),
        signature: signature.clone(),
        timestamp: event.timestamp.as_ref().map(timestamp_string),
        output: event.data.clone(),
        info: BlockchainEventInfo {
            address: event.address.clone(),
            block_number: event.block_number.clone(),
            transaction_index: event.transaction_index.clone(),
            transaction_hash: event.transaction_hash.clone(),
            log_index: event.log_index.clone(),
            signature,
            sub_id: Some(event.sub_id.clone()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::config::Config;

    fn listener() -> TokenListener {
        let config = Config {
            host: "0.0.0.0".parse().unwrap(),
            port: 3000,
            ethconnect_url: "http://ethconnect.example".parse().unwrap(),
            fftm_url: None,
            username: None,
            password: None,
            factory_address: None,
            passthrough_headers: vec![],
            topic: "tokens".to_string(),
        };
        let client = reqwest::Client::new();
        let blockchain = Arc::new(BlockchainConnector::new(&config, client.clone()));
        let mapper = Arc::new(AbiMapper::new(blockchain.clone()));
        let streams = Arc::new(EventStreamService::new(&config, client));
        TokenListener::new(mapper, blockchain, streams, "tokens".to_string())
    }

    fn erc20_sub_name() -> String {
        "tokens:address=0xabc&schema=ERC20WithData&type=fungible:Transfer".to_string()
    }

    fn transfer_event(from: &str, to: &str) -> RawEvent {
        serde_json::from_value(json!({
            "subId": "sb-1",
            "signature": "Transfer(address,address,uint256)",
            "address": "0x123",
            "blockNumber": "1",
            "transactionIndex": "0x0",
            "transactionHash": "0xhash",
            "logIndex": "1",
            "data": { "from": from, "to": to, "value": "5" },
            "inputArgs": { "data": "0x74657374" },
            "inputSigner": "0x321"
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_transfer_classified_as_mint() {
        let listener = listener();
        let event = transfer_event(ZERO_ADDRESS, "A");
        let result = listener
            .transform_with_name(&erc20_sub_name(), &event)
            .await
            .unwrap();
        match result {
            TokenEvent::TokenMint(data) => {
                assert_eq!(data.id, "000000000001/000000/000001");
                assert_eq!(data.amount, "5");
                assert_eq!(data.to.as_deref(), Some("A"));
                assert_eq!(data.from, None);
                assert_eq!(data.signer.as_deref(), Some("0x321"));
                assert_eq!(data.data.as_deref(), Some("test"));
                assert_eq!(
                    data.pool_locator,
                    "address=0xabc&schema=ERC20WithData&type=fungible"
                );
                assert_eq!(data.blockchain.name, "Transfer");
                assert_eq!(data.blockchain.location, "address=0x123");
            }
            other => panic!("expected mint, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_transfer_classified_as_burn_and_transfer() {
        let listener = listener();

        let burn = listener
            .transform_with_name(&erc20_sub_name(), &transfer_event("A", ZERO_ADDRESS))
            .await
            .unwrap();
        assert!(matches!(burn, TokenEvent::TokenBurn(ref data) if data.to.is_none()));

        let transfer = listener
            .transform_with_name(&erc20_sub_name(), &transfer_event("A", "B"))
            .await
            .unwrap();
        assert!(matches!(transfer, TokenEvent::TokenTransfer(_)));
    }

    #[tokio::test]
    async fn test_transfer_between_zero_addresses_dropped() {
        let listener = listener();
        let result = listener
            .transform_with_name(&erc20_sub_name(), &transfer_event(ZERO_ADDRESS, ZERO_ADDRESS))
            .await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_invalid_locator_dropped() {
        let listener = listener();
        let result = listener
            .transform_with_name("tokens:garbage:Transfer", &transfer_event("A", "B"))
            .await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_erc20_approval() {
        let listener = listener();
        let event: RawEvent = serde_json::from_value(json!({
            "subId": "sb-2",
            "signature": "Approval(address,address,uint256)",
            "address": "0xabc",
            "blockNumber": "2",
            "transactionIndex": "0x1",
            "transactionHash": "0xhash",
            "logIndex": "0",
            "data": { "owner": "0xaa", "spender": "0xbb", "value": "100" }
        }))
        .unwrap();
        let name = "tokens:address=0xabc&schema=ERC20WithData&type=fungible:Approval";
        let result = listener.transform_with_name(name, &event).await.unwrap();
        match result {
            TokenEvent::TokenApproval(data) => {
                assert_eq!(data.subject, "0xaa:0xbb");
                assert_eq!(data.operator, "0xbb");
                assert!(data.approved);
                assert_eq!(data.signer.as_deref(), Some("0xaa"));
                assert_eq!(data.id, "000000000002/000001/000000");
            }
            other => panic!("expected approval, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_erc20_approval_revoked_when_value_zero() {
        let listener = listener();
        let event: RawEvent = serde_json::from_value(json!({
            "subId": "sb-2",
            "signature": "Approval(address,address,uint256)",
            "blockNumber": "2",
            "transactionIndex": "0",
            "logIndex": "0",
            "data": { "owner": "0xaa", "spender": "0xbb", "value": "0" }
        }))
        .unwrap();
        let name = "tokens:address=0xabc&schema=ERC20WithData&type=fungible:Approval";
        let result = listener.transform_with_name(name, &event).await.unwrap();
        assert!(matches!(result, TokenEvent::TokenApproval(ref data) if !data.approved));
    }

    #[tokio::test]
    async fn test_approval_for_all() {
        let listener = listener();
        let event: RawEvent = serde_json::from_value(json!({
            "subId": "sb-3",
            "signature": "ApprovalForAll(address,address,bool)",
            "blockNumber": "3",
            "transactionIndex": "0",
            "logIndex": "2",
            "data": { "owner": "0xaa", "operator": "0xcc", "approved": true }
        }))
        .unwrap();
        let name = "tokens:address=0xabc&schema=ERC721WithData&type=nonfungible:ApprovalForAll:ns1";
        let result = listener.transform_with_name(name, &event).await.unwrap();
        match result {
            TokenEvent::TokenApproval(data) => {
                assert_eq!(data.subject, "0xaa:0xcc");
                assert!(data.approved);
                assert_eq!(data.pool_data.as_deref(), Some("ns1"));
            }
            other => panic!("expected approval, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_signature_qualifier_trimmed() {
        let listener = listener();
        let mut event = transfer_event(ZERO_ADDRESS, "A");
        event.signature = "sub1:Transfer(address,address,uint256)".to_string();
        let result = listener
            .transform_with_name(&erc20_sub_name(), &event)
            .await
            .unwrap();
        assert!(matches!(result, TokenEvent::TokenMint(_)));
    }

    #[test]
    fn test_event_id_padding() {
        let event = transfer_event("A", "B");
        assert_eq!(event_id(&event), "000000000001/000000/000001");
    }

    #[test]
    fn test_parse_number_accepts_hex_and_decimal() {
        assert_eq!(parse_number("0x1f"), 31);
        assert_eq!(parse_number("12"), 12);
        assert_eq!(parse_number("junk"), 0);
    }
}
