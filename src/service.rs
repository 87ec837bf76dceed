//! Token lifecycle orchestration.
//!
//! The public operations (create/activate pool, mint, transfer, burn,
//! approval, balance, receipt) all follow the same template: validate the
//! pool locator and operation invariants, resolve the concrete contract
//! method through the ABI mapper, and hand the call to the gateway. Pool
//! activation additionally provisions upstream event subscriptions.

use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::OnceCell;

use tokens_types::events::{TokenPoolEventData, TokenPoolInfo};
use tokens_types::hexstr::encode_hex;
use tokens_types::locator::{PoolLocator, TokenType};
use tokens_types::subscription::{pack_subscription_name, unpack_subscription_name};
use tokens_types::tokens::{AsyncResponse, TokenApproval, TokenBalance, TokenBalanceQuery, TokenBurn, TokenMint, TokenPool, TokenPoolActivate, TokenTransfer};

use crate::abi::signatures::{APPROVAL_EVENT, APPROVAL_FOR_ALL_EVENT, POOL_CREATION_EVENT, TRANSFER_EVENT};
use crate::abi::{AbiMapper, registry};
use crate::blockchain::{BlockchainConnector, RequestContext};
use crate::config::Config;
use crate::error::ApiError;
use crate::eventstream::EventStreamService;

/// Outcome of `createPool`: synchronous for existing contracts, asynchronous
/// for factory deployments.
#[derive(Debug, Clone)]
pub enum CreatePoolResponse {
    Created(TokenPoolEventData),
    Pending(AsyncResponse),
}

pub struct TokensService {
    mapper: Arc<AbiMapper>,
    blockchain: Arc<BlockchainConnector>,
    streams: Arc<EventStreamService>,
    topic: String,
    factory_address: Option<String>,
    stream_id: OnceCell<String>,
}

impl TokensService {
    pub fn new(
        mapper: Arc<AbiMapper>,
        blockchain: Arc<BlockchainConnector>,
        streams: Arc<EventStreamService>,
        config: &Config,
    ) -> Self {
        TokensService {
            mapper,
            blockchain,
            streams,
            topic: config.topic.clone(),
            factory_address: config.factory_address.clone(),
            stream_id: OnceCell::new(),
        }
    }

    /// Provisions the event stream at startup. If the stream pre-existed,
    /// its subscriptions are audited against the expected per-schema event
    /// sets; mismatches are reported but never fatal.
    pub async fn init(&self) -> Result<(), ApiError> {
        let pre_existing = self
            .streams
            .list_streams()
            .await
            .map_err(ApiError::from)?
            .into_iter()
            .any(|stream| stream.name == self.topic);
        let stream = self
            .streams
            .ensure_event_stream(&self.topic)
            .await
            .map_err(ApiError::from)?;
        let _ = self.stream_id.set(stream.id.clone());
        tracing::info!(topic = %self.topic, stream = %stream.id, "Event stream ready");

        if pre_existing {
            self.check_subscriptions(&stream.id).await;
        }
        if let Some(factory) = self.factory_address.clone() {
            self.ensure_factory_subscription(&stream.id, &factory).await?;
        }
        Ok(())
    }

    pub async fn create_pool(
        &self,
        ctx: &RequestContext,
        dto: &TokenPool,
    ) -> Result<CreatePoolResponse, ApiError> {
        match &dto.config.address {
            Some(address) => {
                let event = self.index_existing_pool(ctx, dto, &address.to_lowercase()).await?;
                Ok(CreatePoolResponse::Created(event))
            }
            None => {
                let response = self.deploy_via_factory(ctx, dto).await?;
                Ok(CreatePoolResponse::Pending(response))
            }
        }
    }

    async fn index_existing_pool(
        &self,
        ctx: &RequestContext,
        dto: &TokenPool,
        address: &str,
    ) -> Result<TokenPoolEventData, ApiError> {
        let with_data = self.mapper.supports_data(ctx, address, dto.token_type).await;
        let schema = AbiMapper::token_schema(dto.token_type, with_data);
        let locator = PoolLocator::new(address, schema, dto.token_type);
        let event = self
            .pool_event(ctx, &locator, None, Some(dto.signer.clone()), dto.data.clone())
            .await?;
        if let Some(symbol) = &dto.symbol {
            if event.info.symbol.as_deref() != Some(symbol.as_str()) {
                return Err(ApiError::Validation(format!(
                    "Supplied symbol '{symbol}' does not match on-chain symbol '{}'",
                    event.info.symbol.as_deref().unwrap_or("")
                )));
            }
        }
        Ok(event)
    }

    async fn deploy_via_factory(
        &self,
        ctx: &RequestContext,
        dto: &TokenPool,
    ) -> Result<AsyncResponse, ApiError> {
        let Some(factory) = &self.factory_address else {
            return Err(ApiError::Validation(
                "No factory contract address configured".to_string(),
            ));
        };
        let name = dto
            .name
            .as_deref()
            .ok_or_else(|| ApiError::Validation("Name is required to deploy a pool".to_string()))?;
        let symbol = dto.symbol.as_deref().ok_or_else(|| {
            ApiError::Validation("Symbol is required to deploy a pool".to_string())
        })?;

        let mut params = vec![
            json!(name),
            json!(symbol),
            json!(dto.token_type == TokenType::Fungible),
            json!(encode_hex(dto.data.as_deref().unwrap_or(""))),
        ];
        let uri_capable = self.mapper.supports_nft_uri(ctx, factory, true).await;
        let arity = if uri_capable {
            params.push(json!(dto.config.uri.clone().unwrap_or_default()));
            5
        } else {
            4
        };
        let method = registry::token_factory_abi()
            .iter()
            .find(|entry| {
                entry.is_function()
                    && entry.name.as_deref() == Some("create")
                    && entry.inputs.len() == arity
            })
            .ok_or_else(|| ApiError::NotFound("No suitable method found".to_string()))?;

        let response = self
            .blockchain
            .send_transaction(
                ctx,
                &dto.signer,
                factory,
                dto.request_id.as_deref(),
                method,
                &params,
            )
            .await?;
        Ok(AsyncResponse { id: response.id })
    }

    /// Creates the per-event subscriptions for a pool. Safe to repeat: an
    /// existing subscription is left untouched.
    pub async fn activate_pool(
        &self,
        ctx: &RequestContext,
        dto: &TokenPoolActivate,
    ) -> Result<TokenPoolEventData, ApiError> {
        let locator = validate_locator(&dto.pool_locator)?;
        let stream_id = self
            .stream_id
            .get()
            .ok_or_else(|| ApiError::Upstream("Event stream not initialized".to_string()))?;
        let from_block = dto
            .config
            .block_number
            .clone()
            .unwrap_or_else(|| "0".to_string());
        let methods = registry::invoke_methods(&locator.schema);

        for event_name in expected_events(&locator) {
            let Some(event) = registry::event_abi(&locator.schema, event_name) else {
                tracing::warn!(schema = %locator.schema, event_name, "Event missing from ABI");
                continue;
            };
            let name = pack_subscription_name(
                &self.topic,
                &dto.pool_locator,
                event_name,
                dto.pool_data.as_deref(),
            );
            self.streams
                .get_or_create_subscription(
                    stream_id,
                    event,
                    &name,
                    &locator.address,
                    &methods,
                    &from_block,
                )
                .await
                .map_err(ApiError::from)?;
        }

        self.pool_event(ctx, &locator, dto.pool_data.clone(), None, None)
            .await
    }

    pub async fn mint(
        &self,
        ctx: &RequestContext,
        dto: &TokenMint,
    ) -> Result<AsyncResponse, ApiError> {
        let locator = validate_locator(&dto.pool_locator)?;
        validate_amount(&locator, dto.amount.as_deref())?;
        let uri_support = if locator.is_fungible() {
            None
        } else {
            Some(self.mapper.supports_nft_uri(ctx, &locator.address, false).await)
        };
        let call = self.mapper.mint_method(&locator, dto, uri_support)?;
        self.submit(ctx, &dto.signer, &locator, dto.request_id.as_deref(), call)
            .await
    }

    pub async fn transfer(
        &self,
        ctx: &RequestContext,
        dto: &TokenTransfer,
    ) -> Result<AsyncResponse, ApiError> {
        let locator = validate_locator(&dto.pool_locator)?;
        validate_amount(&locator, dto.amount.as_deref())?;
        let call = self.mapper.transfer_method(&locator, dto)?;
        self.submit(ctx, &dto.signer, &locator, dto.request_id.as_deref(), call)
            .await
    }

    pub async fn burn(
        &self,
        ctx: &RequestContext,
        dto: &TokenBurn,
    ) -> Result<AsyncResponse, ApiError> {
        let locator = validate_locator(&dto.pool_locator)?;
        validate_amount(&locator, dto.amount.as_deref())?;
        let call = self.mapper.burn_method(&locator, dto)?;
        self.submit(ctx, &dto.signer, &locator, dto.request_id.as_deref(), call)
            .await
    }

    pub async fn approval(
        &self,
        ctx: &RequestContext,
        dto: &TokenApproval,
    ) -> Result<AsyncResponse, ApiError> {
        let locator = validate_locator(&dto.pool_locator)?;
        let call = self.mapper.approval_method(&locator, dto)?;
        self.submit(ctx, &dto.signer, &locator, dto.request_id.as_deref(), call)
            .await
    }

    pub async fn balance(
        &self,
        ctx: &RequestContext,
        dto: &TokenBalanceQuery,
    ) -> Result<TokenBalance, ApiError> {
        let locator = validate_locator(&dto.pool_locator)?;
        let method = registry::method_abi(&locator.schema, "balanceOf")
            .ok_or_else(|| ApiError::NotFound("No suitable method found".to_string()))?;
        let response = self
            .blockchain
            .query(ctx, &locator.address, method, &[json!(dto.account)])
            .await
            .map_err(ApiError::from)?;
        Ok(TokenBalance {
            balance: output_as_string(&response.output),
        })
    }

    pub async fn receipt(&self, ctx: &RequestContext, id: &str) -> Result<Value, ApiError> {
        Ok(self.blockchain.get_receipt(ctx, id).await?)
    }

    async fn submit(
        &self,
        ctx: &RequestContext,
        signer: &str,
        locator: &PoolLocator,
        request_id: Option<&str>,
        call: crate::abi::MethodCall,
    ) -> Result<AsyncResponse, ApiError> {
        let response = self
            .blockchain
            .send_transaction(ctx, signer, &locator.address, request_id, &call.method, &call.params)
            .await?;
        Ok(AsyncResponse { id: response.id })
    }

    /// The synchronous pool description: on-chain name/symbol, decimals for
    /// ERC-20, and the base URI for URI-capable ERC-721 contracts.
    async fn pool_event(
        &self,
        ctx: &RequestContext,
        locator: &PoolLocator,
        pool_data: Option<String>,
        signer: Option<String>,
        data: Option<String>,
    ) -> Result<TokenPoolEventData, ApiError> {
        let token_type = locator
            .token_type()
            .ok_or_else(|| ApiError::Validation("Invalid pool locator".to_string()))?;
        let name = self.query_string(ctx, locator, "name").await?;
        let symbol = self.query_string(ctx, locator, "symbol").await?;
        let decimals = if locator.is_fungible() {
            let response = self.query_method(ctx, locator, "decimals").await?;
            output_as_u32(&response)
        } else {
            None
        };
        let uri = if !locator.is_fungible()
            && self.mapper.supports_nft_uri(ctx, &locator.address, false).await
        {
            Some(self.query_base_uri(ctx, locator).await?)
        } else {
            None
        };
        Ok(TokenPoolEventData {
            standard: locator.standard().to_string(),
            pool_locator: locator.pack(),
            token_type,
            signer,
            data,
            pool_data,
            info: TokenPoolInfo {
                address: locator.address.clone(),
                schema: locator.schema.clone(),
                name: Some(name),
                symbol: Some(symbol),
                decimals,
                uri,
            },
            blockchain: None,
        })
    }

    async fn query_method(
        &self,
        ctx: &RequestContext,
        locator: &PoolLocator,
        method_name: &str,
    ) -> Result<Value, ApiError> {
        let method = registry::method_abi(&locator.schema, method_name)
            .ok_or_else(|| ApiError::NotFound("No suitable method found".to_string()))?;
        let response = self
            .blockchain
            .query(ctx, &locator.address, method, &[])
            .await
            .map_err(ApiError::from)?;
        Ok(response.output)
    }

    async fn query_string(
        &self,
        ctx: &RequestContext,
        locator: &PoolLocator,
        method_name: &str,
    ) -> Result<String, ApiError> {
        Ok(output_as_string(
            &self.query_method(ctx, locator, method_name).await?,
        ))
    }

    /// The URI methods only appear in the URI-capable ABI document, which a
    /// pool advertising URI support implements regardless of its schema tag.
    async fn query_base_uri(
        &self,
        ctx: &RequestContext,
        locator: &PoolLocator,
    ) -> Result<String, ApiError> {
        let method = registry::method_abi(registry::ERC721_WITH_DATA, "baseTokenUri")
            .ok_or_else(|| ApiError::NotFound("No suitable method found".to_string()))?;
        let response = self
            .blockchain
            .query(ctx, &locator.address, method, &[])
            .await
            .map_err(ApiError::from)?;
        Ok(output_as_string(&response.output))
    }

    async fn ensure_factory_subscription(
        &self,
        stream_id: &str,
        factory: &str,
    ) -> Result<(), ApiError> {
        let event = registry::token_factory_abi()
            .iter()
            .find(|entry| entry.is_event() && entry.name.as_deref() == Some(POOL_CREATION_EVENT))
            .ok_or_else(|| ApiError::NotFound("No suitable method found".to_string()))?;
        let methods: Vec<_> = registry::token_factory_abi()
            .iter()
            .filter(|entry| entry.is_function())
            .collect();
        let name = pack_subscription_name(&self.topic, factory, POOL_CREATION_EVENT, None);
        self.streams
            .get_or_create_subscription(stream_id, event, &name, factory, &methods, "0")
            .await
            .map_err(ApiError::from)?;
        Ok(())
    }

    /// Compares each known pool's subscriptions against the set its schema
    /// requires. A drifted pool keeps working for the events that are there;
    /// re-activation repairs the rest.
    async fn check_subscriptions(&self, stream_id: &str) {
        let subscriptions = match self.streams.list_subscriptions().await {
            Ok(subscriptions) => subscriptions,
            Err(error) => {
                tracing::warn!(%error, "Unable to audit existing subscriptions");
                return;
            }
        };
        let mut by_pool: std::collections::HashMap<String, HashSet<String>> =
            std::collections::HashMap::new();
        for subscription in subscriptions {
            if subscription.stream.as_deref() != Some(stream_id) {
                continue;
            }
            let Some(parsed) = unpack_subscription_name(&self.topic, &subscription.name) else {
                continue;
            };
            if parsed.event == POOL_CREATION_EVENT {
                continue;
            }
            by_pool
                .entry(parsed.pool_locator)
                .or_default()
                .insert(parsed.event);
        }
        for (pool_locator, actual) in by_pool {
            let locator = PoolLocator::unpack(&pool_locator);
            if !locator.validate() {
                continue;
            }
            let expected: HashSet<String> = expected_events(&locator)
                .iter()
                .map(|name| name.to_string())
                .collect();
            if actual != expected {
                tracing::warn!(
                    pool_locator = %pool_locator,
                    "Pool subscriptions do not match the expected event set; re-activate this pool to repair them"
                );
            }
        }
    }
}

/// The event subscriptions a pool of this schema needs.
fn expected_events(locator: &PoolLocator) -> &'static [&'static str] {
    if locator.is_fungible() {
        &[TRANSFER_EVENT, APPROVAL_EVENT]
    } else {
        &[TRANSFER_EVENT, APPROVAL_EVENT, APPROVAL_FOR_ALL_EVENT]
    }
}

fn validate_locator(raw: &str) -> Result<PoolLocator, ApiError> {
    let locator = PoolLocator::unpack(raw);
    if !locator.validate() {
        return Err(ApiError::Validation(format!("Invalid pool locator: {raw}")));
    }
    Ok(locator)
}

/// Operation invariants on `amount`: fungible operations need one,
/// non-fungible operations only accept the implicit single token.
fn validate_amount(locator: &PoolLocator, amount: Option<&str>) -> Result<(), ApiError> {
    if locator.is_fungible() {
        if amount.is_none() {
            return Err(ApiError::Validation(
                "Amount is required for fungible tokens".to_string(),
            ));
        }
        return Ok(());
    }
    match amount {
        None | Some("1") => Ok(()),
        Some(_) => Err(ApiError::Validation(
            "Amount for nonfungible tokens must be 1".to_string(),
        )),
    }
}

fn output_as_string(output: &Value) -> String {
    match output {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn output_as_u32(output: &Value) -> Option<u32> {
    match output {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fungible_locator() -> PoolLocator {
        PoolLocator::new("0x123456", "ERC20WithData", TokenType::Fungible)
    }

    fn nonfungible_locator() -> PoolLocator {
        PoolLocator::new("0x123456", "ERC721WithData", TokenType::NonFungible)
    }

    #[test]
    fn test_validate_amount_fungible() {
        assert!(validate_amount(&fungible_locator(), Some("10")).is_ok());
        assert!(validate_amount(&fungible_locator(), None).is_err());
    }

    #[test]
    fn test_validate_amount_nonfungible() {
        let locator = nonfungible_locator();
        assert!(validate_amount(&locator, None).is_ok());
        assert!(validate_amount(&locator, Some("1")).is_ok());

        let error = validate_amount(&locator, Some("2")).unwrap_err();
        match error {
            ApiError::Validation(message) => {
                assert_eq!(message, "Amount for nonfungible tokens must be 1");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_locator() {
        assert!(validate_locator("address=0x1&schema=ERC20NoData&type=fungible").is_ok());
        assert!(matches!(
            validate_locator("garbage"),
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            validate_locator("address=0x1&schema=ERC20NoData&type=nonfungible"),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn test_expected_events_by_type() {
        assert_eq!(expected_events(&fungible_locator()), &["Transfer", "Approval"]);
        assert_eq!(
            expected_events(&nonfungible_locator()),
            &["Transfer", "Approval", "ApprovalForAll"]
        );
    }

    #[test]
    fn test_output_conversions() {
        assert_eq!(output_as_string(&json!("100")), "100");
        assert_eq!(output_as_string(&json!(100)), "100");
        assert_eq!(output_as_string(&Value::Null), "");
        assert_eq!(output_as_u32(&json!("18")), Some(18));
        assert_eq!(output_as_u32(&json!(18)), Some(18));
        assert_eq!(output_as_u32(&json!("abc")), None);
    }
}
