//! ABI resolution and method dispatch.
//!
//! Maps abstract operations (mint, transfer, burn, approval) onto the best
//! concrete contract method for a pool's schema: the operation's prioritized
//! candidate list is walked in order, each candidate is matched against the
//! schema's ABI by name and input type vector, and the first candidate whose
//! DTO mapping accepts the request wins.

pub mod probe;
pub mod registry;
pub mod signatures;

use serde_json::Value;
use std::sync::Arc;

use tokens_types::abi::AbiEntry;
use tokens_types::locator::{PoolLocator, TokenType};
use tokens_types::tokens::{TokenApproval, TokenBurn, TokenMint, TokenTransfer};

use crate::abi::probe::CapabilityProbe;
use crate::abi::signatures::MethodSignature;
use crate::blockchain::{BlockchainConnector, RequestContext};
use crate::error::ApiError;

/// A resolved contract method plus marshalled parameters.
#[derive(Debug, Clone)]
pub struct MethodCall {
    pub method: AbiEntry,
    pub params: Vec<Value>,
}

/// Composes the schema registry, signature tables, and capability probe.
pub struct AbiMapper {
    probe: CapabilityProbe,
}

impl AbiMapper {
    pub fn new(blockchain: Arc<BlockchainConnector>) -> Self {
        AbiMapper {
            probe: CapabilityProbe::new(blockchain),
        }
    }

    /// The schema tag for a pool given its type and data-variant support.
    pub fn token_schema(token_type: TokenType, with_data: bool) -> &'static str {
        match (token_type, with_data) {
            (TokenType::Fungible, false) => registry::ERC20_NO_DATA,
            (TokenType::Fungible, true) => registry::ERC20_WITH_DATA,
            (TokenType::NonFungible, false) => registry::ERC721_NO_DATA,
            (TokenType::NonFungible, true) => registry::ERC721_WITH_DATA,
        }
    }

    pub fn mint_method(
        &self,
        locator: &PoolLocator,
        dto: &TokenMint,
        uri_support: Option<bool>,
    ) -> Result<MethodCall, ApiError> {
        let candidates: &[MethodSignature<TokenMint>] = if locator.is_fungible() {
            signatures::ERC20_MINT
        } else {
            signatures::ERC721_MINT
        };
        Self::resolve(&locator.schema, candidates, dto, uri_support)
    }

    pub fn transfer_method(
        &self,
        locator: &PoolLocator,
        dto: &TokenTransfer,
    ) -> Result<MethodCall, ApiError> {
        let candidates: &[MethodSignature<TokenTransfer>] = if locator.is_fungible() {
            signatures::ERC20_TRANSFER
        } else {
            signatures::ERC721_TRANSFER
        };
        Self::resolve(&locator.schema, candidates, dto, None)
    }

    pub fn burn_method(
        &self,
        locator: &PoolLocator,
        dto: &TokenBurn,
    ) -> Result<MethodCall, ApiError> {
        let candidates: &[MethodSignature<TokenBurn>] = if locator.is_fungible() {
            signatures::ERC20_BURN
        } else {
            signatures::ERC721_BURN
        };
        Self::resolve(&locator.schema, candidates, dto, None)
    }

    pub fn approval_method(
        &self,
        locator: &PoolLocator,
        dto: &TokenApproval,
    ) -> Result<MethodCall, ApiError> {
        let candidates: &[MethodSignature<TokenApproval>] = if locator.is_fungible() {
            signatures::ERC20_APPROVAL
        } else {
            signatures::ERC721_APPROVAL
        };
        Self::resolve(&locator.schema, candidates, dto, None)
    }

    pub async fn supports_data(
        &self,
        ctx: &RequestContext,
        address: &str,
        token_type: TokenType,
    ) -> bool {
        self.probe.supports_data(ctx, address, token_type).await
    }

    pub async fn supports_nft_uri(
        &self,
        ctx: &RequestContext,
        address: &str,
        factory: bool,
    ) -> bool {
        self.probe.supports_nft_uri(ctx, address, factory).await
    }

    fn resolve<T>(
        schema: &str,
        candidates: &[MethodSignature<T>],
        dto: &T,
        uri_support: Option<bool>,
    ) -> Result<MethodCall, ApiError> {
        let abi = registry::abi_for_schema(schema)
            .ok_or_else(|| ApiError::Validation(format!("Unknown schema: {schema}")))?;
        find_method(abi, candidates, dto, uri_support)
            .ok_or_else(|| ApiError::NotFound("No suitable method found".to_string()))
    }
}

/// Walks the candidate list in priority order against the loaded ABI.
fn find_method<T>(
    abi: &[AbiEntry],
    candidates: &[MethodSignature<T>],
    dto: &T,
    uri_support: Option<bool>,
) -> Option<MethodCall> {
    for candidate in candidates {
        if candidate.uri_required && uri_support != Some(true) {
            continue;
        }
        let matched = abi
            .iter()
            .find(|entry| entry.is_function() && entry.matches(candidate.name, candidate.inputs));
        if let Some(method) = matched {
            if let Some(params) = (candidate.map)(dto) {
                return Some(MethodCall {
                    method: method.clone(),
                    params,
                });
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokens_types::tokens::TokenApprovalConfig;

    fn locator(schema: &str, token_type: TokenType) -> PoolLocator {
        PoolLocator::new("0x123456", schema, token_type)
    }

    fn mapper() -> AbiMapper {
        let config = crate::config::Config {
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
        let blockchain = Arc::new(crate::blockchain::BlockchainConnector::new(
            &config,
            reqwest::Client::new(),
        ));
        AbiMapper::new(blockchain)
    }

    fn mint(schema: &str, token_type: TokenType) -> TokenMint {
        TokenMint {
            pool_locator: locator(schema, token_type).pack(),
            signer: "0x1".to_string(),
            to: "0x123".to_string(),
            amount: Some("10".to_string()),
            token_index: Some("721".to_string()),
            uri: None,
            data: None,
            request_id: None,
        }
    }

    #[test]
    fn test_token_schema_truth_table() {
        assert_eq!(AbiMapper::token_schema(TokenType::Fungible, false), "ERC20NoData");
        assert_eq!(AbiMapper::token_schema(TokenType::Fungible, true), "ERC20WithData");
        assert_eq!(AbiMapper::token_schema(TokenType::NonFungible, false), "ERC721NoData");
        assert_eq!(AbiMapper::token_schema(TokenType::NonFungible, true), "ERC721WithData");
    }

    #[test]
    fn test_erc20_mint_with_data() {
        let mapper = mapper();
        let pool = locator("ERC20WithData", TokenType::Fungible);
        let call = mapper
            .mint_method(&pool, &mint("ERC20WithData", TokenType::Fungible), None)
            .unwrap();
        assert_eq!(call.method.signature(), "mintWithData(address,uint256,bytes)");
        assert_eq!(call.params, vec![json!("0x123"), json!("10"), json!("0x00")]);
    }

    #[test]
    fn test_erc721_mint_prefers_uri_when_supported() {
        let mapper = mapper();
        let pool = locator("ERC721WithData", TokenType::NonFungible);
        let dto = mint("ERC721WithData", TokenType::NonFungible);

        let with_uri = mapper.mint_method(&pool, &dto, Some(true)).unwrap();
        assert_eq!(
            with_uri.method.signature(),
            "mintWithURI(address,uint256,bytes,string)"
        );
        assert_eq!(
            with_uri.params,
            vec![json!("0x123"), json!("721"), json!("0x00"), json!("")]
        );

        let without_uri = mapper.mint_method(&pool, &dto, Some(false)).unwrap();
        assert_eq!(
            without_uri.method.signature(),
            "mintWithData(address,uint256,bytes)"
        );
    }

    #[test]
    fn test_erc721_approval_dispatch() {
        let mapper = mapper();
        let pool = locator("ERC721WithData", TokenType::NonFungible);
        let mut dto = TokenApproval {
            pool_locator: pool.pack(),
            signer: "0x1".to_string(),
            operator: "operator".to_string(),
            approved: true,
            data: None,
            request_id: None,
            config: TokenApprovalConfig {
                allowance: None,
                token_index: Some("5".to_string()),
            },
        };

        let per_token = mapper.approval_method(&pool, &dto).unwrap();
        assert_eq!(
            per_token.method.signature(),
            "approveWithData(address,uint256,bytes)"
        );
        assert_eq!(
            per_token.params,
            vec![json!("operator"), json!("5"), json!("0x00")]
        );

        dto.config.token_index = None;
        let operator_wide = mapper.approval_method(&pool, &dto).unwrap();
        assert_eq!(
            operator_wide.method.signature(),
            "setApprovalForAllWithData(address,bool,bytes)"
        );
        assert_eq!(
            operator_wide.params,
            vec![json!("operator"), json!(true), json!("0x00")]
        );
    }

    #[test]
    fn test_every_schema_resolves_every_operation() {
        let mapper = mapper();
        let schemas = [
            ("ERC20NoData", TokenType::Fungible),
            ("ERC20WithData", TokenType::Fungible),
            ("ERC721NoData", TokenType::NonFungible),
            ("ERC721WithData", TokenType::NonFungible),
        ];
        for (schema, token_type) in schemas {
            let pool = locator(schema, token_type);
            let mint_dto = mint(schema, token_type);
            let transfer = TokenTransfer {
                pool_locator: pool.pack(),
                signer: "0x1".to_string(),
                from: "0x1".to_string(),
                to: "0x2".to_string(),
                amount: Some("1".to_string()),
                token_index: Some("1".to_string()),
                data: None,
                request_id: None,
            };
            let burn = TokenBurn {
                pool_locator: pool.pack(),
                signer: "0x1".to_string(),
                from: "0x1".to_string(),
                amount: Some("1".to_string()),
                token_index: Some("1".to_string()),
                data: None,
                request_id: None,
            };
            let approval = TokenApproval {
                pool_locator: pool.pack(),
                signer: "0x1".to_string(),
                operator: "0x2".to_string(),
                approved: true,
                data: None,
                request_id: None,
                config: TokenApprovalConfig::default(),
            };
            assert!(mapper.mint_method(&pool, &mint_dto, None).is_ok(), "{schema} mint");
            assert!(mapper.transfer_method(&pool, &transfer).is_ok(), "{schema} transfer");
            assert!(mapper.burn_method(&pool, &burn).is_ok(), "{schema} burn");
            assert!(mapper.approval_method(&pool, &approval).is_ok(), "{schema} approval");
        }
    }

    #[test]
    fn test_unknown_schema_is_validation_error() {
        let mapper = mapper();
        let pool = locator("ERC1400", TokenType::Fungible);
        let result = mapper.mint_method(&pool, &mint("ERC1400", TokenType::Fungible), None);
        assert!(matches!(result, Err(ApiError::Validation(_))));
    }
}
