//! Capability probing via ERC-165 `supportsInterface`.
//!
//! Contracts advertise optional method families (data-carrying variants, URI
//! minting, factory extensions) through four-byte interface ids. Probe
//! results are cached in bounded LRUs; a failed probe counts as "not
//! supported" and is cached as such, so a flaky contract can never fail a
//! user-visible request.

use lru::LruCache;
use serde_json::{Value, json};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::Mutex;

use tokens_types::locator::TokenType;

use crate::abi::registry::SUPPORTS_INTERFACE;
use crate::blockchain::{BlockchainConnector, RequestContext};

/// ERC-20 contract with data-carrying method variants.
pub const ERC20_WITH_DATA_IID: &str = "0xaefdad0f";
/// ERC-721 contract with URI-carrying mint support.
pub const ERC721_URI_IID: &str = "0x8706707d";
/// Legacy ERC-721 contract with data-carrying variants but no URI support.
pub const ERC721_WITH_DATA_IID: &str = "0xb2429c12";
/// Token factory with the URI-capable create extension.
pub const TOKEN_FACTORY_IID: &str = "0x83a74a0c";

const CACHE_CAPACITY: usize = 500;

/// Cached `supportsInterface` probe results.
///
/// The URI-support cache is keyed by address alone; a token contract and a
/// factory at the same address share one slot.
pub struct CapabilityProbe {
    blockchain: Arc<BlockchainConnector>,
    interfaces: Mutex<LruCache<String, bool>>,
    uri_support: Mutex<LruCache<String, bool>>,
}

impl CapabilityProbe {
    pub fn new(blockchain: Arc<BlockchainConnector>) -> Self {
        let capacity = NonZeroUsize::new(CACHE_CAPACITY).expect("cache capacity is nonzero");
        CapabilityProbe {
            blockchain,
            interfaces: Mutex::new(LruCache::new(capacity)),
            uri_support: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Whether the contract at `address` advertises the interface id.
    ///
    /// Probe failures are cached and reported as `false`; they never
    /// propagate. A duplicate probe during a cache-miss race is harmless as
    /// both resolve to the same value.
    pub async fn supports_interface(
        &self,
        ctx: &RequestContext,
        address: &str,
        iid: &str,
    ) -> bool {
        let key = format!("{address}:{iid}");
        if let Some(cached) = self.interfaces.lock().await.get(&key) {
            return *cached;
        }
        let supported = self.probe(ctx, address, iid).await;
        self.interfaces.lock().await.put(key, supported);
        supported
    }

    /// Whether the contract implements the data-carrying variant family for
    /// its token type.
    pub async fn supports_data(
        &self,
        ctx: &RequestContext,
        address: &str,
        token_type: TokenType,
    ) -> bool {
        match token_type {
            TokenType::Fungible => {
                self.supports_interface(ctx, address, ERC20_WITH_DATA_IID).await
            }
            TokenType::NonFungible => {
                self.supports_nft_uri(ctx, address, false).await
                    || self.supports_interface(ctx, address, ERC721_WITH_DATA_IID).await
            }
        }
    }

    /// Whether the contract (or, with `factory`, the factory) supports the
    /// URI extension.
    pub async fn supports_nft_uri(
        &self,
        ctx: &RequestContext,
        address: &str,
        factory: bool,
    ) -> bool {
        if let Some(cached) = self.uri_support.lock().await.get(address) {
            return *cached;
        }
        let mut supported = self.supports_interface(ctx, address, ERC721_URI_IID).await;
        if !supported && factory {
            supported = self.supports_interface(ctx, address, TOKEN_FACTORY_IID).await;
        }
        self.uri_support
            .lock()
            .await
            .put(address.to_string(), supported);
        supported
    }

    async fn probe(&self, ctx: &RequestContext, address: &str, iid: &str) -> bool {
        let result = self
            .blockchain
            .query(ctx, address, &SUPPORTS_INTERFACE, &[json!(iid)])
            .await;
        match result {
            Ok(response) => output_as_bool(&response.output),
            Err(error) => {
                tracing::info!(
                    address,
                    iid,
                    %error,
                    "supportsInterface probe failed, treating as unsupported"
                );
                false
            }
        }
    }
}

fn output_as_bool(output: &Value) -> bool {
    match output {
        Value::Bool(b) => *b,
        Value::String(s) => s == "true",
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_as_bool() {
        assert!(output_as_bool(&json!(true)));
        assert!(output_as_bool(&json!("true")));
        assert!(!output_as_bool(&json!(false)));
        assert!(!output_as_bool(&json!("false")));
        assert!(!output_as_bool(&json!(null)));
        assert!(!output_as_bool(&json!(1)));
    }

    #[test]
    fn test_interface_ids_are_selectors() {
        for iid in [
            ERC20_WITH_DATA_IID,
            ERC721_URI_IID,
            ERC721_WITH_DATA_IID,
            TOKEN_FACTORY_IID,
        ] {
            assert!(iid.starts_with("0x"));
            assert_eq!(iid.len(), 10);
        }
    }
}
