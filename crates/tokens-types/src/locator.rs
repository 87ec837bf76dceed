//! Canonical pool locator codec.
//!
//! A pool locator is the string identity of one activated token pool: the
//! contract address, the ABI schema variant it implements, and whether the
//! pool is fungible. It is serialized as a query string with a stable
//! attribute order (`address=…&schema=…&type=…`) so locators compare and
//! round-trip byte-for-byte.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Display;
use std::str::FromStr;
use url::form_urlencoded;

/// Divisible (ERC-20) vs indivisible (ERC-721) token model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Fungible,
    #[serde(rename = "nonfungible")]
    NonFungible,
}

impl Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TokenType::Fungible => "fungible",
            TokenType::NonFungible => "nonfungible",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown token type: {0}")]
pub struct TokenTypeError(String);

impl FromStr for TokenType {
    type Err = TokenTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fungible" => Ok(TokenType::Fungible),
            "nonfungible" => Ok(TokenType::NonFungible),
            other => Err(TokenTypeError(other.to_string())),
        }
    }
}

/// A canonical descriptor of an activated token pool.
///
/// `unpack` never fails: malformed input produces a locator whose
/// [`validate`](PoolLocator::validate) returns `false`. Attributes beyond the
/// three known ones are preserved in `extras` but ignored by consumers, and
/// are not re-emitted by [`pack`](PoolLocator::pack).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PoolLocator {
    /// Lowercase hex contract address, `0x`-prefixed.
    pub address: String,
    /// ABI schema variant tag, e.g. `ERC20WithData`.
    pub schema: String,
    /// `fungible` or `nonfungible`.
    pub token_type: String,
    /// Unknown attributes carried along on parse.
    pub extras: BTreeMap<String, String>,
}

impl PoolLocator {
    pub fn new(address: &str, schema: &str, token_type: TokenType) -> Self {
        PoolLocator {
            address: address.to_string(),
            schema: schema.to_string(),
            token_type: token_type.to_string(),
            extras: BTreeMap::new(),
        }
    }

    /// Serializes to the canonical `address=…&schema=…&type=…` form.
    pub fn pack(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .append_pair("address", &self.address)
            .append_pair("schema", &self.schema)
            .append_pair("type", &self.token_type)
            .finish()
    }

    /// Parses a locator string, tolerating the legacy `standard` key as a
    /// synonym for `schema`.
    pub fn unpack(packed: &str) -> Self {
        let mut locator = PoolLocator::default();
        for (key, value) in form_urlencoded::parse(packed.as_bytes()) {
            match key.as_ref() {
                "address" => locator.address = value.into_owned(),
                "schema" => locator.schema = value.into_owned(),
                "standard" if locator.schema.is_empty() => locator.schema = value.into_owned(),
                "type" => locator.token_type = value.into_owned(),
                other => {
                    locator.extras.insert(other.to_string(), value.into_owned());
                }
            }
        }
        locator
    }

    /// A locator is valid when all three attributes are present and the type
    /// is consistent with the schema family (ERC20 ⇒ fungible, ERC721 ⇒
    /// nonfungible).
    pub fn validate(&self) -> bool {
        if self.address.is_empty() || self.schema.is_empty() || self.token_type.is_empty() {
            return false;
        }
        match self.token_type() {
            Some(TokenType::Fungible) => self.schema.starts_with("ERC20"),
            Some(TokenType::NonFungible) => self.schema.starts_with("ERC721"),
            None => false,
        }
    }

    pub fn token_type(&self) -> Option<TokenType> {
        self.token_type.parse().ok()
    }

    pub fn is_fungible(&self) -> bool {
        self.token_type() == Some(TokenType::Fungible)
    }

    /// The base contract standard implied by the schema, `ERC20` or `ERC721`.
    pub fn standard(&self) -> &'static str {
        if self.schema.starts_with("ERC721") {
            "ERC721"
        } else {
            "ERC20"
        }
    }

    /// Whether the schema is one of the `WithData` variants.
    pub fn with_data(&self) -> bool {
        self.schema.contains("WithData")
    }
}

impl Display for PoolLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.pack())
    }
}
