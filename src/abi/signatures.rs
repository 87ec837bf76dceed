//! Prioritized method signature tables.
//!
//! Each abstract operation maps to an ordered list of candidate contract
//! methods. Candidates earlier in a list carry more information (attached
//! data, token URIs); later entries are fallbacks for contracts that only
//! implement the base standard. A candidate's `map` marshals the request DTO
//! into gateway parameters and may reject the DTO by returning `None`, which
//! moves matching on to the next candidate.

use serde_json::{Value, json};

use tokens_types::hexstr::encode_hex;
use tokens_types::tokens::{TokenApproval, TokenBurn, TokenMint, TokenTransfer};

/// Unlimited ERC-20 allowance (`2^256 - 1`), granted when an approval does
/// not name an explicit one.
pub const MAX_UINT256: &str =
    "115792089237316195423570985008687907853269984665640564039457584007913129639935";

pub const TRANSFER_EVENT: &str = "Transfer";
pub const APPROVAL_EVENT: &str = "Approval";
pub const APPROVAL_FOR_ALL_EVENT: &str = "ApprovalForAll";
pub const POOL_CREATION_EVENT: &str = "TokenPoolCreation";

pub const TRANSFER_SIGNATURE: &str = "Transfer(address,address,uint256)";
pub const APPROVAL_SIGNATURE: &str = "Approval(address,address,uint256)";
pub const APPROVAL_FOR_ALL_SIGNATURE: &str = "ApprovalForAll(address,address,bool)";
pub const POOL_CREATION_SIGNATURE: &str = "TokenPoolCreation(address,string,string,bool,bytes)";

/// One candidate contract method for an abstract operation.
pub struct MethodSignature<T> {
    pub name: &'static str,
    pub inputs: &'static [&'static str],
    /// Only considered once the contract's URI support is confirmed.
    pub uri_required: bool,
    pub map: fn(&T) -> Option<Vec<Value>>,
}

fn data_param(data: Option<&str>) -> Value {
    json!(encode_hex(data.unwrap_or("")))
}

/// The effective ERC-20 allowance: revoking approvals zero it; granting ones
/// default to unlimited.
fn erc20_allowance(dto: &TokenApproval) -> String {
    if !dto.approved {
        return "0".to_string();
    }
    dto.config
        .allowance
        .clone()
        .unwrap_or_else(|| MAX_UINT256.to_string())
}

fn map_erc20_mint_with_data(dto: &TokenMint) -> Option<Vec<Value>> {
    Some(vec![
        json!(dto.to),
        json!(dto.amount.clone()?),
        data_param(dto.data.as_deref()),
    ])
}

fn map_erc20_mint(dto: &TokenMint) -> Option<Vec<Value>> {
    Some(vec![json!(dto.to), json!(dto.amount.clone()?)])
}

fn map_erc20_transfer_with_data(dto: &TokenTransfer) -> Option<Vec<Value>> {
    Some(vec![
        json!(dto.from),
        json!(dto.to),
        json!(dto.amount.clone()?),
        data_param(dto.data.as_deref()),
    ])
}

fn map_erc20_transfer_from(dto: &TokenTransfer) -> Option<Vec<Value>> {
    Some(vec![
        json!(dto.from),
        json!(dto.to),
        json!(dto.amount.clone()?),
    ])
}

fn map_erc20_burn_with_data(dto: &TokenBurn) -> Option<Vec<Value>> {
    Some(vec![
        json!(dto.from),
        json!(dto.amount.clone()?),
        data_param(dto.data.as_deref()),
    ])
}

fn map_erc20_burn_from(dto: &TokenBurn) -> Option<Vec<Value>> {
    Some(vec![json!(dto.from), json!(dto.amount.clone()?)])
}

fn map_erc20_approve_with_data(dto: &TokenApproval) -> Option<Vec<Value>> {
    Some(vec![
        json!(dto.operator),
        json!(erc20_allowance(dto)),
        data_param(dto.data.as_deref()),
    ])
}

fn map_erc20_approve(dto: &TokenApproval) -> Option<Vec<Value>> {
    Some(vec![json!(dto.operator), json!(erc20_allowance(dto))])
}

fn map_erc721_mint_with_uri(dto: &TokenMint) -> Option<Vec<Value>> {
    Some(vec![
        json!(dto.to),
        json!(dto.token_index.clone()?),
        data_param(dto.data.as_deref()),
        json!(dto.uri.clone().unwrap_or_default()),
    ])
}

fn map_erc721_mint_with_data(dto: &TokenMint) -> Option<Vec<Value>> {
    Some(vec![
        json!(dto.to),
        json!(dto.token_index.clone()?),
        data_param(dto.data.as_deref()),
    ])
}

fn map_erc721_mint(dto: &TokenMint) -> Option<Vec<Value>> {
    Some(vec![json!(dto.to), json!(dto.token_index.clone()?)])
}

fn map_erc721_transfer_with_data(dto: &TokenTransfer) -> Option<Vec<Value>> {
    Some(vec![
        json!(dto.from),
        json!(dto.to),
        json!(dto.token_index.clone()?),
        data_param(dto.data.as_deref()),
    ])
}

fn map_erc721_safe_transfer_from(dto: &TokenTransfer) -> Option<Vec<Value>> {
    Some(vec![
        json!(dto.from),
        json!(dto.to),
        json!(dto.token_index.clone()?),
    ])
}

fn map_erc721_burn_with_data(dto: &TokenBurn) -> Option<Vec<Value>> {
    Some(vec![
        json!(dto.from),
        json!(dto.token_index.clone()?),
        data_param(dto.data.as_deref()),
    ])
}

fn map_erc721_burn(dto: &TokenBurn) -> Option<Vec<Value>> {
    Some(vec![json!(dto.from), json!(dto.token_index.clone()?)])
}

fn map_erc721_approve_with_data(dto: &TokenApproval) -> Option<Vec<Value>> {
    Some(vec![
        json!(dto.operator),
        json!(dto.config.token_index.clone()?),
        data_param(dto.data.as_deref()),
    ])
}

fn map_erc721_approve(dto: &TokenApproval) -> Option<Vec<Value>> {
    Some(vec![json!(dto.operator), json!(dto.config.token_index.clone()?)])
}

fn map_erc721_set_approval_for_all_with_data(dto: &TokenApproval) -> Option<Vec<Value>> {
    if dto.config.token_index.is_some() {
        return None;
    }
    Some(vec![
        json!(dto.operator),
        json!(dto.approved),
        data_param(dto.data.as_deref()),
    ])
}

fn map_erc721_set_approval_for_all(dto: &TokenApproval) -> Option<Vec<Value>> {
    if dto.config.token_index.is_some() {
        return None;
    }
    Some(vec![json!(dto.operator), json!(dto.approved)])
}

pub static ERC20_MINT: &[MethodSignature<TokenMint>] = &[
    MethodSignature {
        name: "mintWithData",
        inputs: &["address", "uint256", "bytes"],
        uri_required: false,
        map: map_erc20_mint_with_data,
    },
    MethodSignature {
        name: "mint",
        inputs: &["address", "uint256"],
        uri_required: false,
        map: map_erc20_mint,
    },
];

pub static ERC20_TRANSFER: &[MethodSignature<TokenTransfer>] = &[
    MethodSignature {
        name: "transferWithData",
        inputs: &["address", "address", "uint256", "bytes"],
        uri_required: false,
        map: map_erc20_transfer_with_data,
    },
    MethodSignature {
        name: "transferFrom",
        inputs: &["address", "address", "uint256"],
        uri_required: false,
        map: map_erc20_transfer_from,
    },
];

pub static ERC20_BURN: &[MethodSignature<TokenBurn>] = &[
    MethodSignature {
        name: "burnWithData",
        inputs: &["address", "uint256", "bytes"],
        uri_required: false,
        map: map_erc20_burn_with_data,
    },
    MethodSignature {
        name: "burnFrom",
        inputs: &["address", "uint256"],
        uri_required: false,
        map: map_erc20_burn_from,
    },
];

pub static ERC20_APPROVAL: &[MethodSignature<TokenApproval>] = &[
    MethodSignature {
        name: "approveWithData",
        inputs: &["address", "uint256", "bytes"],
        uri_required: false,
        map: map_erc20_approve_with_data,
    },
    MethodSignature {
        name: "approve",
        inputs: &["address", "uint256"],
        uri_required: false,
        map: map_erc20_approve,
    },
];

pub static ERC721_MINT: &[MethodSignature<TokenMint>] = &[
    MethodSignature {
        name: "mintWithURI",
        inputs: &["address", "uint256", "bytes", "string"],
        uri_required: true,
        map: map_erc721_mint_with_uri,
    },
    MethodSignature {
        name: "mintWithData",
        inputs: &["address", "uint256", "bytes"],
        uri_required: false,
        map: map_erc721_mint_with_data,
    },
    MethodSignature {
        name: "mint",
        inputs: &["address", "uint256"],
        uri_required: false,
        map: map_erc721_mint,
    },
];

pub static ERC721_TRANSFER: &[MethodSignature<TokenTransfer>] = &[
    MethodSignature {
        name: "transferWithData",
        inputs: &["address", "address", "uint256", "bytes"],
        uri_required: false,
        map: map_erc721_transfer_with_data,
    },
    MethodSignature {
        name: "safeTransferFrom",
        inputs: &["address", "address", "uint256"],
        uri_required: false,
        map: map_erc721_safe_transfer_from,
    },
];

pub static ERC721_BURN: &[MethodSignature<TokenBurn>] = &[
    MethodSignature {
        name: "burnWithData",
        inputs: &["address", "uint256", "bytes"],
        uri_required: false,
        map: map_erc721_burn_with_data,
    },
    MethodSignature {
        name: "burn",
        inputs: &["address", "uint256"],
        uri_required: false,
        map: map_erc721_burn,
    },
];

pub static ERC721_APPROVAL: &[MethodSignature<TokenApproval>] = &[
    MethodSignature {
        name: "approveWithData",
        inputs: &["address", "uint256", "bytes"],
        uri_required: false,
        map: map_erc721_approve_with_data,
    },
    MethodSignature {
        name: "approve",
        inputs: &["address", "uint256"],
        uri_required: false,
        map: map_erc721_approve,
    },
    MethodSignature {
        name: "setApprovalForAllWithData",
        inputs: &["address", "bool", "bytes"],
        uri_required: false,
        map: map_erc721_set_approval_for_all_with_data,
    },
    MethodSignature {
        name: "setApprovalForAll",
        inputs: &["address", "bool"],
        uri_required: false,
        map: map_erc721_set_approval_for_all,
    },
];

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokens_types::tokens::TokenApprovalConfig;

    fn approval(approved: bool, allowance: Option<&str>, token_index: Option<&str>) -> TokenApproval {
        TokenApproval {
            pool_locator: "address=0x1&schema=ERC20WithData&type=fungible".to_string(),
            signer: "0x1".to_string(),
            operator: "0x2".to_string(),
            approved,
            data: None,
            request_id: None,
            config: TokenApprovalConfig {
                allowance: allowance.map(str::to_string),
                token_index: token_index.map(str::to_string),
            },
        }
    }

    #[test]
    fn test_erc20_allowance_defaults() {
        assert_eq!(erc20_allowance(&approval(false, None, None)), "0");
        assert_eq!(erc20_allowance(&approval(true, None, None)), MAX_UINT256);
        assert_eq!(erc20_allowance(&approval(true, Some("50"), None)), "50");
    }

    #[test]
    fn test_empty_data_encodes_sentinel() {
        assert_eq!(data_param(None), json!("0x00"));
        assert_eq!(data_param(Some("")), json!("0x00"));
        assert_eq!(data_param(Some("test")), json!("0x74657374"));
    }

    #[test]
    fn test_erc721_approval_maps_gate_on_token_index() {
        let per_token = approval(true, None, Some("5"));
        assert_eq!(
            map_erc721_approve_with_data(&per_token),
            Some(vec![json!("0x2"), json!("5"), json!("0x00")])
        );
        assert_eq!(map_erc721_set_approval_for_all_with_data(&per_token), None);

        let operator_wide = approval(true, None, None);
        assert_eq!(map_erc721_approve_with_data(&operator_wide), None);
        assert_eq!(
            map_erc721_set_approval_for_all_with_data(&operator_wide),
            Some(vec![json!("0x2"), json!(true), json!("0x00")])
        );
    }

    #[test]
    fn test_erc721_mint_ordering_prefers_richer_variants() {
        let names: Vec<_> = ERC721_MINT.iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["mintWithURI", "mintWithData", "mint"]);
        assert!(ERC721_MINT[0].uri_required);
    }
}
