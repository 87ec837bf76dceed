//! Static ABI registry.
//!
//! One ABI document per schema variant, parsed once from the JSON files under
//! `abi/` and served as shared slices. Event definitions and the invoke-method
//! list are carved out of the same documents for subscription creation.

use once_cell::sync::Lazy;

use tokens_types::abi::AbiEntry;

pub const ERC20_NO_DATA: &str = "ERC20NoData";
pub const ERC20_WITH_DATA: &str = "ERC20WithData";
pub const ERC721_NO_DATA: &str = "ERC721NoData";
pub const ERC721_WITH_DATA: &str = "ERC721WithData";

static ERC20_NO_DATA_ABI: Lazy<Vec<AbiEntry>> =
    Lazy::new(|| parse_abi(include_str!("../../abi/ERC20NoData.json")));
static ERC20_WITH_DATA_ABI: Lazy<Vec<AbiEntry>> =
    Lazy::new(|| parse_abi(include_str!("../../abi/ERC20WithData.json")));
static ERC721_NO_DATA_ABI: Lazy<Vec<AbiEntry>> =
    Lazy::new(|| parse_abi(include_str!("../../abi/ERC721NoData.json")));
static ERC721_WITH_DATA_ABI: Lazy<Vec<AbiEntry>> =
    Lazy::new(|| parse_abi(include_str!("../../abi/ERC721WithData.json")));
static TOKEN_FACTORY_ABI: Lazy<Vec<AbiEntry>> =
    Lazy::new(|| parse_abi(include_str!("../../abi/TokenFactory.json")));

fn parse_abi(raw: &str) -> Vec<AbiEntry> {
    serde_json::from_str(raw).expect("bundled ABI document parses")
}

/// Looks up the ABI for a schema tag. `None` for unrecognized schemas.
pub fn abi_for_schema(schema: &str) -> Option<&'static [AbiEntry]> {
    match schema {
        ERC20_NO_DATA => Some(ERC20_NO_DATA_ABI.as_slice()),
        ERC20_WITH_DATA => Some(ERC20_WITH_DATA_ABI.as_slice()),
        ERC721_NO_DATA => Some(ERC721_NO_DATA_ABI.as_slice()),
        ERC721_WITH_DATA => Some(ERC721_WITH_DATA_ABI.as_slice()),
        _ => None,
    }
}

pub fn token_factory_abi() -> &'static [AbiEntry] {
    &TOKEN_FACTORY_ABI
}

/// The event definition with the given name from a schema's ABI.
pub fn event_abi(schema: &str, event_name: &str) -> Option<&'static AbiEntry> {
    abi_for_schema(schema)?
        .iter()
        .find(|entry| entry.is_event() && entry.name.as_deref() == Some(event_name))
}

/// All function entries of a schema's ABI. Passed with each subscription so
/// the upstream stream can decode transaction inputs.
pub fn invoke_methods(schema: &str) -> Vec<&'static AbiEntry> {
    abi_for_schema(schema)
        .map(|abi| abi.iter().filter(|entry| entry.is_function()).collect())
        .unwrap_or_default()
}

/// A method definition looked up by name from a schema's ABI.
pub fn method_abi(schema: &str, name: &str) -> Option<&'static AbiEntry> {
    abi_for_schema(schema)?
        .iter()
        .find(|entry| entry.is_function() && entry.name.as_deref() == Some(name))
}

/// `supportsInterface(bytes4)` used by the capability probe.
pub static SUPPORTS_INTERFACE: Lazy<AbiEntry> = Lazy::new(|| {
    ERC20_WITH_DATA_ABI
        .iter()
        .find(|entry| entry.matches("supportsInterface", &["bytes4"]))
        .expect("supportsInterface present in bundled ABI")
        .clone()
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_schemas_load() {
        for schema in [ERC20_NO_DATA, ERC20_WITH_DATA, ERC721_NO_DATA, ERC721_WITH_DATA] {
            let abi = abi_for_schema(schema).unwrap();
            assert!(!abi.is_empty(), "{schema} ABI is empty");
        }
        assert!(abi_for_schema("ERC1155").is_none());
    }

    #[test]
    fn test_event_lookup() {
        let transfer = event_abi(ERC20_WITH_DATA, "Transfer").unwrap();
        assert_eq!(transfer.signature(), "Transfer(address,address,uint256)");

        let approval_for_all = event_abi(ERC721_NO_DATA, "ApprovalForAll").unwrap();
        assert_eq!(
            approval_for_all.signature(),
            "ApprovalForAll(address,address,bool)"
        );
        assert!(event_abi(ERC20_NO_DATA, "ApprovalForAll").is_none());
    }

    #[test]
    fn test_factory_has_both_create_overloads() {
        let creates: Vec<_> = token_factory_abi()
            .iter()
            .filter(|entry| entry.is_function() && entry.name.as_deref() == Some("create"))
            .collect();
        assert_eq!(creates.len(), 2);
        assert!(creates.iter().any(|m| m.inputs.len() == 4));
        assert!(creates.iter().any(|m| m.inputs.len() == 5));
    }

    #[test]
    fn test_invoke_methods_exclude_events() {
        let methods = invoke_methods(ERC721_WITH_DATA);
        assert!(!methods.is_empty());
        assert!(methods.iter().all(|entry| entry.is_function()));
    }

    #[test]
    fn test_supports_interface_definition() {
        assert_eq!(SUPPORTS_INTERFACE.signature(), "supportsInterface(bytes4)");
    }
}
