//! ABI documents forwarded to the RPC gateway.
//!
//! The connector never encodes calldata itself: method and event definitions
//! are passed to the gateway as JSON alongside string parameters. These types
//! model the subset of the Solidity ABI JSON format the gateway consumes.
//! Method identity for dispatch purposes is the pair of `name` and the
//! ordered input type vector; parameter names are ignored.

use serde::{Deserialize, Serialize};

/// One named, typed parameter of a method or event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiInput {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexed: Option<bool>,
}

/// One entry of an ABI document: a function, event, or constructor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbiEntry {
    #[serde(rename = "type")]
    pub entry_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub inputs: Vec<AbiInput>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<AbiInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_mutability: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anonymous: Option<bool>,
}

impl AbiEntry {
    pub fn is_function(&self) -> bool {
        self.entry_type == "function"
    }

    pub fn is_event(&self) -> bool {
        self.entry_type == "event"
    }

    /// True when this entry has the given name and exactly the given ordered
    /// input types.
    pub fn matches(&self, name: &str, input_types: &[&str]) -> bool {
        self.name.as_deref() == Some(name)
            && self.inputs.len() == input_types.len()
            && self
                .inputs
                .iter()
                .zip(input_types)
                .all(|(input, expected)| input.type_name == *expected)
    }

    /// The canonical Solidity signature, e.g. `Transfer(address,address,uint256)`.
    pub fn signature(&self) -> String {
        let types: Vec<&str> = self.inputs.iter().map(|i| i.type_name.as_str()).collect();
        format!("{}({})", self.name.as_deref().unwrap_or(""), types.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn transfer_event() -> AbiEntry {
        serde_json::from_value(json!({
            "type": "event",
            "name": "Transfer",
            "inputs": [
                { "name": "from", "type": "address", "indexed": true },
                { "name": "to", "type": "address", "indexed": true },
                { "name": "value", "type": "uint256", "indexed": false }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_signature() {
        assert_eq!(transfer_event().signature(), "Transfer(address,address,uint256)");
    }

    #[test]
    fn test_matches_by_name_and_types() {
        let event = transfer_event();
        assert!(event.matches("Transfer", &["address", "address", "uint256"]));
        assert!(!event.matches("Transfer", &["address", "uint256"]));
        assert!(!event.matches("Approval", &["address", "address", "uint256"]));
    }

    #[test]
    fn test_function_round_trip() {
        let raw = json!({
            "type": "function",
            "name": "mintWithData",
            "stateMutability": "nonpayable",
            "inputs": [
                { "name": "to", "type": "address" },
                { "name": "amount", "type": "uint256" },
                { "name": "data", "type": "bytes" }
            ]
        });
        let entry: AbiEntry = serde_json::from_value(raw.clone()).unwrap();
        assert!(entry.is_function());
        assert_eq!(serde_json::to_value(&entry).unwrap(), raw);
    }
}
