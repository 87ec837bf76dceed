//! Core types for the EVM tokens connector.
//!
//! This crate provides the foundational types shared by the connector service:
//! pool locators, subscription names, operation DTOs, ABI documents, and the
//! raw/semantic event payloads exchanged over the WebSocket edge.
//!
//! # Modules
//!
//! - [`abi`] - ABI method and event documents forwarded to the RPC gateway
//! - [`events`] - Raw on-chain events and the semantic token events derived from them
//! - [`hexstr`] - Hex encoding of UTF-8 payload data, with the gateway's empty-bytes sentinel
//! - [`locator`] - Canonical pool locator codec and validation
//! - [`subscription`] - Subscription name codec for the upstream event stream
//! - [`tokens`] - Operation DTOs (create, activate, mint, transfer, burn, approval)

pub mod abi;
pub mod events;
pub mod hexstr;
pub mod locator;
pub mod subscription;
pub mod tokens;
