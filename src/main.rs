//! Tokens connector HTTP entrypoint.
//!
//! This binary launches an Axum-based server that mediates between a token
//! orchestration platform and an Ethereum RPC gateway.
//!
//! Endpoints:
//! - `POST /createpool` – Index an existing token contract or deploy via factory
//! - `POST /activatepool` – Provision event subscriptions for a pool
//! - `POST /mint` / `/transfer` / `/burn` / `/approval` – Submit token transactions
//! - `GET /balance` – Query an account's balance in a pool
//! - `GET /receipt/{id}` – Poll the outcome of a submitted transaction
//! - `GET /health/liveness` / `/readiness` – Health checks
//! - `WS /api/ws` – Acknowledged delivery of semantic token events
//!
//! Environment:
//! - `.env` values loaded at startup
//! - `HOST`, `PORT` control the binding address
//! - `ETHCONNECT_URL` and friends configure the gateway connection

use std::process;

use tokens_connector::run::run;

#[tokio::main]
async fn main() {
    let result = run().await;
    if let Err(e) = result {
        println!("{e}");
        process::exit(1)
    }
}
