//! Service startup and wiring.
//!
//! Collaborators are constructed leaves-first to break the service ↔ proxy ↔
//! listener cycle: the gateway client and ABI mapper come first, the listener
//! borrows both, the proxy owns the listener, and the tokens service is wired
//! last. After stream provisioning the ingress socket is opened and the Axum
//! server starts with graceful shutdown on SIGTERM/SIGINT.

use axum::http::Method;
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::abi::AbiMapper;
use crate::blockchain::BlockchainConnector;
use crate::config::Config;
use crate::eventstream::EventStreamService;
use crate::handlers::{self, AppState};
use crate::listener::TokenListener;
use crate::proxy::EventStreamProxy;
use crate::service::TokensService;
use crate::util::SigDown;

/// Initializes and runs the connector.
///
/// - Loads `.env` variables and the environment-driven [`Config`].
/// - Provisions the upstream event stream and audits existing subscriptions.
/// - Opens the ingress socket and starts the fan-out proxy.
/// - Serves the REST + WebSocket API until a shutdown signal arrives.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()?;

    let blockchain = Arc::new(BlockchainConnector::new(&config, client.clone()));
    let mapper = Arc::new(AbiMapper::new(blockchain.clone()));
    let streams = Arc::new(EventStreamService::new(&config, client));
    let listener = TokenListener::new(
        mapper.clone(),
        blockchain.clone(),
        streams.clone(),
        config.topic.clone(),
    );
    let proxy = Arc::new(EventStreamProxy::new(listener, config.topic.clone()));
    let service = Arc::new(TokensService::new(
        mapper,
        blockchain.clone(),
        streams.clone(),
        &config,
    ));

    service.init().await?;
    let connection = streams.connect(config.topic.clone());
    tokio::spawn(proxy.clone().run(connection));

    let state = Arc::new(AppState {
        service,
        proxy,
        blockchain,
        passthrough_headers: config.passthrough_headers.clone(),
        topic: config.topic.clone(),
    });
    let http_endpoints = handlers::routes()
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(cors::Any),
        );

    let addr = SocketAddr::new(config.host, config.port);
    tracing::info!("Starting server at http://{}", addr);
    let listener_socket = tokio::net::TcpListener::bind(addr).await?;

    let sig_down = SigDown::try_new()?;
    let cancellation_token = sig_down.cancellation_token();
    let graceful_shutdown = async move { cancellation_token.cancelled().await };
    axum::serve(listener_socket, http_endpoints)
        .with_graceful_shutdown(graceful_shutdown)
        .await?;

    Ok(())
}
