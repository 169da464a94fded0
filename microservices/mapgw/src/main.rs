//! MAP short-message gateway service
//!
//! Wiring: configuration, application server client pool, gateway over
//! the signalling transport, the two short-message actions and the
//! health endpoints.

use mapgw::actions::{MtForwardSmAction, SendRiForSmAction};
use mapgw::{fields, loopback, GatewayConfig, GatewayError, MapGateway, Result};
use sgw_appconn::executor::DEFAULT_WORKERS;
use sgw_appconn::{ActionRegistry, AppClient, ConnState, TypeRegistry, WorkerPool};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mapgw=debug".parse().unwrap()),
        )
        .json()
        .init();

    info!("Starting MAP gateway");

    let config_path = std::env::args()
        .nth(1)
        .ok_or_else(|| GatewayError::Config("usage: mapgw <config-file>".to_string()))?;
    let config = GatewayConfig::from_file(&config_path)?;
    config.validate()?;

    let types = Arc::new(TypeRegistry::new());
    fields::register_message_types(&types);
    let actions = Arc::new(ActionRegistry::new());
    let workers = WorkerPool::new(DEFAULT_WORKERS);

    let client = Arc::new(
        AppClient::connect(
            config.client_id,
            config.client.clone(),
            types,
            actions.clone(),
            workers,
        )
        .await?,
    );

    let (transport, events, _harness) = if config.stand_alone {
        loopback::loopback()
    } else {
        return Err(GatewayError::Config(
            "external transport attachment is deployment specific; set standAlone for the loopback transport"
                .to_string(),
        ));
    };

    let gateway = MapGateway::start(config.clone(), client, transport, events);

    let mut seconds = 0;
    while gateway.state() != ConnState::Online && seconds < 10 {
        tokio::time::sleep(Duration::from_secs(1)).await;
        seconds += 1;
    }
    if gateway.state() != ConnState::Online {
        return Err(GatewayError::Config("gateway offline".to_string()));
    }

    // the short-message actions only come live once the gateway is up
    actions.put(Arc::new(SendRiForSmAction::new(gateway.clone())));
    actions.put(Arc::new(MtForwardSmAction::new(gateway.clone())));

    let http_bind =
        std::env::var("HTTP_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    info!(http_addr = %http_bind, "gateway running");

    let app = axum::Router::new()
        .route("/health", axum::routing::get(|| async { "OK" }))
        .route("/ready", axum::routing::get(|| async { "OK" }));
    let listener = tokio::net::TcpListener::bind(&http_bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
