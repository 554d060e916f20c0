use std::sync::Arc;
use std::time::Duration;

use rialto_server::{handle_connection, DeliveryRouter, MemoryChatDirectory, MemoryMessageStore};
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_ADDR: &str = "0.0.0.0:9001";
const DEFAULT_STORE_TIMEOUT_MS: u64 = 5_000;

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let addr = std::env::var("RIALTO_SERVER_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string());
    let store_timeout = std::env::var("RIALTO_STORE_TIMEOUT_MS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_STORE_TIMEOUT_MS);

    let store = Arc::new(MemoryMessageStore::new());
    let directory = Arc::new(MemoryChatDirectory::new());
    let router = Arc::new(
        DeliveryRouter::new(store, directory)
            .with_store_timeout(Duration::from_millis(store_timeout)),
    );

    let listener = match TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    info!("Rialto delivery server listening on {}", addr);

    loop {
        match listener.accept().await {
            Ok((stream, peer_addr)) => {
                info!("New connection from {}", peer_addr);

                let router = router.clone();
                tokio::spawn(async move {
                    match accept_async(stream).await {
                        Ok(ws_stream) => {
                            handle_connection(ws_stream, router).await;
                        }
                        Err(e) => {
                            error!("WebSocket handshake failed for {}: {}", peer_addr, e);
                        }
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
