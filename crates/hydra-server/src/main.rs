use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use hydra_server::HttpServer;
use hydra_engine::SsrEngine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let config_path = args.next().unwrap_or_else(|| "hydra.json".to_string());
    let listen_addr = args.next().unwrap_or_else(|| "127.0.0.1:8080".to_string());

    let raw = std::fs::read_to_string(&config_path)
        .with_context(|| format!("failed to read config file {config_path}"))?;
    let config: serde_json::Value = serde_json::from_str(&raw)
        .with_context(|| format!("config file {config_path} is not valid JSON"))?;

    let engine = Arc::new(SsrEngine::init_and_start(&config)?);

    let addr: SocketAddr = listen_addr
        .parse()
        .with_context(|| format!("invalid listen address {listen_addr}"))?;
    HttpServer::new(engine).run(addr).await
}
