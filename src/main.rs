use std::sync::Arc;

use mcp_http_bridge::{
    config::Config, logging, mcp::server::ReferenceEngine, BridgeError, HttpTransport, Transport,
};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    let config = Config::from_env()?;
    let transport = HttpTransport::from_config(&config)?;

    transport.set_message_handler(Arc::new(ReferenceEngine::new(transport.bridge().clone())));
    transport.set_error_handler(Arc::new(|err: &BridgeError| {
        warn!(code = err.code(), error = %err, "transport error");
    }));
    transport.set_close_handler(Arc::new(|| info!("transport closed")));

    transport.start().await?;
    info!(
        bind_addr = %config.bind_addr,
        bind_port = config.bind_port,
        path = %config.path,
        reply_timeout_ms = config.reply_timeout.as_millis(),
        "server starting"
    );

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    transport.close().await?;
    Ok(())
}
