//! Handler for the `serve` command.

use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::adapter::inbound::cli::command::ServeArgs;
use crate::adapter::inbound::cli::{config, output};
use crate::error::Result;
use crate::infrastructure::bootstrap::Gateway;

/// Run the gateway until Ctrl-C, then close every connection.
pub async fn execute(args: &ServeArgs) -> Result<()> {
    let mut config = config::load(&args.config)?;
    if let Some(bind) = &args.bind {
        config.server.bind_address = bind.clone();
        config.validate()?;
    }
    config.init_logging();

    let gateway = Gateway::bind(&config).await?;
    let addr = gateway.local_addr()?;

    if output::is_json() {
        output::document(&json!({
            "command": "serve",
            "listening": format!("ws://{addr}"),
            "max_connections": config.pool.max_connections,
            "guest_mode": config.auth.guest_mode,
            "status_file": config.server.status_file,
        }));
    } else {
        output::header(env!("CARGO_PKG_VERSION"));
        output::field("Listening", format!("ws://{addr}"));
        output::field("Max connections", config.pool.max_connections);
        output::field("Guest mode", config.auth.guest_mode);
        if let Some(path) = &config.server.status_file {
            output::field("Status file", path);
        }
        output::hint("press Ctrl-C to stop");
    }

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received");
                signal.cancel();
            }
            Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C"),
        }
    });

    gateway.run(shutdown).await?;
    output::success("Gateway stopped");
    Ok(())
}
