//! Serves the reference `/api` controller.
//!
//! ```text
//! GETJSON_ADDR=127.0.0.1:8080 RUST_LOG=getjson=debug cargo run --example api_server
//! curl -X POST -d '[1,2,3,4,5]' http://127.0.0.1:8080/api/odd
//! ```

use std::sync::Arc;

use getjson::controllers::ApiController;
use getjson::router::{Dispatcher, Registry};
use getjson::server::Server;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_ADDR: &str = "127.0.0.1:8080";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let addr = std::env::var("GETJSON_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_owned());

    let registry = match Registry::builder().controller::<ApiController>().build() {
        Ok(registry) => registry,
        Err(e) => {
            error!(error = %e, "route registration failed");
            return Err(e.into());
        }
    };
    for route in registry.routes() {
        info!(route = %route, "mounted");
    }

    let server = Server::bind(&addr).await?;
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    server
        .serve_with_shutdown(Arc::new(Dispatcher::new(registry)), shutdown)
        .await?;
    Ok(())
}
