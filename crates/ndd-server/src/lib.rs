//! Webhook server for the NDD REDCap projects.
//!
//! REDCap data-entry triggers and project bookmarks call into this server;
//! the handlers assign family and subject identifiers, copy contact
//! details between projects and redirect back to the right record.

pub mod error;
pub mod routes;
pub mod workflows;

use ndd_model::ServerConfig;
use tracing::{info, warn};

pub use error::{ApiError, ServerError, WorkflowError};
pub use routes::{AppState, cors_layer, router};
pub use workflows::{Services, Trigger};

/// Bind `config.bind` and serve until Ctrl-C.
pub async fn serve(state: AppState, config: &ServerConfig) -> Result<(), ServerError> {
    let app = router(state, &config.origins);
    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .map_err(|source| ServerError::Bind {
            addr: config.bind.clone(),
            source,
        })?;
    info!(addr = %config.bind, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(ServerError::Serve)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
