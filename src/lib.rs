pub mod api;
pub mod config;
pub mod error;
pub mod logic;
pub mod model;
pub mod store;

#[cfg(test)]
mod test_workspace;

// Export API types
pub use api::handlers;
pub use api::routes;
pub use api::{AppState, SharedState};

pub use config::{AppConfig, Workspace};
pub use error::{ResolveError, ResolveResult};

// Export logic types
pub use logic::{
    build_command, DependencyGraph, Expander, GraphBuilder, JsonSchemaValidator, ReasonerCommand,
    Resolver, SchemaValidator,
};

// Export all model types
pub use model::*;

// Export store types
pub use store::{ProcessRunner, UpstreamFetcher};

/// Load configuration, open the workspace and serve until shutdown.
pub async fn run_server() -> anyhow::Result<()> {
    use axum::serve;
    use std::sync::Arc;
    use tokio::net::TcpListener;

    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    // Initialize logging with INFO level by default
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();

    // Load configuration
    let config = crate::config::AppConfig::load()?;
    let bind_address = config.server_address();

    let state = Arc::new(crate::api::AppState::from_config(config)?);
    log::info!("Serving workspace {}", state.workspace.root().display());

    let app = crate::api::routes::create_router(state);
    let listener = TcpListener::bind(&bind_address).await?;
    log::info!("Listening on http://{}", bind_address);

    serve(listener, app).await?;

    Ok(())
}
