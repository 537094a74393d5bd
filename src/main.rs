use axum::serve;
use hes_rust::api::routes::create_router;
use hes_rust::api::AppState;
use hes_rust::config::AppConfig;
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    use env_logger::Builder;
    use log::LevelFilter;

    Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    println!("HES: hypermedia operation server");

    // Load configuration
    let config = AppConfig::load()?;
    println!(
        "Configuration loaded: server={}:{} workspace={}",
        config.server.host,
        config.server.port,
        config.workspace.root.display()
    );
    println!(
        "Reasoner: {} (timeout {}s)",
        config.reasoner.program, config.reasoner.timeout_secs
    );

    let bind_address = config.server_address();
    let state = Arc::new(AppState::from_config(config)?);

    run_server(create_router(state), &bind_address).await?;

    Ok(())
}

async fn run_server(app: axum::Router, bind_address: &str) -> anyhow::Result<()> {
    let listener = TcpListener::bind(bind_address).await?;
    println!("HES server running on http://{}", bind_address);
    println!(
        "Operation graph available at http://{}/operations",
        bind_address
    );

    serve(listener, app).await?;

    Ok(())
}
