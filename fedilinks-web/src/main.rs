mod render;
mod routes;

use std::process::ExitCode;
use std::sync::Arc;

use reqwest::{redirect, ClientBuilder};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use fedilinks_core::{Config, MastodonClient, SecretCodec, SessionEngine, SlotStore};

use crate::routes::AppState;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(config.debug);

    let codec = match SecretCodec::from_base64(&config.secret_key) {
        Ok(codec) => codec,
        Err(_) => {
            error!("FEDILINKS_SECRET_KEY must be 32 bytes of URL-safe base64");
            return ExitCode::FAILURE;
        }
    };

    let store = SlotStore::load_from_dir(&config.state_dir).await;
    let client = ClientBuilder::new()
        .redirect(redirect::Policy::limited(5))
        .user_agent(concat!("fedilinks/", env!("CARGO_PKG_VERSION")))
        .build()
        .expect("failed to build HTTP client");
    let engine = Arc::new(SessionEngine::new(
        store,
        MastodonClient::new(client),
        codec,
        config.app_name.clone(),
        config.redirect_uri(),
    ));

    let state = AppState {
        engine,
        base_path: config.base_path(),
    };
    let app = routes::router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    info!(%addr, base_path = %config.base_path(), "serving dashboard");
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, %addr, "failed to bind");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        error!(error = %e, "server error");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
