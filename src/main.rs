//! Application entry point and server initialization
//!
//! Loads the environment configuration, opens the database and the code
//! pool, bootstraps the default admin account, and starts the HTTP
//! server with graceful shutdown support.

use dotenvy::dotenv;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;

mod allocator;
mod auth;
mod codes;
mod config;
mod database;
mod error;
mod handler;
mod middleware;
mod model;
mod resolver;
mod route;
mod session;
mod store;

use config::Config;
use database::AppState;
use route::create_app;

#[tokio::main]
async fn main() {
    // Load environment variables from .env file if it exists
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "shortlinks=debug,tower_http=debug".to_string()),
        )
        .init();

    let config = Config::from_env();

    // Refusing to start with an unreadable pool or store is deliberate:
    // serving without them could hand out duplicate codes.
    let state = AppState::new(config.clone()).expect("failed to initialize storage");
    auth::bootstrap_admin(&state.users).expect("failed to bootstrap accounts");

    let app = create_app(state.clone()).layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .expect("failed to bind listener");

    println!("🚀 Server running at http://localhost:{}", config.port);
    println!(
        "📂 Using database: {} | code pool: {} ({} codes remaining)",
        config.database_path,
        config.codes_path,
        state.pool.remaining()
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

/// Resolves when SIGINT (Ctrl+C) or SIGTERM is received, triggering
/// graceful shutdown: open connections drain and pending database
/// transactions close cleanly.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    println!("\n🛑 Shutdown signal received, stopping server.");
}
