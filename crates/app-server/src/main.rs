mod config;
mod http;
mod session;
mod state;

use std::env;
use std::sync::Arc;

use config::AppConfig;
use state::AppState;
use tracing::{error, info, warn};

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(
                    "inboxai=info,inbox_assistant=info,inbox_google=info,inbox_storage=info",
                )
            }),
        )
        .compact()
        .init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(%e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

async fn run_server() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env().map_err(|e| -> Box<dyn std::error::Error> { e.into() })?;
    let state = Arc::new(AppState::from_config(&config).await?);

    if state.credentials.is_connected().await {
        info!("stored credentials found");
    } else {
        info!("no mailbox connected yet, visit /api/v1/auth/login");
    }

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    info!(addr = %config.bind, data_dir = %config.data_dir.display(), "listening");
    axum::serve(listener, http::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    init_tracing();

    let args: Vec<String> = env::args().collect();
    let cmd = args.get(1).map(|s| s.as_str()).unwrap_or("serve");

    let result = match cmd {
        "serve" => run_server().await,
        "help" | "--help" | "-h" => {
            eprintln!("InboxAI: chat with your Gmail inbox");
            eprintln!();
            eprintln!("Usage:");
            eprintln!("  inboxai serve   Start the HTTP API (default)");
            eprintln!("  inboxai help    Show this help");
            eprintln!();
            eprintln!("Environment variables (a .env file is loaded when present):");
            eprintln!("  GOOGLE_CLIENT_ID         OAuth client id");
            eprintln!("  GOOGLE_CLIENT_SECRET     OAuth client secret");
            eprintln!("  GOOGLE_REDIRECT_URI      OAuth callback URL (.../api/v1/auth/callback)");
            eprintln!("  GEMINI_API_KEY           Gemini API key (falls back to GOOGLE_API_KEY)");
            eprintln!("  SECRET_KEY               Session signing key");
            eprintln!("  APP_ENV                  development | production (default: development)");
            eprintln!("  INBOXAI_DATA_DIR         Token and index directory (default: storage)");
            eprintln!("  INBOXAI_BIND             Listen address (default: 0.0.0.0:8000)");
            eprintln!("  FRONTEND_REDIRECT_URL    Post-login redirect (default: http://localhost:5173/connected)");
            eprintln!("  SYNC_FETCH_LIMIT         Emails per sync (default: 50)");
            eprintln!("  EMBED_BATCH_SIZE         Documents per embedding batch (default: 20)");
            eprintln!("  EMBED_BATCH_DELAY_SECS   Pause between batches (default: 2)");
            eprintln!("  RUST_LOG                 Log filter (default: inboxai=info,...)");
            Ok(())
        }
        unknown => {
            eprintln!("Unknown command: {unknown}");
            eprintln!("Run `inboxai help` for usage");
            return;
        }
    };

    if let Err(e) = result {
        error!(%e, "fatal error");
        std::process::exit(1);
    }
}
