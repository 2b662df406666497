//! Bot entry point: install logging and run until the session ends.

use tracing::error;

#[tokio::main]
async fn main() {
    // Initialise tracing (respects RUST_LOG env, defaults to info).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = slash_bot::run().await {
        error!(error = %e, "bot failed to start");
        std::process::exit(1);
    }
}
