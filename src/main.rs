use tracing_subscriber::{EnvFilter, fmt};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))?;
    fmt().with_env_filter(filter).init();

    let cfg = civiq::config::Config::from_env()?;

    // Startup banner at info level so something always prints at default verbosity
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(
        target: "civiq",
        "civiq starting: RUST_LOG='{}', http_port={}, permissions_file={:?}, users_file={:?}, gate_redirect='{}'",
        rust_log, cfg.http_port, cfg.permissions_file, cfg.users_file, cfg.gate_redirect
    );

    civiq::server::run(cfg).await
}
