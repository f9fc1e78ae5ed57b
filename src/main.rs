use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use modreg::api::{self, AppState};
use modreg::config::Config;
use modreg::service::ModuleService;

/// modreg - private module registry
///
/// Serves the module registry protocol (`/.well-known/terraform.json`,
/// `/v1/modules/`) from memory, a local directory, or an S3 bucket.
///
/// S3 credentials are read from the standard AWS_* environment variables.
///
/// Examples:
///   modreg --backend filesystem --base-path /srv/modules
///   modreg --backend s3 --s3-bucket modules --s3-region eu-west-1
#[derive(Parser, Debug)]
#[command(author, version = modreg::VERSION, about)]
struct Cli {
    #[command(flatten)]
    config: Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let config = cli.config;

    let storage = config.open_storage()?;
    let service = ModuleService::new(storage.clone()).with_publish_mode(config.publish_mode());
    let app = api::router(AppState::new(service, config.request_timeout()));

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(
        "modreg {} listening on {} ({} backend)",
        modreg::VERSION,
        addr,
        storage.kind()
    );

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error");

    if let Err(e) = storage.close().await {
        warn!("Failed to close storage: {:#}", e);
    }
    served
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use modreg::config::BackendKind;
    use modreg::service::PublishMode;
    use std::path::PathBuf;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["modreg"]).unwrap();
        assert_eq!(cli.config.backend, BackendKind::Memory);
        assert_eq!(cli.config.port, 8080);
    }

    #[test]
    fn test_cli_filesystem_parsing() {
        let cli = Cli::try_parse_from([
            "modreg",
            "--backend",
            "filesystem",
            "--base-path",
            "/tmp/modules",
        ])
        .unwrap();
        assert_eq!(cli.config.backend, BackendKind::Filesystem);
        assert_eq!(cli.config.base_path, Some(PathBuf::from("/tmp/modules")));
    }

    #[test]
    fn test_cli_s3_parsing() {
        let cli = Cli::try_parse_from([
            "modreg",
            "--backend",
            "s3",
            "--s3-bucket",
            "modules",
            "--s3-endpoint",
            "http://localhost:9000",
            "--immutable-versions",
        ])
        .unwrap();
        assert_eq!(cli.config.backend, BackendKind::S3);
        assert_eq!(cli.config.s3_bucket.as_deref(), Some("modules"));
        assert_eq!(
            cli.config.s3_endpoint.as_deref(),
            Some("http://localhost:9000")
        );
        assert_eq!(cli.config.publish_mode(), PublishMode::RejectExisting);
    }

    #[test]
    fn test_cli_rejects_positional_args() {
        assert!(Cli::try_parse_from(["modreg", "serve"]).is_err());
    }
}
