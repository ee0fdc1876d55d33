//! vsxfetch - command-line plugin fetcher for Theia applications.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use vsxfetch::config::{DEFAULT_API_URL, DEFAULT_API_VERSION, DEFAULT_RATE_LIMIT};
use vsxfetch::{FetchConfig, FetchEngine};

#[derive(Debug, Parser)]
#[command(
    name = "vsxfetch",
    version,
    about = "Download the plugins a package.json manifest declares under theiaPlugins"
)]
struct Cli {
    /// Path to the manifest declaring theiaPlugins.
    #[arg(default_value = "package.json")]
    manifest: PathBuf,

    /// Keep .vsix/.theia artifacts as files instead of extracting them.
    #[arg(long)]
    packed: bool,

    /// Report download failures without failing the run.
    #[arg(long)]
    ignore_errors: bool,

    /// Registry API url.
    #[arg(long, default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Supported vscode API version, used for compatibility selection.
    #[arg(long, default_value = DEFAULT_API_VERSION)]
    api_version: String,

    /// Registry operations allowed per second.
    #[arg(long, default_value_t = DEFAULT_RATE_LIMIT)]
    rate_limit: u32,

    /// Download plugins one at a time instead of concurrently.
    #[arg(long)]
    sequential: bool,

    /// Target platform tag (e.g. linux-x64); detected when omitted.
    #[arg(long)]
    target_platform: Option<String>,
}

impl Cli {
    fn into_config(self) -> FetchConfig {
        let mut config = FetchConfig::new(self.manifest)
            .with_packed(self.packed)
            .with_ignore_errors(self.ignore_errors)
            .with_api_url(self.api_url)
            .with_api_version(self.api_version)
            .with_rate_limit(self.rate_limit)
            .with_parallel(!self.sequential);
        if let Some(tag) = self.target_platform {
            config = config.with_target_platform(tag);
        }
        config
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let ignore_errors = cli.ignore_errors;

    let engine = match FetchEngine::new(cli.into_config()) {
        Ok(engine) => engine,
        Err(e) => {
            tracing::error!(error = %e, "failed to initialize");
            return ExitCode::FAILURE;
        }
    };

    // First Ctrl-C stops new work; in-flight downloads finish and the
    // lockfile is still flushed.
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, stopping new downloads");
            signal_cancel.cancel();
        }
    });

    match engine.run(cancel).await {
        Ok(report) => {
            if report.succeeded() {
                ExitCode::SUCCESS
            } else {
                let failed = report.failures().len();
                if !ignore_errors {
                    tracing::error!(
                        failed,
                        "plugins could not be downloaded; pass --ignore-errors to tolerate this"
                    );
                }
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "plugin fetch aborted");
            ExitCode::FAILURE
        }
    }
}
