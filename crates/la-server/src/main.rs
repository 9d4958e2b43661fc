use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use la_core::core::Variant;
use la_server::bootstrap::{self, RuntimeConfig};
use la_server::config::AppConfig;
use la_server::handler::{self, AppState};
use la_store::{export_preference_pairs, export_to_json, PreferenceExportFilter};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "la", about = "listener arena: dual-reply counseling chat server")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to the configuration file.
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default).
    Serve,
    /// Validate configuration file and exit.
    Validate,
    /// Export preference pairs from every resolved assistant turn as JSON.
    Export {
        /// Only sessions of this username.
        #[arg(long)]
        user: Option<String>,
        /// Only turns where this variant was chosen.
        #[arg(long, value_enum)]
        variant: Option<VariantArg>,
        /// Write to this file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum VariantArg {
    Sft,
    Dpo,
}

impl From<VariantArg> for Variant {
    fn from(arg: VariantArg) -> Self {
        match arg {
            VariantArg::Sft => Variant::Sft,
            VariantArg::Dpo => Variant::Dpo,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => load_runtime(&cli.config).and_then(run_server),
        Command::Validate => load_runtime(&cli.config).map(|_| {
            println!("Config valid: {}", cli.config.display());
        }),
        Command::Export {
            user,
            variant,
            output,
        } => load_runtime(&cli.config).and_then(|runtime| {
            let filter = PreferenceExportFilter {
                username: user,
                chosen_variant: variant.map(Variant::from),
            };
            run_export(&runtime, &filter, output.as_deref())
        }),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn load_runtime(path: &Path) -> Result<RuntimeConfig, anyhow::Error> {
    let config = AppConfig::from_file(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    bootstrap::into_runtime(config).context("config invalid")
}

fn init_tracing(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if format == "pretty" {
        builder.pretty().init();
    } else {
        builder.json().init();
    }
}

fn run_server(runtime: RuntimeConfig) -> Result<(), anyhow::Error> {
    init_tracing(&runtime.log_level, &runtime.log_format);

    let rt = tokio::runtime::Runtime::new().context("starting tokio runtime")?;
    rt.block_on(async move {
        let listen_addr = runtime.listen_addr.clone();
        let state = Arc::new(AppState::from_runtime(runtime, reqwest::Client::new())?);
        let app = handler::router(state);

        let listener = tokio::net::TcpListener::bind(&listen_addr)
            .await
            .with_context(|| format!("binding {listen_addr}"))?;
        tracing::info!(addr = %listen_addr, "listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                tokio::signal::ctrl_c().await.ok();
                tracing::info!("shutdown signal received");
            })
            .await?;
        Ok::<(), anyhow::Error>(())
    })
}

fn run_export(
    runtime: &RuntimeConfig,
    filter: &PreferenceExportFilter,
    output: Option<&Path>,
) -> Result<(), anyhow::Error> {
    let store = runtime.open_store()?;
    let pairs = export_preference_pairs(&store, filter)?;
    let json = export_to_json(&pairs)?;

    match output {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
            eprintln!("Exported {} pairs to {}", pairs.len(), path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}
