//! CLI command definitions, routing, and tracing setup.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use docenrich_batches::BatchClient;
use docenrich_core::{
    BatchObserver, BatchPhase, BatchPipeline, DocumentOutcome, UploadOutcome, spawn_workers,
};
use docenrich_scoring::ScoringClient;
use docenrich_shared::{
    AppConfig, BatchApiSettings, BatchRef, ScoringSettings, WorkerSettings, init_config,
    load_config, resolve_secret,
};
use docenrich_webhook::{JwtConfig, build_router};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

/// Default `version` query parameter for batch API calls.
const DEFAULT_API_VERSION: &str = "2023-03-31";

/// Crates whose logs the verbosity flag controls.
const LOG_TARGETS: &[&str] = &[
    "docenrich",
    "docenrich_core",
    "docenrich_batches",
    "docenrich_scoring",
    "docenrich_shared",
    "docenrich_webhook",
];

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// docenrich: entity enrichment for document collection batches.
#[derive(Parser)]
#[command(
    name = "docenrich",
    version,
    about = "Enrich document batches with entity annotations from a scoring endpoint.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Collection service base URL (overrides batch_api.url).
    #[arg(long, env = "WD_API_URL", global = true)]
    pub api_url: Option<String>,

    /// Full scoring URL (overrides the [scoring] section).
    #[arg(long, env = "SCORING_URL", global = true)]
    pub scoring_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Serve the enrichment webhook until Ctrl-C.
    Serve {
        /// Listen address (overrides server.bind_addr).
        #[arg(long, env = "DOCENRICH_BIND")]
        bind: Option<String>,

        /// Number of batch workers (overrides server.workers).
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Enrich a single batch in the foreground.
    Enrich {
        /// Project ID.
        #[arg(long)]
        project: String,

        /// Collection ID.
        #[arg(long)]
        collection: String,

        /// Batch ID.
        #[arg(long)]
        batch: String,

        /// Batch API version.
        #[arg(long, default_value = DEFAULT_API_VERSION)]
        version: String,

        /// Print the batch report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

fn default_filter(verbose: u8) -> String {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    LOG_TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(cli.verbose)));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let mut config = load_config()?;
    apply_overrides(&mut config, &cli);

    match cli.command {
        Command::Serve { bind, workers } => {
            if let Some(bind) = bind {
                config.server.bind_addr = bind;
            }
            if let Some(workers) = workers {
                config.server.workers = workers;
            }
            cmd_serve(&config).await
        }
        Command::Enrich {
            project,
            collection,
            batch,
            version,
            json,
        } => {
            let batch = BatchRef {
                project_id: project,
                collection_id: collection,
                batch_id: batch,
                version,
            };
            cmd_enrich(&config, &batch, json).await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(&config).await,
        },
    }
}

/// Fold global flag/env overrides into the file config.
fn apply_overrides(config: &mut AppConfig, cli: &Cli) {
    if let Some(url) = &cli.api_url {
        config.batch_api.url = url.clone();
    }
    if let Some(url) = &cli.scoring_url {
        config.scoring.endpoint = Some(url.clone());
    }
}

/// Build the batch pipeline from resolved config and environment secrets.
fn build_pipeline(config: &AppConfig) -> Result<BatchPipeline> {
    let batch_settings = BatchApiSettings::from_config(&config.batch_api)?;
    let scoring_settings = ScoringSettings::from_config(&config.scoring)?;

    let store = BatchClient::new(&batch_settings)?;
    let scorer = ScoringClient::new(&scoring_settings)?;
    info!(
        batch_api = %batch_settings.base_url,
        scoring = scorer.endpoint(),
        "clients ready"
    );

    Ok(BatchPipeline::new(Arc::new(store), Arc::new(scorer)))
}

// ---------------------------------------------------------------------------
// serve
// ---------------------------------------------------------------------------

async fn cmd_serve(config: &AppConfig) -> Result<()> {
    let secret = resolve_secret(&config.server.webhook_secret_env)?;
    let pipeline = Arc::new(build_pipeline(config)?);

    let (queue, pool) = spawn_workers(pipeline, WorkerSettings::from(&config.server));
    let app = build_router(queue, JwtConfig::from_secret(secret.as_bytes()));

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .wrap_err_with(|| format!("failed to bind to {}", config.server.bind_addr))?;
    let local_addr = listener.local_addr()?;
    info!(%local_addr, "webhook server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown())
        .await
        .wrap_err("webhook server failed")?;

    // The router and its queue handle are gone; let workers finish what was accepted.
    info!("draining enrichment queue");
    pool.shutdown().await;

    Ok(())
}

async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(%error, "failed to capture Ctrl+C signal");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(error) => {
                warn!(%error, "failed to capture SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl+C, shutting down"),
        () = sigterm => info!("received SIGTERM, shutting down"),
    }
}

// ---------------------------------------------------------------------------
// enrich
// ---------------------------------------------------------------------------

async fn cmd_enrich(config: &AppConfig, batch: &BatchRef, json: bool) -> Result<()> {
    let observer = Arc::new(CliProgress::new());
    let pipeline = build_pipeline(config)?.with_observer(observer);

    let report = pipeline.run(batch).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!();
        println!("  Batch:      {}", report.batch);
        println!("  Fetched:    {}", if report.fetched { "yes" } else { "no (fallback uploaded)" });
        println!("  Documents:  {}", report.documents);
        println!("  Annotated:  {}", report.annotated);
        println!("  Noticed:    {}", report.noticed);
        println!("  Skipped:    {}", report.skipped_lines);
        if report.unserializable > 0 {
            println!("  Dropped:    {}", report.unserializable);
        }
        if report.stream_error {
            println!("  Stream:     ended early");
        }
        println!("  Time:       {:.1}s", report.elapsed.as_secs_f64());
        println!();
    }

    match report.upload {
        UploadOutcome::Accepted => Ok(()),
        UploadOutcome::Failed(reason) => Err(eyre!("batch upload failed: {reason}")),
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// Spinner showing the current phase and documents processed.
struct CliProgress {
    spinner: ProgressBar,
    documents: AtomicUsize,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self {
            spinner,
            documents: AtomicUsize::new(0),
        }
    }
}

impl BatchObserver for CliProgress {
    fn phase(&self, _batch: &BatchRef, phase: BatchPhase) {
        let message = match phase {
            BatchPhase::Fetching => "Fetching batch",
            BatchPhase::Fallback => "Batch unavailable, preparing fallback",
            BatchPhase::Streaming => "Enriching documents",
            BatchPhase::Compressing => "Compressing",
            BatchPhase::Uploading => "Uploading",
            BatchPhase::Done => {
                self.spinner.finish_and_clear();
                return;
            }
        };
        self.spinner.set_message(message);
    }

    fn document(&self, _batch: &BatchRef, document_id: &str, outcome: DocumentOutcome) {
        let n = self.documents.fetch_add(1, Ordering::Relaxed) + 1;
        let status = match outcome {
            DocumentOutcome::Annotated(count) => format!("{count} entities"),
            DocumentOutcome::Noticed => "failed".to_string(),
        };
        self.spinner
            .set_message(format!("Enriching [{n}] {document_id}: {status}"));
    }
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}
