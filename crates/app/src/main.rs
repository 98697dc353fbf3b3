use chrono::Utc;
use clap::{Parser, Subcommand};
use doc_batch_core::{
    AnalysisHttpClient, BlobStore, CheckpointLog, FileCheckpoint, JsonlSink, NullSink,
    ObjectLister, PipelineRunner, ResultSink, RunOptions, SharedKeyIssuer,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "doc-batch", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Object storage endpoint, e.g. https://acct.blob.example.net
    #[arg(long, env = "DOC_BATCH_STORAGE_ENDPOINT")]
    storage_endpoint: String,

    /// Storage account name; must match the endpoint host
    #[arg(long, env = "DOC_BATCH_STORAGE_ACCOUNT")]
    storage_account: String,

    /// Base64 account key used for request and token signing
    #[arg(long, env = "DOC_BATCH_STORAGE_KEY", hide_env_values = true)]
    storage_key: String,

    /// Container to process
    #[arg(long, env = "DOC_BATCH_CONTAINER")]
    container: String,

    /// Document analysis service endpoint
    #[arg(long, env = "DOC_BATCH_ANALYSIS_ENDPOINT")]
    analysis_endpoint: String,

    /// Document analysis service API key
    #[arg(long, env = "DOC_BATCH_ANALYSIS_KEY", hide_env_values = true)]
    analysis_key: String,

    /// Analysis model to run each document through
    #[arg(long, env = "DOC_BATCH_MODEL", default_value = "prebuilt-layout")]
    model: String,

    /// Checkpoint file recording completed object names
    #[arg(long, env = "DOC_BATCH_CHECKPOINT", default_value = "processed_objects.txt")]
    checkpoint: PathBuf,

    /// Read-token validity window in seconds
    #[arg(long, default_value_t = 3600)]
    token_validity_secs: u64,

    /// Per-object analysis deadline in seconds
    #[arg(long, default_value_t = 300)]
    analysis_timeout_secs: u64,

    /// Seconds between polls of a pending analysis operation
    #[arg(long, default_value_t = 2)]
    poll_interval_secs: u64,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze every object not yet recorded in the checkpoint.
    Run {
        /// Write one JSON result per analyzed object to this file.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Show done/pending counts without processing anything.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    let issuer = SharedKeyIssuer::new(
        &cli.storage_endpoint,
        &cli.storage_account,
        &cli.storage_key,
        Duration::from_secs(cli.token_validity_secs),
    )?;
    let lister = BlobStore::new(&cli.storage_endpoint, &cli.storage_account, &cli.storage_key)?;
    let checkpoint = FileCheckpoint::new(&cli.checkpoint);

    info!(
        version = app_version,
        container = %cli.container,
        started_at = %Utc::now().to_rfc3339(),
        "doc-batch boot"
    );

    match cli.command {
        Command::Run { output } => {
            let analyzer = AnalysisHttpClient::new(
                &cli.analysis_endpoint,
                &cli.analysis_key,
                &cli.model,
                Duration::from_secs(cli.poll_interval_secs),
            );
            let options = RunOptions {
                analysis_timeout: Duration::from_secs(cli.analysis_timeout_secs),
            };
            let mut sink: Box<dyn ResultSink> = match &output {
                Some(path) => Box::new(JsonlSink::create(path)?),
                None => Box::new(NullSink),
            };

            let mut runner =
                PipelineRunner::new(lister, analyzer, checkpoint, issuer, &cli.container, options);

            let summary = tokio::select! {
                result = runner.run(sink.as_mut()) => result?,
                _ = tokio::signal::ctrl_c() => {
                    // Checkpoint entries only follow confirmed success, so
                    // an interrupt loses at most the in-flight object.
                    warn!("interrupted; completed objects remain checkpointed");
                    std::process::exit(130);
                }
            };

            println!(
                "{} succeeded, {} failed, {} skipped (already done)",
                summary.succeeded, summary.failed, summary.skipped
            );
            for outcome in summary
                .outcomes
                .iter()
                .filter(|outcome| outcome.error_kind.is_some())
            {
                println!(
                    "failed: {} [{}] {}",
                    outcome.name,
                    outcome.error_kind.as_deref().unwrap_or_default(),
                    outcome.detail.as_deref().unwrap_or_default()
                );
            }
            if summary.failed > 0 {
                println!("failed objects stay pending and will be retried by the next run");
            }
        }
        Command::Status => {
            let done = checkpoint.load()?;
            let objects = lister.list_objects(&cli.container).await?;
            let pending = objects
                .iter()
                .filter(|object| !done.contains(&object.name))
                .count();

            println!("container: {}", cli.container);
            println!("listed: {}", objects.len());
            println!("done: {}", done.len());
            println!("pending: {pending}");
        }
    }

    Ok(())
}
