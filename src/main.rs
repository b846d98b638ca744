use anyhow::Context;
use clap::Parser;
use solescope_api::RestApi;
use solescope_core::{CatalogStore, ImageClassifier, ImageEncoder, PriceRegressor};
use solescope_pipeline::{PipelineConfig, PipelineServices, PredictionPipeline, RemoteModels};
use solescope_storage::{
    CacheOptions, IndexCache, InventoryStore, JsonCatalog, ReferenceLibrary, SnapshotStore,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Sneaker recognition, pricing and inventory service
#[derive(Parser, Debug)]
#[command(name = "solescope")]
#[command(about = "Sneaker recognition, pricing and inventory service", long_about = None)]
struct Args {
    /// Directory for index snapshots and the inventory database
    #[arg(short, long, default_value = "./data")]
    data_dir: PathBuf,

    /// Reference image tree laid out as <category>/<slug>/<image>
    #[arg(long, default_value = "./reference")]
    reference_root: PathBuf,

    /// Product catalog (JSON array of rows)
    #[arg(long, default_value = "./catalog.json")]
    catalog: PathBuf,

    /// Base URL of the model inference sidecar
    #[arg(long, default_value = "http://127.0.0.1:8500/")]
    model_url: String,

    /// Per-request timeout for model calls, in seconds
    #[arg(long, default_value_t = 30)]
    model_timeout_secs: u64,

    /// HTTP API port
    #[arg(long, default_value_t = 8080)]
    http_port: u16,

    /// Number of similar items returned per prediction
    #[arg(long, default_value_t = 5)]
    top_k: usize,

    /// Build missing category indices with augmented reference embeddings
    #[arg(long)]
    augment_index: bool,

    /// Embed only the original query image instead of averaging variants
    #[arg(long)]
    no_query_augmentation: bool,

    /// Minimum sneaker probability for the gate
    #[arg(long, default_value_t = 0.741)]
    gate_threshold: f32,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting SoleScope v{}", env!("CARGO_PKG_VERSION"));
    info!("Data directory: {:?}", args.data_dir);
    info!("Reference root: {:?}", args.reference_root);
    info!("Model sidecar: {}", args.model_url);

    let config = PipelineConfig {
        gate_threshold: args.gate_threshold,
        top_k: args.top_k,
        query_augmentation: !args.no_query_augmentation,
        index_augmentation: args.augment_index,
        ..PipelineConfig::default()
    };

    std::fs::create_dir_all(&args.data_dir)
        .with_context(|| format!("creating data directory {:?}", args.data_dir))?;

    let catalog = Arc::new(JsonCatalog::load(&args.catalog).context("loading catalog")?);
    let library = ReferenceLibrary::open(&args.reference_root).context("opening reference root")?;
    let snapshots = SnapshotStore::new(args.data_dir.join("snapshots"))
        .context("opening snapshot directory")?;
    let inventory = Arc::new(
        InventoryStore::open(args.data_dir.join("lmdb")).context("opening inventory database")?,
    );
    info!("Storage initialized");

    let models = Arc::new(
        RemoteModels::new(&args.model_url, Duration::from_secs(args.model_timeout_secs))
            .context("configuring model client")?,
    );
    let encoder: Arc<dyn ImageEncoder> = models.clone();
    let classifier: Arc<dyn ImageClassifier> = models.clone();
    let regressor: Arc<dyn PriceRegressor> = models;
    let catalog: Arc<dyn CatalogStore> = catalog;

    let cache = Arc::new(IndexCache::new(
        snapshots,
        library,
        Arc::clone(&encoder),
        CacheOptions::default(),
    ));

    let pipeline = Arc::new(
        PredictionPipeline::new(
            PipelineServices {
                encoder,
                classifier,
                regressor,
                catalog,
                cache,
                inventory,
            },
            config,
        )
        .context("configuring prediction pipeline")?,
    );
    info!("Pipeline initialized");
    info!("HTTP API: http://localhost:{}/", args.http_port);

    let sys = actix_web::rt::System::new();
    sys.block_on(RestApi::start(pipeline, args.http_port))?;

    info!("Shutting down...");
    Ok(())
}
