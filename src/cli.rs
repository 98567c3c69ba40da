use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "rankeval",
    version,
    about = "Retrieval-quality evaluation over stored search runs and relevance labels"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    RegisterIndex(RegisterIndexArgs),
    ImportLabels(ImportLabelsArgs),
    ImportRun(ImportRunArgs),
    Reconcile(ReconcileArgs),
    Metrics(MetricsArgs),
    RankCurve(RankCurveArgs),
    Feedback(FeedbackArgs),
    Status(StatusArgs),
    Purge(PurgeArgs),
}

#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    #[arg(long, default_value = ".cache/rankeval")]
    pub cache_root: PathBuf,

    /// Defaults to `<cache-root>/rankeval.sqlite`.
    #[arg(long)]
    pub db_path: Option<PathBuf>,
}

impl StoreArgs {
    pub fn resolved_db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| self.cache_root.join("rankeval.sqlite"))
    }

    pub fn manifest_dir(&self) -> PathBuf {
        self.cache_root.join("manifests")
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    #[arg(long)]
    pub index_id: Option<String>,

    #[arg(long = "key")]
    pub keys: Vec<String>,

    #[arg(long)]
    pub label_set: Option<String>,

    /// JSON filter document; conflicts with the individual filter flags.
    #[arg(long, conflicts_with_all = ["index_id", "keys", "label_set"])]
    pub filter: Option<String>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Args, Debug, Clone)]
pub struct ReportArgs {
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Also write the report as a pretty JSON manifest.
    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct RegisterIndexArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// JSON listing of search index definitions.
    #[arg(long)]
    pub index_listing: PathBuf,

    #[arg(long)]
    pub database: String,

    #[arg(long)]
    pub collection: String,

    #[arg(long)]
    pub index_name: String,
}

#[derive(Args, Debug, Clone)]
pub struct ImportLabelsArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long)]
    pub index_id: String,

    #[arg(long)]
    pub label_set: String,

    /// JSON object `{query_key: {doc_id: relevance}}`.
    #[arg(long)]
    pub judgments: PathBuf,

    #[arg(long, default_value_t = false)]
    pub comprehensive: bool,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ImportRunArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long)]
    pub index_id: String,

    /// JSON array of query records with ranked predictions.
    #[arg(long)]
    pub run: PathBuf,

    #[arg(long, default_value_t = false)]
    pub skip_labels: bool,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ReconcileArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long)]
    pub index_id: String,
}

#[derive(Args, Debug, Clone)]
pub struct MetricsArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[command(flatten)]
    pub filter: FilterArgs,

    #[command(flatten)]
    pub report: ReportArgs,

    /// Metric token such as `mrr@10`, `ndcg@5` or `confusion_matrix`.
    /// Results are keyed by the canonical lowercase name, so `HITS@3` reports as `hit_rate@3`.
    #[arg(long = "metric", required = true)]
    pub metrics: Vec<String>,

    /// `reference:candidate` label set pair; switches to paired mode.
    #[arg(long = "pair")]
    pub pairs: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct RankCurveArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[command(flatten)]
    pub filter: FilterArgs,

    #[command(flatten)]
    pub report: ReportArgs,

    #[arg(long)]
    pub rank_cutoff: usize,

    #[arg(long)]
    pub max_rank: Option<usize>,
}

#[derive(Args, Debug, Clone)]
pub struct FeedbackArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[command(flatten)]
    pub filter: FilterArgs,

    #[command(flatten)]
    pub report: ReportArgs,

    #[arg(long, default_value_t = 10)]
    pub count: usize,

    #[arg(long, default_value_t = false)]
    pub allow_duplicates: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Args, Debug, Clone)]
pub struct PurgeArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long)]
    pub index_id: String,
}
