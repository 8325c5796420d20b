use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::segment::{MAX_CHARS_PER_CHUNK, PAGES_PER_CHUNK};

#[derive(Parser, Debug)]
#[command(
    name = "caselens",
    version,
    about = "Chunked analysis of large scanned legal case files"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load case documents (page-indexed text files) into the local store
    Ingest(IngestArgs),
    /// Phase 1: report chunk count and page coverage, no model calls
    Split(SplitArgs),
    /// Phase 2: per-chunk fact extraction via the generation service
    Extract(ExtractArgs),
    /// Phase 3: merge partial results into one analysis
    Synthesize(SynthesizeArgs),
    /// Classify pages and group them into evidence sections
    Classify(ClassifyArgs),
    /// Spot-check page citations of a finished analysis
    Verify(VerifyArgs),
    /// Show store counts and which phase outputs exist
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ModelArgs {
    #[arg(long, default_value = "https://openrouter.ai/api/v1")]
    pub api_base: String,

    #[arg(long, default_value = "openai/gpt-4o-mini")]
    pub model: String,

    /// Environment variable holding the API key
    #[arg(long, default_value = "CASELENS_API_KEY")]
    pub api_key_env: String,

    #[arg(long, default_value_t = 8192)]
    pub max_output_tokens: u32,

    #[arg(long, default_value_t = 300)]
    pub timeout_secs: u64,
}

#[derive(Args, Debug, Clone)]
pub struct IngestArgs {
    #[arg(long, default_value = ".cache/caselens")]
    pub cache_root: PathBuf,

    /// Directory of *.txt case documents, pages separated by form feeds
    #[arg(long)]
    pub source_dir: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[arg(long)]
    pub ingest_manifest_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct SplitArgs {
    #[arg(long, default_value = ".cache/caselens")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    /// Analyze a single unlabeled text file instead of the store
    #[arg(long)]
    pub raw_file: Option<PathBuf>,

    #[arg(long, default_value_t = PAGES_PER_CHUNK)]
    pub pages_per_chunk: usize,

    #[arg(long, default_value_t = MAX_CHARS_PER_CHUNK)]
    pub max_chars_per_chunk: usize,

    #[arg(long)]
    pub split_manifest_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ExtractArgs {
    #[arg(long, default_value = ".cache/caselens")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[arg(long)]
    pub raw_file: Option<PathBuf>,

    #[arg(long, default_value_t = PAGES_PER_CHUNK)]
    pub pages_per_chunk: usize,

    #[arg(long, default_value_t = MAX_CHARS_PER_CHUNK)]
    pub max_chars_per_chunk: usize,

    #[arg(long)]
    pub partials_manifest_path: Option<PathBuf>,

    #[command(flatten)]
    pub model: ModelArgs,
}

#[derive(Args, Debug, Clone)]
pub struct SynthesizeArgs {
    #[arg(long, default_value = ".cache/caselens")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub partials_manifest_path: Option<PathBuf>,

    #[arg(long)]
    pub analysis_manifest_path: Option<PathBuf>,

    #[command(flatten)]
    pub model: ModelArgs,
}

#[derive(Args, Debug, Clone)]
pub struct ClassifyArgs {
    #[arg(long, default_value = ".cache/caselens")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    /// Classify a single document; default is every stored document
    #[arg(long)]
    pub doc_id: Option<String>,

    #[arg(long)]
    pub classify_manifest_path: Option<PathBuf>,

    #[command(flatten)]
    pub model: ModelArgs,
}

#[derive(Args, Debug, Clone)]
pub struct VerifyArgs {
    #[arg(long, default_value = ".cache/caselens")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    /// Analysis manifest to verify; defaults to the last synthesize output
    #[arg(long)]
    pub analysis_manifest_path: Option<PathBuf>,

    /// Document whose page range anchors the check; default is the first
    /// ingested document
    #[arg(long)]
    pub doc_id: Option<String>,

    #[arg(long)]
    pub verification_manifest_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = ".cache/caselens")]
    pub cache_root: PathBuf,
}
