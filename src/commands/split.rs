use anyhow::Result;
use tracing::info;

use crate::cli::SplitArgs;
use crate::commands::{MANIFEST_VERSION, load_analysis_blob, manifest_dir};
use crate::model::SplitManifest;
use crate::pipeline;
use crate::segment::ChunkOptions;
use crate::util::{timestamp_rfc3339, write_json_pretty};

pub fn run(args: SplitArgs) -> Result<()> {
    let blob = load_analysis_blob(
        &args.cache_root,
        args.db_path.as_deref(),
        args.raw_file.as_deref(),
    )?;
    let options = ChunkOptions {
        pages_per_chunk: args.pages_per_chunk,
        max_chars_per_chunk: args.max_chars_per_chunk,
    };

    let split = pipeline::run_split(&blob, &options)?;

    let manifest_path = args
        .split_manifest_path
        .clone()
        .unwrap_or_else(|| manifest_dir(&args.cache_root).join("split_report.json"));
    let manifest = SplitManifest {
        manifest_version: MANIFEST_VERSION,
        generated_at: timestamp_rfc3339(),
        pages_per_chunk: args.pages_per_chunk,
        max_chars_per_chunk: args.max_chars_per_chunk,
        split,
    };
    write_json_pretty(&manifest_path, &manifest)?;

    info!(
        path = %manifest_path.display(),
        chunks = split.chunk_count,
        pages = split.total_pages,
        "split report written"
    );

    Ok(())
}
