use anyhow::Result;
use chrono::Utc;
use tracing::info;

use crate::cli::ExtractArgs;
use crate::commands::{MANIFEST_VERSION, build_generator, load_analysis_blob, manifest_dir};
use crate::model::PartialResultsManifest;
use crate::pipeline;
use crate::segment::ChunkOptions;
use crate::util::{timestamp_compact, timestamp_rfc3339, write_json_pretty};

pub fn run(args: ExtractArgs) -> Result<()> {
    let run_id = format!("extract-{}", timestamp_compact(Utc::now()));
    let blob = load_analysis_blob(
        &args.cache_root,
        args.db_path.as_deref(),
        args.raw_file.as_deref(),
    )?;
    let options = ChunkOptions {
        pages_per_chunk: args.pages_per_chunk,
        max_chars_per_chunk: args.max_chars_per_chunk,
    };
    let generator = build_generator(&args.model)?;

    info!(run_id = %run_id, model = %args.model.model, "starting partial extraction");

    let outcome = pipeline::run_extract(&blob, &options, &generator)?;

    let manifest_path = args
        .partials_manifest_path
        .clone()
        .unwrap_or_else(|| manifest_dir(&args.cache_root).join("partial_results.json"));
    let manifest = PartialResultsManifest {
        manifest_version: MANIFEST_VERSION,
        run_id,
        generated_at: timestamp_rfc3339(),
        split: outcome.split,
        partial_results: outcome.partial_results,
    };
    write_json_pretty(&manifest_path, &manifest)?;

    info!(
        path = %manifest_path.display(),
        chunks = manifest.split.chunk_count,
        partials = manifest.partial_results.len(),
        "partial results written"
    );

    Ok(())
}
