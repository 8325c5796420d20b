use anyhow::Result;
use chrono::Utc;
use tracing::info;

use crate::cli::SynthesizeArgs;
use crate::commands::{MANIFEST_VERSION, build_generator, manifest_dir, read_manifest};
use crate::model::{AnalysisManifest, PartialResultsManifest};
use crate::pipeline;
use crate::util::{timestamp_compact, timestamp_rfc3339, write_json_pretty};

pub fn run(args: SynthesizeArgs) -> Result<()> {
    let run_id = format!("synthesize-{}", timestamp_compact(Utc::now()));
    let manifest_dir = manifest_dir(&args.cache_root);

    let partials_path = args
        .partials_manifest_path
        .clone()
        .unwrap_or_else(|| manifest_dir.join("partial_results.json"));
    let partials: PartialResultsManifest = read_manifest(&partials_path)?;

    info!(
        run_id = %run_id,
        partials = partials.partial_results.len(),
        source_run = %partials.run_id,
        "starting synthesis"
    );

    let generator = build_generator(&args.model)?;
    let outcome = pipeline::run_synthesize(&partials.partial_results, &generator)?;

    let analysis_path = args
        .analysis_manifest_path
        .clone()
        .unwrap_or_else(|| manifest_dir.join("analysis.json"));
    let manifest = AnalysisManifest {
        manifest_version: MANIFEST_VERSION,
        run_id,
        generated_at: timestamp_rfc3339(),
        payload_degraded: outcome.payload_degraded,
        analysis: outcome.analysis,
    };
    write_json_pretty(&analysis_path, &manifest)?;

    info!(
        path = %analysis_path.display(),
        timeline = manifest.analysis.timeline.len(),
        evidence = manifest.analysis.evidence.len(),
        degraded = manifest.payload_degraded,
        "analysis written"
    );

    Ok(())
}
