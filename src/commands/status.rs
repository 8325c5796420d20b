use anyhow::Result;
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::commands::{default_db_path, manifest_dir};
use crate::store;

pub fn run(args: StatusArgs) -> Result<()> {
    let manifest_dir = manifest_dir(&args.cache_root);
    let db_path = default_db_path(&args.cache_root);

    info!(cache_root = %args.cache_root.display(), "status requested");

    if db_path.exists() {
        let connection = store::open(&db_path)?;
        let counts = store::counts(&connection)?;
        info!(
            docs = counts.docs,
            pages = counts.pages,
            sections = counts.sections,
            "store contents"
        );
    } else {
        warn!(path = %db_path.display(), "store missing; run `caselens ingest`");
    }

    for (phase, filename) in [
        ("split", "split_report.json"),
        ("extract", "partial_results.json"),
        ("synthesize", "analysis.json"),
        ("verify", "verification.json"),
    ] {
        let path = manifest_dir.join(filename);
        if path.exists() {
            info!(phase, path = %path.display(), "phase manifest present");
        } else {
            info!(phase, "phase manifest missing");
        }
    }

    Ok(())
}
