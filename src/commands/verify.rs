use anyhow::{Result, bail};
use tracing::{info, warn};

use crate::cli::VerifyArgs;
use crate::commands::{MANIFEST_VERSION, default_db_path, manifest_dir, read_manifest};
use crate::model::{AnalysisManifest, VerificationEntry, VerificationManifest};
use crate::store;
use crate::util::{timestamp_rfc3339, write_json_pretty};
use crate::verify::verify_analysis;

pub fn run(args: VerifyArgs) -> Result<()> {
    let manifest_dir = manifest_dir(&args.cache_root);
    let db_path = args
        .db_path
        .clone()
        .unwrap_or_else(|| default_db_path(&args.cache_root));

    let analysis_path = args
        .analysis_manifest_path
        .clone()
        .unwrap_or_else(|| manifest_dir.join("analysis.json"));
    let analysis: AnalysisManifest = read_manifest(&analysis_path)?;

    let connection = store::open(&db_path)?;
    let (doc_id, pages) = match &args.doc_id {
        Some(doc_id) => {
            let pages = store::load_pages(&connection, doc_id)?;
            if pages.is_empty() {
                bail!("document {} not found in {}", doc_id, db_path.display());
            }
            (doc_id.clone(), pages)
        }
        None => {
            let documents = store::load_documents(&connection)?;
            let Some(first) = documents.into_iter().next() else {
                bail!("no documents in {}; run `caselens ingest` first", db_path.display());
            };
            (first.doc_id, first.pages)
        }
    };

    let report = verify_analysis(&analysis.analysis, &pages);

    let flagged = [
        &report.timeline,
        &report.evidence,
        &report.favorable_facts,
        &report.contradictions,
    ]
    .iter()
    .flat_map(|entries| entries.iter())
    .filter(|entry| !entry.in_range || !entry.content_match)
    .count();
    let checked = report.timeline.len()
        + report.evidence.len()
        + report.favorable_facts.len()
        + report.contradictions.len();

    if flagged > 0 {
        warn!(flagged, checked, "citations failed verification heuristics");
        for (field, entries) in [
            ("timeline", &report.timeline),
            ("evidence", &report.evidence),
            ("favorable_facts", &report.favorable_facts),
            ("contradictions", &report.contradictions),
        ] {
            for entry in out_of_range(entries) {
                warn!(field, index = entry.index, page = entry.page, "citation out of range");
            }
            for entry in mismatched(entries) {
                warn!(field, index = entry.index, page = entry.page, "citation content mismatch");
            }
        }
    }

    let verification_path = args
        .verification_manifest_path
        .clone()
        .unwrap_or_else(|| manifest_dir.join("verification.json"));
    let manifest = VerificationManifest {
        manifest_version: MANIFEST_VERSION,
        generated_at: timestamp_rfc3339(),
        doc_id,
        analysis_path: analysis_path.display().to_string(),
        report,
    };
    write_json_pretty(&verification_path, &manifest)?;

    info!(
        path = %verification_path.display(),
        checked,
        flagged,
        "verification report written"
    );

    Ok(())
}

fn out_of_range(entries: &[VerificationEntry]) -> impl Iterator<Item = &VerificationEntry> {
    entries.iter().filter(|entry| !entry.in_range)
}

fn mismatched(entries: &[VerificationEntry]) -> impl Iterator<Item = &VerificationEntry> {
    entries
        .iter()
        .filter(|entry| entry.in_range && !entry.content_match)
}

#[cfg(test)]
mod tests {
    use super::{mismatched, out_of_range};
    use crate::model::VerificationEntry;

    fn entry(index: usize, in_range: bool, content_match: bool) -> VerificationEntry {
        VerificationEntry {
            index,
            page: (index + 1) as u32,
            in_range,
            content_match,
        }
    }

    #[test]
    fn flagged_entries_are_partitioned_by_failure_kind() {
        let entries = vec![
            entry(0, true, true),
            entry(1, false, false),
            entry(2, true, false),
        ];

        let out: Vec<usize> = out_of_range(&entries).map(|e| e.index).collect();
        assert_eq!(out, vec![1]);

        let bad: Vec<usize> = mismatched(&entries).map(|e| e.index).collect();
        assert_eq!(bad, vec![2]);
    }
}
