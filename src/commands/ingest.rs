use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use tracing::{info, warn};

use crate::cli::IngestArgs;
use crate::commands::{MANIFEST_VERSION, default_db_path, manifest_dir};
use crate::model::{IngestCounts, IngestRunManifest, SourceEntry};
use crate::store;
use crate::util::{
    ensure_directory, sha256_file, timestamp_compact, timestamp_rfc3339, write_json_pretty,
};

pub fn run(args: IngestArgs) -> Result<()> {
    let started_ts = Utc::now();
    let run_id = format!("ingest-{}", timestamp_compact(started_ts));

    let manifest_dir = manifest_dir(&args.cache_root);
    ensure_directory(&manifest_dir)?;
    let manifest_path = args
        .ingest_manifest_path
        .clone()
        .unwrap_or_else(|| manifest_dir.join(format!("ingest_run_{}.json", timestamp_compact(started_ts))));
    let db_path = args
        .db_path
        .clone()
        .unwrap_or_else(|| default_db_path(&args.cache_root));

    info!(
        source_dir = %args.source_dir.display(),
        db = %db_path.display(),
        run_id = %run_id,
        "starting ingest"
    );

    let mut files: Vec<_> = fs::read_dir(&args.source_dir)
        .with_context(|| format!("failed to read {}", args.source_dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "txt"))
        .collect();
    files.sort();

    if files.is_empty() {
        bail!("no *.txt documents found in {}", args.source_dir.display());
    }

    let mut connection = store::open(&db_path)?;
    let mut source_hashes = Vec::new();
    let mut warnings = Vec::new();
    let mut page_count_total = 0;
    let mut blob_document_count = 0;

    for (index, path) in files.iter().enumerate() {
        let doc_id = doc_id_for(path);
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let pages = split_form_feed_pages(&raw);
        if pages.is_empty() {
            let warning = format!("skipping empty document: {}", path.display());
            warn!(warning = %warning, "ingest warning");
            warnings.push(warning);
            continue;
        }
        if pages.len() == 1 && !raw.contains('\u{000C}') {
            blob_document_count += 1;
        }

        let sha256 = sha256_file(path)?;
        store::upsert_document(&mut connection, &doc_id, index + 1, &filename, &sha256, &pages)?;

        page_count_total += pages.len();
        source_hashes.push(SourceEntry {
            filename,
            doc_id,
            sha256,
            page_count: pages.len(),
        });
    }

    let manifest = IngestRunManifest {
        manifest_version: MANIFEST_VERSION,
        run_id,
        generated_at: timestamp_rfc3339(),
        source_dir: args.source_dir.display().to_string(),
        db_path: db_path.display().to_string(),
        counts: IngestCounts {
            document_count: source_hashes.len(),
            page_count: page_count_total,
            blob_document_count,
        },
        source_hashes,
        warnings,
        notes: vec![
            "Pages split on form-feed separators from the text-extraction step.".to_string(),
            "Documents without form feeds are stored as single-page blobs.".to_string(),
        ],
    };

    write_json_pretty(&manifest_path, &manifest)?;

    info!(
        path = %manifest_path.display(),
        docs = manifest.counts.document_count,
        pages = manifest.counts.page_count,
        "ingest completed"
    );

    Ok(())
}

fn doc_id_for(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());

    let mut out = String::with_capacity(stem.len());
    for ch in stem.chars() {
        if ch.is_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push('-');
        }
    }
    while out.contains("--") {
        out = out.replace("--", "-");
    }
    out.trim_matches('-').to_string()
}

/// Split extracted text into pages on the form-feed convention and drop
/// trailing blank pages. A file with no separators is one implicit page.
fn split_form_feed_pages(raw: &str) -> Vec<String> {
    if raw.trim().is_empty() {
        return Vec::new();
    }

    let mut pages: Vec<String> = raw
        .split('\u{000C}')
        .map(|page| page.replace('\u{0000}', ""))
        .collect();

    while let Some(last_page) = pages.last() {
        if last_page.trim().is_empty() {
            pages.pop();
            continue;
        }
        break;
    }

    pages
}

#[cfg(test)]
mod tests {
    use super::{doc_id_for, split_form_feed_pages};
    use std::path::Path;

    #[test]
    fn form_feed_pages_are_split_and_trailing_blanks_dropped() {
        let raw = "page one\u{000C}page two\u{000C}  \n ";
        let pages = split_form_feed_pages(raw);
        assert_eq!(pages, vec!["page one".to_string(), "page two".to_string()]);
    }

    #[test]
    fn file_without_form_feeds_is_one_page() {
        assert_eq!(split_form_feed_pages("just a blob").len(), 1);
        assert!(split_form_feed_pages("  \n").is_empty());
    }

    #[test]
    fn doc_ids_are_sanitized_file_stems() {
        assert_eq!(doc_id_for(Path::new("/tmp/Case File #3.txt")), "case-file-3");
    }
}
