use anyhow::{Result, bail};
use chrono::Utc;
use tracing::info;

use crate::classify::{classify_pages, group_sections};
use crate::cli::ClassifyArgs;
use crate::commands::{MANIFEST_VERSION, build_generator, default_db_path, manifest_dir};
use crate::model::{ClassifyRunManifest, DocClassification};
use crate::store;
use crate::util::{timestamp_compact, timestamp_rfc3339, write_json_pretty};

pub fn run(args: ClassifyArgs) -> Result<()> {
    let started_ts = Utc::now();
    let run_id = format!("classify-{}", timestamp_compact(started_ts));
    let db_path = args
        .db_path
        .clone()
        .unwrap_or_else(|| default_db_path(&args.cache_root));

    let mut connection = store::open(&db_path)?;
    let mut documents = store::load_documents(&connection)?;
    if let Some(doc_id) = &args.doc_id {
        documents.retain(|document| &document.doc_id == doc_id);
        if documents.is_empty() {
            bail!("document {} not found in {}", doc_id, db_path.display());
        }
    }
    if documents.is_empty() {
        bail!("no documents in {}; run `caselens ingest` first", db_path.display());
    }

    let generator = build_generator(&args.model)?;
    let mut classified = Vec::with_capacity(documents.len());

    for document in &documents {
        info!(doc_id = %document.doc_id, pages = document.pages.len(), "classifying document");

        let outcome = classify_pages(&document.pages, &generator)?;
        let sections = group_sections(&outcome.classifications);
        store::replace_sections(&mut connection, &document.doc_id, &sections)?;

        info!(
            doc_id = %document.doc_id,
            sections = sections.len(),
            auto = outcome.auto_classified,
            degraded = outcome.degraded,
            "document sections replaced"
        );

        classified.push(DocClassification {
            doc_id: document.doc_id.clone(),
            page_count: document.pages.len(),
            auto_classified_pages: outcome.auto_classified,
            degraded_pages: outcome.degraded,
            sections,
        });
    }

    let manifest_path = args.classify_manifest_path.clone().unwrap_or_else(|| {
        manifest_dir(&args.cache_root)
            .join(format!("classify_run_{}.json", timestamp_compact(started_ts)))
    });
    let manifest = ClassifyRunManifest {
        manifest_version: MANIFEST_VERSION,
        run_id,
        generated_at: timestamp_rfc3339(),
        documents: classified,
    };
    write_json_pretty(&manifest_path, &manifest)?;

    info!(
        path = %manifest_path.display(),
        documents = manifest.documents.len(),
        "classification manifest written"
    );

    Ok(())
}
