use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use crate::cli::ModelArgs;
use crate::generate::{GeneratorConfig, HttpGenerator};
use crate::model::CaseDocument;
use crate::segment::build_labeled_blob;
use crate::store;

pub mod classify;
pub mod extract;
pub mod ingest;
pub mod split;
pub mod status;
pub mod synthesize;
pub mod verify;

pub(crate) const MANIFEST_VERSION: u32 = 1;

pub(crate) fn manifest_dir(cache_root: &Path) -> PathBuf {
    cache_root.join("manifests")
}

pub(crate) fn default_db_path(cache_root: &Path) -> PathBuf {
    cache_root.join("caselens_index.sqlite")
}

pub(crate) fn build_generator(args: &ModelArgs) -> Result<HttpGenerator> {
    let api_key = std::env::var(&args.api_key_env).with_context(|| {
        format!(
            "generation api key not found in environment variable {}",
            args.api_key_env
        )
    })?;

    HttpGenerator::new(GeneratorConfig {
        api_base: args.api_base.clone(),
        model: args.model.clone(),
        api_key,
        max_output_tokens: args.max_output_tokens,
        timeout_secs: args.timeout_secs,
    })
}

pub(crate) fn load_stored_documents(db_path: &Path) -> Result<Vec<CaseDocument>> {
    let connection = store::open(db_path)?;
    let documents = store::load_documents(&connection)?;
    if documents.is_empty() {
        bail!(
            "no documents in {}; run `caselens ingest` first",
            db_path.display()
        );
    }
    Ok(documents)
}

/// The analysis input blob: either one unlabeled raw file (exercising the
/// zero-marker fallback) or the labeled concatenation of every stored
/// document.
pub(crate) fn load_analysis_blob(
    cache_root: &Path,
    db_path: Option<&Path>,
    raw_file: Option<&Path>,
) -> Result<String> {
    if let Some(raw_path) = raw_file {
        return fs::read_to_string(raw_path)
            .with_context(|| format!("failed to read {}", raw_path.display()));
    }

    let db_path = db_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_db_path(cache_root));
    let documents = load_stored_documents(&db_path)?;
    Ok(build_labeled_blob(&documents))
}

pub(crate) fn read_manifest<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_slice(&raw).with_context(|| format!("failed to parse {}", path.display()))
}
