use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, params};
use serde::Serialize;

use crate::model::{CaseDocument, EvidenceSection};
use crate::util::timestamp_rfc3339;

const DB_SCHEMA_VERSION: &str = "0.1.0";

/// Local text store: page-indexed plain text per document, plus the evidence
/// sections produced by the last classification pass.
pub fn open(db_path: &Path) -> Result<Connection> {
    let connection = Connection::open(db_path)
        .with_context(|| format!("failed to open {}", db_path.display()))?;
    configure_connection(&connection)?;
    ensure_schema(&connection)?;
    Ok(connection)
}

fn configure_connection(connection: &Connection) -> Result<()> {
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;
    Ok(())
}

fn ensure_schema(connection: &Connection) -> Result<()> {
    connection.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS docs (
          doc_id TEXT PRIMARY KEY,
          doc_seq INTEGER NOT NULL,
          filename TEXT NOT NULL,
          sha256 TEXT NOT NULL,
          page_count INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS pages (
          doc_id TEXT NOT NULL,
          page_number INTEGER NOT NULL,
          text TEXT NOT NULL,
          PRIMARY KEY(doc_id, page_number),
          FOREIGN KEY(doc_id) REFERENCES docs(doc_id)
        );

        CREATE TABLE IF NOT EXISTS sections (
          doc_id TEXT NOT NULL,
          section_seq INTEGER NOT NULL,
          type TEXT NOT NULL,
          title TEXT NOT NULL,
          page_start INTEGER NOT NULL,
          page_end INTEGER NOT NULL,
          text TEXT NOT NULL,
          ocr_quality TEXT NOT NULL,
          PRIMARY KEY(doc_id, section_seq),
          FOREIGN KEY(doc_id) REFERENCES docs(doc_id)
        );
        ",
    )?;

    let now = timestamp_rfc3339();
    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [DB_SCHEMA_VERSION],
    )?;
    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_updated_at', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [now],
    )?;

    Ok(())
}

pub fn upsert_document(
    connection: &mut Connection,
    doc_id: &str,
    doc_seq: usize,
    filename: &str,
    sha256: &str,
    pages: &[String],
) -> Result<()> {
    let tx = connection.transaction()?;

    tx.execute(
        "INSERT INTO docs(doc_id, doc_seq, filename, sha256, page_count)
         VALUES(?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(doc_id) DO UPDATE SET
           doc_seq=excluded.doc_seq,
           filename=excluded.filename,
           sha256=excluded.sha256,
           page_count=excluded.page_count",
        params![doc_id, doc_seq as i64, filename, sha256, pages.len() as i64],
    )?;

    tx.execute("DELETE FROM pages WHERE doc_id = ?1", [doc_id])?;
    {
        let mut statement = tx.prepare(
            "INSERT INTO pages(doc_id, page_number, text) VALUES(?1, ?2, ?3)",
        )?;
        for (index, text) in pages.iter().enumerate() {
            statement.execute(params![doc_id, (index + 1) as i64, text])?;
        }
    }

    tx.commit()?;
    Ok(())
}

/// Documents in ingest order, each with its full ordered page texts.
pub fn load_documents(connection: &Connection) -> Result<Vec<CaseDocument>> {
    let mut doc_statement =
        connection.prepare("SELECT doc_id FROM docs ORDER BY doc_seq, doc_id")?;
    let doc_ids: Vec<String> = doc_statement
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<_>>()?;

    let mut documents = Vec::with_capacity(doc_ids.len());
    for doc_id in doc_ids {
        let pages = load_pages(connection, &doc_id)?;
        documents.push(CaseDocument { doc_id, pages });
    }

    Ok(documents)
}

pub fn load_pages(connection: &Connection, doc_id: &str) -> Result<Vec<String>> {
    let mut statement = connection
        .prepare("SELECT text FROM pages WHERE doc_id = ?1 ORDER BY page_number")?;
    let pages = statement
        .query_map([doc_id], |row| row.get(0))?
        .collect::<rusqlite::Result<_>>()?;
    Ok(pages)
}

/// Sections are wholly replaced on every reclassification, never patched.
pub fn replace_sections(
    connection: &mut Connection,
    doc_id: &str,
    sections: &[EvidenceSection],
) -> Result<()> {
    let tx = connection.transaction()?;

    tx.execute("DELETE FROM sections WHERE doc_id = ?1", [doc_id])?;
    {
        let mut statement = tx.prepare(
            "INSERT INTO sections(
               doc_id, section_seq, type, title, page_start, page_end, text, ocr_quality
             ) VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;
        for (seq, section) in sections.iter().enumerate() {
            statement.execute(params![
                doc_id,
                (seq + 1) as i64,
                section.kind.as_str(),
                &section.title,
                section.page_start as i64,
                section.page_end as i64,
                &section.text,
                section.ocr_quality.as_str(),
            ])?;
        }
    }

    tx.commit()?;
    Ok(())
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct StoreCounts {
    pub docs: i64,
    pub pages: i64,
    pub sections: i64,
}

pub fn counts(connection: &Connection) -> Result<StoreCounts> {
    Ok(StoreCounts {
        docs: count_rows(connection, "SELECT COUNT(*) FROM docs")?,
        pages: count_rows(connection, "SELECT COUNT(*) FROM pages")?,
        sections: count_rows(connection, "SELECT COUNT(*) FROM sections")?,
    })
}

fn count_rows(connection: &Connection, sql: &str) -> Result<i64> {
    let count = connection.query_row(sql, [], |row| row.get(0))?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::{counts, load_documents, load_pages, open, replace_sections, upsert_document};
    use crate::model::{EvidenceSection, OcrQuality, PageKind};

    fn section(start: u32, end: u32) -> EvidenceSection {
        EvidenceSection {
            kind: PageKind::WitnessStatement,
            title: "Witness statement".to_string(),
            page_start: start,
            page_end: end,
            text: "merged text".to_string(),
            ocr_quality: OcrQuality::Good,
        }
    }

    #[test]
    fn documents_round_trip_in_ingest_order() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut connection = open(&dir.path().join("store.sqlite")).expect("open store");

        let second = vec!["b1".to_string()];
        let first = vec!["a1".to_string(), "a2".to_string()];
        upsert_document(&mut connection, "case-b", 2, "b.txt", "hash-b", &second)
            .expect("upsert b");
        upsert_document(&mut connection, "case-a", 1, "a.txt", "hash-a", &first)
            .expect("upsert a");

        let documents = load_documents(&connection).expect("load documents");
        assert_eq!(documents.len(), 2);
        assert_eq!(documents[0].doc_id, "case-a");
        assert_eq!(documents[0].pages, first);
        assert_eq!(documents[1].doc_id, "case-b");
    }

    #[test]
    fn reingest_replaces_pages_instead_of_appending() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut connection = open(&dir.path().join("store.sqlite")).expect("open store");

        let initial = vec!["old page".to_string(), "stale page".to_string()];
        upsert_document(&mut connection, "case-a", 1, "a.txt", "h1", &initial)
            .expect("first upsert");
        let updated = vec!["new page".to_string()];
        upsert_document(&mut connection, "case-a", 1, "a.txt", "h2", &updated)
            .expect("second upsert");

        let pages = load_pages(&connection, "case-a").expect("load pages");
        assert_eq!(pages, updated);
    }

    #[test]
    fn reclassification_wholly_replaces_sections() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut connection = open(&dir.path().join("store.sqlite")).expect("open store");
        upsert_document(&mut connection, "case-a", 1, "a.txt", "h", &["p".to_string()])
            .expect("upsert");

        replace_sections(&mut connection, "case-a", &[section(1, 3), section(4, 5)])
            .expect("first classification");
        replace_sections(&mut connection, "case-a", &[section(1, 5)])
            .expect("reclassification");

        let store_counts = counts(&connection).expect("counts");
        assert_eq!(store_counts.sections, 1);
        assert_eq!(store_counts.docs, 1);
        assert_eq!(store_counts.pages, 1);
    }
}
