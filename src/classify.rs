use anyhow::Result;
use serde::Deserialize;
use tracing::{info, warn};

use crate::generate::Generator;
use crate::model::{EvidenceSection, OcrQuality, PageClassification, PageKind};
use crate::repair::ResponseParser;
use crate::util::{compact_len, truncate_chars};

/// Pages with less readable text than this are photo evidence without asking
/// the model. Tunable: a one-line court stamp can trip it.
pub const PHOTO_AUTO_RULE_MAX_CHARS: usize = 30;

pub const CLASSIFY_BATCH_PAGES: usize = 20;
pub const CLASSIFY_PAGE_TEXT_MAX_CHARS: usize = 1_500;

const SECTION_FAILED_MAX_CHARS: usize = 30;
const SECTION_PARTIAL_MAX_CHARS: usize = 100;
const PHOTO_ABSORB_MAX_PAGES: usize = 2;

#[derive(Debug)]
pub struct ClassifyOutcome {
    pub classifications: Vec<PageClassification>,
    pub auto_classified: usize,
    pub degraded: usize,
}

#[derive(Debug, Deserialize)]
struct ClassifyResponse {
    #[serde(default)]
    pages: Vec<PageClassification>,
}

/// Classify every page of one document: the near-empty auto rule first, then
/// batched model calls for the remainder. A failed batch degrades its pages
/// to `other`/confidence 0 instead of failing the run; unlike case-fact
/// extraction, page classification has a safe default.
pub fn classify_pages(
    pages: &[String],
    generator: &dyn Generator,
) -> Result<ClassifyOutcome> {
    let parser = ResponseParser::new()?;

    let mut classifications = Vec::with_capacity(pages.len());
    let mut needs_model: Vec<(u32, &str)> = Vec::new();
    let mut auto_classified = 0;

    for (index, text) in pages.iter().enumerate() {
        let page = (index + 1) as u32;
        if compact_len(text) < PHOTO_AUTO_RULE_MAX_CHARS {
            auto_classified += 1;
            classifications.push(PageClassification {
                page,
                kind: PageKind::PhotoEvidence,
                confidence: 1.0,
                text: text.clone(),
                title: None,
                names: Vec::new(),
                dates: Vec::new(),
            });
        } else {
            needs_model.push((page, text.as_str()));
        }
    }

    let mut degraded = 0;
    for batch in needs_model.chunks(CLASSIFY_BATCH_PAGES) {
        let (mut batch_results, batch_degraded) = classify_batch(batch, generator, &parser);
        degraded += batch_degraded;
        classifications.append(&mut batch_results);
    }

    classifications.sort_by_key(|classification| classification.page);

    info!(
        pages = pages.len(),
        auto = auto_classified,
        degraded,
        "page classification completed"
    );

    Ok(ClassifyOutcome {
        classifications,
        auto_classified,
        degraded,
    })
}

fn classify_batch(
    batch: &[(u32, &str)],
    generator: &dyn Generator,
    parser: &ResponseParser,
) -> (Vec<PageClassification>, usize) {
    let prompt = classification_prompt(batch);

    let parsed = match generator.generate(&prompt) {
        Ok(text) if !text.trim().is_empty() => match parser.parse(&text) {
            Ok(value) => serde_json::from_value::<ClassifyResponse>(value).ok(),
            Err(err) => {
                warn!(error = %err, "unparseable classification response");
                None
            }
        },
        Ok(_) => {
            warn!("empty classification response");
            None
        }
        Err(err) => {
            warn!(error = %err, "classification call failed");
            None
        }
    };

    let returned = parsed.map(|response| response.pages).unwrap_or_default();

    let mut degraded = 0;
    let results = batch
        .iter()
        .map(|(page, text)| {
            match returned.iter().find(|candidate| candidate.page == *page) {
                Some(candidate) => PageClassification {
                    page: *page,
                    kind: candidate.kind,
                    confidence: candidate.confidence.clamp(0.0, 1.0),
                    text: (*text).to_string(),
                    title: candidate.title.clone(),
                    names: candidate.names.clone(),
                    dates: candidate.dates.clone(),
                },
                None => {
                    degraded += 1;
                    PageClassification {
                        page: *page,
                        kind: PageKind::Other,
                        confidence: 0.0,
                        text: (*text).to_string(),
                        title: None,
                        names: Vec::new(),
                        dates: Vec::new(),
                    }
                }
            }
        })
        .collect();

    (results, degraded)
}

fn classification_prompt(batch: &[(u32, &str)]) -> String {
    let mut prompt = String::from(
        "Classify each page of this scanned legal case file. Respond with one JSON \
         object: {\"pages\": [{\"page\", \"type\", \"confidence\", \"title\", \
         \"names\", \"dates\"}, ...]}. \
         type is one of: indictment, judgment, police_report, suspect_statement, \
         witness_statement, court_transcript, expert_report, photo_evidence, \
         document_evidence, correspondence, other. confidence is 0.0-1.0; title is \
         the document's own heading or null; names and dates are the person names \
         and dates visible on the page.\n",
    );
    for (page, text) in batch {
        prompt.push_str(&format!(
            "\n--- Page {} ---\n{}\n",
            page,
            truncate_chars(text, CLASSIFY_PAGE_TEXT_MAX_CHARS)
        ));
    }
    prompt
}

/// Collapse an ordered page classification stream into contiguous sections.
///
/// A section extends over same-kind consecutive pages. One exception: a run
/// of one or two consecutive photo pages is absorbed when the classification
/// after the run returns to the open section's kind. Case files routinely
/// interleave a photo exhibit into the middle of a multi-page statement, and
/// splitting on every kind change would shatter one logical document into
/// dozens of fragments.
pub fn group_sections(classifications: &[PageClassification]) -> Vec<EvidenceSection> {
    let Some(first) = classifications.first() else {
        return Vec::new();
    };

    let mut sections = Vec::new();
    let mut section = ActiveSection::start(first);
    let mut index = 1;

    while index < classifications.len() {
        let classification = &classifications[index];

        let consecutive = classification.page == section.page_end + 1;
        if consecutive && classification.kind == section.kind {
            section.extend(classification);
            index += 1;
            continue;
        }

        if consecutive && classification.kind == PageKind::PhotoEvidence {
            let run = photo_run_length(&classifications[index..], classification.page);
            let resumes = run <= PHOTO_ABSORB_MAX_PAGES
                && classifications.get(index + run).is_some_and(|next| {
                    next.kind == section.kind && next.page == classification.page + run as u32
                });
            if resumes {
                for absorbed in &classifications[index..index + run] {
                    section.extend(absorbed);
                }
                index += run;
                continue;
            }
        }

        sections.push(section.finish());
        section = ActiveSection::start(classification);
        index += 1;
    }

    sections.push(section.finish());
    sections
}

fn photo_run_length(rest: &[PageClassification], first_page: u32) -> usize {
    let mut run = 1;
    while run <= PHOTO_ABSORB_MAX_PAGES
        && rest.get(run).is_some_and(|candidate| {
            candidate.kind == PageKind::PhotoEvidence && candidate.page == first_page + run as u32
        })
    {
        run += 1;
    }
    run
}

#[derive(Debug)]
struct ActiveSection {
    kind: PageKind,
    title: Option<String>,
    name: Option<String>,
    page_start: u32,
    page_end: u32,
    texts: Vec<String>,
}

impl ActiveSection {
    fn start(classification: &PageClassification) -> Self {
        let mut section = Self {
            kind: classification.kind,
            title: None,
            name: None,
            page_start: classification.page,
            page_end: classification.page.saturating_sub(1),
            texts: Vec::new(),
        };
        section.extend(classification);
        section
    }

    fn extend(&mut self, classification: &PageClassification) {
        self.page_end = classification.page;
        self.texts.push(classification.text.clone());
        if self.title.is_none() {
            self.title = classification.title.clone();
        }
        if self.name.is_none() {
            self.name = classification.names.first().cloned();
        }
    }

    fn finish(self) -> EvidenceSection {
        let base = self
            .title
            .unwrap_or_else(|| self.kind.label().to_string());
        let title = match &self.name {
            Some(name) => format!("{base} ({name})"),
            None => base,
        };

        let text = self.texts.join("\n");
        // Aggregate readability of the merged section decides whether a human
        // must supply a manual description, not any single page's confidence.
        let ocr_quality = match compact_len(&text) {
            length if length < SECTION_FAILED_MAX_CHARS => OcrQuality::Failed,
            length if length < SECTION_PARTIAL_MAX_CHARS => OcrQuality::Partial,
            _ => OcrQuality::Good,
        };

        EvidenceSection {
            kind: self.kind,
            title,
            page_start: self.page_start,
            page_end: self.page_end,
            text,
            ocr_quality,
        }
    }
}
