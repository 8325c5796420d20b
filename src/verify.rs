use crate::model::{CaseAnalysis, VerificationEntry, VerificationReport};
use crate::util::{compact_len, truncate_chars};

/// A cited page with less readable text than this cannot confirm anything.
const EMPTY_PAGE_MAX_CHARS: usize = 10;
/// Token sample taken from the head of the cited text.
const MATCH_SAMPLE_CHARS: usize = 200;
/// Empirically chosen recall threshold; a default, not a law.
const MATCH_TOKEN_RATIO: f64 = 0.30;
const MATCH_MIN_TOKENS: usize = 2;

/// Spot-check every page citation in a finished analysis against the first
/// analyzed document's page texts. A heuristic recall check for invented or
/// misplaced page numbers, not a proof of semantic accuracy. Read-only and
/// recomputed on demand.
pub fn verify_analysis(analysis: &CaseAnalysis, pages: &[String]) -> VerificationReport {
    VerificationReport {
        timeline: analysis
            .timeline
            .iter()
            .enumerate()
            .map(|(index, event)| check_citation(index, event.page, &event.description, pages))
            .collect(),
        evidence: analysis
            .evidence
            .iter()
            .enumerate()
            .map(|(index, item)| {
                let cited = format!("{} {}", item.name, item.description);
                check_citation(index, item.page, &cited, pages)
            })
            .collect(),
        favorable_facts: analysis
            .favorable_facts
            .iter()
            .enumerate()
            .map(|(index, fact)| check_citation(index, fact.page, &fact.description, pages))
            .collect(),
        contradictions: analysis
            .contradictions
            .iter()
            .enumerate()
            .map(|(index, item)| check_citation(index, item.page, &item.description, pages))
            .collect(),
    }
}

fn check_citation(
    index: usize,
    page: u32,
    cited_text: &str,
    pages: &[String],
) -> VerificationEntry {
    let in_range = page >= 1 && (page as usize) <= pages.len();
    if !in_range {
        return VerificationEntry {
            index,
            page,
            in_range: false,
            content_match: false,
        };
    }

    let page_text = &pages[(page - 1) as usize];
    let content_match = if compact_len(page_text) < EMPTY_PAGE_MAX_CHARS {
        false
    } else {
        content_matches(cited_text, page_text)
    };

    VerificationEntry {
        index,
        page,
        in_range: true,
        content_match,
    }
}

/// Require that enough of the cited text's tokens appear verbatim
/// (case-insensitively) in the page. With nothing usable to check, there is
/// nothing to disprove.
fn content_matches(cited_text: &str, page_text: &str) -> bool {
    let sample = truncate_chars(cited_text, MATCH_SAMPLE_CHARS);
    let tokens: Vec<String> = sample
        .split_whitespace()
        .filter(|token| token.chars().count() >= 2)
        .map(|token| token.to_lowercase())
        .collect();

    if tokens.is_empty() {
        return true;
    }

    let ratio_floor = (MATCH_TOKEN_RATIO * tokens.len() as f64).ceil() as usize;
    let required = ratio_floor.max(MATCH_MIN_TOKENS).min(tokens.len());

    let haystack = page_text.to_lowercase();
    let matched = tokens
        .iter()
        .filter(|token| haystack.contains(token.as_str()))
        .count();

    matched >= required
}
