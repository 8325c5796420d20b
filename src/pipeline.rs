use thiserror::Error;
use tracing::{info, warn};

use crate::generate::Generator;
use crate::model::{CaseAnalysis, SplitReport};
use crate::repair::{RepairError, ResponseParser};
use crate::segment::{Chunk, ChunkOptions, PageSegmenter, batch_chunks};

pub const EXTRACTION_ATTEMPTS_PER_CHUNK: u32 = 2;
pub const SYNTHESIS_PAYLOAD_CEILING_CHARS: usize = 450_000;

const DEGRADED_TIMELINE_MAX: usize = 30;
const DEGRADED_EVIDENCE_MAX: usize = 50;
const DEGRADED_FAVORABLE_MAX: usize = 20;
const DEGRADED_CONTRADICTIONS_MAX: usize = 20;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no analyzable text in any supplied document")]
    EmptyInput,
    #[error("generation service returned no usable output during {stage}")]
    ModelUnavailable { stage: &'static str },
    #[error("could not parse model response during {stage}")]
    Parse {
        stage: &'static str,
        #[source]
        source: RepairError,
    },
    #[error("chunk {index} failed after {attempts} attempts: {reason}")]
    ChunkFailed {
        index: usize,
        attempts: u32,
        reason: String,
    },
    #[error("synthesis payload of {chars} characters exceeds the {limit} character ceiling")]
    SizeLimit { chars: usize, limit: usize },
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug)]
pub struct ExtractOutcome {
    pub split: SplitReport,
    pub partial_results: Vec<CaseAnalysis>,
}

#[derive(Debug)]
pub struct SynthesisOutcome {
    pub analysis: CaseAnalysis,
    pub payload_degraded: bool,
}

/// Phase 1: segmentation and batching only. Chunk count and page coverage
/// are reported without touching the generation service, so a caller can
/// show progress and cost estimates before committing to phase 2.
pub fn run_split(blob: &str, options: &ChunkOptions) -> Result<SplitReport, PipelineError> {
    let (_, report) = plan_chunks(blob, options)?;
    Ok(report)
}

/// Phase 2: one extraction call per chunk, strictly sequential, two attempts
/// per chunk. A chunk that fails both attempts aborts the whole phase; a
/// silently skipped chunk would leave an invisible coverage gap in the
/// analysis, which is worse than a visible, restartable failure.
pub fn run_extract(
    blob: &str,
    options: &ChunkOptions,
    generator: &dyn Generator,
) -> Result<ExtractOutcome, PipelineError> {
    let (chunks, split) = plan_chunks(blob, options)?;
    let parser = ResponseParser::new()?;

    let mut partial_results = Vec::with_capacity(chunks.len());
    for chunk in &chunks {
        let partial = extract_chunk(chunk, split.total_pages, generator, &parser)?;
        partial_results.push(partial);
    }

    info!(
        chunks = split.chunk_count,
        pages = split.total_pages,
        "partial extraction completed"
    );

    Ok(ExtractOutcome {
        split,
        partial_results,
    })
}

/// Phase 3: one synthesis call over all partial results, then defensive
/// normalization of the merged record. Merging itself (timeline ordering,
/// evidence de-duplication, contradiction consolidation) is the model's job.
pub fn run_synthesize(
    partials: &[CaseAnalysis],
    generator: &dyn Generator,
) -> Result<SynthesisOutcome, PipelineError> {
    if partials.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    let (payload, payload_degraded) =
        build_synthesis_payload(partials, SYNTHESIS_PAYLOAD_CEILING_CHARS)?;
    let prompt = synthesis_prompt(&payload);

    let response = match generator.generate(&prompt) {
        Ok(text) if !text.trim().is_empty() => text,
        Ok(_) => return Err(PipelineError::ModelUnavailable { stage: "synthesis" }),
        Err(err) => {
            warn!(error = %err, "synthesis call failed");
            return Err(PipelineError::ModelUnavailable { stage: "synthesis" });
        }
    };

    let parser = ResponseParser::new()?;
    let value = parser.parse(&response).map_err(|source| PipelineError::Parse {
        stage: "synthesis",
        source,
    })?;
    let mut analysis: CaseAnalysis = serde_json::from_value(value)
        .map_err(|err| anyhow::anyhow!("synthesis response shape mismatch: {err}"))?;

    normalize_analysis(&mut analysis, partials);

    Ok(SynthesisOutcome {
        analysis,
        payload_degraded,
    })
}

/// Defensive normalization of the synthesized record: list fields already
/// default to empty on deserialization; an omitted summary falls back to the
/// joined partial summaries. Nothing is re-derived or re-ordered here.
pub fn normalize_analysis(analysis: &mut CaseAnalysis, partials: &[CaseAnalysis]) {
    if analysis.summary.trim().is_empty() {
        analysis.summary = partials
            .iter()
            .map(|partial| partial.summary.trim())
            .filter(|summary| !summary.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
    }
}

fn plan_chunks(
    blob: &str,
    options: &ChunkOptions,
) -> Result<(Vec<Chunk>, SplitReport), PipelineError> {
    if blob.trim().is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    let segmenter = PageSegmenter::new()?;
    let blocks = segmenter.split(blob);
    let total_pages = if blocks.is_empty() { 1 } else { blocks.len() };
    let chunks = batch_chunks(blob, blocks, options);
    let report = SplitReport {
        chunk_count: chunks.len(),
        total_pages,
    };

    Ok((chunks, report))
}

fn extract_chunk(
    chunk: &Chunk,
    total_pages: usize,
    generator: &dyn Generator,
    parser: &ResponseParser,
) -> Result<CaseAnalysis, PipelineError> {
    let prompt = extraction_prompt(chunk, total_pages);
    let mut last_reason = String::new();

    for attempt in 1..=EXTRACTION_ATTEMPTS_PER_CHUNK {
        let response = match generator.generate(&prompt) {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                last_reason = "empty response from generation service".to_string();
                warn!(chunk = chunk.index, attempt, "empty extraction response");
                continue;
            }
            Err(err) => {
                last_reason = err.to_string();
                warn!(chunk = chunk.index, attempt, error = %err, "extraction call failed");
                continue;
            }
        };

        match parser.parse(&response) {
            Ok(value) => match serde_json::from_value::<CaseAnalysis>(value) {
                Ok(partial) => return Ok(partial),
                Err(err) => {
                    last_reason = format!("extraction response shape mismatch: {err}");
                    warn!(chunk = chunk.index, attempt, error = %err, "unusable extraction shape");
                }
            },
            Err(err) => {
                last_reason = err.to_string();
                warn!(chunk = chunk.index, attempt, error = %err, "unparseable extraction response");
            }
        }
    }

    Err(PipelineError::ChunkFailed {
        index: chunk.index,
        attempts: EXTRACTION_ATTEMPTS_PER_CHUNK,
        reason: last_reason,
    })
}

/// Serialize partial results for the synthesis prompt. Over the ceiling,
/// each partial is degraded to a capped summary first; that lossy fallback
/// is deliberate and logged. Still over the ceiling afterwards is a hard
/// rejection before any model call is paid for.
fn build_synthesis_payload(
    partials: &[CaseAnalysis],
    ceiling_chars: usize,
) -> Result<(String, bool), PipelineError> {
    let payload = serde_json::to_string(partials).map_err(anyhow::Error::from)?;
    if payload.chars().count() <= ceiling_chars {
        return Ok((payload, false));
    }

    let degraded: Vec<CaseAnalysis> = partials.iter().map(degrade_partial).collect();
    let payload = serde_json::to_string(&degraded).map_err(anyhow::Error::from)?;
    let chars = payload.chars().count();
    warn!(
        chars,
        ceiling = ceiling_chars,
        "synthesis payload over budget, degraded partial results"
    );

    if chars > ceiling_chars {
        return Err(PipelineError::SizeLimit {
            chars,
            limit: ceiling_chars,
        });
    }

    Ok((payload, true))
}

fn degrade_partial(partial: &CaseAnalysis) -> CaseAnalysis {
    let mut capped = partial.clone();
    capped.timeline.truncate(DEGRADED_TIMELINE_MAX);
    capped.evidence.truncate(DEGRADED_EVIDENCE_MAX);
    capped.favorable_facts.truncate(DEGRADED_FAVORABLE_MAX);
    capped.contradictions.truncate(DEGRADED_CONTRADICTIONS_MAX);
    capped
}

fn extraction_prompt(chunk: &Chunk, total_pages: usize) -> String {
    format!(
        "You are analyzing one chunk of a scanned legal case file ({total_pages} pages total). \
         Each passage below is preceded by its [Document N - Page K] label.\n\
         Extract the facts of this chunk as one JSON object with exactly these fields:\n\
         summary (string), issues (array of strings), \
         timeline (array of {{date, page, description}}), \
         evidence (array of {{name, page, description}}), \
         favorable_facts (array of {{page, description}}), \
         contradictions (array of {{page, description}}).\n\
         Every page field must be the integer page number from the label of the \
         passage that supports the entry. Respond with the JSON object only.\n\n\
         {}",
        chunk.text
    )
}

fn synthesis_prompt(payload: &str) -> String {
    format!(
        "The following JSON array holds partial analyses of consecutive chunks of one \
         legal case file, in chunk order. Merge them into a single coherent analysis: \
         order the timeline chronologically, de-duplicate evidence, and consolidate \
         contradictions. Keep every page citation from the partials unchanged. \
         Respond with one JSON object with fields summary, issues, timeline, evidence, \
         favorable_facts, contradictions.\n\n{payload}"
    )
}

#[cfg(test)]
mod tests {
    use super::{
        PipelineError, build_synthesis_payload, run_extract, run_split, run_synthesize,
    };
    use crate::generate::testing::MockGenerator;
    use crate::model::{CaseAnalysis, CaseDocument, TimelineEvent};
    use crate::segment::{ChunkOptions, build_labeled_blob};

    fn case_blob(doc_pages: &[usize]) -> String {
        let documents: Vec<CaseDocument> = doc_pages
            .iter()
            .enumerate()
            .map(|(index, pages)| CaseDocument {
                doc_id: format!("doc-{index}"),
                pages: (0..*pages).map(|page| format!("body of page {page}")).collect(),
            })
            .collect();
        build_labeled_blob(&documents)
    }

    #[test]
    fn split_reports_three_chunks_for_120_pages_without_model_calls() {
        let blob = case_blob(&[70, 50]);
        let report = run_split(&blob, &ChunkOptions::default()).expect("split succeeds");
        assert_eq!(report.chunk_count, 3);
        assert_eq!(report.total_pages, 120);
    }

    #[test]
    fn split_rejects_entirely_empty_input() {
        let error = run_split("   \n", &ChunkOptions::default()).expect_err("nothing to chunk");
        assert!(matches!(error, PipelineError::EmptyInput));
    }

    #[test]
    fn extract_preserves_chunk_order_in_partial_results() {
        let blob = case_blob(&[4]);
        let options = ChunkOptions {
            pages_per_chunk: 2,
            ..ChunkOptions::default()
        };
        let generator = MockGenerator::new(vec![
            Ok(r#"{"summary": "first chunk"}"#.to_string()),
            Ok(r#"{"summary": "second chunk"}"#.to_string()),
        ]);

        let outcome = run_extract(&blob, &options, &generator).expect("extraction succeeds");
        assert_eq!(outcome.split.chunk_count, 2);
        let summaries: Vec<&str> = outcome
            .partial_results
            .iter()
            .map(|partial| partial.summary.as_str())
            .collect();
        assert_eq!(summaries, vec!["first chunk", "second chunk"]);
    }

    #[test]
    fn extract_retries_once_then_succeeds() {
        let blob = case_blob(&[2]);
        let generator = MockGenerator::new(vec![
            Ok(String::new()),
            Ok(r#"{"summary": "recovered"}"#.to_string()),
        ]);

        let outcome =
            run_extract(&blob, &ChunkOptions::default(), &generator).expect("retry recovers");
        assert_eq!(generator.call_count(), 2);
        assert_eq!(outcome.partial_results[0].summary, "recovered");
    }

    #[test]
    fn second_consecutive_chunk_failure_aborts_the_phase() {
        let blob = case_blob(&[4]);
        let options = ChunkOptions {
            pages_per_chunk: 2,
            ..ChunkOptions::default()
        };
        let generator = MockGenerator::new(vec![
            Ok("not json at all".to_string()),
            Ok(String::new()),
            Ok(r#"{"summary": "never reached"}"#.to_string()),
        ]);

        let error = run_extract(&blob, &options, &generator).expect_err("chunk 0 is fatal");
        match error {
            PipelineError::ChunkFailed {
                index, attempts, ..
            } => {
                assert_eq!(index, 0);
                assert_eq!(attempts, 2);
            }
            other => panic!("expected ChunkFailed, got {other:?}"),
        }
        // Chunk 1 must not have been started.
        assert_eq!(generator.call_count(), 2);
    }

    #[test]
    fn synthesize_defaults_arrays_and_joins_partial_summaries() {
        let partials = vec![
            CaseAnalysis {
                summary: "chunk one facts.".to_string(),
                ..CaseAnalysis::default()
            },
            CaseAnalysis {
                summary: "chunk two facts.".to_string(),
                ..CaseAnalysis::default()
            },
        ];
        // Model omits the summary and every array field.
        let generator = MockGenerator::new(vec![Ok("{}".to_string())]);

        let outcome = run_synthesize(&partials, &generator).expect("synthesis succeeds");
        assert_eq!(outcome.analysis.summary, "chunk one facts. chunk two facts.");
        assert!(outcome.analysis.timeline.is_empty());
        assert!(outcome.analysis.evidence.is_empty());
        assert!(outcome.analysis.favorable_facts.is_empty());
        assert!(outcome.analysis.contradictions.is_empty());
        assert!(outcome.analysis.issues.is_empty());
        assert!(!outcome.payload_degraded);
    }

    #[test]
    fn synthesize_treats_empty_response_as_model_unavailable() {
        let partials = vec![CaseAnalysis::default()];
        let generator = MockGenerator::new(vec![Ok(String::new())]);
        let error = run_synthesize(&partials, &generator).expect_err("empty response is fatal");
        assert!(matches!(
            error,
            PipelineError::ModelUnavailable { stage: "synthesis" }
        ));
    }

    #[test]
    fn oversized_payload_is_degraded_with_capped_lists() {
        let partial = CaseAnalysis {
            summary: "s".to_string(),
            timeline: (0..200)
                .map(|n| TimelineEvent {
                    date: "2024-01-01".to_string(),
                    page: n + 1,
                    description: "x".repeat(50),
                })
                .collect(),
            ..CaseAnalysis::default()
        };

        let (payload, degraded) =
            build_synthesis_payload(std::slice::from_ref(&partial), 8_000)
                .expect("degradation brings payload under ceiling");
        assert!(degraded);
        let capped: Vec<CaseAnalysis> =
            serde_json::from_str(&payload).expect("payload stays valid json");
        assert_eq!(capped[0].timeline.len(), 30);
    }

    #[test]
    fn payload_still_over_ceiling_after_degradation_is_rejected() {
        let partial = CaseAnalysis {
            summary: "y".repeat(5_000),
            ..CaseAnalysis::default()
        };
        let error = build_synthesis_payload(std::slice::from_ref(&partial), 1_000)
            .expect_err("summary alone exceeds ceiling");
        assert!(matches!(error, PipelineError::SizeLimit { .. }));
    }
}
