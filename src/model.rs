use serde::{Deserialize, Serialize};

/// One analyzed source document: ordered per-page plain text, page 1 first.
#[derive(Debug, Clone)]
pub struct CaseDocument {
    pub doc_id: String,
    pub pages: Vec<String>,
}

/// Structured extraction produced from a single chunk (phase 2) and, after
/// synthesis, the final merged analysis (phase 3). Every list field defaults
/// to empty so a model response that omits one still deserializes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaseAnalysis {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub timeline: Vec<TimelineEvent>,
    #[serde(default)]
    pub evidence: Vec<EvidenceItem>,
    #[serde(default)]
    pub favorable_facts: Vec<FavorableFact>,
    #[serde(default)]
    pub contradictions: Vec<Contradiction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEvent {
    #[serde(default)]
    pub date: String,
    pub page: u32,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub name: String,
    pub page: u32,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FavorableFact {
    pub page: u32,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contradiction {
    pub page: u32,
    pub description: String,
}

/// Phase-1 output: fully determined before any model call is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitReport {
    pub chunk_count: usize,
    pub total_pages: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageKind {
    Indictment,
    Judgment,
    PoliceReport,
    SuspectStatement,
    WitnessStatement,
    CourtTranscript,
    ExpertReport,
    PhotoEvidence,
    DocumentEvidence,
    Correspondence,
    Other,
}

impl PageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Indictment => "indictment",
            Self::Judgment => "judgment",
            Self::PoliceReport => "police_report",
            Self::SuspectStatement => "suspect_statement",
            Self::WitnessStatement => "witness_statement",
            Self::CourtTranscript => "court_transcript",
            Self::ExpertReport => "expert_report",
            Self::PhotoEvidence => "photo_evidence",
            Self::DocumentEvidence => "document_evidence",
            Self::Correspondence => "correspondence",
            Self::Other => "other",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Indictment => "Indictment",
            Self::Judgment => "Judgment",
            Self::PoliceReport => "Police report",
            Self::SuspectStatement => "Suspect statement",
            Self::WitnessStatement => "Witness statement",
            Self::CourtTranscript => "Court transcript",
            Self::ExpertReport => "Expert report",
            Self::PhotoEvidence => "Photo evidence",
            Self::DocumentEvidence => "Documentary evidence",
            Self::Correspondence => "Correspondence",
            Self::Other => "Other",
        }
    }
}

/// One classification per physical page, either from the near-empty-page
/// auto rule or from a batched classification call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageClassification {
    pub page: u32,
    #[serde(rename = "type")]
    pub kind: PageKind,
    pub confidence: f32,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub dates: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrQuality {
    Good,
    Partial,
    Failed,
}

impl OcrQuality {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Good => "good",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }
}

/// A contiguous run of pages sharing one classified document kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceSection {
    #[serde(rename = "type")]
    pub kind: PageKind,
    pub title: String,
    pub page_start: u32,
    pub page_end: u32,
    pub text: String,
    pub ocr_quality: OcrQuality,
}

/// Post-hoc check of one cited page: recomputed on demand, never stored
/// alongside the analysis it verifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationEntry {
    pub index: usize,
    pub page: u32,
    pub in_range: bool,
    pub content_match: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerificationReport {
    pub timeline: Vec<VerificationEntry>,
    pub evidence: Vec<VerificationEntry>,
    pub favorable_facts: Vec<VerificationEntry>,
    pub contradictions: Vec<VerificationEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceEntry {
    pub filename: String,
    pub doc_id: String,
    pub sha256: String,
    pub page_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestCounts {
    pub document_count: usize,
    pub page_count: usize,
    pub blob_document_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub generated_at: String,
    pub source_dir: String,
    pub db_path: String,
    pub counts: IngestCounts,
    pub source_hashes: Vec<SourceEntry>,
    pub warnings: Vec<String>,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitManifest {
    pub manifest_version: u32,
    pub generated_at: String,
    pub pages_per_chunk: usize,
    pub max_chars_per_chunk: usize,
    pub split: SplitReport,
}

/// Caller-held phase-2 state: replayed into `synthesize` together with the
/// original inputs. Chunk order is preserved in `partial_results`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartialResultsManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub generated_at: String,
    pub split: SplitReport,
    pub partial_results: Vec<CaseAnalysis>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub generated_at: String,
    pub payload_degraded: bool,
    pub analysis: CaseAnalysis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocClassification {
    pub doc_id: String,
    pub page_count: usize,
    pub auto_classified_pages: usize,
    pub degraded_pages: usize,
    pub sections: Vec<EvidenceSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifyRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub generated_at: String,
    pub documents: Vec<DocClassification>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationManifest {
    pub manifest_version: u32,
    pub generated_at: String,
    pub doc_id: String,
    pub analysis_path: String,
    pub report: VerificationReport,
}
