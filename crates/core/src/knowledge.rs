//! Knowledge store: records, trust tiers, and the storage trait.
//!
//! The store holds five record collections (tools, facts, patterns, output
//! formats, capability statistics) plus a queue of pending lessons. It makes
//! no decisions; the orchestrator is its only writer.
//!
//! Writes come in three trust tiers, each with its own type:
//! - [`Observation`]: raw per-call outcome, updates capability counters only.
//! - [`VerifiedFact`]: a value copied literally out of a tool output; it can
//!   only be built by checking it against those outputs.
//! - [`Lesson`]: anything inferred by the model. Lessons never self-apply;
//!   they sit in the pending queue until approved.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::error::{RecordKind, StoreError};
use crate::execution::ToolOutput;

/// Where a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Seeded,
    VerifiedExecution,
    ApprovedLesson,
    Calibration,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Seeded => "seeded",
            Self::VerifiedExecution => "verified_execution",
            Self::ApprovedLesson => "approved_lesson",
            Self::Calibration => "calibration",
        }
    }
}

impl std::str::FromStr for Provenance {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "seeded" => Ok(Self::Seeded),
            "verified_execution" => Ok(Self::VerifiedExecution),
            "approved_lesson" => Ok(Self::ApprovedLesson),
            "calibration" => Ok(Self::Calibration),
            other => Err(format!("unknown provenance '{other}'")),
        }
    }
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Records ────────────────────────────────────────────────────────────────

/// How a tool record is backed at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolImpl {
    /// Implemented in Rust and registered at startup under the record's name.
    Registered,
    /// A forged WebAssembly module (text format), re-hydrated on startup.
    Wasm { module: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// One-line capability summary
    pub summary: String,
    pub input_schema: serde_json::Value,
    pub implementation: ToolImpl,
    pub provenance: Provenance,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactRecord {
    pub id: String,
    pub key: String,
    pub category: String,
    pub value: String,
    /// Who or what asserted the value (a tool name, "environment_scan", ...)
    pub source: String,
    pub provenance: Provenance,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FactRecord {
    /// The form handed to the execution unit as a context line.
    pub fn context_line(&self) -> String {
        format!("{} = {}", self.key, self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub approach: String,
    pub confidence: f64,
    pub usage_count: u64,
    pub provenance: Provenance,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatRecord {
    pub id: String,
    pub name: String,
    pub schema: serde_json::Value,
    pub provenance: Provenance,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityRecord {
    pub tool: String,
    pub total_calls: u64,
    pub successes: u64,
    #[serde(default)]
    pub last_failure: Option<String>,
    #[serde(default = "calibration")]
    pub provenance: Provenance,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn calibration() -> Provenance {
    Provenance::Calibration
}

impl CapabilityRecord {
    /// successes / total_calls, or `None` below the minimum sample size.
    pub fn reliability(&self, min_sample_size: u64) -> Option<f64> {
        if self.total_calls == 0 || self.total_calls < min_sample_size {
            return None;
        }
        Some(self.successes as f64 / self.total_calls as f64)
    }
}

/// Longest failure summary kept on a capability record.
pub const FAILURE_SUMMARY_MAX_CHARS: usize = 120;

// ── Trust tiers ────────────────────────────────────────────────────────────

/// Outcome of one tool call as classified by the calibrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub tool: String,
    pub outcome: CallOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CallOutcome {
    Success,
    Failure { summary: String },
}

impl Observation {
    pub fn success(tool: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            outcome: CallOutcome::Success,
        }
    }

    pub fn failure(tool: impl Into<String>, summary: &str) -> Self {
        Self {
            tool: tool.into(),
            outcome: CallOutcome::Failure {
                summary: summary.chars().take(FAILURE_SUMMARY_MAX_CHARS).collect(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, CallOutcome::Success)
    }
}

/// A fact whose value appears literally in a successful tool output.
///
/// Fields are private: the only way to get one is [`VerifiedFact::extract`],
/// which checks the value against the outputs it claims to come from.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedFact {
    key: String,
    category: String,
    value: String,
    source: String,
}

impl VerifiedFact {
    /// Confidence of every verified fact.
    pub const CONFIDENCE: f64 = 1.0;

    /// Accept `value` only if it is a non-empty substring of the result of
    /// some successful entry in `outputs`. The source is that entry's tool.
    pub fn extract(
        key: &str,
        category: &str,
        value: &str,
        outputs: &[ToolOutput],
    ) -> Option<Self> {
        let key = key.trim();
        if key.is_empty() || value.is_empty() {
            return None;
        }
        let origin = outputs
            .iter()
            .find(|o| !o.is_error && o.result.contains(value))?;
        Some(Self {
            key: key.to_string(),
            category: if category.trim().is_empty() {
                "general".to_string()
            } else {
                category.trim().to_string()
            },
            value: value.to_string(),
            source: origin.tool.clone(),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Fact content carried by a lesson or a seed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactDraft {
    pub key: String,
    #[serde(default = "default_category")]
    pub category: String,
    pub value: String,
    #[serde(default)]
    pub source: String,
}

fn default_category() -> String {
    "general".to_string()
}

/// Pattern content carried by a lesson.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternDraft {
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub approach: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LessonKind {
    NewFact,
    Correction,
    NewPattern,
}

impl LessonKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewFact => "new_fact",
            Self::Correction => "correction",
            Self::NewPattern => "new_pattern",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum LessonContent {
    Fact(FactDraft),
    Pattern(PatternDraft),
}

/// A proposed knowledge write awaiting review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lesson {
    kind: LessonKind,
    content: LessonContent,
    confidence: f64,
}

impl Lesson {
    /// A new fact, or a correction of an existing fact's value.
    pub fn fact(correction: bool, draft: FactDraft, confidence: f64) -> Self {
        Self {
            kind: if correction { LessonKind::Correction } else { LessonKind::NewFact },
            content: LessonContent::Fact(draft),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    pub fn pattern(draft: PatternDraft, confidence: f64) -> Self {
        Self {
            kind: LessonKind::NewPattern,
            content: LessonContent::Pattern(draft),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    pub fn kind(&self) -> LessonKind {
        self.kind
    }

    pub fn content(&self) -> &LessonContent {
        &self.content
    }

    /// Used only to order the review queue.
    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn target(&self) -> RecordKind {
        match self.content {
            LessonContent::Fact(_) => RecordKind::Fact,
            LessonContent::Pattern(_) => RecordKind::Pattern,
        }
    }

    /// Rebuild a lesson read back from storage, rejecting a kind that does
    /// not match its content.
    pub fn from_parts(
        kind: LessonKind,
        content: LessonContent,
        confidence: f64,
    ) -> std::result::Result<Self, String> {
        let consistent = matches!(
            (kind, &content),
            (LessonKind::NewFact | LessonKind::Correction, LessonContent::Fact(_))
                | (LessonKind::NewPattern, LessonContent::Pattern(_))
        );
        if !consistent {
            return Err(format!("{} lesson cannot carry this content", kind.as_str()));
        }
        Ok(Self {
            kind,
            content,
            confidence: confidence.clamp(0.0, 1.0),
        })
    }

    /// Short human-readable summary for review listings.
    pub fn summary(&self) -> String {
        match &self.content {
            LessonContent::Fact(f) => format!("{} = {}", f.key, f.value),
            LessonContent::Pattern(p) => format!("{}: {}", p.name, p.approach),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingLesson {
    pub id: String,
    pub lesson: Lesson,
    pub created_at: DateTime<Utc>,
}

/// The record an approved lesson turned into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApprovedRecord {
    Fact(FactRecord),
    Pattern(PatternRecord),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub tools: usize,
    pub facts: usize,
    pub patterns: usize,
    pub formats: usize,
    pub capabilities: usize,
    pub pending_lessons: usize,
}

// ── Snapshot & compact indices ─────────────────────────────────────────────

/// A point-in-time copy of the store used for planning and assembly.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeSnapshot {
    pub tools: Vec<ToolRecord>,
    pub facts: Vec<FactRecord>,
    pub patterns: Vec<PatternRecord>,
    pub formats: Vec<FormatRecord>,
    pub capabilities: Vec<CapabilityRecord>,
}

impl KnowledgeSnapshot {
    /// Resolve a tool by record id or by name.
    pub fn tool(&self, id: &str) -> Option<&ToolRecord> {
        self.tools.iter().find(|t| t.id == id || t.name == id)
    }

    /// Resolve a fact by record id or by key.
    pub fn fact(&self, id: &str) -> Option<&FactRecord> {
        self.facts
            .iter()
            .find(|f| f.id == id)
            .or_else(|| self.facts.iter().find(|f| f.key == id))
    }

    pub fn format(&self, name: &str) -> Option<&FormatRecord> {
        self.formats.iter().find(|f| f.name == name)
    }

    /// One line per tool: `name [tags]: summary`.
    pub fn tool_index(&self) -> Vec<String> {
        self.tools
            .iter()
            .map(|t| {
                if t.tags.is_empty() {
                    format!("{}: {}", t.name, t.summary)
                } else {
                    format!("{} [{}]: {}", t.name, t.tags.join(", "), t.summary)
                }
            })
            .collect()
    }

    /// One line per fact: `id | key = value preview`.
    pub fn fact_index(&self, preview_chars: usize) -> Vec<String> {
        self.facts
            .iter()
            .map(|f| {
                let mut preview: String = f.value.chars().take(preview_chars).collect();
                if f.value.chars().count() > preview_chars {
                    preview.push_str("...");
                }
                format!("{} | {} = {}", f.id, f.key, preview.replace('\n', " "))
            })
            .collect()
    }

    /// Patterns sharing at least one tag with the words of the objective,
    /// most confident first.
    pub fn pattern_matches(&self, objective: &str) -> Vec<&PatternRecord> {
        let words: Vec<String> = objective
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|w| !w.is_empty())
            .map(|w| w.to_lowercase())
            .collect();
        let mut hits: Vec<&PatternRecord> = self
            .patterns
            .iter()
            .filter(|p| p.tags.iter().any(|t| words.contains(&t.to_lowercase())))
            .collect();
        hits.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        hits
    }

    /// Tools with at least `min_calls` observations, least reliable first.
    pub fn capability_profile(&self, min_calls: u64) -> Vec<(&CapabilityRecord, f64)> {
        let mut profile: Vec<(&CapabilityRecord, f64)> = self
            .capabilities
            .iter()
            .filter_map(|c| c.reliability(min_calls).map(|r| (c, r)))
            .collect();
        profile.sort_by(|a, b| a.1.total_cmp(&b.1));
        profile
    }
}

// ── Storage trait ──────────────────────────────────────────────────────────

/// Persistent storage for the five record collections and the lesson queue.
///
/// Implementations must allow concurrent readers and keep each record write
/// atomic. Capability counters are increments, so interleaved updates from
/// independent orchestrators are safe.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Backend name, for logs and `doctor`.
    fn name(&self) -> &str;

    // tools
    async fn upsert_tool(&self, record: ToolRecord) -> std::result::Result<(), StoreError>;
    async fn tools(&self) -> std::result::Result<Vec<ToolRecord>, StoreError>;

    // facts
    /// Insert a seeded fact unless the key already exists. Returns whether it was inserted.
    async fn seed_fact(&self, draft: FactDraft, confidence: f64) -> std::result::Result<bool, StoreError>;
    async fn put_verified_fact(&self, fact: VerifiedFact) -> std::result::Result<FactRecord, StoreError>;
    async fn facts(&self) -> std::result::Result<Vec<FactRecord>, StoreError>;

    // patterns
    async fn patterns(&self) -> std::result::Result<Vec<PatternRecord>, StoreError>;
    async fn touch_pattern(&self, name: &str) -> std::result::Result<(), StoreError>;

    // formats
    async fn upsert_format(
        &self,
        name: &str,
        schema: serde_json::Value,
        provenance: Provenance,
    ) -> std::result::Result<(), StoreError>;
    async fn formats(&self) -> std::result::Result<Vec<FormatRecord>, StoreError>;

    // capabilities
    async fn record_observation(&self, observation: &Observation) -> std::result::Result<CapabilityRecord, StoreError>;
    async fn capabilities(&self) -> std::result::Result<Vec<CapabilityRecord>, StoreError>;

    // lessons
    async fn enqueue_lesson(&self, lesson: Lesson) -> std::result::Result<PendingLesson, StoreError>;
    /// Pending lessons, highest confidence first, then oldest first.
    async fn pending_lessons(&self) -> std::result::Result<Vec<PendingLesson>, StoreError>;
    /// Convert the lesson into its record unchanged and remove it from the queue.
    async fn approve_lesson(&self, id: &str) -> std::result::Result<ApprovedRecord, StoreError>;
    async fn dismiss_lesson(&self, id: &str) -> std::result::Result<(), StoreError>;

    async fn approve_all(&self) -> std::result::Result<Vec<ApprovedRecord>, StoreError> {
        let mut approved = Vec::new();
        for pending in self.pending_lessons().await? {
            approved.push(self.approve_lesson(&pending.id).await?);
        }
        Ok(approved)
    }

    async fn dismiss_all(&self) -> std::result::Result<usize, StoreError> {
        let pending = self.pending_lessons().await?;
        for lesson in &pending {
            self.dismiss_lesson(&lesson.id).await?;
        }
        Ok(pending.len())
    }

    async fn capability(&self, tool: &str) -> std::result::Result<Option<CapabilityRecord>, StoreError> {
        Ok(self.capabilities().await?.into_iter().find(|c| c.tool == tool))
    }

    async fn fact_by_key(&self, key: &str) -> std::result::Result<Option<FactRecord>, StoreError> {
        Ok(self.facts().await?.into_iter().find(|f| f.key == key))
    }

    async fn snapshot(&self) -> std::result::Result<KnowledgeSnapshot, StoreError> {
        Ok(KnowledgeSnapshot {
            tools: self.tools().await?,
            facts: self.facts().await?,
            patterns: self.patterns().await?,
            formats: self.formats().await?,
            capabilities: self.capabilities().await?,
        })
    }

    async fn stats(&self) -> std::result::Result<StoreStats, StoreError> {
        Ok(StoreStats {
            tools: self.tools().await?.len(),
            facts: self.facts().await?.len(),
            patterns: self.patterns().await?.len(),
            formats: self.formats().await?.len(),
            capabilities: self.capabilities().await?.len(),
            pending_lessons: self.pending_lessons().await?.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(tool: &str, result: &str, is_error: bool) -> ToolOutput {
        ToolOutput {
            tool: tool.into(),
            arguments: serde_json::json!({}),
            result: result.into(),
            is_error,
        }
    }

    #[test]
    fn reliability_undefined_below_sample_size() {
        let now = Utc::now();
        let cap = CapabilityRecord {
            tool: "shell".into(),
            total_calls: 1,
            successes: 1,
            last_failure: None,
            provenance: Provenance::Calibration,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(cap.reliability(2), None);
        assert_eq!(cap.reliability(1), Some(1.0));
    }

    #[test]
    fn verified_fact_requires_literal_substring() {
        let outputs = vec![output("list_directory", "a.txt\nb.txt", false)];
        let fact = VerifiedFact::extract("tmp_contents", "filesystem", "a.txt\nb.txt", &outputs).unwrap();
        assert_eq!(fact.value(), "a.txt\nb.txt");
        assert_eq!(fact.source(), "list_directory");

        assert!(VerifiedFact::extract("tmp_contents", "filesystem", "c.txt", &outputs).is_none());
    }

    #[test]
    fn verified_fact_never_comes_from_empty_outputs() {
        assert!(VerifiedFact::extract("anything", "general", "x", &[]).is_none());
    }

    #[test]
    fn verified_fact_ignores_error_outputs() {
        let outputs = vec![output("shell", "Error: permission denied", true)];
        assert!(VerifiedFact::extract("err", "general", "permission denied", &outputs).is_none());
    }

    #[test]
    fn lesson_parts_must_agree() {
        let draft = PatternDraft {
            name: "list_then_read".into(),
            tags: vec!["files".into()],
            approach: "list the directory before reading".into(),
        };
        assert!(Lesson::from_parts(LessonKind::NewFact, LessonContent::Pattern(draft.clone()), 0.5).is_err());
        let lesson = Lesson::from_parts(LessonKind::NewPattern, LessonContent::Pattern(draft), 0.5).unwrap();
        assert_eq!(lesson.target(), RecordKind::Pattern);
    }

    #[test]
    fn observation_truncates_failure_summary() {
        let long = "x".repeat(500);
        let obs = Observation::failure("shell", &long);
        match obs.outcome {
            CallOutcome::Failure { summary } => assert_eq!(summary.chars().count(), FAILURE_SUMMARY_MAX_CHARS),
            CallOutcome::Success => panic!("expected failure"),
        }
    }

    #[test]
    fn snapshot_resolves_fact_by_id_or_key() {
        let now = Utc::now();
        let snapshot = KnowledgeSnapshot {
            facts: vec![FactRecord {
                id: "f1".into(),
                key: "os_name".into(),
                category: "environment".into(),
                value: "linux".into(),
                source: "environment_scan".into(),
                provenance: Provenance::Seeded,
                confidence: 0.9,
                created_at: now,
                updated_at: now,
            }],
            ..Default::default()
        };
        assert!(snapshot.fact("f1").is_some());
        assert!(snapshot.fact("os_name").is_some());
        assert!(snapshot.fact("nope").is_none());
    }

    #[test]
    fn pattern_matches_by_tag() {
        let now = Utc::now();
        let pattern = |name: &str, tag: &str, confidence: f64| PatternRecord {
            id: name.into(),
            name: name.into(),
            tags: vec![tag.into()],
            approach: "...".into(),
            confidence,
            usage_count: 0,
            provenance: Provenance::ApprovedLesson,
            created_at: now,
        };
        let snapshot = KnowledgeSnapshot {
            patterns: vec![pattern("low", "files", 0.2), pattern("high", "files", 0.9), pattern("net", "http", 1.0)],
            ..Default::default()
        };
        let hits = snapshot.pattern_matches("list Files in /tmp");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].name, "high");
    }

    #[test]
    fn capability_profile_sorts_least_reliable_first() {
        let now = Utc::now();
        let cap = |tool: &str, total, ok| CapabilityRecord {
            tool: tool.into(),
            total_calls: total,
            successes: ok,
            last_failure: None,
            provenance: Provenance::Calibration,
            created_at: now,
            updated_at: now,
        };
        let snapshot = KnowledgeSnapshot {
            capabilities: vec![cap("a", 4, 4), cap("b", 4, 1), cap("c", 1, 0)],
            ..Default::default()
        };
        let profile = snapshot.capability_profile(2);
        assert_eq!(profile.len(), 2);
        assert_eq!(profile[0].0.tool, "b");
    }
}
