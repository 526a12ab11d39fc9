//! Write rules shared by every backend.
//!
//! Both stores call these so that a fact or pattern ends up identical no
//! matter where it is persisted.

use chrono::{DateTime, Utc};
use taskforge_core::knowledge::{
    CapabilityRecord, FactDraft, FactRecord, PatternDraft, PatternRecord, Provenance, VerifiedFact,
};
use uuid::Uuid;

pub(crate) fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// A seeded fact. Callers only insert it when the key is absent.
pub(crate) fn seeded_fact(draft: FactDraft, confidence: f64, now: DateTime<Utc>) -> FactRecord {
    FactRecord {
        id: new_id(),
        key: draft.key,
        category: draft.category,
        value: draft.value,
        source: if draft.source.is_empty() { "seed".into() } else { draft.source },
        provenance: Provenance::Seeded,
        confidence: confidence.clamp(0.0, 1.0),
        created_at: now,
        updated_at: now,
    }
}

/// Apply a verified fact. The value is replaced and confidence pinned at 1.0.
pub(crate) fn verified_fact(existing: Option<&FactRecord>, fact: &VerifiedFact, now: DateTime<Utc>) -> FactRecord {
    FactRecord {
        id: existing.map(|e| e.id.clone()).unwrap_or_else(new_id),
        key: fact.key().to_string(),
        category: fact.category().to_string(),
        value: fact.value().to_string(),
        source: fact.source().to_string(),
        provenance: Provenance::VerifiedExecution,
        confidence: VerifiedFact::CONFIDENCE,
        created_at: existing.map(|e| e.created_at).unwrap_or(now),
        updated_at: now,
    }
}

/// Confidence of every record written by approving a lesson.
pub(crate) const APPROVAL_CONFIDENCE: f64 = 1.0;

/// Apply an approved fact lesson. The lesson's value always lands; an
/// existing record for the key keeps its id and creation time.
pub(crate) fn approved_fact(existing: Option<&FactRecord>, draft: &FactDraft, now: DateTime<Utc>) -> FactRecord {
    FactRecord {
        id: existing.map(|e| e.id.clone()).unwrap_or_else(new_id),
        key: draft.key.clone(),
        category: draft.category.clone(),
        value: draft.value.clone(),
        source: if draft.source.is_empty() { "lesson".into() } else { draft.source.clone() },
        provenance: Provenance::ApprovedLesson,
        confidence: APPROVAL_CONFIDENCE,
        created_at: existing.map(|e| e.created_at).unwrap_or(now),
        updated_at: now,
    }
}

/// Apply an approved pattern lesson; the usage counter survives.
pub(crate) fn approved_pattern(existing: Option<&PatternRecord>, draft: &PatternDraft, now: DateTime<Utc>) -> PatternRecord {
    PatternRecord {
        id: existing.map(|e| e.id.clone()).unwrap_or_else(new_id),
        name: draft.name.clone(),
        tags: draft.tags.clone(),
        approach: draft.approach.clone(),
        confidence: APPROVAL_CONFIDENCE,
        usage_count: existing.map(|e| e.usage_count).unwrap_or(0),
        provenance: Provenance::ApprovedLesson,
        created_at: existing.map(|e| e.created_at).unwrap_or(now),
    }
}

/// A fresh capability record for a tool's first observation.
pub(crate) fn new_capability(tool: &str, now: DateTime<Utc>) -> CapabilityRecord {
    CapabilityRecord {
        tool: tool.to_string(),
        total_calls: 0,
        successes: 0,
        last_failure: None,
        provenance: Provenance::Calibration,
        created_at: now,
        updated_at: now,
    }
}
