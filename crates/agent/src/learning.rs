//! The three knowledge-write paths, one per trust tier.
//!
//! - [`calibrate`]: raw observations → capability counters. No review.
//! - [`record_verified_facts`]: model-proposed facts, kept only when the
//!   value is a literal substring of a tool output the calibrator counts as
//!   a success. No review.
//! - [`enqueue_lessons`]: anything inferred → the pending queue. Never
//!   applied until approved.
//!
//! The tiers are separate types ([`Observation`], [`VerifiedFact`],
//! [`Lesson`]) so a lesson can't be written as a fact by accident.

use serde::{Deserialize, Serialize};
use taskforge_core::error::StoreError;
use taskforge_core::execution::ToolOutput;
use taskforge_core::knowledge::{FactRecord, KnowledgeStore, Lesson, Observation, PendingLesson, VerifiedFact};
use tracing::{debug, info};

use crate::calibrator::ErrorClassifier;

/// A fact the model claims to have seen in the tool outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactCandidate {
    pub key: String,
    #[serde(default)]
    pub category: String,
    pub value: String,
}

/// Apply every observation to the capability counters.
pub async fn calibrate(store: &dyn KnowledgeStore, observations: &[Observation]) -> Result<usize, StoreError> {
    for observation in observations {
        let record = store.record_observation(observation).await?;
        debug!(
            tool = %record.tool,
            total_calls = record.total_calls,
            successes = record.successes,
            "Calibrated"
        );
    }
    Ok(observations.len())
}

/// Write the candidates that check out against `outputs` as verified facts.
///
/// Outputs the classifier marks as failures are set aside first, so a fact
/// can't come from text the capability counters recorded as an error.
/// Candidates whose value does not appear literally in what remains are
/// dropped. With no outputs nothing is ever written.
pub async fn record_verified_facts(
    store: &dyn KnowledgeStore,
    classifier: &ErrorClassifier,
    candidates: &[FactCandidate],
    outputs: &[ToolOutput],
) -> Result<Vec<FactRecord>, StoreError> {
    let successful: Vec<ToolOutput> = outputs.iter().filter(|o| !classifier.is_failure(o)).cloned().collect();
    let mut written = Vec::new();
    for candidate in candidates {
        let Some(fact) = VerifiedFact::extract(&candidate.key, &candidate.category, &candidate.value, &successful)
        else {
            debug!(key = %candidate.key, "Dropped fact not found verbatim in tool output");
            continue;
        };
        written.push(store.put_verified_fact(fact).await?);
    }
    if !written.is_empty() {
        info!(count = written.len(), "Wrote execution-verified facts");
    }
    Ok(written)
}

/// Queue inferred lessons for review.
pub async fn enqueue_lessons(store: &dyn KnowledgeStore, lessons: Vec<Lesson>) -> Result<Vec<PendingLesson>, StoreError> {
    let mut queued = Vec::with_capacity(lessons.len());
    for lesson in lessons {
        queued.push(store.enqueue_lesson(lesson).await?);
    }
    if !queued.is_empty() {
        info!(count = queued.len(), "Queued lessons for review");
    }
    Ok(queued)
}
