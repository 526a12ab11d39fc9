//! In-memory store: useful for tests and throwaway sessions.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use taskforge_core::error::{RecordKind, StoreError};
use taskforge_core::knowledge::*;
use tokio::sync::RwLock;

use crate::records;

#[derive(Default)]
struct Collections {
    tools: BTreeMap<String, ToolRecord>,
    facts: BTreeMap<String, FactRecord>,
    patterns: BTreeMap<String, PatternRecord>,
    formats: BTreeMap<String, FormatRecord>,
    capabilities: BTreeMap<String, CapabilityRecord>,
    lessons: Vec<PendingLesson>,
}

/// Every collection sits behind one `RwLock`: readers run concurrently and
/// each write holds the lock for exactly one record change.
pub struct InMemoryStore {
    inner: Arc<RwLock<Collections>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Collections::default())),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KnowledgeStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn upsert_tool(&self, mut record: ToolRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner.tools.get(&record.name) {
            record.id = existing.id.clone();
            record.created_at = existing.created_at;
            record.provenance = existing.provenance;
        }
        inner.tools.insert(record.name.clone(), record);
        Ok(())
    }

    async fn tools(&self) -> Result<Vec<ToolRecord>, StoreError> {
        Ok(self.inner.read().await.tools.values().cloned().collect())
    }

    async fn seed_fact(&self, draft: FactDraft, confidence: f64) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        if inner.facts.contains_key(&draft.key) {
            return Ok(false);
        }
        let record = records::seeded_fact(draft, confidence, Utc::now());
        inner.facts.insert(record.key.clone(), record);
        Ok(true)
    }

    async fn put_verified_fact(&self, fact: VerifiedFact) -> Result<FactRecord, StoreError> {
        let mut inner = self.inner.write().await;
        let record = records::verified_fact(inner.facts.get(fact.key()), &fact, Utc::now());
        inner.facts.insert(record.key.clone(), record.clone());
        Ok(record)
    }

    async fn facts(&self) -> Result<Vec<FactRecord>, StoreError> {
        Ok(self.inner.read().await.facts.values().cloned().collect())
    }

    async fn patterns(&self) -> Result<Vec<PatternRecord>, StoreError> {
        Ok(self.inner.read().await.patterns.values().cloned().collect())
    }

    async fn touch_pattern(&self, name: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let pattern = inner.patterns.get_mut(name).ok_or_else(|| StoreError::NotFound {
            kind: RecordKind::Pattern,
            id: name.to_string(),
        })?;
        pattern.usage_count += 1;
        Ok(())
    }

    async fn upsert_format(
        &self,
        name: &str,
        schema: serde_json::Value,
        provenance: Provenance,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        match inner.formats.get_mut(name) {
            Some(existing) => existing.schema = schema,
            None => {
                inner.formats.insert(
                    name.to_string(),
                    FormatRecord {
                        id: records::new_id(),
                        name: name.to_string(),
                        schema,
                        provenance,
                        created_at: Utc::now(),
                    },
                );
            }
        }
        Ok(())
    }

    async fn formats(&self) -> Result<Vec<FormatRecord>, StoreError> {
        Ok(self.inner.read().await.formats.values().cloned().collect())
    }

    async fn record_observation(&self, observation: &Observation) -> Result<CapabilityRecord, StoreError> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        let record = inner
            .capabilities
            .entry(observation.tool.clone())
            .or_insert_with(|| records::new_capability(&observation.tool, now));
        record.total_calls += 1;
        match &observation.outcome {
            CallOutcome::Success => {
                record.successes += 1;
                record.last_failure = None;
            }
            CallOutcome::Failure { summary } => record.last_failure = Some(summary.clone()),
        }
        record.updated_at = now;
        Ok(record.clone())
    }

    async fn capabilities(&self) -> Result<Vec<CapabilityRecord>, StoreError> {
        Ok(self.inner.read().await.capabilities.values().cloned().collect())
    }

    async fn enqueue_lesson(&self, lesson: Lesson) -> Result<PendingLesson, StoreError> {
        let pending = PendingLesson {
            id: records::new_id(),
            lesson,
            created_at: Utc::now(),
        };
        self.inner.write().await.lessons.push(pending.clone());
        Ok(pending)
    }

    async fn pending_lessons(&self) -> Result<Vec<PendingLesson>, StoreError> {
        let mut lessons = self.inner.read().await.lessons.clone();
        lessons.sort_by(|a, b| {
            b.lesson
                .confidence()
                .total_cmp(&a.lesson.confidence())
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(lessons)
    }

    async fn approve_lesson(&self, id: &str) -> Result<ApprovedRecord, StoreError> {
        let mut inner = self.inner.write().await;
        let position = inner
            .lessons
            .iter()
            .position(|l| l.id == id)
            .ok_or_else(|| StoreError::NotFound {
                kind: RecordKind::Lesson,
                id: id.to_string(),
            })?;
        let pending = inner.lessons.remove(position);
        let now = Utc::now();

        let approved = match pending.lesson.content() {
            LessonContent::Fact(draft) => {
                let record = records::approved_fact(inner.facts.get(&draft.key), draft, now);
                inner.facts.insert(record.key.clone(), record.clone());
                ApprovedRecord::Fact(record)
            }
            LessonContent::Pattern(draft) => {
                let record = records::approved_pattern(inner.patterns.get(&draft.name), draft, now);
                inner.patterns.insert(record.name.clone(), record.clone());
                ApprovedRecord::Pattern(record)
            }
        };
        Ok(approved)
    }

    async fn dismiss_lesson(&self, id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let before = inner.lessons.len();
        inner.lessons.retain(|l| l.id != id);
        if inner.lessons.len() == before {
            return Err(StoreError::NotFound {
                kind: RecordKind::Lesson,
                id: id.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskforge_core::execution::ToolOutput;

    fn fact_lesson(key: &str, value: &str) -> Lesson {
        Lesson::fact(
            false,
            FactDraft {
                key: key.into(),
                category: "general".into(),
                value: value.into(),
                source: String::new(),
            },
            0.6,
        )
    }

    #[tokio::test]
    async fn observation_counters_are_monotonic() {
        let store = InMemoryStore::new();
        store.record_observation(&Observation::success("shell")).await.unwrap();
        store
            .record_observation(&Observation::failure("shell", "Error: permission denied"))
            .await
            .unwrap();
        let cap = store.record_observation(&Observation::success("shell")).await.unwrap();
        assert_eq!(cap.total_calls, 3);
        assert_eq!(cap.successes, 2);
        assert!(cap.last_failure.is_none());
        assert!(cap.successes <= cap.total_calls);
        assert_eq!(cap.provenance, Provenance::Calibration);
    }

    #[tokio::test]
    async fn failure_summary_is_kept_until_success() {
        let store = InMemoryStore::new();
        let cap = store
            .record_observation(&Observation::failure("file_read", "not found: /nope"))
            .await
            .unwrap();
        assert_eq!(cap.last_failure.as_deref(), Some("not found: /nope"));
    }

    #[tokio::test]
    async fn seed_fact_does_not_overwrite() {
        let store = InMemoryStore::new();
        let draft = |v: &str| FactDraft {
            key: "shell".into(),
            category: "environment".into(),
            value: v.into(),
            source: "environment_scan".into(),
        };
        assert!(store.seed_fact(draft("/bin/bash"), 0.9).await.unwrap());
        assert!(!store.seed_fact(draft("/bin/zsh"), 0.9).await.unwrap());
        let fact = store.fact_by_key("shell").await.unwrap().unwrap();
        assert_eq!(fact.value, "/bin/bash");
        assert_eq!(fact.provenance, Provenance::Seeded);
    }

    #[tokio::test]
    async fn verified_fact_is_written_at_full_confidence() {
        let store = InMemoryStore::new();
        let outputs = vec![ToolOutput {
            tool: "list_directory".into(),
            arguments: serde_json::json!({"path": "/tmp"}),
            result: "a.txt\nb.txt".into(),
            is_error: false,
        }];
        let fact = VerifiedFact::extract("tmp_contents", "filesystem", "a.txt\nb.txt", &outputs).unwrap();
        let record = store.put_verified_fact(fact).await.unwrap();
        assert_eq!(record.confidence, 1.0);
        assert_eq!(record.provenance, Provenance::VerifiedExecution);
        assert_eq!(record.source, "list_directory");
    }

    #[tokio::test]
    async fn lessons_do_not_apply_without_approval() {
        let store = InMemoryStore::new();
        store.enqueue_lesson(fact_lesson("a", "1")).await.unwrap();
        assert!(store.facts().await.unwrap().is_empty());
        assert_eq!(store.pending_lessons().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn approve_all_converts_every_lesson() {
        let store = InMemoryStore::new();
        store.enqueue_lesson(fact_lesson("a", "1")).await.unwrap();
        store.enqueue_lesson(fact_lesson("b", "2")).await.unwrap();
        store
            .enqueue_lesson(Lesson::pattern(
                PatternDraft {
                    name: "retry_with_sudo".into(),
                    tags: vec!["permission".into()],
                    approach: "ask before escalating".into(),
                },
                0.3,
            ))
            .await
            .unwrap();

        let approved = store.approve_all().await.unwrap();
        assert_eq!(approved.len(), 3);
        assert!(store.pending_lessons().await.unwrap().is_empty());
        assert_eq!(store.facts().await.unwrap().len(), 2);
        assert_eq!(store.patterns().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn approving_over_a_seeded_key_writes_the_lesson_value() {
        let store = InMemoryStore::new();
        let seeded = FactDraft {
            key: "os_name".into(),
            category: "environment".into(),
            value: "linux".into(),
            source: "environment_scan".into(),
        };
        store.seed_fact(seeded, 0.9).await.unwrap();
        store
            .enqueue_lesson(Lesson::fact(
                false,
                FactDraft {
                    key: "os_name".into(),
                    category: "environment".into(),
                    value: "freebsd".into(),
                    source: String::new(),
                },
                0.5,
            ))
            .await
            .unwrap();
        store
            .enqueue_lesson(Lesson::pattern(
                PatternDraft {
                    name: "check_uname".into(),
                    tags: vec!["os".into()],
                    approach: "run uname before assuming the platform".into(),
                },
                0.3,
            ))
            .await
            .unwrap();

        let approved = store.approve_all().await.unwrap();
        assert_eq!(approved.len(), 2);
        assert!(store.pending_lessons().await.unwrap().is_empty());

        let fact = store.fact_by_key("os_name").await.unwrap().unwrap();
        assert_eq!(fact.value, "freebsd");
        assert_eq!(fact.provenance, Provenance::ApprovedLesson);
        assert_eq!(fact.confidence, 1.0);
        assert_eq!(approved[0], ApprovedRecord::Fact(fact));

        let patterns = store.patterns().await.unwrap();
        assert_eq!(patterns[0].confidence, 1.0);
    }

    #[tokio::test]
    async fn dismiss_all_writes_nothing() {
        let store = InMemoryStore::new();
        store.enqueue_lesson(fact_lesson("a", "1")).await.unwrap();
        store.enqueue_lesson(fact_lesson("b", "2")).await.unwrap();
        assert_eq!(store.dismiss_all().await.unwrap(), 2);
        assert!(store.pending_lessons().await.unwrap().is_empty());
        assert!(store.facts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn approval_copies_content_unchanged() {
        let store = InMemoryStore::new();
        let pending = store.enqueue_lesson(fact_lesson("docker_socket", "/var/run/docker.sock")).await.unwrap();
        match store.approve_lesson(&pending.id).await.unwrap() {
            ApprovedRecord::Fact(fact) => {
                assert_eq!(fact.key, "docker_socket");
                assert_eq!(fact.value, "/var/run/docker.sock");
                assert_eq!(fact.provenance, Provenance::ApprovedLesson);
            }
            other => panic!("expected a fact, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_lesson_is_not_found() {
        let store = InMemoryStore::new();
        assert!(matches!(
            store.approve_lesson("missing").await.unwrap_err(),
            StoreError::NotFound { kind: RecordKind::Lesson, .. }
        ));
        assert!(store.dismiss_lesson("missing").await.is_err());
    }

    #[tokio::test]
    async fn pending_lessons_sorted_by_confidence() {
        let store = InMemoryStore::new();
        store
            .enqueue_lesson(Lesson::fact(
                false,
                FactDraft { key: "low".into(), category: "g".into(), value: "x".into(), source: String::new() },
                0.1,
            ))
            .await
            .unwrap();
        store
            .enqueue_lesson(Lesson::fact(
                false,
                FactDraft { key: "high".into(), category: "g".into(), value: "y".into(), source: String::new() },
                0.9,
            ))
            .await
            .unwrap();
        let pending = store.pending_lessons().await.unwrap();
        assert_eq!(pending[0].lesson.summary(), "high = y");
    }

    #[tokio::test]
    async fn touch_pattern_requires_existing_pattern() {
        let store = InMemoryStore::new();
        assert!(store.touch_pattern("nope").await.is_err());
    }
}
