//! SQLite knowledge store.
//!
//! One table per record collection plus `pending_lessons`. Every write is a
//! single statement or a single transaction, so a record is never observed
//! half-written. Capability counters are incremented in SQL.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use taskforge_core::error::{RecordKind, StoreError};
use taskforge_core::knowledge::*;
use tracing::{debug, info};

use crate::records;

pub struct SqliteStore {
    pool: SqlitePool,
}

const MIGRATIONS: &[(&str, &str)] = &[
    (
        "tools table",
        r#"
        CREATE TABLE IF NOT EXISTS tools (
            id             TEXT PRIMARY KEY,
            name           TEXT UNIQUE NOT NULL,
            tags           TEXT NOT NULL DEFAULT '[]',
            summary        TEXT NOT NULL,
            input_schema   TEXT NOT NULL,
            implementation TEXT NOT NULL,
            provenance     TEXT NOT NULL,
            created_at     TEXT NOT NULL
        )
        "#,
    ),
    (
        "facts table",
        r#"
        CREATE TABLE IF NOT EXISTS facts (
            id          TEXT PRIMARY KEY,
            key         TEXT UNIQUE NOT NULL,
            category    TEXT NOT NULL,
            value       TEXT NOT NULL,
            source      TEXT NOT NULL,
            provenance  TEXT NOT NULL,
            confidence  REAL NOT NULL,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        )
        "#,
    ),
    (
        "patterns table",
        r#"
        CREATE TABLE IF NOT EXISTS patterns (
            id           TEXT PRIMARY KEY,
            name         TEXT UNIQUE NOT NULL,
            tags         TEXT NOT NULL DEFAULT '[]',
            approach     TEXT NOT NULL,
            confidence   REAL NOT NULL,
            usage_count  INTEGER NOT NULL DEFAULT 0,
            provenance   TEXT NOT NULL,
            created_at   TEXT NOT NULL
        )
        "#,
    ),
    (
        "formats table",
        r#"
        CREATE TABLE IF NOT EXISTS formats (
            id          TEXT PRIMARY KEY,
            name        TEXT UNIQUE NOT NULL,
            schema      TEXT NOT NULL,
            provenance  TEXT NOT NULL,
            created_at  TEXT NOT NULL
        )
        "#,
    ),
    (
        "capabilities table",
        r#"
        CREATE TABLE IF NOT EXISTS capabilities (
            tool          TEXT PRIMARY KEY,
            total_calls   INTEGER NOT NULL DEFAULT 0,
            successes     INTEGER NOT NULL DEFAULT 0,
            last_failure  TEXT,
            provenance    TEXT NOT NULL DEFAULT 'calibration',
            created_at    TEXT NOT NULL,
            updated_at    TEXT NOT NULL,
            CHECK (successes <= total_calls)
        )
        "#,
    ),
    (
        "pending_lessons table",
        r#"
        CREATE TABLE IF NOT EXISTS pending_lessons (
            id          TEXT PRIMARY KEY,
            kind        TEXT NOT NULL,
            content     TEXT NOT NULL,
            confidence  REAL NOT NULL,
            created_at  TEXT NOT NULL
        )
        "#,
    ),
];

impl SqliteStore {
    /// Connect using a SQLite URL such as `sqlite::memory:` or `sqlite://k.db`.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite url: {e}")))?;
        // Each in-memory connection is its own database; keep exactly one.
        let max_connections = if url.contains(":memory:") { 1 } else { 4 };
        Self::with_options(options, max_connections).await
    }

    /// Open (creating if needed) a database file, including its parent directory.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Storage(format!("Cannot create {}: {e}", parent.display())))?;
            }
        }
        let store = Self::with_options(SqliteConnectOptions::new().filename(path), 4).await?;
        info!("SQLite knowledge store initialized at {}", path.display());
        Ok(store)
    }

    async fn with_options(options: SqliteConnectOptions, max_connections: u32) -> Result<Self, StoreError> {
        let options = options
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        for (label, sql) in MIGRATIONS {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::MigrationFailed(format!("{label}: {e}")))?;
        }
        debug!("SQLite migrations complete");
        Ok(())
    }

    async fn fact_row(&self, key: &str) -> Result<Option<FactRecord>, StoreError> {
        let row = sqlx::query("SELECT * FROM facts WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("fact by key: {e}")))?;
        row.as_ref().map(row_to_fact).transpose()
    }
}

// ── Row decoding ───────────────────────────────────────────────────────────

fn column<'r, T>(row: &'r SqliteRow, kind: RecordKind, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name).map_err(|e| StoreError::Corrupt {
        kind,
        reason: format!("{name} column: {e}"),
    })
}

fn json_column<T: serde::de::DeserializeOwned>(row: &SqliteRow, kind: RecordKind, name: &str) -> Result<T, StoreError> {
    let raw: String = column(row, kind, name)?;
    serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt {
        kind,
        reason: format!("{name} json: {e}"),
    })
}

fn time_column(row: &SqliteRow, kind: RecordKind, name: &str) -> Result<DateTime<Utc>, StoreError> {
    let raw: String = column(row, kind, name)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt {
            kind,
            reason: format!("{name} timestamp: {e}"),
        })
}

fn provenance_column(row: &SqliteRow, kind: RecordKind) -> Result<Provenance, StoreError> {
    let raw: String = column(row, kind, "provenance")?;
    Provenance::from_str(&raw).map_err(|reason| StoreError::Corrupt { kind, reason })
}

fn row_to_tool(row: &SqliteRow) -> Result<ToolRecord, StoreError> {
    let kind = RecordKind::Tool;
    Ok(ToolRecord {
        id: column(row, kind, "id")?,
        name: column(row, kind, "name")?,
        tags: json_column(row, kind, "tags")?,
        summary: column(row, kind, "summary")?,
        input_schema: json_column(row, kind, "input_schema")?,
        implementation: json_column(row, kind, "implementation")?,
        provenance: provenance_column(row, kind)?,
        created_at: time_column(row, kind, "created_at")?,
    })
}

fn row_to_fact(row: &SqliteRow) -> Result<FactRecord, StoreError> {
    let kind = RecordKind::Fact;
    Ok(FactRecord {
        id: column(row, kind, "id")?,
        key: column(row, kind, "key")?,
        category: column(row, kind, "category")?,
        value: column(row, kind, "value")?,
        source: column(row, kind, "source")?,
        provenance: provenance_column(row, kind)?,
        confidence: column(row, kind, "confidence")?,
        created_at: time_column(row, kind, "created_at")?,
        updated_at: time_column(row, kind, "updated_at")?,
    })
}

fn row_to_pattern(row: &SqliteRow) -> Result<PatternRecord, StoreError> {
    let kind = RecordKind::Pattern;
    let usage_count: i64 = column(row, kind, "usage_count")?;
    Ok(PatternRecord {
        id: column(row, kind, "id")?,
        name: column(row, kind, "name")?,
        tags: json_column(row, kind, "tags")?,
        approach: column(row, kind, "approach")?,
        confidence: column(row, kind, "confidence")?,
        usage_count: usage_count.max(0) as u64,
        provenance: provenance_column(row, kind)?,
        created_at: time_column(row, kind, "created_at")?,
    })
}

fn row_to_format(row: &SqliteRow) -> Result<FormatRecord, StoreError> {
    let kind = RecordKind::Format;
    Ok(FormatRecord {
        id: column(row, kind, "id")?,
        name: column(row, kind, "name")?,
        schema: json_column(row, kind, "schema")?,
        provenance: provenance_column(row, kind)?,
        created_at: time_column(row, kind, "created_at")?,
    })
}

fn row_to_capability(row: &SqliteRow) -> Result<CapabilityRecord, StoreError> {
    let kind = RecordKind::Capability;
    let total: i64 = column(row, kind, "total_calls")?;
    let successes: i64 = column(row, kind, "successes")?;
    Ok(CapabilityRecord {
        tool: column(row, kind, "tool")?,
        total_calls: total.max(0) as u64,
        successes: successes.max(0) as u64,
        last_failure: column(row, kind, "last_failure")?,
        provenance: provenance_column(row, kind)?,
        created_at: time_column(row, kind, "created_at")?,
        updated_at: time_column(row, kind, "updated_at")?,
    })
}

fn row_to_lesson(row: &SqliteRow) -> Result<PendingLesson, StoreError> {
    let kind = RecordKind::Lesson;
    let id: String = column(row, kind, "id")?;
    let lesson_kind: LessonKind = {
        let raw: String = column(row, kind, "kind")?;
        serde_json::from_value(serde_json::Value::String(raw)).map_err(|e| StoreError::Corrupt {
            kind,
            reason: format!("lesson kind: {e}"),
        })?
    };
    let content: LessonContent = json_column(row, kind, "content")?;
    let confidence: f64 = column(row, kind, "confidence")?;
    let lesson = Lesson::from_parts(lesson_kind, content, confidence)
        .map_err(|reason| StoreError::MalformedLesson { id: id.clone(), reason })?;
    Ok(PendingLesson {
        id,
        lesson,
        created_at: time_column(row, kind, "created_at")?,
    })
}

fn to_json<T: serde::Serialize>(value: &T, kind: RecordKind) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::Corrupt {
        kind,
        reason: format!("serialization: {e}"),
    })
}

// ── Upserts used by both direct writes and lesson approval ─────────────────

async fn write_fact<'e, E>(executor: E, record: &FactRecord) -> Result<(), StoreError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO facts (id, key, category, value, source, provenance, confidence, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ON CONFLICT(key) DO UPDATE SET
            category = excluded.category,
            value = excluded.value,
            source = excluded.source,
            provenance = excluded.provenance,
            confidence = excluded.confidence,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&record.id)
    .bind(&record.key)
    .bind(&record.category)
    .bind(&record.value)
    .bind(&record.source)
    .bind(record.provenance.as_str())
    .bind(record.confidence)
    .bind(record.created_at.to_rfc3339())
    .bind(record.updated_at.to_rfc3339())
    .execute(executor)
    .await
    .map_err(|e| StoreError::Storage(format!("fact upsert: {e}")))?;
    Ok(())
}

async fn write_pattern<'e, E>(executor: E, record: &PatternRecord) -> Result<(), StoreError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO patterns (id, name, tags, approach, confidence, usage_count, provenance, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT(name) DO UPDATE SET
            tags = excluded.tags,
            approach = excluded.approach,
            confidence = excluded.confidence,
            provenance = excluded.provenance
        "#,
    )
    .bind(&record.id)
    .bind(&record.name)
    .bind(to_json(&record.tags, RecordKind::Pattern)?)
    .bind(&record.approach)
    .bind(record.confidence)
    .bind(record.usage_count as i64)
    .bind(record.provenance.as_str())
    .bind(record.created_at.to_rfc3339())
    .execute(executor)
    .await
    .map_err(|e| StoreError::Storage(format!("pattern upsert: {e}")))?;
    Ok(())
}

#[async_trait]
impl KnowledgeStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn upsert_tool(&self, record: ToolRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO tools (id, name, tags, summary, input_schema, implementation, provenance, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(name) DO UPDATE SET
                tags = excluded.tags,
                summary = excluded.summary,
                input_schema = excluded.input_schema,
                implementation = excluded.implementation
            "#,
        )
        .bind(&record.id)
        .bind(&record.name)
        .bind(to_json(&record.tags, RecordKind::Tool)?)
        .bind(&record.summary)
        .bind(to_json(&record.input_schema, RecordKind::Tool)?)
        .bind(to_json(&record.implementation, RecordKind::Tool)?)
        .bind(record.provenance.as_str())
        .bind(record.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("tool upsert: {e}")))?;
        debug!(tool = %record.name, "Stored tool record");
        Ok(())
    }

    async fn tools(&self) -> Result<Vec<ToolRecord>, StoreError> {
        let rows = sqlx::query("SELECT * FROM tools ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("tools: {e}")))?;
        rows.iter().map(row_to_tool).collect()
    }

    async fn seed_fact(&self, draft: FactDraft, confidence: f64) -> Result<bool, StoreError> {
        let record = records::seeded_fact(draft, confidence, Utc::now());
        let result = sqlx::query(
            r#"
            INSERT INTO facts (id, key, category, value, source, provenance, confidence, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
            ON CONFLICT(key) DO NOTHING
            "#,
        )
        .bind(&record.id)
        .bind(&record.key)
        .bind(&record.category)
        .bind(&record.value)
        .bind(&record.source)
        .bind(record.provenance.as_str())
        .bind(record.confidence)
        .bind(record.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("seed fact: {e}")))?;
        Ok(result.rows_affected() > 0)
    }

    async fn put_verified_fact(&self, fact: VerifiedFact) -> Result<FactRecord, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("begin: {e}")))?;
        let existing = sqlx::query("SELECT * FROM facts WHERE key = ?1")
            .bind(fact.key())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("fact by key: {e}")))?;
        let existing = existing.as_ref().map(row_to_fact).transpose()?;
        let record = records::verified_fact(existing.as_ref(), &fact, Utc::now());
        write_fact(&mut *tx, &record).await?;
        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("commit: {e}")))?;
        debug!(key = %record.key, source = %record.source, "Stored verified fact");
        Ok(record)
    }

    async fn facts(&self) -> Result<Vec<FactRecord>, StoreError> {
        let rows = sqlx::query("SELECT * FROM facts ORDER BY key")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("facts: {e}")))?;
        rows.iter().map(row_to_fact).collect()
    }

    async fn fact_by_key(&self, key: &str) -> Result<Option<FactRecord>, StoreError> {
        self.fact_row(key).await
    }

    async fn patterns(&self) -> Result<Vec<PatternRecord>, StoreError> {
        let rows = sqlx::query("SELECT * FROM patterns ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("patterns: {e}")))?;
        rows.iter().map(row_to_pattern).collect()
    }

    async fn touch_pattern(&self, name: &str) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE patterns SET usage_count = usage_count + 1 WHERE name = ?1")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("touch pattern: {e}")))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                kind: RecordKind::Pattern,
                id: name.to_string(),
            });
        }
        Ok(())
    }

    async fn upsert_format(
        &self,
        name: &str,
        schema: serde_json::Value,
        provenance: Provenance,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO formats (id, name, schema, provenance, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(name) DO UPDATE SET schema = excluded.schema
            "#,
        )
        .bind(records::new_id())
        .bind(name)
        .bind(to_json(&schema, RecordKind::Format)?)
        .bind(provenance.as_str())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("format upsert: {e}")))?;
        Ok(())
    }

    async fn formats(&self) -> Result<Vec<FormatRecord>, StoreError> {
        let rows = sqlx::query("SELECT * FROM formats ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("formats: {e}")))?;
        rows.iter().map(row_to_format).collect()
    }

    async fn record_observation(&self, observation: &Observation) -> Result<CapabilityRecord, StoreError> {
        let now = Utc::now().to_rfc3339();
        let (success, failure) = match &observation.outcome {
            CallOutcome::Success => (1_i64, None),
            CallOutcome::Failure { summary } => (0_i64, Some(summary.as_str())),
        };
        let row = sqlx::query(
            r#"
            INSERT INTO capabilities (tool, total_calls, successes, last_failure, provenance, created_at, updated_at)
            VALUES (?1, 1, ?2, ?3, ?4, ?5, ?5)
            ON CONFLICT(tool) DO UPDATE SET
                total_calls = total_calls + 1,
                successes = successes + excluded.successes,
                last_failure = excluded.last_failure,
                updated_at = excluded.updated_at
            RETURNING *
            "#,
        )
        .bind(&observation.tool)
        .bind(success)
        .bind(failure)
        .bind(Provenance::Calibration.as_str())
        .bind(&now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("capability update: {e}")))?;
        row_to_capability(&row)
    }

    async fn capabilities(&self) -> Result<Vec<CapabilityRecord>, StoreError> {
        let rows = sqlx::query("SELECT * FROM capabilities ORDER BY tool")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("capabilities: {e}")))?;
        rows.iter().map(row_to_capability).collect()
    }

    async fn capability(&self, tool: &str) -> Result<Option<CapabilityRecord>, StoreError> {
        let row = sqlx::query("SELECT * FROM capabilities WHERE tool = ?1")
            .bind(tool)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("capability: {e}")))?;
        row.as_ref().map(row_to_capability).transpose()
    }

    async fn enqueue_lesson(&self, lesson: Lesson) -> Result<PendingLesson, StoreError> {
        let pending = PendingLesson {
            id: records::new_id(),
            lesson,
            created_at: Utc::now(),
        };
        sqlx::query(
            "INSERT INTO pending_lessons (id, kind, content, confidence, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&pending.id)
        .bind(pending.lesson.kind().as_str())
        .bind(to_json(pending.lesson.content(), RecordKind::Lesson)?)
        .bind(pending.lesson.confidence())
        .bind(pending.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("enqueue lesson: {e}")))?;
        debug!(lesson = %pending.id, kind = pending.lesson.kind().as_str(), "Lesson queued for review");
        Ok(pending)
    }

    async fn pending_lessons(&self) -> Result<Vec<PendingLesson>, StoreError> {
        let rows = sqlx::query("SELECT * FROM pending_lessons ORDER BY confidence DESC, created_at ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("pending lessons: {e}")))?;
        rows.iter().map(row_to_lesson).collect()
    }

    async fn approve_lesson(&self, id: &str) -> Result<ApprovedRecord, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("begin: {e}")))?;

        let row = sqlx::query("SELECT * FROM pending_lessons WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("lesson by id: {e}")))?
            .ok_or_else(|| StoreError::NotFound {
                kind: RecordKind::Lesson,
                id: id.to_string(),
            })?;
        let pending = row_to_lesson(&row)?;
        let now = Utc::now();

        let approved = match pending.lesson.content() {
            LessonContent::Fact(draft) => {
                let existing = sqlx::query("SELECT * FROM facts WHERE key = ?1")
                    .bind(&draft.key)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(|e| StoreError::QueryFailed(format!("fact by key: {e}")))?;
                let existing = existing.as_ref().map(row_to_fact).transpose()?;
                let record = records::approved_fact(existing.as_ref(), draft, now);
                write_fact(&mut *tx, &record).await?;
                ApprovedRecord::Fact(record)
            }
            LessonContent::Pattern(draft) => {
                let existing = sqlx::query("SELECT * FROM patterns WHERE name = ?1")
                    .bind(&draft.name)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(|e| StoreError::QueryFailed(format!("pattern by name: {e}")))?;
                let existing = existing.as_ref().map(row_to_pattern).transpose()?;
                let record = records::approved_pattern(existing.as_ref(), draft, now);
                write_pattern(&mut *tx, &record).await?;
                ApprovedRecord::Pattern(record)
            }
        };

        sqlx::query("DELETE FROM pending_lessons WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Storage(format!("dequeue lesson: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("commit: {e}")))?;
        info!(lesson = %id, "Lesson approved");
        Ok(approved)
    }

    async fn dismiss_lesson(&self, id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM pending_lessons WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("dismiss lesson: {e}")))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                kind: RecordKind::Lesson,
                id: id.to_string(),
            });
        }
        Ok(())
    }
}
