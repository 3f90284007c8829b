//! Owner-gated long-term memory backed by SQLite.
//!
//! Facts are scored for importance and categorised with keyword lists, then
//! appended to a single `memory` table. Only the owner may write or read;
//! every other caller gets an in-band refusal instead of an error.

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{Connection, params};
use tracing::{debug, info};

use super::schema::{apply_schema, read_schema_version};
use crate::access::AccessMode;
use crate::config::MemoryConfig;

/// Importance every fact starts from, in tenths.
const BASE_IMPORTANCE_TENTHS: usize = 5;

/// Kind of fact, inferred from its wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryCategory {
    Task,
    Preference,
    Fact,
}

impl MemoryCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Preference => "preference",
            Self::Fact => "fact",
        }
    }

    fn from_db(s: &str) -> Self {
        match s {
            "task" => Self::Task,
            "preference" => Self::Preference,
            _ => Self::Fact,
        }
    }
}

impl fmt::Display for MemoryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted fact.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryRecord {
    /// Store-assigned, strictly increasing.
    pub id: i64,
    pub content: String,
    pub category: MemoryCategory,
    /// In `[0, 1]`.
    pub importance: f32,
    pub created_at: DateTime<Utc>,
}

/// Result of a store attempt. None of these are errors.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOutcome {
    /// Caller is not the owner; nothing was written.
    Denied,
    /// Scored below the threshold; nothing was written.
    LowPriority { importance: f32 },
    /// A new record was appended.
    Stored {
        id: i64,
        category: MemoryCategory,
        importance: f32,
    },
}

impl StoreOutcome {
    /// Reply text spoken back to the user.
    pub fn message(&self) -> String {
        match self {
            Self::Denied => {
                "Access Denied: I can only store memories for my recognized owner.".to_owned()
            }
            Self::LowPriority { .. } => {
                "Okay, noted. I may not prioritize this information.".to_owned()
            }
            Self::Stored { .. } => "Got it. I've added that to my long-term memory.".to_owned(),
        }
    }
}

/// Result of a recall. None of these are errors.
#[derive(Debug, Clone, PartialEq)]
pub enum RecallOutcome {
    /// Caller is not the owner; no read was performed.
    Denied,
    /// The owner asked but nothing has been stored yet.
    Empty,
    /// Most recent records first.
    Records(Vec<MemoryRecord>),
}

impl RecallOutcome {
    /// Reply / prompt text for this outcome.
    ///
    /// Records render as a 1-indexed `N. (category) content` listing.
    pub fn message(&self) -> String {
        match self {
            Self::Denied => {
                "Privacy Shield: I cannot reveal the owner's personal information.".to_owned()
            }
            Self::Empty => "My memory is currently a blank slate.".to_owned(),
            Self::Records(records) => {
                let mut out = String::from("Here is what I remember:\n");
                for (idx, record) in records.iter().enumerate() {
                    out.push_str(&format!(
                        "{}. ({}) {}\n",
                        idx + 1,
                        record.category,
                        record.content
                    ));
                }
                out
            }
        }
    }
}

/// Keyword lists and threshold that drive scoring and categorisation.
#[derive(Debug, Clone)]
pub struct MemoryPolicy {
    importance_keywords: BTreeSet<String>,
    task_keywords: Vec<String>,
    preference_keywords: Vec<String>,
    threshold: f32,
}

impl MemoryPolicy {
    pub fn from_config(config: &MemoryConfig) -> Self {
        Self {
            importance_keywords: config
                .importance_keywords
                .iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
            task_keywords: lowercase_all(&config.task_keywords),
            preference_keywords: lowercase_all(&config.preference_keywords),
            threshold: config.importance_threshold,
        }
    }

    /// Base 0.5, plus 0.1 per distinct keyword present anywhere in the text
    /// (case-insensitive substring), clamped to `[0, 1]`.
    pub fn compute_importance(&self, text: &str) -> f32 {
        let lower = text.to_lowercase();
        let matches = self
            .importance_keywords
            .iter()
            .filter(|k| lower.contains(k.as_str()))
            .count();
        let tenths = BASE_IMPORTANCE_TENTHS.saturating_add(matches).min(10);
        (tenths as f32 / 10.0).clamp(0.0, 1.0)
    }

    /// First match wins: task keywords, then preference keywords, else fact.
    pub fn infer_category(&self, text: &str) -> MemoryCategory {
        let lower = text.to_lowercase();
        let hit = |keywords: &[String]| keywords.iter().any(|k| lower.contains(k.as_str()));
        if hit(&self.task_keywords) {
            MemoryCategory::Task
        } else if hit(&self.preference_keywords) {
            MemoryCategory::Preference
        } else {
            MemoryCategory::Fact
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }
}

impl Default for MemoryPolicy {
    fn default() -> Self {
        Self::from_config(&MemoryConfig::default())
    }
}

fn lowercase_all(words: &[String]) -> Vec<String> {
    words
        .iter()
        .map(|w| w.trim().to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

/// Long-term memory store.
///
/// Thread-safe via an internal `Mutex<Connection>`; each insert is a single
/// atomic row write.
pub struct MemoryStore {
    policy: MemoryPolicy,
    conn: Mutex<Connection>,
}

impl MemoryStore {
    /// Open (or create) the database at `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or database cannot be created.
    pub fn open(path: &Path, policy: MemoryPolicy) -> Result<Self, MemoryStoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| MemoryStoreError::Io(e.to_string()))?;
        }
        let conn = Connection::open(path)?;
        apply_schema(&conn)?;
        info!("long-term memory opened at {}", path.display());
        Ok(Self {
            policy,
            conn: Mutex::new(conn),
        })
    }

    /// Open the store described by `config`.
    ///
    /// # Errors
    ///
    /// See [`MemoryStore::open`].
    pub fn from_config(config: &MemoryConfig) -> Result<Self, MemoryStoreError> {
        Self::open(&config.db_path, MemoryPolicy::from_config(config))
    }

    pub fn policy(&self) -> &MemoryPolicy {
        &self.policy
    }

    /// Store a fact on behalf of `access`.
    ///
    /// Non-owners are refused without touching the database, and facts that
    /// score below the threshold are acknowledged but not written.
    ///
    /// # Errors
    ///
    /// Returns an error only if the database write fails.
    pub fn store(
        &self,
        content: &str,
        access: AccessMode,
    ) -> Result<StoreOutcome, MemoryStoreError> {
        if !access.is_owner() {
            debug!("memory store refused for {access}");
            return Ok(StoreOutcome::Denied);
        }

        let importance = self.policy.compute_importance(content);
        if importance < self.policy.threshold {
            debug!("memory store declined: importance {importance:.1} below threshold");
            return Ok(StoreOutcome::LowPriority { importance });
        }

        let category = self.policy.infer_category(content);
        let id = self.insert_record(content, category, importance, Utc::now())?;
        info!("stored memory #{id} ({category}, importance {importance:.1})");
        Ok(StoreOutcome::Stored {
            id,
            category,
            importance,
        })
    }

    /// Recall up to `limit` of the newest facts on behalf of `access`.
    ///
    /// # Errors
    ///
    /// Returns an error only if the database read fails.
    pub fn recall(
        &self,
        access: AccessMode,
        limit: usize,
    ) -> Result<RecallOutcome, MemoryStoreError> {
        if !access.is_owner() {
            debug!("memory recall refused for {access}");
            return Ok(RecallOutcome::Denied);
        }

        let records = self.recent_records(limit)?;
        if records.is_empty() {
            Ok(RecallOutcome::Empty)
        } else {
            Ok(RecallOutcome::Records(records))
        }
    }

    /// Total number of stored records.
    ///
    /// # Errors
    ///
    /// Returns an error if the database read fails.
    pub fn count(&self) -> Result<usize, MemoryStoreError> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM memory", [], |row| row.get(0))?;
        Ok(usize::try_from(n).unwrap_or(0))
    }

    /// Read the schema version from the database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database read fails.
    pub fn schema_version(&self) -> Result<Option<u32>, MemoryStoreError> {
        let conn = self.lock()?;
        Ok(read_schema_version(&conn)?)
    }

    // -----------------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------------

    /// Append one row. No access check: callers must have done it.
    pub(crate) fn insert_record(
        &self,
        content: &str,
        category: MemoryCategory,
        importance: f32,
        created_at: DateTime<Utc>,
    ) -> Result<i64, MemoryStoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO memory (content, category, importance, created_at) \
             VALUES (?1, ?2, ?3, ?4)",
            params![
                content,
                category.as_str(),
                f64::from(importance),
                created_at.timestamp_millis()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn recent_records(&self, limit: usize) -> Result<Vec<MemoryRecord>, MemoryStoreError> {
        let conn = self.lock()?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = conn.prepare(
            "SELECT id, content, category, importance, created_at FROM memory \
             ORDER BY created_at DESC, id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], row_to_record)?;

        let mut records = Vec::new();
        for r in rows {
            records.push(r?);
        }
        Ok(records)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, MemoryStoreError> {
        self.conn
            .lock()
            .map_err(|e| MemoryStoreError::Lock(e.to_string()))
    }
}

/// Errors from the SQLite memory backend.
#[derive(Debug, thiserror::Error)]
pub enum MemoryStoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("lock poisoned: {0}")]
    Lock(String),
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<MemoryRecord> {
    let category: String = row.get(2)?;
    let importance: f64 = row.get(3)?;
    let created_ms: i64 = row.get(4)?;
    Ok(MemoryRecord {
        id: row.get(0)?,
        content: row.get(1)?,
        category: MemoryCategory::from_db(&category),
        importance: importance as f32,
        created_at: Utc
            .timestamp_millis_opt(created_ms)
            .single()
            .unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn test_store() -> (tempfile::TempDir, MemoryStore) {
        let dir = tempfile::TempDir::new().expect("create temp dir");
        let store = MemoryStore::open(&dir.path().join("memory.db"), MemoryPolicy::default())
            .expect("open store");
        (dir, store)
    }

    #[test]
    fn importance_starts_at_base() {
        let policy = MemoryPolicy::default();
        assert_eq!(policy.compute_importance("the sky is blue"), 0.5);
        assert_eq!(policy.compute_importance(""), 0.5);
    }

    #[test]
    fn importance_counts_distinct_keywords_once() {
        let policy = MemoryPolicy::default();
        assert_eq!(policy.compute_importance("Remember this"), 0.6);
        assert_eq!(policy.compute_importance("remember remember REMEMBER"), 0.6);
        assert_eq!(policy.compute_importance("urgent meeting"), 0.7);
    }

    #[test]
    fn importance_uses_substring_not_word_boundary() {
        let policy = MemoryPolicy::default();
        // "tasks" contains "task", "mustard" contains "must".
        assert_eq!(policy.compute_importance("tasks"), 0.6);
        assert_eq!(policy.compute_importance("pass the mustard"), 0.6);
    }

    #[test]
    fn importance_clamps_at_one() {
        let policy = MemoryPolicy::default();
        let text = "URGENT: remember the important exam deadline, meeting task must happen";
        assert_eq!(policy.compute_importance(text), 1.0);
        let five = "deadline meeting exam task important";
        assert_eq!(policy.compute_importance(five), 1.0);
    }

    #[test]
    fn category_priority_is_task_then_preference_then_fact() {
        let policy = MemoryPolicy::default();
        assert_eq!(policy.infer_category("exam on friday"), MemoryCategory::Task);
        assert_eq!(
            policy.infer_category("I like the meeting room"),
            MemoryCategory::Task
        );
        assert_eq!(
            policy.infer_category("My favorite colour is green"),
            MemoryCategory::Preference
        );
        assert_eq!(
            policy.infer_category("Remember my project presentation is on Monday"),
            MemoryCategory::Fact
        );
    }

    #[test]
    fn custom_keyword_lists_change_categorisation() {
        let config = MemoryConfig {
            task_keywords: vec!["Presentation".to_owned()],
            ..MemoryConfig::default()
        };
        let policy = MemoryPolicy::from_config(&config);
        assert_eq!(
            policy.infer_category("my project presentation is on Monday"),
            MemoryCategory::Task
        );
    }

    #[test]
    fn guest_store_is_denied_without_writing() {
        let (_dir, store) = test_store();
        let outcome = store
            .store("remember my password is admin123", AccessMode::Guest)
            .expect("store");
        assert_eq!(outcome, StoreOutcome::Denied);
        assert!(outcome.message().starts_with("Access Denied"));
        assert_eq!(store.count().expect("count"), 0);
    }

    #[test]
    fn owner_low_priority_is_declined_softly() {
        let (_dir, store) = test_store();
        let outcome = store
            .store("the cat is asleep", AccessMode::Owner)
            .expect("store");
        assert_eq!(outcome, StoreOutcome::LowPriority { importance: 0.5 });
        assert_eq!(store.count().expect("count"), 0);
    }

    #[test]
    fn owner_important_fact_is_persisted() {
        let (_dir, store) = test_store();
        let outcome = store
            .store("Remember my project presentation is on Monday", AccessMode::Owner)
            .expect("store");
        let StoreOutcome::Stored {
            category,
            importance,
            ..
        } = outcome
        else {
            panic!("expected Stored, got {outcome:?}");
        };
        assert_eq!(category, MemoryCategory::Fact);
        assert!(importance >= 0.6);
        assert_eq!(store.count().expect("count"), 1);
    }

    #[test]
    fn guest_recall_is_denied_even_with_records() {
        let (_dir, store) = test_store();
        store
            .store("urgent: exam deadline tomorrow", AccessMode::Owner)
            .expect("store");
        for limit in [0, 1, 5, 100] {
            assert_eq!(
                store.recall(AccessMode::Guest, limit).expect("recall"),
                RecallOutcome::Denied
            );
        }
    }

    #[test]
    fn owner_recall_of_empty_store_is_distinct_from_denial() {
        let (_dir, store) = test_store();
        let outcome = store.recall(AccessMode::Owner, 5).expect("recall");
        assert_eq!(outcome, RecallOutcome::Empty);
        assert_eq!(outcome.message(), "My memory is currently a blank slate.");
    }

    #[test]
    fn recall_orders_by_timestamp_regardless_of_insert_order() {
        let (_dir, store) = test_store();
        let t1 = Utc::now();
        let t2 = t1 - Duration::minutes(5);
        let t3 = t1 - Duration::minutes(10);

        store
            .insert_record("second", MemoryCategory::Fact, 0.6, t2)
            .expect("insert t2");
        store
            .insert_record("newest", MemoryCategory::Task, 0.7, t1)
            .expect("insert t1");
        store
            .insert_record("oldest", MemoryCategory::Preference, 0.6, t3)
            .expect("insert t3");

        let RecallOutcome::Records(records) = store.recall(AccessMode::Owner, 3).expect("recall")
        else {
            panic!("expected records");
        };
        let contents: Vec<&str> = records.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(contents, vec!["newest", "second", "oldest"]);
    }

    #[test]
    fn identical_timestamps_break_ties_by_id() {
        let (_dir, store) = test_store();
        let at = Utc::now();
        let first = store
            .insert_record("first", MemoryCategory::Fact, 0.6, at)
            .expect("insert");
        let second = store
            .insert_record("second", MemoryCategory::Fact, 0.6, at)
            .expect("insert");
        assert!(second > first);

        let RecallOutcome::Records(records) = store.recall(AccessMode::Owner, 5).expect("recall")
        else {
            panic!("expected records");
        };
        assert_eq!(records[0].id, second);
        assert_eq!(records[1].id, first);
    }

    #[test]
    fn recall_respects_limit_and_formats_listing() {
        let (_dir, store) = test_store();
        let base = Utc::now();
        for (i, text) in ["alpha", "beta", "gamma"].iter().enumerate() {
            store
                .insert_record(
                    text,
                    MemoryCategory::Fact,
                    0.6,
                    base + Duration::seconds(i as i64),
                )
                .expect("insert");
        }
        let outcome = store.recall(AccessMode::Owner, 2).expect("recall");
        assert_eq!(
            outcome.message(),
            "Here is what I remember:\n1. (fact) gamma\n2. (fact) beta\n"
        );
    }

    #[test]
    fn records_survive_reopen() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let path = dir.path().join("nested").join("memory.db");
        {
            let store = MemoryStore::open(&path, MemoryPolicy::default()).expect("open");
            store
                .store("I prefer tea, remember that", AccessMode::Owner)
                .expect("store");
        }
        let store = MemoryStore::open(&path, MemoryPolicy::default()).expect("reopen");
        assert_eq!(store.count().expect("count"), 1);
        let RecallOutcome::Records(records) = store.recall(AccessMode::Owner, 5).expect("recall")
        else {
            panic!("expected records");
        };
        assert_eq!(records[0].category, MemoryCategory::Preference);
        assert_eq!(
            store.schema_version().expect("version"),
            Some(super::super::schema::CURRENT_SCHEMA_VERSION)
        );
    }

    #[test]
    fn concurrent_owner_stores_are_all_kept() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let store = std::sync::Arc::new(
            MemoryStore::open(&dir.path().join("memory.db"), MemoryPolicy::default())
                .expect("open"),
        );

        let mut handles = Vec::new();
        for i in 0..8 {
            let s = std::sync::Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                s.store(&format!("urgent task number {i}"), AccessMode::Owner)
                    .expect("concurrent store");
            }));
        }
        for h in handles {
            h.join().expect("thread join");
        }
        assert_eq!(store.count().expect("count"), 8);
    }
}
