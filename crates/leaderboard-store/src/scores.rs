use tracing::instrument;

use leaderboard_core::{ScoreRecord, UserId};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// Result of a conditional insert.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PutOutcome {
    Inserted,
    /// A record for this user already existed; nothing was written.
    Conflict,
}

/// Durable score storage, one record per user.
///
/// `put_if_absent` is the commit point for a submission and must be atomic
/// with respect to concurrent calls for the same user.
pub trait ScoreStore: Send + Sync {
    fn get_by_user_id(&self, user_id: &UserId) -> Result<Option<ScoreRecord>, StoreError>;
    fn put_if_absent(&self, record: &ScoreRecord) -> Result<PutOutcome, StoreError>;
    /// Best `n` records: score descending, earliest submission first on ties.
    fn top_n(&self, n: usize) -> Result<Vec<ScoreRecord>, StoreError>;
}

const TABLE: &str = "scores";

/// SQLite-backed score store.
pub struct ScoreRepo {
    db: Database,
}

impl ScoreRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Total number of stored records.
    pub fn count(&self) -> Result<u64, StoreError> {
        self.db.with_conn(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM scores", [], |row| row.get(0))?;
            Ok(n as u64)
        })
    }
}

impl ScoreStore for ScoreRepo {
    #[instrument(skip_all, fields(user_id = %user_id))]
    fn get_by_user_id(&self, user_id: &UserId) -> Result<Option<ScoreRecord>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id, username, score, submitted_at FROM scores WHERE user_id = ?1",
            )?;
            let mut rows = stmt.query([user_id.as_str()])?;
            match rows.next()? {
                Some(row) => row_to_record(row).map(Some),
                None => Ok(None),
            }
        })
    }

    #[instrument(skip(self, record), fields(user_id = %record.user_id, score = record.score))]
    fn put_if_absent(&self, record: &ScoreRecord) -> Result<PutOutcome, StoreError> {
        self.db.with_conn(|conn| {
            let changed = conn.execute(
                "INSERT INTO scores (user_id, username, score, submitted_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(user_id) DO NOTHING",
                rusqlite::params![
                    record.user_id.as_str(),
                    record.username,
                    record.score,
                    row_helpers::format_timestamp(&record.submitted_at),
                ],
            )?;
            Ok(if changed == 0 {
                PutOutcome::Conflict
            } else {
                PutOutcome::Inserted
            })
        })
    }

    #[instrument(skip(self))]
    fn top_n(&self, n: usize) -> Result<Vec<ScoreRecord>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id, username, score, submitted_at FROM scores
                 ORDER BY score DESC, submitted_at ASC, user_id ASC
                 LIMIT ?1",
            )?;
            let mut rows = stmt.query([n as i64])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                out.push(row_to_record(row)?);
            }
            Ok(out)
        })
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> Result<ScoreRecord, StoreError> {
    let user_id: String = row_helpers::get(row, 0, TABLE, "user_id")?;
    let raw_score: i64 = row_helpers::get(row, 2, TABLE, "score")?;
    let score = u32::try_from(raw_score).map_err(|_| StoreError::CorruptRow {
        table: TABLE,
        column: "score",
        detail: format!("out of range: {raw_score}"),
    })?;
    let submitted_at: String = row_helpers::get(row, 3, TABLE, "submitted_at")?;

    Ok(ScoreRecord {
        user_id: UserId::from_raw(user_id),
        username: row_helpers::get(row, 1, TABLE, "username")?,
        score,
        submitted_at: row_helpers::parse_timestamp(&submitted_at, TABLE, "submitted_at")?,
    })
}
