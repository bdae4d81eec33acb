/// SQL DDL for the leaderboard database.
/// WAL mode enabled at connection time.
pub const SCHEMA_VERSION: u32 = 1;

// user_id is the primary key: the insert-if-absent commit point relies on it.
pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS scores (
    user_id TEXT PRIMARY KEY,
    username TEXT NOT NULL,
    score INTEGER NOT NULL CHECK (score >= 0),
    submitted_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_scores_standing ON scores(score DESC, submitted_at ASC);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);
"#;

pub const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA busy_timeout = 5000;
PRAGMA synchronous = NORMAL;
"#;
