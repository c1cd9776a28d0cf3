/// Gallery rows use SQLite INTEGER PRIMARY KEY ids.
pub type DbId = i64;

/// Jobs are identified by time-ordered UUIDv7 values.
pub type JobId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
