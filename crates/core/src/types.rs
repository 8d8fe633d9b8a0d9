/// Brand and user primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// Analysis runs are identified by an opaque UUID.
pub type RunId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
