/// Machine ids are assigned by the cloud provider; log entry ids are BIGSERIAL.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
