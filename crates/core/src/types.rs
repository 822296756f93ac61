/// All database primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// Stream-assigned event identifier. Strictly increasing within a stream;
/// `0` means "before the first event".
pub type EventId = i64;

/// Cursor value meaning "beginning of stream".
pub const STREAM_START: EventId = 0;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
