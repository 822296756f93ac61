use crate::types::DbId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure kinds raised inside the detection/handling pipeline.
///
/// The kind decides what a loop does next:
///
/// | Kind                | Health monitor              | Alert consumer                      |
/// |---------------------|-----------------------------|-------------------------------------|
/// | `TransientStore`    | abandon the iteration       | keep the cursor, retry next pass    |
/// | `PermanentPayload`  | n/a                         | log, advance the cursor past it     |
/// | `StreamUnavailable` | log, continue with next one | back off, retry the read            |
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    #[error("Transient store error: {0}")]
    TransientStore(String),

    #[error("Malformed event payload: {0}")]
    PermanentPayload(String),

    #[error("Stream unavailable: {0}")]
    StreamUnavailable(String),
}

impl PipelineError {
    pub fn store(err: impl std::fmt::Display) -> Self {
        Self::TransientStore(err.to_string())
    }

    pub fn payload(err: impl std::fmt::Display) -> Self {
        Self::PermanentPayload(err.to_string())
    }

    pub fn stream(err: impl std::fmt::Display) -> Self {
        Self::StreamUnavailable(err.to_string())
    }

    /// Whether retrying the same unit of work can ever succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::PermanentPayload(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_payload_errors_are_permanent() {
        assert!(PipelineError::store("lock timeout").is_transient());
        assert!(PipelineError::stream("connection refused").is_transient());
        assert!(!PipelineError::payload("missing device_id").is_transient());
    }
}
