use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("device disconnected")]
    Disconnected,

    #[error("hardware buffer overflow, lost {lost} words")]
    BufferOverflow { lost: u32 },

    #[error("device rejected command: {0}")]
    Rejected(String),

    #[error("device I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("fatal source error: {0}")]
    Fatal(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("record width {got} does not match store width {expected}")]
    RowWidthMismatch { expected: usize, got: usize },

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage backend error: {0}")]
    Backend(String),
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("word source failed: {0}")]
    Source(#[from] SourceError),

    #[error("event store failed: {0}")]
    Storage(#[from] StorageError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid state transition: {0}")]
    InvalidTransition(String),

    #[error("worker error: {0}")]
    Worker(String),
}

/// What the acquisition loop does when it hits a given failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Reset the source, discard the cycle's data, keep acquiring.
    DiscardCycle,
    /// Log, skip the affected data, keep acquiring.
    LogAndContinue,
    /// Terminate the run and surface the error to the controller.
    Fatal,
}

impl SessionError {
    pub fn recovery_action(&self) -> RecoveryAction {
        match self {
            SessionError::Source(SourceError::BufferOverflow { .. }) => RecoveryAction::DiscardCycle,
            SessionError::Source(_) => RecoveryAction::Fatal,
            SessionError::Storage(_) => RecoveryAction::LogAndContinue,
            SessionError::Config(_) | SessionError::InvalidTransition(_) | SessionError::Worker(_) => {
                RecoveryAction::Fatal
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflow_discards_cycle() {
        let err = SessionError::Source(SourceError::BufferOverflow { lost: 12 });
        assert_eq!(err.recovery_action(), RecoveryAction::DiscardCycle);
    }

    #[test]
    fn source_loss_is_fatal() {
        let err = SessionError::Source(SourceError::Disconnected);
        assert_eq!(err.recovery_action(), RecoveryAction::Fatal);
    }

    #[test]
    fn append_failures_continue() {
        let err = SessionError::Storage(StorageError::RowWidthMismatch {
            expected: 200,
            got: 37,
        });
        assert_eq!(err.recovery_action(), RecoveryAction::LogAndContinue);
    }
}
