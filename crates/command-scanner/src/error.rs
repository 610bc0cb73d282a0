use crate::CommandKind;
use thiserror::Error;

pub type Result<T, E = ScanError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("malformed {kind} payload: {source}")]
    MalformedPayload {
        kind: CommandKind,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid {kind} payload: {reason}")]
    InvalidPayload {
        kind: CommandKind,
        reason: &'static str,
    },
    #[error("invalid command pattern: {0}")]
    Pattern(#[from] regex::Error),
}
