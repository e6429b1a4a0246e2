use std::fmt;

use serde::Serialize;

const SUCCESS_NOTICE: &str = "Content successfully synced!";
const ERROR_NOTICE: &str = "There was an error syncing the content. Please try again.";

/// Result of one delivery attempt, handed to whatever renders operator feedback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    Success { message: String },
    RemoteRejected { status: u16, body: String },
    /// The request went out but no readable response came back.
    /// Local failures such as batch encoding surface as errors instead.
    TransportFailure { reason: String },
}

impl SyncOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SyncOutcome::Success { .. })
    }

    /// Binary operator notice. Per-item detail only goes to the logs.
    pub fn notice(&self) -> &'static str {
        if self.is_success() {
            SUCCESS_NOTICE
        } else {
            ERROR_NOTICE
        }
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncOutcome::Success { message } => write!(f, "success: {message}"),
            SyncOutcome::RemoteRejected { status, body } => {
                write!(f, "rejected with status {status}: {body}")
            }
            SyncOutcome::TransportFailure { reason } => write!(f, "transport failure: {reason}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SyncOutcome;

    #[test]
    fn notices_are_binary() {
        let ok = SyncOutcome::Success {
            message: "Content synced successfully".to_string(),
        };
        let rejected = SyncOutcome::RemoteRejected {
            status: 400,
            body: "{}".to_string(),
        };
        let down = SyncOutcome::TransportFailure {
            reason: "connection refused".to_string(),
        };

        assert_eq!(ok.notice(), "Content successfully synced!");
        assert_eq!(rejected.notice(), down.notice());
        assert!(!rejected.is_success());
    }
}
