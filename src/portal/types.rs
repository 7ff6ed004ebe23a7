use serde::{Deserialize, Serialize};
use std::time::Duration;
use thirtyfour::error::WebDriverError;
use thiserror::Error;

/// Error text recorded when the portal flags the uploaded sheet
pub const INPUT_REJECTED_TEXT: &str = "err_list";

/// Final result of one upload attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum UploadOutcome {
    /// Sheet accepted and the order-number export requested
    Submitted,
    /// The portal showed its input-error panel; nothing was exported
    InputRejected,
    Failed(String),
}

impl UploadOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, UploadOutcome::Submitted)
    }

    pub fn error_text(&self) -> Option<&str> {
        match self {
            UploadOutcome::Submitted => None,
            UploadOutcome::InputRejected => Some(INPUT_REJECTED_TEXT),
            UploadOutcome::Failed(message) => Some(message.as_str()),
        }
    }
}

/// What the portal showed right after the file was submitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadAck {
    Accepted,
    InputError,
}

#[derive(Debug, Error)]
pub enum PortalError {
    #[error("webdriver: {0}")]
    WebDriver(#[from] WebDriverError),

    #[error("timed out after {}s waiting for {what}", .after.as_secs())]
    Timeout { what: String, after: Duration },

    #[error("failed to start browser: {0}")]
    Launch(String),

    #[error("portal misconfigured: {0}")]
    Config(String),

    #[error("unexpected portal page: {0}")]
    Page(String),

    #[error("browser session not started")]
    NotLaunched,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
