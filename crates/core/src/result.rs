use serde::{Deserialize, Serialize};

/// The two-field record every gateway invocation resolves to. The calling
/// agent layer relays `message` to the end user verbatim, so failures carry a
/// readable sentence rather than a bare error code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub message: String,
}

impl ExecutionResult {
    pub fn succeeded(message: impl Into<String>) -> Self {
        Self { success: true, message: message.into() }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self { success: false, message: message.into() }
    }
}
