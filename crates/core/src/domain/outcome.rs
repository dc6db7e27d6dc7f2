use serde::{Deserialize, Serialize};

use crate::domain::intent::IntentKind;
use crate::flows::states::RouterState;

/// Normalized result of a sub-agent call. `error_detail` is present iff the call failed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentOutcome {
    message: String,
    succeeded: bool,
    error_detail: Option<String>,
}

impl AgentOutcome {
    pub fn success(message: impl Into<String>) -> Self {
        Self { message: message.into(), succeeded: true, error_detail: None }
    }

    pub fn failure(message: impl Into<String>, error_detail: impl Into<String>) -> Self {
        Self { message: message.into(), succeeded: false, error_detail: Some(error_detail.into()) }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn succeeded(&self) -> bool {
        self.succeeded
    }

    pub fn error_detail(&self) -> Option<&str> {
        self.error_detail.as_deref()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterResult {
    pub final_message: String,
    pub intent_kind: IntentKind,
    pub error_detail: Option<String>,
    /// Classifier diagnostic that did not surface as an error (e.g. a downgraded extraction).
    pub note: Option<String>,
    pub path: Vec<RouterState>,
}
