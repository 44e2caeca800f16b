// Sandbox probe and agent invocation types

use serde::{Deserialize, Serialize};

/// Possible states a sandbox probe can report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxStatus {
    Healthy,
    AuthFailed,
    Unavailable,
}

/// Structured result from probing the sandbox
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    pub status: SandboxStatus,
    /// Human-readable explanation of what happened
    pub message: String,
}

impl ProbeResult {
    pub fn healthy(message: impl Into<String>) -> Self {
        Self {
            status: SandboxStatus::Healthy,
            message: message.into(),
        }
    }

    pub fn auth_failed(message: impl Into<String>) -> Self {
        Self {
            status: SandboxStatus::AuthFailed,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            status: SandboxStatus::Unavailable,
            message: message.into(),
        }
    }
}

/// Shape of the JSON returned by `claude auth status --json`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthStatus {
    #[serde(default)]
    pub logged_in: bool,
    #[serde(default)]
    pub auth_method: Option<String>,
    #[serde(default)]
    pub api_provider: Option<String>,
}

/// Terminal outcome of a successful agent invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentResult {
    /// Full result text of the turn
    pub result: String,
    /// Continuation token for resuming this conversation
    pub session_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sandbox_status_uses_snake_case_wire_names() {
        assert_eq!(
            serde_json::to_value(SandboxStatus::AuthFailed).unwrap(),
            "auth_failed"
        );
        assert_eq!(
            serde_json::to_value(SandboxStatus::Unavailable).unwrap(),
            "unavailable"
        );
    }

    #[test]
    fn auth_status_parses_original_field_names() {
        let status: AuthStatus = serde_json::from_str(
            r#"{"loggedIn":true,"authMethod":"oauth","apiProvider":"firstParty"}"#,
        )
        .unwrap();
        assert!(status.logged_in);
        assert_eq!(status.auth_method.as_deref(), Some("oauth"));
        assert_eq!(status.api_provider.as_deref(), Some("firstParty"));
    }

    #[test]
    fn auth_status_tolerates_missing_fields() {
        let status: AuthStatus = serde_json::from_str("{}").unwrap();
        assert!(!status.logged_in);
        assert!(status.auth_method.is_none());
    }
}
