// Sandbox health probe
// One-shot, non-streaming `claude auth status --json` run inside the sandbox.
// Never fails: every outcome maps to a ProbeResult.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::config::Config;
use crate::models::sandbox::{AuthStatus, ProbeResult};
use crate::services::sandbox::classify::{
    classify_failure, combine_output, is_api_key_auth, FailureKind,
};

use super::sandbox_exec_args;

/// Args for the status-check command
fn build_probe_args(config: &Config) -> Vec<String> {
    let mut args = sandbox_exec_args(config);
    args.extend(
        ["auth", "status", "--json"]
            .iter()
            .map(|s| s.to_string()),
    );
    args
}

/// Probe the Docker sandbox to verify it is alive and authenticated with
/// first-party OAuth. Always resolves to a ProbeResult; a hung probe is
/// killed after `probe_timeout_secs`.
pub async fn probe_sandbox(config: &Config) -> ProbeResult {
    let mut cmd = Command::new(&config.docker_bin);
    cmd.args(build_probe_args(config))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            return ProbeResult::unavailable(format!(
                "Failed to spawn {} process: {}",
                config.docker_bin, e
            ));
        }
    };

    let timeout = Duration::from_secs(config.probe_timeout_secs);
    // kill_on_drop reaps the process when the timed-out future is dropped
    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Err(_) => {
            return ProbeResult::unavailable(format!(
                "Sandbox probe timed out after {}s",
                config.probe_timeout_secs
            ));
        }
        Ok(Err(e)) => {
            return ProbeResult::unavailable(format!("Failed to read probe output: {}", e));
        }
        Ok(Ok(output)) => output,
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    if !output.status.success() {
        return classify_probe_failure(config, &stderr, &stdout);
    }

    // Zero exit: parse the JSON status object
    let status: AuthStatus = match serde_json::from_str(stdout.trim()) {
        Ok(status) => status,
        Err(_) => {
            return ProbeResult::unavailable(format!(
                "Sandbox probe returned invalid JSON: {}",
                excerpt(stdout.trim(), 200)
            ));
        }
    };

    if !status.logged_in {
        return ProbeResult::auth_failed(format!(
            "Sandbox \"{}\" is not logged in",
            config.sandbox_name
        ));
    }

    if is_api_key_auth(status.auth_method.as_deref(), status.api_provider.as_deref()) {
        return ProbeResult::auth_failed(format!(
            "Sandbox \"{}\" is using API key auth (authMethod: {}, apiProvider: {}). First-party OAuth is required.",
            config.sandbox_name,
            status.auth_method.as_deref().unwrap_or("unknown"),
            status.api_provider.as_deref().unwrap_or("unknown"),
        ));
    }

    ProbeResult::healthy(format!(
        "Sandbox \"{}\" is authenticated ({}, {})",
        config.sandbox_name,
        status.auth_method.as_deref().unwrap_or("unknown"),
        status.api_provider.as_deref().unwrap_or("unknown"),
    ))
}

/// Route a non-zero probe exit through the failure classifier.
/// Probes are never resume attempts, and anything unclassified counts as
/// unavailable for health-reporting purposes.
fn classify_probe_failure(config: &Config, stderr: &str, stdout: &str) -> ProbeResult {
    let classification = classify_failure(&combine_output(stderr, stdout), false);
    match classification.kind {
        FailureKind::Unavailable => ProbeResult::unavailable(format!(
            "Sandbox \"{}\" is not available: matched \"{}\"",
            config.sandbox_name,
            classification.matched.unwrap_or("")
        )),
        FailureKind::AuthFailed => ProbeResult::auth_failed(format!(
            "Sandbox \"{}\" authentication failed: matched \"{}\"",
            config.sandbox_name,
            classification.matched.unwrap_or("")
        )),
        _ => ProbeResult::unavailable(format!(
            "Sandbox \"{}\" probe failed with unknown error",
            config.sandbox_name
        )),
    }
}

/// First `max` characters, for diagnostics
fn excerpt(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::models::sandbox::SandboxStatus;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::tempdir;

    /// Write a fake container CLI and point a Config at it
    fn script_config(dir: &std::path::Path, body: &str) -> Config {
        let path = dir.join("fake-docker");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        Config {
            docker_bin: path.to_string_lossy().into_owned(),
            probe_timeout_secs: 5,
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_healthy_probe() {
        let dir = tempdir().unwrap();
        let config = script_config(
            dir.path(),
            r#"echo '{"loggedIn":true,"authMethod":"oauth","apiProvider":"firstParty"}'"#,
        );

        let result = probe_sandbox(&config).await;
        assert_eq!(result.status, SandboxStatus::Healthy);
        assert!(result.message.contains("authenticated"));
    }

    #[tokio::test]
    async fn test_not_logged_in() {
        let dir = tempdir().unwrap();
        let config = script_config(dir.path(), r#"echo '{"loggedIn":false}'"#);

        let result = probe_sandbox(&config).await;
        assert_eq!(result.status, SandboxStatus::AuthFailed);
        assert!(result.message.contains("not logged in"));
    }

    #[tokio::test]
    async fn test_api_key_auth_is_rejected() {
        let dir = tempdir().unwrap();
        let config = script_config(
            dir.path(),
            r#"echo '{"loggedIn":true,"authMethod":"apiKey","apiProvider":"firstParty"}'"#,
        );

        let result = probe_sandbox(&config).await;
        assert_eq!(result.status, SandboxStatus::AuthFailed);
        assert!(result.message.contains("API key auth"));
    }

    #[tokio::test]
    async fn test_third_party_provider_is_rejected() {
        let dir = tempdir().unwrap();
        let config = script_config(
            dir.path(),
            r#"echo '{"loggedIn":true,"authMethod":"oauth","apiProvider":"bedrock"}'"#,
        );

        let result = probe_sandbox(&config).await;
        assert_eq!(result.status, SandboxStatus::AuthFailed);
    }

    #[tokio::test]
    async fn test_invalid_json_is_unavailable() {
        let dir = tempdir().unwrap();
        let config = script_config(dir.path(), "echo 'plain text output'");

        let result = probe_sandbox(&config).await;
        assert_eq!(result.status, SandboxStatus::Unavailable);
        assert!(result.message.contains("invalid JSON"));
    }

    #[tokio::test]
    async fn test_missing_container_is_unavailable() {
        let dir = tempdir().unwrap();
        let config = script_config(
            dir.path(),
            "echo 'Error: No such container: my-sandbox' >&2; exit 1",
        );

        let result = probe_sandbox(&config).await;
        assert_eq!(result.status, SandboxStatus::Unavailable);
        assert!(result.message.contains("no such container"));
    }

    #[tokio::test]
    async fn test_auth_error_exit_is_auth_failed() {
        let dir = tempdir().unwrap();
        let config = script_config(dir.path(), "echo 'not logged in' >&2; exit 1");

        let result = probe_sandbox(&config).await;
        assert_eq!(result.status, SandboxStatus::AuthFailed);
    }

    #[tokio::test]
    async fn test_unknown_exit_maps_to_unavailable() {
        let dir = tempdir().unwrap();
        let config = script_config(dir.path(), "echo 'something odd' >&2; exit 7");

        let result = probe_sandbox(&config).await;
        assert_eq!(result.status, SandboxStatus::Unavailable);
        assert!(result.message.contains("unknown error"));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_unavailable() {
        let config = Config {
            docker_bin: "/nonexistent/docker-binary".to_string(),
            ..Config::default()
        };

        let result = probe_sandbox(&config).await;
        assert_eq!(result.status, SandboxStatus::Unavailable);
        assert!(result.message.contains("Failed to spawn"));
    }

    #[tokio::test]
    async fn test_probe_timeout() {
        let dir = tempdir().unwrap();
        let mut config = script_config(dir.path(), "sleep 30");
        config.probe_timeout_secs = 1;

        let result = probe_sandbox(&config).await;
        assert_eq!(result.status, SandboxStatus::Unavailable);
        assert!(result.message.contains("timed out"));
    }
}
