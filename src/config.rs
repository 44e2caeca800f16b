// Server configuration
// Values come from the environment (optionally via .env), with defaults that
// match a local single-sandbox setup.

use std::path::PathBuf;

/// Default probe timeout: 30 seconds.
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 30;

/// Default inactivity timeout for agent invocations: 10 minutes.
pub const DEFAULT_INACTIVITY_TIMEOUT_SECS: u64 = 600;

/// Runtime configuration, resolved once at startup and shared through AppState.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind address for the HTTP server.
    pub host: String,
    /// Bind port for the HTTP server.
    pub port: u16,
    /// Container CLI binary used to reach the sandbox. Overridable so tests
    /// can point invocations at a scratch script instead of `docker`.
    pub docker_bin: String,
    /// Name of the Docker sandbox the agent runs in.
    pub sandbox_name: String,
    /// Workspace path inside the sandbox.
    pub sandbox_workspace: String,
    /// SQLite database file location.
    pub database_path: PathBuf,
    /// Health probe timeout.
    pub probe_timeout_secs: u64,
    /// Kill an agent invocation after this long without output.
    pub inactivity_timeout_secs: u64,
}

impl Config {
    /// Resolve configuration from the environment.
    pub fn from_env() -> Self {
        Self {
            host: env_or("HOST", "127.0.0.1"),
            port: env_parsed("PORT", 3002),
            docker_bin: env_or("DOCKER_BIN", "docker"),
            sandbox_name: env_or("SANDBOX_NAME", "my-sandbox"),
            sandbox_workspace: env_or("SANDBOX_WORKSPACE", "/workspace"),
            database_path: std::env::var("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_database_path()),
            probe_timeout_secs: env_parsed("PROBE_TIMEOUT_SECS", DEFAULT_PROBE_TIMEOUT_SECS),
            inactivity_timeout_secs: env_parsed(
                "AGENT_INACTIVITY_TIMEOUT_SECS",
                DEFAULT_INACTIVITY_TIMEOUT_SECS,
            ),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3002,
            docker_bin: "docker".to_string(),
            sandbox_name: "my-sandbox".to_string(),
            sandbox_workspace: "/workspace".to_string(),
            database_path: default_database_path(),
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT_SECS,
            inactivity_timeout_secs: DEFAULT_INACTIVITY_TIMEOUT_SECS,
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Database lives under the platform data directory unless overridden.
fn default_database_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("boxchat")
        .join("boxchat.db")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_defaults() {
        let config = Config::default();
        assert_eq!(config.port, 3002);
        assert_eq!(config.docker_bin, "docker");
        assert_eq!(config.sandbox_name, "my-sandbox");
        assert_eq!(config.sandbox_workspace, "/workspace");
        assert_eq!(config.probe_timeout_secs, 30);
        assert_eq!(config.inactivity_timeout_secs, 600);
    }
}
