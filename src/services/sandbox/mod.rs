// Sandbox service
// Drives the agent CLI inside the Docker sandbox: health probing, streaming
// invocation, failure classification and the resume fallback.

pub mod classify;
pub mod invoke;
pub mod probe;
pub mod stream;

pub use classify::{classify_failure, FailureKind};
pub use invoke::{invoke_agent, AgentError, AgentEvent, InvokeOptions};
pub use probe::probe_sandbox;
pub use stream::{parse_stream_line, LineBuffer, StreamLine};

use crate::config::Config;

/// Args prefix shared by every sandbox command:
/// `docker sandbox exec -w <workspace> <name> claude ...`
fn sandbox_exec_args(config: &Config) -> Vec<String> {
    vec![
        "sandbox".to_string(),
        "exec".to_string(),
        "-w".to_string(),
        config.sandbox_workspace.clone(),
        config.sandbox_name.clone(),
        "claude".to_string(),
    ]
}
