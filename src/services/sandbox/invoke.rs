// Agent invocation engine
// One external process per chat turn. The engine spawns the agent CLI in the
// sandbox, streams parsed text fragments as they arrive, watches for
// inactivity, interprets the exit, and falls back to a fresh session when a
// resume attempt is rejected.

use std::process::Stdio;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::config::{Config, DEFAULT_INACTIVITY_TIMEOUT_SECS};
use crate::models::sandbox::AgentResult;

use super::classify::{classify_failure, combine_output, FailureKind};
use super::sandbox_exec_args;
use super::stream::{parse_stream_line, LineBuffer, StreamLine};

/// Interval for checking inactivity (capped by the timeout itself)
const INACTIVITY_CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Original attempt plus at most one fresh-session retry
const MAX_ATTEMPTS: u32 = 2;

/// Cap on diagnostic excerpts taken from process output
const ERROR_EXCERPT_CHARS: usize = 500;

/// Options for invoking the agent in the sandbox
#[derive(Debug, Clone)]
pub struct InvokeOptions {
    pub prompt: String,
    /// Continuation token from a prior turn; the attempt resumes when set
    pub session_id: Option<String>,
    /// Kill the process after this long without output on either stream
    pub inactivity_timeout: Duration,
}

impl InvokeOptions {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            session_id: None,
            inactivity_timeout: Duration::from_secs(DEFAULT_INACTIVITY_TIMEOUT_SECS),
        }
    }
}

/// Events emitted over the invocation channel.
///
/// Exactly one of Result or Error precedes Closed, except for the degenerate
/// clean-exit-without-result close. ResumeFailed may appear once, before the
/// retry's events.
#[derive(Debug)]
pub enum AgentEvent {
    /// Streaming text fragment, in arrival order
    Text(String),
    /// Terminal outcome of a successful turn
    Result(AgentResult),
    /// The resume attempt was rejected; a fresh-session retry follows
    ResumeFailed,
    /// Terminal failure
    Error(AgentError),
    /// No further events will be sent
    Closed,
}

/// Terminal invocation failures
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Failed to spawn {program}: {message}")]
    Spawn { program: String, message: String },

    #[error("Agent process error: {message}")]
    Process { message: String },

    #[error("Agent authentication failed: {detail}")]
    AuthFailed { detail: String },

    #[error("Sandbox unavailable: {detail}")]
    Unavailable { detail: String },

    #[error("Agent invocation timed out: no output for {millis}ms")]
    InactivityTimeout { millis: u128 },

    #[error("Agent exited with code {code}: {detail}")]
    Exited { code: i32, detail: String },
}

/// Invoke the agent and stream back events.
///
/// When `session_id` is set the command carries a resume directive. If that
/// attempt fails with a resume-failure pattern (and nothing more severe),
/// the engine emits ResumeFailed and re-runs once without the session id.
pub fn invoke_agent(config: &Config, options: InvokeOptions) -> mpsc::UnboundedReceiver<AgentEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    let config = config.clone();

    tokio::spawn(async move {
        run_invocation(&config, options, &tx).await;
        let _ = tx.send(AgentEvent::Closed);
    });

    rx
}

enum AttemptOutcome {
    /// The attempt reached a terminal state (result, clean close, or error)
    Finished,
    /// The resume was rejected; the caller may retry without a session id
    ResumeFailed,
}

async fn run_invocation(
    config: &Config,
    options: InvokeOptions,
    tx: &mpsc::UnboundedSender<AgentEvent>,
) {
    let mut session_id = options.session_id;

    for _attempt in 0..MAX_ATTEMPTS {
        let outcome = run_attempt(
            config,
            &options.prompt,
            session_id.as_deref(),
            options.inactivity_timeout,
            tx,
        )
        .await;

        match outcome {
            AttemptOutcome::Finished => return,
            AttemptOutcome::ResumeFailed => {
                log::warn!("agent resume failed; retrying with a fresh session");
                let _ = tx.send(AgentEvent::ResumeFailed);
                session_id = None;
            }
        }
    }
    // Not reachable in practice: the retry runs without a session id, so it
    // can never be classified as a resume failure again.
}

/// Build the sandbox exec args for an agent turn. The resume directive goes
/// ahead of the prompt argument.
fn build_invoke_args(config: &Config, prompt: &str, session_id: Option<&str>) -> Vec<String> {
    let mut args = sandbox_exec_args(config);

    if let Some(sid) = session_id {
        args.push("--resume".to_string());
        args.push(sid.to_string());
    }

    args.push("-p".to_string());
    args.push(prompt.to_string());
    args.extend(
        [
            "--output-format",
            "stream-json",
            "--permission-mode",
            "bypassPermissions",
            "--verbose",
        ]
        .iter()
        .map(|s| s.to_string()),
    );

    args
}

/// Run one external-process attempt to completion.
async fn run_attempt(
    config: &Config,
    prompt: &str,
    session_id: Option<&str>,
    inactivity_timeout: Duration,
    tx: &mpsc::UnboundedSender<AgentEvent>,
) -> AttemptOutcome {
    let args = build_invoke_args(config, prompt, session_id);

    let mut cmd = Command::new(&config.docker_bin);
    cmd.args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            let _ = tx.send(AgentEvent::Error(AgentError::Spawn {
                program: config.docker_bin.clone(),
                message: e.to_string(),
            }));
            return AttemptOutcome::Finished;
        }
    };

    let (Some(mut stdout), Some(mut stderr)) = (child.stdout.take(), child.stderr.take()) else {
        let _ = tx.send(AgentEvent::Error(AgentError::Process {
            message: "stdio pipes were not captured".to_string(),
        }));
        return AttemptOutcome::Finished;
    };

    let mut lines = LineBuffer::new();
    let mut stdout_text = String::new();
    let mut stderr_text = String::new();
    let mut result: Option<AgentResult> = None;
    let mut last_activity = Instant::now();
    let mut timed_out = false;

    let mut watchdog = tokio::time::interval(INACTIVITY_CHECK_INTERVAL.min(inactivity_timeout));

    let mut out_buf = vec![0u8; 8192];
    let mut err_buf = vec![0u8; 8192];
    let mut out_open = true;
    let mut err_open = true;

    while out_open || err_open {
        tokio::select! {
            read = stdout.read(&mut out_buf), if out_open => match read {
                Ok(0) => out_open = false,
                Ok(n) => {
                    last_activity = Instant::now();
                    stdout_text.push_str(&String::from_utf8_lossy(&out_buf[..n]));
                    for line in lines.push(&out_buf[..n]) {
                        process_line(&line, &mut result, tx);
                    }
                }
                Err(e) => {
                    log::warn!("agent stdout read error: {}", e);
                    out_open = false;
                }
            },
            read = stderr.read(&mut err_buf), if err_open => match read {
                Ok(0) => err_open = false,
                Ok(n) => {
                    last_activity = Instant::now();
                    stderr_text.push_str(&String::from_utf8_lossy(&err_buf[..n]));
                }
                Err(e) => {
                    log::warn!("agent stderr read error: {}", e);
                    err_open = false;
                }
            },
            _ = watchdog.tick() => {
                if last_activity.elapsed() > inactivity_timeout {
                    // Kill once; the attempt is over even if the process
                    // writes more data on its way down.
                    if let Err(e) = child.start_kill() {
                        log::warn!("failed to kill inactive agent process: {}", e);
                    }
                    timed_out = true;
                    break;
                }
            },
        }
    }

    if timed_out {
        let _ = child.wait().await;
        let _ = tx.send(AgentEvent::Error(AgentError::InactivityTimeout {
            millis: inactivity_timeout.as_millis(),
        }));
        return AttemptOutcome::Finished;
    }

    let status = match child.wait().await {
        Ok(status) => status,
        Err(e) => {
            let _ = tx.send(AgentEvent::Error(AgentError::Process {
                message: e.to_string(),
            }));
            return AttemptOutcome::Finished;
        }
    };

    // A partial line left in the carry buffer still counts
    if let Some(rest) = lines.flush() {
        process_line(&rest, &mut result, tx);
    }

    if result.is_some() {
        // A parsed result wins over the exit code: the agent may exit
        // non-zero after printing a valid answer.
        return AttemptOutcome::Finished;
    }

    let code = match status.code() {
        // Clean (or signal-terminated) close without a result: degenerate
        // but not an error.
        Some(0) | None => return AttemptOutcome::Finished,
        Some(code) => code,
    };

    let classification = classify_failure(
        &combine_output(&stderr_text, &stdout_text),
        session_id.is_some(),
    );
    let detail = error_excerpt(&stderr_text, &stdout_text);

    match classification.kind {
        FailureKind::ResumeFailed => AttemptOutcome::ResumeFailed,
        FailureKind::AuthFailed => {
            let _ = tx.send(AgentEvent::Error(AgentError::AuthFailed { detail }));
            AttemptOutcome::Finished
        }
        FailureKind::Unavailable => {
            let _ = tx.send(AgentEvent::Error(AgentError::Unavailable { detail }));
            AttemptOutcome::Finished
        }
        FailureKind::Unknown => {
            let _ = tx.send(AgentEvent::Error(AgentError::Exited { code, detail }));
            AttemptOutcome::Finished
        }
    }
}

/// Feed one complete line through the classifier, emitting its effect.
/// The terminal result surfaces exactly once; later result records are
/// ignored.
fn process_line(
    line: &str,
    result: &mut Option<AgentResult>,
    tx: &mpsc::UnboundedSender<AgentEvent>,
) {
    match parse_stream_line(line) {
        StreamLine::Text(text) => {
            let _ = tx.send(AgentEvent::Text(text));
        }
        StreamLine::Result {
            result: text,
            session_id,
        } => {
            if result.is_some() {
                return;
            }
            let _ = tx.send(AgentEvent::Text(text.clone()));
            let terminal = AgentResult {
                result: text,
                session_id,
            };
            let _ = tx.send(AgentEvent::Result(terminal.clone()));
            *result = Some(terminal);
        }
        StreamLine::Ignored => {}
    }
}

/// Diagnostic excerpt: stderr when present, stdout otherwise, capped
fn error_excerpt(stderr: &str, stdout: &str) -> String {
    let source = if stderr.trim().is_empty() { stdout } else { stderr };
    source.trim().chars().take(ERROR_EXCERPT_CHARS).collect()
}
