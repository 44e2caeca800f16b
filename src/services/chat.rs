// Chat session orchestration
// One ChatSession per WebSocket connection. Enforces at most one in-flight
// agent turn via the streaming flag, persists messages around the
// invocation, and forwards engine events to the client as wire frames.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::models::chat::{ClientFrame, ServerFrame};
use crate::models::thread::MessageRole;
use crate::services::sandbox::{invoke_agent, AgentEvent, InvokeOptions};
use crate::state::AppState;

/// Maximum generated title length, in characters
const TITLE_MAX_CHARS: usize = 60;

/// Per-connection chat state
#[derive(Clone)]
pub struct ChatSession {
    state: Arc<AppState>,
    outbound: mpsc::UnboundedSender<ServerFrame>,
    /// True exactly while one agent turn (including its resume-fallback
    /// retry) is outstanding for this connection
    streaming: Arc<AtomicBool>,
}

impl ChatSession {
    pub fn new(state: Arc<AppState>, outbound: mpsc::UnboundedSender<ServerFrame>) -> Self {
        Self {
            state,
            outbound,
            streaming: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::SeqCst)
    }

    fn set_streaming(&self, value: bool) {
        self.streaming.store(value, Ordering::SeqCst);
    }

    fn send(&self, frame: ServerFrame) {
        // A closed outbound channel means the client is gone; nothing to do
        let _ = self.outbound.send(frame);
    }

    /// Handle one raw inbound text frame.
    ///
    /// Frames arriving while a turn is streaming are dropped, not queued:
    /// backpressure is one agent turn per connection.
    pub async fn handle_frame(&self, raw: &str) {
        if self.is_streaming() {
            log::debug!("dropping frame received while streaming");
            return;
        }

        let value: serde_json::Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(_) => {
                self.send(ServerFrame::error("Invalid JSON"));
                return;
            }
        };

        let frame: ClientFrame = match serde_json::from_value(value) {
            Ok(frame) => frame,
            Err(_) => {
                self.send(ServerFrame::error("Invalid message format"));
                return;
            }
        };

        let ClientFrame::Message { thread_id, content } = frame;
        if thread_id.is_empty() || content.is_empty() {
            self.send(ServerFrame::error("Invalid message format"));
            return;
        }

        self.handle_chat_message(&thread_id, &content).await;
    }

    /// Persist the user message, run one agent turn, persist the outcome.
    async fn handle_chat_message(&self, thread_id: &str, content: &str) {
        let thread = match self.state.repo.get_thread(thread_id) {
            Ok(Some(thread)) => thread,
            Ok(None) => {
                self.send(ServerFrame::error("Thread not found"));
                return;
            }
            Err(e) => {
                log::error!("thread lookup failed: {}", e);
                self.send(ServerFrame::error(e));
                return;
            }
        };

        if let Err(e) = self.state.repo.add_message(thread_id, MessageRole::User, content) {
            log::error!("failed to persist user message: {}", e);
            self.send(ServerFrame::error(e));
            return;
        }

        // First message names the thread; later messages never rename it
        match self.state.repo.get_messages(thread_id) {
            Ok(messages) if messages.len() == 1 => {
                let title = generate_title(content);
                if let Err(e) = self.state.repo.update_title(thread_id, &title) {
                    log::error!("failed to set thread title: {}", e);
                }
            }
            Ok(_) => {}
            Err(e) => log::error!("failed to count messages: {}", e),
        }

        self.set_streaming(true);

        let mut options = InvokeOptions::new(content);
        options.session_id = thread.session_id.clone();
        options.inactivity_timeout = Duration::from_secs(self.state.config.inactivity_timeout_secs);

        let mut events = invoke_agent(&self.state.config, options);
        let mut terminal_seen = false;

        while let Some(event) = events.recv().await {
            match event {
                AgentEvent::Text(text) => {
                    self.send(ServerFrame::Token { text });
                }
                AgentEvent::Result(result) => {
                    terminal_seen = true;
                    match self
                        .state
                        .repo
                        .add_message(thread_id, MessageRole::Assistant, &result.result)
                    {
                        Ok(message) => {
                            if let Err(e) = self
                                .state
                                .repo
                                .update_session_id(thread_id, &result.session_id)
                            {
                                log::error!("failed to persist session id: {}", e);
                            }
                            self.send(ServerFrame::Done {
                                message_id: message.id,
                            });
                        }
                        Err(e) => {
                            log::error!("failed to persist assistant message: {}", e);
                            self.send(ServerFrame::error(e));
                        }
                    }
                    self.set_streaming(false);
                }
                AgentEvent::ResumeFailed => {
                    log::warn!(
                        "resume failed for thread {}; agent is starting a fresh session",
                        thread_id
                    );
                }
                AgentEvent::Error(error) => {
                    terminal_seen = true;
                    self.send(ServerFrame::error(error.to_string()));
                    self.set_streaming(false);
                }
                AgentEvent::Closed => {
                    if !terminal_seen {
                        self.set_streaming(false);
                    }
                    break;
                }
            }
        }

        // The lock must never leak, even if the engine channel died without
        // a Closed event
        self.set_streaming(false);
    }
}

/// Derive a thread title from the first user message: first 60 characters,
/// trimmed to the last word boundary, with an ellipsis when truncated.
pub fn generate_title(content: &str) -> String {
    let trimmed = content.trim();

    if trimmed.chars().count() <= TITLE_MAX_CHARS {
        return trimmed.to_string();
    }

    let truncated: String = trimmed.chars().take(TITLE_MAX_CHARS).collect();
    match truncated.rfind(' ') {
        Some(pos) if pos > 0 => format!("{}...", &truncated[..pos]),
        // Single long word with no spaces: hard truncate
        _ => format!("{}...", truncated),
    }
}


#[cfg(all(test, unix))]
mod session_tests {
    use super::*;
    use crate::config::Config;
    use crate::repositories::ThreadRepository;
    use crate::utils::database::Database;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::tempdir;

    fn script_state(dir: &std::path::Path, body: &str) -> Arc<AppState> {
        let script = dir.join("fake-docker");
        std::fs::write(&script, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let config = Config {
            docker_bin: script.to_string_lossy().into_owned(),
            ..Config::default()
        };
        let db = Database::new(dir.join("test.db")).unwrap();
        Arc::new(AppState::new(config, ThreadRepository::new(db)))
    }

    fn session(
        state: Arc<AppState>,
    ) -> (ChatSession, mpsc::UnboundedReceiver<ServerFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChatSession::new(state, tx), rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerFrame>) -> Vec<ServerFrame> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    const HAPPY_SCRIPT: &str = r#"
printf '{"type":"content_block_delta","delta":{"text":"Hi "}}\n'
printf '{"type":"content_block_delta","delta":{"text":"there"}}\n'
printf '{"type":"result","result":"Hi there","session_id":"sess-1"}\n'
"#;

    #[tokio::test]
    async fn test_invalid_json_frame() {
        let dir = tempdir().unwrap();
        let state = script_state(dir.path(), HAPPY_SCRIPT);
        let (session, mut rx) = session(state);

        session.handle_frame("{not json").await;

        assert_eq!(drain(&mut rx), vec![ServerFrame::error("Invalid JSON")]);
        assert!(!session.is_streaming());
    }

    #[tokio::test]
    async fn test_malformed_frame_missing_fields() {
        let dir = tempdir().unwrap();
        let state = script_state(dir.path(), HAPPY_SCRIPT);
        let (session, mut rx) = session(state);

        session
            .handle_frame(r#"{"type":"message","threadId":"t1"}"#)
            .await;
        session
            .handle_frame(r#"{"type":"message","threadId":"t1","content":""}"#)
            .await;

        let frames = drain(&mut rx);
        assert_eq!(
            frames,
            vec![
                ServerFrame::error("Invalid message format"),
                ServerFrame::error("Invalid message format"),
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_thread() {
        let dir = tempdir().unwrap();
        let state = script_state(dir.path(), HAPPY_SCRIPT);
        let (session, mut rx) = session(state.clone());

        session
            .handle_frame(r#"{"type":"message","threadId":"missing","content":"hi"}"#)
            .await;

        assert_eq!(drain(&mut rx), vec![ServerFrame::error("Thread not found")]);
        assert!(!session.is_streaming());
    }

    #[tokio::test]
    async fn test_full_turn_persists_and_reports() {
        let dir = tempdir().unwrap();
        let state = script_state(dir.path(), HAPPY_SCRIPT);
        let thread = state.repo.create_thread("New conversation").unwrap();
        let (session, mut rx) = session(state.clone());

        session
            .handle_frame(&format!(
                r#"{{"type":"message","threadId":"{}","content":"say hi"}}"#,
                thread.id
            ))
            .await;

        let frames = drain(&mut rx);
        assert_eq!(
            &frames[..3],
            &[
                ServerFrame::Token { text: "Hi ".to_string() },
                ServerFrame::Token { text: "there".to_string() },
                ServerFrame::Token { text: "Hi there".to_string() },
            ]
        );

        let messages = state.repo.get_messages(&thread.id).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[0].content, "say hi");
        assert_eq!(messages[1].role, MessageRole::Assistant);
        assert_eq!(messages[1].content, "Hi there");

        // Done frame carries the persisted assistant message id
        assert!(frames
            .iter()
            .any(|f| matches!(f, ServerFrame::Done { message_id } if *message_id == messages[1].id)));

        let updated = state.repo.get_thread(&thread.id).unwrap().unwrap();
        assert_eq!(updated.session_id.as_deref(), Some("sess-1"));
        // Title derives from the first user message
        assert_eq!(updated.title, "say hi");

        assert!(!session.is_streaming());
    }

    #[tokio::test]
    async fn test_title_set_only_from_first_message() {
        let dir = tempdir().unwrap();
        let state = script_state(dir.path(), HAPPY_SCRIPT);
        let thread = state.repo.create_thread("New conversation").unwrap();
        let (session, mut rx) = session(state.clone());

        for content in ["first message", "second message"] {
            session
                .handle_frame(&format!(
                    r#"{{"type":"message","threadId":"{}","content":"{}"}}"#,
                    thread.id, content
                ))
                .await;
        }
        drain(&mut rx);

        let updated = state.repo.get_thread(&thread.id).unwrap().unwrap();
        assert_eq!(updated.title, "first message");
    }

    #[tokio::test]
    async fn test_frames_dropped_while_streaming() {
        let dir = tempdir().unwrap();
        let state = script_state(dir.path(), HAPPY_SCRIPT);
        let thread = state.repo.create_thread("t").unwrap();
        let (session, mut rx) = session(state.clone());

        // Simulate an in-flight turn
        session.set_streaming(true);
        session
            .handle_frame(&format!(
                r#"{{"type":"message","threadId":"{}","content":"hi"}}"#,
                thread.id
            ))
            .await;
        session.set_streaming(false);

        // Nothing sent, nothing persisted, no invocation
        assert!(drain(&mut rx).is_empty());
        assert!(state.repo.get_messages(&thread.id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_error_turn_releases_lock() {
        let dir = tempdir().unwrap();
        let state = script_state(dir.path(), r#"echo "no such container" >&2; exit 1"#);
        let thread = state.repo.create_thread("t").unwrap();
        let (session, mut rx) = session(state.clone());

        session
            .handle_frame(&format!(
                r#"{{"type":"message","threadId":"{}","content":"hi"}}"#,
                thread.id
            ))
            .await;

        let frames = drain(&mut rx);
        assert!(frames
            .iter()
            .any(|f| matches!(f, ServerFrame::Error { message } if message.contains("unavailable"))));
        assert!(!frames.iter().any(|f| matches!(f, ServerFrame::Done { .. })));
        assert!(!session.is_streaming());

        // The user message was persisted before the failure; no assistant reply
        let messages = state.repo.get_messages(&thread.id).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, MessageRole::User);
    }

    #[tokio::test]
    async fn test_session_id_supplied_on_next_turn() {
        let dir = tempdir().unwrap();
        // Resumed turns answer differently, proving the token round-trip
        let state = script_state(
            dir.path(),
            r#"
case "$*" in
  *--resume*) printf '{"type":"result","result":"resumed","session_id":"sess-2"}\n';;
  *) printf '{"type":"result","result":"fresh","session_id":"sess-1"}\n';;
esac
"#,
        );
        let thread = state.repo.create_thread("t").unwrap();
        let (session, mut rx) = session(state.clone());
        let frame = format!(
            r#"{{"type":"message","threadId":"{}","content":"hi"}}"#,
            thread.id
        );

        session.handle_frame(&frame).await;
        let first = drain(&mut rx);
        assert!(first
            .iter()
            .any(|f| matches!(f, ServerFrame::Token { text } if text == "fresh")));

        session.handle_frame(&frame).await;
        let second = drain(&mut rx);
        assert!(second
            .iter()
            .any(|f| matches!(f, ServerFrame::Token { text } if text == "resumed")));

        let updated = state.repo.get_thread(&thread.id).unwrap().unwrap();
        assert_eq!(updated.session_id.as_deref(), Some("sess-2"));
    }

    #[tokio::test]
    async fn test_degenerate_close_releases_lock() {
        let dir = tempdir().unwrap();
        // Clean exit, no result record: no Done, no Error, lock released
        let state = script_state(dir.path(), "exit 0");
        let thread = state.repo.create_thread("t").unwrap();
        let (session, mut rx) = session(state.clone());

        session
            .handle_frame(&format!(
                r#"{{"type":"message","threadId":"{}","content":"hi"}}"#,
                thread.id
            ))
            .await;

        let frames = drain(&mut rx);
        assert!(!frames.iter().any(|f| matches!(f, ServerFrame::Done { .. })));
        assert!(!frames.iter().any(|f| matches!(f, ServerFrame::Error { .. })));
        assert!(!session.is_streaming());
    }
}
