// Services module
// Business logic: sandbox invocation engine and chat orchestration

pub mod chat;
pub mod sandbox;
