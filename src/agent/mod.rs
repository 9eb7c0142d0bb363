//! AI Agent Module
//!
//! This module provides the debugging agent loop:
//! - Action dispatch against files, the shell and the operator
//! - AI safety evaluation before any command runs
//! - Resumable session persistence

pub mod dispatcher;
pub mod operator;
pub mod safety;
pub mod session;

// Re-export commonly used types
pub use dispatcher::{ActionDispatcher, DispatchState, TurnReply};
pub use operator::{ConsoleOperator, Notice, Operator};
pub use safety::SafetyGate;
pub use session::{generate_session_id, SessionContext, SessionStore, DEFAULT_USE_CASE};
