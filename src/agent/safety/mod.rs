//! Command Safety Module
//!
//! AI evaluation of shell commands before the dispatcher runs them.

mod gate;

pub use gate::{
    command_evaluation_schema, safety_config, safety_system_prompt, SafetyGate, SAFETY_TOKEN_LIMIT,
};
