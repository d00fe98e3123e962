//! Agent system
//!
//! - `Agent`: immutable role, goal, brief and capability set
//! - `AgentBackend`: the single execution operation the runner depends on
//! - `LlmBackend`: ReAct loop over an OpenAI-compatible endpoint
//! - `ScriptedBackend`: canned replies for tests and dry runs

mod base;
mod config;
pub mod prompt;
mod scripted;
mod worker;

pub use base::LlmBackend;
pub use config::*;
pub use prompt::Templates;
pub use scripted::*;
pub use worker::*;
