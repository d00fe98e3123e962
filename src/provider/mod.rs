//! LLM Provider layer
//!
//! Chat completions against any endpoint implementing the OpenAI
//! chat completions API.

mod client;
mod config;

pub use client::*;
pub use config::*;
