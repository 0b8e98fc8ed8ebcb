//! Retail copilot engine library - exposes modules for testing.

pub mod batch;
pub mod config;
pub mod drafter;
pub mod engine;
pub mod ollama;
pub mod planner;
pub mod prompts;
pub mod retrieval;
pub mod router;
pub mod store;
pub mod synthesize;
