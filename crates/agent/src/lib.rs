//! Agent side of the maintenance copilot.
//!
//! This crate wires a conversational agent runtime to the maintenance backend:
//! - resolves the caller's identity and enforces role and tenant guardrails
//! - exposes the maintenance tool set to the runtime through [`tools::ToolRegistry`]
//! - keeps short-lived per-session conversation memory
//! - orchestrates one chat turn end to end in [`conversation`]
//!
//! # Safety Principle
//!
//! The language model only chooses which tools to call. Every tool re-checks
//! role and tenant before it touches the backend, and writes that need a
//! human's confirmation are returned as drafts instead of being executed.

pub mod backend;
pub mod context;
pub mod conversation;
pub mod guardrails;
pub mod identity;
pub mod llm;
pub mod memory;
pub mod runtime;
pub mod tools;

#[cfg(test)]
mod test_support;

pub use conversation::{ConversationOrchestrator, ConversationRequest, ConversationResponse};
pub use runtime::{AgentRuntime, RuntimeError};
