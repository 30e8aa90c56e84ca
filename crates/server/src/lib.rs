//! HTTP boundary of the maintenance copilot: `/health` and `/v1/chat`.

pub mod app;
pub mod bootstrap;
pub mod health;

pub use app::{router, AppState};
