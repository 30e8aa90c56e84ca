//! Shared building blocks for the maintenance copilot proxy: configuration,
//! the error taxonomy, identity normalization and the work-order/asset/draft
//! records exchanged with the backend.

pub mod config;
pub mod domain;
pub mod errors;
pub mod identity;
pub mod text;

pub use domain::asset::AssetSummary;
pub use domain::draft::{DraftAction, DraftOperation};
pub use domain::work_order::WorkOrderSummary;
pub use errors::{access_failure, AgentError};
pub use identity::UserContext;
