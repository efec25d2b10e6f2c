//! Ragline Core Library
//!
//! Foundations shared by every ragline crate:
//! - Error handling (`AppError`, `AppResult`)
//! - Logging infrastructure
//! - Layered configuration
//! - Bounded retry policy

pub mod config;
pub mod error;
pub mod logging;
pub mod retry;

pub use config::{AppConfig, BudgetUnit, IndexBackend, SimilarityMetric};
pub use error::{AppError, AppResult, LlmFailure};
pub use retry::{RetryError, RetryPolicy};
