//! # Resolution Engine
//!
//! Selects a remediation strategy for a classified error, runs its simulated
//! action and keeps the attempt history needed to roll a success back.
//!
//! Attempt lifecycle:
//!
//! ```text
//! pending -> in_progress -> success | failed
//! success -> rollback_required -> rollback_success | rollback_failed
//! ```

pub mod error;
pub mod executor;
pub mod selector;
pub mod strategies;

pub use error::ResolutionError;
pub use executor::{ResolutionExecutor, ResolutionStatistics, StrategyStatistics};
pub use selector::{select_strategy, SelectorCacheStats, StrategySelector};
pub use strategies::{StrategyFailure, StrategyOutcome, StrategyRunner, FORCE_FAILURE, FORCE_ROLLBACK_FAILURE};
