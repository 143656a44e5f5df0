// Expiry-driven payment-instruction reconciliation
pub mod engine;
pub mod scheduler;

pub use engine::{EngineSettings, ReconciliationEngine};
pub use scheduler::{ExpiryScheduler, SchedulerStatus};
