pub mod config;
pub mod error;
pub mod harness;
pub mod report;
pub mod summary;

// Re-export common items
pub use config::HarnessConfig;
pub use error::HarnessError;
pub use harness::{run_harness, HarnessRun};
