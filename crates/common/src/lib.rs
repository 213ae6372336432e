//! Stagewise Common Library
//!
//! Shared pipeline model, configuration, test data generation and data
//! validation for the Stagewise harness.

pub mod config;
pub mod data;
pub mod error;
pub mod types;
pub mod validation;

// Re-export commonly used types
pub use config::{ApiConfig, BrowserConfig, BrowserKind, HarnessConfig, LocatorConfig, PathsConfig};
pub use data::MockDataGenerator;
pub use error::{Error, Result};
pub use types::*;
pub use validation::QualityReport;

/// Stagewise version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
