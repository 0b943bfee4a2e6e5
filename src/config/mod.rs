//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ClientConfig (validated, immutable)
//!     → ResiliencePipeline::new (policies built once)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → ResiliencePipeline::reload swaps policies atomically
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Invalid configs are rejected at construction, never at request time
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::ConfigError;
pub use schema::ClientConfig;
pub use schema::BreakerConfig;
pub use schema::RetryConfig;
pub use schema::ClassifierConfig;
pub use schema::TimeoutConfig;
pub use schema::ObservabilityConfig;
