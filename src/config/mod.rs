//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → TelemetryConfig (validated, immutable)
//!     → consumed once when telemetry is attached
//! ```
//!
//! # Design Decisions
//! - Recognised options are enumerated in the schema; no free-form maps
//!   except custom span tags
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::{
    ApplicationTags, HandlerConfig, InstrumentationConfig, LogFormat, ObservabilityConfig,
    ServerConfig, TelemetryConfig, TracedAttribute,
};
