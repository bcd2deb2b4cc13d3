//! Configuration module
//!
//! Handles loading and validation of game files: the secret code,
//! countdown, penalties, wire sequence and scheduler timing.

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{ConfigLimits, ConfigLoader, LoadResult, LoadWarning, LoaderOptions};
pub use schema::{ConfigOverrides, DurationValue, GameConfig, WireConfig};
pub use validation::{ValidationResult, Validator};
