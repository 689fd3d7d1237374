//! finchat Common - Shared configuration, errors, and logging for finchat services.
//!
//! This crate provides:
//! - Configuration types and loading
//! - Configuration validation
//! - Error types and handling utilities
//! - Logging setup and structured logging helpers

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod validation;

pub use config::{ChatConfig, Config, LoadReport, ModelConfig, ObservabilityConfig, ServerConfig};
pub use error::{Error, Result};
pub use validation::{Validate, ValidationError, ValidationResult};
