//! Infrastructure layer.
//!
//! Technical concerns that support the application without containing
//! gateway logic.
//!
//! # Submodules
//!
//! - [`bootstrap`] - Composition root for runtime wiring
//! - [`config`] - Configuration loading, validation and logging setup

pub mod bootstrap;
pub mod config;
