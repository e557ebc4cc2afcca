//! Configuration module
//!
//! Handles loading CLI defaults from a TOML file.

mod settings;

pub use settings::*;
