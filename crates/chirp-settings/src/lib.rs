//! # chirp-settings
//!
//! Layered settings for the chirp gateway.
//!
//! Loading flow:
//! 1. Compiled [`GatewaySettings::default()`]
//! 2. Deep-merge of `~/.chirp/settings.json` (when present)
//! 3. `CHIRP_*` environment variable overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{load_settings, load_settings_from_path, settings_path};
pub use types::GatewaySettings;
