//! Install and launch engine for a modular Java game client: version
//! inheritance, libraries, assets, natives, launch arguments, and remotely
//! published custom profiles.
//!
//! The engine logs through `tracing` and never installs a subscriber; that is
//! left to the embedding application.

pub mod core;

pub use crate::core::error::{LauncherError, LauncherResult};
pub use crate::core::state::{AppState, LauncherPaths, LauncherSettings};
