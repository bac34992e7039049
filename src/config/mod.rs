// src/config/mod.rs

//! Job definition loading and validation for dagrun.
//!
//! Responsibilities:
//! - Define the TOML/JSON-backed plan model (`model.rs`).
//! - Load a plan file from disk (`loader.rs`).
//! - Validate settings and build a [`Job`](crate::dag::Job) (`validate.rs`).
//! - Parse inline action descriptors from the command line (`actions.rs`).

pub mod actions;
pub mod loader;
pub mod model;
pub mod validate;

pub use actions::{INLINE_JOB_ID, parse_action, parse_actions};
pub use loader::{load_and_validate, load_from_path};
pub use model::{BackoffConfig, ConfigSection, DefaultSection, JobFile, RawJobFile, RunSettings, TaskConfig};
