//! Tern - autonomous coding assistant
//!
//! This library provides the control core of a coding agent: a bounded
//! conversation loop with tool dispatch, conversation compaction against a
//! token budget, and compact session continuity.

pub mod agent;
pub mod config;
pub mod error;
pub mod session;
pub mod tools;
pub mod ui;

pub use error::{Error, Result};
