//! Core types and traits for leetbot
//!
//! This crate owns the conversation history manager, the pluggable session
//! stores behind it, configuration loading and logging setup.

pub mod config;
pub mod error;
pub mod logging;
pub mod session;
pub mod utils;

pub use error::{Error, Result};
