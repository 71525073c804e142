//! Command-line tools for qbridge backends.
//!
//! The binary launches a backend process, talks to it over its stdio and prints
//! what it finds as structured output.

pub mod backend;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod output;
pub mod session;
