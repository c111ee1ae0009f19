//! # Provena Binary Crate
//!
//! Library surface of the Provena application. The HTTP API, CLI and
//! configuration layers live here so integration tests can exercise
//! them without spawning a process.

pub mod api;
pub mod cli;
pub mod config;
