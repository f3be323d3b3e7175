//! Core engine modules
//!
//! Shared infrastructure that does not belong to a single subsystem.

pub mod config;
