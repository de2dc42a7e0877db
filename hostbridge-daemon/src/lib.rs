//! hostbridge daemon library
//!
//! This module exports the internal components of the daemon for testing purposes.

// Linked for its link-time registration only.
extern crate extension_hello;

pub mod bootstrap;
pub mod config;
