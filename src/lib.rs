//! presenced - keeps a working/in-meeting presence in sync with a remote server
//!
//! This library crate exposes internal modules for integration testing.

pub mod config;
pub mod daemon;
pub mod data;
pub mod integrations;
pub mod protocol;
