//! Cinefeed - Media catalog aggregation server
//!
//! This library crate exposes the core functionality for integration testing.

pub mod config;
pub mod model;
pub mod posters;
pub mod provider;
pub mod query;
pub mod refresh;
pub mod server;
pub mod service;
pub mod store;
