//! Avatar API Library Crate
//!
//! This library contains the web layer for the avatar service: configuration,
//! application state, API handlers, and routing. The `api` binary is a thin
//! wrapper around this library.

pub mod config;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
