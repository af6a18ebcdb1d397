//! Client core for a remote streaming-avatar and video-generation API.
//!
//! The remote service does all the real work (rendering, WebRTC, speech). This
//! crate keeps the call ordering straight, interprets every response into a
//! diagnostic, and gives each caller its own session state.

pub mod avatar;
pub mod backend;
pub mod error;
pub mod interpreter;
pub mod response;
pub mod store;
pub mod streaming;
pub mod transport;
pub mod video;
pub mod viewer;

#[cfg(test)]
mod testing;

pub use error::{Error, RemoteFailure, Result};
