//! # Mirror Node
//!
//! The assembled engine: configuration, storage, policy pipeline,
//! recognition, governance, updates, workers, and gossip behind one
//! control surface. The HTTP/WebSocket boundary, authentication, and rate
//! limiting live outside this crate and call into `MirrorEngine`.

#![forbid(unsafe_code)]

/// Engine wiring and control surface
pub mod engine;

pub use engine::{EngineDeps, MirrorEngine};
