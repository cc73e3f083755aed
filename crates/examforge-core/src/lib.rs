//! examforge-core: Practice session engine, traits, and scoring.
//!
//! This crate defines the data model, the collaborator traits, and the
//! session state machine that the rest of examforge builds on. It performs
//! no network I/O; backends live in `examforge-providers`.

pub mod access;
pub mod engine;
pub mod error;
pub mod explain;
pub mod model;
pub mod parser;
pub mod report;
pub mod score;
pub mod session;
pub mod shuffle;
pub mod time;
pub mod timer;
pub mod traits;
