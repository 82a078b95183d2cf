//! mindmap/crates/domains/src/lib.rs
//!
//! The central domain model and interface definitions for mind maps.

pub mod models;
pub mod ports;
pub mod tree;

// Re-exporting for easier access in other crates
pub use models::*;
pub use ports::*;
pub use tree::{Descendants, MapTree, TreeError, MAX_DEPTH};
