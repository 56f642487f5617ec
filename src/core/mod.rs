//! Core primitives.
//!
//! Vector math and state fingerprinting shared by the physics world and the
//! sync protocol.

pub mod hash;
pub mod vec2;

// Re-export core types
pub use hash::{Fingerprint, StateHasher};
pub use vec2::Vec2;
