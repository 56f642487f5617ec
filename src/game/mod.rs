//! Game Logic Module
//!
//! The local simulation: entities, physics, settle detection and turn
//! gating. Everything here is owned and mutated by a single peer; the sync
//! protocol in `net` keeps two such worlds consistent.
//!
//! ## Module Structure
//!
//! - `config`: empirical tuning constants
//! - `disc`: disc entity and team roles
//! - `world`: integration, collisions, settle hysteresis, snapshots
//! - `turn`: turn ownership state machine

pub mod config;
pub mod disc;
pub mod turn;
pub mod world;

// Re-export key types
pub use config::WorldConfig;
pub use disc::{Disc, Team};
pub use turn::{TurnController, TurnState};
pub use world::{SnapshotDisc, World, WorldSnapshot};
