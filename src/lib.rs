//! # Disc Duel
//!
//! Peer-to-peer engine for a turn-based disc football game. Both peers run
//! the full simulation locally; only shot commands cross the wire, and a
//! fingerprint/snapshot exchange repairs the residual drift of two
//! independent floating-point simulations.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        DISC DUEL                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/            - Shared primitives                        │
//! │  ├── vec2.rs      - 2D float vector                          │
//! │  └── hash.rs      - Domain-separated state fingerprints      │
//! │                                                              │
//! │  game/            - Local simulation                         │
//! │  ├── config.rs    - Empirical tuning constants               │
//! │  ├── disc.rs      - Disc entity and team roles               │
//! │  ├── world.rs     - Integration, collisions, settle, goals   │
//! │  └── turn.rs      - Turn ownership state machine             │
//! │                                                              │
//! │  net/             - Peer-to-peer sync over UDP               │
//! │  ├── protocol.rs  - Line-delimited JSON wire messages        │
//! │  ├── reliable.rs  - Shot retransmission and dedup            │
//! │  └── peer.rs      - Socket tasks: recv, handshake, pacing    │
//! │                                                              │
//! │  session.rs       - One peer's match: world + turn + link    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Consistency Model
//!
//! The simulation is deterministic-in-intent, not bit-exact: both sides
//! apply the same shots to the same constants, and small divergence is
//! expected. While both worlds are at rest, peers exchange state
//! fingerprints; a mismatch pulls a full snapshot across and blends the
//! local world towards it, so corrections are invisible during play.
//!
//! Iteration over discs is in ascending-id order everywhere (collision
//! pairs, fingerprints, snapshots), which keeps the two simulations as
//! close as the arithmetic allows.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod net;
pub mod session;

// Re-export commonly used types
pub use crate::core::hash::Fingerprint;
pub use crate::core::vec2::Vec2;
pub use crate::game::config::WorldConfig;
pub use crate::game::disc::{Disc, Team};
pub use crate::game::world::{World, WorldSnapshot};
pub use crate::net::peer::LinkStatus;
pub use crate::session::{MatchEvent, MatchSession, SessionConfig, ShotError};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
