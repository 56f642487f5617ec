//! Networking Module
//!
//! Peer-to-peer sync over UDP: newline-delimited JSON messages, a repeated
//! handshake, reliable shot delivery with retransmission and dedup, and the
//! fingerprint/snapshot channel for drift detection and correction.
//!
//! ## Module Structure
//!
//! - `protocol`: wire message types and the line codec
//! - `reliable`: sender outbox and receiver dedup set
//! - `peer`: the UDP socket and its background tasks

pub mod peer;
pub mod protocol;
pub mod reliable;

// Re-export key types
pub use peer::{Inbound, LinkStatus, NetError, PeerConfig, UdpPeer};
pub use protocol::PeerMessage;
pub use reliable::{ReliableOutbox, SeenSet};
