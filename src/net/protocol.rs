//! Wire Protocol
//!
//! Peer-to-peer messages exchanged over the unreliable datagram transport.
//! Every message is one line of JSON, tagged by `type` and scoped by a
//! `match` identifier; anything malformed or from another match is dropped
//! at the boundary.

use serde::{Deserialize, Serialize};

use crate::game::world::WorldSnapshot;

/// Messages exchanged between the two peers of a match.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PeerMessage {
    /// Handshake greeting, repeated until acknowledged.
    #[serde(rename = "HELLO")]
    Hello {
        /// Match identifier.
        #[serde(rename = "match")]
        match_id: String,
        /// Sender's display name.
        from: String,
        /// Sender's UDP port.
        #[serde(rename = "udpPort")]
        udp_port: u16,
    },

    /// Handshake acknowledgement. A received `Hello` counts too.
    #[serde(rename = "HELLO_ACK")]
    HelloAck {
        /// Match identifier.
        #[serde(rename = "match")]
        match_id: String,
    },

    /// Reliable shot command; resent until acknowledged.
    #[serde(rename = "SHOT")]
    Shot {
        /// Match identifier.
        #[serde(rename = "match")]
        match_id: String,
        /// Per-peer strictly increasing sequence number.
        seq: u64,
        /// Id of the piece being shot.
        piece: u32,
        /// Shot angle in radians from the +X axis.
        angle: f32,
        /// Shot power in [0, 1].
        power: f32,
    },

    /// Acknowledges a `Shot` by sequence number. Sent for duplicates too.
    #[serde(rename = "SHOT_ACK")]
    ShotAck {
        /// Match identifier.
        #[serde(rename = "match")]
        match_id: String,
        /// Acknowledged sequence number.
        seq: u64,
    },

    /// Periodic fingerprint of the sender's settled world.
    #[serde(rename = "STATE_HASH")]
    StateHash {
        /// Match identifier.
        #[serde(rename = "match")]
        match_id: String,
        /// Sender's tick counter; a diagnostic label, not an ordering key.
        tick: u64,
        /// Hex fingerprint digest.
        hash: String,
    },

    /// Asks the peer for a full snapshot after a fingerprint mismatch.
    #[serde(rename = "SNAPSHOT_REQ")]
    SnapshotReq {
        /// Match identifier.
        #[serde(rename = "match")]
        match_id: String,
        /// Requester's tick counter.
        tick: u64,
    },

    /// Full state dump answering a snapshot request.
    #[serde(rename = "STATE_SNAPSHOT")]
    StateSnapshot {
        /// Match identifier.
        #[serde(rename = "match")]
        match_id: String,
        /// Sender's tick counter.
        tick: u64,
        /// Snapshot payload.
        state: WorldSnapshot,
    },
}

impl PeerMessage {
    /// The match identifier carried on every message.
    pub fn match_id(&self) -> &str {
        match self {
            PeerMessage::Hello { match_id, .. }
            | PeerMessage::HelloAck { match_id }
            | PeerMessage::Shot { match_id, .. }
            | PeerMessage::ShotAck { match_id, .. }
            | PeerMessage::StateHash { match_id, .. }
            | PeerMessage::SnapshotReq { match_id, .. }
            | PeerMessage::StateSnapshot { match_id, .. } => match_id,
        }
    }

    /// Encode as one newline-terminated JSON line.
    pub fn encode_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    /// Decode one line. Malformed input yields `None`; the caller drops it
    /// and continues at the next delimiter.
    pub fn decode_line(line: &str) -> Option<Self> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }
        serde_json::from_str(trimmed).ok()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::disc::Team;
    use crate::game::world::SnapshotDisc;

    #[test]
    fn test_shot_wire_field_names() {
        let msg = PeerMessage::Shot {
            match_id: "m-1".into(),
            seq: 4,
            piece: 2,
            angle: 1.5,
            power: 0.75,
        };
        let line = msg.encode_line().unwrap();
        assert!(line.ends_with('\n'));
        assert!(line.contains("\"type\":\"SHOT\""));
        assert!(line.contains("\"match\":\"m-1\""));
        assert!(line.contains("\"seq\":4"));
        assert!(line.contains("\"piece\":2"));
    }

    #[test]
    fn test_hello_wire_field_names() {
        let msg = PeerMessage::Hello {
            match_id: "m-1".into(),
            from: "blue".into(),
            udp_port: 47101,
        };
        let line = msg.encode_line().unwrap();
        assert!(line.contains("\"type\":\"HELLO\""));
        assert!(line.contains("\"udpPort\":47101"));
        assert!(line.contains("\"from\":\"blue\""));
    }

    #[test]
    fn test_roundtrip_all_variants() {
        let snapshot = WorldSnapshot {
            discs: vec![SnapshotDisc {
                id: 0,
                x: 240,
                y: 190,
                vx: 0.0,
                vy: 0.0,
            }],
            turn_team: Team::Red,
        };
        let messages = vec![
            PeerMessage::Hello {
                match_id: "m".into(),
                from: "red".into(),
                udp_port: 1,
            },
            PeerMessage::HelloAck { match_id: "m".into() },
            PeerMessage::Shot {
                match_id: "m".into(),
                seq: 1,
                piece: 0,
                angle: 0.0,
                power: 1.0,
            },
            PeerMessage::ShotAck {
                match_id: "m".into(),
                seq: 1,
            },
            PeerMessage::StateHash {
                match_id: "m".into(),
                tick: 12,
                hash: "aabbccdd00112233".into(),
            },
            PeerMessage::SnapshotReq {
                match_id: "m".into(),
                tick: 12,
            },
            PeerMessage::StateSnapshot {
                match_id: "m".into(),
                tick: 13,
                state: snapshot,
            },
        ];

        for msg in messages {
            let line = msg.encode_line().unwrap();
            let parsed = PeerMessage::decode_line(&line).expect("decode");
            assert_eq!(parsed.match_id(), "m");
            assert_eq!(line, parsed.encode_line().unwrap());
        }
    }

    #[test]
    fn test_malformed_lines_dropped() {
        assert!(PeerMessage::decode_line("").is_none());
        assert!(PeerMessage::decode_line("   ").is_none());
        assert!(PeerMessage::decode_line("not json").is_none());
        assert!(PeerMessage::decode_line("[1,2,3]").is_none());
        assert!(PeerMessage::decode_line("{\"type\":\"BOGUS\"}").is_none());
        // Missing required field.
        assert!(PeerMessage::decode_line("{\"type\":\"SHOT\",\"match\":\"m\"}").is_none());
    }

    #[test]
    fn test_snapshot_turn_team_as_integer() {
        // turn_team travels as its compact integer tag.
        let msg = PeerMessage::StateSnapshot {
            match_id: "m".into(),
            tick: 1,
            state: WorldSnapshot {
                discs: vec![],
                turn_team: Team::Red,
            },
        };
        let line = msg.encode_line().unwrap();
        assert!(line.contains("\"turn_team\":1"));
    }
}
