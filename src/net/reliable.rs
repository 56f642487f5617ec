//! Reliable Delivery
//!
//! Shot commands must survive datagram loss. The sender keeps each shot in
//! an outbox and retransmits it on a fixed cadence until the peer
//! acknowledges its sequence number or the retry budget runs out. The
//! receiver keeps a set of already-applied sequence numbers so retransmitted
//! duplicates are acknowledged but never re-applied.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use tokio::time::Instant;

/// A reliable message awaiting acknowledgement.
#[derive(Debug, Clone)]
struct PendingSend {
    /// Encoded wire line, resent verbatim.
    line: String,
    /// When the next retransmission is due.
    next_resend: Instant,
    /// Sends so far, the initial transmission included.
    attempts: u32,
}

/// Sender-side outbox: sequence allocation, pending tracking, retransmit
/// scheduling.
#[derive(Debug)]
pub struct ReliableOutbox {
    next_seq: u64,
    pending: BTreeMap<u64, PendingSend>,
    resend_interval: Duration,
    max_attempts: u32,
}

impl ReliableOutbox {
    /// New outbox with the given retransmit cadence and retry budget.
    pub fn new(resend_interval: Duration, max_attempts: u32) -> Self {
        Self {
            next_seq: 0,
            pending: BTreeMap::new(),
            resend_interval,
            max_attempts,
        }
    }

    /// Allocate the next sequence number. Strictly increasing, starting at 1.
    pub fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    /// Track an already-sent line for retransmission.
    pub fn track(&mut self, seq: u64, line: String, now: Instant) {
        self.pending.insert(
            seq,
            PendingSend {
                line,
                next_resend: now + self.resend_interval,
                attempts: 1,
            },
        );
    }

    /// Acknowledge `seq`. Returns false for unknown or already-acked
    /// sequence numbers; duplicate acks are harmless.
    pub fn ack(&mut self, seq: u64) -> bool {
        self.pending.remove(&seq).is_some()
    }

    /// Collect retransmissions due at `now`. Returns the lines to resend and
    /// the sequence numbers whose retry budget is exhausted; the latter are
    /// dropped from the outbox.
    pub fn due(&mut self, now: Instant) -> (Vec<String>, Vec<u64>) {
        let mut resend = Vec::new();
        let mut expired = Vec::new();
        for (&seq, entry) in self.pending.iter_mut() {
            if now < entry.next_resend {
                continue;
            }
            if entry.attempts >= self.max_attempts {
                expired.push(seq);
                continue;
            }
            entry.attempts += 1;
            entry.next_resend = now + self.resend_interval;
            resend.push(entry.line.clone());
        }
        for seq in &expired {
            self.pending.remove(seq);
        }
        (resend, expired)
    }

    /// Number of unacknowledged messages.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Receiver-side dedup: sequence numbers whose shots have been applied.
#[derive(Debug, Default)]
pub struct SeenSet {
    seen: BTreeSet<u64>,
}

impl SeenSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `seq`. Returns true the first time, false for duplicates.
    pub fn insert_new(&mut self, seq: u64) -> bool {
        self.seen.insert(seq)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_millis(250);

    #[test]
    fn test_seq_strictly_increasing() {
        let mut outbox = ReliableOutbox::new(INTERVAL, 12);
        assert_eq!(outbox.next_seq(), 1);
        assert_eq!(outbox.next_seq(), 2);
        assert_eq!(outbox.next_seq(), 3);
    }

    #[test]
    fn test_ack_removes_pending() {
        let mut outbox = ReliableOutbox::new(INTERVAL, 12);
        let now = Instant::now();
        let seq = outbox.next_seq();
        outbox.track(seq, "line".into(), now);
        assert_eq!(outbox.pending_len(), 1);

        assert!(outbox.ack(seq));
        assert_eq!(outbox.pending_len(), 0);
        // Duplicate and unknown acks are no-ops.
        assert!(!outbox.ack(seq));
        assert!(!outbox.ack(999));
    }

    #[test]
    fn test_resend_schedule() {
        let mut outbox = ReliableOutbox::new(INTERVAL, 12);
        let now = Instant::now();
        let seq = outbox.next_seq();
        outbox.track(seq, "shot-1".into(), now);

        // Nothing due before the interval has elapsed.
        let (resend, expired) = outbox.due(now + Duration::from_millis(100));
        assert!(resend.is_empty());
        assert!(expired.is_empty());

        // Due after the interval; rescheduled, not dropped.
        let (resend, expired) = outbox.due(now + INTERVAL);
        assert_eq!(resend, vec!["shot-1".to_string()]);
        assert!(expired.is_empty());
        assert_eq!(outbox.pending_len(), 1);

        // Not due again immediately after a resend.
        let (resend, _) = outbox.due(now + INTERVAL + Duration::from_millis(1));
        assert!(resend.is_empty());
    }

    #[test]
    fn test_retry_budget_exhaustion() {
        let mut outbox = ReliableOutbox::new(INTERVAL, 3);
        let mut now = Instant::now();
        let seq = outbox.next_seq();
        outbox.track(seq, "shot".into(), now);

        // Two more sends reach the budget of three attempts.
        for _ in 0..2 {
            now += INTERVAL;
            let (resend, expired) = outbox.due(now);
            assert_eq!(resend.len(), 1);
            assert!(expired.is_empty());
        }

        // Next due check drops it.
        now += INTERVAL;
        let (resend, expired) = outbox.due(now);
        assert!(resend.is_empty());
        assert_eq!(expired, vec![seq]);
        assert_eq!(outbox.pending_len(), 0);
    }

    #[test]
    fn test_seen_set_dedup() {
        let mut seen = SeenSet::new();
        assert!(seen.insert_new(7));
        assert!(!seen.insert_new(7));
        assert!(seen.insert_new(8));
        // Out-of-order arrivals are fine.
        assert!(seen.insert_new(3));
        assert!(!seen.insert_new(3));
    }
}
