//! UDP Peer Transport
//!
//! Owns the datagram socket and the two background tasks that service it:
//!
//! - recv task: reads datagrams, decodes lines, filters by match id,
//!   acknowledges handshakes and shots, dedups shots, and queues decoded
//!   traffic into a bounded inbox for the simulation loop to drain.
//! - pacer task: repeats HELLO until the link is up, assigns shot sequence
//!   numbers, and retransmits unacknowledged shots on a fixed cadence.
//!
//! The simulation loop never blocks on the network: inbound traffic arrives
//! through `poll`, outbound sends are fire-and-forget.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::game::world::WorldSnapshot;
use crate::net::protocol::PeerMessage;
use crate::net::reliable::{ReliableOutbox, SeenSet};

/// Maximum datagram we will read. Snapshots are well under this.
const MAX_DATAGRAM: usize = 64 * 1024;

/// Transport tuning.
#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// How often HELLO is repeated while connecting.
    pub hello_interval: Duration,
    /// Give up on the handshake after this long.
    pub handshake_timeout: Duration,
    /// Retransmit cadence for unacknowledged shots.
    pub resend_interval: Duration,
    /// Total send attempts per shot before it is dropped.
    pub max_resend_attempts: u32,
    /// Pacer wakeup granularity.
    pub pacer_tick: Duration,
    /// Bounded inbox capacity; overflow drops newest.
    pub inbox_capacity: usize,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            hello_interval: Duration::from_millis(200),
            handshake_timeout: Duration::from_secs(8),
            resend_interval: Duration::from_millis(250),
            max_resend_attempts: 12,
            pacer_tick: Duration::from_millis(50),
            inbox_capacity: 256,
        }
    }
}

/// Link lifecycle as seen by the local side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    /// Handshake in progress.
    Connecting,
    /// A HELLO or HELLO_ACK has been seen from the peer.
    Connected,
    /// Handshake window elapsed with no sign of the peer. Terminal.
    TimedOut,
}

/// Decoded peer traffic handed to the simulation loop.
#[derive(Debug, Clone)]
pub enum Inbound {
    /// A new (non-duplicate) remote shot.
    Shot {
        /// Piece id.
        piece: u32,
        /// Angle in radians.
        angle: f32,
        /// Power in [0, 1].
        power: f32,
    },
    /// The peer's settled-world fingerprint.
    PeerFingerprint {
        /// Peer's tick label.
        tick: u64,
        /// Hex digest.
        hash: String,
    },
    /// The peer wants a full snapshot.
    SnapshotRequest {
        /// Peer's tick label.
        tick: u64,
    },
    /// A full snapshot answering our request.
    Snapshot {
        /// Peer's tick label.
        tick: u64,
        /// Snapshot payload.
        state: WorldSnapshot,
    },
}

/// Transport errors surfaced to the caller. Per-datagram losses are not
/// errors; only setup failures are.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// Could not bind or inspect the local socket.
    #[error("socket setup failed: {0}")]
    Socket(#[from] std::io::Error),
}

/// Commands from the simulation side to the pacer task.
enum PacerCommand {
    Shot { piece: u32, angle: f32, power: f32 },
    Ack(u64),
}

/// Handle to a running peer link.
pub struct UdpPeer {
    socket: Arc<UdpSocket>,
    peer_addr: SocketAddr,
    match_id: String,
    inbox: mpsc::Receiver<Inbound>,
    status_rx: watch::Receiver<LinkStatus>,
    pacer_tx: mpsc::UnboundedSender<PacerCommand>,
    shutdown_tx: broadcast::Sender<()>,
}

impl UdpPeer {
    /// Bind `local_addr`, spawn the recv and pacer tasks, and begin the
    /// handshake towards `peer_addr`.
    pub async fn start(
        cfg: PeerConfig,
        local_addr: SocketAddr,
        peer_addr: SocketAddr,
        match_id: String,
        local_name: String,
    ) -> Result<Self, NetError> {
        let socket = Arc::new(UdpSocket::bind(local_addr).await?);
        let local_port = socket.local_addr()?.port();
        info!(%peer_addr, local_port, %match_id, "peer link starting");

        let (inbox_tx, inbox_rx) = mpsc::channel(cfg.inbox_capacity);
        let (status_tx, status_rx) = watch::channel(LinkStatus::Connecting);
        let status_tx = Arc::new(status_tx);
        let (pacer_tx, pacer_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _) = broadcast::channel(1);

        tokio::spawn(recv_loop(
            Arc::clone(&socket),
            peer_addr,
            match_id.clone(),
            inbox_tx,
            Arc::clone(&status_tx),
            pacer_tx.clone(),
            shutdown_tx.subscribe(),
        ));

        tokio::spawn(pacer_loop(
            cfg,
            Arc::clone(&socket),
            peer_addr,
            match_id.clone(),
            local_name,
            local_port,
            pacer_rx,
            status_tx,
            shutdown_tx.subscribe(),
        ));

        Ok(Self {
            socket,
            peer_addr,
            match_id,
            inbox: inbox_rx,
            status_rx,
            pacer_tx,
            shutdown_tx,
        })
    }

    /// Current link status.
    pub fn status(&self) -> LinkStatus {
        *self.status_rx.borrow()
    }

    /// Drain everything currently queued, without blocking.
    pub fn poll(&mut self) -> Vec<Inbound> {
        let mut out = Vec::new();
        while let Ok(msg) = self.inbox.try_recv() {
            out.push(msg);
        }
        out
    }

    /// Queue a shot for reliable delivery.
    pub fn send_shot(&self, piece: u32, angle: f32, power: f32) {
        let _ = self
            .pacer_tx
            .send(PacerCommand::Shot { piece, angle, power });
    }

    /// Fire-and-forget our settled-world fingerprint.
    pub fn send_state_hash(&self, tick: u64, hash: String) {
        self.send_unreliable(&PeerMessage::StateHash {
            match_id: self.match_id.clone(),
            tick,
            hash,
        });
    }

    /// Fire-and-forget a snapshot request.
    pub fn send_snapshot_request(&self, tick: u64) {
        self.send_unreliable(&PeerMessage::SnapshotReq {
            match_id: self.match_id.clone(),
            tick,
        });
    }

    /// Fire-and-forget a full snapshot.
    pub fn send_snapshot(&self, tick: u64, state: WorldSnapshot) {
        self.send_unreliable(&PeerMessage::StateSnapshot {
            match_id: self.match_id.clone(),
            tick,
            state,
        });
    }

    /// Stop the background tasks. Idempotent.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }

    fn send_unreliable(&self, msg: &PeerMessage) {
        send_line(&self.socket, self.peer_addr, msg);
    }
}

/// Encode and send one message, best effort. Datagram loss and transient
/// socket errors are the transport's problem, not ours.
fn send_line(socket: &UdpSocket, addr: SocketAddr, msg: &PeerMessage) {
    match msg.encode_line() {
        Ok(line) => {
            if let Err(e) = socket.try_send_to(line.as_bytes(), addr) {
                debug!("send failed: {e}");
            }
        }
        Err(e) => warn!("message encode failed: {e}"),
    }
}

#[allow(clippy::too_many_arguments)]
async fn recv_loop(
    socket: Arc<UdpSocket>,
    peer_addr: SocketAddr,
    match_id: String,
    inbox: mpsc::Sender<Inbound>,
    status: Arc<watch::Sender<LinkStatus>>,
    pacer: mpsc::UnboundedSender<PacerCommand>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    let mut seen = SeenSet::new();
    loop {
        tokio::select! {
            res = socket.recv_from(&mut buf) => {
                let len = match res {
                    Ok((len, _)) => len,
                    Err(e) => {
                        debug!("recv error: {e}");
                        continue;
                    }
                };
                let Ok(text) = std::str::from_utf8(&buf[..len]) else {
                    debug!("dropping non-utf8 datagram");
                    continue;
                };
                for line in text.split('\n') {
                    let Some(msg) = PeerMessage::decode_line(line) else {
                        continue;
                    };
                    if msg.match_id() != match_id {
                        debug!(got = msg.match_id(), "dropping message from foreign match");
                        continue;
                    }
                    handle_message(msg, &socket, peer_addr, &match_id, &inbox, &status, &pacer, &mut seen);
                }
            }
            _ = shutdown.recv() => break,
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn handle_message(
    msg: PeerMessage,
    socket: &UdpSocket,
    peer_addr: SocketAddr,
    match_id: &str,
    inbox: &mpsc::Sender<Inbound>,
    status: &watch::Sender<LinkStatus>,
    pacer: &mpsc::UnboundedSender<PacerCommand>,
    seen: &mut SeenSet,
) {
    match msg {
        PeerMessage::Hello { from, .. } => {
            // Always answer, even when already connected: the peer's own
            // HELLO repeats until it hears us.
            mark_connected(status, &from);
            send_line(
                socket,
                peer_addr,
                &PeerMessage::HelloAck {
                    match_id: match_id.to_string(),
                },
            );
        }
        PeerMessage::HelloAck { .. } => {
            mark_connected(status, "peer");
        }
        PeerMessage::Shot {
            seq,
            piece,
            angle,
            power,
            ..
        } => {
            // Ack unconditionally so the sender stops retransmitting; apply
            // only the first arrival.
            send_line(
                socket,
                peer_addr,
                &PeerMessage::ShotAck {
                    match_id: match_id.to_string(),
                    seq,
                },
            );
            if seen.insert_new(seq) {
                push_inbound(inbox, Inbound::Shot { piece, angle, power });
            } else {
                debug!(seq, "duplicate shot ignored");
            }
        }
        PeerMessage::ShotAck { seq, .. } => {
            let _ = pacer.send(PacerCommand::Ack(seq));
        }
        PeerMessage::StateHash { tick, hash, .. } => {
            push_inbound(inbox, Inbound::PeerFingerprint { tick, hash });
        }
        PeerMessage::SnapshotReq { tick, .. } => {
            push_inbound(inbox, Inbound::SnapshotRequest { tick });
        }
        PeerMessage::StateSnapshot { tick, state, .. } => {
            push_inbound(inbox, Inbound::Snapshot { tick, state });
        }
    }
}

/// Promote the link to Connected. TimedOut is terminal for the match; a
/// straggling HELLO after the window does not revive it.
fn mark_connected(status: &watch::Sender<LinkStatus>, who: &str) {
    let prev = *status.borrow();
    match prev {
        LinkStatus::Connecting => {
            info!(from = who, "peer link established");
            status.send_replace(LinkStatus::Connected);
        }
        LinkStatus::Connected | LinkStatus::TimedOut => {}
    }
}

fn push_inbound(inbox: &mpsc::Sender<Inbound>, msg: Inbound) {
    if inbox.try_send(msg).is_err() {
        warn!("inbox full, dropping inbound message");
    }
}

#[allow(clippy::too_many_arguments)]
async fn pacer_loop(
    cfg: PeerConfig,
    socket: Arc<UdpSocket>,
    peer_addr: SocketAddr,
    match_id: String,
    local_name: String,
    local_port: u16,
    mut commands: mpsc::UnboundedReceiver<PacerCommand>,
    status: Arc<watch::Sender<LinkStatus>>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let started = Instant::now();
    let mut next_hello = started;
    let mut outbox = ReliableOutbox::new(cfg.resend_interval, cfg.max_resend_attempts);
    let mut interval = tokio::time::interval(cfg.pacer_tick);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            cmd = commands.recv() => {
                match cmd {
                    Some(PacerCommand::Shot { piece, angle, power }) => {
                        let seq = outbox.next_seq();
                        let msg = PeerMessage::Shot {
                            match_id: match_id.clone(),
                            seq,
                            piece,
                            angle,
                            power,
                        };
                        match msg.encode_line() {
                            Ok(line) => {
                                if let Err(e) = socket.try_send_to(line.as_bytes(), peer_addr) {
                                    debug!(seq, "initial shot send failed: {e}");
                                }
                                outbox.track(seq, line, Instant::now());
                                debug!(seq, piece, "shot queued for reliable delivery");
                            }
                            Err(e) => warn!("shot encode failed: {e}"),
                        }
                    }
                    Some(PacerCommand::Ack(seq)) => {
                        if outbox.ack(seq) {
                            debug!(seq, "shot acknowledged");
                        }
                    }
                    None => break,
                }
            }
            _ = interval.tick() => {
                let now = Instant::now();
                if *status.borrow() == LinkStatus::Connecting {
                    if now.duration_since(started) > cfg.handshake_timeout {
                        warn!(%match_id, "handshake timed out, peer unreachable");
                        status.send_replace(LinkStatus::TimedOut);
                    } else if now >= next_hello {
                        send_line(
                            &socket,
                            peer_addr,
                            &PeerMessage::Hello {
                                match_id: match_id.clone(),
                                from: local_name.clone(),
                                udp_port: local_port,
                            },
                        );
                        next_hello = now + cfg.hello_interval;
                    }
                }
                let (resend, expired) = outbox.due(now);
                for line in resend {
                    if let Err(e) = socket.try_send_to(line.as_bytes(), peer_addr) {
                        debug!("retransmit failed: {e}");
                    }
                }
                for seq in expired {
                    // Undeliverable after the full retry budget. The match
                    // continues locally; the fingerprint exchange will catch
                    // the divergence.
                    warn!(seq, "shot delivery retries exhausted, dropping");
                }
            }
            _ = shutdown.recv() => break,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
