//! Match Session
//!
//! Ties the pieces together for one peer of a match: owns the world, the
//! turn controller and the network link, converts wall-clock time into
//! fixed physics steps, applies local and remote shots, and runs the
//! fingerprint/snapshot reconciliation while the world is at rest.
//!
//! The caller drives `tick` from its frame loop and renders from `world()`;
//! everything else is internal.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::game::config::WorldConfig;
use crate::game::disc::Team;
use crate::game::turn::TurnController;
use crate::game::world::World;
use crate::net::peer::{Inbound, LinkStatus, NetError, PeerConfig, UdpPeer};

/// Session tuning.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Fixed physics step (s).
    pub physics_step: f32,
    /// Cap on banked simulation time after a stall (s).
    pub max_accumulator: f32,
    /// How often the settled-world fingerprint is broadcast.
    pub fingerprint_interval: Duration,
    /// Minimum spacing between snapshot requests.
    pub snapshot_req_cooldown: Duration,
    /// Goals needed to win the match.
    pub goals_to_win: u32,
    /// Physics constants; identical on both peers.
    pub world: WorldConfig,
    /// Transport tuning.
    pub peer: PeerConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            physics_step: 1.0 / 120.0,
            max_accumulator: 0.25,
            fingerprint_interval: Duration::from_secs(1),
            snapshot_req_cooldown: Duration::from_secs(2),
            goals_to_win: 3,
            world: WorldConfig::default(),
            peer: PeerConfig::default(),
        }
    }
}

/// Things the embedding frontend should react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchEvent {
    /// The peer link came up.
    Connected,
    /// The handshake window elapsed with no peer.
    ConnectionFailed,
    /// The turn changed hands.
    TurnChanged {
        /// New owner.
        owner: Team,
    },
    /// A goal was scored; play restarts from kickoff.
    Goal {
        /// Scoring side.
        team: Team,
        /// Running (blue, red) score.
        score: (u32, u32),
    },
    /// The match is over.
    MatchEnded {
        /// Winning side.
        winner: Team,
        /// Final (blue, red) score.
        score: (u32, u32),
    },
}

/// Why a local shot was rejected.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ShotError {
    /// The match has already been decided.
    #[error("match is over")]
    MatchOver,
    /// Not settled, or the other side holds the turn.
    #[error("not your turn")]
    NotYourTurn,
    /// No such piece, or it is not a shootable piece.
    #[error("piece {0} cannot be shot")]
    InvalidPiece(u32),
}

/// Session setup failures.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The local side must be blue or red.
    #[error("local team must be blue or red")]
    UnplayableTeam,
    /// Transport setup failed.
    #[error(transparent)]
    Net(#[from] NetError),
}

/// One peer's view of a running match.
pub struct MatchSession {
    cfg: SessionConfig,
    local_team: Team,
    world: World,
    turn: TurnController,
    peer: UdpPeer,

    accumulator: f32,
    tick_count: u64,
    score: (u32, u32),
    winner: Option<Team>,

    prev_status: LinkStatus,
    last_fingerprint: Option<Instant>,
    last_snapshot_req: Option<Instant>,
}

impl MatchSession {
    /// Bind the local socket, start the handshake and stand at kickoff with
    /// `starting_turn` to play. Both peers must agree on the config, the
    /// match id and the starting turn out of band.
    pub async fn begin(
        cfg: SessionConfig,
        match_id: String,
        local_addr: SocketAddr,
        peer_addr: SocketAddr,
        local_team: Team,
        starting_turn: Team,
    ) -> Result<Self, SessionError> {
        if !local_team.is_playable() || !starting_turn.is_playable() {
            return Err(SessionError::UnplayableTeam);
        }
        let local_name = match local_team {
            Team::Blue => "blue",
            Team::Red => "red",
            Team::Ball => unreachable!(),
        };
        let peer = UdpPeer::start(
            cfg.peer.clone(),
            local_addr,
            peer_addr,
            match_id.clone(),
            local_name.to_string(),
        )
        .await?;

        info!(%match_id, ?local_team, ?starting_turn, "match session started");
        Ok(Self {
            world: World::new(cfg.world.clone()),
            turn: TurnController::new(starting_turn),
            cfg,
            local_team,
            peer,
            accumulator: 0.0,
            tick_count: 0,
            score: (0, 0),
            winner: None,
            prev_status: LinkStatus::Connecting,
            last_fingerprint: None,
            last_snapshot_req: None,
        })
    }

    /// The side this session plays.
    pub fn local_team(&self) -> Team {
        self.local_team
    }

    /// Read access for rendering.
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Current link status.
    pub fn link_status(&self) -> LinkStatus {
        self.peer.status()
    }

    /// (blue, red) goals.
    pub fn score(&self) -> (u32, u32) {
        self.score
    }

    /// The winner, once decided.
    pub fn winner(&self) -> Option<Team> {
        self.winner
    }

    /// Current turn owner.
    pub fn turn_owner(&self) -> Team {
        self.turn.owner()
    }

    /// Physics steps executed so far.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// True when the local side may shoot right now.
    pub fn can_shoot_now(&self) -> bool {
        self.winner.is_none() && self.turn.can_shoot_now(self.local_team)
    }

    /// Apply a local shot and queue it for reliable delivery to the peer.
    pub fn submit_local_shot(
        &mut self,
        piece_id: u32,
        angle: f32,
        power: f32,
    ) -> Result<(), ShotError> {
        if self.winner.is_some() {
            return Err(ShotError::MatchOver);
        }
        if !self.turn.can_shoot_now(self.local_team) {
            return Err(ShotError::NotYourTurn);
        }
        if !self.world.apply_shot(piece_id, angle, power) {
            return Err(ShotError::InvalidPiece(piece_id));
        }
        self.turn.on_shot_applied();
        self.peer.send_shot(piece_id, angle, power);
        debug!(piece_id, angle, power, "local shot applied");
        Ok(())
    }

    /// Advance the session by `dt` seconds of wall-clock time. Drains the
    /// network inbox, runs whole fixed physics steps out of the accumulator
    /// and returns the events produced along the way.
    pub fn tick(&mut self, dt: f32) -> Vec<MatchEvent> {
        let mut events = Vec::new();

        self.observe_link(&mut events);

        for inbound in self.peer.poll() {
            self.handle_inbound(inbound);
        }

        self.accumulator = (self.accumulator + dt.max(0.0)).min(self.cfg.max_accumulator);
        while self.accumulator >= self.cfg.physics_step {
            self.accumulator -= self.cfg.physics_step;
            self.run_step(&mut events);
        }

        self.publish_fingerprint();
        events
    }

    /// Stop the network tasks. The session is unusable afterwards.
    pub fn stop(&self) {
        self.peer.stop();
    }

    fn observe_link(&mut self, events: &mut Vec<MatchEvent>) {
        let status = self.peer.status();
        if status != self.prev_status {
            match status {
                LinkStatus::Connected => events.push(MatchEvent::Connected),
                LinkStatus::TimedOut => events.push(MatchEvent::ConnectionFailed),
                LinkStatus::Connecting => {}
            }
            self.prev_status = status;
        }
    }

    fn handle_inbound(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::Shot {
                piece,
                angle,
                power,
            } => {
                if self.winner.is_some() {
                    debug!(piece, "remote shot after match end ignored");
                    return;
                }
                // The transport already dedups; a surviving shot is applied
                // unconditionally. Divergence, if any, is repaired by the
                // snapshot channel.
                if self.world.apply_shot(piece, angle, power) {
                    self.turn.on_shot_applied();
                    debug!(piece, angle, power, "remote shot applied");
                } else {
                    warn!(piece, "remote shot names an unknown piece");
                }
            }
            Inbound::PeerFingerprint { tick, hash } => {
                if !self.world.settled() {
                    return;
                }
                let ours = self.world.fingerprint().to_hex();
                if ours == hash {
                    return;
                }
                let now = Instant::now();
                let cooled = self
                    .last_snapshot_req
                    .map_or(true, |t| now.duration_since(t) >= self.cfg.snapshot_req_cooldown);
                if cooled {
                    warn!(
                        peer_tick = tick,
                        theirs = %hash,
                        ours = %ours,
                        "state fingerprints diverged, requesting snapshot"
                    );
                    self.peer.send_snapshot_request(self.tick_count);
                    self.last_snapshot_req = Some(now);
                }
            }
            Inbound::SnapshotRequest { tick } => {
                if self.world.settled() {
                    debug!(peer_tick = tick, "answering snapshot request");
                    self.peer
                        .send_snapshot(self.tick_count, self.world.make_snapshot(self.turn.owner()));
                }
            }
            Inbound::Snapshot { tick, state } => {
                if let Some(owner) = self.world.apply_snapshot_soft(&state) {
                    info!(peer_tick = tick, ?owner, "soft-correcting towards peer snapshot");
                    self.turn.adopt_owner(owner);
                }
            }
        }
    }

    fn run_step(&mut self, events: &mut Vec<MatchEvent>) {
        self.world.step(self.cfg.physics_step);
        self.tick_count += 1;

        let moving = self.world.any_moving();
        if let Some(owner) = self.turn.observe(moving) {
            info!(?owner, "turn changed");
            events.push(MatchEvent::TurnChanged { owner });
        }

        if self.winner.is_none() {
            if let Some(team) = self.world.check_goal() {
                self.record_goal(team, events);
            }
        }
    }

    fn record_goal(&mut self, team: Team, events: &mut Vec<MatchEvent>) {
        match team {
            Team::Blue => self.score.0 += 1,
            Team::Red => self.score.1 += 1,
            Team::Ball => return,
        }
        info!(?team, score = ?self.score, "goal");
        events.push(MatchEvent::Goal {
            team,
            score: self.score,
        });

        let goals = match team {
            Team::Blue => self.score.0,
            _ => self.score.1,
        };
        if goals >= self.cfg.goals_to_win {
            self.winner = Some(team);
            info!(winner = ?team, "match over");
            events.push(MatchEvent::MatchEnded {
                winner: team,
                score: self.score,
            });
            return;
        }

        // Kickoff restart; the conceding side plays next.
        self.world.reset_kickoff();
        self.turn.reset(team.opponent());
        events.push(MatchEvent::TurnChanged {
            owner: team.opponent(),
        });
    }

    fn publish_fingerprint(&mut self) {
        if self.winner.is_some() || !self.world.settled() {
            return;
        }
        let now = Instant::now();
        let due = self
            .last_fingerprint
            .map_or(true, |t| now.duration_since(t) >= self.cfg.fingerprint_interval);
        if due {
            self.peer
                .send_state_hash(self.tick_count, self.world.fingerprint().to_hex());
            self.last_fingerprint = Some(now);
        }
    }

    #[cfg(test)]
    fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::vec2::Vec2;
    use tokio::net::UdpSocket;
    use tokio::time::sleep;

    fn test_session_config() -> SessionConfig {
        SessionConfig {
            fingerprint_interval: Duration::from_millis(100),
            snapshot_req_cooldown: Duration::from_millis(200),
            peer: PeerConfig {
                hello_interval: Duration::from_millis(20),
                handshake_timeout: Duration::from_secs(2),
                resend_interval: Duration::from_millis(25),
                max_resend_attempts: 12,
                pacer_tick: Duration::from_millis(5),
                inbox_capacity: 64,
            },
            ..SessionConfig::default()
        }
    }

    async fn two_free_ports() -> (SocketAddr, SocketAddr) {
        let a = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let b = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let (addr_a, addr_b) = (a.local_addr().unwrap(), b.local_addr().unwrap());
        drop(a);
        drop(b);
        (addr_a, addr_b)
    }

    async fn start_pair(match_id: &str) -> (MatchSession, MatchSession) {
        let (addr_a, addr_b) = two_free_ports().await;
        let blue = MatchSession::begin(
            test_session_config(),
            match_id.to_string(),
            addr_a,
            addr_b,
            Team::Blue,
            Team::Blue,
        )
        .await
        .unwrap();
        let red = MatchSession::begin(
            test_session_config(),
            match_id.to_string(),
            addr_b,
            addr_a,
            Team::Red,
            Team::Blue,
        )
        .await
        .unwrap();
        (blue, red)
    }

    /// Drive both sessions through `frames` frames of 1/60 s, yielding to
    /// the runtime between frames so the socket tasks run.
    async fn pump(
        a: &mut MatchSession,
        b: &mut MatchSession,
        frames: u32,
    ) -> (Vec<MatchEvent>, Vec<MatchEvent>) {
        let mut ev_a = Vec::new();
        let mut ev_b = Vec::new();
        for _ in 0..frames {
            ev_a.extend(a.tick(1.0 / 60.0));
            ev_b.extend(b.tick(1.0 / 60.0));
            sleep(Duration::from_millis(1)).await;
        }
        (ev_a, ev_b)
    }

    #[tokio::test]
    async fn test_sessions_connect() {
        let (mut blue, mut red) = start_pair("m-connect").await;
        let (ev_a, ev_b) = pump(&mut blue, &mut red, 60).await;
        assert!(ev_a.contains(&MatchEvent::Connected));
        assert!(ev_b.contains(&MatchEvent::Connected));
        blue.stop();
        red.stop();
    }

    #[tokio::test]
    async fn test_shot_gating() {
        let (mut blue, mut red) = start_pair("m-gate").await;
        pump(&mut blue, &mut red, 30).await;

        // Blue opens; red must wait.
        assert!(blue.can_shoot_now());
        assert!(!red.can_shoot_now());
        assert_eq!(
            red.submit_local_shot(5, 0.0, 0.5),
            Err(ShotError::NotYourTurn)
        );

        // The ball is not a shootable piece.
        let ball_id = blue.world().ball_id;
        assert_eq!(
            blue.submit_local_shot(ball_id, 0.0, 0.5),
            Err(ShotError::InvalidPiece(ball_id))
        );

        // A real shot, then no second shot while in flight.
        blue.submit_local_shot(0, 0.3, 0.5).unwrap();
        assert_eq!(
            blue.submit_local_shot(1, 0.0, 0.5),
            Err(ShotError::NotYourTurn)
        );
        blue.stop();
        red.stop();
    }

    #[tokio::test]
    async fn test_shot_replicates_and_turn_flips_on_both() {
        let (mut blue, mut red) = start_pair("m-replicate").await;
        pump(&mut blue, &mut red, 30).await;
        assert_eq!(blue.link_status(), LinkStatus::Connected);

        blue.submit_local_shot(0, 0.2, 0.6).unwrap();

        // Enough simulated time for the shot to cross, play out and settle.
        let (ev_a, ev_b) = pump(&mut blue, &mut red, 600).await;

        assert!(blue.world().settled());
        assert!(red.world().settled());
        assert!(ev_a.contains(&MatchEvent::TurnChanged { owner: Team::Red }));
        assert!(ev_b.contains(&MatchEvent::TurnChanged { owner: Team::Red }));
        assert!(red.can_shoot_now());
        assert!(!blue.can_shoot_now());

        // Identical commands, identical worlds.
        assert_eq!(
            blue.world().fingerprint().to_hex(),
            red.world().fingerprint().to_hex()
        );
        blue.stop();
        red.stop();
    }

    #[tokio::test]
    async fn test_goal_scores_and_restarts_kickoff() {
        let (mut blue, mut red) = start_pair("m-goal").await;
        pump(&mut blue, &mut red, 10).await;

        // Park the ball touching the right goal mouth.
        let cfg = blue.world().cfg.clone();
        let ball_id = blue.world().ball_id;
        {
            let world = blue.world_mut();
            let ball = world
                .discs
                .iter_mut()
                .find(|d| d.id == ball_id)
                .unwrap();
            ball.pos = Vec2::new(
                cfg.field_width - cfg.margin - ball.radius,
                cfg.field_height / 2.0,
            );
            ball.vel = Vec2::ZERO;
        }

        let events = blue.tick(1.0 / 60.0);
        assert!(events.contains(&MatchEvent::Goal {
            team: Team::Blue,
            score: (1, 0)
        }));
        assert_eq!(blue.score(), (1, 0));
        assert!(blue.winner().is_none());

        // Kickoff restored; conceding red plays next.
        assert_eq!(blue.turn_owner(), Team::Red);
        let ball = blue.world().get(ball_id).unwrap();
        assert_eq!(ball.pos, Vec2::new(cfg.field_width / 2.0, cfg.field_height / 2.0));
        blue.stop();
        red.stop();
    }

    #[tokio::test]
    async fn test_match_ends_at_goal_limit() {
        let (mut blue, mut red) = start_pair("m-end").await;
        pump(&mut blue, &mut red, 10).await;

        let cfg = blue.world().cfg.clone();
        let ball_id = blue.world().ball_id;
        let mut last = Vec::new();
        for _ in 0..blue.cfg.goals_to_win {
            {
                let world = blue.world_mut();
                let ball = world
                    .discs
                    .iter_mut()
                    .find(|d| d.id == ball_id)
                    .unwrap();
                ball.pos = Vec2::new(
                    cfg.field_width - cfg.margin - ball.radius,
                    cfg.field_height / 2.0,
                );
                ball.vel = Vec2::ZERO;
            }
            last = blue.tick(1.0 / 60.0);
        }

        assert!(last.contains(&MatchEvent::MatchEnded {
            winner: Team::Blue,
            score: (3, 0)
        }));
        assert_eq!(blue.winner(), Some(Team::Blue));
        assert_eq!(
            blue.submit_local_shot(0, 0.0, 0.5),
            Err(ShotError::MatchOver)
        );
        blue.stop();
        red.stop();
    }

    #[tokio::test]
    async fn test_snapshot_applies_and_converges() {
        let (mut blue, mut red) = start_pair("m-repair").await;
        pump(&mut blue, &mut red, 30).await;

        // Quiesce blue so only the injected snapshot reaches red.
        blue.stop();

        // Nudge one of red's discs so the settled fingerprints diverge.
        {
            let world = red.world_mut();
            let disc = world.discs.iter_mut().find(|d| d.id == 0).unwrap();
            disc.pos.x += 25.0;
        }
        assert_ne!(
            blue.world().fingerprint().to_hex(),
            red.world().fingerprint().to_hex()
        );

        // Hand red a snapshot of blue's world; soft correction converges
        // over the following ticks.
        let snap = blue.world().make_snapshot(blue.turn_owner());
        red.handle_inbound(Inbound::Snapshot { tick: 0, state: snap });
        for _ in 0..120 {
            red.tick(1.0 / 60.0);
        }
        assert!(!red.world().correcting());
        assert_eq!(
            blue.world().fingerprint().to_hex(),
            red.world().fingerprint().to_hex()
        );
        red.stop();
    }

    #[tokio::test]
    async fn test_fingerprint_mismatch_requests_snapshot() {
        let fake = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let fake_addr = fake.local_addr().unwrap();

        let mut blue = MatchSession::begin(
            test_session_config(),
            "m-drift".to_string(),
            "127.0.0.1:0".parse().unwrap(),
            fake_addr,
            Team::Blue,
            Team::Blue,
        )
        .await
        .unwrap();

        // Learn blue's port from its first HELLO, then greet back.
        let mut buf = vec![0u8; 64 * 1024];
        let blue_addr = loop {
            blue.tick(1.0 / 60.0);
            match tokio::time::timeout(Duration::from_millis(50), fake.recv_from(&mut buf)).await {
                Ok(Ok((_, from))) => break from,
                _ => continue,
            }
        };
        fake.send_to(
            crate::net::protocol::PeerMessage::Hello {
                match_id: "m-drift".into(),
                from: "red".into(),
                udp_port: fake_addr.port(),
            }
            .encode_line()
            .unwrap()
            .as_bytes(),
            blue_addr,
        )
        .await
        .unwrap();

        // A fingerprint blue cannot match forces a snapshot request.
        fake.send_to(
            crate::net::protocol::PeerMessage::StateHash {
                match_id: "m-drift".into(),
                tick: 5,
                hash: "ffffffffffffffff".into(),
            }
            .encode_line()
            .unwrap()
            .as_bytes(),
            blue_addr,
        )
        .await
        .unwrap();

        let mut saw_request = false;
        for _ in 0..100 {
            blue.tick(1.0 / 60.0);
            match tokio::time::timeout(Duration::from_millis(20), fake.recv_from(&mut buf)).await {
                Ok(Ok((len, _))) => {
                    let text = std::str::from_utf8(&buf[..len]).unwrap();
                    for line in text.split('\n') {
                        if let Some(crate::net::protocol::PeerMessage::SnapshotReq { .. }) =
                            crate::net::protocol::PeerMessage::decode_line(line)
                        {
                            saw_request = true;
                        }
                    }
                }
                _ => {}
            }
            if saw_request {
                break;
            }
        }
        assert!(saw_request, "divergent fingerprint must trigger SNAPSHOT_REQ");
        blue.stop();
    }
}
