//! Physics World
//!
//! The local simulation each peer owns exclusively. Only shot input crosses
//! the network; both sides integrate the same commands locally and reconcile
//! residual drift through fingerprints and soft-corrected snapshots while
//! settled.
//!
//! ## Tick order
//!
//! `step(dt)` runs: soft correction drain (settled only), then per-disc
//! integrate + friction + stop clamp + wall reflection, then pairwise
//! collision resolution in ascending-id order. A pair resolved earlier in a
//! tick affects the inputs of later pairs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::hash::{Fingerprint, StateHasher};
use crate::core::vec2::Vec2;
use crate::game::config::WorldConfig;
use crate::game::disc::{Disc, Team};

/// One disc entry in a snapshot. Positions are rounded to integers,
/// velocities to millipixels, matching the fingerprint granularity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotDisc {
    /// Disc id.
    pub id: u32,
    /// Rounded X position.
    pub x: i32,
    /// Rounded Y position.
    pub y: i32,
    /// X velocity, rounded to 3 decimals.
    pub vx: f32,
    /// Y velocity, rounded to 3 decimals.
    pub vy: f32,
}

/// Full positional state dump, produced only while settled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldSnapshot {
    /// Discs sorted by ascending id.
    pub discs: Vec<SnapshotDisc>,
    /// Turn owner at the sender, adopted unconditionally by the receiver.
    pub turn_team: Team,
}

/// The local physics world.
pub struct World {
    /// Tuning constants; identical on both peers.
    pub cfg: WorldConfig,
    /// All discs, spawned in ascending-id order.
    pub discs: Vec<Disc>,
    /// Id of the neutral ball.
    pub ball_id: u32,

    // Settle hysteresis. Starts as already settled so the opening turn can
    // aim immediately.
    below_eps_frames: u32,
    ever_moved: bool,

    // Soft correction targets keyed by disc id; drained only while settled.
    corr_targets: BTreeMap<u32, Vec2>,
}

impl World {
    /// Create a world at the kickoff layout.
    pub fn new(cfg: WorldConfig) -> Self {
        let mut world = Self {
            below_eps_frames: cfg.sleep_frames,
            ever_moved: false,
            corr_targets: BTreeMap::new(),
            discs: Vec::new(),
            ball_id: 0,
            cfg,
        };
        world.spawn_kickoff();
        world
    }

    /// Left playable wall for a disc of radius `r`.
    fn left_bound(&self, r: f32) -> f32 {
        self.cfg.margin + r
    }

    fn right_bound(&self, r: f32) -> f32 {
        self.cfg.field_width - self.cfg.margin - r
    }

    fn top_bound(&self, r: f32) -> f32 {
        self.cfg.margin + r
    }

    fn bottom_bound(&self, r: f32) -> f32 {
        self.cfg.field_height - self.cfg.margin - r
    }

    /// Field center.
    fn center(&self) -> Vec2 {
        Vec2::new(self.cfg.field_width / 2.0, self.cfg.field_height / 2.0)
    }

    /// Reset discs to the kickoff formation and settle counters to the
    /// pre-first-shot state.
    pub fn reset_kickoff(&mut self) {
        self.spawn_kickoff();
    }

    fn spawn_kickoff(&mut self) {
        let c = self.center();
        let r = self.cfg.piece_radius;

        // 5v5 mirrored formation around the center spot.
        let blue = [
            Vec2::new(c.x - 260.0, c.y - 110.0),
            Vec2::new(c.x - 260.0, c.y + 110.0),
            Vec2::new(c.x - 340.0, c.y),
            Vec2::new(c.x - 180.0, c.y),
            Vec2::new(c.x - 340.0, c.y - 210.0),
        ];
        let red = [
            Vec2::new(c.x + 260.0, c.y - 110.0),
            Vec2::new(c.x + 260.0, c.y + 110.0),
            Vec2::new(c.x + 340.0, c.y),
            Vec2::new(c.x + 180.0, c.y),
            Vec2::new(c.x + 340.0, c.y + 210.0),
        ];

        self.discs.clear();
        let mut id = 0;
        for pos in blue {
            self.discs.push(Disc::piece(id, Team::Blue, pos, r));
            id += 1;
        }
        for pos in red {
            self.discs.push(Disc::piece(id, Team::Red, pos, r));
            id += 1;
        }
        self.ball_id = id;
        self.discs
            .push(Disc::ball(id, c, self.cfg.ball_radius, self.cfg.ball_mass));

        self.below_eps_frames = self.cfg.sleep_frames;
        self.ever_moved = false;
        self.corr_targets.clear();
    }

    /// Look up a disc by id.
    pub fn get(&self, id: u32) -> Option<&Disc> {
        self.discs.iter().find(|d| d.id == id)
    }

    fn get_mut(&mut self, id: u32) -> Option<&mut Disc> {
        self.discs.iter_mut().find(|d| d.id == id)
    }

    // -------------------------------------------------------------------------
    // Motion / settle detection
    // -------------------------------------------------------------------------

    /// Hysteresis motion check. Clamps sub-threshold velocities to zero,
    /// then debounces the settled verdict over `sleep_frames` consecutive
    /// quiet frames. Before the very first shot of a match the world counts
    /// as settled immediately.
    pub fn any_moving(&mut self) -> bool {
        let eps_sq = self.cfg.stop_eps * self.cfg.stop_eps;
        let mut any_fast = false;

        for d in &mut self.discs {
            if d.vel.length_squared() <= eps_sq {
                d.vel = Vec2::ZERO;
            } else {
                any_fast = true;
            }
        }

        if any_fast {
            self.ever_moved = true;
            self.below_eps_frames = 0;
            return true;
        }

        if !self.ever_moved {
            self.below_eps_frames = self.cfg.sleep_frames;
            return false;
        }

        self.below_eps_frames += 1;
        self.below_eps_frames < self.cfg.sleep_frames
    }

    /// Non-mutating view of the last settle verdict.
    pub fn settled(&self) -> bool {
        !self.ever_moved || self.below_eps_frames >= self.cfg.sleep_frames
    }

    // -------------------------------------------------------------------------
    // Shots
    // -------------------------------------------------------------------------

    /// Apply a shot command. The only legitimate velocity mutator outside the
    /// integrator; both peers must call it with bit-identical arguments.
    ///
    /// Returns false for an unknown id or the neutral ball, leaving the world
    /// untouched.
    pub fn apply_shot(&mut self, piece_id: u32, angle: f32, power: f32) -> bool {
        let max_drag = self.cfg.max_drag;
        let power_scale = self.cfg.power_scale;
        let disc = match self.get_mut(piece_id) {
            Some(d) if d.team.is_playable() => d,
            _ => return false,
        };

        let p = power.clamp(0.0, 1.0);
        let speed = p * max_drag * power_scale;
        disc.vel = Vec2::from_polar(angle, speed);

        // Motion starts; settle debounce restarts from zero.
        self.ever_moved = true;
        self.below_eps_frames = 0;
        true
    }

    // -------------------------------------------------------------------------
    // Integration
    // -------------------------------------------------------------------------

    /// Advance the world by `dt` seconds.
    pub fn step(&mut self, dt: f32) {
        if dt <= 0.0 {
            return;
        }

        // Corrections run only between turns and stand aside the instant
        // motion starts.
        self.step_soft_correction();

        for d in &mut self.discs {
            if d.vel.length_squared() > 0.0 {
                d.pos += d.vel * dt;

                // Framerate-independent friction: per-1/60s decay raised to
                // the elapsed fraction of a 60 Hz frame.
                let fr = self.cfg.friction_per_60fps.powf(dt * 60.0);
                d.vel *= fr;
            }

            if d.vel.length() < self.cfg.stop_eps {
                d.vel = Vec2::ZERO;
            }

            let left = self.cfg.margin + d.radius;
            let right = self.cfg.field_width - self.cfg.margin - d.radius;
            let top = self.cfg.margin + d.radius;
            let bottom = self.cfg.field_height - self.cfg.margin - d.radius;

            if d.pos.x < left {
                d.pos.x = left;
                d.vel.x *= -self.cfg.wall_restitution;
            } else if d.pos.x > right {
                d.pos.x = right;
                d.vel.x *= -self.cfg.wall_restitution;
            }

            if d.pos.y < top {
                d.pos.y = top;
                d.vel.y *= -self.cfg.wall_restitution;
            } else if d.pos.y > bottom {
                d.pos.y = bottom;
                d.vel.y *= -self.cfg.wall_restitution;
            }
        }

        self.resolve_collisions();
    }

    /// Resolve every unordered disc pair once, in ascending-id order.
    /// Sequential impulses: earlier pairs feed later ones within the tick.
    fn resolve_collisions(&mut self) {
        let n = self.discs.len();
        let e = self.cfg.restitution;
        let stop_eps = self.cfg.stop_eps;
        let mut collided = false;

        for i in 0..n {
            for j in (i + 1)..n {
                let (head, tail) = self.discs.split_at_mut(j);
                let a = &mut head[i];
                let b = &mut tail[0];

                let mut delta = b.pos - a.pos;
                let mut dist = delta.length();
                let min_dist = a.radius + b.radius;

                if dist == 0.0 {
                    // Perfectly stacked discs: separate along a fixed axis.
                    delta = Vec2::new(1.0, 0.0);
                    dist = 1.0;
                }

                if dist >= min_dist {
                    continue;
                }

                collided = true;
                let normal = delta * (1.0 / dist);
                let overlap = min_dist - dist;

                let inv_ma = 1.0 / a.mass;
                let inv_mb = 1.0 / b.mass;
                let inv_sum = inv_ma + inv_mb;

                // Heavier discs move less when separating.
                a.pos -= normal * (overlap * (inv_ma / inv_sum));
                b.pos += normal * (overlap * (inv_mb / inv_sum));

                let rel = b.vel - a.vel;
                let vn = rel.dot(normal);
                if vn > 0.0 {
                    // Already separating.
                    continue;
                }

                let j_imp = -(1.0 + e) * vn / inv_sum;
                let impulse = normal * j_imp;

                a.vel -= impulse * inv_ma;
                b.vel += impulse * inv_mb;

                if a.vel.length() < stop_eps {
                    a.vel = Vec2::ZERO;
                }
                if b.vel.length() < stop_eps {
                    b.vel = Vec2::ZERO;
                }
            }
        }

        if collided {
            self.ever_moved = true;
            self.below_eps_frames = 0;
        }
    }

    // -------------------------------------------------------------------------
    // Goals
    // -------------------------------------------------------------------------

    /// Check whether the ball is pressed into a goal mouth. Returns the
    /// scoring team. Blue defends the left goal, red the right.
    pub fn check_goal(&self) -> Option<Team> {
        let ball = self.get(self.ball_id)?;
        let c = self.center();
        let half_mouth = self.cfg.goal_height / 2.0;
        if (ball.pos.y - c.y).abs() > half_mouth {
            return None;
        }

        const CONTACT_EPS: f32 = 0.5;
        if ball.pos.x <= self.left_bound(ball.radius) + CONTACT_EPS {
            return Some(Team::Red);
        }
        if ball.pos.x >= self.right_bound(ball.radius) - CONTACT_EPS {
            return Some(Team::Blue);
        }
        None
    }

    // -------------------------------------------------------------------------
    // Fingerprint / snapshot
    // -------------------------------------------------------------------------

    /// Short digest over discs sorted by id with integer-rounded positions.
    /// Velocities are excluded: settled worlds have near-zero velocity, so a
    /// velocity difference is not a visible-state disagreement.
    pub fn fingerprint(&self) -> Fingerprint {
        let mut ids: Vec<usize> = (0..self.discs.len()).collect();
        ids.sort_by_key(|&i| self.discs[i].id);

        let mut hasher = StateHasher::for_world();
        for i in ids {
            let d = &self.discs[i];
            hasher.update_u32(d.id);
            hasher.update_i32(d.pos.x.round() as i32);
            hasher.update_i32(d.pos.y.round() as i32);
        }
        hasher.finalize()
    }

    /// Build a snapshot of the current state. Call only while settled.
    pub fn make_snapshot(&self, turn_team: Team) -> WorldSnapshot {
        let mut discs: Vec<SnapshotDisc> = self
            .discs
            .iter()
            .map(|d| SnapshotDisc {
                id: d.id,
                x: d.pos.x.round() as i32,
                y: d.pos.y.round() as i32,
                vx: (d.vel.x * 1000.0).round() / 1000.0,
                vy: (d.vel.y * 1000.0).round() / 1000.0,
            })
            .collect();
        discs.sort_by_key(|d| d.id);
        WorldSnapshot { discs, turn_team }
    }

    /// Register soft-correction targets from a peer snapshot.
    ///
    /// Ignored entirely while the world is moving. Discs already within the
    /// correction threshold are left untouched. Returns the snapshot's turn
    /// owner when the snapshot was accepted, for the caller to adopt.
    pub fn apply_snapshot_soft(&mut self, snap: &WorldSnapshot) -> Option<Team> {
        if !self.settled() {
            return None;
        }

        let threshold = self.cfg.correction_threshold;
        let mut targets = BTreeMap::new();
        for item in &snap.discs {
            let target = Vec2::new(item.x as f32, item.y as f32);
            if let Some(d) = self.get(item.id) {
                if d.pos.distance(target) >= threshold {
                    targets.insert(item.id, target);
                }
            }
        }

        if !targets.is_empty() {
            self.corr_targets = targets;
        }

        Some(snap.turn_team)
    }

    /// True while correction targets remain to be drained.
    pub fn correcting(&self) -> bool {
        !self.corr_targets.is_empty()
    }

    /// Pull each target disc a fixed fraction toward its goal; zero its
    /// velocity; clear the target once within tolerance.
    fn step_soft_correction(&mut self) {
        if self.corr_targets.is_empty() || !self.settled() {
            return;
        }

        let alpha = self.cfg.correction_alpha;
        let done_eps = self.cfg.correction_done_eps;
        let mut done = Vec::new();

        for (&id, &target) in &self.corr_targets {
            let d = match self.discs.iter_mut().find(|d| d.id == id) {
                Some(d) => d,
                None => {
                    done.push(id);
                    continue;
                }
            };
            d.pos = d.pos.lerp(target, alpha);
            d.vel = Vec2::ZERO;
            if d.pos.distance(target) < done_eps {
                d.pos = target;
                done.push(id);
            }
        }

        for id in done {
            self.corr_targets.remove(&id);
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
