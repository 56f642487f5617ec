//! Disc Entity
//!
//! A disc is either a player-controlled piece or the shared neutral ball.
//! Mass is a pure function of radius and role, fixed at spawn.

use serde::{Deserialize, Serialize};

use crate::core::vec2::Vec2;

/// Which side a disc belongs to. The ball belongs to neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Team {
    /// Blue side, defends the left goal.
    Blue,
    /// Red side, defends the right goal.
    Red,
    /// The neutral ball.
    Ball,
}

impl Team {
    /// The opposing playable team. The ball has no opponent.
    pub fn opponent(self) -> Team {
        match self {
            Team::Blue => Team::Red,
            Team::Red => Team::Blue,
            Team::Ball => Team::Ball,
        }
    }

    /// True for blue or red, false for the ball.
    pub fn is_playable(self) -> bool {
        !matches!(self, Team::Ball)
    }
}

impl From<Team> for u8 {
    fn from(team: Team) -> u8 {
        match team {
            Team::Blue => 0,
            Team::Red => 1,
            Team::Ball => 2,
        }
    }
}

impl TryFrom<u8> for Team {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Team::Blue),
            1 => Ok(Team::Red),
            2 => Ok(Team::Ball),
            other => Err(format!("invalid team tag: {other}")),
        }
    }
}

/// A circular physics entity.
#[derive(Debug, Clone)]
pub struct Disc {
    /// Stable id, unique per match. Ascending ids fix the collision
    /// processing order.
    pub id: u32,
    /// Owning side, or `Team::Ball`.
    pub team: Team,
    /// Center position (px).
    pub pos: Vec2,
    /// Velocity (px/s). Mutated only by the integrator and `apply_shot`.
    pub vel: Vec2,
    /// Radius (px).
    pub radius: f32,
    /// Mass, derived at spawn and never mutated afterwards.
    pub mass: f32,
}

impl Disc {
    /// Spawn a player piece. Heavier with larger radius (mass = r^2).
    pub fn piece(id: u32, team: Team, pos: Vec2, radius: f32) -> Self {
        Self {
            id,
            team,
            pos,
            vel: Vec2::ZERO,
            radius,
            mass: radius * radius,
        }
    }

    /// Spawn the neutral ball with its configured fixed mass.
    pub fn ball(id: u32, pos: Vec2, radius: f32, mass: f32) -> Self {
        Self {
            id,
            team: Team::Ball,
            pos,
            vel: Vec2::ZERO,
            radius,
            mass,
        }
    }
}
