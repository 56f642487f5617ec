//! Turn Controller
//!
//! Gates which side may issue a shot. The turn flips exactly once per shot:
//! the flip is edge-triggered on the moving -> settled transition, not on the
//! settled level itself.

use crate::game::disc::Team;

/// Turn state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    /// World is at rest; `owner` may shoot.
    Settled(Team),
    /// A shot has been applied and the world has not settled since.
    ShotInFlight {
        /// Who took the shot.
        owner: Team,
    },
}

/// Tracks turn ownership across shots and settles.
#[derive(Debug)]
pub struct TurnController {
    state: TurnState,
    prev_moving: bool,
}

impl TurnController {
    /// Start with `owner` holding the opening turn.
    pub fn new(owner: Team) -> Self {
        Self {
            state: TurnState::Settled(owner),
            prev_moving: false,
        }
    }

    /// Current state.
    pub fn state(&self) -> TurnState {
        self.state
    }

    /// The side currently holding the turn.
    pub fn owner(&self) -> Team {
        match self.state {
            TurnState::Settled(owner) => owner,
            TurnState::ShotInFlight { owner } => owner,
        }
    }

    /// True iff the world is settled and `local` holds the turn.
    pub fn can_shoot_now(&self, local: Team) -> bool {
        matches!(self.state, TurnState::Settled(owner) if owner == local)
    }

    /// Record a successful shot application.
    pub fn on_shot_applied(&mut self) {
        if let TurnState::Settled(owner) = self.state {
            self.state = TurnState::ShotInFlight { owner };
        }
    }

    /// Feed the per-tick motion verdict. On the first settled tick after a
    /// moving tick, the turn flips to the other side; returns the new owner
    /// when that happens.
    pub fn observe(&mut self, moving: bool) -> Option<Team> {
        let flipped = if self.prev_moving && !moving {
            if let TurnState::ShotInFlight { owner } = self.state {
                let next = owner.opponent();
                self.state = TurnState::Settled(next);
                Some(next)
            } else {
                None
            }
        } else {
            None
        };
        self.prev_moving = moving;
        flipped
    }

    /// Adopt the turn owner from a peer snapshot. The snapshot sender is
    /// authoritative for between-turns bookkeeping.
    pub fn adopt_owner(&mut self, owner: Team) {
        self.state = TurnState::Settled(owner);
        self.prev_moving = false;
    }

    /// Reset for a kickoff: world at rest, `owner` to play.
    pub fn reset(&mut self, owner: Team) {
        self.state = TurnState::Settled(owner);
        self.prev_moving = false;
    }
}

// =============================================================================
// TESTS
// =============================================================================
