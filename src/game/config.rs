//! World Tuning Constants
//!
//! Every empirical constant of the simulation lives here as a config value.
//! The friction and mass formulas are tuned numbers, not derived physics;
//! changing them changes gameplay, so both peers must run identical configs.

/// Physics and field configuration.
#[derive(Debug, Clone)]
pub struct WorldConfig {
    /// Outer field width in pixels.
    pub field_width: f32,
    /// Outer field height in pixels.
    pub field_height: f32,
    /// Inset from the outer bounds to the playable wall rectangle.
    pub margin: f32,

    /// Radius of a player piece.
    pub piece_radius: f32,
    /// Radius of the neutral ball.
    pub ball_radius: f32,
    /// Ball mass. Pieces derive mass from radius; the ball uses this
    /// fixed value instead.
    pub ball_mass: f32,

    /// Maximum aim drag distance in pixels.
    pub max_drag: f32,
    /// Velocity multiplier: shot speed = power * max_drag * power_scale.
    pub power_scale: f32,

    /// Velocity retained per 1/60 s of simulated time.
    pub friction_per_60fps: f32,
    /// Speed below which velocity is clamped to exactly zero (px/s).
    pub stop_eps: f32,
    /// Consecutive below-threshold frames required to count as settled.
    pub sleep_frames: u32,

    /// Restitution for disc-disc impacts.
    pub restitution: f32,
    /// Restitution for wall bounces.
    pub wall_restitution: f32,

    /// Height of each goal mouth, centered on the side walls.
    pub goal_height: f32,

    /// Per-tick interpolation fraction for soft position correction.
    pub correction_alpha: f32,
    /// Minimum local/snapshot distance before a disc becomes a
    /// correction target (px).
    pub correction_threshold: f32,
    /// Distance at which a correction target counts as reached (px).
    pub correction_done_eps: f32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            field_width: 1000.0,
            field_height: 600.0,
            margin: 60.0,

            piece_radius: 22.0,
            ball_radius: 14.0,
            ball_mass: 196.0,

            max_drag: 150.0,
            power_scale: 12.0,

            friction_per_60fps: 0.985,
            stop_eps: 10.0,
            sleep_frames: 8,

            restitution: 0.92,
            wall_restitution: 0.85,

            goal_height: 180.0,

            correction_alpha: 0.22,
            correction_threshold: 6.0,
            correction_done_eps: 0.8,
        }
    }
}
