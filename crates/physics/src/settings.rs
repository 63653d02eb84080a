//! # Simulation Settings
//!
//! Tuning knobs for the solver and the sleep system, plus the fixed capacities
//! of the per-step buffers. Both structs deserialize with defaults for missing
//! fields so a settings file only has to name what it changes.

use serde::{Deserialize, Serialize};

/// Solver and activation tuning.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsSettings {
    /// Fraction of the position error corrected per position iteration.
    pub baumgarte: f32,
    /// Contacts are created when shapes are closer than this distance.
    pub speculative_contact_distance: f32,
    /// Penetration that is tolerated without position correction.
    pub penetration_slop: f32,
    /// Bodies with `LinearCast` quality are swept once they move further than
    /// this fraction of their inner radius in a step.
    pub linear_cast_threshold: f32,
    /// Upper bound on the position correction applied per iteration.
    pub max_penetration_correction: f32,
    /// Contact points of a manifold closer than this are merged.
    pub manifold_tolerance: f32,
    pub num_velocity_steps: u32,
    pub num_position_steps: u32,
    /// Approach speed below which restitution is ignored.
    pub min_velocity_for_restitution: f32,
    /// Consecutive quiet steps before a body may fall asleep.
    pub steps_before_sleep: u32,
    /// A body is quiet when no point on it moves faster than this.
    pub point_velocity_sleep_threshold: f32,
    pub use_manifold_reduction: bool,
    pub constraint_warm_start: bool,
    pub allow_sleeping: bool,
}

impl Default for PhysicsSettings {
    fn default() -> Self {
        Self {
            baumgarte: 0.2,
            speculative_contact_distance: 0.02,
            penetration_slop: 0.02,
            linear_cast_threshold: 0.75,
            max_penetration_correction: 0.2,
            manifold_tolerance: 1.0e-3,
            num_velocity_steps: 10,
            num_position_steps: 2,
            min_velocity_for_restitution: 1.0,
            steps_before_sleep: 30,
            point_velocity_sleep_threshold: 0.03,
            use_manifold_reduction: true,
            constraint_warm_start: true,
            allow_sleeping: true,
        }
    }
}

/// Fixed capacities of the simulation. Overflowing the per-step buffers is
/// reported through [`crate::UpdateError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsLimits {
    pub max_bodies: usize,
    pub max_body_pairs: usize,
    pub max_contact_constraints: usize,
}

impl Default for PhysicsLimits {
    fn default() -> Self {
        Self {
            max_bodies: 65_536,
            max_body_pairs: 65_536,
            max_contact_constraints: 10_240,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_settings_fill_defaults() {
        let s: PhysicsSettings = serde_json::from_str(r#"{ "num_velocity_steps": 4 }"#).unwrap();
        assert_eq!(s.num_velocity_steps, 4);
        assert_eq!(s.num_position_steps, PhysicsSettings::default().num_position_steps);
    }
}
