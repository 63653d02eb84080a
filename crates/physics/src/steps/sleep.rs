//! Island based sleeping.
//!
//! Bodies linked by contacts or constraints form an island. An island falls
//! asleep only when every body in it has been quiet for long enough, so a
//! stack never freezes while its top is still wobbling.

use crate::body::Body;
use crate::settings::PhysicsSettings;

/// Union-find over the indices of the bodies active in a step.
#[derive(Clone, Debug)]
pub(crate) struct IslandBuilder {
    parent: Vec<usize>,
}

impl IslandBuilder {
    pub fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    pub fn link(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            // Lower root wins so island membership is independent of link order.
            let (keep, merge) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[merge] = keep;
        }
    }

    /// Islands ordered by their lowest member, members ascending.
    pub fn islands(mut self) -> Vec<Vec<usize>> {
        let mut by_root: Vec<Option<usize>> = vec![None; self.parent.len()];
        let mut islands: Vec<Vec<usize>> = Vec::new();
        for i in 0..self.parent.len() {
            let root = self.find(i);
            let slot = *by_root[root].get_or_insert_with(|| {
                islands.push(Vec::new());
                islands.len() - 1
            });
            islands[slot].push(i);
        }
        islands
    }
}

/// Distance from the center of mass to the furthest corner of the shape
/// bounds, used to turn angular velocity into a point speed.
fn motion_radius(body: &Body) -> f32 {
    let bounds = body.shape().local_bounds();
    let com = body.shape().center_of_mass();
    (bounds.max - com).abs().max((bounds.min - com).abs()).length()
}

/// Advances the body's quiet step counter and returns whether it may sleep.
pub(crate) fn update_sleep_steps(body: &mut Body, settings: &PhysicsSettings) -> bool {
    let radius = motion_radius(body);
    let Some(motion) = body.moving_mut() else {
        return true;
    };
    if !settings.allow_sleeping || !motion.allow_sleeping {
        motion.sleep_steps = 0;
        return false;
    }
    let speed = motion.linear_velocity.length() + motion.angular_velocity.length() * radius;
    if speed < settings.point_velocity_sleep_threshold {
        motion.sleep_steps = motion.sleep_steps.saturating_add(1);
    } else {
        motion.sleep_steps = 0;
    }
    motion.sleep_steps >= settings.steps_before_sleep
}
