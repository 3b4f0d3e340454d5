use std::collections::VecDeque;
use std::f64::consts::{FRAC_PI_2, PI};

use glam::DVec2;

use crate::net::{EntityId, EntitySnapshot, Input, TransportId};

/// Translation speed in world units per second.
pub const MOVE_SPEED: f64 = 80.0;
/// Rotation rate in radians per second.
pub const TURN_RATE: f64 = PI;

/// A position-plus-heading pair, the unit handed to the renderer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: DVec2,
    pub heading: f64,
}

/// One simulated player.
///
/// On the host, `controller` names the transport that feeds this entity and
/// `pending_inputs` holds received-but-unapplied remote inputs. The host's
/// own entity and every entity on a peer have no controller.
#[derive(Debug)]
pub struct Entity {
    pub id: EntityId,
    pub position: DVec2,
    pub heading: f64,
    pub depth: f64,
    pub controller: Option<TransportId>,
    pub last_applied_input: u64,
    pub pending_inputs: VecDeque<Input>,
}

impl Entity {
    pub fn new(id: EntityId, position: DVec2) -> Self {
        Self {
            id,
            position,
            heading: 0.0,
            depth: 0.0,
            controller: None,
            last_applied_input: 0,
            pending_inputs: VecDeque::new(),
        }
    }

    /// Advances the entity by one input sample: left/right rotate the
    /// heading, up/down translate along the heading's perpendicular axis.
    /// Directions combine freely within one sample.
    pub fn apply_input(&mut self, input: &Input) {
        self.last_applied_input = input.sequence_id;

        if input.left {
            self.heading += TURN_RATE * input.delta_time;
        }
        if input.right {
            self.heading -= TURN_RATE * input.delta_time;
        }

        let step = MOVE_SPEED * input.delta_time;
        let forward = DVec2::new(
            (self.heading + FRAC_PI_2).cos(),
            (self.heading + FRAC_PI_2).sin(),
        );

        if input.up {
            self.position += forward * step;
        }
        if input.down {
            self.position -= forward * step;
        }
    }

    pub fn pose(&self) -> Pose {
        Pose {
            position: self.position,
            heading: self.heading,
        }
    }

    pub fn to_snapshot(&self) -> EntitySnapshot {
        EntitySnapshot {
            entity_id: self.id.clone(),
            x: self.position.x,
            y: self.position.y,
            heading: self.heading,
        }
    }

    pub fn apply_snapshot(&mut self, snapshot: &EntitySnapshot) {
        self.position = DVec2::new(snapshot.x, snapshot.y);
        self.heading = snapshot.heading;
    }
}
