use std::collections::HashMap;

use glam::DVec2;

use crate::net::{EntityId, EntitySnapshot, WorldSnapshot};
use crate::sim::Pose;

/// Fixed lag applied to remote rendering so two bracketing snapshots are
/// always available.
pub const DEFAULT_RENDER_DELAY: f64 = 0.1;
/// How much history to keep behind the render time.
pub const DEFAULT_RETENTION: f64 = 1.0;
/// Consecutive snapshots an entity may be absent from before it is
/// reported for removal.
pub const DEFAULT_MISSED_SNAPSHOT_LIMIT: u32 = 20;

#[derive(Debug, Clone)]
pub struct InterpolationConfig {
    pub render_delay: f64,
    pub retention: f64,
    pub missed_snapshot_limit: u32,
}

impl Default for InterpolationConfig {
    fn default() -> Self {
        Self {
            render_delay: DEFAULT_RENDER_DELAY,
            retention: DEFAULT_RETENTION,
            missed_snapshot_limit: DEFAULT_MISSED_SNAPSHOT_LIMIT,
        }
    }
}

#[derive(Debug)]
struct TimedSnapshot {
    local_time: f64,
    snapshot: WorldSnapshot,
}

fn smoothstep(t: f64) -> f64 {
    t * t * (3.0 - 2.0 * t)
}

fn blend(from: &EntitySnapshot, to: &EntitySnapshot, t: f64) -> Pose {
    Pose {
        position: DVec2::new(
            from.x + (to.x - from.x) * t,
            from.y + (to.y - from.y) * t,
        ),
        heading: from.heading + (to.heading - from.heading) * t,
    }
}

fn snapshot_pose(state: &EntitySnapshot) -> Pose {
    Pose {
        position: DVec2::new(state.x, state.y),
        heading: state.heading,
    }
}

/// Rolling history of authoritative snapshots, sampled with a fixed render
/// delay and a smoothstep ease between the two straddling snapshots.
///
/// Snapshot host times are translated into local-clock terms through a
/// clock offset estimated once at connect time.
#[derive(Debug)]
pub struct InterpolationBuffer {
    config: InterpolationConfig,
    snapshots: Vec<TimedSnapshot>,
    clock_offset: f64,
    absence: HashMap<EntityId, u32>,
}

impl InterpolationBuffer {
    pub fn new(config: InterpolationConfig) -> Self {
        Self {
            config,
            snapshots: Vec::new(),
            clock_offset: 0.0,
            absence: HashMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(InterpolationConfig::default())
    }

    /// `offset` translates host time to local time: `local = host + offset`.
    pub fn set_clock_offset(&mut self, offset: f64) {
        self.clock_offset = offset;
    }

    pub fn clock_offset(&self) -> f64 {
        self.clock_offset
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn latest(&self) -> Option<&WorldSnapshot> {
        self.snapshots.last().map(|t| &t.snapshot)
    }

    /// Appends a snapshot to history and updates per-entity absence counts.
    /// Returns the ids of entities absent from enough consecutive snapshots
    /// to be removed. The local entity is never reported.
    pub fn push(&mut self, snapshot: WorldSnapshot, local: Option<&EntityId>) -> Vec<EntityId> {
        for state in &snapshot.entities {
            if Some(&state.entity_id) == local {
                continue;
            }
            self.absence.insert(state.entity_id.clone(), 0);
        }

        let mut expired = Vec::new();
        for (id, missed) in self.absence.iter_mut() {
            if snapshot.entity(id).is_none() {
                *missed += 1;
                if *missed >= self.config.missed_snapshot_limit {
                    expired.push(id.clone());
                }
            }
        }
        for id in &expired {
            self.absence.remove(id);
        }

        let local_time = snapshot.host_time + self.clock_offset;
        let timed = TimedSnapshot {
            local_time,
            snapshot,
        };
        let insert_pos = self
            .snapshots
            .iter()
            .position(|s| s.local_time > local_time)
            .unwrap_or(self.snapshots.len());
        self.snapshots.insert(insert_pos, timed);

        expired
    }

    /// Eased poses for every entity at the delayed render time, excluding
    /// `skip` (the locally-predicted entity). With fewer than two snapshots
    /// there is nothing to interpolate.
    ///
    /// Outside the covered time range the nearest pair is used with the
    /// blend factor clamped; history is never extrapolated.
    pub fn sample(&self, now: f64, skip: Option<&EntityId>) -> Vec<(EntityId, Pose)> {
        if self.snapshots.len() < 2 {
            return Vec::new();
        }

        let render_time = now - self.config.render_delay;

        let mut idx = 0;
        for i in (0..self.snapshots.len() - 1).rev() {
            if self.snapshots[i].local_time <= render_time {
                idx = i;
                break;
            }
        }

        let from = &self.snapshots[idx];
        let to = &self.snapshots[idx + 1];
        let span = to.local_time - from.local_time;
        let t = if span > 0.0 {
            ((render_time - from.local_time) / span).clamp(0.0, 1.0)
        } else {
            1.0
        };
        let eased = smoothstep(t);

        let mut poses = Vec::new();
        for next_state in &to.snapshot.entities {
            if Some(&next_state.entity_id) == skip {
                continue;
            }
            let pose = match from.snapshot.entity(&next_state.entity_id) {
                Some(prev_state) => blend(prev_state, next_state, eased),
                None => snapshot_pose(next_state),
            };
            poses.push((next_state.entity_id.clone(), pose));
        }
        poses
    }

    /// Discards snapshots that fell entirely behind the retention window.
    pub fn expire(&mut self, now: f64) {
        let cutoff = now - self.config.render_delay - self.config.retention;
        self.snapshots.retain(|s| s.local_time > cutoff);
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
        self.absence.clear();
        self.clock_offset = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(host_time: f64, entities: &[(&str, f64, f64, f64)]) -> WorldSnapshot {
        let mut snapshot = WorldSnapshot::new(host_time);
        for (id, x, y, heading) in entities {
            snapshot.entities.push(EntitySnapshot {
                entity_id: EntityId::from(*id),
                x: *x,
                y: *y,
                heading: *heading,
            });
        }
        snapshot
    }

    fn pose_of<'a>(poses: &'a [(EntityId, Pose)], id: &str) -> &'a Pose {
        let wanted = EntityId::from(id);
        &poses.iter().find(|(eid, _)| *eid == wanted).unwrap().1
    }

    fn two_snapshot_buffer() -> InterpolationBuffer {
        let mut buffer = InterpolationBuffer::with_defaults();
        buffer.push(snapshot(1.0, &[("r", 0.0, 0.0, 0.0)]), None);
        buffer.push(snapshot(2.0, &[("r", 10.0, 20.0, 1.0)]), None);
        buffer
    }

    #[test]
    fn boundaries_yield_exact_snapshot_poses() {
        let buffer = two_snapshot_buffer();

        // Render time lands exactly on the first snapshot.
        let poses = buffer.sample(1.0 + DEFAULT_RENDER_DELAY, None);
        let pose = pose_of(&poses, "r");
        assert_eq!(pose.position, DVec2::ZERO);
        assert_eq!(pose.heading, 0.0);

        // And exactly on the second.
        let poses = buffer.sample(2.0 + DEFAULT_RENDER_DELAY, None);
        let pose = pose_of(&poses, "r");
        assert_eq!(pose.position, DVec2::new(10.0, 20.0));
        assert_eq!(pose.heading, 1.0);
    }

    #[test]
    fn midpoint_uses_smoothstep() {
        let buffer = two_snapshot_buffer();

        // smoothstep(0.5) == 0.5, so the midpoint matches linear blending.
        let poses = buffer.sample(1.5 + DEFAULT_RENDER_DELAY, None);
        let pose = pose_of(&poses, "r");
        assert!((pose.position - DVec2::new(5.0, 10.0)).length() < 1e-12);

        // At a quarter the ease pulls toward the start: smoothstep(0.25).
        let poses = buffer.sample(1.25 + DEFAULT_RENDER_DELAY, None);
        let pose = pose_of(&poses, "r");
        let eased = 0.25_f64 * 0.25 * (3.0 - 0.5);
        assert!((pose.position.x - 10.0 * eased).abs() < 1e-12);
    }

    #[test]
    fn outside_range_clamps_to_nearest_pair() {
        let buffer = two_snapshot_buffer();

        let poses = buffer.sample(0.2, None);
        assert_eq!(pose_of(&poses, "r").position, DVec2::ZERO);

        let poses = buffer.sample(50.0, None);
        assert_eq!(pose_of(&poses, "r").position, DVec2::new(10.0, 20.0));
    }

    #[test]
    fn clock_offset_translates_host_times() {
        let mut buffer = InterpolationBuffer::with_defaults();
        buffer.set_clock_offset(5.0);
        buffer.push(snapshot(1.0, &[("r", 0.0, 0.0, 0.0)]), None);
        buffer.push(snapshot(2.0, &[("r", 10.0, 0.0, 0.0)]), None);

        // Host time 1.0 is local time 6.0.
        let poses = buffer.sample(6.0 + DEFAULT_RENDER_DELAY, None);
        assert_eq!(pose_of(&poses, "r").position, DVec2::ZERO);
    }

    #[test]
    fn skip_excludes_the_local_entity() {
        let mut buffer = InterpolationBuffer::with_defaults();
        buffer.push(
            snapshot(1.0, &[("me", 0.0, 0.0, 0.0), ("r", 1.0, 0.0, 0.0)]),
            None,
        );
        buffer.push(
            snapshot(2.0, &[("me", 5.0, 0.0, 0.0), ("r", 2.0, 0.0, 0.0)]),
            None,
        );

        let me = EntityId::from("me");
        let poses = buffer.sample(1.5, Some(&me));
        assert_eq!(poses.len(), 1);
        assert_eq!(poses[0].0, EntityId::from("r"));
    }

    #[test]
    fn expiry_removes_stale_snapshots_from_lookup() {
        let mut buffer = two_snapshot_buffer();
        buffer.push(snapshot(3.0, &[("r", 30.0, 0.0, 0.0)]), None);
        assert_eq!(buffer.len(), 3);

        // Cutoff = 2.7 - 0.1 - 1.0 = 1.6: only the first snapshot is gone.
        buffer.expire(2.7);
        assert_eq!(buffer.len(), 2);

        // With everything expired but one, interpolation has no pair.
        buffer.expire(4.2);
        assert_eq!(buffer.len(), 1);
        assert!(buffer.sample(4.2, None).is_empty());
    }

    #[test]
    fn absent_entities_are_reported_after_the_limit() {
        let mut buffer = InterpolationBuffer::new(InterpolationConfig {
            missed_snapshot_limit: 3,
            ..InterpolationConfig::default()
        });

        buffer.push(
            snapshot(1.0, &[("a", 0.0, 0.0, 0.0), ("b", 0.0, 0.0, 0.0)]),
            None,
        );

        assert!(buffer.push(snapshot(2.0, &[("a", 0.0, 0.0, 0.0)]), None).is_empty());
        assert!(buffer.push(snapshot(3.0, &[("a", 0.0, 0.0, 0.0)]), None).is_empty());

        let removed = buffer.push(snapshot(4.0, &[("a", 0.0, 0.0, 0.0)]), None);
        assert_eq!(removed, vec![EntityId::from("b")]);

        // Once reported, the id is forgotten entirely.
        assert!(buffer.push(snapshot(5.0, &[("a", 0.0, 0.0, 0.0)]), None).is_empty());
    }

    #[test]
    fn reappearing_entity_resets_its_absence_count() {
        let mut buffer = InterpolationBuffer::new(InterpolationConfig {
            missed_snapshot_limit: 2,
            ..InterpolationConfig::default()
        });

        buffer.push(
            snapshot(1.0, &[("a", 0.0, 0.0, 0.0), ("b", 0.0, 0.0, 0.0)]),
            None,
        );
        buffer.push(snapshot(2.0, &[("a", 0.0, 0.0, 0.0)]), None);
        buffer.push(
            snapshot(3.0, &[("a", 0.0, 0.0, 0.0), ("b", 0.0, 0.0, 0.0)]),
            None,
        );

        assert!(buffer.push(snapshot(4.0, &[("a", 0.0, 0.0, 0.0)]), None).is_empty());
    }
}
