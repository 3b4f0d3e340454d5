use std::collections::HashMap;

use glam::DVec2;

use crate::net::{EntityId, TransportId, WorldSnapshot};

use super::entity::Entity;

/// The set of simulated entities plus the locally-controlled one.
#[derive(Debug, Default)]
pub struct World {
    entities: HashMap<EntityId, Entity>,
    local_id: Option<EntityId>,
    next_depth: f64,
}

impl World {
    pub fn new() -> Self {
        Self {
            entities: HashMap::new(),
            local_id: None,
            next_depth: 1.0,
        }
    }

    pub fn insert(&mut self, entity: Entity) {
        self.entities.insert(entity.id.clone(), entity);
    }

    /// Spawns a fresh entity at `position` with the next draw depth.
    pub fn spawn(&mut self, id: EntityId, position: DVec2) -> &mut Entity {
        let mut entity = Entity::new(id.clone(), position);
        entity.depth = self.next_depth;
        self.next_depth += 1.0;
        self.entities.entry(id).insert_entry(entity).into_mut()
    }

    pub fn remove(&mut self, id: &EntityId) -> Option<Entity> {
        if self.local_id.as_ref() == Some(id) {
            self.local_id = None;
        }
        self.entities.remove(id)
    }

    pub fn get(&self, id: &EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn get_mut(&mut self, id: &EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(id)
    }

    pub fn set_local(&mut self, id: EntityId) {
        self.local_id = Some(id);
    }

    pub fn local_id(&self) -> Option<&EntityId> {
        self.local_id.as_ref()
    }

    pub fn local(&self) -> Option<&Entity> {
        self.local_id.as_ref().and_then(|id| self.entities.get(id))
    }

    pub fn local_mut(&mut self) -> Option<&mut Entity> {
        match &self.local_id {
            Some(id) => self.entities.get_mut(id),
            None => None,
        }
    }

    pub fn by_controller(&self, transport: TransportId) -> Option<&EntityId> {
        self.entities
            .values()
            .find(|e| e.controller == Some(transport))
            .map(|e| &e.id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Entity> {
        self.entities.values_mut()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn clear(&mut self) {
        self.entities.clear();
        self.local_id = None;
    }

    /// Builds a snapshot of every entity at `host_time`. Entities are
    /// ordered by id so the sequence is stable across ticks.
    pub fn snapshot(&self, host_time: f64) -> WorldSnapshot {
        let mut snapshot = WorldSnapshot::new(host_time);
        snapshot.entities = self.entities.values().map(Entity::to_snapshot).collect();
        snapshot
            .entities
            .sort_by(|a, b| a.entity_id.as_str().cmp(b.entity_id.as_str()));
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::Input;

    #[test]
    fn spawn_assigns_increasing_depth() {
        let mut world = World::new();
        let a = world.spawn(EntityId::random(), DVec2::ZERO).depth;
        let b = world.spawn(EntityId::random(), DVec2::ZERO).depth;
        assert!(b > a);
    }

    #[test]
    fn controller_lookup() {
        let mut world = World::new();
        let id = EntityId::random();
        world.spawn(id.clone(), DVec2::ZERO);

        let transport = TransportId(7);
        world.get_mut(&id).unwrap().controller = Some(transport);
        assert_eq!(world.by_controller(transport), Some(&id));
    }

    #[test]
    fn removing_local_entity_clears_local_id() {
        let mut world = World::new();
        let id = EntityId::random();
        world.spawn(id.clone(), DVec2::ZERO);
        world.set_local(id.clone());
        assert!(world.local().is_some());

        world.remove(&id);
        assert!(world.local().is_none());
        assert!(world.local_id().is_none());
    }

    #[test]
    fn snapshot_covers_every_entity_in_stable_order() {
        let mut world = World::new();
        for _ in 0..4 {
            world.spawn(EntityId::random(), DVec2::new(1.0, 2.0));
        }
        world
            .iter_mut()
            .next()
            .unwrap()
            .apply_input(&Input {
                sequence_id: 1,
                delta_time: 0.1,
                left: false,
                right: false,
                up: true,
                down: false,
            });

        let first = world.snapshot(5.0);
        let second = world.snapshot(5.0);
        assert_eq!(first.entities.len(), 4);
        assert_eq!(first, second);
        assert_eq!(first.host_time, 5.0);
    }
}
