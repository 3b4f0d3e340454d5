use std::time::Duration;

use log::{debug, info};

use crate::config::HostConfig;
use crate::net::{
    EntityId, Input, Message, Multiplexer, NetEvent, PlayerInit, TransportError, TransportId,
};
use crate::session::client::DirectionalInput;
use crate::session::interpolation::InterpolationBuffer;
use crate::session::router::{self, MessageHandler};
use crate::sim::{Pose, World};

/// Accepts clients, owns the authoritative world and broadcasts snapshots
/// on a fixed cadence. The host plays too: its own entity is driven by the
/// same input sampling as a client, minus the reconciliation bookkeeping.
pub struct HostSession {
    config: HostConfig,
    net: Multiplexer,
    listener: Option<TransportId>,
    world: World,
    interpolation: InterpolationBuffer,
    clock: f64,
    broadcast_timer: f64,
    render_poses: Vec<(EntityId, Pose)>,
}

impl HostSession {
    pub fn new(config: HostConfig) -> Self {
        let interpolation = InterpolationBuffer::new(config.interpolation.clone());
        Self {
            config,
            net: Multiplexer::new(),
            listener: None,
            world: World::new(),
            interpolation,
            clock: 0.0,
            broadcast_timer: 0.0,
            render_poses: Vec::new(),
        }
    }

    /// Binds the listening socket and spawns the host's own entity.
    pub fn listen(&mut self, port: u16) -> Result<(), TransportError> {
        let listener = self.net.listen(port)?;
        self.listener = Some(listener);

        let id = EntityId::random();
        self.world.spawn(id.clone(), self.config.spawn_position);
        self.world.set_local(id);

        if let Some(addr) = self.net.local_addr(listener) {
            info!("hosting on {addr}");
        }
        Ok(())
    }

    pub fn is_listening(&self) -> bool {
        self.listener.is_some_and(|id| self.net.is_open(id))
    }

    pub fn bound_port(&self) -> Option<u16> {
        let listener = self.listener?;
        self.net.local_addr(listener).map(|addr| addr.port())
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn clock(&self) -> f64 {
        self.clock
    }

    /// Render poses from the last tick, local entity included.
    pub fn poses(&self) -> &[(EntityId, Pose)] {
        &self.render_poses
    }

    /// Advances the host by `dt` seconds: drains network events, applies the
    /// host's own input directly, and broadcasts on cadence.
    pub fn tick(&mut self, dt: f64, input: DirectionalInput) {
        self.clock += dt;

        for event in self.net.poll(Duration::from_secs_f64(dt)) {
            match event {
                NetEvent::Accepted { transport, .. } => {
                    debug!("transport {transport} accepted, awaiting handshake");
                }
                NetEvent::Message { transport, message } => {
                    router::route(self, transport, message);
                }
                NetEvent::Closed(transport) => {
                    self.despawn_controller(transport);
                }
                NetEvent::Connected(_) => {}
            }
        }

        if input.any() {
            // Host inputs never ride the wire, so sequencing is irrelevant.
            let sample = Input {
                sequence_id: 0,
                delta_time: dt,
                left: input.left,
                right: input.right,
                up: input.up,
                down: input.down,
            };
            if let Some(local) = self.world.local_mut() {
                local.apply_input(&sample);
            }
        }

        self.broadcast_timer += dt;
        if self.broadcast_timer >= self.config.broadcast_interval {
            self.broadcast_timer = 0.0;
            self.broadcast();
        }

        self.interpolation.expire(self.clock);
        self.refresh_poses();
    }

    pub fn shutdown(&mut self) {
        if let Some(listener) = self.listener.take() {
            self.net.close(listener);
        }
        let controlled: Vec<TransportId> =
            self.world.iter().filter_map(|e| e.controller).collect();
        for transport in controlled {
            self.net.close(transport);
        }
        self.world.clear();
        self.interpolation.clear();
        self.render_poses.clear();
    }

    /// Drains every backlog in arrival order, then sends each controller a
    /// snapshot with `last_applied_input` personalized to the inputs that
    /// made it into this broadcast.
    fn broadcast(&mut self) {
        for entity in self.world.iter_mut() {
            while let Some(input) = entity.pending_inputs.pop_front() {
                entity.apply_input(&input);
            }
        }

        let snapshot = self.world.snapshot(self.clock);
        let controllers: Vec<(TransportId, u64)> = self
            .world
            .iter()
            .filter_map(|e| e.controller.map(|t| (t, e.last_applied_input)))
            .collect();

        for (transport, last_applied_input) in controllers {
            let mut personalized = snapshot.clone();
            personalized.last_applied_input = last_applied_input;
            self.send_or_log(transport, &Message::Snapshot {
                snapshot: personalized,
            });
        }

        let local_id = self.world.local_id().cloned();
        for id in self.interpolation.push(snapshot, local_id.as_ref()) {
            debug!("entity {id} dropped from history");
            self.world.remove(&id);
        }
    }

    fn despawn_controller(&mut self, transport: TransportId) {
        if let Some(id) = self.world.by_controller(transport).cloned() {
            info!("transport {transport} closed, despawning {id}");
            self.world.remove(&id);
        }
    }

    fn send_or_log(&mut self, id: TransportId, message: &Message) {
        if let Err(err) = self.net.send(id, message) {
            debug!("send on transport {id} failed: {err}");
        }
    }

    fn refresh_poses(&mut self) {
        self.render_poses = self.interpolation.sample(self.clock, self.world.local_id());
        if let Some(local) = self.world.local() {
            self.render_poses.push((local.id.clone(), local.pose()));
        }
    }
}

impl MessageHandler for HostSession {
    /// A handshake both admits the peer and spawns its entity. The snapshot
    /// in the reply is built before the spawn so the joiner never sees its
    /// own entity duplicated.
    fn on_handshake(&mut self, from: TransportId, _timestamp: f64) {
        if self.world.by_controller(from).is_some() {
            debug!("repeat handshake from transport {from} ignored");
            return;
        }

        let snapshot = self.world.snapshot(self.clock);

        let id = EntityId::random();
        let entity = self.world.spawn(id.clone(), self.config.spawn_position);
        entity.controller = Some(from);
        let player = PlayerInit {
            entity_id: id.clone(),
            depth: entity.depth,
            x: entity.position.x,
            y: entity.position.y,
            heading: entity.heading,
        };
        info!("transport {from} joined as {id}");

        self.send_or_log(from, &Message::Init {
            timestamp: self.clock,
            snapshot,
            player,
        });
    }

    fn on_inputs(&mut self, from: TransportId, inputs: Vec<Input>) {
        let Some(id) = self.world.by_controller(from).cloned() else {
            debug!("inputs from transport {from} with no entity, dropped");
            return;
        };
        if let Some(entity) = self.world.get_mut(&id) {
            entity.pending_inputs.extend(inputs);
        }
    }

    fn on_ping(&mut self, from: TransportId, timestamp: f64) {
        self.send_or_log(from, &Message::Pong { timestamp });
    }
}
