use std::collections::VecDeque;
use std::time::Duration;

use glam::DVec2;
use log::{debug, info, warn};

use crate::config::ClientConfig;
use crate::net::{
    EntityId, Input, Message, Multiplexer, NetAddress, NetEvent, PlayerInit, TransportError,
    TransportId, WorldSnapshot,
};
use crate::session::interpolation::InterpolationBuffer;
use crate::session::router::{self, MessageHandler};
use crate::sim::{Entity, Pose, World};

/// Direction keys held down during one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectionalInput {
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
}

impl DirectionalInput {
    pub fn any(&self) -> bool {
        self.left || self.right || self.up || self.down
    }
}

/// Connects to a host, predicts the local entity from sampled inputs,
/// reconciles against authoritative snapshots and interpolates everyone
/// else behind a fixed render delay.
pub struct ClientSession {
    config: ClientConfig,
    net: Multiplexer,
    transport: Option<TransportId>,
    world: World,
    interpolation: InterpolationBuffer,
    clock: f64,
    next_sequence: u64,
    unacked: VecDeque<Input>,
    outbox: Vec<Input>,
    input_timer: f64,
    ping_timer: f64,
    handshake_sent_at: Option<f64>,
    last_round_trip: Option<f64>,
    render_poses: Vec<(EntityId, Pose)>,
}

impl ClientSession {
    pub fn new(config: ClientConfig) -> Self {
        let interpolation = InterpolationBuffer::new(config.interpolation.clone());
        Self {
            config,
            net: Multiplexer::new(),
            transport: None,
            world: World::new(),
            interpolation,
            clock: 0.0,
            next_sequence: 1,
            unacked: VecDeque::new(),
            outbox: Vec::new(),
            input_timer: 0.0,
            ping_timer: 0.0,
            handshake_sent_at: None,
            last_round_trip: None,
            render_poses: Vec::new(),
        }
    }

    /// Opens a stream transport to the host and starts the handshake.
    pub fn connect(&mut self, address: NetAddress) -> Result<(), TransportError> {
        let id = self.net.connect(address.to_socket_addr())?;
        self.transport = Some(id);
        self.send_handshake(id)?;
        info!("connecting to {address} over stream transport {id}");
        Ok(())
    }

    /// Opens a datagram transport to the host and starts the handshake.
    pub fn connect_datagram(&mut self, address: NetAddress) -> Result<(), TransportError> {
        let id = self
            .net
            .connect_datagram(address.to_socket_addr(), self.config.datagram_timeout)?;
        self.transport = Some(id);
        self.send_handshake(id)?;
        info!("connecting to {address} over datagram transport {id}");
        Ok(())
    }

    pub fn disconnect(&mut self) {
        if let Some(id) = self.transport.take() {
            self.net.close(id);
        }
        self.reset();
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_some_and(|id| self.net.is_open(id))
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn clock(&self) -> f64 {
        self.clock
    }

    /// Round-trip time measured by the most recent ping, if any.
    pub fn round_trip(&self) -> Option<f64> {
        self.last_round_trip
    }

    /// Render poses from the last tick: the predicted local entity plus the
    /// interpolated remotes.
    pub fn poses(&self) -> &[(EntityId, Pose)] {
        &self.render_poses
    }

    /// Advances the session by `dt` seconds: drains network events, predicts
    /// the local entity from `input`, flushes batched inputs on cadence and
    /// refreshes render poses.
    pub fn tick(&mut self, dt: f64, input: DirectionalInput) {
        self.clock += dt;

        for event in self.net.poll(Duration::from_secs_f64(dt)) {
            match event {
                NetEvent::Connected(transport) => {
                    debug!("transport {transport} connected");
                }
                NetEvent::Message { transport, message } => {
                    router::route(self, transport, message);
                }
                NetEvent::Closed(transport) => {
                    info!("transport {transport} closed, session reset");
                    self.reset();
                }
                NetEvent::Accepted { .. } => {}
            }
        }

        if input.any() && self.world.local_id().is_some() {
            self.record_input(dt, input);
        }

        self.input_timer += dt;
        if self.input_timer >= self.config.input_flush_interval {
            self.input_timer = 0.0;
            self.flush_inputs();
        }

        self.ping_timer += dt;
        if self.ping_timer >= self.config.ping_interval {
            self.ping_timer = 0.0;
            if let Some(id) = self.transport {
                self.send_or_log(id, &Message::Ping { timestamp: self.clock });
            }
        }

        self.interpolation.expire(self.clock);
        self.refresh_poses();
    }

    fn send_handshake(&mut self, id: TransportId) -> Result<(), TransportError> {
        self.handshake_sent_at = Some(self.clock);
        self.net.send(id, &Message::Handshake { timestamp: self.clock })
    }

    /// Applies one predicted step to the local entity and queues the input
    /// for the host, keeping a copy for replay until it is acknowledged.
    fn record_input(&mut self, dt: f64, directions: DirectionalInput) {
        let input = Input {
            sequence_id: self.next_sequence,
            delta_time: dt,
            left: directions.left,
            right: directions.right,
            up: directions.up,
            down: directions.down,
        };
        self.next_sequence += 1;

        if let Some(local) = self.world.local_mut() {
            local.apply_input(&input);
        }
        self.unacked.push_back(input.clone());
        self.outbox.push(input);
    }

    fn flush_inputs(&mut self) {
        if self.outbox.is_empty() {
            return;
        }
        let Some(id) = self.transport else {
            return;
        };
        let inputs = std::mem::take(&mut self.outbox);
        self.send_or_log(id, &Message::Inputs { inputs });
    }

    fn send_or_log(&mut self, id: TransportId, message: &Message) {
        if let Err(err) = self.net.send(id, message) {
            debug!("send on transport {id} failed: {err}");
        }
    }

    /// Reconciliation: snap the local entity to the authoritative state,
    /// drop acknowledged inputs and replay the rest, then feed the snapshot
    /// to the interpolation history for everyone else.
    fn apply_authoritative_snapshot(&mut self, snapshot: WorldSnapshot) {
        let local_id = self.world.local_id().cloned();

        if let Some(local_id) = &local_id {
            if let Some(state) = snapshot.entity(local_id) {
                while self
                    .unacked
                    .front()
                    .is_some_and(|i| i.sequence_id <= snapshot.last_applied_input)
                {
                    self.unacked.pop_front();
                }
                if let Some(local) = self.world.get_mut(local_id) {
                    local.apply_snapshot(state);
                    for input in &self.unacked {
                        local.apply_input(input);
                    }
                }
            }
        }

        for state in &snapshot.entities {
            if Some(&state.entity_id) == local_id.as_ref() {
                continue;
            }
            match self.world.get_mut(&state.entity_id) {
                Some(entity) => entity.apply_snapshot(state),
                None => {
                    debug!("entity {} entered view", state.entity_id);
                    let mut entity =
                        Entity::new(state.entity_id.clone(), DVec2::new(state.x, state.y));
                    entity.heading = state.heading;
                    self.world.insert(entity);
                }
            }
        }

        for id in self.interpolation.push(snapshot, local_id.as_ref()) {
            debug!("entity {id} left view");
            self.world.remove(&id);
        }
    }

    fn refresh_poses(&mut self) {
        self.render_poses = self.interpolation.sample(self.clock, self.world.local_id());
        if let Some(local) = self.world.local() {
            self.render_poses.push((local.id.clone(), local.pose()));
        }
    }

    fn reset(&mut self) {
        self.transport = None;
        self.world.clear();
        self.interpolation.clear();
        self.unacked.clear();
        self.outbox.clear();
        self.render_poses.clear();
        self.next_sequence = 1;
        self.input_timer = 0.0;
        self.ping_timer = 0.0;
        self.handshake_sent_at = None;
        self.last_round_trip = None;
    }
}

impl MessageHandler for ClientSession {
    fn on_init(
        &mut self,
        from: TransportId,
        timestamp: f64,
        snapshot: WorldSnapshot,
        player: PlayerInit,
    ) {
        let round_trip = self
            .handshake_sent_at
            .map(|sent| self.clock - sent)
            .unwrap_or(0.0);
        let offset = self.clock - (timestamp - round_trip * 0.5);
        self.interpolation.set_clock_offset(offset);
        info!(
            "joined as {} via transport {from} (rtt {:.0} ms, clock offset {:+.3} s)",
            player.entity_id,
            round_trip * 1000.0,
            offset
        );

        let mut local = Entity::new(player.entity_id.clone(), DVec2::new(player.x, player.y));
        local.heading = player.heading;
        local.depth = player.depth;
        self.world.insert(local);
        self.world.set_local(player.entity_id);

        self.apply_authoritative_snapshot(snapshot);
    }

    fn on_snapshot(&mut self, _from: TransportId, snapshot: WorldSnapshot) {
        self.apply_authoritative_snapshot(snapshot);
    }

    fn on_ping(&mut self, from: TransportId, timestamp: f64) {
        self.send_or_log(from, &Message::Pong { timestamp });
    }

    fn on_pong(&mut self, _from: TransportId, timestamp: f64) {
        self.last_round_trip = Some(self.clock - timestamp);
    }

    fn on_handshake(&mut self, from: TransportId, _timestamp: f64) {
        warn!("unexpected handshake from transport {from}");
    }
}
