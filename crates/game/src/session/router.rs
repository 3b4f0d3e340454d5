use crate::net::{Input, Message, PlayerInit, TransportId, WorldSnapshot};

/// Per-kind dispatch for decoded messages. Implementors override the kinds
/// they care about; everything else is ignored.
pub trait MessageHandler {
    fn on_handshake(&mut self, _from: TransportId, _timestamp: f64) {}

    fn on_init(
        &mut self,
        _from: TransportId,
        _timestamp: f64,
        _snapshot: WorldSnapshot,
        _player: PlayerInit,
    ) {
    }

    fn on_snapshot(&mut self, _from: TransportId, _snapshot: WorldSnapshot) {}

    fn on_inputs(&mut self, _from: TransportId, _inputs: Vec<Input>) {}

    fn on_ping(&mut self, _from: TransportId, _timestamp: f64) {}

    fn on_pong(&mut self, _from: TransportId, _timestamp: f64) {}
}

pub fn route<H: MessageHandler>(handler: &mut H, from: TransportId, message: Message) {
    match message {
        Message::Handshake { timestamp } => handler.on_handshake(from, timestamp),
        Message::Init {
            timestamp,
            snapshot,
            player,
        } => handler.on_init(from, timestamp, snapshot, player),
        Message::Snapshot { snapshot } => handler.on_snapshot(from, snapshot),
        Message::Inputs { inputs } => handler.on_inputs(from, inputs),
        Message::Ping { timestamp } => handler.on_ping(from, timestamp),
        Message::Pong { timestamp } => handler.on_pong(from, timestamp),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        handshakes: Vec<(TransportId, f64)>,
        input_batches: Vec<usize>,
    }

    impl MessageHandler for Recorder {
        fn on_handshake(&mut self, from: TransportId, timestamp: f64) {
            self.handshakes.push((from, timestamp));
        }

        fn on_inputs(&mut self, _from: TransportId, inputs: Vec<Input>) {
            self.input_batches.push(inputs.len());
        }
    }

    #[test]
    fn dispatches_to_the_matching_hook() {
        let mut recorder = Recorder::default();
        let from = TransportId(7);

        route(&mut recorder, from, Message::Handshake { timestamp: 4.5 });
        route(
            &mut recorder,
            from,
            Message::Inputs {
                inputs: vec![Input::default(), Input::default()],
            },
        );
        // Unhandled kinds fall through the default no-op.
        route(&mut recorder, from, Message::Ping { timestamp: 1.0 });

        assert_eq!(recorder.handshakes, vec![(from, 4.5)]);
        assert_eq!(recorder.input_batches, vec![2]);
    }
}
