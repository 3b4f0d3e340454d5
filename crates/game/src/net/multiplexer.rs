use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use super::datagram::DatagramTransport;
use super::protocol::Message;
use super::transport::{
    Interest, ListenerTransport, PollRead, StreamTransport, TransportError, TransportState,
};

/// Handle to a transport owned by a [`Multiplexer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransportId(pub(crate) u32);

impl std::fmt::Display for TransportId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Notification from the multiplexer to its owner. Transports never reach
/// back into the owner; everything they have to say arrives here.
#[derive(Debug)]
pub enum NetEvent {
    /// A connect completed.
    Connected(TransportId),
    /// A listener produced a new connected transport.
    Accepted {
        listener: TransportId,
        transport: TransportId,
    },
    /// A complete message was decoded on a transport.
    Message {
        transport: TransportId,
        message: Message,
    },
    /// A transport closed; its id is no longer valid.
    Closed(TransportId),
}

#[derive(Debug)]
enum Transport {
    Stream(StreamTransport),
    Listener(ListenerTransport),
    Datagram(DatagramTransport),
}

/// Owns every live transport and polls them once per tick.
///
/// Events are collected into a vector and returned from [`poll`](Self::poll)
/// rather than delivered through callbacks, so the owner is free to close or
/// register transports while handling them without mutating the transport
/// set mid-iteration.
#[derive(Debug, Default)]
pub struct Multiplexer {
    transports: HashMap<TransportId, Transport>,
    next_id: u32,
    pending: Vec<NetEvent>,
}

impl Multiplexer {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&mut self, transport: Transport) -> TransportId {
        let id = TransportId(self.next_id);
        self.next_id += 1;
        self.transports.insert(id, transport);
        id
    }

    /// Opens a stream connection. The connected notification is delivered
    /// on the next poll.
    pub fn connect(&mut self, addr: SocketAddr) -> io::Result<TransportId> {
        let transport = StreamTransport::connect(addr)?;
        let id = self.register(Transport::Stream(transport));
        self.pending.push(NetEvent::Connected(id));
        log::info!("transport {} connected to {}", id, addr);
        Ok(id)
    }

    /// Opens a listening socket on `port` (0 picks an ephemeral port).
    pub fn listen(&mut self, port: u16) -> io::Result<TransportId> {
        let listener = ListenerTransport::listen(port)?;
        let addr = listener.local_addr()?;
        let id = self.register(Transport::Listener(listener));
        log::info!("transport {} listening on {}", id, addr);
        Ok(id)
    }

    /// Opens a datagram transport toward `peer`. The transport reports
    /// `Connected` once the first datagram from the peer arrives; the
    /// caller must send the opening handshake itself.
    pub fn connect_datagram(
        &mut self,
        peer: SocketAddr,
        timeout: Duration,
    ) -> io::Result<TransportId> {
        let transport = DatagramTransport::connect(peer, timeout)?;
        let id = self.register(Transport::Datagram(transport));
        log::info!("transport {} addressing datagrams to {}", id, peer);
        Ok(id)
    }

    pub fn local_addr(&self, id: TransportId) -> Option<SocketAddr> {
        match self.transports.get(&id)? {
            Transport::Listener(listener) => listener.local_addr().ok(),
            Transport::Datagram(datagram) => datagram.local_addr().ok(),
            Transport::Stream(_) => None,
        }
    }

    pub fn is_open(&self, id: TransportId) -> bool {
        match self.transports.get(&id) {
            Some(Transport::Stream(t)) => !t.is_closed(),
            Some(Transport::Datagram(t)) => !t.is_closed(),
            Some(Transport::Listener(_)) => true,
            None => false,
        }
    }

    pub fn transport_count(&self) -> usize {
        self.transports.len()
    }

    /// Encodes and sends a message on a transport. A fatal send error
    /// closes the transport; the closure surfaces on the next poll.
    pub fn send(&mut self, id: TransportId, message: &Message) -> Result<(), TransportError> {
        let result = match self.transports.get_mut(&id) {
            Some(Transport::Stream(t)) => t.send(message),
            Some(Transport::Datagram(t)) => t.send(message),
            Some(Transport::Listener(_)) | None => Err(TransportError::NotConnected),
        };

        if result.is_ok() && !self.is_open(id) {
            self.transports.remove(&id);
            self.pending.push(NetEvent::Closed(id));
            return Err(TransportError::NotConnected);
        }

        result
    }

    /// Closes a transport and drops it from the set. Safe to call with a
    /// stale id; closing twice is a no-op.
    pub fn close(&mut self, id: TransportId) {
        if let Some(transport) = self.transports.remove(&id) {
            match transport {
                Transport::Stream(mut t) => t.close(),
                Transport::Datagram(mut t) => t.close(),
                Transport::Listener(_) => {}
            }
            self.pending.push(NetEvent::Closed(id));
            log::info!("transport {} closed", id);
        }
    }

    /// One tick of the event loop: accept on listeners, read and decode,
    /// flush write buffers, and advance datagram liveness timers.
    ///
    /// Transports that close themselves are removed only after the whole
    /// set has been visited.
    pub fn poll(&mut self, dt: Duration) -> Vec<NetEvent> {
        let mut events = std::mem::take(&mut self.pending);
        let mut dead: Vec<TransportId> = Vec::new();
        let mut accepted: Vec<(TransportId, StreamTransport)> = Vec::new();

        let ids: Vec<TransportId> = self.transports.keys().copied().collect();
        for id in ids {
            let Some(transport) = self.transports.get_mut(&id) else {
                continue;
            };

            match transport {
                Transport::Listener(listener) => {
                    for stream in listener.poll_accept() {
                        accepted.push((id, stream));
                    }
                }
                Transport::Stream(stream) => {
                    match stream.poll_read() {
                        PollRead::Messages(messages) => {
                            for message in messages {
                                events.push(NetEvent::Message {
                                    transport: id,
                                    message,
                                });
                            }
                        }
                        PollRead::Closed => {
                            events.push(NetEvent::Closed(id));
                            dead.push(id);
                            continue;
                        }
                        PollRead::Idle => {}
                    }
                    // Write interest is only raised while a partial frame
                    // is stuck in the buffer.
                    if stream.interest().contains(Interest::WRITABLE) && stream.poll_write() {
                        events.push(NetEvent::Closed(id));
                        dead.push(id);
                    }
                }
                Transport::Datagram(datagram) => {
                    if datagram.tick(dt) {
                        events.push(NetEvent::Closed(id));
                        dead.push(id);
                        continue;
                    }
                    let was_connecting = datagram.state() == TransportState::Connecting;
                    match datagram.poll_read() {
                        PollRead::Messages(messages) => {
                            if was_connecting && datagram.state() == TransportState::Connected {
                                events.push(NetEvent::Connected(id));
                            }
                            for message in messages {
                                events.push(NetEvent::Message {
                                    transport: id,
                                    message,
                                });
                            }
                        }
                        PollRead::Closed => {
                            events.push(NetEvent::Closed(id));
                            dead.push(id);
                            continue;
                        }
                        PollRead::Idle => {}
                    }
                    if datagram.poll_write() {
                        events.push(NetEvent::Closed(id));
                        dead.push(id);
                    }
                }
            }
        }

        for id in dead {
            self.transports.remove(&id);
        }

        for (listener, stream) in accepted {
            let transport = self.register(Transport::Stream(stream));
            events.push(NetEvent::Accepted {
                listener,
                transport,
            });
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    const TICK: Duration = Duration::from_millis(1);

    fn pump_until<F>(mux: &mut Multiplexer, events: &mut Vec<NetEvent>, mut done: F)
    where
        F: FnMut(&[NetEvent]) -> bool,
    {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !done(events) && Instant::now() < deadline {
            events.extend(mux.poll(TICK));
            std::thread::sleep(TICK);
        }
        assert!(done(events), "condition not met before deadline");
    }

    fn has_accept(events: &[NetEvent]) -> Option<TransportId> {
        events.iter().find_map(|e| match e {
            NetEvent::Accepted { transport, .. } => Some(*transport),
            _ => None,
        })
    }

    #[test]
    fn accept_read_write_roundtrip() {
        let mut host = Multiplexer::new();
        let listener = host.listen(0).unwrap();
        let port = host.local_addr(listener).unwrap().port();

        let mut client = Multiplexer::new();
        let outbound = client
            .connect(format!("127.0.0.1:{}", port).parse().unwrap())
            .unwrap();

        let client_events = client.poll(TICK);
        assert!(matches!(client_events[0], NetEvent::Connected(id) if id == outbound));

        let mut host_events = Vec::new();
        pump_until(&mut host, &mut host_events, |ev| has_accept(ev).is_some());
        let inbound = has_accept(&host_events).unwrap();

        client
            .send(outbound, &Message::Handshake { timestamp: 10.0 })
            .unwrap();

        let mut host_events = Vec::new();
        pump_until(&mut host, &mut host_events, |ev| {
            ev.iter().any(|e| matches!(e, NetEvent::Message { .. }))
        });

        let received = host_events
            .iter()
            .find_map(|e| match e {
                NetEvent::Message { transport, message } => Some((*transport, message.clone())),
                _ => None,
            })
            .unwrap();
        assert_eq!(received.0, inbound);
        assert_eq!(received.1, Message::Handshake { timestamp: 10.0 });
    }

    #[test]
    fn peer_close_surfaces_as_closed_event() {
        let mut host = Multiplexer::new();
        let listener = host.listen(0).unwrap();
        let port = host.local_addr(listener).unwrap().port();

        let mut client = Multiplexer::new();
        let outbound = client
            .connect(format!("127.0.0.1:{}", port).parse().unwrap())
            .unwrap();

        let mut host_events = Vec::new();
        pump_until(&mut host, &mut host_events, |ev| has_accept(ev).is_some());
        let inbound = has_accept(&host_events).unwrap();

        client.close(outbound);
        assert!(!client.is_open(outbound));

        let mut host_events = Vec::new();
        pump_until(&mut host, &mut host_events, |ev| {
            ev.iter()
                .any(|e| matches!(e, NetEvent::Closed(id) if *id == inbound))
        });
        assert!(!host.is_open(inbound));
    }

    #[test]
    fn close_is_safe_mid_dispatch_and_idempotent() {
        let mut host = Multiplexer::new();
        let listener = host.listen(0).unwrap();
        let port = host.local_addr(listener).unwrap().port();

        let mut client = Multiplexer::new();
        let a = client
            .connect(format!("127.0.0.1:{}", port).parse().unwrap())
            .unwrap();
        let b = client
            .connect(format!("127.0.0.1:{}", port).parse().unwrap())
            .unwrap();

        // Close one transport while iterating events from a poll, the way a
        // session would on an application-level error.
        for event in client.poll(TICK) {
            if let NetEvent::Connected(id) = event {
                client.close(id);
                client.close(id);
            }
        }

        assert!(!client.is_open(a));
        assert!(!client.is_open(b));

        // The next poll still runs normally and reports nothing stale.
        let events = client.poll(TICK);
        let closed: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, NetEvent::Closed(_)))
            .collect();
        assert_eq!(closed.len(), 2);
    }

    #[test]
    fn send_to_unknown_transport_is_rejected() {
        let mut mux = Multiplexer::new();
        let listener = mux.listen(0).unwrap();
        let port = mux.local_addr(listener).unwrap().port();
        let id = mux
            .connect(format!("127.0.0.1:{}", port).parse().unwrap())
            .unwrap();
        mux.close(id);

        let result = mux.send(id, &Message::Ping { timestamp: 0.0 });
        assert!(matches!(result, Err(TransportError::NotConnected)));
    }
}
