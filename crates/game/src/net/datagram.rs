use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

use super::framing::{FrameReader, write_frame};
use super::protocol::{Message, decode_message, encode_message};
use super::transport::{PollRead, READ_CHUNK, TransportError, TransportState};

pub const DEFAULT_DATAGRAM_TIMEOUT: Duration = Duration::from_secs(10);

/// Connectionless client-role transport with a declared peer.
///
/// Framing is identical to the stream transport. Because a datagram channel
/// has no OS-level close signal, liveness is inferred: a timer accumulates
/// elapsed time each tick and forces disconnection at the configured
/// timeout, independent of traffic.
#[derive(Debug)]
pub struct DatagramTransport {
    socket: Option<UdpSocket>,
    peer: SocketAddr,
    state: TransportState,
    reader: FrameReader,
    write_buffer: Vec<u8>,
    timeout: Duration,
    timer: Duration,
}

impl DatagramTransport {
    /// Binds an ephemeral local port and declares `peer`. The transport is
    /// `Connecting` until the first datagram from the peer arrives; sending
    /// the opening handshake is the caller's responsibility.
    pub fn connect(peer: SocketAddr, timeout: Duration) -> io::Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.set_nonblocking(true)?;

        Ok(Self {
            socket: Some(socket),
            peer,
            state: TransportState::Connecting,
            reader: FrameReader::new(),
            write_buffer: Vec::new(),
            timeout,
            timer: Duration::ZERO,
        })
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        match &self.socket {
            Some(socket) => socket.local_addr(),
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "closed")),
        }
    }

    pub fn send(&mut self, message: &Message) -> Result<(), TransportError> {
        if self.state == TransportState::Disconnected {
            return Err(TransportError::NotConnected);
        }

        let payload = encode_message(message)?;
        write_frame(&mut self.write_buffer, &payload);
        self.poll_write();
        Ok(())
    }

    /// Sends the whole write buffer as one datagram, retaining whatever the
    /// OS did not accept. Returns true when the transport closed.
    pub fn poll_write(&mut self) -> bool {
        if self.write_buffer.is_empty() {
            return false;
        }

        let Some(socket) = self.socket.as_ref() else {
            return false;
        };

        match socket.send_to(&self.write_buffer, self.peer) {
            Ok(sent) => {
                self.write_buffer.drain(..sent);
                false
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => false,
            Err(e) => {
                log::debug!("datagram send failed, closing: {}", e);
                self.close();
                true
            }
        }
    }

    /// Drains pending datagrams. Datagrams from any sender other than the
    /// declared peer are discarded without touching the read buffer.
    pub fn poll_read(&mut self) -> PollRead {
        let Some(socket) = self.socket.as_ref() else {
            return PollRead::Idle;
        };

        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match socket.recv_from(&mut chunk) {
                Ok((received, sender)) => {
                    if sender != self.peer {
                        log::debug!("discarding datagram from unexpected sender {}", sender);
                        continue;
                    }
                    if self.state == TransportState::Connecting {
                        self.state = TransportState::Connected;
                    }
                    self.reader.push(&chunk[..received]);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    log::debug!("datagram recv failed, closing: {}", e);
                    self.close();
                    return PollRead::Closed;
                }
            }
        }

        let mut messages = Vec::new();
        loop {
            match self.reader.next_frame() {
                Ok(Some(payload)) => match decode_message(&payload) {
                    Ok(message) => messages.push(message),
                    Err(e) => log::debug!("dropping malformed payload: {}", e),
                },
                Ok(None) => break,
                Err(e) => {
                    log::warn!("framing error, closing datagram transport: {}", e);
                    self.close();
                    return PollRead::Closed;
                }
            }
        }

        if messages.is_empty() {
            PollRead::Idle
        } else {
            PollRead::Messages(messages)
        }
    }

    /// Advances the liveness timer. Returns true when the timeout was
    /// reached and the transport closed itself.
    pub fn tick(&mut self, dt: Duration) -> bool {
        if self.state == TransportState::Disconnected {
            return false;
        }

        self.timer += dt;
        if self.timer >= self.timeout {
            log::info!("datagram transport timed out after {:?}", self.timeout);
            self.close();
            return true;
        }
        false
    }

    pub fn close(&mut self) {
        self.socket = None;
        self.state = TransportState::Disconnected;
        self.reader.clear();
        self.write_buffer.clear();
        self.timer = Duration::ZERO;
    }

    pub fn is_closed(&self) -> bool {
        self.socket.is_none()
    }
}
