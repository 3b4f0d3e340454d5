use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};

use super::framing::{FrameReader, write_frame};
use super::protocol::{Message, ProtocolError, decode_message, encode_message};

pub const READ_CHUNK: usize = 16 * 1024;

bitflags::bitflags! {
    /// Readiness interest for the multiplexer's poll step.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Interest: u8 {
        const READABLE = 1 << 0;
        const WRITABLE = 1 << 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Disconnected,
    Connecting,
    Connected,
    Listening,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport is not connected")]
    NotConnected,
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Result of draining one transport's read side.
#[derive(Debug)]
pub enum PollRead {
    /// Nothing to do this tick.
    Idle,
    /// Complete messages arrived.
    Messages(Vec<Message>),
    /// The peer closed the connection or a fatal error occurred; the
    /// transport has released its handle and discarded its buffers.
    Closed,
}

fn is_would_block(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// One non-blocking, length-framed TCP connection.
///
/// Write attempts that the OS rejects with `WouldBlock` retain the unsent
/// remainder; reads drain everything currently available and decode any
/// complete frames.
#[derive(Debug)]
pub struct StreamTransport {
    stream: Option<TcpStream>,
    state: TransportState,
    interest: Interest,
    reader: FrameReader,
    write_buffer: Vec<u8>,
}

impl StreamTransport {
    /// Connects to `addr`. std's connect completes (or fails) synchronously,
    /// so a successful return is already `Connected`; the multiplexer fires
    /// the connected notification when the transport is registered.
    ///
    /// The call blocks until the OS accepts or refuses the connection; an
    /// unroutable address stalls for the full OS connect timeout.
    pub fn connect(addr: SocketAddr) -> io::Result<Self> {
        let stream = TcpStream::connect(addr)?;
        Self::from_stream(stream)
    }

    /// Wraps an accepted or connected stream, switching it to non-blocking
    /// mode and disabling write coalescing so frames are not held back.
    pub fn from_stream(stream: TcpStream) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;

        Ok(Self {
            stream: Some(stream),
            state: TransportState::Connected,
            interest: Interest::READABLE,
            reader: FrameReader::new(),
            write_buffer: Vec::new(),
        })
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn interest(&self) -> Interest {
        self.interest
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.stream.as_ref().and_then(|s| s.peer_addr().ok())
    }

    /// Encodes the message, frames it, and attempts an immediate flush.
    pub fn send(&mut self, message: &Message) -> Result<(), TransportError> {
        if self.state != TransportState::Connected {
            return Err(TransportError::NotConnected);
        }

        let payload = encode_message(message)?;
        write_frame(&mut self.write_buffer, &payload);
        self.interest |= Interest::WRITABLE;
        self.poll_write();
        Ok(())
    }

    /// Flushes as much of the write buffer as the OS accepts. Returns true
    /// when the transport closed due to a fatal error.
    pub fn poll_write(&mut self) -> bool {
        if self.write_buffer.is_empty() {
            self.interest -= Interest::WRITABLE;
            return false;
        }

        let Some(stream) = self.stream.as_mut() else {
            return false;
        };

        match stream.write(&self.write_buffer) {
            Ok(sent) => {
                self.write_buffer.drain(..sent);
                if self.write_buffer.is_empty() {
                    self.interest -= Interest::WRITABLE;
                }
                false
            }
            Err(ref e) if is_would_block(e) => false,
            Err(e) => {
                log::debug!("write failed, closing transport: {}", e);
                self.close();
                true
            }
        }
    }

    /// Drains available bytes and decodes complete frames. Malformed
    /// payloads are dropped and the connection stays open; framing errors
    /// and fatal read errors close the transport.
    pub fn poll_read(&mut self) -> PollRead {
        let Some(stream) = self.stream.as_mut() else {
            return PollRead::Idle;
        };

        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match stream.read(&mut chunk) {
                Ok(0) => {
                    self.close();
                    return PollRead::Closed;
                }
                Ok(received) => self.reader.push(&chunk[..received]),
                Err(ref e) if is_would_block(e) => break,
                Err(e) => {
                    log::debug!("read failed, closing transport: {}", e);
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
                    log::warn!("framing error, closing transport: {}", e);
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

    /// Releases the OS handle and discards both buffers. Idempotent.
    pub fn close(&mut self) {
        self.stream = None;
        self.state = TransportState::Disconnected;
        self.interest = Interest::empty();
        self.reader.clear();
        self.write_buffer.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }
}

/// A listening TCP socket. Never becomes `Connected` itself; it spawns new
/// `StreamTransport`s via accept.
#[derive(Debug)]
pub struct ListenerTransport {
    listener: TcpListener,
}

impl ListenerTransport {
    pub fn listen(port: u16) -> io::Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port))?;
        listener.set_nonblocking(true)?;
        Ok(Self { listener })
    }

    pub fn state(&self) -> TransportState {
        TransportState::Listening
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Drains every pending inbound connection into new transports.
    pub fn poll_accept(&mut self) -> Vec<StreamTransport> {
        let mut accepted = Vec::new();
        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => match StreamTransport::from_stream(stream) {
                    Ok(transport) => {
                        log::info!("accepted connection from {}", addr);
                        accepted.push(transport);
                    }
                    Err(e) => log::warn!("failed to adopt accepted stream: {}", e),
                },
                Err(ref e) if is_would_block(e) => break,
                Err(e) => {
                    log::warn!("accept failed: {}", e);
                    break;
                }
            }
        }
        accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_is_idempotent() {
        let listener = ListenerTransport::listen(0).unwrap();
        let addr = listener.local_addr().unwrap();

        let mut transport = StreamTransport::connect(addr).unwrap();
        assert_eq!(transport.state(), TransportState::Connected);

        transport.close();
        assert!(transport.is_closed());
        transport.close();
        assert!(transport.is_closed());
        assert_eq!(transport.state(), TransportState::Disconnected);
    }

    #[test]
    fn interest_tracks_the_write_buffer() {
        let listener = ListenerTransport::listen(0).unwrap();
        let addr = listener.local_addr().unwrap();

        let mut transport = StreamTransport::connect(addr).unwrap();
        assert_eq!(transport.interest(), Interest::READABLE);

        // A small frame fits the socket buffer, so the flush inside send
        // already clears the write interest again.
        transport.send(&Message::Ping { timestamp: 1.0 }).unwrap();
        assert_eq!(transport.interest(), Interest::READABLE);

        transport.close();
        assert_eq!(transport.interest(), Interest::empty());
    }

    #[test]
    fn send_after_close_is_rejected() {
        let listener = ListenerTransport::listen(0).unwrap();
        let addr = listener.local_addr().unwrap();

        let mut transport = StreamTransport::connect(addr).unwrap();
        transport.close();

        let result = transport.send(&Message::Handshake { timestamp: 1.0 });
        assert!(matches!(result, Err(TransportError::NotConnected)));
    }

    #[test]
    fn listener_drains_pending_accepts() {
        let mut listener = ListenerTransport::listen(0).unwrap();
        let addr = listener.local_addr().unwrap();

        let _a = StreamTransport::connect(addr).unwrap();
        let _b = StreamTransport::connect(addr).unwrap();

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
        let mut accepted = Vec::new();
        while accepted.len() < 2 && std::time::Instant::now() < deadline {
            accepted.extend(listener.poll_accept());
            std::thread::sleep(std::time::Duration::from_millis(1));
        }

        assert_eq!(accepted.len(), 2);
        assert!(listener.poll_accept().is_empty());
    }
}
