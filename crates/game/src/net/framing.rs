//! Length-prefixed framing shared by the stream and datagram transports.
//!
//! Each frame is a fixed-width length prefix in the host's native byte
//! order followed by exactly that many payload bytes.

pub const LEN_PREFIX_SIZE: usize = std::mem::size_of::<u64>();

/// Upper bound on a single payload. A prefix above this is treated as a
/// fatal framing error rather than waiting for bytes that may never come.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame length {0} exceeds limit of {MAX_FRAME_LEN} bytes")]
    Oversized(u64),
}

/// Incremental frame parser. Bytes go in via [`push`](Self::push) in chunks
/// of any size; complete payloads come out via [`next_frame`](Self::next_frame).
#[derive(Debug, Default)]
pub struct FrameReader {
    buffer: Vec<u8>,
    pending_len: Option<usize>,
}

impl FrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Returns the next complete payload, or `None` when more bytes are
    /// needed. The length prefix exceeding the buffered bytes is never an
    /// error; it just means wait for the rest.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        if self.pending_len.is_none() {
            if self.buffer.len() < LEN_PREFIX_SIZE {
                return Ok(None);
            }

            let mut prefix = [0u8; LEN_PREFIX_SIZE];
            prefix.copy_from_slice(&self.buffer[..LEN_PREFIX_SIZE]);
            let len = u64::from_ne_bytes(prefix);

            if len > MAX_FRAME_LEN as u64 {
                return Err(FrameError::Oversized(len));
            }

            self.buffer.drain(..LEN_PREFIX_SIZE);
            self.pending_len = Some(len as usize);
        }

        let expected = self.pending_len.unwrap_or(0);
        if self.buffer.len() < expected {
            return Ok(None);
        }

        self.pending_len = None;
        let payload: Vec<u8> = self.buffer.drain(..expected).collect();
        Ok(Some(payload))
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.pending_len = None;
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }
}

/// Appends one framed payload to an outbound byte buffer.
pub fn write_frame(out: &mut Vec<u8>, payload: &[u8]) {
    out.extend_from_slice(&(payload.len() as u64).to_ne_bytes());
    out.extend_from_slice(payload);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn framed(payloads: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        for payload in payloads {
            write_frame(&mut out, payload);
        }
        out
    }

    fn drain(reader: &mut FrameReader) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        while let Some(frame) = reader.next_frame().unwrap() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn single_chunk() {
        let bytes = framed(&[b"hello", b"world!"]);

        let mut reader = FrameReader::new();
        reader.push(&bytes);

        let frames = drain(&mut reader);
        assert_eq!(frames, vec![b"hello".to_vec(), b"world!".to_vec()]);
        assert_eq!(reader.buffered_len(), 0);
    }

    #[test]
    fn one_byte_at_a_time_matches_single_chunk() {
        let bytes = framed(&[b"alpha", b"", b"a longer payload than the others"]);

        let mut whole = FrameReader::new();
        whole.push(&bytes);
        let expected = drain(&mut whole);

        let mut trickle = FrameReader::new();
        let mut frames = Vec::new();
        for byte in &bytes {
            trickle.push(std::slice::from_ref(byte));
            frames.extend(drain(&mut trickle));
        }

        assert_eq!(frames, expected);
    }

    #[test]
    fn split_inside_prefix() {
        let bytes = framed(&[b"payload"]);

        let mut reader = FrameReader::new();
        reader.push(&bytes[..3]);
        assert!(reader.next_frame().unwrap().is_none());

        reader.push(&bytes[3..]);
        assert_eq!(reader.next_frame().unwrap().unwrap(), b"payload");
    }

    #[test]
    fn oversized_prefix_rejected() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(MAX_FRAME_LEN as u64 + 1).to_ne_bytes());

        let mut reader = FrameReader::new();
        reader.push(&bytes);
        assert!(matches!(reader.next_frame(), Err(FrameError::Oversized(_))));
    }

    #[test]
    fn clear_discards_partial_state() {
        let bytes = framed(&[b"payload"]);

        let mut reader = FrameReader::new();
        reader.push(&bytes[..LEN_PREFIX_SIZE + 2]);
        assert!(reader.next_frame().unwrap().is_none());

        reader.clear();
        assert_eq!(reader.buffered_len(), 0);

        reader.push(&bytes);
        assert_eq!(reader.next_frame().unwrap().unwrap(), b"payload");
    }
}
