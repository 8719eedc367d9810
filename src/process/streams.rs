//! Pipe readers feeding the supervision loop
//!
//! Each pipe is drained by its own thread so the child never blocks on a full
//! pipe buffer (~64KB on Linux). Chunks arrive on one channel, which lets the
//! supervision loop wait on both streams with a single bounded `recv_timeout`.

use std::io::Read;
use std::sync::mpsc::Sender;
use std::thread;

/// Maximum captured output per stream (10MB)
pub const MAX_OUTPUT_SIZE: usize = 10 * 1024 * 1024;

const CHUNK_SIZE: usize = 8192;

const TRUNCATION_MARKER: &[u8] = b"\n[output truncated at 10MB]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Stdout => "stdout",
            StreamKind::Stderr => "stderr",
        }
    }
}

/// Message from a pipe reader thread
#[derive(Debug)]
pub(super) enum StreamEvent {
    Data(StreamKind, Vec<u8>),
    Closed(StreamKind),
}

/// Drain `stream` on a background thread, forwarding chunks to `tx`
///
/// The thread ends at EOF, on a read error, or once the receiver is dropped.
pub(super) fn spawn_reader<R>(kind: StreamKind, mut stream: R, tx: Sender<StreamEvent>)
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut chunk = [0u8; CHUNK_SIZE];
        loop {
            match stream.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send(StreamEvent::Data(kind, chunk[..n].to_vec())).is_err() {
                        return;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
        let _ = tx.send(StreamEvent::Closed(kind));
    });
}

/// Output buffer that stops growing at a fixed limit
///
/// Bytes past the limit are dropped (they still count as progress upstream)
/// and a truncation marker is appended when the buffer is taken.
#[derive(Debug)]
pub struct CappedBuffer {
    buf: Vec<u8>,
    limit: usize,
    truncated: bool,
}

impl CappedBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            buf: Vec::new(),
            limit,
            truncated: false,
        }
    }

    pub fn push(&mut self, bytes: &[u8]) {
        let remaining = self.limit.saturating_sub(self.buf.len());
        let to_copy = bytes.len().min(remaining);
        self.buf.extend_from_slice(&bytes[..to_copy]);
        if to_copy < bytes.len() {
            self.truncated = true;
        }
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn into_bytes(mut self) -> Vec<u8> {
        if self.truncated {
            self.buf.extend_from_slice(TRUNCATION_MARKER);
        }
        self.buf
    }
}
