//! Byte pipes: a circular, length-framed byte buffer for streaming IPC
//! (`spec.md` §4.4).
//!
//! Grounded on `original_source/src/kern/ipc/pipe.c`: `queue_locked` there
//! is a real circular-buffer writer, but `dequeue_locked`/`consume_locked`
//! are unimplemented stubs (`return KERN_ERR_UNIMPLEMENTED`). Both are
//! fully implemented here, split the same way the original header declares
//! them: `dequeue` peeks the frame at the head of the buffer without
//! removing it, `consume` commits that peek by advancing past it. This
//! split lets a caller inspect a frame's length before deciding whether it
//! has room to copy it out, matching the read side of `spec.md` §8
//! scenario 5's overflow/drain test.
//!
//! Framing metadata (each queued message's length) lives in its own
//! fixed-size ring alongside the byte buffer, rather than as an inline
//! length prefix within it: `spec.md` §8 scenario 5 sizes a pipe's buffer
//! and its messages so that exactly four fit and a fifth doesn't
//! (`4 * 32 == 128`), which only holds if a queued message costs exactly
//! its own byte length against the buffer's capacity, with no framing
//! overhead charged against it.

use abi::KernError;

use crate::config::{PIPE_BUF_SIZE, PIPE_MAX_FRAMES};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PipeState {
    Open,
    Shutdown,
    Closed,
}

pub struct Pipe {
    live: bool,
    owner: usize,
    state: PipeState,
    max_msg_size: usize,
    /// Configured capacity for this pipe, `<= PIPE_BUF_SIZE` (`buf`'s
    /// unused tail, if any, is simply never touched).
    cap: usize,
    buf: [u8; PIPE_BUF_SIZE],
    head: usize,
    len: usize,
    /// Lengths of queued frames, oldest first, starting at `frame_head`.
    frame_lens: [usize; PIPE_MAX_FRAMES],
    frame_head: usize,
    frame_count: usize,
}

impl Pipe {
    const fn empty() -> Self {
        Pipe {
            live: false,
            owner: 0,
            state: PipeState::Open,
            max_msg_size: 0,
            cap: 0,
            buf: [0; PIPE_BUF_SIZE],
            head: 0,
            len: 0,
            frame_lens: [0; PIPE_MAX_FRAMES],
            frame_head: 0,
            frame_count: 0,
        }
    }

    pub fn state(&self) -> PipeState {
        self.state
    }

    pub fn owner(&self) -> usize {
        self.owner
    }

    fn free_space(&self) -> usize {
        self.cap - self.len
    }

    fn byte_at(&self, offset: usize) -> u8 {
        self.buf[(self.head + offset) % self.cap]
    }

    fn write_at(&mut self, offset: usize, b: u8) {
        let pos = (self.head + offset) % self.cap;
        self.buf[pos] = b;
    }

    fn front_frame_len(&self) -> Option<usize> {
        if self.frame_count == 0 {
            return None;
        }
        Some(self.frame_lens[self.frame_head])
    }

    /// `queue(data)` (`spec.md` §4.4): appends one framed message. Fails
    /// with `TooBig` if `data` exceeds this pipe's configured maximum
    /// message size, or `NoSpace` if the byte buffer lacks room for the
    /// payload or the frame-count ring is already full — partial frames
    /// are never written.
    pub fn queue(&mut self, data: &[u8]) -> Result<(), KernError> {
        if self.state != PipeState::Open {
            return Err(KernError::Shutdown);
        }
        if data.len() > self.max_msg_size {
            return Err(KernError::TooBig);
        }
        if self.frame_count == PIPE_MAX_FRAMES || data.len() > self.free_space() {
            return Err(KernError::NoSpace);
        }
        let base = self.len;
        for (i, &b) in data.iter().enumerate() {
            self.write_at(base + i, b);
        }
        self.len += data.len();
        let tail = (self.frame_head + self.frame_count) % PIPE_MAX_FRAMES;
        self.frame_lens[tail] = data.len();
        self.frame_count += 1;
        Ok(())
    }

    /// `dequeue(out)` (`spec.md` §4.4): copies the frame at the head of
    /// the buffer into `out` without removing it, returning its length.
    /// Fails with `Empty` if no frame is queued, or `TooBig` if `out` is
    /// too small to hold it (the frame is left in place either way — call
    /// [`Pipe::consume`] only once the caller has actually used the data).
    pub fn dequeue(&self, out: &mut [u8]) -> Result<usize, KernError> {
        let frame_len = self.front_frame_len().ok_or(KernError::Empty)?;
        if frame_len > out.len() {
            return Err(KernError::TooBig);
        }
        for i in 0..frame_len {
            out[i] = self.byte_at(i);
        }
        Ok(frame_len)
    }

    /// `consume()` (`spec.md` §4.4): removes the frame at the head of the
    /// buffer (as most recently reported by [`Pipe::dequeue`]), freeing
    /// its space for new `queue` calls. A no-op, returning `Empty`, if the
    /// pipe is empty.
    pub fn consume(&mut self) -> Result<(), KernError> {
        let frame_len = self.front_frame_len().ok_or(KernError::Empty)?;
        self.head = (self.head + frame_len) % self.cap;
        self.len -= frame_len;
        self.frame_head = (self.frame_head + 1) % PIPE_MAX_FRAMES;
        self.frame_count -= 1;
        Ok(())
    }

    /// `flush()` (`spec.md` §4.4): discards all buffered frames.
    pub fn flush(&mut self) {
        self.head = 0;
        self.len = 0;
        self.frame_head = 0;
        self.frame_count = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.frame_count == 0
    }
}

pub struct PipeTable {
    pipes: [Pipe; crate::config::MAX_PIPES],
}

impl PipeTable {
    pub fn new() -> Self {
        PipeTable { pipes: core::array::from_fn(|_| Pipe::empty()) }
    }

    pub fn pipe(&self, idx: usize) -> &Pipe {
        &self.pipes[idx]
    }

    pub fn pipe_mut(&mut self, idx: usize) -> &mut Pipe {
        &mut self.pipes[idx]
    }

    /// Allocates a pipe with its own `buf_size`-byte buffer (`<=
    /// PIPE_BUF_SIZE`) and `max_msg_size` cap, per `spec.md` §4.5's "bounded
    /// capacity and a bounded max-message size".
    pub fn create(&mut self, owner: usize, max_msg_size: usize, buf_size: usize) -> Result<usize, KernError> {
        if buf_size == 0 || buf_size > PIPE_BUF_SIZE {
            return Err(KernError::InvalidArgs);
        }
        let idx = self.pipes.iter().position(|p| !p.live).ok_or(KernError::NoMem)?;
        self.pipes[idx] = Pipe::empty();
        self.pipes[idx].live = true;
        self.pipes[idx].owner = owner;
        self.pipes[idx].max_msg_size = max_msg_size;
        self.pipes[idx].cap = buf_size;
        Ok(idx)
    }

    pub fn shutdown(&mut self, idx: usize) {
        self.pipes[idx].state = PipeState::Shutdown;
    }

    pub fn close(&mut self, idx: usize) {
        self.pipes[idx].flush();
        self.pipes[idx].state = PipeState::Closed;
        self.pipes[idx].live = false;
    }
}

impl Default for PipeTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_then_dequeue_roundtrips() {
        let mut pt = PipeTable::new();
        let p = pt.create(0, 32, 128).unwrap();
        pt.pipe_mut(p).queue(b"hello").unwrap();
        let mut out = [0u8; 32];
        let n = pt.pipe(p).dequeue(&mut out).unwrap();
        assert_eq!(&out[..n], b"hello");
    }

    #[test]
    fn dequeue_without_consume_is_idempotent_peek() {
        let mut pt = PipeTable::new();
        let p = pt.create(0, 32, 128).unwrap();
        pt.pipe_mut(p).queue(b"x").unwrap();
        let mut out = [0u8; 32];
        assert_eq!(pt.pipe(p).dequeue(&mut out).unwrap(), 1);
        assert_eq!(pt.pipe(p).dequeue(&mut out).unwrap(), 1, "peek must not remove");
        pt.pipe_mut(p).consume().unwrap();
        assert_eq!(pt.pipe(p).dequeue(&mut out), Err(KernError::Empty));
    }

    #[test]
    fn oversized_message_is_rejected() {
        let mut pt = PipeTable::new();
        let p = pt.create(0, 4, 128).unwrap();
        assert_eq!(pt.pipe_mut(p).queue(b"too long"), Err(KernError::TooBig));
    }

    #[test]
    fn buf_size_above_ceiling_is_rejected() {
        let mut pt = PipeTable::new();
        assert_eq!(pt.create(0, 32, PIPE_BUF_SIZE + 1), Err(KernError::InvalidArgs));
    }

    #[test]
    fn overflow_then_drain_then_succeeds() {
        // spec.md §8 scenario 5, exactly: a 128-byte buffer and 32-byte max
        // message. Four 32-byte messages fill it precisely (4 * 32 == 128);
        // the fifth fails with NoSpace; after dequeue+consume of one frame,
        // the fifth succeeds.
        let mut pt = PipeTable::new();
        let p = pt.create(0, 32, 128).unwrap();
        let msg = [0xABu8; 32];
        for n in 0..4 {
            pt.pipe_mut(p).queue(&msg).unwrap_or_else(|e| panic!("message {n} should fit: {e:?}"));
        }
        assert_eq!(pt.pipe_mut(p).queue(&msg), Err(KernError::NoSpace), "fifth message must not fit");

        let mut out = [0u8; 32];
        pt.pipe(p).dequeue(&mut out).unwrap();
        pt.pipe_mut(p).consume().unwrap();
        assert!(pt.pipe_mut(p).queue(&msg).is_ok(), "draining one frame must free exactly one message's room");
    }

    #[test]
    fn frame_count_ceiling_is_independent_of_byte_space() {
        // PIPE_MAX_FRAMES tiny 1-byte messages exhaust the frame-count ring
        // long before the byte buffer does.
        let mut pt = PipeTable::new();
        let p = pt.create(0, 1, 128).unwrap();
        for _ in 0..PIPE_MAX_FRAMES {
            pt.pipe_mut(p).queue(&[0u8]).unwrap();
        }
        assert_eq!(pt.pipe_mut(p).queue(&[0u8]), Err(KernError::NoSpace));
    }

    #[test]
    fn flush_discards_everything() {
        let mut pt = PipeTable::new();
        let p = pt.create(0, 32, 128).unwrap();
        pt.pipe_mut(p).queue(b"abc").unwrap();
        pt.pipe_mut(p).flush();
        assert!(pt.pipe(p).is_empty());
    }

    #[test]
    fn shutdown_rejects_new_enqueues() {
        let mut pt = PipeTable::new();
        let p = pt.create(0, 32, 128).unwrap();
        pt.shutdown(p);
        assert_eq!(pt.pipe_mut(p).queue(b"x"), Err(KernError::Shutdown));
    }
}
