//! Variable-length IPC message object (`spec.md` §3, §4.4).
//!
//! Grounded on `original_source/src/kern/ipc/msg.c`/`.h`: there, messages
//! are allocated out of physmem on demand. This kernel instead gives each
//! port a small fixed pool of message slots sized to
//! [`crate::config::PORT_QUEUE_DEPTH`] — the port-IPC analogue of the
//! eight-segment task table being a fixed array instead of a linked
//! freelist: no heap allocator is available this low in the kernel, and a
//! bounded number of in-flight messages per port is exactly what §4.4's
//! "Fails with `NoSpace` if the receive queue is at capacity" already
//! requires.

/// Maximum payload size of one IPC message. Large enough for the 32-byte
/// messages `spec.md` §8's ping/pong and pipe-overflow scenarios use.
pub const MAX_MSG_SIZE: usize = 64;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MsgState {
    None,
    Queued,
    Received,
    Completed,
    Finished,
}

#[derive(Copy, Clone, Debug)]
pub struct Message {
    pub state: MsgState,
    /// Index of the port that sent this message.
    pub src: usize,
    /// Index of the port this message was delivered to.
    pub dst: usize,
    pub len: usize,
    pub payload: [u8; MAX_MSG_SIZE],
}

impl Message {
    pub const EMPTY: Message = Message {
        state: MsgState::None,
        src: 0,
        dst: 0,
        len: 0,
        payload: [0; MAX_MSG_SIZE],
    };

    pub fn bytes(&self) -> &[u8] {
        &self.payload[..self.len]
    }
}
