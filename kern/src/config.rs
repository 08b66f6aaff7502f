//! Plain compile-time configuration constants, replacing the teacher's
//! RON/`build-kconfig` app-manifest code generation (see `SPEC_FULL.md`,
//! "Configuration") now that there is no static per-board task list left to
//! generate it from. Adjust these and rebuild to retarget table sizes.

/// Maximum number of tasks the kernel can host at once (kernel + user).
pub const MAX_TASKS: usize = 16;

/// Maximum number of simultaneously live IPC ports.
pub const MAX_PORTS: usize = 16;

/// Maximum number of simultaneously live IPC pipes.
pub const MAX_PIPES: usize = 8;

/// Maximum length, in bytes, of a task name or a registered port name.
pub const MAX_NAME_LEN: usize = 16;

/// Depth of a port's receive queue and completion queue.
pub const PORT_QUEUE_DEPTH: usize = 4;

/// Default scheduler tick interval in milliseconds (`spec.md` §5: "e.g. 100
/// ms").
pub const DEFAULT_TICK_MSEC: u32 = 100;

/// Upper bound on the byte capacity a single pipe's buffer may be
/// configured with (`spec.md` §4.4); sizes this array so `PipeTable::create`
/// can hand each pipe a smaller, caller-chosen capacity up to this ceiling
/// without a heap.
pub const PIPE_BUF_SIZE: usize = 256;

/// Upper bound on how many framed messages a single pipe may hold queued at
/// once, independent of how many bytes they occupy — framing metadata
/// (each message's length) lives in a fixed-size array alongside the byte
/// buffer rather than inline in it, so `spec.md` §8 scenario 5's "four
/// 32-byte messages fill a 128-byte buffer, the fifth fails with NoSpace"
/// is exact: a message's queued payload costs only its own bytes, no framing
/// overhead. 8 is comfortably above the four frames that scenario queues at
/// once.
pub const PIPE_MAX_FRAMES: usize = 8;
