use core::convert::TryFrom;

/// Number of bits of a [`TaskId`] devoted to the table index; the rest hold
/// the generation. Chosen to comfortably exceed any task table this kernel
/// is configured with while leaving enough generation bits to make stale
/// handles astronomically unlikely to collide.
const INDEX_BITS: u32 = 10;
const INDEX_MASK: u16 = (1 << INDEX_BITS) - 1;

/// A generation counter attached to a task table slot.
///
/// Every time a slot is reused by a new task, its generation is bumped, so
/// a [`TaskId`] captured before the reuse can be detected as stale instead
/// of silently referring to an unrelated task (the anti-ABA discipline
/// described informally in `spec.md` §3 as "a stable identifier (opaque
/// handle)").
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
#[repr(transparent)]
pub struct Generation(u8);

impl Generation {
    pub const ZERO: Self = Self(0);

    /// The generation that follows this one, wrapping rather than
    /// overflowing — a slot simply cycles back through old generation
    /// numbers after enough churn, which is fine since a `TaskId` captured
    /// that long ago has long since been forgotten.
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl From<u8> for Generation {
    fn from(x: u8) -> Self {
        Self(x)
    }
}

impl From<Generation> for u8 {
    fn from(g: Generation) -> Self {
        g.0
    }
}

/// Opaque handle to a task: a table index plus a generation, packed into a
/// single `u16` so it fits comfortably in a syscall argument register.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(transparent)]
pub struct TaskId(u16);

impl TaskId {
    /// Reserved value meaning "no task" / "unused slot neighbor", never a
    /// valid index+generation pair produced by [`TaskId::for_index`].
    pub const KERNEL: TaskId = TaskId(0xffff);

    pub fn for_index(index: usize, generation: Generation) -> Self {
        debug_assert!(index <= INDEX_MASK as usize);
        let packed = (index as u16 & INDEX_MASK)
            | ((generation.0 as u16) << INDEX_BITS);
        TaskId(packed)
    }

    pub fn index(self) -> usize {
        (self.0 & INDEX_MASK) as usize
    }

    pub fn generation(self) -> Generation {
        Generation((self.0 >> INDEX_BITS) as u8)
    }
}

impl From<TaskId> for u16 {
    fn from(t: TaskId) -> Self {
        t.0
    }
}

impl From<u16> for TaskId {
    fn from(raw: u16) -> Self {
        TaskId(raw)
    }
}

impl TryFrom<u32> for TaskId {
    type Error = ();

    fn try_from(raw: u32) -> Result<Self, ()> {
        u16::try_from(raw).map(TaskId).map_err(|_| ())
    }
}

/// A task's position in the lifecycle state machine (`spec.md` §3, §4.1).
///
/// The only legal edges are those `spec.md`'s §4.1 state table names;
/// everything else is rejected by the scheduler rather than encoded in this
/// type, matching the teacher's preference for a plain enum checked at the
/// call site over a typestate encoding (task identity needs to survive
/// transitions, so the state can't simply be consumed and replaced).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TaskState {
    Idle,
    Ready,
    Running,
    Sleeping,
    Dying,
}

impl TaskState {
    pub fn is_runnable(self) -> bool {
        matches!(self, TaskState::Ready | TaskState::Running)
    }
}
