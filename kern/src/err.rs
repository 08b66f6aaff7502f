//! Common error-handling support, generalizing the teacher's
//! `UserError`/`InteractFault` split (`sys/kern/src/err.rs`) to this
//! kernel's smaller [`abi::KernError`] taxonomy.

use abi::KernError;

use crate::task::{NextTask, TaskTable};

/// An error produced by a kernel operation invoked (directly or indirectly)
/// on behalf of a task.
///
/// Recoverable errors are reported back to the caller as a `KernError`
/// and may still request a context switch (e.g. a `send` that fails with
/// `NoSpace` but still wakes the scheduler to run something else).
/// Unrecoverable errors are faults: the offending task is forced into
/// `Dying` and the kernel itself does not unwind any further for it.
#[derive(Clone, Debug)]
pub enum KernelError {
    Recoverable(KernError, NextTask),
    Fault,
}

impl KernelError {
    pub fn recoverable(e: KernError) -> Self {
        KernelError::Recoverable(e, NextTask::Same)
    }
}

impl From<KernError> for KernelError {
    fn from(e: KernError) -> Self {
        KernelError::recoverable(e)
    }
}

/// A fault that arose while one task interacted with another (e.g. during
/// message transfer). Mirrors `InteractFault` in the teacher's `err.rs`:
/// it can blame the source, the destination, or (rarely) both.
#[derive(Copy, Clone, Debug, Default)]
pub struct InteractFault {
    pub src_faulted: bool,
    pub dst_faulted: bool,
}

impl InteractFault {
    pub fn in_src() -> Self {
        InteractFault { src_faulted: true, dst_faulted: false }
    }

    pub fn in_dst() -> Self {
        InteractFault { src_faulted: false, dst_faulted: true }
    }

    /// Forces the source task to fault if this records one.
    pub fn apply_to_src(self, tasks: &mut TaskTable, src: usize) -> NextTask {
        if self.src_faulted {
            tasks.force_to_dying(src)
        } else {
            NextTask::Same
        }
    }

    pub fn apply_to_dst(self, tasks: &mut TaskTable, dst: usize) -> NextTask {
        if self.dst_faulted {
            tasks.force_to_dying(dst)
        } else {
            NextTask::Same
        }
    }
}
