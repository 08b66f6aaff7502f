//! Syscall dispatch (`spec.md` §6's "Syscall ABI").
//!
//! Grounded on `sys/kern/src/syscalls.rs`: one small function per defined
//! id, working entirely in terms of already-decoded arguments — the
//! register packing/unpacking itself is `abi::RawSyscall`'s job, not this
//! module's. `spec.md` §6 fixes exactly four ids; anything else decodes to
//! `None` and is the caller's fault to handle (matching the original's
//! default-arm behavior for an unrecognized trap number).

use abi::{RawSyscall, SigSet, Syscall};

use crate::arch::PlatformAdapter;
use crate::kernel::{ConsoleSink, Kernel};
use crate::task::NextTask;

/// Largest chunk a single `CONSOLE_WRITE` pass copies through a
/// stack-resident staging buffer. `spec.md` places no cap on `len`; longer
/// writes are simply serviced as several shorter ones, and a short count is
/// always a valid (not erroneous) return value.
const CONSOLE_CHUNK: usize = 32;

/// The outcome of dispatching one syscall. `Resolved` carries the value to
/// place in the calling task's return register right away; `Blocked` means
/// the task has already moved to `Sleeping` and carries no value — the
/// platform-specific trampoline (out of scope per `spec.md` §1) is
/// responsible for supplying one once a later `TaskTable::recheck_wait`
/// reports the wait condition satisfied and the task resumes.
pub enum SyscallOutcome {
    Resolved(i32, NextTask),
    Blocked(NextTask),
}

/// Dispatches one decoded trap from task `current`. Returns `None` if
/// `raw.id` does not name a defined syscall.
pub fn dispatch<P: PlatformAdapter, C: ConsoleSink>(
    kernel: &mut Kernel<P, C>,
    current: usize,
    raw: RawSyscall,
) -> Option<SyscallOutcome> {
    let call = raw.syscall()?;
    Some(match call {
        Syscall::ConsoleWrite => console_write(kernel, raw.arg1, raw.arg2),
        Syscall::Sleep => sleep(kernel, current, raw.arg1),
        Syscall::ConsoleWait => console_wait(kernel),
        Syscall::TaskExit => task_exit(kernel),
    })
}

/// `CONSOLE_WRITE(ptr, len)`: stages up to `CONSOLE_CHUNK` bytes out of the
/// caller's address space through the validated-copy path, then hands them
/// to the console sink. An out-of-range `ptr` fails with `-1`; a
/// successful write returns the count actually written, which may be less
/// than `len` (`spec.md` §7: "partial console write is allowed").
fn console_write<P: PlatformAdapter, C: ConsoleSink>(kernel: &mut Kernel<P, C>, ptr: u32, len: u32) -> SyscallOutcome {
    let mut staged = [0u8; CONSOLE_CHUNK];
    let n = (len as usize).min(CONSOLE_CHUNK);
    if kernel.platform.user_ram_copy_from_user(&mut staged[..n], ptr).is_err() {
        return SyscallOutcome::Resolved(-1, NextTask::Same);
    }
    let written = kernel.console.write(&staged[..n]);
    SyscallOutcome::Resolved(written as i32, NextTask::Same)
}

/// `SLEEP(msec)`: arms the caller's sleep timer and waits on `KSLEEP`,
/// per `timer_set`/`wait`'s combined contract (`spec.md` §4.1's ops list).
/// A stale timer event from a previous sleep is cancelled first, so this
/// syscall is safe to call again even if the last one somehow didn't fire.
fn sleep<P: PlatformAdapter, C: ConsoleSink>(kernel: &mut Kernel<P, C>, current: usize, msec: u32) -> SyscallOutcome {
    kernel.timers.event_del(current);
    if kernel.timers.event_add(current, msec).is_err() {
        return SyscallOutcome::Resolved(-1, NextTask::Same);
    }
    match kernel.tasks.wait(current, SigSet::KSLEEP) {
        Some(_) => SyscallOutcome::Resolved(0, NextTask::Same),
        None => SyscallOutcome::Blocked(NextTask::Other),
    }
}

/// `CONSOLE_WAIT`: a non-blocking poll of the console sink's input buffer
/// (see `DESIGN.md` for why this doesn't block — the fixed `SigSet` layout
/// has no console-ready bit to wait on). Returns the byte value `0..=255`
/// if one was buffered, `-1` otherwise.
fn console_wait<P: PlatformAdapter, C: ConsoleSink>(kernel: &mut Kernel<P, C>) -> SyscallOutcome {
    match kernel.console.read_byte() {
        Some(b) => SyscallOutcome::Resolved(b as i32, NextTask::Same),
        None => SyscallOutcome::Resolved(-1, NextTask::Same),
    }
}

/// `TASK_EXIT`: never actually returns to the caller, but resolves with a
/// placeholder value for symmetry with the other arms.
fn task_exit<P: PlatformAdapter, C: ConsoleSink>(kernel: &mut Kernel<P, C>) -> SyscallOutcome {
    let next = kernel.tasks.exit_current();
    SyscallOutcome::Resolved(0, next)
}
