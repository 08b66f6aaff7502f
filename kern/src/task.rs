//! Scheduler and task lifecycle (`spec.md` §4.1).
//!
//! Grounded on `sys/kern/src/task.rs` for shape and idiom — `Task`,
//! `NextTask` with its `combine` merge rule, and the
//! Result/context-switch-hint propagation style all come from there — but
//! the scheduling *policy* is deliberately not the teacher's: this is pure
//! round-robin (no `Priority`), and wakeup is driven by this spec's
//! persistent per-task `sig_set`/`sig_mask` (§4.3) rather than the
//! teacher's RECV-argument-passed notification mask.

use abi::{Generation, KernError, SegmentId, SigSet, TaskId, TaskState};

use crate::config::MAX_TASKS;
use crate::list::IndexQueue;
use crate::name::Name;
use crate::physmem::{Allocation, PhysMem};
use crate::taskmem::TaskMemory;

/// A scheduling hint returned by operations that may need to change which
/// task runs next. Mirrors the teacher's `NextTask`: `Same` means no
/// preference, `Specific` names a task that should run next if nothing
/// more urgent preempts it, and `Other` means "definitely reschedule,
/// don't just resume the current task" without naming who.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum NextTask {
    Same,
    Specific(TaskId),
    Other,
}

impl NextTask {
    /// Merges two scheduling hints arising from the same kernel call,
    /// preferring the more specific/urgent of the two. `Other` always
    /// wins (something is definitely runnable now); a `Specific` hint
    /// beats `Same`; two different `Specific` hints collapse to `Other`,
    /// since there's no longer a single preferred candidate.
    pub fn combine(self, other: NextTask) -> NextTask {
        match (self, other) {
            (NextTask::Other, _) | (_, NextTask::Other) => NextTask::Other,
            (NextTask::Same, x) => x,
            (x, NextTask::Same) => x,
            (NextTask::Specific(a), NextTask::Specific(b)) if a == b => NextTask::Specific(a),
            (NextTask::Specific(_), NextTask::Specific(_)) => NextTask::Other,
        }
    }
}

/// One task: kernel or user, identical in shape (`spec.md` §3).
pub struct Task {
    live: bool,
    generation: Generation,
    state: TaskState,
    name: Name,
    sig_set: SigSet,
    sig_mask: SigSet,
    /// Opaque saved-context handle. `spec.md` §9: "the abstract requirement
    /// is 'after restoring this saved state, the CPU begins executing...'"
    /// — this core never interprets the value, only stores and hands it
    /// back to the platform adapter.
    saved_sp: u32,
    refcount: u32,
    pub mem: TaskMemory,
    kstack: Option<Allocation>,
    ustack: Option<Allocation>,
}

impl Task {
    const fn empty() -> Self {
        Task {
            live: false,
            generation: Generation::ZERO,
            state: TaskState::Idle,
            name: Name::EMPTY,
            sig_set: SigSet::empty(),
            sig_mask: SigSet::empty(),
            saved_sp: 0,
            refcount: 0,
            mem: TaskMemory::new(),
            kstack: None,
            ustack: None,
        }
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn sig_set(&self) -> SigSet {
        self.sig_set
    }

    pub fn sig_mask(&self) -> SigSet {
        self.sig_mask
    }

    pub fn saved_sp(&self) -> u32 {
        self.saved_sp
    }

    pub fn set_saved_sp(&mut self, sp: u32) {
        self.saved_sp = sp;
    }

    pub fn refcount(&self) -> u32 {
        self.refcount
    }

    pub fn refcount_inc(&mut self) {
        self.refcount += 1;
    }

    /// Decrements the refcount; returns `true` if it reached zero.
    pub fn refcount_dec(&mut self) -> bool {
        assert!(self.refcount > 0, "refcount underflow is a kernel invariant violation");
        self.refcount -= 1;
        self.refcount == 0
    }

    pub fn set_sigmask(&mut self, and: SigSet, or: SigSet) {
        self.sig_mask = (self.sig_mask & and) | or;
    }
}

/// The task table plus the two scheduler lists (`spec.md` §3's "two list-
/// node slots" are realized here as membership in one of these
/// `IndexQueue`s rather than embedded links — see `crate::list`).
pub struct TaskTable {
    tasks: [Task; MAX_TASKS],
    active: IndexQueue<MAX_TASKS>,
    dying: IndexQueue<MAX_TASKS>,
    current: Option<usize>,
    idle_index: usize,
}

impl TaskTable {
    pub fn new() -> Self {
        TaskTable {
            tasks: core::array::from_fn(|_| Task::empty()),
            active: IndexQueue::new(),
            dying: IndexQueue::new(),
            current: None,
            idle_index: 0,
        }
    }

    pub fn task(&self, index: usize) -> &Task {
        &self.tasks[index]
    }

    pub fn task_mut(&mut self, index: usize) -> &mut Task {
        &mut self.tasks[index]
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn dying_count(&self) -> usize {
        self.dying.len()
    }

    /// Designates `index` as the idle task. The idle task is always
    /// selected whenever the active list is empty or a task is waiting to
    /// be reaped (`spec.md` §4.1).
    pub fn set_idle_index(&mut self, index: usize) {
        self.idle_index = index;
    }

    pub fn idle_index(&self) -> usize {
        self.idle_index
    }

    /// Finds a free (non-`live`) slot for a new task.
    pub fn allocate_slot(&mut self) -> Result<usize, KernError> {
        self.tasks
            .iter()
            .position(|t| !t.live)
            .ok_or(KernError::NoMem)
    }

    /// `init`/`user_init` (`spec.md` §4.1): prepares a task in `Idle`,
    /// taking over slot `index`. `mem` carries whatever segments are
    /// already known (the loader's six for a user program, or a blank
    /// table for a kernel task); `kstack` is the kernel-stack allocation
    /// every task needs on top of that, and `ustack` is `Some` only for
    /// user tasks.
    pub fn init(
        &mut self,
        index: usize,
        name: Name,
        mut mem: TaskMemory,
        kstack: Allocation,
        ustack: Option<Allocation>,
        initial_sp: u32,
    ) -> Result<TaskId, KernError> {
        // The generation is bumped when a slot is *retired* (see
        // `reap_one`), not here, so a fresh slot's very first task gets
        // generation zero and every reuse after that already carries the
        // bumped value.
        let generation = self.tasks[index].generation;
        mem.set(SegmentId::KernelStack, kstack.base, kstack.size, kstack.dynamic)?;
        if let Some(u) = ustack {
            mem.set(SegmentId::UserStack, u.base, u.size, u.dynamic)?;
        }
        let t = &mut self.tasks[index];
        *t = Task::empty();
        t.mem = mem;
        t.live = true;
        t.generation = generation;
        t.state = TaskState::Idle;
        t.name = name;
        t.refcount = 1;
        // The three reserved signal bits are always unblockable: nothing in
        // the syscall surface lets a task opt into KSLEEP/TERMINATE/
        // PORT_RXREADY, so a task that never calls `set_sigmask` must still
        // be wakeable by its own sleep timer and by a forced termination.
        t.sig_mask = SigSet::KSLEEP | SigSet::TERMINATE | SigSet::PORT_RXREADY;
        t.kstack = Some(kstack);
        t.ustack = ustack;
        t.saved_sp = initial_sp;
        Ok(TaskId::for_index(index, generation))
    }

    /// Resolves a `TaskId` to its table index, checking the generation
    /// matches (`spec.md` §8: "For all ports P..." and the anti-ABA
    /// discipline `abi::TaskId` exists for).
    pub fn check_task_id(&self, id: TaskId) -> Result<usize, KernError> {
        let idx = id.index();
        if idx >= MAX_TASKS {
            return Err(KernError::InvalidTaskId);
        }
        let t = &self.tasks[idx];
        if !t.live || t.generation != id.generation() {
            return Err(KernError::InvalidTaskId);
        }
        Ok(idx)
    }

    pub fn task_id_of(&self, index: usize) -> TaskId {
        TaskId::for_index(index, self.tasks[index].generation)
    }

    /// `start` (`spec.md` §4.1): `Idle -> Ready`, enqueue on the active
    /// list. A no-op (not an error) if the task isn't `Idle`, per §4.1's
    /// "`start` of an already-started task is a no-op via state check."
    pub fn start(&mut self, index: usize) {
        let t = &mut self.tasks[index];
        if t.state == TaskState::Idle {
            t.state = TaskState::Ready;
            self.active.push_back(index);
        }
    }

    /// `select` (`spec.md` §4.1): round-robin pop from the active list, or
    /// the idle task if the list is empty or a reap is pending. The
    /// previously running task (if any, and if still live) is returned to
    /// the caller so it can be re-enqueued as `Ready` unless it moved to
    /// `Sleeping`/`Dying` in the same step.
    pub fn select(&mut self) -> usize {
        let chosen = if self.dying.len() > 0 || self.active.is_empty() {
            self.idle_index
        } else {
            self.active.pop_front().expect("active list just checked non-empty")
        };
        self.tasks[chosen].state = TaskState::Running;
        self.current = Some(chosen);
        chosen
    }

    /// Called at the end of a quantum for the currently running task, if
    /// it's still runnable: `Running -> Ready`, re-enqueued at the tail.
    pub fn preempt_current(&mut self) {
        if let Some(cur) = self.current {
            if self.tasks[cur].state == TaskState::Running {
                self.tasks[cur].state = TaskState::Ready;
                if cur != self.idle_index {
                    self.active.push_back(cur);
                }
            }
        }
    }

    /// `wait(mask, &out_set)` (`spec.md` §4.1, §4.3), called by `index` on
    /// itself. Returns the satisfying bits immediately if any are already
    /// set, clearing them; otherwise transitions to `Sleeping` and returns
    /// `None` (the caller must then request a context switch and will be
    /// re-woken by a later `signal`).
    pub fn wait(&mut self, index: usize, mask: SigSet) -> Option<SigSet> {
        let t = &mut self.tasks[index];
        let satisfied = t.sig_set & mask & t.sig_mask;
        if !satisfied.is_empty() {
            t.sig_set.remove(satisfied);
            Some(satisfied)
        } else {
            t.state = TaskState::Sleeping;
            None
        }
    }

    /// Re-checks a sleeping task's wait condition after a wake; mirrors
    /// the "recheck on wake" half of `wait`'s contract.
    pub fn recheck_wait(&mut self, index: usize, mask: SigSet) -> Option<SigSet> {
        let t = &mut self.tasks[index];
        let satisfied = t.sig_set & mask & t.sig_mask;
        if satisfied.is_empty() {
            None
        } else {
            t.sig_set.remove(satisfied);
            t.state = TaskState::Ready;
            Some(satisfied)
        }
    }

    /// `signal(task_id, set)` (`spec.md` §4.1, §4.3): OR `set` into the
    /// target's `sig_set`; if that now intersects `sig_mask`, wake it
    /// (`Sleeping -> Ready`, enqueued on the active list).
    pub fn signal(&mut self, index: usize, set: SigSet) -> NextTask {
        let t = &mut self.tasks[index];
        t.sig_set.insert(set);
        if t.state == TaskState::Sleeping && !(t.sig_set & t.sig_mask).is_empty() {
            t.state = TaskState::Ready;
            self.active.push_back(index);
            NextTask::Specific(self.task_id_of(index))
        } else {
            NextTask::Same
        }
    }

    /// `exit()` (`spec.md` §4.1), current task only: `-> Dying`, enqueued
    /// on the dying list. Exiting the idle task is a fatal invariant
    /// violation (§4.1's failure semantics).
    pub fn exit_current(&mut self) -> NextTask {
        let cur = self.current.expect("exit called outside task context");
        assert!(cur != self.idle_index, "idle task must never exit");
        self.tasks[cur].state = TaskState::Dying;
        self.dying.push_back(cur);
        NextTask::Other
    }

    /// Forces a task into `Dying` from anywhere (used both for the fault
    /// path and for forcible kill, `spec.md` §9 "do not guess intent" —
    /// see `DESIGN.md`'s recorded decision). Unlike `exit_current`, this
    /// may target a task that is not currently running.
    pub fn force_to_dying(&mut self, index: usize) -> NextTask {
        if self.tasks[index].state == TaskState::Dying {
            return NextTask::Same;
        }
        self.tasks[index].state = TaskState::Dying;
        self.dying.push_back(index);
        if Some(index) == self.current {
            NextTask::Other
        } else {
            NextTask::Same
        }
    }

    /// Reaping, exclusively performed by the idle task (`spec.md` §4.1):
    /// pops the dying list and releases its memory via `pm`. Returns the
    /// reaped task's index so the caller can also clean up IPC state (ports
    /// the task owned, etc.) that lives outside `Task` itself.
    pub fn reap_one(&mut self, pm: &mut PhysMem) -> Option<usize> {
        let idx = self.dying.pop_front()?;
        let t = &mut self.tasks[idx];
        t.mem.cleanup(pm);
        if let Some(k) = t.kstack.take() {
            pm.free(k);
        }
        if let Some(u) = t.ustack.take() {
            pm.free(u);
        }
        t.live = false;
        t.state = TaskState::Idle;
        t.generation = t.generation.next();
        Some(idx)
    }
}

impl Default for TaskTable {
    fn default() -> Self {
        Self::new()
    }
}
