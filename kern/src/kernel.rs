//! Top-level kernel object: composes every subsystem and drives boot,
//! the tick handler, and the idle loop (`spec.md` §2's control flow).
//!
//! Grounded on `sys/kern/src/startup.rs`/`lib.rs` for the boot ordering
//! ("initializes platform → physmem → timer → task subsystem → IPC → loads
//! user program → enables scheduler") and on the teacher's habit of
//! threading the platform adapter through as a type parameter rather than
//! a trait object, so a board crate monomorphizes one concrete `Kernel<P,
//! C>` with no indirection cost.

use abi::{KernError, SigSet};

use crate::arch::PlatformAdapter;
use crate::config::MAX_TASKS;
use crate::flash::FlashSpan;
use crate::ipc::{PipeTable, PortTable};
use crate::loader;
use crate::name::Name;
use crate::physmem::PhysMem;
use crate::task::{NextTask, TaskTable};
use crate::taskmem::TaskMemory;
use crate::timer::{Rearm, TimerWheel};
use mpu::round_up_region_size;

/// The console byte sink (`spec.md` §1: out of scope, "referenced only by
/// its interface"). A board support crate supplies the real UART-backed
/// implementation; `arch::sim` doesn't need one at all since the IPC and
/// loader tests that exercise `Kernel` never issue `CONSOLE_WRITE`.
pub trait ConsoleSink {
    /// Writes as much of `bytes` as fits, returning the count actually
    /// written (`spec.md` §7: "partial console write is allowed and
    /// reflected in a positive byte count").
    fn write(&mut self, bytes: &[u8]) -> usize;

    /// Non-blocking read of one buffered input byte, or `None` if nothing
    /// is ready.
    fn read_byte(&mut self) -> Option<u8>;
}

/// Fixed sizing and timing parameters needed at boot (`spec.md` §2).
#[derive(Copy, Clone)]
pub struct KernelConfig {
    pub ram_base: u32,
    pub ram_size: u32,
    pub tick_msec: u32,
}

/// Default kernel-stack size, used for every task's kernel stack
/// regardless of whether it also has a user stack.
pub const DEFAULT_KSTACK_SIZE: u32 = 1024;

/// The kernel: every subsystem `spec.md` §2's boot sequence brings up, plus
/// the platform adapter and console sink a board crate supplies.
pub struct Kernel<P: PlatformAdapter, C: ConsoleSink> {
    pub tasks: TaskTable,
    pub timers: TimerWheel<MAX_TASKS>,
    pub physmem: PhysMem,
    pub ports: PortTable,
    pub pipes: PipeTable,
    pub platform: P,
    pub console: C,
}

impl<P: PlatformAdapter, C: ConsoleSink> Kernel<P, C> {
    /// `spec.md` §2: "boot initializes platform → physmem → timer → task
    /// subsystem". `platform.cpu_init()` and `timers.start()` are left to
    /// the caller to sequence around task/IPC setup and the user-program
    /// load, per the control-flow note that the scheduler is only enabled
    /// last.
    pub fn new(platform: P, console: C, config: KernelConfig) -> Self {
        Kernel {
            tasks: TaskTable::new(),
            timers: TimerWheel::new(config.tick_msec),
            physmem: PhysMem::new(config.ram_base, config.ram_size),
            ports: PortTable::new(),
            pipes: PipeTable::new(),
            platform,
            console,
        }
    }

    /// Allocates a kernel stack and registers a kernel task in `Idle`
    /// (`spec.md` §4.1 `init`). Does not start it.
    pub fn spawn_kernel_task(&mut self, name: &[u8], entry: u32, kstack_size: u32) -> Result<abi::TaskId, KernError> {
        let name = Name::from_bytes(name)?;
        let rounded = round_up_region_size(kstack_size);
        let kstack = self.physmem.alloc(rounded, rounded)?;
        let idx = self.tasks.allocate_slot().map_err(|e| {
            self.physmem.free(kstack);
            e
        })?;
        let top = kstack.base + kstack.size;
        let sp = self.platform.task_stack_setup(top, entry, 0, 0, false, 0);
        self.tasks.init(idx, name, TaskMemory::new(), kstack, None, sp)
    }

    /// Looks up `pak_name` in `flash`, loads it per `spec.md` §4.7, and
    /// registers the result as a user task in `Idle`. The loader already
    /// allocates and sizes the user stack from its program header, so only
    /// a kernel stack needs allocating here; on any failure after the
    /// loader has allocated RAM, that RAM is released before returning.
    pub fn spawn_user_program(
        &mut self,
        flash: &FlashSpan<'_>,
        pak_name: &[u8],
        task_name: &[u8],
    ) -> Result<abi::TaskId, KernError> {
        let entry = flash.lookup(pak_name)?;
        let mut loaded = loader::load(entry.payload, entry.payload_base, &mut self.physmem)?;

        let name = match Name::from_bytes(task_name) {
            Ok(n) => n,
            Err(e) => {
                loaded.mem.cleanup(&mut self.physmem);
                return Err(e);
            }
        };

        let kstack_size = round_up_region_size(DEFAULT_KSTACK_SIZE);
        let kstack = match self.physmem.alloc(kstack_size, kstack_size) {
            Ok(a) => a,
            Err(e) => {
                loaded.mem.cleanup(&mut self.physmem);
                return Err(e);
            }
        };

        let idx = match self.tasks.allocate_slot() {
            Ok(idx) => idx,
            Err(e) => {
                self.physmem.free(kstack);
                loaded.mem.cleanup(&mut self.physmem);
                return Err(e);
            }
        };

        let ustack_top = loaded.ustack.base + loaded.ustack.size;
        let sp = self.platform.task_stack_setup(ustack_top, loaded.entry, 0, loaded.got_base, true, 0);
        self.tasks.init(idx, name, loaded.mem, kstack, Some(loaded.ustack), sp)
    }

    pub fn start(&mut self, id: abi::TaskId) -> Result<(), KernError> {
        let idx = self.tasks.check_task_id(id)?;
        self.tasks.start(idx);
        Ok(())
    }

    /// Designates `id` as the idle task (`spec.md` §4.1, §5: "An idle task
    /// always exists").
    pub fn set_idle_task(&mut self, id: abi::TaskId) -> Result<(), KernError> {
        let idx = self.tasks.check_task_id(id)?;
        self.tasks.set_idle_index(idx);
        Ok(())
    }

    /// `spec.md` §4.2/§5: the systick handler. Advances the timer wheel
    /// (posting `KSLEEP` to every task whose sleep timer fired) and ends
    /// the running task's quantum. Returns the merged scheduling hint the
    /// caller's context-switch trampoline should act on.
    pub fn on_tick(&mut self) -> NextTask {
        let tasks = &mut self.tasks;
        let mut next = NextTask::Same;
        self.timers.tick(|id, _a1, _a2, _a3| {
            next = next.combine(tasks.signal(id, SigSet::KSLEEP));
            Rearm::No
        });
        self.tasks.preempt_current();
        next.combine(NextTask::Other)
    }

    /// `select()` (`spec.md` §4.1): picks the next task to run and
    /// reprograms the MPU for it. Returns its table index.
    pub fn select_and_program_mpu(&mut self) -> usize {
        let chosen = self.tasks.select();
        self.program_mpu_for(chosen);
        chosen
    }

    fn program_mpu_for(&mut self, idx: usize) {
        self.platform.mpu_disable();
        self.platform.mpu_table_init();
        for (i, region) in self.tasks.task(idx).mem.compose_regions().iter().enumerate() {
            self.platform.mpu_table_set(i, *region);
        }
        self.platform.mpu_table_program();
        self.platform.mpu_enable();
    }

    /// The idle task body (`spec.md` §4.1, §4.2, §5): stop the hardware
    /// timer if nothing is scheduled, reap every dying task, then wait for
    /// an interrupt.
    pub fn idle(&mut self) {
        self.timers.idle();
        while self.reap_one().is_some() {}
        self.platform.cpu_idle();
    }

    /// Reaps exactly one dying task, if any (`spec.md` §4.1's "reaping
    /// happens exclusively in the idle task"). IPC resources the task
    /// owned (ports, pipes) are deliberately left alone here: `spec.md`
    /// §4.1 only names memory and MPU segments as released by reaping, and
    /// §9 leaves resource release on task death as an explicit open
    /// question for the forcible-kill case this also covers.
    pub fn reap_one(&mut self) -> Option<usize> {
        self.tasks.reap_one(&mut self.physmem)
    }

    pub fn current_index(&self) -> Option<usize> {
        self.tasks.current_index()
    }

    /// Forcible kill (`spec.md` §9, decided per `DESIGN.md`): forces `id`
    /// into `Dying` regardless of whether it is the running task, without
    /// attempting to unwind ports or messages it holds — those are released
    /// the same way a normal `exit` releases them, by the idle task's
    /// reaper.
    pub fn kill(&mut self, id: abi::TaskId) -> Result<NextTask, KernError> {
        let idx = self.tasks.check_task_id(id)?;
        Ok(self.tasks.force_to_dying(idx))
    }
}
