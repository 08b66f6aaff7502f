//! End-to-end scenarios driven entirely through [`crate::kernel::Kernel`]'s
//! public surface, exercising more than one subsystem per test the way a
//! unit test scoped to a single module can't. `spec.md` §8's "End-to-end
//! scenarios" 1-3 are covered here; scenarios 4-6 (GOT relocation, pipe
//! overflow, port name collision) are already exercised as unit tests in
//! `loader.rs`, `ipc/pipe.rs`, and `ipc/port.rs` respectively, each close to
//! the one module it needs.
//!
//! [`crate::arch::sim::SimAdapter`] has no real CPU to switch, so these
//! tests drive the scheduler/IPC/timer calls a context-switch trampoline
//! would otherwise make, in the same sequence it would make them.

use abi::{SigSet, TaskState};

use crate::arch::sim::SimAdapter;
use crate::ipc::msg::MsgState;
use crate::kernel::{ConsoleSink, Kernel, KernelConfig};
use crate::name::Name;
use crate::taskmem::TaskMemory;

struct NullConsole;

impl ConsoleSink for NullConsole {
    fn write(&mut self, _bytes: &[u8]) -> usize {
        0
    }
    fn read_byte(&mut self) -> Option<u8> {
        None
    }
}

fn test_kernel(tick_msec: u32) -> Kernel<SimAdapter, NullConsole> {
    Kernel::new(
        SimAdapter::new(0x2000_0000, 0x1_0000),
        NullConsole,
        KernelConfig { ram_base: 0x2000_0000, ram_size: 0x1_0000, tick_msec },
    )
}

fn spawn(kernel: &mut Kernel<SimAdapter, NullConsole>, name: &[u8]) -> usize {
    let idx = kernel.tasks.allocate_slot().unwrap();
    let kstack = kernel.physmem.alloc(256, 256).unwrap();
    kernel
        .tasks
        .init(idx, Name::from_bytes(name).unwrap(), TaskMemory::new(), kstack, None, 0)
        .unwrap();
    idx
}

/// `spec.md` §8 scenario 1: two tasks exchange a 32-byte message and its
/// completion repeatedly, with port A's refcount steady at 2 (owner + name
/// registry) once the one-time name lookup is done.
#[test]
fn two_task_ping_pong_makes_steady_progress() {
    let mut kernel = test_kernel(100);
    let idle = spawn(&mut kernel, b"idle");
    kernel.set_idle_task(kernel.tasks.task_id_of(idle)).unwrap();
    let a = spawn(&mut kernel, b"a");
    let b = spawn(&mut kernel, b"b");
    kernel.start(kernel.tasks.task_id_of(a)).unwrap();
    kernel.start(kernel.tasks.task_id_of(b)).unwrap();

    let port_a = kernel.ports.create(a).unwrap();
    kernel.ports.add_name(port_a, Name::from_bytes(b"a").unwrap()).unwrap();
    kernel.ports.set_active(port_a).unwrap();

    let port_b = kernel.ports.create(b).unwrap();
    kernel.ports.set_active(port_b).unwrap();

    // B resolves "a" once; a real client caches this rather than looking it
    // up again on every message.
    let resolved = kernel.ports.lookup_name(&Name::from_bytes(b"a").unwrap()).unwrap();
    assert_eq!(resolved, port_a);
    assert_eq!(kernel.ports.port(port_a).refcount(), 3, "owner + name registry + B's lookup");

    for round in 0..5 {
        assert!(
            kernel.tasks.wait(a, SigSet::PORT_RXREADY).is_none(),
            "round {round}: A has nothing queued yet and must block"
        );

        kernel.ports.send(port_b, port_a, &[0xAB; 32]).unwrap();
        kernel.tasks.signal(a, SigSet::PORT_RXREADY);
        assert_eq!(kernel.tasks.task(a).state(), TaskState::Ready);

        assert_eq!(
            kernel.tasks.recheck_wait(a, SigSet::PORT_RXREADY),
            Some(SigSet::PORT_RXREADY)
        );
        let msg = kernel.ports.recv(port_a).unwrap();
        assert_eq!(msg.bytes(), &[0xAB; 32]);
        kernel.ports.set_msg_completed(msg).unwrap();

        let done = kernel.ports.recv_completion(port_b).unwrap();
        assert_eq!(done.state, MsgState::Finished);
    }

    assert_eq!(
        kernel.ports.port(port_a).refcount(),
        3,
        "refcount must not drift across repeated send/recv/complete cycles"
    );
}

/// `spec.md` §8 scenario 2: a 1000 ms sleep at a 100 ms tick interval wakes
/// within one tick's slack (900-1100 ms) with `KSLEEP` set, then cleared by
/// the recheck.
#[test]
fn sleep_wakes_within_one_tick_of_slack() {
    let mut kernel = test_kernel(100);
    let c = spawn(&mut kernel, b"c");
    kernel.timers.event_add(c, 1000).unwrap();
    assert!(kernel.tasks.wait(c, SigSet::KSLEEP).is_none());
    assert_eq!(kernel.tasks.task(c).state(), TaskState::Sleeping);

    let mut ticks = 0;
    while kernel.tasks.task(c).state() != TaskState::Ready {
        kernel.on_tick();
        ticks += 1;
        assert!(ticks <= 11, "sleep did not fire within 1100ms");
    }
    assert!((9..=11).contains(&ticks), "expected 900-1100ms slack, fired at tick {ticks}");

    assert_eq!(kernel.tasks.recheck_wait(c, SigSet::KSLEEP), Some(SigSet::KSLEEP));
    assert!(kernel.tasks.task(c).sig_set().is_empty(), "KSLEEP must be cleared once consumed");
}

/// `spec.md` §8 scenario 3: a task that exits is reaped within one
/// scheduling tick, its dynamic memory released, and the scheduler never
/// selects it again.
#[test]
fn exit_then_reap_releases_memory_and_never_reselects() {
    let mut kernel = test_kernel(100);
    let idle = spawn(&mut kernel, b"idle");
    kernel.set_idle_task(kernel.tasks.task_id_of(idle)).unwrap();
    let d = spawn(&mut kernel, b"d");
    kernel.start(kernel.tasks.task_id_of(d)).unwrap();

    assert_eq!(kernel.select_and_program_mpu(), d);
    let free_before = kernel.physmem.free_bytes();
    kernel.tasks.exit_current();
    assert_eq!(kernel.tasks.task(d).state(), TaskState::Dying);

    assert_eq!(kernel.reap_one(), Some(d));
    assert_eq!(kernel.tasks.dying_count(), 0);
    assert!(kernel.physmem.free_bytes() > free_before, "D's kernel stack must be released");

    for _ in 0..3 {
        assert_ne!(kernel.select_and_program_mpu(), d, "a reaped task must never be reselected");
    }
}

/// `spec.md` §9's forcible-kill open question, decided in `DESIGN.md`: a
/// task with no opportunity to run `TASK_EXIT` itself can still be forced
/// into `Dying` and reaped normally.
#[test]
fn kill_forces_a_non_running_task_to_dying() {
    let mut kernel = test_kernel(100);
    let idle = spawn(&mut kernel, b"idle");
    kernel.set_idle_task(kernel.tasks.task_id_of(idle)).unwrap();
    let e = spawn(&mut kernel, b"e");
    let id = kernel.tasks.task_id_of(e);
    kernel.start(id).unwrap();

    // Never selected, so it's still sitting `Ready`, not `Running`.
    assert_eq!(kernel.tasks.task(e).state(), TaskState::Ready);

    kernel.kill(id).unwrap();
    assert_eq!(kernel.tasks.task(e).state(), TaskState::Dying);
    assert_eq!(kernel.reap_one(), Some(e));

    assert_eq!(kernel.kill(id), Err(abi::KernError::InvalidTaskId), "generation is stale once reaped");
}
