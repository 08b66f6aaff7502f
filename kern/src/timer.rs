//! Monotonic millisecond tick counter and ordered one-shot event list
//! (`spec.md` §4.2). Grounded on
//! `original_source/src/kern/core/timer.c`/`.h`: the wrap-safe
//! signed-difference ordering, the queued/active/rearm event state
//! machine, and the "pop due events under lock, unlock, dispatch, relock"
//! discipline are all taken from there. The original's rearm path is a
//! `// TODO: implement re-arm!` stub; it is implemented for real here.
//!
//! Reentrancy is enforced by the type system rather than a runtime lock:
//! [`TimerWheel::tick`] takes a dispatch callback that does *not* receive
//! `&mut TimerWheel`, so a callback is simply unable to add or delete timer
//! events while dispatch is in progress, matching §4.2's "they may not add
//! or delete timer events" — it can still reach into whatever state the
//! caller closes over (e.g. the task table, to call `signal`).

use kerncore::{tick_after, tick_after_eq};
use unwrap_lite::UnwrapLite;

/// What a fired event asked to happen next.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Rearm {
    /// Do not re-add this event.
    No,
    /// Re-add this event to fire `delta_msec` after the tick it just fired
    /// on.
    After(u32),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
struct Event {
    tick: u32,
    queued: bool,
    active: bool,
    a1: u32,
    a2: u32,
    a3: u32,
}

impl Event {
    const IDLE: Event = Event { tick: 0, queued: false, active: false, a1: 0, a2: 0, a3: 0 };
}

/// An ordered one-shot event list over a fixed number of caller-owned event
/// slots, addressed by a small integer id (in this kernel, a task's index
/// in the task table — each task has exactly one sleep-timer event).
pub struct TimerWheel<const N: usize> {
    events: [Event; N],
    /// Slot ids in ascending-tick order. `order[0]` is always the next due
    /// event. Kept as a separate order list (rather than sorting `events`
    /// in place) so a slot's id is stable regardless of scheduling order,
    /// mirroring the teacher's general preference for index stability over
    /// in-place reordering of caller-visible state.
    order: [Option<usize>; N],
    order_len: usize,
    now: u32,
    tick_msec: u32,
    running: bool,
}

impl<const N: usize> TimerWheel<N> {
    pub fn new(tick_msec: u32) -> Self {
        TimerWheel {
            events: [Event::IDLE; N],
            order: [None; N],
            order_len: 0,
            now: 0,
            tick_msec,
            running: false,
        }
    }

    pub fn set_tick_interval(&mut self, msec: u32) {
        self.tick_msec = msec;
    }

    pub fn start(&mut self) {
        self.running = true;
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn now(&self) -> u32 {
        self.now
    }

    /// Arms event `id` to fire `delta_msec` from now. Fails if the event is
    /// already queued or active, per §4.2's "`event_add` of an already
    /// queued/active event fails."
    pub fn event_add(&mut self, id: usize, delta_msec: u32) -> Result<(), ()> {
        if self.events[id].queued || self.events[id].active {
            return Err(());
        }
        let due = self.now.wrapping_add(delta_msec);
        self.events[id].tick = due;
        self.events[id].queued = true;
        self.insert_ordered(id, due);
        Ok(())
    }

    pub fn event_setup(&mut self, id: usize, a1: u32, a2: u32, a3: u32) {
        self.events[id].a1 = a1;
        self.events[id].a2 = a2;
        self.events[id].a3 = a3;
    }

    /// Cancels event `id`. Returns `true` if it was queued (and is now
    /// removed), `false` if it was neither queued nor active (already a
    /// no-op), per §4.2's cancellation semantics. An `active` event (firing
    /// in progress) cannot be cancelled and also returns `false`.
    pub fn event_del(&mut self, id: usize) -> bool {
        if self.events[id].active {
            return false;
        }
        if !self.events[id].queued {
            return false;
        }
        self.remove_ordered(id);
        self.events[id].queued = false;
        true
    }

    pub fn event_clean(&mut self, id: usize) {
        self.events[id] = Event::IDLE;
        self.remove_ordered(id);
    }

    fn insert_ordered(&mut self, id: usize, due: u32) {
        let mut pos = self.order_len;
        for i in 0..self.order_len {
            let other = self.order[i].unwrap_lite();
            if tick_after(self.events[other].tick, due) {
                pos = i;
                break;
            }
        }
        for i in (pos..self.order_len).rev() {
            self.order[i + 1] = self.order[i];
        }
        self.order[pos] = Some(id);
        self.order_len += 1;
    }

    fn remove_ordered(&mut self, id: usize) {
        if let Some(pos) = self.order[..self.order_len].iter().position(|e| *e == Some(id)) {
            for i in pos..self.order_len - 1 {
                self.order[i] = self.order[i + 1];
            }
            self.order[self.order_len - 1] = None;
            self.order_len -= 1;
        }
    }

    /// Advances the clock by one tick interval and dispatches every event
    /// now due, in ascending-tick order. `dispatch(id, a1, a2, a3) ->
    /// Rearm` is invoked for each; on `Rearm::After(delta)` the event is
    /// re-added atomically once dispatch of that event completes.
    pub fn tick(&mut self, mut dispatch: impl FnMut(usize, u32, u32, u32) -> Rearm) {
        self.now = self.now.wrapping_add(self.tick_msec);

        // Pop due events into a local scratch list first, matching the
        // original's "move due events to a local dispatch list, unlock"
        // discipline (here there is no real lock, but the two-phase split
        // still matters: dispatch must not observe `order` mutating under
        // it, and a later-inserted event due at exactly `self.now` must not
        // be dispatched in this same tick).
        let mut due: [Option<usize>; N] = [None; N];
        let mut due_len = 0;
        while self.order_len > 0 {
            let head = self.order[0].unwrap_lite();
            if tick_after(self.events[head].tick, self.now) {
                break;
            }
            self.remove_ordered(head);
            self.events[head].queued = false;
            self.events[head].active = true;
            due[due_len] = Some(head);
            due_len += 1;
        }

        for slot in due[..due_len].iter().flatten() {
            let id = *slot;
            let (a1, a2, a3) = (self.events[id].a1, self.events[id].a2, self.events[id].a3);
            let rearm = dispatch(id, a1, a2, a3);
            self.events[id].active = false;
            if let Rearm::After(delta) = rearm {
                let due_tick = self.now.wrapping_add(delta);
                self.events[id].tick = due_tick;
                self.events[id].queued = true;
                self.insert_ordered(id, due_tick);
            }
        }
    }

    /// Called from the idle loop: if no events remain, stops the hardware
    /// timer (restarted the next time `event_add` is called or the
    /// scheduler has more than one ready task), per §4.2.
    pub fn idle(&mut self) -> bool {
        if self.order_len == 0 {
            self.stop();
            true
        } else {
            false
        }
    }

    #[cfg(test)]
    fn event_tick(&self, id: usize) -> u32 {
        self.events[id].tick
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_dispatch_in_ascending_tick_order() {
        let mut wheel: TimerWheel<4> = TimerWheel::new(100);
        wheel.event_add(2, 300).unwrap();
        wheel.event_add(0, 100).unwrap();
        wheel.event_add(1, 200).unwrap();

        let mut fired = heapless_like_vec();
        for _ in 0..3 {
            wheel.tick(|id, _, _, _| {
                fired.push(id);
                Rearm::No
            });
        }
        assert_eq!(fired.as_slice(), &[0, 1, 2]);
    }

    #[test]
    fn already_queued_event_add_fails() {
        let mut wheel: TimerWheel<2> = TimerWheel::new(100);
        wheel.event_add(0, 100).unwrap();
        assert!(wheel.event_add(0, 50).is_err());
    }

    #[test]
    fn event_del_reports_queued_vs_absent() {
        let mut wheel: TimerWheel<2> = TimerWheel::new(100);
        assert!(!wheel.event_del(0), "never-queued event is a no-op, not an error");
        wheel.event_add(0, 100).unwrap();
        assert!(wheel.event_del(0));
        assert!(!wheel.event_del(0), "already removed, second del is a no-op");
    }

    #[test]
    fn active_flag_clears_after_dispatch_completes() {
        let mut wheel: TimerWheel<2> = TimerWheel::new(100);
        wheel.event_add(0, 100).unwrap();
        wheel.tick(|_, _, _, _| Rearm::No);
        // If the active flag had stuck, re-adding would fail.
        assert!(wheel.event_add(0, 100).is_ok());
    }

    #[test]
    fn rearm_reinserts_after_dispatch() {
        let mut wheel: TimerWheel<2> = TimerWheel::new(100);
        wheel.event_add(0, 100).unwrap();
        let mut count = 0;
        wheel.tick(|_, _, _, _| {
            count += 1;
            Rearm::After(50)
        });
        assert_eq!(count, 1);
        assert!(
            wheel.event_tick(0) != 0,
            "rearmed event should have a fresh due tick recorded"
        );
        // A second tick 50ms later should fire it again.
        let mut wheel2: TimerWheel<2> = TimerWheel::new(50);
        wheel2.event_add(0, 50).unwrap();
        let mut fires = 0;
        for _ in 0..4 {
            wheel2.tick(|_, _, _, _| {
                fires += 1;
                Rearm::After(50)
            });
        }
        assert_eq!(fires, 4, "a self-rearming event keeps firing every interval");
    }

    #[test]
    fn wraparound_ordering_is_wrap_safe() {
        let mut wheel: TimerWheel<2> = TimerWheel::new(100);
        wheel.now = u32::MAX - 50;
        wheel.event_add(0, 100).unwrap(); // due tick wraps past u32::MAX
        assert!(tick_after_eq(wheel.event_tick(0).wrapping_add(0), wheel.now));
        let mut fired = false;
        // Advance ticks until it fires; bounded loop for safety.
        for _ in 0..5 {
            wheel.tick(|_, _, _, _| {
                fired = true;
                Rearm::No
            });
            if fired {
                break;
            }
        }
        assert!(fired, "event due after wraparound must still fire");
    }

    fn heapless_like_vec() -> Scratch {
        Scratch::new()
    }

    /// Tiny fixed-capacity vec used only by these tests, avoiding a
    /// dependency on `alloc` inside a `no_std` crate's test module.
    struct Scratch {
        buf: [usize; 8],
        len: usize,
    }

    impl Scratch {
        fn new() -> Self {
            Scratch { buf: [0; 8], len: 0 }
        }
        fn push(&mut self, v: usize) {
            self.buf[self.len] = v;
            self.len += 1;
        }
        fn as_slice(&self) -> &[usize] {
            &self.buf[..self.len]
        }
    }
}
