bitflags::bitflags! {
    /// A task's signal set or signal mask (`spec.md` §3, §4.3). Both use the
    /// same bit layout; which one a given `SigSet` value represents is a
    /// matter of which field of `Task` it's stored in.
    ///
    /// Three bits are reserved by the kernel itself; the remaining 29 are
    /// free for task-defined use, per `spec.md` §3 ("Remaining bits are
    /// available for task-defined use").
    #[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
    #[repr(transparent)]
    pub struct SigSet: u32 {
        /// Posted when a task's sleep timer fires.
        const KSLEEP = 1 << 0;
        /// Posted to ask a task to exit cooperatively.
        const TERMINATE = 1 << 1;
        /// Posted when a port or pipe the task owns has data ready.
        const PORT_RXREADY = 1 << 2;
    }
}
