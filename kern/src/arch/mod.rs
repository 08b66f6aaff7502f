//! Architecture-specific support.
//!
//! Grounded on `sys/kern/src/arch.rs`: the core only ever talks to its
//! target through one boundary, and a single module re-exports whichever
//! backend applies. Unlike the teacher (which picks a backend by
//! `cfg_if!` on `target_arch`), this kernel's boundary is an object-safe
//! trait ([`PlatformAdapter`]) rather than a set of free functions, since
//! `spec.md` §6 lists the adapter as a closed, enumerable set of
//! operations that the rest of the crate is written generically against
//! (`kernel::Kernel<P: PlatformAdapter>`) rather than a compile-time-only
//! backend swap.

use abi::KernError;

use crate::taskmem::RegionTableEntry;

#[cfg(test)]
pub mod sim;

#[cfg(feature = "arm-m")]
pub mod arm_m;

/// The platform adapter (`spec.md` §6): the narrow port boundary the core
/// requires from its environment. Board/chip bring-up, the console sink,
/// and the printf formatter are all out of scope (`spec.md` §1) and live
/// on the other side of this trait.
pub trait PlatformAdapter {
    /// Bring up CPU state required before any interrupt.
    fn cpu_init(&mut self);

    /// Enter an interruptible low-power wait.
    fn cpu_idle(&mut self);

    /// Enable a device IRQ line.
    fn irq_enable(&mut self, n: u32);

    /// Disable a device IRQ line.
    fn irq_disable(&mut self, n: u32);

    /// Globally unmask interrupts.
    fn cpu_irq_enable(&mut self);

    /// Globally mask interrupts.
    fn cpu_irq_disable(&mut self);

    /// Saves the current global IRQ mask and disables interrupts,
    /// returning the saved mask for [`PlatformAdapter::irq_enable_restore`].
    fn irq_disable_save(&mut self) -> u32;

    /// Restores a previously saved global IRQ mask.
    fn irq_enable_restore(&mut self, mask: u32);

    /// Synthesizes an initial exception frame at `top`, returning the new
    /// saved stack pointer (`spec.md` §9's "initial task frame": after
    /// restoring this value, the CPU begins executing `entry(arg)` in the
    /// requested privilege with `got` in the PIC base register, and a
    /// return from `entry` calls `exit_fn`).
    fn task_stack_setup(&mut self, top: u32, entry: u32, arg: u32, got: u32, is_user: bool, exit_fn: u32) -> u32;

    /// Requests a context switch at the next safe point.
    fn kick_context_switch(&mut self);

    /// Sets the tick source period.
    fn timer_set_msec(&mut self, ms: u32);

    fn timer_enable(&mut self);
    fn timer_disable(&mut self);

    fn mpu_enable(&mut self);
    fn mpu_disable(&mut self);

    /// Resets the in-progress MPU table to all-absent, before
    /// [`PlatformAdapter::mpu_table_set`] calls populate it.
    fn mpu_table_init(&mut self);

    /// Stages region `index` of the in-progress MPU table.
    fn mpu_table_set(&mut self, index: usize, entry: RegionTableEntry);

    /// Commits the staged table to hardware.
    fn mpu_table_program(&mut self);

    /// Smallest region size this platform's MPU supports.
    fn mpu_table_min_region_size(&self) -> u32;

    /// Validated copy from a user-mode source address into `dst`. Fails
    /// with `InvalidArgs` if the source range is not fully covered by the
    /// current task's readable MPU regions.
    fn user_ram_copy_from_user(&self, dst: &mut [u8], user_src: u32) -> Result<(), KernError>;

    /// Validated copy from `src` to a user-mode destination address.
    /// Fails with `InvalidArgs` if the destination range is not fully
    /// covered by the current task's writable MPU regions.
    fn user_ram_copy_to_user(&self, user_dst: u32, src: &[u8]) -> Result<(), KernError>;

    /// Validated single-byte read from a user-mode source address.
    fn user_ram_read_byte_from_user(&self, user_src: u32) -> Result<u8, KernError>;
}
