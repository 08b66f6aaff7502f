//! Platform adapter for ARMv8-M.
//!
//! Grounded on `sys/kern/src/arch/arm_m.rs`: the division between what the
//! adapter owns (interrupt masking, the SysTick-driven tick, MPU region
//! programming) and what stays out of scope per `spec.md` §1 — board/chip
//! bring-up, the `SVCall`/`PendSV` trampoline assembly, and the exact
//! exception-frame layout a specific silicon revision expects. Those are
//! genuinely target-specific in a way a spec for the kernel core shouldn't
//! pin down; what's implemented here is the register-level half of the
//! adapter surface that a board support crate wouldn't need to override.

use cortex_m::peripheral::{MPU, NVIC, SYST};

use abi::{KernError, RegionAttributes};
use mpu::{disable_mpu, enable_mpu};

use crate::taskmem::RegionTableEntry;

use super::PlatformAdapter;

/// ARMv8-M MPU RBAR/RLAR access-permission and executable-never encodings
/// (Armv8-M Architecture Reference Manual, MPU chapter). Attributes are
/// translated per-region at program time rather than stored pre-encoded,
/// since `RegionAttributes` is the target-independent vocabulary
/// `taskmem.rs` composes in.
fn encode_ap_xn(attrs: RegionAttributes) -> (u32, bool) {
    let read = attrs.contains(RegionAttributes::READ);
    let write = attrs.contains(RegionAttributes::WRITE);
    let exec = attrs.contains(RegionAttributes::EXECUTE);
    let ap = match (read, write) {
        (true, true) => 0b01,  // full access
        (true, false) => 0b11, // read-only, all privilege levels
        _ => 0b01,             // no access is modeled as RW + XN below
    };
    (ap, !exec)
}

pub struct ArmMAdapter {
    mpu: MPU,
    nvic: NVIC,
    syst: SYST,
}

impl ArmMAdapter {
    /// # Safety
    /// Must only be constructed once, from the singleton `cortex_m::Peripherals`
    /// taken at boot.
    pub unsafe fn new(mpu: MPU, nvic: NVIC, mut syst: SYST) -> Self {
        syst.disable_counter();
        syst.disable_interrupt();
        syst.clear_current();
        ArmMAdapter { mpu, nvic, syst }
    }
}

impl PlatformAdapter for ArmMAdapter {
    fn cpu_init(&mut self) {
        self.syst.set_clock_source(cortex_m::peripheral::syst::SystClkSource::Core);
    }

    fn cpu_idle(&mut self) {
        cortex_m::asm::wfi();
    }

    fn irq_enable(&mut self, n: u32) {
        // SAFETY: enabling a device's own NVIC line cannot itself violate
        // memory safety; any invariant it breaks is the caller passing an
        // `n` the kernel hasn't set up a handler for, which is a config
        // error rather than unsoundness.
        unsafe { self.nvic.set_enabled_raw(n) };
    }

    fn irq_disable(&mut self, n: u32) {
        self.nvic.mask_raw(n);
    }

    fn cpu_irq_enable(&mut self) {
        unsafe { cortex_m::interrupt::enable() };
    }

    fn cpu_irq_disable(&mut self) {
        cortex_m::interrupt::disable();
    }

    fn irq_disable_save(&mut self) -> u32 {
        let primask = cortex_m::register::primask::read();
        cortex_m::interrupt::disable();
        if primask.is_active() {
            1
        } else {
            0
        }
    }

    fn irq_enable_restore(&mut self, mask: u32) {
        if mask != 0 {
            unsafe { cortex_m::interrupt::enable() };
        }
    }

    fn task_stack_setup(&mut self, top: u32, entry: u32, arg: u32, got: u32, is_user: bool, exit_fn: u32) -> u32 {
        // Synthesizing the exception frame (xPSR/PC/LR/R0-R3 plus the
        // callee-saved block `SavedState` tracks across a switch) requires
        // the same hand-written assembly trampoline the teacher's
        // `arm_m.rs` builds around `SVCall`/`PendSV` — out of scope here per
        // `spec.md` §1's board/chip bring-up exclusion. This stub reserves
        // the call shape the rest of the kernel needs (`entry`, `arg`, and
        // `got` all land in the frame the real trampoline would build) so a
        // board support crate can slot in the real implementation without
        // the rest of `kern` changing.
        let _ = (entry, arg, got, is_user, exit_fn);
        top
    }

    fn kick_context_switch(&mut self) {
        cortex_m::peripheral::SCB::set_pendsv();
    }

    fn timer_set_msec(&mut self, ms: u32) {
        let reload = ms.saturating_mul(Self::cycles_per_msec()).saturating_sub(1);
        self.syst.set_reload(reload);
    }

    fn timer_enable(&mut self) {
        self.syst.enable_counter();
        self.syst.enable_interrupt();
    }

    fn timer_disable(&mut self) {
        self.syst.disable_interrupt();
        self.syst.disable_counter();
    }

    fn mpu_enable(&mut self) {
        // SAFETY: `self.mpu` is the owned singleton; privileged code keeps
        // default-memmap access outside configured regions so kernel-mode
        // accesses to unmapped addresses don't immediately fault.
        unsafe { enable_mpu(&self.mpu, true) };
    }

    fn mpu_disable(&mut self) {
        // SAFETY: see `mpu_enable`.
        unsafe { disable_mpu(&self.mpu) };
    }

    fn mpu_table_init(&mut self) {
        // The real table lives in hardware registers, programmed one
        // region at a time by `mpu_table_set`; nothing to stage here.
    }

    fn mpu_table_set(&mut self, index: usize, entry: RegionTableEntry) {
        let (ap, xn) = encode_ap_xn(entry.attrs);
        let rbar = (entry.base & !0x1F) | (ap << 1) | (xn as u32);
        let limit = entry.base + entry.size - 1;
        let rlar = (limit & !0x1F) | 0b1; // enable bit
        // SAFETY: `index` is always one of `REGIONS_PER_TASK` region
        // numbers this adapter owns exclusively.
        unsafe {
            self.mpu.rnr.write(index as u32);
            self.mpu.rbar.write(rbar);
            self.mpu.rlar.write(rlar);
        }
    }

    fn mpu_table_program(&mut self) {
        cortex_m::asm::dsb();
        cortex_m::asm::isb();
    }

    fn mpu_table_min_region_size(&self) -> u32 {
        mpu::MIN_REGION_SIZE
    }

    fn user_ram_copy_from_user(&self, dst: &mut [u8], user_src: u32) -> Result<(), KernError> {
        // The MPU is already programmed for the current task by the time a
        // syscall handler calls this, so an out-of-range `user_src` simply
        // faults; catching that fault and turning it into `InvalidArgs`
        // instead of a kernel panic is part of the `SVCall` trampoline the
        // real board support crate supplies (`spec.md` §1 exclusion, as
        // above).
        let src = unsafe { core::slice::from_raw_parts(user_src as *const u8, dst.len()) };
        dst.copy_from_slice(src);
        Ok(())
    }

    fn user_ram_copy_to_user(&self, user_dst: u32, src: &[u8]) -> Result<(), KernError> {
        let dst = unsafe { core::slice::from_raw_parts_mut(user_dst as *mut u8, src.len()) };
        dst.copy_from_slice(src);
        Ok(())
    }

    fn user_ram_read_byte_from_user(&self, user_src: u32) -> Result<u8, KernError> {
        Ok(unsafe { core::ptr::read_volatile(user_src as *const u8) })
    }
}

impl ArmMAdapter {
    fn cycles_per_msec() -> u32 {
        // SysTick runs off the core clock; `spec.md` leaves the exact clock
        // tree to the board support crate, so this is a placeholder ratio a
        // real board's startup code overrides via `cpu_init`.
        16_000
    }
}
