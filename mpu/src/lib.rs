#![cfg_attr(not(test), no_std)]

use cortex_m::peripheral::mpu::RegisterBlock;

/// Disable the MPU and fall back to the default memory map.
///
/// Per the ARMv8-M MPU manual, outstanding memory transactions must be
/// forced to complete with a DMB before the MPU is disabled.
pub unsafe fn disable_mpu(mpu: &RegisterBlock) {
    const DISABLE: u32 = 0b000;
    cortex_m::asm::dmb();
    mpu.ctrl.write(DISABLE);
}

/// Enable the MPU. `privileged_default_memmap_access` controls whether
/// privileged code falls back to the default memory map outside configured
/// regions; unprivileged code never does.
pub unsafe fn enable_mpu(mpu: &RegisterBlock, privileged_default_memmap_access: bool) {
    const ENABLE: u32 = 0b001;
    let privdefena: u32 = if privileged_default_memmap_access { 0b100 } else { 0b000 };
    mpu.ctrl.write(ENABLE | privdefena);
    cortex_m::asm::dmb();
    cortex_m::asm::isb();
}

/// Smallest MPU region size this crate supports composing regions from.
/// ARMv8-M's MPU requires regions to be at least 32 bytes.
pub const MIN_REGION_SIZE: u32 = 32;

/// Rounds `size` up to the next power of two no smaller than
/// [`MIN_REGION_SIZE`], per `spec.md` §4.6 ("Region sizes must be a power
/// of two... and must be naturally aligned").
pub fn round_up_region_size(size: u32) -> u32 {
    if size <= MIN_REGION_SIZE {
        return MIN_REGION_SIZE;
    }
    size.next_power_of_two()
}

/// Whether `base` is naturally aligned for a region of `size` bytes (`size`
/// must already be a power of two).
pub fn is_naturally_aligned(base: u32, size: u32) -> bool {
    debug_assert!(size.is_power_of_two());
    base % size == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_small_sizes_up_to_minimum() {
        assert_eq!(round_up_region_size(1), MIN_REGION_SIZE);
        assert_eq!(round_up_region_size(32), 32);
    }

    #[test]
    fn rounds_non_power_of_two_up() {
        assert_eq!(round_up_region_size(33), 64);
        assert_eq!(round_up_region_size(1000), 1024);
    }

    #[test]
    fn alignment_check() {
        assert!(is_naturally_aligned(0x1000, 0x100));
        assert!(!is_naturally_aligned(0x1010, 0x100));
    }
}
