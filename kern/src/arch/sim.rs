//! Host-testable platform adapter.
//!
//! Grounded on `sys/kern/src/arch/fake.rs`: the teacher's fake backend
//! exists so the scheduler core can be exercised with `cargo test` on the
//! host, and never actually attempts a context switch (`start_first_task`
//! there panics with "entering userland"). This backend goes one step
//! further and keeps a real byte-addressable RAM buffer and a software MPU
//! table, so the IPC/loader validated-copy paths can be exercised
//! end-to-end in tests too, not just the scheduler.

use core::cell::RefCell;

use abi::{KernError, RegionAttributes, REGIONS_PER_TASK};
use kerncore::{can_access, MemoryRegion, UserSlice};

use crate::taskmem::RegionTableEntry;

use super::PlatformAdapter;

struct Slice {
    base: usize,
    end: usize,
}

impl UserSlice for Slice {
    fn is_empty(&self) -> bool {
        self.base == self.end
    }
    fn base_addr(&self) -> usize {
        self.base
    }
    fn end_addr(&self) -> usize {
        self.end
    }
}

struct ReadableRegion(RegionTableEntry);
struct WritableRegion(RegionTableEntry);

impl MemoryRegion for ReadableRegion {
    fn contains(&self, addr: usize) -> bool {
        self.0.attrs.contains(RegionAttributes::READ)
            && addr >= self.0.base as usize
            && addr < self.0.base as usize + self.0.size as usize
    }
    fn base_addr(&self) -> usize {
        self.0.base as usize
    }
    fn end_addr(&self) -> usize {
        self.0.base as usize + self.0.size as usize
    }
}

impl MemoryRegion for WritableRegion {
    fn contains(&self, addr: usize) -> bool {
        self.0.attrs.contains(RegionAttributes::WRITE)
            && addr >= self.0.base as usize
            && addr < self.0.base as usize + self.0.size as usize
    }
    fn base_addr(&self) -> usize {
        self.0.base as usize
    }
    fn end_addr(&self) -> usize {
        self.0.base as usize + self.0.size as usize
    }
}

/// A simulated target: a backing `Vec<u8>` RAM arena addressed starting at
/// `ram_base`, plus the in-progress/programmed MPU table for whichever task
/// is "current". No real CPU state to save — there is no userland to enter
/// in a host test, so [`SimAdapter::task_stack_setup`] just returns `top`
/// unchanged rather than synthesizing a frame a fake CPU will never run.
pub struct SimAdapter {
    ram_base: u32,
    ram: RefCell<Vec<u8>>,
    staging: [RegionTableEntry; REGIONS_PER_TASK],
    programmed: [RegionTableEntry; REGIONS_PER_TASK],
    mpu_on: bool,
    irq_mask: u32,
    tick_msec: u32,
    timer_running: bool,
}

impl SimAdapter {
    pub fn new(ram_base: u32, ram_size: u32) -> Self {
        let empty = RegionTableEntry { base: 0, size: 32, attrs: RegionAttributes::empty() };
        SimAdapter {
            ram_base,
            ram: RefCell::new(vec![0u8; ram_size as usize]),
            staging: [empty; REGIONS_PER_TASK],
            programmed: [empty; REGIONS_PER_TASK],
            mpu_on: false,
            irq_mask: 0,
            tick_msec: 0,
            timer_running: false,
        }
    }
}

impl PlatformAdapter for SimAdapter {
    fn cpu_init(&mut self) {}

    fn cpu_idle(&mut self) {}

    fn irq_enable(&mut self, _n: u32) {}
    fn irq_disable(&mut self, _n: u32) {}

    fn cpu_irq_enable(&mut self) {
        self.irq_mask = 0;
    }

    fn cpu_irq_disable(&mut self) {
        self.irq_mask = 1;
    }

    fn irq_disable_save(&mut self) -> u32 {
        let prev = self.irq_mask;
        self.irq_mask = 1;
        prev
    }

    fn irq_enable_restore(&mut self, mask: u32) {
        self.irq_mask = mask;
    }

    fn task_stack_setup(&mut self, top: u32, _entry: u32, _arg: u32, _got: u32, _is_user: bool, _exit_fn: u32) -> u32 {
        top
    }

    fn kick_context_switch(&mut self) {}

    fn timer_set_msec(&mut self, ms: u32) {
        self.tick_msec = ms;
    }

    fn timer_enable(&mut self) {
        self.timer_running = true;
    }

    fn timer_disable(&mut self) {
        self.timer_running = false;
    }

    fn mpu_enable(&mut self) {
        self.mpu_on = true;
    }

    fn mpu_disable(&mut self) {
        self.mpu_on = false;
    }

    fn mpu_table_init(&mut self) {
        let empty = RegionTableEntry { base: 0, size: 32, attrs: RegionAttributes::empty() };
        self.staging = [empty; REGIONS_PER_TASK];
    }

    fn mpu_table_set(&mut self, index: usize, entry: RegionTableEntry) {
        self.staging[index] = entry;
    }

    fn mpu_table_program(&mut self) {
        self.programmed = self.staging;
    }

    fn mpu_table_min_region_size(&self) -> u32 {
        32
    }

    fn user_ram_copy_from_user(&self, dst: &mut [u8], user_src: u32) -> Result<(), KernError> {
        let slice = Slice { base: user_src as usize, end: user_src as usize + dst.len() };
        let regions: Vec<ReadableRegion> = self.programmed.iter().map(|r| ReadableRegion(*r)).collect();
        if !can_access(&regions, &slice) {
            return Err(KernError::InvalidArgs);
        }
        let start = user_src.checked_sub(self.ram_base).ok_or(KernError::InvalidArgs)? as usize;
        let end = start.checked_add(dst.len()).ok_or(KernError::InvalidArgs)?;
        let ram = self.ram.borrow();
        let src = ram.get(start..end).ok_or(KernError::InvalidArgs)?;
        dst.copy_from_slice(src);
        Ok(())
    }

    fn user_ram_copy_to_user(&self, user_dst: u32, src: &[u8]) -> Result<(), KernError> {
        let slice = Slice { base: user_dst as usize, end: user_dst as usize + src.len() };
        let regions: Vec<WritableRegion> = self.programmed.iter().map(|r| WritableRegion(*r)).collect();
        if !can_access(&regions, &slice) {
            return Err(KernError::InvalidArgs);
        }
        let start = user_dst.checked_sub(self.ram_base).ok_or(KernError::InvalidArgs)? as usize;
        let end = start.checked_add(src.len()).ok_or(KernError::InvalidArgs)?;
        let mut ram = self.ram.borrow_mut();
        let dst = ram.get_mut(start..end).ok_or(KernError::InvalidArgs)?;
        dst.copy_from_slice(src);
        Ok(())
    }

    fn user_ram_read_byte_from_user(&self, user_src: u32) -> Result<u8, KernError> {
        let mut byte = [0u8; 1];
        self.user_ram_copy_from_user(&mut byte, user_src)?;
        Ok(byte[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use abi::SegmentId;
    use crate::taskmem::TaskMemory;

    #[test]
    fn copy_within_programmed_region_succeeds() {
        let mut adapter = SimAdapter::new(0x2000_0000, 0x1000);
        let mut mem = TaskMemory::new();
        mem.set(SegmentId::UserData, 0x2000_0100, 0x40, true).unwrap();
        adapter.mpu_table_init();
        for (i, r) in mem.compose_regions().iter().enumerate() {
            adapter.mpu_table_set(i, *r);
        }
        adapter.mpu_table_program();

        adapter.user_ram_copy_to_user(0x2000_0100, b"hello").unwrap();
        let mut out = [0u8; 5];
        adapter.user_ram_copy_from_user(&mut out, 0x2000_0100).unwrap();
        assert_eq!(&out, b"hello");
    }

    #[test]
    fn copy_outside_any_region_is_rejected() {
        let adapter = SimAdapter::new(0x2000_0000, 0x1000);
        let mut out = [0u8; 4];
        assert_eq!(adapter.user_ram_copy_from_user(&mut out, 0x2000_0100), Err(KernError::InvalidArgs));
    }

    #[test]
    fn read_only_region_rejects_write() {
        let mut adapter = SimAdapter::new(0x2000_0000, 0x1000);
        let mut mem = TaskMemory::new();
        mem.set(SegmentId::UserRodata, 0x2000_0100, 0x40, true).unwrap();
        adapter.mpu_table_init();
        for (i, r) in mem.compose_regions().iter().enumerate() {
            adapter.mpu_table_set(i, *r);
        }
        adapter.mpu_table_program();

        assert_eq!(adapter.user_ram_copy_to_user(0x2000_0100, b"x"), Err(KernError::InvalidArgs));
    }

    #[test]
    fn irq_save_restore_round_trips() {
        let mut adapter = SimAdapter::new(0x2000_0000, 0x10);
        adapter.cpu_irq_enable();
        let saved = adapter.irq_disable_save();
        assert_eq!(saved, 0);
        adapter.irq_enable_restore(saved);
        assert_eq!(adapter.irq_mask, 0);
    }
}
