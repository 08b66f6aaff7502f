//! Per-task memory segment table and MPU region composition
//! (`spec.md` §4.6).
//!
//! Grounded on `original_source/src/kern/core/task_mem.c`/`.h` for the
//! segment-table shape (`kern_task_mem_{init,set,get_start,get_size}`); its
//! `kern_task_mem_setup_mpu` only ever programs two regions (a whole-flash
//! executable region and the user stack, with heap/GOT/data/rodata/BSS left
//! as `TODO`) — [`TaskMemory::compose_regions`] below composes all eight,
//! per §4.6's attribute table.

use abi::{KernError, RegionAttributes, SegmentId, REGIONS_PER_TASK, SEGMENTS_PER_TASK};
use mpu::{is_naturally_aligned, round_up_region_size};

use crate::physmem::{Allocation, PhysMem};

#[derive(Copy, Clone, Debug)]
struct Segment {
    base: u32,
    size: u32,
    attrs: RegionAttributes,
    dynamic: bool,
    present: bool,
}

impl Segment {
    const ABSENT: Segment = Segment {
        base: 0,
        size: 0,
        attrs: RegionAttributes::empty(),
        dynamic: false,
        present: false,
    };
}

/// One programmed (or to-be-programmed) MPU region.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RegionTableEntry {
    pub base: u32,
    pub size: u32,
    pub attrs: RegionAttributes,
}

/// A task's eight memory segments and the MPU region table derived from
/// them.
pub struct TaskMemory {
    segments: [Segment; SEGMENTS_PER_TASK],
}

impl TaskMemory {
    pub const fn new() -> Self {
        TaskMemory { segments: [Segment::ABSENT; SEGMENTS_PER_TASK] }
    }

    /// Records segment `id` as occupying `[base, base+size)`. `size` is
    /// rounded up to the next MPU-legal power of two per §4.6 ("The memory
    /// allocator rounds size and alignment up to the next power of two
    /// suitable for the MPU"); `base` must already be naturally aligned for
    /// the *rounded* size, or this fails — an under-aligned segment "fails
    /// the task load" per §4.6's failure semantics.
    pub fn set(&mut self, id: SegmentId, base: u32, size: u32, dynamic: bool) -> Result<(), KernError> {
        let rounded = round_up_region_size(size);
        if !is_naturally_aligned(base, rounded) {
            return Err(KernError::InvalidArgs);
        }
        self.segments[id.index()] = Segment {
            base,
            size: rounded,
            attrs: id.default_attributes(),
            dynamic,
            present: true,
        };
        Ok(())
    }

    pub fn get_start(&self, id: SegmentId) -> Option<u32> {
        let s = self.segments[id.index()];
        s.present.then_some(s.base)
    }

    pub fn get_size(&self, id: SegmentId) -> Option<u32> {
        let s = self.segments[id.index()];
        s.present.then_some(s.size)
    }

    /// Composes the fixed-size MPU region table for this task, one region
    /// per segment kind (§4.6: "platform-dependent count, typically 8").
    /// Absent segments become a zero-attribute (no-access) placeholder
    /// region rather than being omitted, so the table always has exactly
    /// `REGIONS_PER_TASK` entries to program.
    pub fn compose_regions(&self) -> [RegionTableEntry; REGIONS_PER_TASK] {
        let mut out = [RegionTableEntry { base: 0, size: 32, attrs: RegionAttributes::empty() }; REGIONS_PER_TASK];
        for id in SegmentId::ALL {
            let seg = self.segments[id.index()];
            out[id.index()] = if seg.present {
                RegionTableEntry { base: seg.base, size: seg.size, attrs: seg.attrs }
            } else {
                RegionTableEntry { base: 0, size: 32, attrs: RegionAttributes::empty() }
            };
        }
        out
    }

    /// Releases every segment flagged dynamic back to `pm`, per §4.1's
    /// reaping contract ("release memory flagged dynamic").
    pub fn cleanup(&mut self, pm: &mut PhysMem) {
        for id in SegmentId::ALL {
            let seg = self.segments[id.index()];
            if seg.present && seg.dynamic {
                pm.free(Allocation { base: seg.base, size: seg.size, dynamic: true });
            }
            self.segments[id.index()] = Segment::ABSENT;
        }
    }
}

impl Default for TaskMemory {
    fn default() -> Self {
        Self::new()
    }
}
