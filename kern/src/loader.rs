//! User-executable loader (`spec.md` §4.7).
//!
//! Grounded on `original_source/src/kern/core/user_exec.c`/`.h` for the
//! segment-allocation order (text/rodata stay XIP in flash; data/bss/got
//! get RAM) and the GOT relocation walk: each 4-byte entry is interpreted
//! as a payload-relative offset, classified against the text/data/bss/
//! rodata ranges, and rewritten to an absolute address; an offset matching
//! none of them is a fatal load error (`spec.md` §4.7 step 4).

use abi::{KernError, SegmentId, UserProgramHeader};
use zerocopy::FromBytes;

use crate::physmem::{Allocation, PhysMem};
use crate::taskmem::TaskMemory;
use mpu::round_up_region_size;

/// Maximum GOT entries this loader will relocate. No heap is available to
/// size this dynamically; large enough for any GOT a handful of small user
/// tasks would carry.
const MAX_GOT_ENTRIES: usize = 64;

/// Everything [`load`] produces: the composed segment table plus what the
/// caller needs to build the task's initial exception frame (`spec.md`
/// §4.7 step 5, §9's "initial task frame"). The user `_start` stub begins
/// at the very first byte of the text segment, so `entry == text_base`.
pub struct LoadedProgram {
    pub mem: TaskMemory,
    pub entry: u32,
    pub got_base: u32,
    pub heap_base: u32,
    pub ustack: Allocation,
}

/// One segment's placement in payload-relative offset space, used only to
/// classify GOT entries (`spec.md` §4.7 step 4: "bss/text/data/rodata").
#[derive(Copy, Clone)]
struct SegRange {
    off: u32,
    size: u32,
    base: u32,
}

/// Rewrites each GOT entry in place from a payload-relative offset to an
/// absolute address, per `spec.md` §4.7 step 4 and the exact worked
/// example in §8 scenario 4. Kept as a pure function over plain data (no
/// memory access) so the relocation arithmetic is testable without a real
/// flash/RAM layout.
fn relocate_got(entries: &mut [u32], ranges: &[SegRange]) -> Result<(), KernError> {
    for entry in entries.iter_mut() {
        let offset = *entry;
        let resolved = ranges
            .iter()
            .find(|r| r.size > 0 && offset >= r.off && offset < r.off + r.size)
            .map(|r| r.base + (offset - r.off));
        *entry = resolved.ok_or(KernError::InvalidArgs)?;
    }
    Ok(())
}

/// Parses little-endian `u32` entries out of the GOT's raw bytes into
/// `out`, returning the count. `out` must be at least `bytes.len() / 4`
/// long.
fn decode_got_entries(bytes: &[u8], out: &mut [u32]) -> usize {
    let mut n = 0;
    for chunk in bytes.chunks_exact(4) {
        out[n] = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        n += 1;
    }
    n
}

/// Copies `src` into the physical RAM address `dst`. `spec.md` §4.7 step 3
/// ("copy data from flash into the allocated data segment"); a kernel
/// necessarily touches raw physical memory to do this, there being no
/// `alloc`/heap layer beneath it.
///
/// # Safety
/// `dst` must be the base of a RAM region at least `src.len()` bytes long
/// that nothing else concurrently accesses.
unsafe fn copy_to_ram(dst: u32, src: &[u8]) {
    unsafe { core::ptr::copy_nonoverlapping(src.as_ptr(), dst as *mut u8, src.len()) };
}

/// Zeroes `len` bytes of physical RAM starting at `dst` (`spec.md` §4.7
/// step 3: "Initialize BSS to zero").
///
/// # Safety
/// Same contract as [`copy_to_ram`].
unsafe fn zero_ram(dst: u32, len: u32) {
    unsafe { core::ptr::write_bytes(dst as *mut u8, 0, len as usize) };
}

/// Loads a user program whose raw bytes are `payload`, located at flash
/// address `payload_flash_base` (text and rodata execute in place from
/// there). On any failure, segments already allocated are released back to
/// `pm` before returning (`spec.md` §4.6: "allocation failure... releases
/// all partially allocated segments").
pub fn load(payload: &[u8], payload_flash_base: u32, pm: &mut PhysMem) -> Result<LoadedProgram, KernError> {
    let hdr = UserProgramHeader::read_from_prefix(payload).ok_or(KernError::InvalidArgs)?;
    let mut mem = TaskMemory::new();

    match load_inner(&hdr, payload, payload_flash_base, pm, &mut mem) {
        Ok(mut loaded) => {
            loaded.mem = mem;
            Ok(loaded)
        }
        Err(e) => {
            mem.cleanup(pm);
            Err(e)
        }
    }
}

fn load_inner(
    hdr: &UserProgramHeader,
    payload: &[u8],
    payload_flash_base: u32,
    pm: &mut PhysMem,
    mem: &mut TaskMemory,
) -> Result<LoadedProgram, KernError> {
    // Text and rodata stay XIP: the segment simply points into flash, no
    // physmem allocation (`spec.md` §4.7 step 2).
    let text_base = payload_flash_base + hdr.text_off.get();
    mem.set(SegmentId::Text, text_base, hdr.text_size.get(), false)?;

    let rodata_size = hdr.rodata_size.get();
    let rodata_base = payload_flash_base + hdr.rodata_off.get();
    if rodata_size > 0 {
        mem.set(SegmentId::UserRodata, rodata_base, rodata_size, false)?;
    }

    // Data: RAM-backed, initialized by copy from flash.
    let data_size = hdr.data_size.get();
    let data_base = if data_size > 0 {
        let rounded = round_up_region_size(data_size);
        let alloc = pm.alloc(rounded, rounded)?;
        mem.set(SegmentId::UserData, alloc.base, data_size, true)?;
        let src_start = hdr.data_off.get() as usize;
        let src = payload
            .get(src_start..src_start + data_size as usize)
            .ok_or(KernError::InvalidArgs)?;
        // SAFETY: `alloc` was just carved fresh from `pm`, `data_size`
        // bytes long, matching `src`'s length.
        unsafe { copy_to_ram(alloc.base, src) };
        alloc.base
    } else {
        0
    };

    // BSS: RAM-backed, zero-initialized.
    let bss_size = hdr.bss_size.get();
    let bss_base = if bss_size > 0 {
        let rounded = round_up_region_size(bss_size);
        let alloc = pm.alloc(rounded, rounded)?;
        mem.set(SegmentId::UserBss, alloc.base, bss_size, true)?;
        // SAFETY: `alloc` was just carved fresh from `pm`, `bss_size`
        // bytes long.
        unsafe { zero_ram(alloc.base, bss_size) };
        alloc.base
    } else {
        0
    };

    // Heap: RAM-backed, otherwise untouched until the task uses it.
    let heap_size = hdr.heap_size.get();
    let heap_base = if heap_size > 0 {
        let rounded = round_up_region_size(heap_size);
        let alloc = pm.alloc(rounded, rounded)?;
        mem.set(SegmentId::UserHeap, alloc.base, heap_size, true)?;
        alloc.base
    } else {
        0
    };

    // User stack. Registered into `mem` immediately so a later failure in
    // this function frees it via `mem.cleanup` same as every other segment;
    // the caller still receives the allocation directly in `ustack`, since
    // `TaskTable::init` takes the task's stacks as a separate parameter
    // rather than reading them back out of `mem`.
    let stack_size = hdr.stack_size.get();
    let rounded_stack = round_up_region_size(stack_size);
    let stack_alloc = pm.alloc(rounded_stack, rounded_stack)?;
    mem.set(SegmentId::UserStack, stack_alloc.base, stack_alloc.size, true)?;

    // GOT: RAM-backed and writable (unlike text/rodata), copied from flash
    // then relocated in place.
    let got_size = hdr.got_size.get();
    let rounded_got = round_up_region_size(got_size.max(1));
    let got_alloc = pm.alloc(rounded_got, rounded_got)?;
    mem.set(SegmentId::UserGot, got_alloc.base, got_size, true)?;

    let got_off = hdr.got_off.get() as usize;
    let got_bytes = payload
        .get(got_off..got_off + got_size as usize)
        .ok_or(KernError::InvalidArgs)?;
    let mut entries = [0u32; MAX_GOT_ENTRIES];
    let n = decode_got_entries(got_bytes, &mut entries);

    let ranges = [
        SegRange { off: hdr.text_off.get(), size: hdr.text_size.get(), base: text_base },
        SegRange { off: hdr.data_off.get(), size: data_size, base: data_base },
        SegRange { off: hdr.bss_off.get(), size: bss_size, base: bss_base },
        SegRange { off: hdr.rodata_off.get(), size: rodata_size, base: rodata_base },
    ];
    relocate_got(&mut entries[..n], &ranges)?;

    let mut relocated_bytes = [0u8; MAX_GOT_ENTRIES * 4];
    for (i, e) in entries[..n].iter().enumerate() {
        relocated_bytes[i * 4..i * 4 + 4].copy_from_slice(&e.to_le_bytes());
    }
    // SAFETY: `got_alloc` was just carved fresh from `pm`, at least
    // `n * 4` bytes long.
    unsafe { copy_to_ram(got_alloc.base, &relocated_bytes[..n * 4]) };

    Ok(LoadedProgram {
        mem: TaskMemory::new(),
        entry: text_base,
        got_base: got_alloc.base,
        heap_base,
        ustack: stack_alloc,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn got_relocation_matches_worked_example() {
        // spec.md §8 scenario 4's exact worked example.
        let ranges = [
            SegRange { off: 0x40, size: 0x100, base: 0x0800_1000 }, // text
            SegRange { off: 0x140, size: 0x20, base: 0xA000 },      // data
            SegRange { off: 0x168, size: 0x10, base: 0xB000 },      // bss
            SegRange { off: 0, size: 0, base: 0 },                  // rodata, absent
        ];
        let mut entries = [0x150u32, 0x168];
        relocate_got(&mut entries, &ranges).unwrap();
        assert_eq!(entries, [0xA010, 0xB000]);
    }

    #[test]
    fn got_entry_matching_no_segment_is_fatal() {
        let ranges = [SegRange { off: 0x40, size: 0x100, base: 0x0800_1000 }];
        let mut entries = [0xFFFF_FFFFu32];
        assert_eq!(relocate_got(&mut entries, &ranges), Err(KernError::InvalidArgs));
    }

    #[test]
    fn decode_entries_reads_little_endian_u32s() {
        let bytes = [0x10, 0x01, 0x00, 0x00, 0x00, 0xB0, 0x00, 0x00];
        let mut out = [0u32; 4];
        let n = decode_got_entries(&bytes, &mut out);
        assert_eq!(&out[..n], &[0x0110, 0xB000]);
    }

    #[test]
    fn load_rejects_truncated_header() {
        let mut pm = PhysMem::new(0x2000_0000, 0x1_0000);
        assert!(load(&[0u8; 4], 0x0800_0000, &mut pm).is_err());
    }
}
