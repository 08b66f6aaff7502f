/// Number of memory segments tracked per task (`spec.md` §4.6: "eight
/// segment ids").
pub const SEGMENTS_PER_TASK: usize = 8;

/// Number of MPU regions composed per task on a context switch. `spec.md`
/// §4.6 calls this "platform-dependent count, typically 8"; fixed at 8 here
/// since every segment gets exactly one region.
pub const REGIONS_PER_TASK: usize = 8;

/// Identifies one of a task's eight memory segments (`spec.md` §3, §4.6).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
#[repr(u8)]
pub enum SegmentId {
    Text = 0,
    KernelStack = 1,
    UserStack = 2,
    UserHeap = 3,
    UserBss = 4,
    UserData = 5,
    UserRodata = 6,
    UserGot = 7,
}

impl SegmentId {
    pub const ALL: [SegmentId; SEGMENTS_PER_TASK] = [
        SegmentId::Text,
        SegmentId::KernelStack,
        SegmentId::UserStack,
        SegmentId::UserHeap,
        SegmentId::UserBss,
        SegmentId::UserData,
        SegmentId::UserRodata,
        SegmentId::UserGot,
    ];

    pub fn index(self) -> usize {
        self as u8 as usize
    }
}

bitflags::bitflags! {
    /// Access attributes for one MPU region (`spec.md` §4.6). Mirrors the
    /// teacher's `RegionAttributes` bitflags shape in `sys/kern/src/descs.rs`.
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    #[repr(transparent)]
    pub struct RegionAttributes: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const EXECUTE = 1 << 2;
        /// Memory-mapped device registers; excluded from MPU composition
        /// here since `spec.md` §4.6 only names the eight task segments,
        /// but kept for parity with the teacher's attribute set and for any
        /// future peripheral-mapped region.
        const DEVICE = 1 << 3;
    }
}

impl SegmentId {
    /// The MPU attributes this segment kind is always programmed with, per
    /// `spec.md` §4.6's table.
    pub fn default_attributes(self) -> RegionAttributes {
        use RegionAttributes as A;
        match self {
            SegmentId::Text => A::READ | A::EXECUTE,
            SegmentId::KernelStack => A::READ | A::WRITE,
            SegmentId::UserStack
            | SegmentId::UserHeap
            | SegmentId::UserBss
            | SegmentId::UserData => A::READ | A::WRITE,
            SegmentId::UserRodata | SegmentId::UserGot => A::READ,
        }
    }
}
