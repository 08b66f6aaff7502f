use byteorder::LittleEndian;
use zerocopy::byteorder::U32;
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

/// Magic value at the start of every flash resource entry header
/// (`spec.md` §3, §6: `0x05091979`).
pub const PAK_MAGIC: u32 = 0x0509_1979;

/// Required alignment of every flash resource entry, and of the name and
/// payload within it (`spec.md` §6).
pub const PAK_ALIGNMENT: u32 = 32;

/// The 32-byte header of one flash resource archive entry ("PAK"),
/// bit-exact per `spec.md` §6. All fields are little-endian regardless of
/// host or target byte order, since this struct is read directly out of
/// XIP flash bytes.
#[derive(Clone, Copy, Debug, FromBytes, FromZeroes, AsBytes, Unaligned)]
#[repr(C)]
pub struct PakHeader {
    pub magic: U32<LittleEndian>,
    pub checksum: U32<LittleEndian>,
    pub entry_type: U32<LittleEndian>,
    pub length: U32<LittleEndian>,
    pub alignment: U32<LittleEndian>,
    pub namelength: U32<LittleEndian>,
    pub payload_length: U32<LittleEndian>,
    pub reserved: U32<LittleEndian>,
}

impl PakHeader {
    pub const SIZE: usize = core::mem::size_of::<PakHeader>();

    pub fn is_magic_valid(&self) -> bool {
        self.magic.get() == PAK_MAGIC
    }
}

/// The 12-field, 48-byte user program header prefixed to every loadable
/// flash payload, bit-exact per `spec.md` §3, §6. All offsets are relative
/// to the start of the payload that follows this header, per §4.7.
#[derive(Clone, Copy, Debug, FromBytes, FromZeroes, AsBytes, Unaligned)]
#[repr(C)]
pub struct UserProgramHeader {
    pub text_off: U32<LittleEndian>,
    pub text_size: U32<LittleEndian>,
    pub got_off: U32<LittleEndian>,
    pub got_size: U32<LittleEndian>,
    pub bss_off: U32<LittleEndian>,
    pub bss_size: U32<LittleEndian>,
    pub data_off: U32<LittleEndian>,
    pub data_size: U32<LittleEndian>,
    pub rodata_off: U32<LittleEndian>,
    pub rodata_size: U32<LittleEndian>,
    pub heap_size: U32<LittleEndian>,
    pub stack_size: U32<LittleEndian>,
}

impl UserProgramHeader {
    pub const SIZE: usize = core::mem::size_of::<UserProgramHeader>();
}
