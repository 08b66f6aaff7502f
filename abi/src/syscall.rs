/// The defined syscall numbers (`spec.md` §6).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u16)]
pub enum Syscall {
    ConsoleWrite = 0x0001,
    Sleep = 0x0002,
    ConsoleWait = 0x0003,
    TaskExit = 0x0004,
}

impl Syscall {
    pub fn from_id(id: u16) -> Option<Self> {
        match id {
            0x0001 => Some(Syscall::ConsoleWrite),
            0x0002 => Some(Syscall::Sleep),
            0x0003 => Some(Syscall::ConsoleWait),
            0x0004 => Some(Syscall::TaskExit),
            _ => None,
        }
    }
}

/// A decoded trap entry: which syscall, and its (reassembled) arguments.
///
/// `spec.md` §6 packs argument 0 as `(arg1_hi16 << 16) | syscall_id_lo16` —
/// the syscall id only needs 16 bits, so the trampoline stashes the upper
/// half of the first real argument alongside it rather than wasting a
/// whole register on a 16-bit id. This reassembles that argument from the
/// high half carried in `r0` and the low half carried in `r1`; `r2`/`r3`
/// pass through unpacked.
#[derive(Copy, Clone, Debug)]
pub struct RawSyscall {
    pub id: u16,
    pub arg1: u32,
    pub arg2: u32,
    pub arg3: u32,
}

impl RawSyscall {
    pub fn decode(r0: u32, r1: u32, r2: u32, r3: u32) -> Self {
        let id = (r0 & 0xffff) as u16;
        let arg1_hi16 = (r0 >> 16) & 0xffff;
        let arg1 = (arg1_hi16 << 16) | (r1 & 0xffff);
        RawSyscall {
            id,
            arg1,
            arg2: r2,
            arg3: r3,
        }
    }

    pub fn syscall(&self) -> Option<Syscall> {
        Syscall::from_id(self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_packed_arg0() {
        let arg1 = 0xDEAD_BEEFu32;
        let r0 = ((arg1 >> 16) << 16) | (Syscall::ConsoleWrite as u32 & 0xffff);
        let r1 = arg1 & 0xffff;
        let raw = RawSyscall::decode(r0, r1, 7, 0);
        assert_eq!(raw.syscall(), Some(Syscall::ConsoleWrite));
        assert_eq!(raw.arg1, arg1);
        assert_eq!(raw.arg2, 7);
    }

    #[test]
    fn unknown_id_decodes_to_none() {
        let raw = RawSyscall::decode(0xffff, 0, 0, 0);
        assert_eq!(raw.syscall(), None);
    }
}
