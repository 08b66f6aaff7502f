/// Kernel error taxonomy (`spec.md` §7). Kernel APIs return
/// `Result<T, KernError>` rather than a raw code — `Ok` from the taxonomy is
/// just `Result::Ok`, following the teacher's own convention of using
/// `Result` instead of a sentinel "everything is fine" variant.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum KernError {
    /// Allocation failed; no physical memory of the requested size remains.
    NoMem,
    /// A bounded structure (queue, pipe buffer, region table) is full.
    NoSpace,
    /// An argument was out of range, malformed, or violated a precondition.
    InvalidArgs,
    /// A queue or buffer expected to hold something was empty.
    Empty,
    /// The target is in `Shutdown` state and rejects new work.
    Shutdown,
    /// A unique key (most often a port name) is already registered.
    Exists,
    /// The requested operation is already underway.
    InProgress,
    /// A `TaskId` did not resolve to a live task in the expected generation.
    InvalidTaskId,
    /// The operation is recognized but not provided by this build.
    Unimplemented,
    /// A value exceeds a fixed-size limit (name length, message size, ...).
    TooBig,
}

impl KernError {
    /// Flattens any error to the ABI failure sentinel (`spec.md` §6,
    /// "Return value is a signed register word; `-1` signals failure").
    /// Internally, callers should match on `self` rather than this value;
    /// it only exists at the syscall-return boundary.
    pub const fn to_syscall_return(self) -> i32 {
        -1
    }
}
