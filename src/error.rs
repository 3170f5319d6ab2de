use thiserror::Error;

/// # Fault
/// A malformed ROM can drive the machine outside of its memory or stack.
/// Rather than corrupting neighbouring state the offending cycle is abandoned
/// and one of these is handed back to the caller.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
pub enum Fault {
    /// A call was made with every stack slot already in use
    #[error("stack overflow")]
    StackOverflow,
    /// A return was made with nothing on the stack
    #[error("stack underflow")]
    StackUnderflow,
    /// An access touched `addr`, which lies past the end of memory
    #[error("memory access out of bounds at {addr:#06X}")]
    MemoryOutOfBounds { addr: usize },
    /// A ROM image of `len` bytes doesn't fit in the program region
    #[error("rom of {len} bytes is too large")]
    RomTooLarge { len: usize },
}
