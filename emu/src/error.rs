use thiserror::Error;

use crate::cpu::cpu_modes::Mode;

/// Rejected memory layout. Raised while building an
/// [`AddressSpace`](crate::memory::AddressSpace), before any core exists.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("memory ranges `{first}` and `{second}` overlap")]
    Overlap { first: String, second: String },

    #[error("image for `{range}` is {image_len} bytes but the range only holds {size}")]
    ImageTooLarge {
        range: String,
        image_len: usize,
        size: u32,
    },

    #[error("range `{range}` at 0x{start:08X} (0x{size:X} bytes) runs past the end of the address space")]
    RangeWraps { range: String, start: u32, size: u32 },
}

/// Failed access through the address space.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MemoryError {
    #[error("{size}-byte access at 0x{address:08X} is outside every mapped range")]
    Unmapped { address: u32, size: u32 },

    #[error("write at 0x{address:08X} hits read-only range `{range}`")]
    ReadOnly { address: u32, range: String },
}

impl MemoryError {
    #[must_use]
    pub const fn address(&self) -> u32 {
        match self {
            Self::Unmapped { address, .. } | Self::ReadOnly { address, .. } => *address,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EmuError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error("ARM state execution is not implemented (pc 0x{pc:08X})")]
    ArmStateUnsupported { pc: u32 },

    #[error("{mode} mode has no saved status register to return with")]
    NoSavedStatus { mode: Mode },
}
