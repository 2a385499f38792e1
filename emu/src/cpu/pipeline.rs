//! # Prefetch pipeline
//!
//! The core keeps two fetched instructions: `ir`, the one executing, and
//! `nir`, the one behind it. The program counter always points at the next
//! fetch address, so while `ir` executes from address `A`:
//!
//! ```text
//!        A          A+w         A+2w
//!   ┌─────────┬───────────┬───────────┐
//!   │   ir    │    nir    │  (fetch)  │ ◄── PC
//!   └─────────┴───────────┴───────────┘      w = 2 (THUMB) or 4 (ARM)
//! ```
//!
//! A completed instruction shifts the queue by one; any change of control
//! flow throws both slots away and fetches two fresh ones (two extra cycles).

use crate::cpu::exception::Exception;
use crate::cpu::psr::CpuState;
use crate::error::MemoryError;

/// One prefetched instruction. A failed fetch is kept as a fault and only
/// reported if the slot actually reaches execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    Fetched(u32),
    Aborted(MemoryError),
}

impl Default for Slot {
    fn default() -> Self {
        Self::Fetched(0)
    }
}

impl From<Result<u32, MemoryError>> for Slot {
    fn from(fetch: Result<u32, MemoryError>) -> Self {
        match fetch {
            Ok(word) => Self::Fetched(word),
            Err(fault) => Self::Aborted(fault),
        }
    }
}

impl Slot {
    #[must_use]
    pub const fn word(&self) -> Option<u32> {
        match self {
            Self::Fetched(word) => Some(*word),
            Self::Aborted(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pipeline {
    pub ir: Slot,
    pub nir: Slot,
}

impl Pipeline {
    /// `nir` moves into `ir` and `next` takes its place.
    pub fn advance(&mut self, next: Slot) {
        self.ir = std::mem::replace(&mut self.nir, next);
    }

    pub fn refill(&mut self, first: Slot, second: Slot) {
        self.ir = first;
        self.nir = second;
    }
}

/// How an executed instruction hands control back to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Fall through to the next instruction.
    Continue,

    /// Jump to `target` in `state`, refilling the pipeline.
    Branch { target: u32, state: CpuState },

    /// Enter an exception handler.
    Exception(Exception),
}
