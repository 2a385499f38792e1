//! A cycle-aware THUMB interpreter for ARM7TDMI and ARM9-class cores.
//!
//! The host maps memory ranges, builds an [`Arm7tdmi`](cpu::arm7tdmi::Arm7tdmi)
//! and drives it with [`step`](cpu::arm7tdmi::Arm7tdmi::step) or
//! [`run_until_halt`](cpu::arm7tdmi::Arm7tdmi::run_until_halt).

#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
#[allow(clippy::cast_possible_wrap)]
mod bitwise;
pub mod cpu;
pub mod error;
pub mod memory;

pub use cpu::arm7tdmi::{Arm7tdmi, RunSummary};
pub use cpu::cpu_modes::Mode;
pub use cpu::version::{CoreConfig, CoreVersion, FaultPolicy};
pub use error::{ConfigError, EmuError, MemoryError};
pub use memory::{MemoryRange, Permission};
