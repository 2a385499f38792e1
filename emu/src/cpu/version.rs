//! # Core revisions and run configuration
//!
//! The same THUMB decoder serves two core generations. Differences are
//! looked up at run time through [`CoreVersion`]:
//!
//! | Behavior                    | ARM7TDMI (v4T)          | ARM9 (v5T)               |
//! |-----------------------------|-------------------------|--------------------------|
//! | MUL timing                  | 1-4 cycles, by operand  | 3 cycles                 |
//! | MUL carry flag              | cleared                 | preserved                |
//! | `BKPT`                      | undefined               | prefetch abort           |
//! | `BLX label`, `BLX Rm`       | undefined               | branch, link, exchange   |
//! | `POP {pc}`, `MOV/ADD pc`    | stays in THUMB          | exchange on bit 0        |

use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoreVersion {
    /// ARMv4T, the ARM7TDMI.
    #[default]
    Arm7tdmi,

    /// ARMv5T, ARM9-class cores.
    Arm9,
}

impl CoreVersion {
    /// BKPT, BLX and interworking PC loads.
    #[must_use]
    pub const fn has_v5_extensions(self) -> bool {
        matches!(self, Self::Arm9)
    }

    /// Internal cycles spent by MUL for the given multiplier operand.
    ///
    /// The v4T multiplier stops early once the remaining upper bytes are all
    /// zeros or all ones.
    #[must_use]
    pub const fn multiply_cycles(self, multiplier: u32) -> u64 {
        match self {
            Self::Arm9 => 3,
            Self::Arm7tdmi => {
                let mut m = 1;
                while m < 4 {
                    let upper = multiplier >> (8 * m);
                    let ones = u32::MAX >> (8 * m);
                    if upper == 0 || upper == ones {
                        break;
                    }
                    m += 1;
                }
                m
            }
        }
    }

    /// MUL leaves the carry flag meaningless on v4T, where it is cleared.
    #[must_use]
    pub const fn multiply_clears_carry(self) -> bool {
        matches!(self, Self::Arm7tdmi)
    }
}

impl std::fmt::Display for CoreVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Arm7tdmi => "ARM7TDMI (ARMv4T)",
            Self::Arm9 => "ARM9 (ARMv5T)",
        })
    }
}

/// What happens when an instruction touches memory it may not.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultPolicy {
    /// `step` returns the [`MemoryError`](crate::error::MemoryError) and the
    /// host decides what to do.
    #[default]
    Halt,

    /// The fault enters the abort exception, data abort for loads and stores,
    /// prefetch abort for instruction fetches.
    RaiseAbort,
}

/// Halfword the default configuration stops on.
pub const DEFAULT_HALT_INSTRUCTION: u16 = 0xC0DE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreConfig {
    pub version: CoreVersion,

    /// `step` stops without executing when the current instruction equals
    /// this halfword.
    pub halt_instruction: Option<u16>,

    /// `step` stops once this many instructions have executed.
    pub max_instructions: Option<u64>,

    pub fault_policy: FaultPolicy,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            version: CoreVersion::default(),
            halt_instruction: Some(DEFAULT_HALT_INSTRUCTION),
            max_instructions: None,
            fault_policy: FaultPolicy::default(),
        }
    }
}

impl CoreConfig {
    #[must_use]
    pub const fn with_version(mut self, version: CoreVersion) -> Self {
        self.version = version;
        self
    }

    #[must_use]
    pub const fn with_halt_instruction(mut self, halt: Option<u16>) -> Self {
        self.halt_instruction = halt;
        self
    }

    #[must_use]
    pub const fn with_max_instructions(mut self, limit: Option<u64>) -> Self {
        self.max_instructions = limit;
        self
    }

    #[must_use]
    pub const fn with_fault_policy(mut self, policy: FaultPolicy) -> Self {
        self.fault_policy = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn v4_multiply_cycles_follow_operand_width() {
        let v4 = CoreVersion::Arm7tdmi;
        assert_eq!(v4.multiply_cycles(0), 1);
        assert_eq!(v4.multiply_cycles(0xFF), 1);
        assert_eq!(v4.multiply_cycles(0xFFFF_FF80), 1);
        assert_eq!(v4.multiply_cycles(0x100), 2);
        assert_eq!(v4.multiply_cycles(0xFFFF_0000), 2);
        assert_eq!(v4.multiply_cycles(0x00FF_FFFF), 3);
        assert_eq!(v4.multiply_cycles(0xFF00_0000), 3);
        assert_eq!(v4.multiply_cycles(0x0100_0000), 4);
        assert_eq!(v4.multiply_cycles(0x8000_0000), 4);
    }

    #[test]
    fn v5_multiply_is_fixed() {
        assert_eq!(CoreVersion::Arm9.multiply_cycles(0), 3);
        assert_eq!(CoreVersion::Arm9.multiply_cycles(u32::MAX / 3), 3);
        assert!(!CoreVersion::Arm9.multiply_clears_carry());
        assert!(CoreVersion::Arm7tdmi.multiply_clears_carry());
    }

    #[test]
    fn default_config_halts_on_sentinel() {
        let config = CoreConfig::default();
        assert_eq!(config.version, CoreVersion::Arm7tdmi);
        assert_eq!(config.halt_instruction, Some(0xC0DE));
        assert_eq!(config.fault_policy, FaultPolicy::Halt);
    }
}
