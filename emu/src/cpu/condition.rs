//! # Condition codes
//!
//! In THUMB state only the conditional branch (`1101 cccc oooooooo`) carries a
//! condition field. The four flags live in CPSR bits 28-31, see [`Psr`](super::psr::Psr).
//!
//! ```text
//! ┌───────┬────────┬─────────────────────┬─────────────────┐
//! │ Code  │ Suffix │     Meaning         │  Flags tested   │
//! ├───────┼────────┼─────────────────────┼─────────────────┤
//! │ 0000  │   EQ   │ Equal               │ Z=1             │
//! │ 0001  │   NE   │ Not equal           │ Z=0             │
//! │ 0010  │   CS   │ Carry set / ≥ (uns) │ C=1             │
//! │ 0011  │   CC   │ Carry clear / < (u) │ C=0             │
//! │ 0100  │   MI   │ Minus / negative    │ N=1             │
//! │ 0101  │   PL   │ Plus / non-negative │ N=0             │
//! │ 0110  │   VS   │ Overflow set        │ V=1             │
//! │ 0111  │   VC   │ Overflow clear      │ V=0             │
//! │ 1000  │   HI   │ Higher (unsigned)   │ C=1 AND Z=0     │
//! │ 1001  │   LS   │ Lower/same (unsig)  │ C=0 OR Z=1      │
//! │ 1010  │   GE   │ ≥ (signed)          │ N=V             │
//! │ 1011  │   LT   │ < (signed)          │ N≠V             │
//! │ 1100  │   GT   │ > (signed)          │ Z=0 AND N=V     │
//! │ 1101  │   LE   │ ≤ (signed)          │ Z=1 OR N≠V      │
//! │ 1110  │   AL   │ Always              │ (undefined here)│
//! │ 1111  │   NV   │ Never               │ (SWI slot)      │
//! └───────┴────────┴─────────────────────┴─────────────────┘
//! ```
//!
//! In the conditional branch encoding the `1110` slot is undefined and `1111`
//! is taken by SWI, so only the first fourteen codes reach [`Psr::can_execute`](super::psr::Psr::can_execute).

use serde::{Deserialize, Serialize};

#[derive(Debug, Eq, PartialEq, Copy, Clone, Serialize, Deserialize)]
pub enum Condition {
    /// Equal (Z=1)
    EQ = 0x0,
    /// Not equal (Z=0)
    NE = 0x1,
    /// Carry set / unsigned higher or same (C=1)
    CS = 0x2,
    /// Carry clear / unsigned lower (C=0)
    CC = 0x3,
    /// Minus / negative (N=1)
    MI = 0x4,
    /// Plus / positive or zero (N=0)
    PL = 0x5,
    /// Overflow set (V=1)
    VS = 0x6,
    /// Overflow clear (V=0)
    VC = 0x7,
    /// Unsigned higher (C=1 AND Z=0)
    HI = 0x8,
    /// Unsigned lower or same (C=0 OR Z=1)
    LS = 0x9,
    /// Signed greater or equal (N=V)
    GE = 0xA,
    /// Signed less than (N≠V)
    LT = 0xB,
    /// Signed greater than (Z=0 AND N=V)
    GT = 0xC,
    /// Signed less than or equal (Z=1 OR N≠V)
    LE = 0xD,
    /// Always
    AL = 0xE,
    /// Never
    NV = 0xF,
}

impl From<u8> for Condition {
    fn from(item: u8) -> Self {
        match item & 0xF {
            0x0 => Self::EQ,
            0x1 => Self::NE,
            0x2 => Self::CS,
            0x3 => Self::CC,
            0x4 => Self::MI,
            0x5 => Self::PL,
            0x6 => Self::VS,
            0x7 => Self::VC,
            0x8 => Self::HI,
            0x9 => Self::LS,
            0xA => Self::GE,
            0xB => Self::LT,
            0xC => Self::GT,
            0xD => Self::LE,
            0xE => Self::AL,
            _ => Self::NV,
        }
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let suffix = match self {
            Self::EQ => "EQ",
            Self::NE => "NE",
            Self::CS => "CS",
            Self::CC => "CC",
            Self::MI => "MI",
            Self::PL => "PL",
            Self::VS => "VS",
            Self::VC => "VC",
            Self::HI => "HI",
            Self::LS => "LS",
            Self::GE => "GE",
            Self::LT => "LT",
            Self::GT => "GT",
            Self::LE => "LE",
            Self::AL => "",
            Self::NV => "NV",
        };
        f.write_str(suffix)
    }
}
