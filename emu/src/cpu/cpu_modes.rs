//! # Processor modes
//!
//! ```text
//! ┌───────┬────────────┬──────┬────────────────────────────┬──────┐
//! │ M4-M0 │ Mode       │ Name │ Banked registers           │ SPSR │
//! ├───────┼────────────┼──────┼────────────────────────────┼──────┤
//! │ 10000 │ User       │ USR  │ none                       │  no  │
//! │ 10001 │ FIQ        │ FIQ  │ r8-r14                     │ yes  │
//! │ 10010 │ IRQ        │ IRQ  │ r13-r14                    │ yes  │
//! │ 10011 │ Supervisor │ SVC  │ r13-r14                    │ yes  │
//! │ 10111 │ Abort      │ ABT  │ r13-r14                    │ yes  │
//! │ 11011 │ Undefined  │ UND  │ r13-r14                    │ yes  │
//! │ 11111 │ System     │ SYS  │ none (shares User bank)    │  no  │
//! └───────┴────────────┴──────┴────────────────────────────┴──────┘
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize, Deserialize)]
pub enum Mode {
    /// The normal program execution state.
    User = 0b10000,

    /// Designed to support a data transfer or channel process.
    Fiq = 0b10001,

    /// Used for general-purpose interrupt handling.
    Irq = 0b10010,

    /// Protected mode for the operating system
    Supervisor = 0b10011,

    /// Entered after a data or instruction prefetch abort.
    Abort = 0b10111,

    /// Entered when an undefined instruction is executed
    Undefined = 0b11011,

    /// A privileged user mode for the operating system.
    System = 0b11111,
}

#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
#[error("invalid processor mode bits 0b{0:05b}")]
pub struct InvalidMode(pub u32);

impl Mode {
    pub const ALL: [Self; 7] = [
        Self::User,
        Self::Fiq,
        Self::Irq,
        Self::Supervisor,
        Self::Abort,
        Self::Undefined,
        Self::System,
    ];

    /// Row of the register banking table used by this mode.
    /// User and System share row 0.
    #[must_use]
    pub const fn bank(self) -> usize {
        match self {
            Self::User | Self::System => 0,
            Self::Fiq => 1,
            Self::Irq => 2,
            Self::Supervisor => 3,
            Self::Abort => 4,
            Self::Undefined => 5,
        }
    }

    /// Index of the saved status register owned by this mode, if any.
    #[must_use]
    pub const fn spsr_slot(self) -> Option<usize> {
        match self {
            Self::User | Self::System => None,
            Self::Fiq => Some(0),
            Self::Irq => Some(1),
            Self::Supervisor => Some(2),
            Self::Abort => Some(3),
            Self::Undefined => Some(4),
        }
    }

    #[must_use]
    pub const fn is_privileged(self) -> bool {
        !matches!(self, Self::User)
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::User => "USR",
            Self::Fiq => "FIQ",
            Self::Irq => "IRQ",
            Self::Supervisor => "SVC",
            Self::Abort => "ABT",
            Self::Undefined => "UND",
            Self::System => "SYS",
        }
    }
}

impl From<Mode> for u32 {
    fn from(m: Mode) -> Self {
        m as Self
    }
}

impl TryFrom<u32> for Mode {
    type Error = InvalidMode;

    fn try_from(n: u32) -> Result<Self, Self::Error> {
        match n {
            0b10000 => Ok(Self::User),
            0b10001 => Ok(Self::Fiq),
            0b10010 => Ok(Self::Irq),
            0b10011 => Ok(Self::Supervisor),
            0b10111 => Ok(Self::Abort),
            0b11011 => Ok(Self::Undefined),
            0b11111 => Ok(Self::System),
            _ => Err(InvalidMode(n)),
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
