//! # Exceptions
//!
//! ```text
//! ┌───────────────────────┬────────┬──────┬───────────────────┬────────┐
//! │ Exception             │ Vector │ Mode │ LR                │ Return │
//! ├───────────────────────┼────────┼──────┼───────────────────┼────────┤
//! │ Reset                 │ 0x00   │ SVC  │ unchanged         │   -    │
//! │ Undefined instruction │ 0x04   │ UND  │ next instruction  │ LR     │
//! │ Software interrupt    │ 0x08   │ SVC  │ next instruction  │ LR     │
//! │ Prefetch abort        │ 0x0C   │ ABT  │ aborted + 4       │ LR - 4 │
//! │ Data abort            │ 0x10   │ ABT  │ aborted + 8       │ LR - 8 │
//! │ IRQ                   │ 0x18   │ IRQ  │ next + 4          │ LR - 4 │
//! │ FIQ                   │ 0x1C   │ FIQ  │ next + 4          │ LR - 4 │
//! └───────────────────────┴────────┴──────┴───────────────────┴────────┘
//! ```
//!
//! Entry saves CPSR into the SPSR of the target mode, switches mode, stores
//! LR in the target bank, switches to ARM state with IRQs masked (and FIQs
//! too for FIQ and reset) and restarts the pipeline at the vector.

use serde::{Deserialize, Serialize};

use crate::cpu::arm7tdmi::Arm7tdmi;
use crate::cpu::cpu_modes::Mode;
use crate::error::EmuError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Exception {
    Reset,
    UndefinedInstruction,
    SoftwareInterrupt,
    PrefetchAbort,
    DataAbort,
    Irq,
    Fiq,
}

impl Exception {
    #[must_use]
    pub const fn vector(self) -> u32 {
        match self {
            Self::Reset => 0x00,
            Self::UndefinedInstruction => 0x04,
            Self::SoftwareInterrupt => 0x08,
            Self::PrefetchAbort => 0x0C,
            Self::DataAbort => 0x10,
            Self::Irq => 0x18,
            Self::Fiq => 0x1C,
        }
    }

    #[must_use]
    pub const fn mode(self) -> Mode {
        match self {
            Self::Reset | Self::SoftwareInterrupt => Mode::Supervisor,
            Self::UndefinedInstruction => Mode::Undefined,
            Self::PrefetchAbort | Self::DataAbort => Mode::Abort,
            Self::Irq => Mode::Irq,
            Self::Fiq => Mode::Fiq,
        }
    }

    /// What a handler subtracts from LR to resume.
    #[must_use]
    pub const fn return_offset(self) -> u32 {
        match self {
            Self::Reset | Self::UndefinedInstruction | Self::SoftwareInterrupt => 0,
            Self::PrefetchAbort | Self::Irq | Self::Fiq => 4,
            Self::DataAbort => 8,
        }
    }
}

impl Arm7tdmi {
    /// Signals an exception from outside the instruction stream, typically
    /// an interrupt line. Returns false when the interrupt is masked.
    pub fn raise(&mut self, kind: Exception) -> bool {
        self.enter_exception(kind)
    }

    pub(crate) fn enter_exception(&mut self, kind: Exception) -> bool {
        let cpsr = self.registers.cpsr();
        let masked = match kind {
            Exception::Irq => cpsr.irq_disable(),
            Exception::Fiq => cpsr.fiq_disable(),
            _ => false,
        };
        if masked {
            tracing::trace!("{kind:?} masked");
            return false;
        }

        let width = cpsr.cpu_state().instruction_width();
        let pc = self.registers.program_counter();
        let current = pc.wrapping_sub(2 * width);
        let return_address = match kind {
            Exception::Reset => None,
            Exception::UndefinedInstruction | Exception::SoftwareInterrupt => {
                Some(pc.wrapping_sub(width))
            }
            Exception::PrefetchAbort | Exception::Irq | Exception::Fiq => {
                Some(current.wrapping_add(4))
            }
            Exception::DataAbort => Some(current.wrapping_add(8)),
        };

        let mode = kind.mode();
        self.registers.set_spsr_of(mode, cpsr);

        let new_cpsr = self.registers.cpsr_mut();
        new_cpsr.set_mode(mode);
        new_cpsr.clear_thumb();
        new_cpsr.set_irq_disable(true);
        if matches!(kind, Exception::Fiq | Exception::Reset) {
            new_cpsr.set_fiq_disable(true);
        }

        if let Some(lr) = return_address {
            self.registers.set_link_register(lr);
        }

        tracing::debug!(
            "{kind:?} at 0x{current:08X}: {} -> {mode}, lr = 0x{:08X}",
            cpsr.mode(),
            self.registers.link_register()
        );

        self.registers.set_program_counter(kind.vector());
        self.flush_pipeline();
        self.add_cycles(2);
        true
    }

    /// Leaves the handler of `kind` the way its return instruction would
    /// (`MOVS pc, lr` or `SUBS pc, lr, #4/#8`): CPSR comes back from the SPSR
    /// and execution resumes in the restored state.
    ///
    /// # Errors
    ///
    /// [`EmuError::NoSavedStatus`] when the current mode has no SPSR.
    pub fn return_from_exception(&mut self, kind: Exception) -> Result<(), EmuError> {
        let mode = self.registers.cpsr().mode();
        let spsr = self
            .registers
            .spsr()
            .ok_or(EmuError::NoSavedStatus { mode })?;
        let target = self
            .registers
            .link_register()
            .wrapping_sub(kind.return_offset());

        self.registers.set_cpsr(spsr);
        self.registers.set_program_counter(target);
        self.flush_pipeline();
        self.add_cycles(2);

        tracing::debug!(
            "return from {kind:?}: {mode} -> {}, pc = 0x{:08X}",
            spsr.mode(),
            self.current_instruction_address()
        );
        Ok(())
    }
}
