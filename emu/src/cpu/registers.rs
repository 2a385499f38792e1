//! # Banked register file
//!
//! Sixteen registers are visible at any time, but the storage behind r8-r14
//! depends on the current mode. All of them live in one flat array of 31
//! slots and a per-mode table maps a logical register to its slot.
//!
//! ```text
//!         USR/SYS  FIQ   IRQ   SVC   ABT   UND
//! r0-r7    0-7     0-7   0-7   0-7   0-7   0-7
//! r8-r12   8-12   16-20  8-12  8-12  8-12  8-12
//! r13      13      21    23    25    27    29
//! r14      14      22    24    26    28    30
//! r15      15      15    15    15    15    15
//! ```
//!
//! The table row is taken from the CPSR mode field on every high-register
//! access, so a mode switch is visible immediately and cannot leave a stale
//! mapping behind. The file also stores the CPSR and the five SPSRs.

use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::cpu::cpu_modes::Mode;
use crate::cpu::psr::Psr;

pub const REG_SP: usize = 0xD;
pub const REG_LR: usize = 0xE;
pub const REG_PROGRAM_COUNTER: usize = 0xF;

const PHYSICAL_REGISTERS: usize = 31;

const fn bank_row(r8: u8, r13: u8) -> [u8; 16] {
    [
        0,
        1,
        2,
        3,
        4,
        5,
        6,
        7,
        r8,
        r8 + 1,
        r8 + 2,
        r8 + 3,
        r8 + 4,
        r13,
        r13 + 1,
        15,
    ]
}

/// Logical register to physical slot, one row per [`Mode::bank`].
const BANK_MAP: [[u8; 16]; 6] = [
    bank_row(8, 13),
    bank_row(16, 21),
    bank_row(8, 23),
    bank_row(8, 25),
    bank_row(8, 27),
    bank_row(8, 29),
];

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterFile {
    #[serde_as(as = "[_; PHYSICAL_REGISTERS]")]
    slots: [u32; PHYSICAL_REGISTERS],
    cpsr: Psr,
    spsr: [Psr; 5],
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self {
            slots: [0; PHYSICAL_REGISTERS],
            cpsr: Psr::default(),
            spsr: [Psr::default(); 5],
        }
    }
}

impl RegisterFile {
    #[inline]
    fn slot(mode: Mode, reg: usize) -> usize {
        assert!(reg < 16, "register index out of range: {reg}");
        BANK_MAP[mode.bank()][reg] as usize
    }

    /// Reads a register as seen by the current mode.
    ///
    /// # Panics
    ///
    /// If `reg` is not in `0..16`.
    #[inline]
    #[must_use]
    pub fn register_at(&self, reg: usize) -> u32 {
        if reg < 8 {
            self.slots[reg]
        } else {
            self.slots[Self::slot(self.cpsr.mode(), reg)]
        }
    }

    /// Writes a register as seen by the current mode. Writing r15 does not
    /// refill the pipeline, see [`Arm7tdmi::flush_pipeline`](crate::cpu::arm7tdmi::Arm7tdmi::flush_pipeline).
    ///
    /// # Panics
    ///
    /// If `reg` is not in `0..16`.
    #[inline]
    pub fn set_register_at(&mut self, reg: usize, value: u32) {
        if reg < 8 {
            self.slots[reg] = value;
        } else {
            let slot = Self::slot(self.cpsr.mode(), reg);
            self.slots[slot] = value;
        }
    }

    /// Reads `reg` from the bank of `mode`, regardless of the current mode.
    #[must_use]
    pub fn read_banked(&self, mode: Mode, reg: usize) -> u32 {
        self.slots[Self::slot(mode, reg)]
    }

    pub fn write_banked(&mut self, mode: Mode, reg: usize, value: u32) {
        self.slots[Self::slot(mode, reg)] = value;
    }

    #[must_use]
    pub fn program_counter(&self) -> u32 {
        self.slots[REG_PROGRAM_COUNTER]
    }

    pub fn set_program_counter(&mut self, value: u32) {
        self.slots[REG_PROGRAM_COUNTER] = value;
    }

    #[must_use]
    pub fn stack_pointer(&self) -> u32 {
        self.register_at(REG_SP)
    }

    pub fn set_stack_pointer(&mut self, value: u32) {
        self.set_register_at(REG_SP, value);
    }

    #[must_use]
    pub fn link_register(&self) -> u32 {
        self.register_at(REG_LR)
    }

    pub fn set_link_register(&mut self, value: u32) {
        self.set_register_at(REG_LR, value);
    }

    #[must_use]
    pub const fn cpsr(&self) -> Psr {
        self.cpsr
    }

    pub const fn cpsr_mut(&mut self) -> &mut Psr {
        &mut self.cpsr
    }

    pub fn set_cpsr(&mut self, psr: Psr) {
        self.cpsr = psr;
    }

    /// Saved status register of the current mode, `None` in User and System.
    #[must_use]
    pub fn spsr(&self) -> Option<Psr> {
        self.spsr_of(self.cpsr.mode())
    }

    pub fn spsr_mut(&mut self) -> Option<&mut Psr> {
        let slot = self.cpsr.mode().spsr_slot()?;
        Some(&mut self.spsr[slot])
    }

    #[must_use]
    pub fn spsr_of(&self, mode: Mode) -> Option<Psr> {
        mode.spsr_slot().map(|slot| self.spsr[slot])
    }

    /// Stores `psr` as the SPSR of `mode`. Returns false for modes without one.
    pub fn set_spsr_of(&mut self, mode: Mode, psr: Psr) -> bool {
        let Some(slot) = mode.spsr_slot() else {
            return false;
        };
        self.spsr[slot] = psr;
        true
    }

    /// One `name = 0x%08X` line per visible register.
    #[must_use]
    pub fn dump(&self) -> String {
        (0..16)
            .map(|reg| {
                let name = match reg {
                    REG_SP => "sp".to_string(),
                    REG_LR => "lr".to_string(),
                    REG_PROGRAM_COUNTER => "pc".to_string(),
                    n => format!("r{n}"),
                };
                format!("{name} = 0x{:08X}\n", self.register_at(reg))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn file_in(mode: Mode) -> RegisterFile {
        let mut file = RegisterFile::default();
        file.cpsr_mut().set_mode(mode);
        file
    }

    #[test]
    #[should_panic(expected = "register index out of range: 17")]
    fn register_index_past_r15_panics() {
        let _ = RegisterFile::default().register_at(17);
    }

    #[test]
    fn low_registers_are_shared() {
        let mut file = file_in(Mode::Fiq);
        for r in 0..8 {
            file.set_register_at(r, r as u32 * 3);
        }
        file.cpsr_mut().set_mode(Mode::User);
        for r in 0..8 {
            assert_eq!(file.register_at(r), r as u32 * 3);
        }
    }

    #[test]
    fn stack_pointer_is_banked_between_svc_and_irq() {
        let mut file = file_in(Mode::Irq);
        file.set_stack_pointer(0x0300_7FA0);

        file.cpsr_mut().set_mode(Mode::Supervisor);
        file.set_stack_pointer(0x0300_7FE0);
        file.set_link_register(0x1234);

        file.cpsr_mut().set_mode(Mode::Irq);
        assert_eq!(file.stack_pointer(), 0x0300_7FA0);
        assert_eq!(file.link_register(), 0);

        assert_eq!(file.read_banked(Mode::Supervisor, REG_SP), 0x0300_7FE0);
        assert_eq!(file.read_banked(Mode::Supervisor, REG_LR), 0x1234);
    }

    #[test]
    fn fiq_banks_r8_to_r14() {
        let mut file = file_in(Mode::User);
        for r in 8..15 {
            file.set_register_at(r, 0x100 + r as u32);
        }

        file.cpsr_mut().set_mode(Mode::Fiq);
        for r in 8..15 {
            assert_eq!(file.register_at(r), 0);
            file.set_register_at(r, 0x200 + r as u32);
        }

        file.cpsr_mut().set_mode(Mode::System);
        for r in 8..15 {
            assert_eq!(file.register_at(r), 0x100 + r as u32);
        }

        file.cpsr_mut().set_mode(Mode::Irq);
        assert_eq!(file.register_at(12), 0x10C);
    }

    #[test]
    fn program_counter_is_shared_by_every_mode() {
        let mut file = file_in(Mode::Undefined);
        file.set_register_at(REG_PROGRAM_COUNTER, 0x0800_0000);
        for mode in Mode::ALL {
            file.cpsr_mut().set_mode(mode);
            assert_eq!(file.program_counter(), 0x0800_0000);
        }
    }

    #[test]
    fn spsr_only_in_privileged_exception_modes() {
        let mut file = file_in(Mode::User);
        assert_eq!(file.spsr(), None);
        assert!(file.spsr_mut().is_none());
        assert!(!file.set_spsr_of(Mode::System, Psr::default()));

        let saved = Psr::from(Mode::User);
        assert!(file.set_spsr_of(Mode::Abort, saved));
        file.cpsr_mut().set_mode(Mode::Abort);
        assert_eq!(file.spsr(), Some(saved));
        assert_eq!(file.spsr_of(Mode::Fiq), Some(Psr::default()));
    }

    #[test]
    fn dump_lists_named_registers() {
        let mut file = file_in(Mode::Supervisor);
        file.set_register_at(2, 20);
        file.set_program_counter(0x8000_0004);
        let dump = file.dump();
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 16);
        assert_eq!(lines[2], "r2 = 0x00000014");
        assert_eq!(lines[13], "sp = 0x00000000");
        assert_eq!(lines[15], "pc = 0x80000004");
    }
}
