//! # Program Status Registers (CPSR and SPSR)
//!
//! ```text
//! 31 30 29 28 27          8 7 6 5 4   0
//! ┌──┬──┬──┬──┬────────────┬─┬─┬─┬─────┐
//! │N │Z │C │V │  Reserved  │I│F│T│Mode │
//! └──┴──┴──┴──┴────────────┴─┴─┴─┴─────┘
//! ```
//!
//! - **Flags (28-31)**: tested by [`Psr::can_execute`], see [`condition`](super::condition)
//! - **I/F bits (7, 6)**: IRQ/FIQ disable
//! - **T bit (5)**: ARM (0) or THUMB (1) state
//! - **Mode (0-4)**: one of the seven [`Mode`]s, never anything else
//!
//! Every privileged mode except System owns a SPSR which receives the CPSR on
//! exception entry. The saved registers live in the
//! [`RegisterFile`](super::registers::RegisterFile).

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::cpu::alu::ArithmeticOpResult;
use crate::cpu::condition::Condition;
use crate::cpu::cpu_modes::{InvalidMode, Mode};

const MODE_MASK: u32 = 0b1_1111;

/// Program Status Register (CPSR or SPSR).
///
/// A thin wrapper over the raw word. The mode field is validated on every
/// way in (`TryFrom<u32>`, deserialization, [`Psr::set_mode`]), so a `Psr`
/// always holds one of the seven legal modes.
///
/// # Example
///
/// ```
/// use emu::cpu::psr::Psr;
///
/// let mut cpsr = Psr::default();
/// cpsr.set_zero_flag(true);
/// assert!(cpsr.zero_flag());
/// assert_eq!(u32::from(cpsr), 0x4000_00D3);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Psr(u32);

/// Reset value: Supervisor, IRQ and FIQ disabled, ARM state.
impl Default for Psr {
    fn default() -> Self {
        Self(0xD3)
    }
}

impl Psr {
    #[must_use]
    pub fn can_execute(self, cond: Condition) -> bool {
        use Condition::{AL, CC, CS, EQ, GE, GT, HI, LE, LS, LT, MI, NE, NV, PL, VC, VS};
        match cond {
            EQ => self.zero_flag(),
            NE => !self.zero_flag(),
            CS => self.carry_flag(),
            CC => !self.carry_flag(),
            MI => self.sign_flag(),
            PL => !self.sign_flag(),
            VS => self.overflow_flag(),
            VC => !self.overflow_flag(),
            HI => self.carry_flag() && !self.zero_flag(),
            LS => !self.carry_flag() || self.zero_flag(),
            GE => self.sign_flag() == self.overflow_flag(),
            LT => self.sign_flag() != self.overflow_flag(),
            GT => !self.zero_flag() && (self.sign_flag() == self.overflow_flag()),
            LE => self.zero_flag() || (self.sign_flag() != self.overflow_flag()),
            AL => true,
            NV => false,
        }
    }

    /// N => Bit 31, (0=Not Signed, 1=Signed)
    #[must_use]
    pub fn sign_flag(self) -> bool {
        self.0.get_bit(31)
    }

    /// Z => Bit 30, (0=Not Zero, 1=Zero)
    #[must_use]
    pub fn zero_flag(self) -> bool {
        self.0.get_bit(30)
    }

    /// C => Bit 29, (0=Borrow/No Carry, 1=Carry/No Borrow)
    #[must_use]
    pub fn carry_flag(self) -> bool {
        self.0.get_bit(29)
    }

    /// V => Bit 28, (0=No Overflow, 1=Overflow)
    #[must_use]
    pub fn overflow_flag(self) -> bool {
        self.0.get_bit(28)
    }

    /// I => Bit 7, (0=Enable, 1=Disable)
    #[must_use]
    pub fn irq_disable(self) -> bool {
        self.0.get_bit(7)
    }

    /// F => Bit 6, (0=Enable, 1=Disable)
    #[must_use]
    pub fn fiq_disable(self) -> bool {
        self.0.get_bit(6)
    }

    /// T => Bit 5, (0=ARM, 1=THUMB)
    #[must_use]
    pub fn state_bit(self) -> bool {
        self.0.get_bit(5)
    }

    #[must_use]
    pub fn cpu_state(self) -> CpuState {
        self.state_bit().into()
    }

    #[must_use]
    pub fn thumb(self) -> bool {
        self.state_bit()
    }

    /// M4-M0 => Bits 4-0
    #[must_use]
    pub fn mode(self) -> Mode {
        Mode::try_from(self.0 & MODE_MASK).unwrap_or_else(|e| {
            // Unreachable through the public API, every constructor validates.
            tracing::error!("{e} in PSR=0x{:08X}, using Supervisor", self.0);
            Mode::Supervisor
        })
    }

    pub fn set_sign_flag(&mut self, value: bool) {
        self.0.set_bit(31, value);
    }

    pub fn set_zero_flag(&mut self, value: bool) {
        self.0.set_bit(30, value);
    }

    pub fn set_carry_flag(&mut self, value: bool) {
        self.0.set_bit(29, value);
    }

    pub fn set_overflow_flag(&mut self, value: bool) {
        self.0.set_bit(28, value);
    }

    pub fn set_irq_disable(&mut self, value: bool) {
        self.0.set_bit(7, value);
    }

    pub fn set_fiq_disable(&mut self, value: bool) {
        self.0.set_bit(6, value);
    }

    pub fn set_state_bit(&mut self, value: bool) {
        self.0.set_bit(5, value);
    }

    pub fn set_cpu_state(&mut self, state: CpuState) {
        self.set_state_bit(state == CpuState::Thumb);
    }

    pub fn set_thumb(&mut self) {
        self.set_state_bit(true);
    }

    pub fn clear_thumb(&mut self) {
        self.set_state_bit(false);
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.0 = (self.0 & !MODE_MASK) | u32::from(mode);
    }

    /// Copies all four condition flags from an adder or shifter result.
    pub fn set_flags(&mut self, op_result: ArithmeticOpResult) {
        self.set_carry_flag(op_result.carry);
        self.set_zero_flag(op_result.zero);
        self.set_sign_flag(op_result.sign);
        self.set_overflow_flag(op_result.overflow);
    }

    /// N and Z from `result`, C and V untouched.
    pub fn set_logic_flags(&mut self, result: u32) {
        self.set_zero_flag(result == 0);
        self.set_sign_flag(result.get_bit(31));
    }

    /// N, Z, C and V of `a + b` or, with `is_subtraction`, of `a - b`.
    pub fn set_arith_flags(&mut self, a: u32, b: u32, result: u32, is_subtraction: bool) {
        let addend = if is_subtraction { !b } else { b };
        let carry = if is_subtraction {
            a >= b
        } else {
            u64::from(a) + u64::from(b) > u64::from(u32::MAX)
        };

        self.set_logic_flags(result);
        self.set_carry_flag(carry);
        self.set_overflow_flag(
            a.get_bit(31) == addend.get_bit(31) && result.get_bit(31) != a.get_bit(31),
        );
    }
}

impl From<Mode> for Psr {
    fn from(m: Mode) -> Self {
        let mut psr = Self::default();
        psr.set_mode(m);
        psr
    }
}

impl TryFrom<u32> for Psr {
    type Error = InvalidMode;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Mode::try_from(value & MODE_MASK)?;
        Ok(Self(value))
    }
}

impl From<Psr> for u32 {
    fn from(psr: Psr) -> Self {
        psr.0
    }
}

impl std::fmt::Debug for Psr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Psr(0x{:08X} {self})", self.0)
    }
}

impl std::fmt::Display for Psr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "M: {}, T: {}, F: {}, I: {}, V: {}, C: {}, Z: {}, N: {}",
            self.mode(),
            u8::from(self.state_bit()),
            u8::from(self.fiq_disable()),
            u8::from(self.irq_disable()),
            u8::from(self.overflow_flag()),
            u8::from(self.carry_flag()),
            u8::from(self.zero_flag()),
            u8::from(self.sign_flag()),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuState {
    Thumb,
    Arm,
}

impl CpuState {
    /// Size in bytes of one instruction in this state.
    #[must_use]
    pub const fn instruction_width(self) -> u32 {
        match self {
            Self::Thumb => 2,
            Self::Arm => 4,
        }
    }
}

impl From<bool> for CpuState {
    fn from(state: bool) -> Self {
        if state { Self::Thumb } else { Self::Arm }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::alu;
    use pretty_assertions::assert_eq;
    use rand::Rng;

    #[test]
    fn reset_value() {
        let psr = Psr::default();
        assert_eq!(psr.mode(), Mode::Supervisor);
        assert!(psr.irq_disable());
        assert!(psr.fiq_disable());
        assert_eq!(psr.cpu_state(), CpuState::Arm);
        assert_eq!(
            psr.to_string(),
            "M: SVC, T: 0, F: 1, I: 1, V: 0, C: 0, Z: 0, N: 0"
        );
    }

    #[test]
    fn illegal_mode_is_rejected() {
        assert_eq!(Psr::try_from(0x0000_0000), Err(InvalidMode(0)));
        assert!(Psr::try_from(0xF000_0010).is_ok());
    }

    #[test]
    fn set_mode_keeps_other_bits() {
        let mut psr = Psr::try_from(0xF000_00F3).unwrap();
        psr.set_mode(Mode::Irq);
        assert_eq!(u32::from(psr), 0xF000_00F2);
        assert_eq!(psr.mode(), Mode::Irq);
    }

    #[test]
    fn thumb_bit_helpers() {
        let mut psr = Psr::from(Mode::User);
        psr.set_thumb();
        assert!(psr.thumb());
        assert_eq!(psr.cpu_state(), CpuState::Thumb);

        psr.clear_thumb();
        assert!(!psr.thumb());
        assert_eq!(psr.cpu_state(), CpuState::Arm);
    }

    #[test]
    fn check_flags() {
        let mut cpsr = Psr::from(Mode::User);

        cpsr.set_sign_flag(true);
        assert!(cpsr.sign_flag());
        cpsr.set_zero_flag(true);
        assert!(cpsr.zero_flag());
        cpsr.set_carry_flag(true);
        assert!(cpsr.carry_flag());
        cpsr.set_overflow_flag(true);
        assert!(cpsr.overflow_flag());
        assert_eq!(u32::from(cpsr) >> 28, 0xF);

        cpsr.set_logic_flags(0);
        assert!(cpsr.zero_flag());
        assert!(!cpsr.sign_flag());
        assert!(cpsr.carry_flag());
        assert!(cpsr.overflow_flag());
    }

    #[test]
    fn arith_flags_match_the_adder() {
        let mut rng = rand::thread_rng();
        for _ in 0..5_000 {
            let a: u32 = rng.r#gen();
            let b: u32 = rng.r#gen();

            let mut by_adder = Psr::from(Mode::User);
            let mut by_operands = Psr::from(Mode::User);

            let r = alu::sub(a, b);
            by_adder.set_flags(r);
            by_operands.set_arith_flags(a, b, r.result, true);
            assert_eq!(by_adder, by_operands);

            let r = alu::add(a, b);
            by_adder.set_flags(r);
            by_operands.set_arith_flags(a, b, r.result, false);
            assert_eq!(by_adder, by_operands);
        }
    }

    #[test]
    fn signed_conditions() {
        let mut psr = Psr::from(Mode::User);

        // 1 compared with 2: N=1, V=0, Z=0
        psr.set_flags(alu::sub(1, 2));
        assert!(psr.can_execute(Condition::LT));
        assert!(psr.can_execute(Condition::LE));
        assert!(!psr.can_execute(Condition::GT));
        assert!(!psr.can_execute(Condition::GE));
        assert!(psr.can_execute(Condition::CC));

        // 3 compared with 2
        psr.set_flags(alu::sub(3, 2));
        assert!(psr.can_execute(Condition::GT));
        assert!(psr.can_execute(Condition::HI));
        assert!(!psr.can_execute(Condition::LS));

        // i32::MIN compared with 1 overflows, still "less than"
        psr.set_flags(alu::sub(0x8000_0000, 1));
        assert!(psr.can_execute(Condition::LT));
        assert!(psr.can_execute(Condition::VS));

        psr.set_flags(alu::sub(2, 2));
        assert!(psr.can_execute(Condition::EQ));
        assert!(psr.can_execute(Condition::LE));
        assert!(psr.can_execute(Condition::GE));
        assert!(psr.can_execute(Condition::LS));
        assert!(!psr.can_execute(Condition::NV));
        assert!(psr.can_execute(Condition::AL));
    }
}
