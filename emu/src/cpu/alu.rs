//! # Flag-producing arithmetic
//!
//! Every flag-setting THUMB operation funnels through the adder or the
//! barrel shifter defined here. Both are pure: they take operands (and the
//! incoming carry) and return an [`ArithmeticOpResult`] which
//! [`Psr::set_flags`](super::psr::Psr::set_flags) copies into the CPSR.
//!
//! Subtraction is addition of the two's complement, `a - b = a + !b + 1`, so
//! the carry out of a subtraction means "no borrow" (`a >= b` unsigned).

use crate::bitwise::Bits;
use crate::cpu::flags::ShiftKind;

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArithmeticOpResult {
    pub result: u32,
    pub carry: bool,
    pub overflow: bool,
    pub sign: bool,
    pub zero: bool,
}

impl ArithmeticOpResult {
    const fn logical(result: u32, carry: bool) -> Self {
        Self {
            result,
            carry,
            overflow: false,
            sign: result >> 31 == 1,
            zero: result == 0,
        }
    }
}

/// `a + b + carry_in`, the adder every arithmetic instruction is built on.
#[must_use]
pub fn add_with_carry(a: u32, b: u32, carry_in: bool) -> ArithmeticOpResult {
    let wide = u64::from(a) + u64::from(b) + u64::from(carry_in);
    let result = wide as u32;

    ArithmeticOpResult {
        result,
        carry: wide > u64::from(u32::MAX),
        overflow: a.get_bit(31) == b.get_bit(31) && result.get_bit(31) != a.get_bit(31),
        sign: result.get_bit(31),
        zero: result == 0,
    }
}

#[must_use]
pub fn add(a: u32, b: u32) -> ArithmeticOpResult {
    add_with_carry(a, b, false)
}

#[must_use]
pub fn sub(a: u32, b: u32) -> ArithmeticOpResult {
    add_with_carry(a, !b, true)
}

/// `a + b + C`
#[must_use]
pub fn adc(a: u32, b: u32, carry: bool) -> ArithmeticOpResult {
    add_with_carry(a, b, carry)
}

/// `a - b - !C`
#[must_use]
pub fn sbc(a: u32, b: u32, carry: bool) -> ArithmeticOpResult {
    add_with_carry(a, !b, carry)
}

/// Barrel shifter.
///
/// `amount` is the full shift count (the low byte of a register for the
/// register-specified forms, 0-31 for the immediate forms). A zero amount
/// passes the value through with the incoming carry. Amounts of 32 and above
/// follow the register-shift rules: LSL/LSR produce 0, ASR fills with the sign
/// bit and ROR rotates by `amount % 32`.
#[must_use]
pub fn shift(kind: ShiftKind, amount: u32, value: u32, carry: bool) -> ArithmeticOpResult {
    if amount == 0 {
        return ArithmeticOpResult::logical(value, carry);
    }

    let (result, carry) = match kind {
        ShiftKind::Lsl => match amount {
            1..=31 => (value << amount, value.get_bit((32 - amount) as u8)),
            32 => (0, value.get_bit(0)),
            _ => (0, false),
        },
        ShiftKind::Lsr => match amount {
            1..=31 => (value >> amount, value.get_bit((amount - 1) as u8)),
            32 => (0, value.get_bit(31)),
            _ => (0, false),
        },
        ShiftKind::Asr => match amount {
            1..=31 => (
                ((value as i32) >> amount) as u32,
                value.get_bit((amount - 1) as u8),
            ),
            _ => (((value as i32) >> 31) as u32, value.get_bit(31)),
        },
        ShiftKind::Ror => match amount % 32 {
            0 => (value, value.get_bit(31)),
            n => (value.rotate_right(n), value.get_bit((n - 1) as u8)),
        },
    };

    ArithmeticOpResult::logical(result, carry)
}
