//! Operand fields of a THUMB instruction word.
//!
//! ```text
//!  15 14 13 12 11 10  9  8  7  6  5  4  3  2  1  0
//! ┌──────────────┬────────┬────────┬────────┬────────┐
//! │   opcode5    │        │  rn/i3 │   rs   │   rd   │
//! └──────────────┴────────┴────────┴────────┴────────┘
//!                   └ upper rd ┘
//! ```
//!
//! Everything here is a pure function of the word, the decoder composes them.
//! Immediates come back already scaled to bytes.

use crate::bitwise::Bits;

/// Primary format selector, bits 11-15.
#[inline]
#[must_use]
pub const fn opcode5(op: u16) -> u16 {
    op >> 11
}

/// Register in bits 0-2.
#[inline]
#[must_use]
pub const fn rd(op: u16) -> u8 {
    (op & 0b111) as u8
}

/// Register in bits 3-5.
#[inline]
#[must_use]
pub const fn rs(op: u16) -> u8 {
    ((op >> 3) & 0b111) as u8
}

/// Register in bits 6-8.
#[inline]
#[must_use]
pub const fn rn(op: u16) -> u8 {
    ((op >> 6) & 0b111) as u8
}

/// Register in bits 8-10.
#[inline]
#[must_use]
pub const fn upper_rd(op: u16) -> u8 {
    ((op >> 8) & 0b111) as u8
}

/// Destination of the high register format, `H1:Rd`.
#[inline]
#[must_use]
pub fn hi_rd(op: u16) -> u8 {
    rd(op) | (u8::from(op.get_bit(7)) << 3)
}

/// Source of the high register format, `H2:Rs`.
#[inline]
#[must_use]
pub const fn hi_rs(op: u16) -> u8 {
    ((op >> 3) & 0xF) as u8
}

#[inline]
#[must_use]
pub const fn imm3(op: u16) -> u8 {
    rn(op)
}

#[inline]
#[must_use]
pub const fn imm5(op: u16) -> u32 {
    ((op >> 6) & 0x1F) as u32
}

#[inline]
#[must_use]
pub const fn imm8(op: u16) -> u32 {
    (op & 0xFF) as u32
}

#[inline]
#[must_use]
pub const fn imm11(op: u16) -> u32 {
    (op & 0x7FF) as u32
}

/// 5-bit offset of a word transfer.
#[inline]
#[must_use]
pub const fn word_offset5(op: u16) -> u32 {
    imm5(op) << 2
}

/// 5-bit offset of a halfword transfer.
#[inline]
#[must_use]
pub const fn halfword_offset5(op: u16) -> u32 {
    imm5(op) << 1
}

/// 8-bit word offset of the PC/SP relative formats.
#[inline]
#[must_use]
pub const fn word_offset8(op: u16) -> u32 {
    imm8(op) << 2
}

/// Magnitude of `ADD SP, #±imm`.
#[inline]
#[must_use]
pub const fn sp_offset7(op: u16) -> u32 {
    ((op & 0x7F) as u32) << 2
}

#[inline]
#[must_use]
pub const fn condition(op: u16) -> u8 {
    ((op >> 8) & 0xF) as u8
}

#[inline]
#[must_use]
pub const fn register_list(op: u16) -> u8 {
    (op & 0xFF) as u8
}

/// Signed offset of `B<cond>`, relative to the pipelined PC.
#[inline]
#[must_use]
pub fn cond_branch_offset(op: u16) -> i32 {
    (imm8(op) << 1).sign_extended(9) as i32
}

/// Signed offset of `B`, relative to the pipelined PC.
#[inline]
#[must_use]
pub fn branch_offset(op: u16) -> i32 {
    (imm11(op) << 1).sign_extended(12) as i32
}

/// Upper part of a long branch, bits 22-12 of the offset, sign-extended.
#[inline]
#[must_use]
pub fn long_branch_high(op: u16) -> i32 {
    (imm11(op) << 12).sign_extended(23) as i32
}

/// Lower part of a long branch, bits 11-1 of the offset.
#[inline]
#[must_use]
pub const fn long_branch_low(op: u16) -> u32 {
    imm11(op) << 1
}

/// Full 23-bit offset of a `BL` pair.
#[inline]
#[must_use]
pub fn long_branch_offset(prefix: u16, suffix: u16) -> i32 {
    long_branch_high(prefix).wrapping_add(long_branch_low(suffix) as i32)
}
