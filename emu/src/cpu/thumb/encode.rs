//! A tiny THUMB assembler.
//!
//! Each function returns the encoding of one instruction, so test programs
//! can be written as arrays of calls instead of hex dumps. Registers are
//! plain indices; offsets are in bytes and must be encodable (checked in
//! debug builds only). Branch offsets are relative to the pipelined PC,
//! i.e. the instruction address plus 4.

use crate::cpu::condition::Condition;
use crate::cpu::thumb::alu_instructions::{ThumbHighRegisterOperation, ThumbModeAluInstruction};

fn low(reg: u8) -> u16 {
    debug_assert!(reg < 8, "r{reg} is not a low register");
    u16::from(reg & 7)
}

fn shifted(op: u16, rd: u8, rs: u8, imm5: u32) -> u16 {
    debug_assert!(imm5 < 32);
    (op << 11) | ((imm5 as u16) << 6) | (low(rs) << 3) | low(rd)
}

#[must_use]
pub fn lsl_imm(rd: u8, rs: u8, amount: u32) -> u16 {
    shifted(0b000, rd, rs, amount)
}

#[must_use]
pub fn lsr_imm(rd: u8, rs: u8, amount: u32) -> u16 {
    shifted(0b001, rd, rs, amount)
}

#[must_use]
pub fn asr_imm(rd: u8, rs: u8, amount: u32) -> u16 {
    shifted(0b010, rd, rs, amount)
}

fn add_sub(immediate: bool, subtract: bool, rd: u8, rs: u8, rn_imm3: u8) -> u16 {
    0b00011 << 11
        | u16::from(immediate) << 10
        | u16::from(subtract) << 9
        | low(rn_imm3) << 6
        | low(rs) << 3
        | low(rd)
}

#[must_use]
pub fn add_reg(rd: u8, rs: u8, rn: u8) -> u16 {
    add_sub(false, false, rd, rs, rn)
}

#[must_use]
pub fn sub_reg(rd: u8, rs: u8, rn: u8) -> u16 {
    add_sub(false, true, rd, rs, rn)
}

#[must_use]
pub fn add_imm3(rd: u8, rs: u8, imm3: u8) -> u16 {
    add_sub(true, false, rd, rs, imm3)
}

#[must_use]
pub fn sub_imm3(rd: u8, rs: u8, imm3: u8) -> u16 {
    add_sub(true, true, rd, rs, imm3)
}

fn imm8_format(op: u16, rd: u8, imm8: u8) -> u16 {
    (0b001 << 13) | (op << 11) | (low(rd) << 8) | u16::from(imm8)
}

#[must_use]
pub fn mov_imm(rd: u8, imm8: u8) -> u16 {
    imm8_format(0, rd, imm8)
}

#[must_use]
pub fn cmp_imm(rd: u8, imm8: u8) -> u16 {
    imm8_format(1, rd, imm8)
}

#[must_use]
pub fn add_imm(rd: u8, imm8: u8) -> u16 {
    imm8_format(2, rd, imm8)
}

#[must_use]
pub fn sub_imm(rd: u8, imm8: u8) -> u16 {
    imm8_format(3, rd, imm8)
}

#[must_use]
pub fn alu(op: ThumbModeAluInstruction, rd: u8, rs: u8) -> u16 {
    (0b01_0000 << 10) | ((op as u16) << 6) | (low(rs) << 3) | low(rd)
}

/// High register ADD/CMP/MOV, any of r0-r15 on both sides.
#[must_use]
pub fn hi(op: ThumbHighRegisterOperation, rd: u8, rs: u8) -> u16 {
    debug_assert!(rd < 16 && rs < 16);
    let op_bits: u16 = match op {
        ThumbHighRegisterOperation::Add => 0,
        ThumbHighRegisterOperation::Cmp => 1,
        ThumbHighRegisterOperation::Mov => 2,
        ThumbHighRegisterOperation::Bx | ThumbHighRegisterOperation::Blx => 3,
    };
    (0b01_0001 << 10)
        | (op_bits << 8)
        | (u16::from((rd >> 3) & 1) << 7)
        | (u16::from(rs & 0xF) << 3)
        | u16::from(rd & 7)
}

#[must_use]
pub fn bx(rs: u8) -> u16 {
    hi(ThumbHighRegisterOperation::Bx, 0, rs)
}

#[must_use]
pub fn blx_reg(rs: u8) -> u16 {
    hi(ThumbHighRegisterOperation::Blx, 8, rs)
}

/// `LDR rd, [pc, #offset]`
#[must_use]
pub fn ldr_pc(rd: u8, offset: u32) -> u16 {
    debug_assert!(offset % 4 == 0 && offset <= 1020);
    (0b01001 << 11) | (low(rd) << 8) | (offset >> 2) as u16
}

fn register_offset(op3: u16, rd: u8, rb: u8, ro: u8) -> u16 {
    (0b0101 << 12) | (op3 << 9) | (low(ro) << 6) | (low(rb) << 3) | low(rd)
}

#[must_use]
pub fn str_reg(rd: u8, rb: u8, ro: u8) -> u16 {
    register_offset(0b000, rd, rb, ro)
}

#[must_use]
pub fn strh_reg(rd: u8, rb: u8, ro: u8) -> u16 {
    register_offset(0b001, rd, rb, ro)
}

#[must_use]
pub fn strb_reg(rd: u8, rb: u8, ro: u8) -> u16 {
    register_offset(0b010, rd, rb, ro)
}

#[must_use]
pub fn ldsb_reg(rd: u8, rb: u8, ro: u8) -> u16 {
    register_offset(0b011, rd, rb, ro)
}

#[must_use]
pub fn ldr_reg(rd: u8, rb: u8, ro: u8) -> u16 {
    register_offset(0b100, rd, rb, ro)
}

#[must_use]
pub fn ldrh_reg(rd: u8, rb: u8, ro: u8) -> u16 {
    register_offset(0b101, rd, rb, ro)
}

#[must_use]
pub fn ldrb_reg(rd: u8, rb: u8, ro: u8) -> u16 {
    register_offset(0b110, rd, rb, ro)
}

#[must_use]
pub fn ldsh_reg(rd: u8, rb: u8, ro: u8) -> u16 {
    register_offset(0b111, rd, rb, ro)
}

fn immediate_offset(op5: u16, rd: u8, rb: u8, imm5: u32) -> u16 {
    debug_assert!(imm5 < 32);
    (op5 << 11) | ((imm5 as u16) << 6) | (low(rb) << 3) | low(rd)
}

/// `STR rd, [rb, #offset]`, offset a multiple of 4 up to 124.
#[must_use]
pub fn str_imm(rd: u8, rb: u8, offset: u32) -> u16 {
    debug_assert!(offset % 4 == 0);
    immediate_offset(0b01100, rd, rb, offset >> 2)
}

#[must_use]
pub fn ldr_imm(rd: u8, rb: u8, offset: u32) -> u16 {
    debug_assert!(offset % 4 == 0);
    immediate_offset(0b01101, rd, rb, offset >> 2)
}

#[must_use]
pub fn strb_imm(rd: u8, rb: u8, offset: u32) -> u16 {
    immediate_offset(0b01110, rd, rb, offset)
}

#[must_use]
pub fn ldrb_imm(rd: u8, rb: u8, offset: u32) -> u16 {
    immediate_offset(0b01111, rd, rb, offset)
}

#[must_use]
pub fn strh_imm(rd: u8, rb: u8, offset: u32) -> u16 {
    debug_assert!(offset % 2 == 0);
    immediate_offset(0b10000, rd, rb, offset >> 1)
}

#[must_use]
pub fn ldrh_imm(rd: u8, rb: u8, offset: u32) -> u16 {
    debug_assert!(offset % 2 == 0);
    immediate_offset(0b10001, rd, rb, offset >> 1)
}

fn word8_format(op5: u16, rd: u8, offset: u32) -> u16 {
    debug_assert!(offset % 4 == 0 && offset <= 1020);
    (op5 << 11) | (low(rd) << 8) | (offset >> 2) as u16
}

#[must_use]
pub fn str_sp(rd: u8, offset: u32) -> u16 {
    word8_format(0b10010, rd, offset)
}

#[must_use]
pub fn ldr_sp(rd: u8, offset: u32) -> u16 {
    word8_format(0b10011, rd, offset)
}

/// `ADD rd, pc, #offset`
#[must_use]
pub fn add_pc(rd: u8, offset: u32) -> u16 {
    word8_format(0b10100, rd, offset)
}

/// `ADD rd, sp, #offset`
#[must_use]
pub fn add_sp(rd: u8, offset: u32) -> u16 {
    word8_format(0b10101, rd, offset)
}

/// `ADD sp, #offset` with a signed offset.
#[must_use]
pub fn adjust_sp(offset: i32) -> u16 {
    let magnitude = offset.unsigned_abs();
    debug_assert!(magnitude % 4 == 0 && magnitude <= 508);
    0xB000 | (u16::from(offset < 0) << 7) | (magnitude >> 2) as u16
}

/// `PUSH {list[, lr]}`
#[must_use]
pub fn push(list: u8, lr: bool) -> u16 {
    0xB400 | (u16::from(lr) << 8) | u16::from(list)
}

/// `POP {list[, pc]}`
#[must_use]
pub fn pop(list: u8, pc: bool) -> u16 {
    0xBC00 | (u16::from(pc) << 8) | u16::from(list)
}

#[must_use]
pub fn stmia(rb: u8, list: u8) -> u16 {
    0xC000 | (low(rb) << 8) | u16::from(list)
}

#[must_use]
pub fn ldmia(rb: u8, list: u8) -> u16 {
    0xC800 | (low(rb) << 8) | u16::from(list)
}

/// `B<cond>`, `offset` in -256..=254.
#[must_use]
pub fn b_cond(condition: Condition, offset: i32) -> u16 {
    debug_assert!(offset % 2 == 0 && (-256..=254).contains(&offset));
    0xD000 | ((condition as u16) << 8) | ((offset >> 1) as u16 & 0xFF)
}

#[must_use]
pub fn swi(comment: u8) -> u16 {
    0xDF00 | u16::from(comment)
}

#[must_use]
pub fn bkpt(comment: u8) -> u16 {
    0xBE00 | u16::from(comment)
}

/// `B`, `offset` in -2048..=2046.
#[must_use]
pub fn b(offset: i32) -> u16 {
    debug_assert!(offset % 2 == 0 && (-2048..=2046).contains(&offset));
    0xE000 | ((offset >> 1) as u16 & 0x7FF)
}

fn long_branch(offset: i32, suffix: u16) -> [u16; 2] {
    debug_assert!(offset % 2 == 0 && (-0x40_0000..0x40_0000).contains(&offset));
    let offset = offset as u32;
    [
        0xF000 | ((offset >> 12) & 0x7FF) as u16,
        suffix | ((offset >> 1) & 0x7FF) as u16,
    ]
}

/// `BL`, two halfwords. `offset` is relative to the prefix address plus 4.
#[must_use]
pub fn bl(offset: i32) -> [u16; 2] {
    long_branch(offset, 0xF800)
}

/// `BLX label` (ARMv5T), the target is word aligned ARM code. Bit 0 of a
/// `BLX` suffix must be clear, so `offset` has to be a multiple of 4.
#[must_use]
pub fn blx(offset: i32) -> [u16; 2] {
    debug_assert!(offset % 4 == 0);
    long_branch(offset, 0xE800)
}

/// Little-endian image of a sequence of halfwords.
#[must_use]
pub fn assemble(program: &[u16]) -> Vec<u8> {
    program.iter().flat_map(|op| op.to_le_bytes()).collect()
}
