//! # THUMB instruction decoding
//!
//! The decoder switches on the top five bits of the word and, where a
//! primary slot holds several formats, on a secondary opcode below it.
//!
//! ```text
//! ┌────────┬──────────────────────────────────────────────────────────────┐
//! │ 15..11 │ Format                                                       │
//! ├────────┼──────────────────────────────────────────────────────────────┤
//! │ 000 oo │ Move shifted register (oo = LSL, LSR, ASR)                   │
//! │ 00011  │ Add/subtract, register or 3-bit immediate (bits 9-10)        │
//! │ 001 oo │ MOV/CMP/ADD/SUB with 8-bit immediate                         │
//! │ 01000  │ ALU operations (010000) / Hi register ops and BX (010001)    │
//! │ 01001  │ PC-relative load                                             │
//! │ 0101x  │ Load/store register offset (bit 9 = 0)                       │
//! │        │ Load/store sign-extended byte/halfword (bit 9 = 1)           │
//! │ 011 BL │ Load/store with 5-bit immediate offset                       │
//! │ 1000 L │ Load/store halfword                                          │
//! │ 1001 L │ SP-relative load/store                                       │
//! │ 1010 S │ Load address (PC or SP)                                      │
//! │ 10110  │ ADD SP, #±imm (10110000), PUSH (1011010R)                    │
//! │ 10111  │ POP (1011110R), BKPT (10111110)                              │
//! │ 1100 L │ Multiple load/store                                          │
//! │ 1101   │ Conditional branch, SWI (cond = 1111)                        │
//! │ 11100  │ Unconditional branch                                         │
//! │ 11101  │ BLX suffix (ARMv5T)                                          │
//! │ 1111 H │ Long branch with link, prefix (H=0) and suffix (H=1)         │
//! └────────┴──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Decoding never fails, anything not listed above is [`Instruction::Undefined`].
//! Whether an ARMv5T-only form is allowed is decided at execution time.
//!
//! ## Long branch with link
//!
//! `BL` spans ±4 MiB with two halfwords:
//!
//! ```text
//! Prefix: 1111 0 offset[22:12]   LR = PC + (offset_hi << 12)
//! Suffix: 1111 1 offset[11:1]    PC = LR + (offset_lo << 1), LR = next | 1
//! ```

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::cpu::condition::Condition;
use crate::cpu::flags::{LoadStoreKind, OperandKind, Operation, ReadWriteKind, ShiftKind};
use crate::cpu::thumb::alu_instructions::{ThumbHighRegisterOperation, ThumbModeAluInstruction};
use crate::cpu::thumb::fields;

#[derive(Debug, PartialEq, Eq, Copy, Clone, Serialize, Deserialize)]
pub enum Instruction {
    MoveShiftedRegister {
        shift_operation: ShiftKind,
        offset5: u32,
        source_register: u8,
        destination_register: u8,
    },
    AddSubtract {
        operation_kind: OperandKind,
        subtract: bool,
        rn_offset3: u8,
        source_register: u8,
        destination_register: u8,
    },
    MoveCompareAddSubtractImm {
        operation: Operation,
        destination_register: u8,
        offset: u32,
    },
    AluOp {
        alu_operation: ThumbModeAluInstruction,
        source_register: u8,
        destination_register: u8,
    },
    HiRegisterOpBX {
        register_operation: ThumbHighRegisterOperation,
        source_register: u8,
        destination_register: u8,
    },
    PCRelativeLoad {
        destination_register: u8,
        offset: u32,
    },
    LoadStoreRegisterOffset {
        load_store: LoadStoreKind,
        byte_word: ReadWriteKind,
        offset_register: u8,
        base_register: u8,
        destination_register: u8,
    },
    LoadStoreSignExtByteHalfword {
        h: bool,
        sign_extend_flag: bool,
        offset_register: u8,
        base_register: u8,
        destination_register: u8,
    },
    LoadStoreImmOffset {
        load_store: LoadStoreKind,
        byte_word: ReadWriteKind,
        offset: u32,
        base_register: u8,
        destination_register: u8,
    },
    LoadStoreHalfword {
        load_store: LoadStoreKind,
        offset: u32,
        base_register: u8,
        source_destination_register: u8,
    },
    SPRelativeLoadStore {
        load_store: LoadStoreKind,
        destination_register: u8,
        offset: u32,
    },
    LoadAddress {
        sp: bool,
        destination_register: u8,
        offset: u32,
    },
    AddOffsetSP {
        negative: bool,
        offset: u32,
    },
    PushPopReg {
        load_store: LoadStoreKind,
        pc_lr: bool,
        register_list: u8,
    },
    MultipleLoadStore {
        load_store: LoadStoreKind,
        base_register: u8,
        register_list: u8,
    },
    CondBranch {
        condition: Condition,
        offset: i32,
    },
    Swi {
        comment: u8,
    },
    UncondBranch {
        offset: i32,
    },
    LongBranchPrefix {
        offset_high: i32,
    },
    LongBranchSuffix {
        offset_low: u32,
        exchange: bool,
    },
    Breakpoint {
        comment: u8,
    },
    Undefined,
}

impl From<u16> for Instruction {
    #[allow(clippy::too_many_lines)]
    fn from(op: u16) -> Self {
        use fields::{
            condition, halfword_offset5, hi_rd, hi_rs, imm3, imm5, imm8, long_branch_high,
            long_branch_low, rd, register_list, rn, rs, sp_offset7, upper_rd, word_offset5,
            word_offset8,
        };

        match fields::opcode5(op) {
            0b00011 => Self::AddSubtract {
                operation_kind: op.get_bit(10).into(),
                subtract: op.get_bit(9),
                rn_offset3: imm3(op),
                source_register: rs(op),
                destination_register: rd(op),
            },
            0b00000..=0b00010 => Self::MoveShiftedRegister {
                shift_operation: op.get_bits(11..=12).into(),
                offset5: imm5(op),
                source_register: rs(op),
                destination_register: rd(op),
            },
            0b00100..=0b00111 => Self::MoveCompareAddSubtractImm {
                operation: op.get_bits(11..=12).into(),
                destination_register: upper_rd(op),
                offset: imm8(op),
            },
            0b01000 if !op.get_bit(10) => Self::AluOp {
                alu_operation: op.get_bits(6..=9).into(),
                source_register: rs(op),
                destination_register: rd(op),
            },
            0b01000 => {
                let h1 = op.get_bit(7);
                let h2 = op.get_bit(6);
                let register_operation = match (op.get_bits(8..=9), h1, h2) {
                    (0..=2, false, false) => return Self::Undefined,
                    (0, ..) => ThumbHighRegisterOperation::Add,
                    (1, ..) => ThumbHighRegisterOperation::Cmp,
                    (2, ..) => ThumbHighRegisterOperation::Mov,
                    (_, false, _) => ThumbHighRegisterOperation::Bx,
                    (_, true, _) => ThumbHighRegisterOperation::Blx,
                };
                Self::HiRegisterOpBX {
                    register_operation,
                    source_register: hi_rs(op),
                    destination_register: hi_rd(op),
                }
            }
            0b01001 => Self::PCRelativeLoad {
                destination_register: upper_rd(op),
                offset: word_offset8(op),
            },
            0b01010 | 0b01011 if !op.get_bit(9) => Self::LoadStoreRegisterOffset {
                load_store: op.get_bit(11).into(),
                byte_word: op.get_bit(10).into(),
                offset_register: rn(op),
                base_register: rs(op),
                destination_register: rd(op),
            },
            0b01010 | 0b01011 => Self::LoadStoreSignExtByteHalfword {
                h: op.get_bit(11),
                sign_extend_flag: op.get_bit(10),
                offset_register: rn(op),
                base_register: rs(op),
                destination_register: rd(op),
            },
            0b01100..=0b01111 => {
                let byte_word: ReadWriteKind = op.get_bit(12).into();
                Self::LoadStoreImmOffset {
                    load_store: op.get_bit(11).into(),
                    byte_word,
                    offset: match byte_word {
                        ReadWriteKind::Byte => imm5(op),
                        _ => word_offset5(op),
                    },
                    base_register: rs(op),
                    destination_register: rd(op),
                }
            }
            0b10000 | 0b10001 => Self::LoadStoreHalfword {
                load_store: op.get_bit(11).into(),
                offset: halfword_offset5(op),
                base_register: rs(op),
                source_destination_register: rd(op),
            },
            0b10010 | 0b10011 => Self::SPRelativeLoadStore {
                load_store: op.get_bit(11).into(),
                destination_register: upper_rd(op),
                offset: word_offset8(op),
            },
            0b10100 | 0b10101 => Self::LoadAddress {
                sp: op.get_bit(11),
                destination_register: upper_rd(op),
                offset: word_offset8(op),
            },
            0b10110 | 0b10111 => match op.get_bits(8..=11) {
                0b0000 => Self::AddOffsetSP {
                    negative: op.get_bit(7),
                    offset: sp_offset7(op),
                },
                0b0100 | 0b0101 | 0b1100 | 0b1101 => Self::PushPopReg {
                    load_store: op.get_bit(11).into(),
                    pc_lr: op.get_bit(8),
                    register_list: register_list(op),
                },
                0b1110 => Self::Breakpoint {
                    comment: register_list(op),
                },
                _ => Self::Undefined,
            },
            0b11000 | 0b11001 => Self::MultipleLoadStore {
                load_store: op.get_bit(11).into(),
                base_register: upper_rd(op),
                register_list: register_list(op),
            },
            0b11010 | 0b11011 => match condition(op) {
                0xF => Self::Swi {
                    comment: register_list(op),
                },
                0xE => Self::Undefined,
                cond => Self::CondBranch {
                    condition: cond.into(),
                    offset: fields::cond_branch_offset(op),
                },
            },
            0b11100 => Self::UncondBranch {
                offset: fields::branch_offset(op),
            },
            0b11101 if op.get_bit(0) => Self::Undefined,
            0b11101 => Self::LongBranchSuffix {
                offset_low: long_branch_low(op),
                exchange: true,
            },
            0b11110 => Self::LongBranchPrefix {
                offset_high: long_branch_high(op),
            },
            _ => Self::LongBranchSuffix {
                offset_low: long_branch_low(op),
                exchange: false,
            },
        }
    }
}

impl Instruction {
    /// True for forms that only exist on ARMv5T cores.
    #[must_use]
    pub const fn requires_v5(&self) -> bool {
        matches!(
            self,
            Self::Breakpoint { .. }
                | Self::LongBranchSuffix { exchange: true, .. }
                | Self::HiRegisterOpBX {
                    register_operation: ThumbHighRegisterOperation::Blx,
                    ..
                }
        )
    }
}

#[cfg(feature = "disassembler")]
fn register_name(reg: u8) -> String {
    match reg {
        13 => "sp".to_string(),
        14 => "lr".to_string(),
        15 => "pc".to_string(),
        n => format!("r{n}"),
    }
}

#[cfg(feature = "disassembler")]
fn register_list_text(list: u8, extra: Option<&str>) -> String {
    let mut names: Vec<String> = (0..8)
        .filter(|r| list.get_bit(*r))
        .map(register_name)
        .collect();
    names.extend(extra.map(str::to_string));
    format!("{{{}}}", names.join(", "))
}

#[cfg(feature = "disassembler")]
impl Instruction {
    /// Human readable form of the instruction found at `address`.
    ///
    /// Branch targets are resolved against the pipelined PC (`address + 4`).
    #[must_use]
    #[allow(clippy::too_many_lines)]
    pub fn disassembler(&self, address: u32) -> String {
        let pc = address.wrapping_add(4);
        let target = |offset: i32| pc.wrapping_add_signed(offset);
        let r = register_name;

        match *self {
            Self::MoveShiftedRegister {
                shift_operation,
                offset5,
                source_register,
                destination_register,
            } => format!(
                "{shift_operation} {}, {}, #{offset5}",
                r(destination_register),
                r(source_register)
            ),
            Self::AddSubtract {
                operation_kind,
                subtract,
                rn_offset3,
                source_register,
                destination_register,
            } => {
                let op = if subtract { "SUB" } else { "ADD" };
                let operand = match operation_kind {
                    OperandKind::Immediate => format!("#{rn_offset3}"),
                    OperandKind::Register => r(rn_offset3),
                };
                format!(
                    "{op} {}, {}, {operand}",
                    r(destination_register),
                    r(source_register)
                )
            }
            Self::MoveCompareAddSubtractImm {
                operation,
                destination_register,
                offset,
            } => format!("{operation} {}, #{offset}", r(destination_register)),
            Self::AluOp {
                alu_operation,
                source_register,
                destination_register,
            } => format!(
                "{alu_operation} {}, {}",
                r(destination_register),
                r(source_register)
            ),
            Self::HiRegisterOpBX {
                register_operation,
                source_register,
                destination_register,
            } => match register_operation {
                ThumbHighRegisterOperation::Bx | ThumbHighRegisterOperation::Blx => {
                    format!("{register_operation} {}", r(source_register))
                }
                _ => format!(
                    "{register_operation} {}, {}",
                    r(destination_register),
                    r(source_register)
                ),
            },
            Self::PCRelativeLoad {
                destination_register,
                offset,
            } => format!(
                "LDR {}, [pc, #{offset}] ; 0x{:08X}",
                r(destination_register),
                (pc & !3).wrapping_add(offset)
            ),
            Self::LoadStoreRegisterOffset {
                load_store,
                byte_word,
                offset_register,
                base_register,
                destination_register,
            } => {
                let op = match load_store {
                    LoadStoreKind::Load => "LDR",
                    LoadStoreKind::Store => "STR",
                };
                let suffix = if byte_word == ReadWriteKind::Byte { "B" } else { "" };
                format!(
                    "{op}{suffix} {}, [{}, {}]",
                    r(destination_register),
                    r(base_register),
                    r(offset_register)
                )
            }
            Self::LoadStoreSignExtByteHalfword {
                h,
                sign_extend_flag,
                offset_register,
                base_register,
                destination_register,
            } => {
                let op = match (sign_extend_flag, h) {
                    (false, false) => "STRH",
                    (false, true) => "LDRH",
                    (true, false) => "LDSB",
                    (true, true) => "LDSH",
                };
                format!(
                    "{op} {}, [{}, {}]",
                    r(destination_register),
                    r(base_register),
                    r(offset_register)
                )
            }
            Self::LoadStoreImmOffset {
                load_store,
                byte_word,
                offset,
                base_register,
                destination_register,
            } => {
                let op = match load_store {
                    LoadStoreKind::Load => "LDR",
                    LoadStoreKind::Store => "STR",
                };
                let suffix = if byte_word == ReadWriteKind::Byte { "B" } else { "" };
                format!(
                    "{op}{suffix} {}, [{}, #{offset}]",
                    r(destination_register),
                    r(base_register)
                )
            }
            Self::LoadStoreHalfword {
                load_store,
                offset,
                base_register,
                source_destination_register,
            } => {
                let op = match load_store {
                    LoadStoreKind::Load => "LDRH",
                    LoadStoreKind::Store => "STRH",
                };
                format!(
                    "{op} {}, [{}, #{offset}]",
                    r(source_destination_register),
                    r(base_register)
                )
            }
            Self::SPRelativeLoadStore {
                load_store,
                destination_register,
                offset,
            } => {
                let op = match load_store {
                    LoadStoreKind::Load => "LDR",
                    LoadStoreKind::Store => "STR",
                };
                format!("{op} {}, [sp, #{offset}]", r(destination_register))
            }
            Self::LoadAddress {
                sp,
                destination_register,
                offset,
            } => format!(
                "ADD {}, {}, #{offset}",
                r(destination_register),
                if sp { "sp" } else { "pc" }
            ),
            Self::AddOffsetSP { negative, offset } => {
                format!("ADD sp, #{}{offset}", if negative { "-" } else { "" })
            }
            Self::PushPopReg {
                load_store,
                pc_lr,
                register_list,
            } => match load_store {
                LoadStoreKind::Store => format!(
                    "PUSH {}",
                    register_list_text(register_list, pc_lr.then_some("lr"))
                ),
                LoadStoreKind::Load => format!(
                    "POP {}",
                    register_list_text(register_list, pc_lr.then_some("pc"))
                ),
            },
            Self::MultipleLoadStore {
                load_store,
                base_register,
                register_list,
            } => {
                let op = match load_store {
                    LoadStoreKind::Load => "LDMIA",
                    LoadStoreKind::Store => "STMIA",
                };
                format!(
                    "{op} {}!, {}",
                    r(base_register),
                    register_list_text(register_list, None)
                )
            }
            Self::CondBranch { condition, offset } => {
                format!("B{condition} 0x{:08X}", target(offset))
            }
            Self::Swi { comment } => format!("SWI 0x{comment:02X}"),
            Self::UncondBranch { offset } => format!("B 0x{:08X}", target(offset)),
            Self::LongBranchPrefix { offset_high } => {
                format!("BL (prefix) lr = 0x{:08X}", target(offset_high))
            }
            Self::LongBranchSuffix {
                offset_low,
                exchange,
            } => format!(
                "{} (suffix) lr + 0x{offset_low:X}",
                if exchange { "BLX" } else { "BL" }
            ),
            Self::Breakpoint { comment } => format!("BKPT 0x{comment:02X}"),
            Self::Undefined => "UNDEFINED".to_string(),
        }
    }
}
