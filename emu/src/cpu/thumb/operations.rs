//! Execution of decoded THUMB instructions.
//!
//! Every handler returns the [`Flow`] the pipeline has to follow and adds the
//! cycles it costs on top of the single base cycle counted by
//! [`Arm7tdmi::step`]. Memory faults are propagated untouched; turning them
//! into an error or an abort is up to the caller.

use crate::bitwise::Bits;
use crate::cpu::alu::{self, ArithmeticOpResult};
use crate::cpu::arm7tdmi::Arm7tdmi;
use crate::cpu::condition::Condition;
use crate::cpu::exception::Exception;
use crate::cpu::flags::{LoadStoreKind, OperandKind, Operation, ReadWriteKind, ShiftKind};
use crate::cpu::pipeline::{Flow, Slot};
use crate::cpu::psr::CpuState;
use crate::cpu::registers::REG_PROGRAM_COUNTER;
use crate::cpu::thumb::alu_instructions::{ThumbHighRegisterOperation, ThumbModeAluInstruction};
use crate::cpu::thumb::instruction::Instruction;
use crate::error::MemoryError;

pub const SIZE_OF_INSTRUCTION: u32 = 2;

/// Extra cycles of a single register load, on top of the base cycle.
const LOAD_CYCLES: u64 = 2;
/// Extra cycles of a single register store.
const STORE_CYCLES: u64 = 1;

impl Arm7tdmi {
    pub(crate) fn execute_thumb(&mut self, instruction: Instruction) -> Result<Flow, MemoryError> {
        if instruction.requires_v5() && !self.config.version.has_v5_extensions() {
            return Ok(self.undefined(instruction));
        }

        let flow = match instruction {
            Instruction::MoveShiftedRegister {
                shift_operation,
                offset5,
                source_register,
                destination_register,
            } => self.move_shifted_reg(
                shift_operation,
                offset5,
                source_register,
                destination_register,
            ),
            Instruction::AddSubtract {
                operation_kind,
                subtract,
                rn_offset3,
                source_register,
                destination_register,
            } => self.add_subtract(
                operation_kind,
                subtract,
                rn_offset3,
                source_register,
                destination_register,
            ),
            Instruction::MoveCompareAddSubtractImm {
                operation,
                destination_register,
                offset,
            } => self.move_compare_add_sub_imm(operation, destination_register, offset),
            Instruction::AluOp {
                alu_operation,
                source_register,
                destination_register,
            } => self.alu_op(alu_operation, source_register, destination_register),
            Instruction::HiRegisterOpBX {
                register_operation,
                source_register,
                destination_register,
            } => self.hi_reg_operation_branch_ex(
                register_operation,
                source_register,
                destination_register,
            ),
            Instruction::PCRelativeLoad {
                destination_register,
                offset,
            } => self.pc_relative_load(destination_register, offset)?,
            Instruction::LoadStoreRegisterOffset {
                load_store,
                byte_word,
                offset_register,
                base_register,
                destination_register,
            } => {
                let address = self
                    .reg(base_register)
                    .wrapping_add(self.reg(offset_register));
                self.load_store(load_store, byte_word, address, destination_register)?
            }
            Instruction::LoadStoreSignExtByteHalfword {
                h,
                sign_extend_flag,
                offset_register,
                base_register,
                destination_register,
            } => self.load_store_sign_extend_byte_halfword(
                h,
                sign_extend_flag,
                offset_register,
                base_register,
                destination_register,
            )?,
            Instruction::LoadStoreImmOffset {
                load_store,
                byte_word,
                offset,
                base_register,
                destination_register,
            } => {
                let address = self.reg(base_register).wrapping_add(offset);
                self.load_store(load_store, byte_word, address, destination_register)?
            }
            Instruction::LoadStoreHalfword {
                load_store,
                offset,
                base_register,
                source_destination_register,
            } => self.load_store_halfword(
                load_store,
                offset,
                base_register,
                source_destination_register,
            )?,
            Instruction::SPRelativeLoadStore {
                load_store,
                destination_register,
                offset,
            } => {
                let address = self.registers.stack_pointer().wrapping_add(offset);
                self.load_store(
                    load_store,
                    ReadWriteKind::Word,
                    address,
                    destination_register,
                )?
            }
            Instruction::LoadAddress {
                sp,
                destination_register,
                offset,
            } => self.load_address(sp, destination_register, offset),
            Instruction::AddOffsetSP { negative, offset } => self.add_offset_sp(negative, offset),
            Instruction::PushPopReg {
                load_store,
                pc_lr,
                register_list,
            } => self.push_pop_register(load_store, pc_lr, register_list)?,
            Instruction::MultipleLoadStore {
                load_store,
                base_register,
                register_list,
            } => self.multiple_load_store(load_store, base_register, register_list)?,
            Instruction::CondBranch { condition, offset } => self.cond_branch(condition, offset),
            Instruction::Swi { comment } => {
                tracing::debug!("SWI 0x{comment:02X}");
                Flow::Exception(Exception::SoftwareInterrupt)
            }
            Instruction::UncondBranch { offset } => Flow::Branch {
                target: self.registers.program_counter().wrapping_add_signed(offset),
                state: CpuState::Thumb,
            },
            Instruction::LongBranchPrefix { offset_high } => self.long_branch_prefix(offset_high),
            Instruction::LongBranchSuffix {
                offset_low,
                exchange,
            } => self.long_branch_suffix(offset_low, exchange),
            Instruction::Breakpoint { comment } => {
                tracing::debug!("BKPT 0x{comment:02X}");
                Flow::Exception(Exception::PrefetchAbort)
            }
            Instruction::Undefined => self.undefined(instruction),
        };

        Ok(flow)
    }

    fn undefined(&self, instruction: Instruction) -> Flow {
        tracing::debug!(
            "undefined instruction {instruction:?} at 0x{:08X} on {}",
            self.current_instruction_address(),
            self.config.version
        );
        Flow::Exception(Exception::UndefinedInstruction)
    }

    /// Register read as seen by the instruction; r15 reads as the
    /// pipelined PC.
    fn reg(&self, reg: u8) -> u32 {
        self.registers.register_at(reg.into())
    }

    fn set_reg(&mut self, reg: u8, value: u32) {
        self.registers.set_register_at(reg.into(), value);
    }

    /// N, Z and C from a shifter result, V untouched.
    fn set_shifter_flags(&mut self, r: ArithmeticOpResult) {
        let cpsr = self.registers.cpsr_mut();
        cpsr.set_logic_flags(r.result);
        cpsr.set_carry_flag(r.carry);
    }

    /// Control transfer through a PC write from data: v5 cores interwork on
    /// bit 0, v4 cores stay in THUMB.
    fn write_pc(&self, value: u32) -> Flow {
        if self.config.version.has_v5_extensions() {
            Self::exchange(value)
        } else {
            Flow::Branch {
                target: value & !1,
                state: CpuState::Thumb,
            }
        }
    }

    /// `BX` semantics: bit 0 selects the state of the target.
    fn exchange(value: u32) -> Flow {
        if value.get_bit(0) {
            Flow::Branch {
                target: value & !1,
                state: CpuState::Thumb,
            }
        } else {
            Flow::Branch {
                target: value & !3,
                state: CpuState::Arm,
            }
        }
    }

    fn move_shifted_reg(&mut self, op: ShiftKind, offset5: u32, rs: u8, rd: u8) -> Flow {
        let carry = self.registers.cpsr().carry_flag();
        let r = alu::shift(op, offset5, self.reg(rs), carry);
        self.set_reg(rd, r.result);
        self.set_shifter_flags(r);
        Flow::Continue
    }

    fn add_subtract(
        &mut self,
        operation_kind: OperandKind,
        subtract: bool,
        rn_offset3: u8,
        rs: u8,
        rd: u8,
    ) -> Flow {
        let operand = match operation_kind {
            OperandKind::Immediate => u32::from(rn_offset3),
            OperandKind::Register => self.reg(rn_offset3),
        };
        let source = self.reg(rs);
        let r = if subtract {
            alu::sub(source, operand)
        } else {
            alu::add(source, operand)
        };

        self.set_reg(rd, r.result);
        self.registers.cpsr_mut().set_flags(r);
        Flow::Continue
    }

    fn move_compare_add_sub_imm(&mut self, op: Operation, rd: u8, offset: u32) -> Flow {
        let value = self.reg(rd);
        match op {
            Operation::Mov => {
                self.set_reg(rd, offset);
                self.registers.cpsr_mut().set_logic_flags(offset);
            }
            Operation::Cmp => self.registers.cpsr_mut().set_flags(alu::sub(value, offset)),
            Operation::Add => {
                let r = alu::add(value, offset);
                self.set_reg(rd, r.result);
                self.registers.cpsr_mut().set_flags(r);
            }
            Operation::Sub => {
                let r = alu::sub(value, offset);
                self.set_reg(rd, r.result);
                self.registers.cpsr_mut().set_flags(r);
            }
        }
        Flow::Continue
    }

    fn alu_op(&mut self, op: ThumbModeAluInstruction, rs: u8, rd: u8) -> Flow {
        use ThumbModeAluInstruction::{
            Adc, And, Asr, Bic, Cmn, Cmp, Eor, Lsl, Lsr, Mul, Mvn, Neg, Orr, Ror, Sbc, Tst,
        };

        let a = self.reg(rd);
        let b = self.reg(rs);
        let carry = self.registers.cpsr().carry_flag();

        let result = match op {
            And | Tst => a & b,
            Eor => a ^ b,
            Orr => a | b,
            Bic => a & !b,
            Mvn => !b,
            Lsl | Lsr | Asr | Ror => {
                let kind = match op {
                    Lsl => ShiftKind::Lsl,
                    Lsr => ShiftKind::Lsr,
                    Asr => ShiftKind::Asr,
                    _ => ShiftKind::Ror,
                };
                self.add_cycles(1);
                let r = alu::shift(kind, b & 0xFF, a, carry);
                self.set_shifter_flags(r);
                r.result
            }
            Adc => self.arithmetic(alu::adc(a, b, carry)),
            Sbc => self.arithmetic(alu::sbc(a, b, carry)),
            Neg => self.arithmetic(alu::sub(0, b)),
            Cmp => self.arithmetic(alu::sub(a, b)),
            Cmn => self.arithmetic(alu::add(a, b)),
            Mul => {
                let version = self.config.version;
                self.add_cycles(version.multiply_cycles(a));
                if version.multiply_clears_carry() {
                    self.registers.cpsr_mut().set_carry_flag(false);
                }
                a.wrapping_mul(b)
            }
        };

        if matches!(op, And | Tst | Eor | Orr | Bic | Mvn | Mul) {
            self.registers.cpsr_mut().set_logic_flags(result);
        }
        if op.writes_result() {
            self.set_reg(rd, result);
        }
        Flow::Continue
    }

    fn arithmetic(&mut self, r: ArithmeticOpResult) -> u32 {
        self.registers.cpsr_mut().set_flags(r);
        r.result
    }

    fn hi_reg_operation_branch_ex(
        &mut self,
        op: ThumbHighRegisterOperation,
        rs: u8,
        rd: u8,
    ) -> Flow {
        let source = self.reg(rs);
        let pc_destination = usize::from(rd) == REG_PROGRAM_COUNTER;

        match op {
            ThumbHighRegisterOperation::Add => {
                let value = self.reg(rd).wrapping_add(source);
                if pc_destination {
                    return self.write_pc(value);
                }
                self.set_reg(rd, value);
            }
            ThumbHighRegisterOperation::Cmp => {
                let r = alu::sub(self.reg(rd), source);
                self.registers.cpsr_mut().set_flags(r);
            }
            ThumbHighRegisterOperation::Mov => {
                if pc_destination {
                    return self.write_pc(source);
                }
                self.set_reg(rd, source);
            }
            ThumbHighRegisterOperation::Bx => return Self::exchange(source),
            ThumbHighRegisterOperation::Blx => {
                let next = self
                    .registers
                    .program_counter()
                    .wrapping_sub(SIZE_OF_INSTRUCTION);
                self.registers.set_link_register(next | 1);
                return Self::exchange(source);
            }
        }
        Flow::Continue
    }

    fn pc_relative_load(&mut self, rd: u8, offset: u32) -> Result<Flow, MemoryError> {
        let address = (self.registers.program_counter() & !3).wrapping_add(offset);
        let value = self.memory.read::<u32>(address)?;
        self.set_reg(rd, value);
        self.add_cycles(LOAD_CYCLES);
        Ok(Flow::Continue)
    }

    /// Word and byte transfers shared by the immediate, register and SP
    /// relative formats.
    fn load_store(
        &mut self,
        load_store: LoadStoreKind,
        byte_word: ReadWriteKind,
        address: u32,
        rd: u8,
    ) -> Result<Flow, MemoryError> {
        match load_store {
            LoadStoreKind::Store => {
                let value = self.reg(rd);
                match byte_word {
                    ReadWriteKind::Word => self.memory.write::<u32>(address, value)?,
                    ReadWriteKind::Halfword => self.memory.write::<u16>(address, value as u16)?,
                    ReadWriteKind::Byte => self.memory.write::<u8>(address, value as u8)?,
                }
                self.add_cycles(STORE_CYCLES);
            }
            LoadStoreKind::Load => {
                let value = match byte_word {
                    ReadWriteKind::Word => self.memory.read::<u32>(address)?,
                    ReadWriteKind::Halfword => u32::from(self.memory.read::<u16>(address)?),
                    ReadWriteKind::Byte => u32::from(self.memory.read::<u8>(address)?),
                };
                self.set_reg(rd, value);
                self.add_cycles(LOAD_CYCLES);
            }
        }
        Ok(Flow::Continue)
    }

    fn load_store_sign_extend_byte_halfword(
        &mut self,
        h: bool,
        sign_extend: bool,
        ro: u8,
        rb: u8,
        rd: u8,
    ) -> Result<Flow, MemoryError> {
        let address = self.reg(rb).wrapping_add(self.reg(ro));

        match (sign_extend, h) {
            (false, false) => {
                return self.load_store(
                    LoadStoreKind::Store,
                    ReadWriteKind::Halfword,
                    address,
                    rd,
                );
            }
            (false, true) => {
                return self.load_store(LoadStoreKind::Load, ReadWriteKind::Halfword, address, rd);
            }
            (true, false) => {
                let value = self.memory.read_signed_byte(address)?;
                self.set_reg(rd, value);
            }
            (true, true) => {
                let value = self.memory.read_signed_halfword(address)?;
                self.set_reg(rd, value);
            }
        }

        self.add_cycles(LOAD_CYCLES);
        Ok(Flow::Continue)
    }

    fn load_store_halfword(
        &mut self,
        load_store: LoadStoreKind,
        offset: u32,
        rb: u8,
        rd: u8,
    ) -> Result<Flow, MemoryError> {
        let address = self.reg(rb).wrapping_add(offset);
        self.load_store(load_store, ReadWriteKind::Halfword, address, rd)
    }

    fn load_address(&mut self, sp: bool, rd: u8, offset: u32) -> Flow {
        let base = if sp {
            self.registers.stack_pointer()
        } else {
            self.registers.program_counter() & !3
        };
        self.set_reg(rd, base.wrapping_add(offset));
        Flow::Continue
    }

    fn add_offset_sp(&mut self, negative: bool, offset: u32) -> Flow {
        let sp = self.registers.stack_pointer();
        let sp = if negative {
            sp.wrapping_sub(offset)
        } else {
            sp.wrapping_add(offset)
        };
        self.registers.set_stack_pointer(sp);
        Flow::Continue
    }

    /// Full descending stack, lowest register at the lowest address. Loads
    /// are all read before any register changes.
    fn push_pop_register(
        &mut self,
        load_store: LoadStoreKind,
        pc_lr: bool,
        register_list: u8,
    ) -> Result<Flow, MemoryError> {
        let count = register_list.count_ones() + u32::from(pc_lr);
        let sp = self.registers.stack_pointer();

        match load_store {
            LoadStoreKind::Store => {
                let start = sp.wrapping_sub(4 * count);
                let mut address = start;
                for r in (0..8).filter(|&r| register_list.get_bit(r)) {
                    let value = self.reg(r);
                    self.memory.write::<u32>(address, value)?;
                    address = address.wrapping_add(4);
                }
                if pc_lr {
                    let lr = self.registers.link_register();
                    self.memory.write::<u32>(address, lr)?;
                }

                self.registers.set_stack_pointer(start);
                self.add_cycles(u64::from(count));
                Ok(Flow::Continue)
            }
            LoadStoreKind::Load => {
                let mut values = [0; 8];
                let mut address = sp;
                for r in (0..8).filter(|&r| register_list.get_bit(r)) {
                    values[usize::from(r)] = self.memory.read::<u32>(address)?;
                    address = address.wrapping_add(4);
                }
                let pc = if pc_lr {
                    Some(self.memory.read::<u32>(address)?)
                } else {
                    None
                };

                for r in (0..8).filter(|&r| register_list.get_bit(r)) {
                    self.set_reg(r, values[usize::from(r)]);
                }
                self.registers.set_stack_pointer(sp.wrapping_add(4 * count));
                self.add_cycles(u64::from(count));

                Ok(pc.map_or(Flow::Continue, |value| self.write_pc(value)))
            }
        }
    }

    /// `STMIA`/`LDMIA` with writeback. `STMIA` stores r0 upwards from the
    /// base; `LDMIA` loads r7 downwards from the base and decrements it.
    fn multiple_load_store(
        &mut self,
        load_store: LoadStoreKind,
        rb: u8,
        register_list: u8,
    ) -> Result<Flow, MemoryError> {
        let count = register_list.count_ones();
        let base = self.reg(rb);
        let base_listed = register_list.get_bit(rb);

        match load_store {
            LoadStoreKind::Store => {
                let written_back = base.wrapping_add(4 * count);
                let base_is_lowest = register_list.trailing_zeros() == u32::from(rb);
                let mut address = base;
                for r in (0..8).filter(|&r| register_list.get_bit(r)) {
                    let value = if r != rb {
                        self.reg(r)
                    } else if base_is_lowest {
                        base
                    } else {
                        written_back
                    };
                    self.memory.write::<u32>(address, value)?;
                    address = address.wrapping_add(4);
                }
                self.set_reg(rb, written_back);
                self.add_cycles(u64::from(count));
            }
            LoadStoreKind::Load => {
                let mut values = [0; 8];
                let mut address = base;
                for r in (0..8).rev().filter(|&r| register_list.get_bit(r)) {
                    values[usize::from(r)] = self.memory.read::<u32>(address)?;
                    address = address.wrapping_sub(4);
                }
                for r in (0..8).filter(|&r| register_list.get_bit(r)) {
                    self.set_reg(r, values[usize::from(r)]);
                }
                if !base_listed {
                    self.set_reg(rb, address);
                }
                self.add_cycles(1 + u64::from(count));
            }
        }
        Ok(Flow::Continue)
    }

    fn cond_branch(&self, condition: Condition, offset: i32) -> Flow {
        if self.registers.cpsr().can_execute(condition) {
            Flow::Branch {
                target: self.registers.program_counter().wrapping_add_signed(offset),
                state: CpuState::Thumb,
            }
        } else {
            Flow::Continue
        }
    }

    /// First half of `BL`/`BLX`. When the suffix is already waiting in `nir`
    /// the pair runs as one instruction.
    fn long_branch_prefix(&mut self, offset_high: i32) -> Flow {
        let pc = self.registers.program_counter();
        let v5 = self.config.version.has_v5_extensions();

        let next = match self.pipeline.nir {
            Slot::Fetched(word) => Instruction::from(word as u16),
            Slot::Aborted(_) => Instruction::Undefined,
        };
        match next {
            Instruction::LongBranchSuffix {
                offset_low,
                exchange,
            } if !exchange || v5 => {
                let target = pc
                    .wrapping_add_signed(offset_high)
                    .wrapping_add(offset_low);
                self.registers.set_link_register(pc | 1);
                self.add_cycles(1);
                return Self::link_target(target, exchange);
            }
            _ => {}
        }

        self.registers
            .set_link_register(pc.wrapping_add_signed(offset_high));
        Flow::Continue
    }

    /// Second half of `BL`/`BLX` reached on its own, with the upper offset
    /// already in LR.
    fn long_branch_suffix(&mut self, offset_low: u32, exchange: bool) -> Flow {
        let target = self.registers.link_register().wrapping_add(offset_low);
        let next = self
            .registers
            .program_counter()
            .wrapping_sub(SIZE_OF_INSTRUCTION);
        self.registers.set_link_register(next | 1);
        Self::link_target(target, exchange)
    }

    const fn link_target(target: u32, exchange: bool) -> Flow {
        if exchange {
            Flow::Branch {
                target: target & !3,
                state: CpuState::Arm,
            }
        } else {
            Flow::Branch {
                target: target & !1,
                state: CpuState::Thumb,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::cpu_modes::Mode;
    use crate::cpu::thumb::encode;
    use crate::cpu::version::{CoreConfig, CoreVersion, FaultPolicy};
    use crate::error::EmuError;
    use crate::memory::MemoryRange;
    use pretty_assertions::assert_eq;

    const ROM: u32 = 0x0800_0000;
    const RAM: u32 = 0x0300_0000;
    const STACK_TOP: u32 = RAM + 0x1000;

    fn cpu_with(program: &[u16], config: CoreConfig) -> Arm7tdmi {
        let mut cpu = Arm7tdmi::with_config(
            vec![
                MemoryRange::read_only("vectors", 0, 0x20),
                MemoryRange::read_only("rom", ROM, 0x1000).with_image(encode::assemble(program)),
                MemoryRange::read_write("ram", RAM, 0x1000),
            ],
            ROM | 1,
            Mode::User,
            config,
        )
        .unwrap();
        cpu.registers_mut().set_stack_pointer(STACK_TOP);
        cpu
    }

    fn v4(program: &[u16]) -> Arm7tdmi {
        cpu_with(program, CoreConfig::default())
    }

    fn v5(program: &[u16]) -> Arm7tdmi {
        cpu_with(
            program,
            CoreConfig::default().with_version(CoreVersion::Arm9),
        )
    }

    fn run(cpu: &mut Arm7tdmi, steps: usize) {
        for _ in 0..steps {
            assert!(cpu.step().unwrap());
        }
    }

    fn reg(cpu: &Arm7tdmi, r: usize) -> u32 {
        cpu.registers().register_at(r)
    }

    #[test]
    fn mov_immediate_keeps_carry_and_overflow() {
        let mut cpu = v4(&[encode::mov_imm(0, 0)]);
        cpu.registers_mut().cpsr_mut().set_carry_flag(true);
        cpu.registers_mut().cpsr_mut().set_overflow_flag(true);
        cpu.registers_mut().set_register_at(0, 7);
        run(&mut cpu, 1);

        assert_eq!(reg(&cpu, 0), 0);
        assert!(cpu.cpsr().zero_flag());
        assert!(cpu.cpsr().carry_flag());
        assert!(cpu.cpsr().overflow_flag());
    }

    #[test]
    fn shift_immediate_carry_out() {
        let mut cpu = v4(&[
            encode::asr_imm(3, 1, 4),
            encode::lsl_imm(0, 1, 1),
            encode::lsl_imm(4, 1, 0),
        ]);
        cpu.registers_mut().set_register_at(1, 0x8000_0001);

        run(&mut cpu, 1);
        assert_eq!(reg(&cpu, 3), 0xF800_0000);
        assert!(!cpu.cpsr().carry_flag());

        run(&mut cpu, 1);
        assert_eq!(reg(&cpu, 0), 2);
        assert!(cpu.cpsr().carry_flag());

        run(&mut cpu, 1);
        assert_eq!(reg(&cpu, 4), 0x8000_0001);
        assert!(cpu.cpsr().carry_flag());
        assert!(cpu.cpsr().sign_flag());
        assert_eq!(cpu.cycles(), 3);
    }

    #[test]
    fn arithmetic_sequence() {
        let mut cpu = v4(&[
            encode::add_imm3(0, 0, 5),
            encode::add_imm(1, 9),
            encode::lsl_imm(2, 0, 2),
            encode::mov_imm(3, 1),
            encode::add_reg(4, 3, 2),
            encode::sub_reg(4, 4, 0),
        ]);
        run(&mut cpu, 6);

        assert_eq!(reg(&cpu, 0), 5);
        assert_eq!(reg(&cpu, 1), 9);
        assert_eq!(reg(&cpu, 2), 20);
        assert_eq!(reg(&cpu, 4), 16);
        assert!(!cpu.cpsr().zero_flag());
        assert!(!cpu.cpsr().sign_flag());
        // 21 - 5 does not borrow
        assert!(cpu.cpsr().carry_flag());
    }

    #[test]
    fn compare_immediate_only_sets_flags() {
        let mut cpu = v4(&[encode::mov_imm(0, 3), encode::cmp_imm(0, 5)]);
        run(&mut cpu, 2);
        assert_eq!(reg(&cpu, 0), 3);
        assert!(cpu.cpsr().sign_flag());
        assert!(!cpu.cpsr().carry_flag());
        assert!(!cpu.cpsr().zero_flag());
    }

    #[test]
    fn logical_register_operations() {
        use ThumbModeAluInstruction::{And, Bic, Eor, Mvn, Orr, Tst};
        let mut cpu = v4(&[
            encode::alu(And, 0, 1),
            encode::alu(Eor, 2, 1),
            encode::alu(Orr, 3, 1),
            encode::alu(Bic, 4, 1),
            encode::alu(Mvn, 5, 1),
            encode::alu(Tst, 6, 1),
        ]);
        for r in [0, 2, 3, 4] {
            cpu.registers_mut().set_register_at(r, 0xFF00_FF00);
        }
        cpu.registers_mut().set_register_at(1, 0x0F0F_0F0F);
        cpu.registers_mut().set_register_at(6, 0xF0F0_F0F0);
        run(&mut cpu, 6);

        assert_eq!(reg(&cpu, 0), 0x0F00_0F00);
        assert_eq!(reg(&cpu, 2), 0xF00F_F00F);
        assert_eq!(reg(&cpu, 3), 0xFF0F_FF0F);
        assert_eq!(reg(&cpu, 4), 0xF000_F000);
        assert_eq!(reg(&cpu, 5), 0xF0F0_F0F0);
        assert_eq!(reg(&cpu, 6), 0xF0F0_F0F0);
        assert!(cpu.cpsr().zero_flag());
        assert_eq!(cpu.cycles(), 6);
    }

    #[test]
    fn register_shifts_cost_an_extra_cycle() {
        use ThumbModeAluInstruction::{Lsl, Lsr, Ror};
        let mut cpu = v4(&[
            encode::alu(Lsl, 0, 1),
            encode::alu(Lsr, 2, 3),
            encode::alu(Ror, 4, 5),
        ]);
        cpu.registers_mut().set_register_at(0, 0x0000_0001);
        cpu.registers_mut().set_register_at(1, 32);
        cpu.registers_mut().set_register_at(2, 0x8000_0000);
        cpu.registers_mut().set_register_at(3, 0x121);
        cpu.registers_mut().set_register_at(4, 0x0000_00F1);
        cpu.registers_mut().set_register_at(5, 4);

        run(&mut cpu, 1);
        assert_eq!(reg(&cpu, 0), 0);
        assert!(cpu.cpsr().carry_flag());
        assert!(cpu.cpsr().zero_flag());
        assert_eq!(cpu.cycles(), 2);

        // only the low byte counts: 0x21 = 33
        run(&mut cpu, 1);
        assert_eq!(reg(&cpu, 2), 0);
        assert!(!cpu.cpsr().carry_flag());

        run(&mut cpu, 1);
        assert_eq!(reg(&cpu, 4), 0x1000_000F);
        assert!(!cpu.cpsr().carry_flag());
        assert_eq!(cpu.cycles(), 6);
    }

    #[test]
    fn carry_using_operations() {
        use ThumbModeAluInstruction::{Adc, Cmn, Neg, Sbc};
        let mut cpu = v4(&[
            encode::alu(Adc, 0, 1),
            encode::alu(Sbc, 2, 3),
            encode::alu(Neg, 4, 5),
            encode::alu(Cmn, 6, 7),
        ]);
        cpu.registers_mut().cpsr_mut().set_carry_flag(true);
        cpu.registers_mut().set_register_at(0, 10);
        cpu.registers_mut().set_register_at(1, 20);
        cpu.registers_mut().set_register_at(2, 10);
        cpu.registers_mut().set_register_at(3, 3);
        cpu.registers_mut().set_register_at(5, 1);
        cpu.registers_mut().set_register_at(6, 0xFFFF_FFFF);
        cpu.registers_mut().set_register_at(7, 1);

        run(&mut cpu, 1);
        assert_eq!(reg(&cpu, 0), 31);
        assert!(!cpu.cpsr().carry_flag());

        // carry clear: 10 - 3 - 1
        run(&mut cpu, 1);
        assert_eq!(reg(&cpu, 2), 6);
        assert!(cpu.cpsr().carry_flag());

        run(&mut cpu, 1);
        assert_eq!(reg(&cpu, 4), 0xFFFF_FFFF);
        assert!(cpu.cpsr().sign_flag());

        run(&mut cpu, 1);
        assert_eq!(reg(&cpu, 6), 0xFFFF_FFFF);
        assert!(cpu.cpsr().zero_flag());
        assert!(cpu.cpsr().carry_flag());
    }

    #[test]
    fn multiply_timing_and_carry_depend_on_version() {
        let program = [encode::alu(ThumbModeAluInstruction::Mul, 0, 1)];
        for (mut cpu, cycles, carry) in [(v4(&program), 3, false), (v5(&program), 4, true)] {
            cpu.registers_mut().cpsr_mut().set_carry_flag(true);
            cpu.registers_mut().set_register_at(0, 0x1234);
            cpu.registers_mut().set_register_at(1, 3);
            run(&mut cpu, 1);

            assert_eq!(reg(&cpu, 0), 0x369C);
            assert_eq!(cpu.cycles(), cycles);
            assert_eq!(cpu.cpsr().carry_flag(), carry);
        }
    }

    #[test]
    fn high_register_moves_and_compare() {
        use ThumbHighRegisterOperation::{Add, Cmp, Mov};
        let mut cpu = v4(&[
            encode::hi(Mov, 8, 0),
            encode::hi(Add, 8, 1),
            encode::hi(Cmp, 8, 9),
            encode::hi(Mov, 2, 15),
        ]);
        cpu.registers_mut().cpsr_mut().set_zero_flag(true);
        cpu.registers_mut().set_register_at(0, 40);
        cpu.registers_mut().set_register_at(1, 2);
        cpu.registers_mut().set_register_at(9, 50);

        run(&mut cpu, 2);
        assert_eq!(reg(&cpu, 8), 42);
        assert!(cpu.cpsr().zero_flag());

        run(&mut cpu, 2);
        assert!(cpu.cpsr().sign_flag());
        assert!(!cpu.cpsr().zero_flag());
        // the fourth instruction sits at ROM + 6
        assert_eq!(reg(&cpu, 2), ROM + 10);
    }

    #[test]
    fn low_register_form_of_high_operations_is_undefined() {
        let mut cpu = v4(&[0x4408]);
        run(&mut cpu, 1);
        assert_eq!(cpu.cpsr().mode(), Mode::Undefined);
        assert_eq!(cpu.current_instruction_address(), 0x04);
        assert_eq!(cpu.registers().link_register(), ROM + 2);
    }

    #[test]
    fn mov_to_pc_branches_and_stays_in_thumb_on_v4() {
        let mut cpu = v4(&[encode::hi(ThumbHighRegisterOperation::Mov, 15, 0)]);
        cpu.registers_mut().set_register_at(0, ROM + 0x40);
        run(&mut cpu, 1);
        assert_eq!(cpu.cpsr().cpu_state(), CpuState::Thumb);
        assert_eq!(cpu.current_instruction_address(), ROM + 0x40);
        assert_eq!(cpu.cycles(), 3);

        let mut cpu = v5(&[encode::hi(ThumbHighRegisterOperation::Mov, 15, 0)]);
        cpu.registers_mut().set_register_at(0, ROM + 0x40);
        run(&mut cpu, 1);
        assert_eq!(cpu.cpsr().cpu_state(), CpuState::Arm);
    }

    #[test]
    fn bx_selects_state_from_bit_zero() {
        let mut cpu = v4(&[encode::bx(3)]);
        cpu.registers_mut().set_register_at(3, (ROM + 0x21) | 1);
        run(&mut cpu, 1);
        assert_eq!(cpu.cpsr().cpu_state(), CpuState::Thumb);
        assert_eq!(cpu.current_instruction_address(), ROM + 0x20);
        assert_eq!(cpu.cycles(), 3);
    }

    #[test]
    fn blx_register_links_on_v5_only() {
        let mut cpu = v5(&[encode::mov_imm(0, 0), encode::blx_reg(1)]);
        cpu.registers_mut().set_register_at(1, ROM + 0x81);
        run(&mut cpu, 2);
        assert_eq!(cpu.registers().link_register(), (ROM + 4) | 1);
        assert_eq!(cpu.current_instruction_address(), ROM + 0x80);
        assert_eq!(cpu.cpsr().cpu_state(), CpuState::Thumb);

        let mut cpu = v4(&[encode::blx_reg(1)]);
        run(&mut cpu, 1);
        assert_eq!(cpu.cpsr().mode(), Mode::Undefined);
    }

    #[test]
    fn pc_relative_load_aligns_pc() {
        let mut cpu = v4(&[
            encode::mov_imm(1, 0),
            encode::ldr_pc(0, 4),
            0,
            0,
            0x5678,
            0x1234,
        ]);
        run(&mut cpu, 2);
        // (ROM + 2 + 4) & !3 = ROM + 4, plus 4
        assert_eq!(reg(&cpu, 0), 0x1234_5678);
        assert_eq!(cpu.cycles(), 1 + 3);
    }

    #[test]
    fn loads_cost_three_cycles_and_stores_two() {
        let mut cpu = v4(&[
            encode::str_imm(0, 1, 4),
            encode::ldr_imm(2, 1, 4),
            encode::strb_imm(0, 1, 9),
            encode::ldrb_imm(3, 1, 9),
            encode::strh_imm(0, 1, 12),
            encode::ldrh_imm(4, 1, 12),
        ]);
        cpu.registers_mut().set_register_at(0, 0xCAFE_BABE);
        cpu.registers_mut().set_register_at(1, RAM);

        run(&mut cpu, 2);
        assert_eq!(reg(&cpu, 2), 0xCAFE_BABE);
        assert_eq!(cpu.cycles(), 5);
        assert_eq!(cpu.memory().read::<u32>(RAM + 4), Ok(0xCAFE_BABE));

        run(&mut cpu, 4);
        assert_eq!(reg(&cpu, 3), 0xBE);
        assert_eq!(reg(&cpu, 4), 0xBABE);
        assert_eq!(cpu.cycles(), 15);
    }

    #[test]
    fn register_offset_and_sign_extension() {
        let mut cpu = v4(&[
            encode::strb_reg(0, 1, 2),
            encode::ldsb_reg(3, 1, 2),
            encode::ldrb_reg(4, 1, 2),
            encode::strh_reg(0, 1, 5),
            encode::ldsh_reg(6, 1, 5),
            encode::ldrh_reg(7, 1, 5),
            encode::str_reg(0, 1, 5),
            encode::ldr_reg(7, 1, 5),
        ]);
        cpu.registers_mut().set_register_at(0, 0x0000_8080);
        cpu.registers_mut().set_register_at(1, RAM);
        cpu.registers_mut().set_register_at(2, 0x11);
        cpu.registers_mut().set_register_at(5, 0x20);

        run(&mut cpu, 3);
        assert_eq!(reg(&cpu, 3), 0xFFFF_FF80);
        assert_eq!(reg(&cpu, 4), 0x80);

        run(&mut cpu, 3);
        assert_eq!(reg(&cpu, 6), 0xFFFF_8080);
        assert_eq!(reg(&cpu, 7), 0x8080);

        run(&mut cpu, 2);
        assert_eq!(reg(&cpu, 7), 0x0000_8080);
        assert_eq!(cpu.memory().read::<u32>(RAM + 0x20), Ok(0x8080));
    }

    #[test]
    fn stack_relative_access_and_address_generation() {
        let mut cpu = v4(&[
            encode::adjust_sp(-8),
            encode::str_sp(0, 4),
            encode::ldr_sp(1, 4),
            encode::add_sp(2, 4),
            encode::add_pc(3, 8),
            encode::adjust_sp(8),
        ]);
        cpu.registers_mut().set_register_at(0, 77);

        run(&mut cpu, 1);
        assert_eq!(cpu.registers().stack_pointer(), STACK_TOP - 8);

        run(&mut cpu, 4);
        assert_eq!(reg(&cpu, 1), 77);
        assert_eq!(reg(&cpu, 2), STACK_TOP - 4);
        // at ROM + 8, PC reads ROM + 12
        assert_eq!(reg(&cpu, 3), ROM + 20);

        run(&mut cpu, 1);
        assert_eq!(cpu.registers().stack_pointer(), STACK_TOP);
    }

    #[test]
    fn push_pop_restores_registers_and_stack() {
        let mut cpu = v4(&[encode::push(0xFF, true), encode::pop(0xFF, false)]);
        for r in 0..8 {
            cpu.registers_mut().set_register_at(r, 0x100 + r as u32);
        }
        cpu.registers_mut().set_link_register(0xAAAA_AAAA);

        run(&mut cpu, 1);
        assert_eq!(cpu.registers().stack_pointer(), STACK_TOP - 36);
        assert_eq!(cpu.memory().read::<u32>(STACK_TOP - 36), Ok(0x100));
        assert_eq!(cpu.memory().read::<u32>(STACK_TOP - 4), Ok(0xAAAA_AAAA));
        assert_eq!(cpu.cycles(), 10);

        for r in 0..8 {
            cpu.registers_mut().set_register_at(r, 0);
        }
        run(&mut cpu, 1);
        for r in 0..8 {
            assert_eq!(reg(&cpu, r), 0x100 + r as u32);
        }
        assert_eq!(cpu.registers().stack_pointer(), STACK_TOP - 4);
        assert_eq!(cpu.cycles(), 10 + 9);
    }

    #[test]
    fn pop_pc_interworks_on_v5_only() {
        for (mut cpu, state) in [
            (v4(&[encode::pop(0, true)]), CpuState::Thumb),
            (v5(&[encode::pop(0, true)]), CpuState::Arm),
        ] {
            cpu.memory_mut()
                .write::<u32>(STACK_TOP - 4, ROM + 0x100)
                .unwrap();
            cpu.registers_mut().set_stack_pointer(STACK_TOP - 4);
            run(&mut cpu, 1);

            assert_eq!(cpu.cpsr().cpu_state(), state);
            assert_eq!(cpu.registers().stack_pointer(), STACK_TOP);
            // 1 + 1 register + refill
            assert_eq!(cpu.cycles(), 4);
        }
    }

    #[test]
    fn stmia_ldmia_write_back() {
        let mut cpu = v4(&[encode::stmia(0, 0b0000_1110), encode::ldmia(4, 0b1110_0000)]);
        cpu.registers_mut().set_register_at(0, RAM);
        cpu.registers_mut().set_register_at(1, 1);
        cpu.registers_mut().set_register_at(2, 2);
        cpu.registers_mut().set_register_at(3, 3);
        cpu.registers_mut().set_register_at(4, RAM + 8);

        run(&mut cpu, 1);
        assert_eq!(reg(&cpu, 0), RAM + 12);
        assert_eq!(cpu.memory().read::<u32>(RAM + 8), Ok(3));
        assert_eq!(cpu.cycles(), 4);

        // r7 from the base, then r6 and r5 below it
        run(&mut cpu, 1);
        assert_eq!((reg(&cpu, 5), reg(&cpu, 6), reg(&cpu, 7)), (1, 2, 3));
        assert_eq!(reg(&cpu, 4), RAM.wrapping_sub(4));
        assert_eq!(cpu.cycles(), 4 + 5);
    }

    #[test]
    fn ldmia_walks_high_to_low() {
        let mut cpu = v4(&[encode::ldmia(4, 0b1110_0000)]);
        for (offset, value) in (0x08..=0x18).step_by(4).zip(0x8..=0xC) {
            cpu.memory_mut().write::<u32>(RAM + offset, value).unwrap();
        }
        cpu.registers_mut().set_register_at(4, RAM + 0x10);

        run(&mut cpu, 1);
        assert_eq!((reg(&cpu, 5), reg(&cpu, 6), reg(&cpu, 7)), (0x8, 0x9, 0xA));
        assert_eq!(reg(&cpu, 4), RAM + 0x04);
        assert_eq!(cpu.cycles(), 1 + 2 + 3);
    }

    #[test]
    fn block_transfer_of_the_base_register() {
        let mut cpu = v4(&[
            encode::stmia(1, 0b0000_0110),
            encode::stmia(2, 0b0000_0110),
            encode::ldmia(3, 0b0000_1001),
        ]);
        cpu.registers_mut().set_register_at(1, RAM);
        cpu.registers_mut().set_register_at(2, RAM + 0x10);
        cpu.registers_mut().set_register_at(3, RAM + 4);

        // lowest listed: old base is stored
        run(&mut cpu, 1);
        assert_eq!(cpu.memory().read::<u32>(RAM), Ok(RAM));

        // not lowest: written-back base is stored
        cpu.registers_mut().set_register_at(1, 0x11);
        run(&mut cpu, 1);
        assert_eq!(cpu.memory().read::<u32>(RAM + 0x14), Ok(RAM + 0x18));

        // r3 loads from the base, r0 from below it; no writeback
        run(&mut cpu, 1);
        assert_eq!(reg(&cpu, 0), RAM);
        assert_eq!(reg(&cpu, 3), RAM + 0x10);
    }

    #[test]
    fn empty_register_list_transfers_nothing() {
        let mut cpu = v4(&[encode::stmia(0, 0), encode::ldmia(0, 0)]);
        cpu.registers_mut().set_register_at(0, RAM);
        run(&mut cpu, 2);
        assert_eq!(reg(&cpu, 0), RAM);
        assert_eq!(cpu.memory().read::<u32>(RAM), Ok(0));
    }

    #[test]
    fn conditional_branch_taken_and_not_taken() {
        let mut cpu = v4(&[
            encode::cmp_imm(0, 0),
            encode::b_cond(Condition::NE, 16),
            encode::b_cond(Condition::EQ, -6),
        ]);
        run(&mut cpu, 2);
        assert_eq!(cpu.cycles(), 2);
        assert_eq!(cpu.current_instruction_address(), ROM + 4);

        run(&mut cpu, 1);
        assert_eq!(cpu.current_instruction_address(), ROM + 2);
        assert_eq!(cpu.cycles(), 2 + 3);
    }

    #[test]
    fn reserved_condition_is_undefined() {
        let mut cpu = v4(&[0xDE00]);
        run(&mut cpu, 1);
        assert_eq!(cpu.cpsr().mode(), Mode::Undefined);
    }

    #[test]
    fn branch_with_link_round_trips_both_directions() {
        for offset in [1000, -1000] {
            let mut program = vec![encode::mov_imm(0, 0); 600];
            let [prefix, suffix] = encode::bl(offset);
            program[500] = prefix;
            program[501] = suffix;
            let mut cpu = v4(&program);
            cpu.registers_mut().set_program_counter(ROM + 1000);
            cpu.flush_pipeline();

            run(&mut cpu, 1);
            let expected = (ROM + 1004).wrapping_add_signed(offset);
            assert_eq!(cpu.current_instruction_address(), expected);
            assert_eq!(cpu.registers().link_register(), (ROM + 1004) | 1);
            assert_eq!(cpu.cycles(), 4);
            assert_eq!(cpu.instructions_executed(), 1);
        }
    }

    #[test]
    fn branch_with_link_halves_run_separately() {
        let [prefix, suffix] = encode::bl(0x40);
        let mut cpu = v4(&[prefix, encode::mov_imm(0, 9), suffix]);

        run(&mut cpu, 2);
        assert_eq!(cpu.registers().link_register(), ROM + 4);
        assert_eq!(reg(&cpu, 0), 9);

        run(&mut cpu, 1);
        assert_eq!(cpu.current_instruction_address(), ROM + 4 + 0x40);
        assert_eq!(cpu.registers().link_register(), (ROM + 6) | 1);
    }

    #[test]
    fn blx_immediate_switches_to_arm_on_v5() {
        let [prefix, suffix] = encode::blx(0x104);
        assert_eq!(suffix & 1, 0);
        let mut cpu = v5(&[prefix, suffix]);
        run(&mut cpu, 1);
        assert_eq!(cpu.cpsr().cpu_state(), CpuState::Arm);
        assert_eq!(cpu.current_instruction_address(), ROM + 0x108);
        assert_eq!(cpu.registers().link_register(), (ROM + 4) | 1);

        let mut cpu = v4(&[prefix, suffix]);
        run(&mut cpu, 2);
        assert_eq!(cpu.cpsr().mode(), Mode::Undefined);
    }

    #[test]
    fn software_interrupt_entry_and_return() {
        let mut cpu = v4(&[encode::swi(0x12), encode::mov_imm(5, 5)]);
        cpu.registers_mut().cpsr_mut().set_irq_disable(false);
        let user_cpsr = cpu.cpsr();

        run(&mut cpu, 1);
        let cpsr = cpu.cpsr();
        assert_eq!(cpsr.mode(), Mode::Supervisor);
        assert_eq!(cpsr.cpu_state(), CpuState::Arm);
        assert!(cpsr.irq_disable());
        assert_eq!(cpu.registers().spsr(), Some(user_cpsr));
        assert_eq!(cpu.current_instruction_address(), 0x08);
        assert_eq!(cpu.registers().link_register(), ROM + 2);
        assert_eq!(cpu.cycles(), 3);

        cpu.return_from_exception(Exception::SoftwareInterrupt)
            .unwrap();
        assert_eq!(cpu.cpsr(), user_cpsr);
        run(&mut cpu, 1);
        assert_eq!(reg(&cpu, 5), 5);
    }

    #[test]
    fn breakpoint_depends_on_version() {
        let mut cpu = v5(&[encode::bkpt(1)]);
        run(&mut cpu, 1);
        assert_eq!(cpu.cpsr().mode(), Mode::Abort);
        assert_eq!(cpu.current_instruction_address(), 0x0C);

        let mut cpu = v4(&[encode::bkpt(1)]);
        run(&mut cpu, 1);
        assert_eq!(cpu.cpsr().mode(), Mode::Undefined);
    }

    #[test]
    fn store_to_read_only_memory() {
        let program = [encode::str_imm(0, 1, 0), encode::ldr_imm(2, 1, 0)];

        let mut cpu = v4(&program);
        cpu.registers_mut().set_register_at(1, ROM);
        assert!(matches!(
            cpu.step(),
            Err(EmuError::Memory(MemoryError::ReadOnly { address: ROM, .. }))
        ));

        let mut cpu = cpu_with(
            &program,
            CoreConfig::default().with_fault_policy(FaultPolicy::RaiseAbort),
        );
        cpu.registers_mut().set_register_at(1, ROM);
        run(&mut cpu, 1);
        assert_eq!(cpu.cpsr().mode(), Mode::Abort);
        assert_eq!(cpu.current_instruction_address(), 0x10);
        assert_eq!(cpu.registers().link_register(), ROM + 8);
    }

    #[test]
    fn reads_from_read_only_memory_succeed() {
        let mut cpu = v4(&[encode::ldr_imm(2, 1, 0)]);
        cpu.registers_mut().set_register_at(1, ROM);
        run(&mut cpu, 1);
        assert_eq!(reg(&cpu, 2), u32::from(encode::ldr_imm(2, 1, 0)));
    }
}
