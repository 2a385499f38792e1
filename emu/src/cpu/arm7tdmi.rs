//! # The core
//!
//! [`Arm7tdmi`] owns everything the interpreter touches: the banked
//! register file with its status registers, the address space, the prefetch
//! pipeline and the cycle counters. The host drives it one instruction at a
//! time with [`Arm7tdmi::step`].
//!
//! ```text
//!          ┌──────────── step ─────────────┐
//!          ▼                               │
//!   ir ─► decode ─► execute ─► Flow ──┬─ Continue ─► shift pipeline (+1 fetch)
//!                                     ├─ Branch ───► refill at target (+2 cycles)
//!                                     └─ Exception ► bank, switch mode, refill
//! ```

use serde::{Deserialize, Serialize};

use crate::cpu::cpu_modes::Mode;
use crate::cpu::exception::Exception;
use crate::cpu::pipeline::{Flow, Pipeline, Slot};
use crate::cpu::psr::{CpuState, Psr};
use crate::cpu::registers::RegisterFile;
use crate::cpu::thumb::instruction::Instruction;
use crate::cpu::version::{CoreConfig, CoreVersion, FaultPolicy};
use crate::error::{EmuError, MemoryError};
use crate::memory::{AddressSpace, MemoryRange};

pub struct Arm7tdmi {
    pub(crate) registers: RegisterFile,
    pub(crate) memory: AddressSpace,
    pub(crate) pipeline: Pipeline,
    pub(crate) config: CoreConfig,
    cycles: u64,
    instructions: u64,
}

/// Counters of one [`Arm7tdmi::run_until_halt`] call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub instructions: u64,
    pub cycles: u64,
}

impl Arm7tdmi {
    /// Builds a core with the default [`CoreConfig`].
    ///
    /// Bit 0 of `entry` selects the starting state (1 = THUMB) and is
    /// stripped from the program counter. The core starts in `mode` with IRQ
    /// and FIQ disabled and the pipeline already filled from `entry`.
    ///
    /// # Errors
    ///
    /// [`EmuError::Config`] when the ranges cannot be mapped.
    pub fn new(ranges: Vec<MemoryRange>, entry: u32, mode: Mode) -> Result<Self, EmuError> {
        Self::with_config(ranges, entry, mode, CoreConfig::default())
    }

    /// # Errors
    ///
    /// [`EmuError::Config`] when the ranges cannot be mapped.
    pub fn with_config(
        ranges: Vec<MemoryRange>,
        entry: u32,
        mode: Mode,
        config: CoreConfig,
    ) -> Result<Self, EmuError> {
        let memory = AddressSpace::new(ranges)?;

        let mut registers = RegisterFile::default();
        let cpsr = registers.cpsr_mut();
        cpsr.set_mode(mode);
        cpsr.set_cpu_state(CpuState::from(entry & 1 == 1));
        registers.set_program_counter(entry & !1);

        let mut cpu = Self {
            registers,
            memory,
            pipeline: Pipeline::default(),
            config,
            cycles: 0,
            instructions: 0,
        };
        cpu.flush_pipeline();

        tracing::debug!(
            "{} ready at 0x{:08X}, {}",
            config.version,
            cpu.current_instruction_address(),
            cpu.cpsr()
        );
        Ok(cpu)
    }

    #[must_use]
    pub const fn registers(&self) -> &RegisterFile {
        &self.registers
    }

    /// Direct register access for the host. A write to the program counter
    /// must be followed by [`flush_pipeline`](Self::flush_pipeline).
    pub const fn registers_mut(&mut self) -> &mut RegisterFile {
        &mut self.registers
    }

    #[must_use]
    pub const fn cpsr(&self) -> Psr {
        self.registers.cpsr()
    }

    #[must_use]
    pub const fn memory(&self) -> &AddressSpace {
        &self.memory
    }

    pub const fn memory_mut(&mut self) -> &mut AddressSpace {
        &mut self.memory
    }

    #[must_use]
    pub const fn config(&self) -> &CoreConfig {
        &self.config
    }

    #[must_use]
    pub const fn version(&self) -> CoreVersion {
        self.config.version
    }

    #[must_use]
    pub const fn cycles(&self) -> u64 {
        self.cycles
    }

    #[must_use]
    pub const fn instructions_executed(&self) -> u64 {
        self.instructions
    }

    pub(crate) const fn add_cycles(&mut self, cycles: u64) {
        self.cycles += cycles;
    }

    /// Address of the instruction in `ir`.
    #[must_use]
    pub fn current_instruction_address(&self) -> u32 {
        let width = self.registers.cpsr().cpu_state().instruction_width();
        self.registers.program_counter().wrapping_sub(2 * width)
    }

    /// Address and raw word of the instruction about to execute. The word is
    /// `None` if its fetch faulted.
    #[must_use]
    pub fn current_instruction(&self) -> (u32, Option<u32>) {
        (self.current_instruction_address(), self.pipeline.ir.word())
    }

    fn fetch(&self, address: u32, state: CpuState) -> Slot {
        match state {
            CpuState::Thumb => self.memory.read::<u16>(address).map(u32::from),
            CpuState::Arm => self.memory.read::<u32>(address),
        }
        .into()
    }

    fn fetch_next(&mut self) {
        let state = self.registers.cpsr().cpu_state();
        let pc = self.registers.program_counter();
        let next = self.fetch(pc, state);
        self.pipeline.advance(next);
        self.registers
            .set_program_counter(pc.wrapping_add(state.instruction_width()));
    }

    /// Discards both prefetched instructions and refetches from the program
    /// counter in the current state, aligning it first.
    pub fn flush_pipeline(&mut self) {
        let state = self.registers.cpsr().cpu_state();
        let width = state.instruction_width();
        let pc = self.registers.program_counter() & !(width - 1);

        let first = self.fetch(pc, state);
        let second = self.fetch(pc.wrapping_add(width), state);
        self.pipeline.refill(first, second);
        self.registers.set_program_counter(pc.wrapping_add(2 * width));
    }

    fn branch_to(&mut self, target: u32, state: CpuState) {
        self.registers.cpsr_mut().set_cpu_state(state);
        self.registers.set_program_counter(target);
        self.flush_pipeline();
        self.cycles += 2;
    }

    /// True when the next [`step`](Self::step) would not execute anything.
    #[must_use]
    pub fn is_halted(&self) -> bool {
        if self
            .config
            .max_instructions
            .is_some_and(|max| self.instructions >= max)
        {
            return true;
        }

        match (self.config.halt_instruction, &self.pipeline.ir) {
            (Some(halt), Slot::Fetched(word)) => {
                self.registers.cpsr().thumb() && *word == u32::from(halt)
            }
            _ => false,
        }
    }

    /// Executes one instruction.
    ///
    /// Returns `Ok(false)` without touching any state when the halt condition
    /// holds, `Ok(true)` otherwise.
    ///
    /// # Errors
    ///
    /// - [`EmuError::ArmStateUnsupported`] when the core is in ARM state.
    /// - [`EmuError::Memory`] for a faulting access under [`FaultPolicy::Halt`].
    pub fn step(&mut self) -> Result<bool, EmuError> {
        if self.is_halted() {
            return Ok(false);
        }

        let address = self.current_instruction_address();
        if !self.registers.cpsr().thumb() {
            return Err(EmuError::ArmStateUnsupported { pc: address });
        }

        let cycles = self.cycles;
        self.cycles += 1;

        let flow = match self.pipeline.ir.clone() {
            Slot::Fetched(word) => {
                let op = word as u16;
                let instruction = Instruction::from(op);
                #[cfg(feature = "disassembler")]
                tracing::trace!("{address:08X}: {op:04X}  {}", instruction.disassembler(address));
                #[cfg(not(feature = "disassembler"))]
                tracing::trace!("{address:08X}: {op:04X}  {instruction:?}");

                match self.execute_thumb(instruction) {
                    Ok(flow) => Ok(flow),
                    Err(fault) => self.memory_fault(fault, Exception::DataAbort),
                }
            }
            Slot::Aborted(fault) => self.memory_fault(fault, Exception::PrefetchAbort),
        };
        let flow = match flow {
            Ok(flow) => flow,
            Err(e) => {
                // the instruction never completed
                self.cycles = cycles;
                return Err(e);
            }
        };
        self.instructions += 1;

        match flow {
            Flow::Continue => self.fetch_next(),
            Flow::Branch { target, state } => self.branch_to(target, state),
            Flow::Exception(kind) => {
                if !self.enter_exception(kind) {
                    self.fetch_next();
                }
            }
        }
        Ok(true)
    }

    fn memory_fault(&self, fault: MemoryError, abort: Exception) -> Result<Flow, EmuError> {
        let address = self.current_instruction_address();
        match self.config.fault_policy {
            FaultPolicy::Halt => {
                tracing::error!("instruction at 0x{address:08X}: {fault}");
                Err(fault.into())
            }
            FaultPolicy::RaiseAbort => {
                tracing::warn!("instruction at 0x{address:08X}: {fault}, raising {abort:?}");
                Ok(Flow::Exception(abort))
            }
        }
    }

    /// Steps until the halt condition holds.
    ///
    /// # Errors
    ///
    /// The first error returned by [`step`](Self::step).
    pub fn run_until_halt(&mut self) -> Result<RunSummary, EmuError> {
        self.run_while(|_| true)
    }

    /// Steps while `keep_going` holds and the core is not halted.
    ///
    /// # Errors
    ///
    /// The first error returned by [`step`](Self::step).
    pub fn run_while(
        &mut self,
        mut keep_going: impl FnMut(&Self) -> bool,
    ) -> Result<RunSummary, EmuError> {
        let start = RunSummary {
            instructions: self.instructions,
            cycles: self.cycles,
        };

        while keep_going(self) && self.step()? {}

        Ok(RunSummary {
            instructions: self.instructions - start.instructions,
            cycles: self.cycles - start.cycles,
        })
    }

    /// Visible registers, then CPSR and, outside User/System, SPSR.
    #[must_use]
    pub fn dump_registers(&self) -> String {
        let mut dump = self.registers.dump();
        dump.push_str(&format!("cpsr = {}\n", Self::dump_psr(self.cpsr())));
        if let Some(spsr) = self.registers.spsr() {
            dump.push_str(&format!("spsr = {}\n", Self::dump_psr(spsr)));
        }
        dump
    }

    #[must_use]
    pub fn dump_psr(psr: Psr) -> String {
        psr.to_string()
    }
}
