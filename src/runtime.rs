use std::fmt;

use crate::{
    error::FaultReason,
    isa::{Instr, Word, MEMORY_SIZE},
    output::{NullSink, TraceSink},
    state::RunState,
    symbol::Register,
};

/// Where a run currently stands. `Halted` and `Faulted` are terminal.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Status {
    Running,
    Halted,
    Faulted(FaultReason),
}

/// Terminal result of [`Engine::run`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ExecutionOutcome {
    Halted,
    Faulted(FaultReason),
}

/// One executed instruction, as reported to the trace sink.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct TraceEvent {
    /// 1-based count of executed instructions
    pub step: u64,
    pub pc: Word,
    pub word: Word,
    pub instr: Instr,
    pub effect: Effect,
}

/// State change caused by a single instruction.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Effect {
    Register { reg: Register, before: i32, after: i32 },
    Memory { addr: Word, before: Word, after: Word },
    /// Taken jump
    Jump { target: Word },
    /// Conditional jump that fell through
    NotTaken,
    Halt,
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Effect::Register { reg, before, after } => write!(f, "{reg} = {after} (was {before})"),
            Effect::Memory { addr, before, after } => {
                write!(f, "mem[{addr}] = {after} (was {before})")
            }
            Effect::Jump { target } => write!(f, "jump to {target}"),
            Effect::NotTaken => write!(f, "fall through"),
            Effect::Halt => write!(f, "halt"),
        }
    }
}

/// Fetch-decode-execute loop over a [`RunState`] it owns exclusively.
pub struct Engine<S = NullSink> {
    state: RunState,
    status: Status,
    /// Maximum number of instructions to execute, if any
    budget: Option<u64>,
    /// Instructions executed so far
    steps: u64,
    sink: S,
}

impl Engine {
    /// Load `program` at address 0 of a fresh machine. A program that does not fit in memory
    /// leaves the engine faulted before its first step.
    pub fn new(program: Vec<Word>, step_budget: Option<u64>) -> Self {
        let mut state = RunState::new();
        let status = match state.load_program(&program) {
            Ok(()) => Status::Running,
            Err(e) => Status::Faulted(e.into()),
        };
        Engine {
            state,
            status,
            budget: step_budget,
            steps: 0,
            sink: NullSink,
        }
    }

    /// Run against prepared state, starting from its current PC.
    pub fn from_state(state: RunState, step_budget: Option<u64>) -> Self {
        Engine {
            state,
            status: Status::Running,
            budget: step_budget,
            steps: 0,
            sink: NullSink,
        }
    }
}

impl<S: TraceSink> Engine<S> {
    /// Replace the diagnostics sink.
    pub fn with_sink<T: TraceSink>(self, sink: T) -> Engine<T> {
        Engine {
            state: self.state,
            status: self.status,
            budget: self.budget,
            steps: self.steps,
            sink,
        }
    }

    /// Step until the machine halts or faults.
    pub fn run(&mut self) -> ExecutionOutcome {
        loop {
            match self.step() {
                Status::Running => continue,
                Status::Halted => return ExecutionOutcome::Halted,
                Status::Faulted(reason) => return ExecutionOutcome::Faulted(reason),
            }
        }
    }

    /// Execute a single instruction. Does nothing once a terminal state is reached.
    pub fn step(&mut self) -> Status {
        if self.status != Status::Running {
            return self.status;
        }
        if let Some(budget) = self.budget {
            if self.steps >= budget {
                return self.fault(FaultReason::StepBudgetExceeded { budget });
            }
        }

        let pc = self.state.pc();
        let (word, instr, effect) = match self.execute(pc) {
            Ok(executed) => executed,
            Err(reason) => return self.fault(reason),
        };
        self.steps += 1;
        self.sink.instruction(&TraceEvent {
            step: self.steps,
            pc,
            word,
            instr,
            effect,
        });

        match effect {
            Effect::Halt => self.status = Status::Halted,
            // Taken jumps do not auto-increment
            Effect::Jump { target } => self.state.set_pc(target),
            _ if pc as usize + 1 >= MEMORY_SIZE => {
                return self.fault(FaultReason::ProgramCounterOverflow);
            }
            _ => self.state.set_pc(pc + 1),
        }
        self.status
    }

    fn fault(&mut self, reason: FaultReason) -> Status {
        self.status = Status::Faulted(reason);
        self.sink.fault(self.state.pc(), &reason);
        self.status
    }

    /// Fetch, decode and apply one instruction. Registers and memory are untouched on error.
    fn execute(&mut self, pc: Word) -> Result<(Word, Instr, Effect), FaultReason> {
        let word = self.state.read_memory(pc as usize)?;
        let instr = Instr::decode(word).map_err(|e| FaultReason::unknown_opcode(e, pc))?;

        let effect = match instr {
            Instr::Load { rd, imm } => self.set_reg(rd, imm as i32)?,
            Instr::Store { rs, addr } => {
                // Memory cells are 16 bits wide
                let val = self.state.read_register(rs.index())? as Word;
                let before = self.state.read_memory(addr as usize)?;
                self.state.write_memory(addr as usize, val)?;
                Effect::Memory {
                    addr: addr as Word,
                    before,
                    after: val,
                }
            }
            Instr::Add { rd, rs1, rs2 } => self.arith(rd, rs1, rs2, |a, b| Ok(a.wrapping_add(b)))?,
            Instr::Sub { rd, rs1, rs2 } => self.arith(rd, rs1, rs2, |a, b| Ok(a.wrapping_sub(b)))?,
            Instr::Mul { rd, rs1, rs2 } => self.arith(rd, rs1, rs2, |a, b| Ok(a.wrapping_mul(b)))?,
            Instr::Div { rd, rs1, rs2 } => self.arith(rd, rs1, rs2, |a, b| match b {
                0 => Err(FaultReason::DivisionByZero { pc }),
                // Truncates toward zero
                _ => Ok(a.wrapping_div(b)),
            })?,
            Instr::Jmp { addr } => Effect::Jump { target: addr },
            Instr::Jmpz { rc, addr } => self.branch(rc, addr, |val| val == 0)?,
            Instr::Jmpnz { rc, addr } => self.branch(rc, addr, |val| val != 0)?,
            Instr::Halt => Effect::Halt,
        };
        Ok((word, instr, effect))
    }

    fn set_reg(&mut self, reg: Register, val: i32) -> Result<Effect, FaultReason> {
        let before = self.state.read_register(reg.index())?;
        self.state.write_register(reg.index(), val)?;
        Ok(Effect::Register {
            reg,
            before,
            after: val,
        })
    }

    fn arith(
        &mut self,
        rd: Register,
        rs1: Register,
        rs2: Register,
        op: impl FnOnce(i32, i32) -> Result<i32, FaultReason>,
    ) -> Result<Effect, FaultReason> {
        let a = self.state.read_register(rs1.index())?;
        let b = self.state.read_register(rs2.index())?;
        let val = op(a, b)?;
        self.set_reg(rd, val)
    }

    fn branch(
        &self,
        rc: Register,
        addr: u8,
        cond: impl FnOnce(i32) -> bool,
    ) -> Result<Effect, FaultReason> {
        let val = self.state.read_register(rc.index())?;
        Ok(if cond(val) {
            Effect::Jump {
                target: addr as Word,
            }
        } else {
            Effect::NotTaken
        })
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// Machine state, for post-mortem inspection.
    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn registers(&self) -> &[i32] {
        self.state.registers()
    }

    pub fn memory(&self) -> &[Word] {
        self.state.memory()
    }

    pub fn pc(&self) -> Word {
        self.state.pc()
    }

    /// Instructions executed so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn step_budget(&self) -> Option<u64> {
        self.budget
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::Instr::*;

    fn r(i: u16) -> Register {
        Register::from_nibble(i)
    }

    fn program(instrs: &[Instr]) -> Vec<Word> {
        instrs.iter().map(Instr::encode).collect()
    }

    #[test]
    fn arithmetic() {
        let mut engine = Engine::new(
            program(&[
                Load { rd: r(1), imm: 7 },
                Load { rd: r(2), imm: 3 },
                Add { rd: r(3), rs1: r(1), rs2: r(2) },
                Sub { rd: r(4), rs1: r(2), rs2: r(1) },
                Mul { rd: r(5), rs1: r(1), rs2: r(2) },
                Div { rd: r(6), rs1: r(1), rs2: r(2) },
                Div { rd: r(7), rs1: r(4), rs2: r(2) },
                Halt,
            ]),
            None,
        );
        assert_eq!(engine.run(), ExecutionOutcome::Halted);
        assert_eq!(&engine.registers()[1..8], &[7, 3, 10, -4, 21, 2, -1]);
        assert_eq!(engine.steps(), 8);
        // PC stays on the HALT
        assert_eq!(engine.pc(), 7);
    }

    #[test]
    fn division_by_zero_leaves_destination() {
        let mut engine = Engine::new(
            program(&[
                Load { rd: r(3), imm: 9 },
                Load { rd: r(1), imm: 6 },
                Div { rd: r(3), rs1: r(1), rs2: r(0) },
                Halt,
            ]),
            None,
        );
        assert_eq!(
            engine.run(),
            ExecutionOutcome::Faulted(FaultReason::DivisionByZero { pc: 2 })
        );
        assert_eq!(engine.registers()[3], 9);
        assert_eq!(engine.pc(), 2);
        assert_eq!(engine.steps(), 2);
    }

    #[test]
    fn store_truncates_to_word() {
        let mut engine = Engine::new(
            program(&[
                Load { rd: r(1), imm: 0 },
                Load { rd: r(2), imm: 1 },
                Sub { rd: r(3), rs1: r(1), rs2: r(2) },
                Store { rs: r(3), addr: 200 },
                Halt,
            ]),
            None,
        );
        assert_eq!(engine.run(), ExecutionOutcome::Halted);
        assert_eq!(engine.memory()[200], 0xFFFF);
    }

    #[test]
    fn unknown_opcode_faults() {
        let mut engine = Engine::new(vec![0x1101, 0x7000], None);
        assert_eq!(
            engine.run(),
            ExecutionOutcome::Faulted(FaultReason::UnknownOpcode { opcode: 7, pc: 1 })
        );
        assert_eq!(engine.registers()[1], 1);
    }

    #[test]
    fn jump_past_program_hits_empty_memory() {
        // Zeroed memory decodes to opcode 0000
        let mut engine = Engine::new(program(&[Jmp { addr: 2 }, Halt]), None);
        assert_eq!(
            engine.run(),
            ExecutionOutcome::Faulted(FaultReason::UnknownOpcode { opcode: 0, pc: 2 })
        );
    }

    #[test]
    fn pc_overflow() {
        let mut state = RunState::new();
        state
            .write_memory(4095, Load { rd: r(1), imm: 1 }.encode())
            .unwrap();
        state.write_memory(0, Jmp { addr: 4095 }.encode()).unwrap();
        let mut engine = Engine::from_state(state, None);
        assert_eq!(
            engine.run(),
            ExecutionOutcome::Faulted(FaultReason::ProgramCounterOverflow)
        );
        // The last instruction still executed
        assert_eq!(engine.registers()[1], 1);
        assert_eq!(engine.pc(), 4095);
    }

    #[test]
    fn jump_to_last_address_then_halt() {
        let mut state = RunState::new();
        state.write_memory(4095, Halt.encode()).unwrap();
        state.write_memory(0, Jmp { addr: 4095 }.encode()).unwrap();
        let mut engine = Engine::from_state(state, None);
        assert_eq!(engine.run(), ExecutionOutcome::Halted);
    }

    #[test]
    fn budget_counts_executed_instructions() {
        let words = program(&[Load { rd: r(1), imm: 1 }, Load { rd: r(2), imm: 2 }, Halt]);
        assert_eq!(
            Engine::new(words.clone(), Some(3)).run(),
            ExecutionOutcome::Halted
        );
        let mut engine = Engine::new(words, Some(2));
        assert_eq!(
            engine.run(),
            ExecutionOutcome::Faulted(FaultReason::StepBudgetExceeded { budget: 2 })
        );
        assert_eq!(engine.registers()[2], 2);
        assert_eq!(engine.pc(), 2);
    }

    #[test]
    fn zero_budget_runs_nothing() {
        let mut engine = Engine::new(program(&[Halt]), Some(0));
        assert_eq!(
            engine.run(),
            ExecutionOutcome::Faulted(FaultReason::StepBudgetExceeded { budget: 0 })
        );
        assert_eq!(engine.steps(), 0);
    }

    #[test]
    fn oversized_program_faults_before_running() {
        let mut engine = Engine::new(vec![0xF000; MEMORY_SIZE + 1], None);
        assert_eq!(
            engine.status(),
            Status::Faulted(FaultReason::ProgramTooLarge {
                len: MEMORY_SIZE + 1
            })
        );
        assert!(matches!(engine.run(), ExecutionOutcome::Faulted(_)));
    }

    #[test]
    fn terminal_states_are_sticky() {
        let mut engine = Engine::new(program(&[Halt, Load { rd: r(1), imm: 1 }]), None);
        assert_eq!(engine.step(), Status::Halted);
        assert_eq!(engine.step(), Status::Halted);
        assert_eq!(engine.registers()[1], 0);
        assert_eq!(engine.steps(), 1);
    }

    #[test]
    fn emits_trace_events() {
        let mut engine = Engine::new(
            program(&[
                Load { rd: r(1), imm: 4 },
                Store { rs: r(1), addr: 9 },
                Jmpz { rc: r(1), addr: 0 },
                Jmpnz { rc: r(1), addr: 4 },
                Halt,
            ]),
            None,
        )
        .with_sink(Vec::<TraceEvent>::new());
        assert_eq!(engine.run(), ExecutionOutcome::Halted);
        assert_eq!(engine.sink().len(), 5);
        let events = engine.into_sink();

        let effects: Vec<_> = events.iter().map(|e| (e.step, e.pc, e.effect)).collect();
        assert_eq!(
            effects,
            vec![
                (1, 0, Effect::Register { reg: r(1), before: 0, after: 4 }),
                (2, 1, Effect::Memory { addr: 9, before: 0, after: 4 }),
                (3, 2, Effect::NotTaken),
                (4, 3, Effect::Jump { target: 4 }),
                (5, 4, Effect::Halt),
            ]
        );
        assert_eq!(events[0].word, 0x1104);
        assert_eq!(events[0].instr, Load { rd: r(1), imm: 4 });
    }
}
