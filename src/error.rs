use std::fmt;

use miette::{Diagnostic, LabeledSpan, NamedSource, SourceCode};
use thiserror::Error;

use crate::{
    isa::{UnknownOpcode, Word, MEMORY_SIZE},
    symbol::Span,
};

// Assembly errors

/// What went wrong while assembling a line.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum AsmErrorKind {
    #[error("duplicate label `{name}`, first declared at address {first}")]
    DuplicateLabel { name: String, first: Word },
    #[error("unresolved operand `{0}`")]
    UnresolvedOperand(String),
    #[error("operand `{token}` does not fit in {bits} bits")]
    OperandOutOfRange { token: String, bits: u32 },
    #[error("unknown instruction `{0}`")]
    UnknownInstruction(String),
    #[error("{mnemonic} takes {expected} operand(s), found {found}")]
    WrongOperandCount {
        mnemonic: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("expected {expected}, found `{found}`")]
    OperandKindMismatch {
        expected: &'static str,
        found: String,
    },
    #[error("invalid label name `{0}`")]
    InvalidLabel(String),
    #[error("label `{0}` follows the last addressable instruction")]
    LabelPastEnd(String),
    #[error("program has {len} instructions, memory holds {}", MEMORY_SIZE)]
    ProgramTooLarge { len: usize },
}

impl AsmErrorKind {
    fn code(&self) -> &'static str {
        match self {
            Self::DuplicateLabel { .. } => "asm::duplicate_label",
            Self::UnresolvedOperand(_) => "asm::unresolved_operand",
            Self::OperandOutOfRange { .. } => "asm::operand_range",
            Self::UnknownInstruction(_) => "asm::unknown_instr",
            Self::WrongOperandCount { .. } => "asm::operand_count",
            Self::OperandKindMismatch { .. } => "asm::operand_kind",
            Self::InvalidLabel(_) => "asm::invalid_label",
            Self::LabelPastEnd(_) => "asm::label_past_end",
            Self::ProgramTooLarge { .. } => "asm::too_large",
        }
    }

    fn help(&self) -> &'static str {
        match self {
            Self::DuplicateLabel { .. } => "labels may only be declared once per file",
            Self::UnresolvedOperand(_) => {
                "operands must be a register (R0-R15), a declared label or a decimal literal"
            }
            Self::OperandOutOfRange { .. } => {
                "immediates and STORE/JMPZ/JMPNZ addresses range 0-255, JMP addresses 0-4095"
            }
            Self::UnknownInstruction(_) => {
                "available instructions are LOAD, STORE, ADD, SUB, MUL, DIV, JMP, JMPZ, JMPNZ and HALT"
            }
            Self::WrongOperandCount { .. } => "check the number of operands for this instruction",
            Self::OperandKindMismatch { .. } => "check the type of operands allowed for this instruction",
            Self::InvalidLabel(_) => {
                "labels are identifiers made of letters, digits and `_`, and may not name a register"
            }
            Self::LabelPastEnd(_) => "label addresses must be below 4096",
            Self::ProgramTooLarge { .. } => "split the program or shorten it",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::DuplicateLabel { .. } => "duplicate label",
            Self::UnresolvedOperand(_) => "unresolved operand",
            Self::OperandOutOfRange { .. } => "out-of-range operand",
            Self::UnknownInstruction(_) => "unknown instruction",
            Self::WrongOperandCount { .. } => "this instruction",
            Self::OperandKindMismatch { .. } => "unexpected operand",
            Self::InvalidLabel(_) => "invalid label",
            Self::LabelPastEnd(_) => "would point past the end of memory",
            Self::ProgramTooLarge { .. } => "first instruction past the end of memory",
        }
    }
}

/// An assembly failure with file and line context. Rendered by miette with the offending
/// token highlighted.
#[derive(Debug)]
pub struct AssembleError {
    kind: AsmErrorKind,
    line: usize,
    span: Span,
    src: NamedSource<String>,
}

impl AssembleError {
    pub(crate) fn new(kind: AsmErrorKind, line: usize, span: Span, src: NamedSource<String>) -> Self {
        AssembleError {
            kind,
            line,
            span,
            src,
        }
    }

    pub fn kind(&self) -> &AsmErrorKind {
        &self.kind
    }

    /// 1-based source line.
    pub fn line(&self) -> usize {
        self.line
    }

    pub fn span(&self) -> Span {
        self.span
    }

    pub fn file(&self) -> &str {
        self.src.name()
    }
}

impl fmt::Display for AssembleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.file(), self.line, self.kind)
    }
}

impl std::error::Error for AssembleError {}

impl Diagnostic for AssembleError {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(self.kind.code()))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(self.kind.help()))
    }

    fn source_code(&self) -> Option<&dyn SourceCode> {
        Some(&self.src)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        Some(Box::new(std::iter::once(LabeledSpan::at(
            self.span,
            self.kind.label(),
        ))))
    }
}

// Runtime errors

/// Failure of a bounds-checked machine state access.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("register index {0} out of range")]
    InvalidRegister(usize),
    #[error("memory address {0} out of range")]
    InvalidAddress(usize),
    #[error("program of {len} words does not fit in memory")]
    ProgramTooLarge { len: usize },
}

/// Why a run stopped in the faulted state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum FaultReason {
    #[error("unknown opcode {opcode:04b} at address {pc}")]
    UnknownOpcode { opcode: u8, pc: Word },
    #[error("division by zero at address {pc}")]
    DivisionByZero { pc: Word },
    #[error("register index {0} out of range")]
    InvalidRegister(usize),
    #[error("memory address {0} out of range")]
    InvalidAddress(usize),
    #[error("program counter ran past the end of memory")]
    ProgramCounterOverflow,
    #[error("step budget of {budget} instructions exceeded")]
    StepBudgetExceeded { budget: u64 },
    #[error("program of {len} words does not fit in memory")]
    ProgramTooLarge { len: usize },
}

impl FaultReason {
    pub(crate) fn unknown_opcode(err: UnknownOpcode, pc: Word) -> Self {
        FaultReason::UnknownOpcode {
            opcode: err.opcode,
            pc,
        }
    }
}

impl From<StateError> for FaultReason {
    fn from(value: StateError) -> Self {
        match value {
            StateError::InvalidRegister(i) => FaultReason::InvalidRegister(i),
            StateError::InvalidAddress(a) => FaultReason::InvalidAddress(a),
            StateError::ProgramTooLarge { len } => FaultReason::ProgramTooLarge { len },
        }
    }
}

// Configuration errors

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum EnvError {
    #[error("HUOBZ_STEP_BUDGET must be a non-negative integer, found `{0}`")]
    InvalidStepBudget(String),
}

// Encoded program errors

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ProgramError {
    #[error("line {line}: expected 16 binary digits, found `{text}`")]
    MalformedLine { line: usize, text: String },
    #[error("packed program is {0} bytes, not a whole number of 16-bit words")]
    Misaligned(usize),
    #[error("program of {len} words does not fit in memory")]
    TooLarge { len: usize },
}
