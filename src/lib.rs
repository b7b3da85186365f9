// Encoding
pub mod isa;
pub use isa::{Instr, Opcode, Word, MEMORY_SIZE};

// Assembling
mod air;
mod lexer;
mod parser;
pub use parser::{assemble, Assembler, Assembly};
pub mod symbol;

// Running
mod runtime;
pub use runtime::{Effect, Engine, ExecutionOutcome, Status, TraceEvent};
mod state;
pub use state::RunState;
pub mod output;

mod error;
pub use error::{AsmErrorKind, AssembleError, EnvError, FaultReason, ProgramError, StateError};

pub mod env;
pub mod program;

/// Amount of lines to show as context, each side of focus line (line containing span).
pub const DIAGNOSTIC_CONTEXT_LINES: usize = 3;
