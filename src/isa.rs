//! Instruction codec.
//!
//! Every instruction is one 16-bit [`Word`]. The top 4 bits select the opcode, the remaining
//! 12 bits are an operand field whose layout depends on the opcode:
//!
//! ```text
//!  15    12 11     8 7      4 3      0
//! +--------+--------+--------+--------+
//! | opcode |   rd   |    imm / addr   |   LOAD, STORE, JMPZ, JMPNZ
//! | opcode |   rd   |  rs1   |  rs2   |   ADD, SUB, MUL, DIV
//! | opcode |           addr           |   JMP
//! | opcode |         (unused)         |   HALT
//! +--------+--------+--------+--------+
//! ```

use std::fmt;

use crate::symbol::Register;

/// A single encoded instruction or memory cell.
pub type Word = u16;

/// Number of addressable words. Matches the 12-bit `JMP` address field exactly.
pub const MEMORY_SIZE: usize = 1 << ADDR_BITS;

pub const OPCODE_BITS: u32 = 4;
pub const REG_BITS: u32 = 4;
pub const IMM_BITS: u32 = 8;
pub const SHORT_ADDR_BITS: u32 = 8;
pub const ADDR_BITS: u32 = 12;

const OPERAND_BITS: u32 = Word::BITS - OPCODE_BITS;

pub const fn bitmask(bits: u32) -> Word {
    ((1u32 << bits) - 1) as Word
}

/// Raw 4-bit operation codes.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum Opcode {
    Load = 0b0001,
    Store = 0b0010,
    Add = 0b0011,
    Sub = 0b0100,
    Mul = 0b0101,
    Div = 0b0110,
    Jmp = 0b1000,
    Jmpz = 0b1001,
    Jmpnz = 0b1010,
    Halt = 0b1111,
}

impl Opcode {
    pub const ALL: [Opcode; 10] = [
        Opcode::Load,
        Opcode::Store,
        Opcode::Add,
        Opcode::Sub,
        Opcode::Mul,
        Opcode::Div,
        Opcode::Jmp,
        Opcode::Jmpz,
        Opcode::Jmpnz,
        Opcode::Halt,
    ];

    pub fn from_bits(bits: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|op| *op as u8 == bits)
    }

    /// Case-insensitive mnemonic lookup.
    pub fn from_mnemonic(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|op| op.mnemonic().eq_ignore_ascii_case(s))
    }

    pub const fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Load => "LOAD",
            Opcode::Store => "STORE",
            Opcode::Add => "ADD",
            Opcode::Sub => "SUB",
            Opcode::Mul => "MUL",
            Opcode::Div => "DIV",
            Opcode::Jmp => "JMP",
            Opcode::Jmpz => "JMPZ",
            Opcode::Jmpnz => "JMPNZ",
            Opcode::Halt => "HALT",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Decoded instruction. Carries only the operand fields its opcode uses.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Instr {
    /// `rd <- imm`
    Load { rd: Register, imm: u8 },
    /// `mem[addr] <- rs`
    Store { rs: Register, addr: u8 },
    Add { rd: Register, rs1: Register, rs2: Register },
    Sub { rd: Register, rs1: Register, rs2: Register },
    Mul { rd: Register, rs1: Register, rs2: Register },
    /// Truncating division; faults on a zero divisor.
    Div { rd: Register, rs1: Register, rs2: Register },
    /// Unconditional jump. `addr` must fit in 12 bits.
    Jmp { addr: u16 },
    Jmpz { rc: Register, addr: u8 },
    Jmpnz { rc: Register, addr: u8 },
    Halt,
}

/// A word whose opcode bits match no instruction.
#[derive(Clone, Copy, PartialEq, Eq, Debug, thiserror::Error)]
#[error("unknown opcode {opcode:04b} in word {word:#06x}")]
pub struct UnknownOpcode {
    pub opcode: u8,
    pub word: Word,
}

impl Instr {
    pub const fn opcode(&self) -> Opcode {
        match self {
            Instr::Load { .. } => Opcode::Load,
            Instr::Store { .. } => Opcode::Store,
            Instr::Add { .. } => Opcode::Add,
            Instr::Sub { .. } => Opcode::Sub,
            Instr::Mul { .. } => Opcode::Mul,
            Instr::Div { .. } => Opcode::Div,
            Instr::Jmp { .. } => Opcode::Jmp,
            Instr::Jmpz { .. } => Opcode::Jmpz,
            Instr::Jmpnz { .. } => Opcode::Jmpnz,
            Instr::Halt => Opcode::Halt,
        }
    }

    /// Pack into a single word.
    pub fn encode(&self) -> Word {
        let operands = match *self {
            Instr::Load { rd: r, imm: v }
            | Instr::Store { rs: r, addr: v }
            | Instr::Jmpz { rc: r, addr: v }
            | Instr::Jmpnz { rc: r, addr: v } => Self::encode_reg_byte(r, v),
            Instr::Add { rd, rs1, rs2 }
            | Instr::Sub { rd, rs1, rs2 }
            | Instr::Mul { rd, rs1, rs2 }
            | Instr::Div { rd, rs1, rs2 } => Self::encode_three_regs(rd, rs1, rs2),
            Instr::Jmp { addr } => {
                debug_assert!((addr as usize) < MEMORY_SIZE, "jump target out of range");
                addr & bitmask(ADDR_BITS)
            }
            Instr::Halt => 0,
        };
        ((self.opcode() as Word) << OPERAND_BITS) | operands
    }

    /// Unpack a word. Total: every word is either an instruction or an [`UnknownOpcode`].
    pub fn decode(word: Word) -> Result<Self, UnknownOpcode> {
        let bits = (word >> OPERAND_BITS) as u8;
        let opcode = Opcode::from_bits(bits).ok_or(UnknownOpcode { opcode: bits, word })?;

        let r = Register::from_nibble(word >> (OPERAND_BITS - REG_BITS));
        let byte = (word & bitmask(IMM_BITS)) as u8;
        let rs1 = Register::from_nibble(word >> REG_BITS);
        let rs2 = Register::from_nibble(word);

        Ok(match opcode {
            Opcode::Load => Instr::Load { rd: r, imm: byte },
            Opcode::Store => Instr::Store { rs: r, addr: byte },
            Opcode::Add => Instr::Add { rd: r, rs1, rs2 },
            Opcode::Sub => Instr::Sub { rd: r, rs1, rs2 },
            Opcode::Mul => Instr::Mul { rd: r, rs1, rs2 },
            Opcode::Div => Instr::Div { rd: r, rs1, rs2 },
            Opcode::Jmp => Instr::Jmp {
                addr: word & bitmask(ADDR_BITS),
            },
            Opcode::Jmpz => Instr::Jmpz { rc: r, addr: byte },
            Opcode::Jmpnz => Instr::Jmpnz { rc: r, addr: byte },
            Opcode::Halt => Instr::Halt,
        })
    }

    const fn encode_reg_byte(r: Register, byte: u8) -> Word {
        ((r.index() as Word) << (OPERAND_BITS - REG_BITS)) | byte as Word
    }

    const fn encode_three_regs(a: Register, b: Register, c: Register) -> Word {
        ((a.index() as Word) << (2 * REG_BITS)) | ((b.index() as Word) << REG_BITS) | c.index() as Word
    }
}

/// Assembler syntax, so a label-free program disassembles to source that assembles back to it.
impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = self.opcode();
        match *self {
            Instr::Load { rd: r, imm: v }
            | Instr::Store { rs: r, addr: v }
            | Instr::Jmpz { rc: r, addr: v }
            | Instr::Jmpnz { rc: r, addr: v } => write!(f, "{op} {r}, {v}"),
            Instr::Add { rd, rs1, rs2 }
            | Instr::Sub { rd, rs1, rs2 }
            | Instr::Mul { rd, rs1, rs2 }
            | Instr::Div { rd, rs1, rs2 } => write!(f, "{op} {rd}, {rs1}, {rs2}"),
            Instr::Jmp { addr } => write!(f, "{op} {addr}"),
            Instr::Halt => write!(f, "{op}"),
        }
    }
}
