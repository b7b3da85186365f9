use miette::NamedSource;

use crate::{
    air::{Air, AsmLine, Operand},
    error::{AsmErrorKind, AssembleError},
    isa::{bitmask, Instr, Opcode, Word, ADDR_BITS, IMM_BITS, MEMORY_SIZE, SHORT_ADDR_BITS},
    lexer::{self, is_id, LineKind, Token},
    symbol::{LabelTable, Register, Span},
};

/// Name used in diagnostics when the source has no file behind it.
pub const ANONYMOUS_SOURCE: &str = "<source>";

/// Assemble `src` into a program ready to be loaded at address 0.
pub fn assemble(src: &str) -> Result<Vec<Word>, AssembleError> {
    Assembler::new(ANONYMOUS_SOURCE, src)
        .assemble()
        .map(|assembly| assembly.words)
}

/// Output of a successful assembly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Assembly {
    /// Encoded instructions in address order
    pub words: Vec<Word>,
    /// Resolved labels, kept for diagnostics
    pub labels: LabelTable,
}

/// Two-pass translator from line-oriented assembly to encoded words.
pub struct Assembler<'a> {
    /// File name shown in diagnostics
    name: String,
    /// Reference to the source file
    src: &'a str,
}

impl<'a> Assembler<'a> {
    pub fn new(name: impl Into<String>, src: &'a str) -> Self {
        Assembler {
            name: name.into(),
            src,
        }
    }

    /// Run both passes. No partial program is returned on failure.
    pub fn assemble(&self) -> Result<Assembly, AssembleError> {
        let air = self.collect()?;
        let words = self.encode(&air)?;
        Ok(Assembly {
            words,
            labels: air.into_labels(),
        })
    }

    /// Pass one: bind labels to addresses and gather instruction lines.
    pub fn collect(&self) -> Result<Air<'a>, AssembleError> {
        let mut air = Air::new();
        for line in lexer::lines(self.src) {
            match line.kind {
                LineKind::Blank | LineKind::Comment => {}
                LineKind::Label(name) => {
                    if !is_label_name(name.text) {
                        return Err(self.error(
                            AsmErrorKind::InvalidLabel(name.text.to_string()),
                            line.num,
                            name.span,
                        ));
                    }
                    if air.next_addr() >= MEMORY_SIZE {
                        return Err(self.error(
                            AsmErrorKind::LabelPastEnd(name.text.to_string()),
                            line.num,
                            name.span,
                        ));
                    }
                    // Declaring a label does not consume an instruction slot
                    let addr = air.next_addr() as Word;
                    if let Err(first) = air.labels_mut().insert(name.text, addr) {
                        return Err(self.error(
                            AsmErrorKind::DuplicateLabel {
                                name: name.text.to_string(),
                                first,
                            },
                            line.num,
                            name.span,
                        ));
                    }
                }
                LineKind::Instr { mnemonic, operands } => {
                    if air.next_addr() >= MEMORY_SIZE {
                        let len = lexer::lines(self.src)
                            .filter(|line| matches!(line.kind, LineKind::Instr { .. }))
                            .count();
                        return Err(self.error(
                            AsmErrorKind::ProgramTooLarge { len },
                            line.num,
                            line.span,
                        ));
                    }
                    let addr = air.next_addr() as Word;
                    air.add_stmt(AsmLine {
                        line: line.num,
                        addr,
                        mnemonic,
                        operands,
                    });
                }
            }
        }
        Ok(air)
    }

    /// Pass two: resolve operands against the label table and pack each line.
    pub fn encode(&self, air: &Air<'a>) -> Result<Vec<Word>, AssembleError> {
        air.stmts()
            .iter()
            .map(|stmt| {
                self.parse_instr(stmt, air.labels())
                    .map(|instr| instr.encode())
                    .map_err(|(kind, span)| self.error(kind, stmt.line, span))
            })
            .collect()
    }

    fn parse_instr(&self, stmt: &AsmLine<'a>, labels: &LabelTable) -> Result<Instr, (AsmErrorKind, Span)> {
        let mnemonic = stmt.mnemonic;
        let op = Opcode::from_mnemonic(mnemonic.text).ok_or_else(|| {
            (
                AsmErrorKind::UnknownInstruction(mnemonic.text.to_string()),
                mnemonic.span,
            )
        })?;

        let expected = match op {
            Opcode::Halt => 0,
            Opcode::Jmp => 1,
            Opcode::Load | Opcode::Store | Opcode::Jmpz | Opcode::Jmpnz => 2,
            Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div => 3,
        };
        let ops = &stmt.operands;
        if ops.len() != expected {
            let span = match ops.get(expected) {
                Some(extra) => extra.span,
                None => mnemonic.span,
            };
            return Err((
                AsmErrorKind::WrongOperandCount {
                    mnemonic: op.mnemonic(),
                    expected,
                    found: ops.len(),
                },
                span,
            ));
        }

        let resolver = Resolver { labels };
        let instr = match op {
            Opcode::Load => Instr::Load {
                rd: resolver.expect_reg(&ops[0])?,
                imm: resolver.expect_value(&ops[1], IMM_BITS)? as u8,
            },
            Opcode::Store => Instr::Store {
                rs: resolver.expect_reg(&ops[0])?,
                addr: resolver.expect_value(&ops[1], SHORT_ADDR_BITS)? as u8,
            },
            Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div => {
                let rd = resolver.expect_reg(&ops[0])?;
                let rs1 = resolver.expect_reg(&ops[1])?;
                let rs2 = resolver.expect_reg(&ops[2])?;
                match op {
                    Opcode::Add => Instr::Add { rd, rs1, rs2 },
                    Opcode::Sub => Instr::Sub { rd, rs1, rs2 },
                    Opcode::Mul => Instr::Mul { rd, rs1, rs2 },
                    _ => Instr::Div { rd, rs1, rs2 },
                }
            }
            Opcode::Jmp => Instr::Jmp {
                addr: resolver.expect_value(&ops[0], ADDR_BITS)? as u16,
            },
            Opcode::Jmpz => Instr::Jmpz {
                rc: resolver.expect_reg(&ops[0])?,
                addr: resolver.expect_value(&ops[1], SHORT_ADDR_BITS)? as u8,
            },
            Opcode::Jmpnz => Instr::Jmpnz {
                rc: resolver.expect_reg(&ops[0])?,
                addr: resolver.expect_value(&ops[1], SHORT_ADDR_BITS)? as u8,
            },
            Opcode::Halt => Instr::Halt,
        };
        Ok(instr)
    }

    fn error(&self, kind: AsmErrorKind, line: usize, span: Span) -> AssembleError {
        AssembleError::new(
            kind,
            line,
            span,
            NamedSource::new(&self.name, self.src.to_string()),
        )
    }
}

/// Resolves operand tokens during pass two.
struct Resolver<'t> {
    labels: &'t LabelTable,
}

impl Resolver<'_> {
    /// Register name, then label, then decimal literal.
    fn resolve(&self, tok: &Token) -> Result<Operand, (AsmErrorKind, Span)> {
        if let Ok(reg) = tok.text.parse::<Register>() {
            return Ok(Operand::Reg(reg));
        }
        if let Some(addr) = self.labels.get(tok.text) {
            return Ok(Operand::Value(addr as u32));
        }
        if !tok.text.is_empty() && tok.text.chars().all(|c| c.is_ascii_digit()) {
            // Only fails when the literal overflows
            return tok.text.parse().map(Operand::Value).map_err(|_| {
                (
                    AsmErrorKind::OperandOutOfRange {
                        token: tok.text.to_string(),
                        bits: u32::BITS,
                    },
                    tok.span,
                )
            });
        }
        Err((AsmErrorKind::UnresolvedOperand(tok.text.to_string()), tok.span))
    }

    fn expect_reg(&self, tok: &Token) -> Result<Register, (AsmErrorKind, Span)> {
        match self.resolve(tok)? {
            Operand::Reg(reg) => Ok(reg),
            Operand::Value(_) => Err((
                AsmErrorKind::OperandKindMismatch {
                    expected: "register",
                    found: tok.text.to_string(),
                },
                tok.span,
            )),
        }
    }

    /// Label address or literal that fits in `bits` unsigned bits.
    fn expect_value(&self, tok: &Token, bits: u32) -> Result<u32, (AsmErrorKind, Span)> {
        match self.resolve(tok)? {
            Operand::Value(val) if val <= bitmask(bits) as u32 => Ok(val),
            Operand::Value(_) => Err((
                AsmErrorKind::OperandOutOfRange {
                    token: tok.text.to_string(),
                    bits,
                },
                tok.span,
            )),
            Operand::Reg(_) => Err((
                AsmErrorKind::OperandKindMismatch {
                    expected: "label or decimal literal",
                    found: tok.text.to_string(),
                },
                tok.span,
            )),
        }
    }
}

/// Identifier that does not start with a digit and does not name a register.
fn is_label_name(name: &str) -> bool {
    name.chars().next().is_some_and(|c| !c.is_ascii_digit())
        && name.chars().all(is_id)
        && name.parse::<Register>().is_err()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn err_kind(src: &str) -> AsmErrorKind {
        assemble(src).unwrap_err().kind().clone()
    }

    #[test]
    fn assembles_straight_line_program() {
        let words = assemble("LOAD R1, 5\nHALT\n").unwrap();
        assert_eq!(words, vec![0x1105, 0xF000]);
    }

    #[test]
    fn case_insensitive_mnemonics_and_registers() {
        assert_eq!(
            assemble("load r1 6\nLoad R2,3\ndiv r3,R1,r2\nhalt").unwrap(),
            vec![0x1106, 0x1203, 0x6312, 0xF000]
        );
    }

    #[test]
    fn labels_do_not_consume_slots() {
        let asm = Assembler::new("t.asm", "start:\n  JMP end\n  LOAD R1, 1\nend:\n  HALT\n")
            .assemble()
            .unwrap();
        assert_eq!(asm.words, vec![0x8002, 0x1101, 0xF000]);
        assert_eq!(asm.labels.get("start"), Some(0));
        assert_eq!(asm.labels.get("end"), Some(2));
    }

    #[test]
    fn forward_and_backward_references() {
        let src = r#"
        # count down from 3
        LOAD R1, 3
        LOAD R2, 1
        loop:
        JMPZ R1, done
        SUB R1, R1, R2
        JMP loop
        done:
        HALT
        "#;
        assert_eq!(
            assemble(src).unwrap(),
            vec![0x1103, 0x1201, 0x9105, 0x4112, 0x8002, 0xF000]
        );
    }

    #[test]
    fn label_value_as_immediate() {
        assert_eq!(
            assemble("LOAD R4, here\nhere:\nHALT").unwrap(),
            vec![0x1401, 0xF000]
        );
    }

    #[test]
    fn duplicate_label() {
        let err = Assembler::new("dup.asm", "a:\nHALT\na:\nHALT")
            .assemble()
            .unwrap_err();
        assert_eq!(
            err.kind(),
            &AsmErrorKind::DuplicateLabel {
                name: "a".into(),
                first: 0
            }
        );
        assert_eq!(err.line(), 3);
        assert_eq!(err.file(), "dup.asm");
        assert_eq!(err.to_string(), "dup.asm:3: duplicate label `a`, first declared at address 0");
    }

    #[test]
    fn unresolved_operand() {
        let src = "JMP nowhere\nHALT";
        let err = assemble(src).unwrap_err();
        assert_eq!(err.kind(), &AsmErrorKind::UnresolvedOperand("nowhere".into()));
        assert_eq!(err.line(), 1);
        assert_eq!(&src[err.span().range()], "nowhere");

        assert_eq!(
            err_kind("LOAD R1, -1"),
            AsmErrorKind::UnresolvedOperand("-1".into())
        );
    }

    #[test]
    fn operand_out_of_range() {
        assert_eq!(
            err_kind("LOAD R1, 300"),
            AsmErrorKind::OperandOutOfRange {
                token: "300".into(),
                bits: 8
            }
        );
        assert!(assemble("LOAD R1, 255").is_ok());
        assert!(matches!(
            err_kind("STORE R1, 256"),
            AsmErrorKind::OperandOutOfRange { bits: 8, .. }
        ));
        assert!(matches!(
            err_kind("JMPNZ R1, 256"),
            AsmErrorKind::OperandOutOfRange { bits: 8, .. }
        ));
        assert!(assemble("JMP 4095").is_ok());
        assert!(matches!(
            err_kind("JMP 4096"),
            AsmErrorKind::OperandOutOfRange { bits: 12, .. }
        ));
        assert!(matches!(
            err_kind("JMP 99999999999999999999"),
            AsmErrorKind::OperandOutOfRange { .. }
        ));
    }

    #[test]
    fn unknown_instruction() {
        assert_eq!(
            err_kind("HALT\nMOV R1, R2"),
            AsmErrorKind::UnknownInstruction("MOV".into())
        );
    }

    #[test]
    fn operand_count_and_kind() {
        assert_eq!(
            err_kind("ADD R1, R2"),
            AsmErrorKind::WrongOperandCount {
                mnemonic: "ADD",
                expected: 3,
                found: 2
            }
        );
        assert!(matches!(
            err_kind("HALT R1"),
            AsmErrorKind::WrongOperandCount { expected: 0, found: 1, .. }
        ));
        assert_eq!(
            err_kind("ADD R1, 2, R3"),
            AsmErrorKind::OperandKindMismatch {
                expected: "register",
                found: "2".into()
            }
        );
        assert!(matches!(
            err_kind("LOAD R1, R2"),
            AsmErrorKind::OperandKindMismatch { .. }
        ));
    }

    #[test]
    fn invalid_labels() {
        assert_eq!(err_kind("r3:\nHALT"), AsmErrorKind::InvalidLabel("r3".into()));
        assert_eq!(err_kind("9lives:"), AsmErrorKind::InvalidLabel("9lives".into()));
        assert_eq!(
            err_kind("two words:"),
            AsmErrorKind::InvalidLabel("two words".into())
        );
    }

    #[test]
    fn too_many_instructions() {
        let src = "HALT\n".repeat(MEMORY_SIZE);
        assert_eq!(assemble(&src).unwrap().len(), MEMORY_SIZE);
        let src = "HALT\n".repeat(MEMORY_SIZE + 1);
        let err = assemble(&src).unwrap_err();
        assert_eq!(
            err.kind(),
            &AsmErrorKind::ProgramTooLarge {
                len: MEMORY_SIZE + 1
            }
        );
        assert_eq!(err.line(), MEMORY_SIZE + 1);
    }

    #[test]
    fn label_after_full_memory() {
        let src = "HALT\n".repeat(MEMORY_SIZE - 1) + "last:\nHALT\n";
        let asm = Assembler::new("full.asm", &src).assemble().unwrap();
        assert_eq!(asm.labels.get("last"), Some(MEMORY_SIZE as Word - 1));

        let src = "HALT\n".repeat(MEMORY_SIZE) + "end:\n";
        let err = assemble(&src).unwrap_err();
        assert_eq!(err.kind(), &AsmErrorKind::LabelPastEnd("end".into()));
        assert_eq!(err.line(), MEMORY_SIZE + 1);
        assert_eq!(&src[err.span().range()], "end");
    }

    #[test]
    fn reassembly_is_identical() {
        let src = "a:\nLOAD R1, 1\nJMPNZ R1, a\nHALT";
        assert_eq!(assemble(src).unwrap(), assemble(src).unwrap());
    }

    #[test]
    fn disassembly_reassembles() {
        let words = vec![0x1105, 0x2A10, 0x3123, 0x4321, 0x5FFF, 0x6000, 0x8FFF, 0x9EFF, 0xA100, 0xF000];
        let listing: String = words
            .iter()
            .map(|w| format!("{}\n", Instr::decode(*w).unwrap()))
            .collect();
        assert_eq!(assemble(&listing).unwrap(), words);
    }
}
