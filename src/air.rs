use crate::{
    isa::Word,
    lexer::Token,
    symbol::{LabelTable, Register},
};

/// Assembly intermediate representation: the label table and every instruction line, in
/// program order, with the address it will occupy.
pub struct Air<'a> {
    labels: LabelTable,
    stmts: Vec<AsmLine<'a>>,
}

impl<'a> Air<'a> {
    pub fn new() -> Self {
        Air {
            labels: LabelTable::new(),
            stmts: Vec::new(),
        }
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    pub fn labels_mut(&mut self) -> &mut LabelTable {
        &mut self.labels
    }

    pub fn add_stmt(&mut self, stmt: AsmLine<'a>) {
        self.stmts.push(stmt)
    }

    /// Address the next statement will be placed at.
    pub fn next_addr(&self) -> usize {
        self.stmts.len()
    }

    pub fn stmts(&self) -> &[AsmLine<'a>] {
        &self.stmts
    }

    pub fn into_labels(self) -> LabelTable {
        self.labels
    }
}

impl Default for Air<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// Single instruction line, not yet resolved.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct AsmLine<'a> {
    /// 1-based source line
    pub line: usize,
    pub addr: Word,
    pub mnemonic: Token<'a>,
    pub operands: Vec<Token<'a>>,
}

/// A resolved operand token. Labels and decimal literals both resolve to plain values.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Operand {
    Reg(Register),
    Value(u32),
}
