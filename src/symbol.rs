use std::{fmt, ops::Range, str::FromStr};

use fxhash::FxBuildHasher;
use indexmap::IndexMap;
use miette::SourceSpan;

use crate::isa::{Word, MEMORY_SIZE};

// Symbol table of label -> instruction address
type FxMap<K, V> = IndexMap<K, V, FxBuildHasher>;

/// Number of general purpose registers.
pub const REGISTER_COUNT: usize = 16;

/// Labels resolved during the first assembler pass, in declaration order.
///
/// Only exists at assemble time; the engine never sees it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabelTable {
    table: FxMap<String, Word>,
}

impl LabelTable {
    pub fn new() -> Self {
        LabelTable {
            table: IndexMap::with_hasher(FxBuildHasher::default()),
        }
    }

    /// Bind `name` to `addr`. Returns the previous address if the label was already declared,
    /// in which case the table is left untouched.
    pub fn insert(&mut self, name: &str, addr: Word) -> Result<(), Word> {
        debug_assert!((addr as usize) < MEMORY_SIZE);
        match self.table.get(name) {
            Some(prev) => Err(*prev),
            None => {
                self.table.insert(name.to_string(), addr);
                Ok(())
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Word> {
        self.table.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Labels in the order they were declared.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Word)> {
        self.table.iter().map(|(name, addr)| (name.as_str(), *addr))
    }
}

/// Used to refer to offsets from the start of a source file.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Debug)]
pub struct SrcOffset(pub usize);

/// Location within source
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Debug)]
pub struct Span {
    offs: SrcOffset,
    len: usize,
}

impl Span {
    pub fn new(offs: SrcOffset, len: usize) -> Self {
        Span { offs, len }
    }

    pub fn range(&self) -> Range<usize> {
        self.offs.0..self.offs.0 + self.len
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn offs(&self) -> usize {
        self.offs.0
    }

}

impl From<Span> for SourceSpan {
    fn from(value: Span) -> Self {
        SourceSpan::new(value.offs().into(), value.len())
    }
}

/// One of the 16 general purpose registers, `R0` to `R15`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Register(u8);

impl Register {
    pub const R0: Register = Register(0);

    /// Register named by the low 4 bits of `nibble`.
    pub const fn from_nibble(nibble: u16) -> Self {
        Register((nibble & 0xF) as u8)
    }

    pub fn new(index: usize) -> Option<Self> {
        (index < REGISTER_COUNT).then_some(Register(index as u8))
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.0)
    }
}

impl FromStr for Register {
    type Err = ();

    /// Accepts `r0`..`r15` in any case. Leading zeros are not register names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix('R')
            .or_else(|| s.strip_prefix('r'))
            .ok_or(())?;
        if digits.is_empty()
            || !digits.chars().all(|c| c.is_ascii_digit())
            || (digits.len() > 1 && digits.starts_with('0'))
        {
            return Err(());
        }
        let index: usize = digits.parse().map_err(|_| ())?;
        Register::new(index).ok_or(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_names() {
        assert_eq!("R0".parse(), Ok(Register::R0));
        assert_eq!("r15".parse(), Ok(Register::from_nibble(15)));
        assert_eq!("R7".parse::<Register>().map(Register::index), Ok(7));
        assert!("R16".parse::<Register>().is_err());
        assert!("R01".parse::<Register>().is_err());
        assert!("R".parse::<Register>().is_err());
        assert!("X1".parse::<Register>().is_err());
        assert!("r1a".parse::<Register>().is_err());
    }

    #[test]
    fn register_display() {
        assert_eq!(Register::from_nibble(0x1C).to_string(), "R12");
    }

    #[test]
    fn label_table_rejects_duplicates() {
        let mut labels = LabelTable::new();
        assert_eq!(labels.insert("loop", 2), Ok(()));
        assert_eq!(labels.insert("end", 5), Ok(()));
        assert_eq!(labels.insert("loop", 4), Err(2));
        assert_eq!(labels.get("loop"), Some(2));
        assert_eq!(labels.get("LOOP"), None);
        assert_eq!(
            labels.iter().collect::<Vec<_>>(),
            vec![("loop", 2), ("end", 5)]
        );
    }
}
