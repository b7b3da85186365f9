// Heavily inspired by `rustc_lexer` and adapted to suit line-oriented assembly.
// See https://doc.rust-lang.org/beta/nightly-rustc/src/rustc_lexer/cursor.rs.html

use std::str::Chars;

/// Peekable iterator over the chars of one source line, tracking the byte offset of each
/// char relative to the start of the whole source.
#[derive(Clone)]
pub struct Cursor<'a> {
    /// Offset of the line within the source
    base: usize,
    /// The whole line
    line: &'a str,
    /// Iterator over the rest of the line
    chars: Chars<'a>,
}

impl<'a> Cursor<'a> {
    pub fn new(line: &'a str, base: usize) -> Cursor<'a> {
        Cursor {
            base,
            line,
            chars: line.chars(),
        }
    }

    /// Peek the next char without consuming it.
    pub fn first(&self) -> Option<char> {
        self.chars.clone().next()
    }

    /// Line is fully consumed
    pub fn is_eof(&self) -> bool {
        self.chars.as_str().is_empty()
    }

    /// Move to the next char.
    pub fn bump(&mut self) -> Option<char> {
        self.chars.next()
    }

    /// Eat chars while predicate returns true or until the end of the line.
    pub fn take_while(&mut self, mut predicate: impl FnMut(char) -> bool) {
        while self.first().is_some_and(&mut predicate) {
            self.bump();
        }
    }

    /// Byte offset of the next char within the line.
    pub fn pos_in_line(&self) -> usize {
        self.line.len() - self.chars.as_str().len()
    }

    /// Byte offset of the next char within the source.
    pub fn pos(&self) -> usize {
        self.base + self.pos_in_line()
    }

    /// Text of the line between two in-line offsets.
    pub fn slice(&self, start: usize, end: usize) -> &'a str {
        &self.line[start..end]
    }
}
