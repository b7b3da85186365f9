use crate::symbol::{Span, SrcOffset};

pub mod cursor;

use cursor::Cursor;

/// A word of source text and where it came from.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Token<'a> {
    pub text: &'a str,
    pub span: Span,
}

impl<'a> Token<'a> {
    fn new(text: &'a str, start: usize) -> Self {
        Token {
            text,
            span: Span::new(SrcOffset(start), text.len()),
        }
    }
}

/// What a single source line contains.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum LineKind<'a> {
    /// Empty or whitespace only
    Blank,
    /// Starts with `#`
    Comment,
    /// `name:`, the token excludes the colon
    Label(Token<'a>),
    Instr {
        mnemonic: Token<'a>,
        operands: Vec<Token<'a>>,
    },
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Line<'a> {
    /// 1-based line number
    pub num: usize,
    /// Whole line without its terminator
    pub span: Span,
    pub kind: LineKind<'a>,
}

/// Test if a character separates operands. Commas are essentially whitespace.
pub(crate) fn is_separator(c: char) -> bool {
    c.is_whitespace() || c == ','
}

/// Test if a character may appear in a label name.
pub(crate) fn is_id(c: char) -> bool {
    matches!(c, 'a'..='z' | 'A'..='Z' | '0'..='9' | '_')
}

/// Classify every line of `src`. Line terminators (`\n` or `\r\n`) are not part of any token.
pub fn lines(src: &str) -> impl Iterator<Item = Line<'_>> {
    let mut offs = 0;
    src.split_inclusive('\n').enumerate().map(move |(i, raw)| {
        let base = offs;
        offs += raw.len();
        let text = raw.trim_end_matches(['\n', '\r']);
        Line {
            num: i + 1,
            span: Span::new(SrcOffset(base), text.len()),
            kind: classify(text, base),
        }
    })
}

fn classify(text: &str, base: usize) -> LineKind<'_> {
    // Anything after `#` is a comment
    let code = match text.find('#') {
        Some(idx) => &text[..idx],
        None => text,
    };
    let trimmed = code.trim();
    if trimmed.is_empty() {
        return if code.len() < text.len() {
            LineKind::Comment
        } else {
            LineKind::Blank
        };
    }

    let start = base + (code.len() - code.trim_start().len());
    if let Some(name) = trimmed.strip_suffix(':') {
        let name = name.trim_end();
        return LineKind::Label(Token::new(name, start));
    }

    let mut cur = Cursor::new(code, base);
    let mut words = std::iter::from_fn(|| {
        cur.take_while(is_separator);
        if cur.is_eof() {
            return None;
        }
        let (from, pos) = (cur.pos_in_line(), cur.pos());
        cur.take_while(|c| !is_separator(c));
        Some(Token::new(cur.slice(from, cur.pos_in_line()), pos))
    });
    // Non-empty, so there is at least one word
    let mnemonic = words.next().unwrap_or(Token::new(trimmed, start));
    LineKind::Instr {
        mnemonic,
        operands: words.collect(),
    }
}
