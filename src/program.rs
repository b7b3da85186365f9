//! Encoded program files.
//!
//! Two equivalent representations of an instruction stream, both in address order from 0:
//! - text: one instruction per line as 16 `0`/`1` characters
//! - packed: consecutive big-endian 16-bit words

use crate::{
    error::ProgramError,
    isa::{Word, MEMORY_SIZE},
};

pub fn to_text(words: &[Word]) -> String {
    words.iter().map(|word| format!("{word:016b}\n")).collect()
}

/// Parse the text form. Blank lines are skipped; anything else must be exactly 16 binary digits.
pub fn from_text(text: &str) -> Result<Vec<Word>, ProgramError> {
    let mut words = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.len() != Word::BITS as usize || !line.chars().all(|c| c == '0' || c == '1') {
            return Err(ProgramError::MalformedLine {
                line: i + 1,
                text: line.to_string(),
            });
        }
        let word = line
            .bytes()
            .fold(0, |word: Word, bit| (word << 1) | (bit - b'0') as Word);
        words.push(word);
    }
    check_len(words)
}

pub fn to_bytes(words: &[Word]) -> Vec<u8> {
    words.iter().flat_map(|word| word.to_be_bytes()).collect()
}

pub fn from_bytes(bytes: &[u8]) -> Result<Vec<Word>, ProgramError> {
    if bytes.len() % 2 != 0 {
        return Err(ProgramError::Misaligned(bytes.len()));
    }
    let words = bytes
        .chunks_exact(2)
        .map(|word| Word::from_be_bytes([word[0], word[1]]))
        .collect();
    check_len(words)
}

fn check_len(words: Vec<Word>) -> Result<Vec<Word>, ProgramError> {
    if words.len() > MEMORY_SIZE {
        return Err(ProgramError::TooLarge { len: words.len() });
    }
    Ok(words)
}
