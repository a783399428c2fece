//! Header probing.
//!
//! The stream does not label its own word size or byte order, so the first 64
//! words are trially decoded under each of the four combinations until one
//! passes the semantic checks. Little-endian 4-byte comes first; it is what
//! contemporary producers overwhelmingly write.

use super::control::{ControlBlock, CONTROL_WORDS, PLAUSIBLE_COUNT_CEILING};
use super::cursor::BinaryCursor;
use super::{Endianness, FileFormat, FormatError, WordSize};

const CANDIDATES: [(WordSize, Endianness); 4] = [
    (WordSize::Four, Endianness::Little),
    (WordSize::Eight, Endianness::Little),
    (WordSize::Four, Endianness::Big),
    (WordSize::Eight, Endianness::Big),
];

const TITLE_WORDS: u64 = 10;

/// Word holding the solver version float, between the title and the layout
/// words proper.
const VERSION_WORD: u64 = 13;

fn plausible_count(v: i64) -> bool {
    (0..=PLAUSIBLE_COUNT_CEILING).contains(&v)
}

fn is_flag(v: i64) -> bool {
    v == 0 || v == 1
}

fn title_is_text(bytes: &[u8]) -> bool {
    bytes.iter().all(|&b| b == 0 || (0x20..=0x7E).contains(&b))
}

/// The semantic checks a candidate interpretation must pass. They are tight
/// enough that no wrong interpretation of a real file survives, and loose
/// enough to accept every producer variant this reader serves.
fn validate(cb: &ControlBlock, title: &[u8]) -> bool {
    plausible_count(cb.numnp)
        && (2..=7).contains(&cb.ndim)
        && is_flag(cb.it)
        && is_flag(cb.iu)
        && is_flag(cb.iv)
        && is_flag(cb.ia)
        && plausible_count(cb.nel8.unsigned_abs() as i64)
        && plausible_count(cb.nel4)
        && plausible_count(cb.nel2)
        && plausible_count(cb.nelt)
        && plausible_count(cb.nglbv)
        && cb.narbs >= 0
        && title_is_text(title)
}

/// Determine word size and endianness from the first segment's bytes.
pub fn probe(first_segment: &[u8]) -> Result<(WordSize, Endianness), FormatError> {
    for (ws, en) in CANDIDATES {
        let need = CONTROL_WORDS as usize * ws.bytes();
        if first_segment.len() < need {
            continue;
        }
        let cursor = BinaryCursor::new(vec![first_segment[..need].to_vec()], ws, en);
        let cb = match ControlBlock::decode(&cursor) {
            Ok(cb) => cb,
            Err(_) => continue,
        };
        let title = cursor.bytes_at(0, TITLE_WORDS)?;
        if validate(&cb, &title) {
            log::debug!("header probe settled on {:?} {:?}", ws, en);
            return Ok((ws, en));
        }
    }
    Err(FormatError::InvalidFormat)
}

/// Assemble the immutable format descriptor once probing has succeeded.
pub fn file_format(cursor: &BinaryCursor) -> Result<FileFormat, FormatError> {
    let title_bytes = cursor.bytes_at(0, TITLE_WORDS)?;
    let title: String = title_bytes
        .iter()
        .take_while(|&&b| b != 0)
        .map(|&b| b as char)
        .collect::<String>()
        .trim()
        .to_string();
    Ok(FileFormat {
        word_size: cursor.word_size(),
        endianness: cursor.endianness(),
        version: cursor.float_at(VERSION_WORD)?,
        title,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(ws: WordSize, en: Endianness) -> Vec<u8> {
        let mut words = [0i64; 64];
        for (i, b) in b"probe test".iter().enumerate() {
            // One character per word keeps the title printable under every
            // trial word size.
            words[i] = *b as i64;
        }
        words[14] = 3;
        words[15] = 8;
        words[17] = 6;
        words[19] = 1;
        words[22] = 1;
        words[27] = 7;
        let mut bytes = Vec::new();
        for w in words {
            match (ws, en) {
                (WordSize::Four, Endianness::Little) => bytes.extend((w as i32).to_le_bytes()),
                (WordSize::Four, Endianness::Big) => bytes.extend((w as i32).to_be_bytes()),
                (WordSize::Eight, Endianness::Little) => bytes.extend(w.to_le_bytes()),
                (WordSize::Eight, Endianness::Big) => bytes.extend(w.to_be_bytes()),
            }
        }
        bytes
    }

    #[test]
    fn detects_each_combination() {
        for (ws, en) in CANDIDATES {
            let bytes = header(ws, en);
            assert_eq!(probe(&bytes).unwrap(), (ws, en), "{:?} {:?}", ws, en);
        }
    }

    #[test]
    fn garbage_fails_all_candidates() {
        let bytes: Vec<u8> = (0..512u32).map(|i| (i * 37 % 251) as u8 | 0x80).collect();
        assert!(matches!(probe(&bytes), Err(FormatError::InvalidFormat)));
    }

    #[test]
    fn short_header_is_invalid() {
        let bytes = header(WordSize::Four, Endianness::Little);
        assert!(matches!(probe(&bytes[..100]), Err(FormatError::InvalidFormat)));
    }
}
