//! Word-addressed access to the family's byte stream.
//!
//! The cursor owns the bytes of every segment and presents them as one
//! logical run of machine words. All reads are positional so any number of
//! readers can share one cursor; iteration state lives with the caller.

use super::{Endianness, FormatError, WordSize};

pub(crate) fn read_int_word(bytes: &[u8], byte_off: usize, ws: WordSize, en: Endianness) -> i64 {
    match (ws, en) {
        (WordSize::Four, Endianness::Little) => {
            i32::from_le_bytes(bytes[byte_off..byte_off + 4].try_into().unwrap()) as i64
        }
        (WordSize::Four, Endianness::Big) => {
            i32::from_be_bytes(bytes[byte_off..byte_off + 4].try_into().unwrap()) as i64
        }
        (WordSize::Eight, Endianness::Little) => {
            i64::from_le_bytes(bytes[byte_off..byte_off + 8].try_into().unwrap())
        }
        (WordSize::Eight, Endianness::Big) => {
            i64::from_be_bytes(bytes[byte_off..byte_off + 8].try_into().unwrap())
        }
    }
}

pub(crate) fn read_float_word(bytes: &[u8], byte_off: usize, ws: WordSize, en: Endianness) -> f64 {
    match (ws, en) {
        (WordSize::Four, Endianness::Little) => {
            f32::from_le_bytes(bytes[byte_off..byte_off + 4].try_into().unwrap()) as f64
        }
        (WordSize::Four, Endianness::Big) => {
            f32::from_be_bytes(bytes[byte_off..byte_off + 4].try_into().unwrap()) as f64
        }
        (WordSize::Eight, Endianness::Little) => {
            f64::from_le_bytes(bytes[byte_off..byte_off + 8].try_into().unwrap())
        }
        (WordSize::Eight, Endianness::Big) => {
            f64::from_be_bytes(bytes[byte_off..byte_off + 8].try_into().unwrap())
        }
    }
}

#[derive(Debug)]
struct Segment {
    bytes: Vec<u8>,
    start_word: u64,
    words: u64,
}

#[derive(Debug)]
pub struct BinaryCursor {
    word_size: WordSize,
    endianness: Endianness,
    segments: Vec<Segment>,
    total_words: u64,
}

impl BinaryCursor {
    /// Wrap the loaded segment bytes. A trailing partial word in a segment is
    /// dropped; the producer writes whole words only.
    pub fn new(segment_bytes: Vec<Vec<u8>>, word_size: WordSize, endianness: Endianness) -> BinaryCursor {
        let wb = word_size.bytes() as u64;
        let mut segments = Vec::with_capacity(segment_bytes.len());
        let mut start_word = 0u64;
        for bytes in segment_bytes {
            let words = bytes.len() as u64 / wb;
            if bytes.len() as u64 % wb != 0 {
                log::warn!(
                    "segment at word {} has {} trailing byte(s), ignored",
                    start_word,
                    bytes.len() as u64 % wb
                );
            }
            if words == 0 {
                continue;
            }
            segments.push(Segment {
                bytes,
                start_word,
                words,
            });
            start_word += words;
        }
        BinaryCursor {
            word_size,
            endianness,
            segments,
            total_words: start_word,
        }
    }

    pub fn word_size(&self) -> WordSize {
        self.word_size
    }

    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    pub fn words_len(&self) -> u64 {
        self.total_words
    }

    pub fn has(&self, word: u64, count: u64) -> bool {
        word.checked_add(count).map_or(false, |end| end <= self.total_words)
    }

    fn locate(&self, word: u64) -> Result<(&Segment, usize), FormatError> {
        if word >= self.total_words {
            return Err(FormatError::Truncated { what: "word stream" });
        }
        let idx = match self
            .segments
            .binary_search_by(|s| s.start_word.cmp(&word))
        {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        let seg = &self.segments[idx];
        debug_assert!(word >= seg.start_word && word < seg.start_word + seg.words);
        let byte_off = (word - seg.start_word) as usize * self.word_size.bytes();
        Ok((seg, byte_off))
    }

    pub fn int_at(&self, word: u64) -> Result<i64, FormatError> {
        let (seg, off) = self.locate(word)?;
        Ok(read_int_word(&seg.bytes, off, self.word_size, self.endianness))
    }

    pub fn float_at(&self, word: u64) -> Result<f64, FormatError> {
        let (seg, off) = self.locate(word)?;
        Ok(read_float_word(&seg.bytes, off, self.word_size, self.endianness))
    }

    pub fn ints(&self, word: u64, count: usize) -> Result<Vec<i64>, FormatError> {
        let mut out = Vec::with_capacity(count);
        for i in 0..count {
            out.push(self.int_at(word + i as u64)?);
        }
        Ok(out)
    }

    pub fn floats(&self, word: u64, count: usize) -> Result<Vec<f64>, FormatError> {
        let mut out = Vec::with_capacity(count);
        for i in 0..count {
            out.push(self.float_at(word + i as u64)?);
        }
        Ok(out)
    }

    /// Raw bytes of `count` words starting at `word`, in stream order.
    /// Used for the character fields in the header.
    pub fn bytes_at(&self, word: u64, count: u64) -> Result<Vec<u8>, FormatError> {
        if !self.has(word, count) {
            return Err(FormatError::Truncated { what: "word stream" });
        }
        let wb = self.word_size.bytes();
        let mut out = Vec::with_capacity(count as usize * wb);
        for i in 0..count {
            let (seg, off) = self.locate(word + i)?;
            out.extend_from_slice(&seg.bytes[off..off + wb]);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn le4(values: &[i32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn reads_ints_across_segment_boundary() {
        let a = le4(&[1, 2, 3]);
        let b = le4(&[4, 5]);
        let c = BinaryCursor::new(vec![a, b], WordSize::Four, Endianness::Little);
        assert_eq!(c.words_len(), 5);
        assert_eq!(c.ints(0, 5).unwrap(), vec![1, 2, 3, 4, 5]);
        assert_eq!(c.int_at(3).unwrap(), 4);
        assert!(c.int_at(5).is_err());
    }

    #[test]
    fn reads_floats_in_both_orders_and_sizes() {
        let le: Vec<u8> = 1.5f32.to_le_bytes().to_vec();
        let c = BinaryCursor::new(vec![le], WordSize::Four, Endianness::Little);
        assert_eq!(c.float_at(0).unwrap(), 1.5);

        let be: Vec<u8> = 2.25f32.to_be_bytes().to_vec();
        let c = BinaryCursor::new(vec![be], WordSize::Four, Endianness::Big);
        assert_eq!(c.float_at(0).unwrap(), 2.25);

        let le8: Vec<u8> = 3.125f64.to_le_bytes().to_vec();
        let c = BinaryCursor::new(vec![le8], WordSize::Eight, Endianness::Little);
        assert_eq!(c.float_at(0).unwrap(), 3.125);

        let be8: Vec<u8> = (-4.5f64).to_be_bytes().to_vec();
        let c = BinaryCursor::new(vec![be8], WordSize::Eight, Endianness::Big);
        assert_eq!(c.float_at(0).unwrap(), -4.5);
    }

    #[test]
    fn negative_ints_sign_extend() {
        let c = BinaryCursor::new(vec![le4(&[-7])], WordSize::Four, Endianness::Little);
        assert_eq!(c.int_at(0).unwrap(), -7);
    }

    #[test]
    fn trailing_partial_word_is_dropped() {
        let mut bytes = le4(&[9]);
        bytes.push(0xAB);
        let c = BinaryCursor::new(vec![bytes], WordSize::Four, Endianness::Little);
        assert_eq!(c.words_len(), 1);
    }
}
