//! Validator bitfields
//!
//! A bitfield selects validator positions. The light client exchanges it as
//! 256-bit words where position `p` is bit `p % 256` of word `p / 256`; off-chain
//! it is handled as a string with one `'0'`/`'1'` character per position.

use ethereum_types::U256;
use serde::{Serialize, Serializer};
use std::fmt;

use crate::error::{RelayError, Result};

const WORD_BITS: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Bitfield {
    bits: Vec<bool>,
}

impl Bitfield {
    /// Parses a `'0'`/`'1'` string, one character per validator position.
    pub fn parse(s: &str) -> Result<Self> {
        let bits = s
            .chars()
            .enumerate()
            .map(|(i, c)| match c {
                '1' => Ok(true),
                '0' => Ok(false),
                other => Err(RelayError::InvalidBitfield(format!(
                    "unexpected character {:?} at position {}",
                    other, i
                ))),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { bits })
    }

    /// Bitfield of `len` positions with exactly `positions` set.
    pub fn from_positions(len: usize, positions: &[usize]) -> Result<Self> {
        let mut bits = vec![false; len];
        for &position in positions {
            let slot = bits
                .get_mut(position)
                .ok_or(RelayError::ValidatorIndexOutOfRange { index: position, len })?;
            *slot = true;
        }
        Ok(Self { bits })
    }

    /// Unpacks `len` positions from light-client words.
    pub fn from_words(words: &[U256], len: usize) -> Self {
        let bits = (0..len)
            .map(|p| {
                words
                    .get(p / WORD_BITS)
                    .map(|word| word.bit(p % WORD_BITS))
                    .unwrap_or(false)
            })
            .collect();
        Self { bits }
    }

    /// Packs the bitfield into light-client words.
    pub fn to_words(&self) -> Vec<U256> {
        let mut words = vec![U256::zero(); self.bits.len().div_ceil(WORD_BITS)];
        for p in self.positions() {
            let word = p / WORD_BITS;
            words[word] = words[word] | (U256::one() << (p % WORD_BITS));
        }
        words
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Selected positions in ascending order.
    pub fn positions(&self) -> Vec<usize> {
        self.bits
            .iter()
            .enumerate()
            .filter_map(|(i, set)| set.then_some(i))
            .collect()
    }
}

impl fmt::Display for Bitfield {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &bit in &self.bits {
            f.write_str(if bit { "1" } else { "0" })?;
        }
        Ok(())
    }
}

impl Serialize for Bitfield {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(self.to_words())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let bitfield = Bitfield::parse("0010010100").unwrap();
        assert_eq!(bitfield.positions(), vec![2, 5, 7]);
        assert_eq!(bitfield.to_string(), "0010010100");
    }

    #[test]
    fn test_parse_rejects_other_characters() {
        assert!(matches!(
            Bitfield::parse("01x"),
            Err(RelayError::InvalidBitfield(_))
        ));
    }

    #[test]
    fn test_words_layout_crosses_word_boundary() {
        let bitfield = Bitfield::from_positions(300, &[0, 255, 256, 299]).unwrap();
        let words = bitfield.to_words();

        assert_eq!(words.len(), 2);
        assert!(words[0].bit(0));
        assert!(words[0].bit(255));
        assert!(words[1].bit(0));
        assert!(words[1].bit(43));
        assert_eq!(Bitfield::from_words(&words, 300), bitfield);
    }

    #[test]
    fn test_from_positions_out_of_range() {
        assert!(matches!(
            Bitfield::from_positions(4, &[4]),
            Err(RelayError::ValidatorIndexOutOfRange { index: 4, len: 4 })
        ));
    }
}
