//! CTC greedy decoding for sequence-recognition (OCR) output
//!
//! Input is a per-timestep class distribution of shape
//! `(sequence_length, vocabulary_size + 1)`, optionally with a leading batch
//! dimension. Class 0 is the CTC blank; class `i > 0` maps to vocabulary
//! entry `i - 1`.
//!
//! Decoding rule: take the arg-max per timestep, drop blanks, and drop a
//! class equal to the previous timestep's class. A blank between two equal
//! classes therefore separates them into two emitted characters.

use crate::error::{Error, Result};
use std::path::Path;

/// Reserved CTC blank class
pub const BLANK_INDEX: usize = 0;

/// Character dictionary mapping class `i` (1-based) to a display symbol
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Vocabulary {
    symbols: Vec<String>,
}

impl Vocabulary {
    /// Build from explicit symbols, in class order starting at class 1
    #[must_use]
    pub fn new(symbols: Vec<String>) -> Self {
        Self { symbols }
    }

    /// Parse a newline-delimited dictionary, one symbol per line
    ///
    /// Surrounding whitespace on each line is not part of the symbol.
    #[must_use]
    pub fn from_lines(text: &str) -> Self {
        Self {
            symbols: text.lines().map(|line| line.trim().to_string()).collect(),
        }
    }

    /// Load a newline-delimited dictionary file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::from_lines(&text))
    }

    /// Number of symbols (excluding the blank)
    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// True when the dictionary holds no symbols
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Symbol for a class index; `None` for the blank or out-of-range classes
    #[must_use]
    pub fn symbol(&self, class: usize) -> Option<&str> {
        class
            .checked_sub(1)
            .and_then(|i| self.symbols.get(i))
            .map(String::as_str)
    }
}

/// Greedy CTC decoder over a fixed vocabulary
#[derive(Debug, Clone)]
pub struct CtcDecoder {
    vocabulary: Vocabulary,
}

impl CtcDecoder {
    /// Create a decoder
    #[must_use]
    pub fn new(vocabulary: Vocabulary) -> Self {
        Self { vocabulary }
    }

    /// Vocabulary in use
    #[must_use]
    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    /// Decode a flattened probability matrix with the given shape
    ///
    /// # Errors
    ///
    /// Returns an error if the shape is not `(T, C)` or `(B, T, C)`, or if
    /// the element count disagrees with the shape.
    pub fn decode(&self, data: &[f32], shape: &[usize]) -> Result<String> {
        let classes = argmax_per_step(data, shape)?;
        Ok(self.collapse(&classes))
    }

    /// Apply the blank/repeat collapse rule to per-timestep classes
    ///
    /// Classes without a vocabulary entry are emitted as `[<class>]`.
    #[must_use]
    pub fn collapse(&self, classes: &[usize]) -> String {
        let mut text = String::new();
        let mut prev: Option<usize> = None;

        for &class in classes {
            if class != BLANK_INDEX && prev != Some(class) {
                match self.vocabulary.symbol(class) {
                    Some(symbol) => text.push_str(symbol),
                    None => text.push_str(&format!("[{class}]")),
                }
            }
            prev = Some(class);
        }
        text
    }
}

/// Arg-max class per timestep
///
/// A leading batch dimension selects batch element 0. Ties resolve to the
/// lowest class index.
///
/// # Errors
///
/// Returns an error for unsupported ranks, a zero-width class axis, or an
/// element count that does not match the shape.
pub fn argmax_per_step(data: &[f32], shape: &[usize]) -> Result<Vec<usize>> {
    let (steps, classes) = match *shape {
        [steps, classes] | [_, steps, classes] => (steps, classes),
        _ => {
            return Err(Error::InvalidShape {
                shape: shape.to_vec(),
            });
        }
    };
    if classes == 0 {
        return Err(Error::InvalidShape {
            shape: shape.to_vec(),
        });
    }

    let expected = shape
        .iter()
        .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
        .unwrap_or(usize::MAX);
    if data.len() != expected {
        return Err(Error::ShapeMismatch {
            shape: shape.to_vec(),
            expected,
            actual: data.len(),
        });
    }

    let Some(first_batch) = data.get(..steps * classes) else {
        return Err(Error::InvalidShape {
            shape: shape.to_vec(),
        });
    };
    Ok(first_batch
        .chunks_exact(classes)
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |(best, best_v), (i, &v)| {
                    if v > best_v { (i, v) } else { (best, best_v) }
                })
                .0
        })
        .collect())
}
