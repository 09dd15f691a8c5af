use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ParsePositionError;

/// Zero-based grid coordinate.
///
/// Coordinates are signed so that a reference decoded from malformed or
/// out-of-range input can still be represented; such a position simply
/// reports `is_valid() == false`.
#[derive(
    Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize,
)]
pub struct Position {
    pub row: i32,
    pub col: i32,
}

impl Position {
    /// Number of addressable rows
    pub const MAX_ROWS: i32 = 16_384;
    /// Number of addressable columns (column XFD)
    pub const MAX_COLS: i32 = 16_384;
    /// Sentinel that is never valid
    pub const NONE: Position = Position { row: -1, col: -1 };

    /// Longest column label that can still be valid
    const MAX_COL_LETTERS: usize = 3;
    /// Longest row number that can still be valid
    const MAX_ROW_DIGITS: usize = 5;

    pub const fn new(row: i32, col: i32) -> Self {
        Position { row, col }
    }

    /// Check that both coordinates fall inside the grid
    pub fn is_valid(&self) -> bool {
        (0..Self::MAX_ROWS).contains(&self.row) && (0..Self::MAX_COLS).contains(&self.col)
    }

    /// Encode as A1 notation (e.g. (0, 0) -> "A1").
    ///
    /// Non-negative positions beyond the grid are still encoded so that formulas
    /// holding such references render back to the text they came from. Negative
    /// coordinates have no encoding and yield an empty string.
    pub fn to_text(&self) -> String {
        if self.row < 0 || self.col < 0 {
            return String::new();
        }
        format!("{}{}", col_to_label(self.col as u32), self.row as i64 + 1)
    }

    /// Decode strict A1 notation: uppercase column letters followed by a
    /// 1-based row number without leading zeros.
    pub fn from_text(text: &str) -> Result<Self, ParsePositionError> {
        let invalid = || ParsePositionError(text.to_string());

        let split = text
            .find(|c: char| !c.is_ascii_uppercase())
            .ok_or_else(invalid)?;
        let (letters, digits) = text.split_at(split);

        if letters.is_empty()
            || letters.len() > Self::MAX_COL_LETTERS
            || digits.is_empty()
            || digits.len() > Self::MAX_ROW_DIGITS
            || digits.starts_with('0')
            || !digits.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }

        let col = col_from_label(letters).ok_or_else(invalid)?;
        let row: u32 = digits.parse().map_err(|_| invalid())?;

        let pos = Position::new(row as i32 - 1, col as i32);
        if pos.is_valid() {
            Ok(pos)
        } else {
            Err(invalid())
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl FromStr for Position {
    type Err = ParsePositionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Position::from_text(s)
    }
}

/// Printable extent of a sheet: the smallest origin-anchored rectangle
/// covering every populated cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    pub rows: i32,
    pub cols: i32,
}

impl Size {
    pub const fn new(rows: i32, cols: i32) -> Self {
        Size { rows, cols }
    }
}

/// Convert column index (0-indexed) to label (A, B, ..., Z, AA, AB, ...)
pub fn col_to_label(col: u32) -> String {
    let mut label = String::new();
    let mut n = col as u64 + 1; // 1-indexed for calculation

    while n > 0 {
        n -= 1;
        label.insert(0, char::from(b'A' + (n % 26) as u8));
        n /= 26;
    }

    label
}

/// Convert column label (A, B, ..., Z, AA, AB, ...) to index (0-indexed).
///
/// Returns `None` for empty or non-alphabetic labels and for labels whose
/// index does not fit in a `u32`.
pub fn col_from_label(label: &str) -> Option<u32> {
    let mut col: u32 = 0;

    for c in label.chars() {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        let digit = c.to_ascii_uppercase() as u32 - 'A' as u32 + 1;
        col = col.checked_mul(26)?.checked_add(digit)?;
    }

    col.checked_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_validity() {
        assert!(Position::new(0, 0).is_valid());
        assert!(Position::new(Position::MAX_ROWS - 1, Position::MAX_COLS - 1).is_valid());
        assert!(!Position::new(Position::MAX_ROWS, 0).is_valid());
        assert!(!Position::new(0, Position::MAX_COLS).is_valid());
        assert!(!Position::new(-1, 0).is_valid());
        assert!(!Position::NONE.is_valid());
    }

    #[test]
    fn test_to_text() {
        assert_eq!(Position::new(0, 0).to_text(), "A1");
        assert_eq!(Position::new(9, 25).to_text(), "Z10");
        assert_eq!(Position::new(0, 26).to_text(), "AA1");
        assert_eq!(Position::new(16_383, 16_383).to_text(), "XFD16384");
        assert_eq!(Position::NONE.to_text(), "");
    }

    #[test]
    fn test_from_text() {
        assert_eq!(Position::from_text("A1"), Ok(Position::new(0, 0)));
        assert_eq!(Position::from_text("AB12"), Ok(Position::new(11, 27)));
        assert_eq!("XFD16384".parse(), Ok(Position::new(16_383, 16_383)));
    }

    #[test]
    fn test_from_text_rejects_malformed() {
        let inputs = [
            "", "A", "1", "a1", "A0", "A01", "1A", "A1B", "A 1", "ABCD1", "A123456", "XFE1",
            "A16385",
        ];
        for text in inputs {
            assert!(Position::from_text(text).is_err(), "{text:?} should not parse");
        }
    }

    #[test]
    fn test_col_labels() {
        assert_eq!(col_to_label(0), "A");
        assert_eq!(col_to_label(25), "Z");
        assert_eq!(col_to_label(26), "AA");
        assert_eq!(col_to_label(701), "ZZ");
        assert_eq!(col_to_label(702), "AAA");
        assert_eq!(col_from_label("ZZ"), Some(701));
        assert_eq!(col_from_label(""), None);
        assert_eq!(col_from_label("A1"), None);
    }

    #[test]
    fn test_ordering_is_row_major() {
        let mut positions = vec![Position::new(1, 0), Position::new(0, 5), Position::new(0, 1)];
        positions.sort();
        assert_eq!(
            positions,
            vec![Position::new(0, 1), Position::new(0, 5), Position::new(1, 0)]
        );
    }

    proptest! {
        #[test]
        fn prop_text_round_trip(row in 0..Position::MAX_ROWS, col in 0..Position::MAX_COLS) {
            let pos = Position::new(row, col);
            prop_assert_eq!(Position::from_text(&pos.to_text()), Ok(pos));
        }
    }
}
