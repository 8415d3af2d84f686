//! Spreadsheet-style column addressing used by the interleave declaration.

use std::fmt;

const MAX_LETTERS: usize = 3;
/// Last column addressable with three letters (`ZZZ`).
pub const MAX_COLUMN: usize = 18_277;

/// Parses a 1-to-3 letter base-26 column code (`A` = 0, `Z` = 25, `AA` = 26).
pub fn column_index(code: &str) -> Result<usize, String> {
    let upper = code.trim().to_ascii_uppercase();
    if upper.is_empty() || upper.len() > MAX_LETTERS {
        return Err(format!("Bad column spec '{}'", upper));
    }
    let mut value = 0usize;
    for c in upper.chars() {
        if !c.is_ascii_uppercase() {
            return Err(format!("Bad column spec '{}'", upper));
        }
        value = value * 26 + (c as usize - 'A' as usize + 1);
    }
    Ok(value - 1)
}

/// Inverse of [`column_index`]; `None` once the index needs more than three letters.
pub fn column_code(index: usize) -> Option<String> {
    let mut remaining = index + 1;
    let mut letters = Vec::with_capacity(MAX_LETTERS);
    while remaining > 0 {
        remaining -= 1;
        letters.push((b'A' + (remaining % 26) as u8) as char);
        remaining /= 26;
    }
    if letters.len() > MAX_LETTERS {
        return None;
    }
    Some(letters.iter().rev().collect())
}

/// Endpoint is either a decimal column index or a letter code.
fn endpoint(spec: &str) -> Result<usize, String> {
    let trimmed = spec.trim();
    let is_decimal = !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit());
    if !is_decimal {
        return column_index(trimmed);
    }
    match trimmed.parse::<usize>() {
        Ok(index) if index <= MAX_COLUMN => Ok(index),
        _ => Err(format!(
            "Bad column spec '{}': index beyond column {}",
            trimmed, MAX_COLUMN
        )),
    }
}

/// Inclusive span of physical columns owned by one interleaved dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnRange {
    pub start: usize,
    pub end: usize,
}

impl ColumnRange {
    pub fn new(start: usize, end: usize) -> Result<Self, String> {
        if end < start {
            return Err(format!("Column range {}-{} is reversed", start, end));
        }
        Ok(Self { start, end })
    }

    /// Parses `"A-E"`, `"0-4"` or mixed forms such as `"1-AA"`.
    pub fn parse(spec: &str) -> Result<Self, String> {
        let parts: Vec<&str> = spec.split('-').collect();
        if parts.len() != 2 {
            return Err(format!("Bad column spec '{}'", spec.trim()));
        }
        Self::new(endpoint(parts[0])?, endpoint(parts[1])?)
    }

    pub fn overlaps(&self, other: &ColumnRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Cells of `row` inside this range; shorter rows yield a shorter slice.
    pub fn slice<'r, T>(&self, row: &'r [T]) -> &'r [T] {
        if self.start >= row.len() {
            return &[];
        }
        let end = self.end.saturating_add(1).min(row.len());
        &row[self.start..end]
    }
}

impl fmt::Display for ColumnRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (column_code(self.start), column_code(self.end)) {
            (Some(start), Some(end)) => write!(f, "{}-{}", start, end),
            _ => write!(f, "{}-{}", self.start, self.end),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letter_codes_follow_spreadsheet_order() {
        assert_eq!(column_index("A"), Ok(0));
        assert_eq!(column_index("Z"), Ok(25));
        assert_eq!(column_index("AA"), Ok(26));
        assert_eq!(column_index("az"), Ok(51));
        assert_eq!(column_index("AAA"), Ok(702));
        assert_eq!(column_index("ZZZ"), Ok(18277));
    }

    #[test]
    fn rejects_long_or_non_alphabetic_codes() {
        assert!(column_index("AAAA").is_err());
        assert!(column_index("A1").is_err());
        assert!(column_index("").is_err());
        assert!(column_index("Ä").is_err());
    }

    #[test]
    fn codes_invert_indices() {
        for index in [0, 25, 26, 51, 701, 702, 18277] {
            let code = column_code(index).unwrap();
            assert_eq!(column_index(&code), Ok(index));
        }
        assert!(column_code(18278).is_none());
    }

    #[test]
    fn range_accepts_letters_and_decimals() {
        assert_eq!(ColumnRange::parse("A-E"), Ok(ColumnRange { start: 0, end: 4 }));
        assert_eq!(ColumnRange::parse("5-9"), Ok(ColumnRange { start: 5, end: 9 }));
        assert_eq!(ColumnRange::parse("1-AA"), Ok(ColumnRange { start: 1, end: 26 }));
        assert!(ColumnRange::parse("1-AAAA").is_err());
        assert!(ColumnRange::parse("E-A").is_err());
        assert!(ColumnRange::parse("A").is_err());
    }

    #[test]
    fn decimal_endpoints_are_bounded() {
        assert_eq!(
            ColumnRange::parse("0-18277"),
            Ok(ColumnRange { start: 0, end: MAX_COLUMN })
        );
        assert!(ColumnRange::parse("0-18278").is_err());
        assert!(ColumnRange::parse("0-18446744073709551615").is_err());
        assert!(ColumnRange::parse("0-99999999999999999999999").is_err());
    }

    #[test]
    fn slice_clips_short_rows() {
        let row = ["D", "1", "2", "D", "3"];
        let range = ColumnRange::new(3, 5).unwrap();
        assert_eq!(range.slice(&row), &["D", "3"]);
        assert!(ColumnRange::new(7, 8).unwrap().slice(&row).is_empty());
        assert_eq!(range.to_string(), "D-F");
    }
}
