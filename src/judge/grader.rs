//! Output comparison
//!
//! Punctuation is ignored, whitespace is not: both sides keep only
//! alphanumeric and whitespace characters before an exact comparison.
//! Trailing whitespace at the very end of the output (the final newline a
//! program prints) is the one exception and is dropped.

/// Drop every character that is neither alphanumeric nor whitespace
pub fn normalize_output(s: &str) -> String {
    let mut normalized: String = s
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    normalized.truncate(normalized.trim_end().len());
    normalized
}

/// Compare program output with expected output
pub fn outputs_match(actual: &str, expected: &str) -> bool {
    normalize_output(actual) == normalize_output(expected)
}
