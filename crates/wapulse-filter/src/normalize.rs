// SPDX-FileCopyrightText: 2026 Wapulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Phone-number list normalization.

/// Splits `raw` into lines, keeps only the digits of each line and drops
/// entries shorter than `min_digits`. Short entries are garbage input, not
/// errors. Input order is preserved and duplicates are kept.
pub fn normalize_numbers(raw: &str, min_digits: usize) -> Vec<String> {
    raw.lines()
        .map(|line| line.chars().filter(char::is_ascii_digit).collect::<String>())
        .filter(|digits| digits.len() >= min_digits)
        .collect()
}
