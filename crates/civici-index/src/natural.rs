//! Natural ordering for civic numbers
//!
//! `"9"` sorts before `"10"`, `"10"` before `"10/A"`, and `"10/a"` next to
//! `"10/A"`. Digit runs compare by value, other characters compare
//! case-insensitively with punctuation before digits before letters.
//! Punctuation and whitespace order among themselves by code point
//! (`' ' < ',' < '-' < '/'`), not by a locale collation table. Strings that
//! are equal under those rules fall back to plain `str` ordering, so the
//! comparator is a total order.

use std::cmp::Ordering;
use std::iter::Peekable;
use std::str::CharIndices;

/// Compare two civic-number strings in natural order
pub fn compare(a: &str, b: &str) -> Ordering {
    let mut left = a.char_indices().peekable();
    let mut right = b.char_indices().peekable();

    loop {
        let (l, r) = match (left.next(), right.next()) {
            (None, None) => break,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) => (l, r),
        };

        let ordering = if l.1.is_ascii_digit() && r.1.is_ascii_digit() {
            let l_run = digit_run(a, l.0, &mut left);
            let r_run = digit_run(b, r.0, &mut right);
            compare_numeric(l_run, r_run)
        } else {
            class_rank(l.1)
                .cmp(&class_rank(r.1))
                .then_with(|| l.1.to_lowercase().cmp(r.1.to_lowercase()))
        };

        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    a.cmp(b)
}

/// Consume the rest of the digit run starting at `start` and return it.
fn digit_run<'a>(s: &'a str, start: usize, chars: &mut Peekable<CharIndices<'a>>) -> &'a str {
    let mut end = s.len();
    while let Some(&(idx, c)) = chars.peek() {
        if !c.is_ascii_digit() {
            end = idx;
            break;
        }
        chars.next();
    }
    &s[start..end]
}

/// Compare digit strings by value without parsing, so any length works.
fn compare_numeric(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn class_rank(c: char) -> u8 {
    if c.is_ascii_digit() {
        1
    } else if c.is_alphabetic() {
        2
    } else {
        0
    }
}

/// Stable in-place sort of items by a civic-number key
pub fn sort_by_key<T>(items: &mut [T], key: impl Fn(&T) -> &str) {
    items.sort_by(|a, b| compare(key(a), key(b)));
}
