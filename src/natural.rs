//! Natural ("numeric-aware") ordering of entry names.
//!
//! A stem is split into alternating text and digit runs; digit runs compare by
//! numeric value, text runs lexically. `P2` therefore sorts before `P10`.

use std::cmp::Ordering;
use std::path::Path;

/// One run of a split stem.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Chunk<'a> {
    Text(&'a str),
    Number(Digits<'a>),
}

/// A digit run compared by value without parsing, so arbitrarily long runs
/// never overflow.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Digits<'a>(&'a str);

impl Ord for Digits<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        let a = self.0.trim_start_matches('0');
        let b = other.0.trim_start_matches('0');
        a.len()
            .cmp(&b.len())
            .then_with(|| a.cmp(b))
            // "01" after "1" keeps the order total.
            .then_with(|| self.0.len().cmp(&other.0.len()))
    }
}

impl PartialOrd for Digits<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Split `s` into runs, always starting with a (possibly empty) text run so
/// that two keys line up position by position.
fn chunks(s: &str) -> Vec<Chunk<'_>> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut in_digits = false;

    for (i, c) in s.char_indices() {
        let is_digit = c.is_ascii_digit();
        if is_digit != in_digits {
            out.push(make_chunk(&s[start..i], in_digits));
            start = i;
            in_digits = is_digit;
        }
    }
    out.push(make_chunk(&s[start..], in_digits));
    out
}

fn make_chunk(run: &str, digits: bool) -> Chunk<'_> {
    if digits {
        Chunk::Number(Digits(run))
    } else {
        Chunk::Text(run)
    }
}

fn stem(name: &str) -> &str {
    Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name)
}

/// Compare two entry names by the natural order of their file stems.
///
/// Names with equal stems fall back to plain comparison of the full name so
/// the ordering is total and deterministic.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    chunks(stem(a))
        .cmp(&chunks(stem(b)))
        .then_with(|| a.cmp(b))
}

/// Sort names in natural order.
pub fn natural_sort<S: AsRef<str>>(names: &mut [S]) {
    names.sort_by(|a, b| natural_cmp(a.as_ref(), b.as_ref()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_runs_compare_by_value() {
        let mut names = vec!["P2.jpg", "P10.jpg", "P1.jpg"];
        natural_sort(&mut names);
        assert_eq!(names, vec!["P1.jpg", "P2.jpg", "P10.jpg"]);
    }

    #[test]
    fn leading_digits_and_text_mix() {
        let mut names = vec!["10 - end.png", "2 - middle.png", "1 - start.png"];
        natural_sort(&mut names);
        assert_eq!(names, vec!["1 - start.png", "2 - middle.png", "10 - end.png"]);
    }

    #[test]
    fn compares_stems_not_directories() {
        let mut names = vec!["b/page3.jpg", "a/page12.jpg", "c/page1.jpg"];
        natural_sort(&mut names);
        assert_eq!(names, vec!["c/page1.jpg", "b/page3.jpg", "a/page12.jpg"]);
    }

    #[test]
    fn zero_padding_is_ordered_consistently() {
        assert_eq!(natural_cmp("p001.jpg", "p2.jpg"), Ordering::Less);
        assert_eq!(natural_cmp("p1.jpg", "p01.jpg"), Ordering::Less);
        assert_eq!(natural_cmp("p1.jpg", "p1.jpg"), Ordering::Equal);
    }

    #[test]
    fn very_long_numbers_do_not_overflow() {
        let big = "x99999999999999999999999999999999999999.jpg";
        let bigger = "x100000000000000000000000000000000000000.jpg";
        assert_eq!(natural_cmp(big, bigger), Ordering::Less);
    }
}
