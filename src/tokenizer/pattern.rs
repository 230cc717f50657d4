// src/tokenizer/pattern.rs

use crate::tokenizer::{Offsets, Result};

/// Something that can find matches inside a string.
///
/// `find_matches` returns a partition of `inside`: consecutive, non-overlapping
/// spans covering the whole input, each flagged with whether it is a match.
pub trait Pattern {
    fn find_matches(&self, inside: &str) -> Result<Vec<(Offsets, bool)>>;
}

impl Pattern for char {
    fn find_matches(&self, inside: &str) -> Result<Vec<(Offsets, bool)>> {
        let is_char = |c: char| -> bool { c == *self };
        is_char.find_matches(inside)
    }
}

impl Pattern for &str {
    fn find_matches(&self, inside: &str) -> Result<Vec<(Offsets, bool)>> {
        if self.is_empty() || inside.is_empty() {
            return Ok(vec![((0, inside.len()), false)]);
        }

        let mut splits = Vec::new();
        let mut prev = 0;
        for (start, m) in inside.match_indices(*self) {
            if prev != start {
                splits.push(((prev, start), false));
            }
            splits.push(((start, start + m.len()), true));
            prev = start + m.len();
        }
        if prev != inside.len() {
            splits.push(((prev, inside.len()), false));
        }
        Ok(splits)
    }
}

impl Pattern for &String {
    fn find_matches(&self, inside: &str) -> Result<Vec<(Offsets, bool)>> {
        self.as_str().find_matches(inside)
    }
}

impl Pattern for &regex::Regex {
    fn find_matches(&self, inside: &str) -> Result<Vec<(Offsets, bool)>> {
        if inside.is_empty() {
            return Ok(vec![((0, 0), false)]);
        }

        let mut prev = 0;
        let mut splits = Vec::with_capacity(inside.len());
        for m in self.find_iter(inside) {
            if m.start() == m.end() {
                continue;
            }
            if prev != m.start() {
                splits.push(((prev, m.start()), false));
            }
            splits.push(((m.start(), m.end()), true));
            prev = m.end();
        }
        if prev != inside.len() {
            splits.push(((prev, inside.len()), false));
        }
        Ok(splits)
    }
}

impl Pattern for &fancy_regex::Regex {
    fn find_matches(&self, inside: &str) -> Result<Vec<(Offsets, bool)>> {
        if inside.is_empty() {
            return Ok(vec![((0, 0), false)]);
        }

        let mut prev = 0;
        let mut splits = Vec::with_capacity(inside.len());
        for m in self.find_iter(inside) {
            let m = m?;
            if m.start() == m.end() {
                continue;
            }
            if prev != m.start() {
                splits.push(((prev, m.start()), false));
            }
            splits.push(((m.start(), m.end()), true));
            prev = m.end();
        }
        if prev != inside.len() {
            splits.push(((prev, inside.len()), false));
        }
        Ok(splits)
    }
}

impl<F> Pattern for F
where
    F: Fn(char) -> bool,
{
    fn find_matches(&self, inside: &str) -> Result<Vec<(Offsets, bool)>> {
        if inside.is_empty() {
            return Ok(vec![((0, 0), false)]);
        }

        let mut last_offset = 0;
        let mut matches = Vec::new();
        for (b, c) in inside.char_indices() {
            if self(c) {
                if last_offset < b {
                    matches.push(((last_offset, b), false));
                }
                matches.push(((b, b + c.len_utf8()), true));
                last_offset = b + c.len_utf8();
            }
        }
        if inside.len() > last_offset {
            matches.push(((last_offset, inside.len()), false));
        }
        Ok(matches)
    }
}

/// Flips which spans of the inner pattern count as matches.
pub struct Invert<P: Pattern>(pub P);

impl<P: Pattern> Pattern for Invert<P> {
    fn find_matches(&self, inside: &str) -> Result<Vec<(Offsets, bool)>> {
        Ok(self
            .0
            .find_matches(inside)?
            .into_iter()
            .map(|(offsets, flag)| (offsets, !flag))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    #[test]
    fn char_pattern_partitions_input() {
        assert_eq!(
            'a'.find_matches("aba").unwrap(),
            vec![((0, 1), true), ((1, 2), false), ((2, 3), true)]
        );
        assert_eq!('a'.find_matches("").unwrap(), vec![((0, 0), false)]);
    }

    #[test]
    fn str_pattern_finds_every_occurrence() {
        assert_eq!(
            "ab".find_matches("xxabyab").unwrap(),
            vec![((0, 2), false), ((2, 4), true), ((4, 5), false), ((5, 7), true)]
        );
        assert_eq!("".find_matches("abc").unwrap(), vec![((0, 3), false)]);
    }

    #[test]
    fn regex_pattern_skips_empty_matches() {
        let re = Regex::new(r"\s*").unwrap();
        assert_eq!(
            (&re).find_matches("a  b").unwrap(),
            vec![((0, 1), false), ((1, 3), true), ((3, 4), false)]
        );
    }

    #[test]
    fn fancy_regex_supports_lookahead() {
        let re = fancy_regex::Regex::new(r"\s+(?!\S)").unwrap();
        assert_eq!(
            (&re).find_matches("a   b").unwrap(),
            vec![((0, 1), false), ((1, 3), true), ((3, 5), false)]
        );
    }

    #[test]
    fn function_pattern_and_invert() {
        let is_space = |c: char| c.is_whitespace();
        assert_eq!(
            is_space.find_matches("a b").unwrap(),
            vec![((0, 1), false), ((1, 2), true), ((2, 3), false)]
        );
        assert_eq!(
            Invert(is_space).find_matches("a b").unwrap(),
            vec![((0, 1), true), ((1, 2), false), ((2, 3), true)]
        );
    }
}
