// src/tokenizer/first_last_iterator.rs

use std::{iter, mem};

/// Adds `with_first_and_last` to every iterator.
pub trait WithFirstLastIterator: Iterator + Sized {
    fn with_first_and_last(self) -> FirstLastIterator<Self>;
}

impl<I> WithFirstLastIterator for I
where
    I: Iterator,
{
    fn with_first_and_last(self) -> FirstLastIterator<Self> {
        FirstLastIterator {
            first: true,
            iter: self.peekable(),
        }
    }
}

/// Yields `(is_first, is_last, item)`. Decoders use it to treat the word
/// boundaries at both ends of a token sequence differently.
pub struct FirstLastIterator<I>
where
    I: Iterator,
{
    first: bool,
    iter: iter::Peekable<I>,
}

impl<I> Iterator for FirstLastIterator<I>
where
    I: Iterator,
{
    type Item = (bool, bool, I::Item);

    fn next(&mut self) -> Option<Self::Item> {
        let first = mem::replace(&mut self.first, false);
        self.iter
            .next()
            .map(|e| (first, self.iter.peek().is_none(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_both_ends() {
        let flags = ["a", "b", "c"]
            .iter()
            .with_first_and_last()
            .map(|(first, last, _)| (first, last))
            .collect::<Vec<_>>();
        assert_eq!(flags, vec![(true, false), (false, false), (false, true)]);

        let single = std::iter::once(1).with_first_and_last().collect::<Vec<_>>();
        assert_eq!(single, vec![(true, true, 1)]);
    }
}
