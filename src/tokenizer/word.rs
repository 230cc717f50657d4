// src/tokenizer/word.rs

use crate::tokenizer::pair::MergeMap;
use rand::{Rng, thread_rng};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// A pending merge at symbol position `pos`.
#[derive(Debug, Eq)]
struct Merge {
    pos: usize,
    rank: u32,
    new_id: u32,
}

impl PartialEq for Merge {
    fn eq(&self, other: &Self) -> bool {
        self.rank == other.rank && self.pos == other.pos
    }
}

impl PartialOrd for Merge {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Merge {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap pops the greatest element: lowest rank first, then leftmost.
        other
            .rank
            .cmp(&self.rank)
            .then_with(|| other.pos.cmp(&self.pos))
    }
}

/// A symbol of the word, linked to its neighbours by position.
/// A merged-away symbol keeps its slot with `len == 0`.
#[derive(Debug, Clone, Copy)]
struct Symbol {
    c: u32,
    prev: isize,
    next: isize,
    start: usize,
    len: usize,
}

impl Symbol {
    fn merge_with(&mut self, other: &Self, new_c: u32) {
        self.c = new_c;
        self.len = other.start + other.len - self.start;
        self.next = other.next;
    }
}

/// A pretoken being merged by BPE: a doubly linked list of symbol ids over a
/// flat vector, each symbol remembering which bytes of the input it covers.
#[derive(Debug, Clone, Default)]
pub struct Word {
    symbols: Vec<Symbol>,
    end: usize,
}

impl Word {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            symbols: Vec::with_capacity(capacity),
            end: 0,
        }
    }

    /// Append a symbol covering `byte_len` bytes of the input.
    pub fn add(&mut self, c: u32, byte_len: usize) {
        let len = self.symbols.len() as isize;
        let prev = match self.symbols.last_mut() {
            Some(last) => {
                last.next = len;
                len - 1
            }
            None => -1,
        };
        self.symbols.push(Symbol {
            c,
            prev,
            next: -1,
            start: self.end,
            len: byte_len,
        });
        self.end += byte_len;
    }

    /// Leave `byte_len` bytes of the input without a symbol.
    pub fn skip(&mut self, byte_len: usize) {
        self.end += byte_len;
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Apply every possible merge, lowest rank first and leftmost on equal ranks.
    ///
    /// With `dropout`, each candidate merge is skipped with that probability.
    /// Skipped candidates go back in the queue as soon as another merge happens.
    pub fn merge_all(&mut self, merges: &MergeMap, dropout: Option<f32>) {
        let mut queue = BinaryHeap::with_capacity(self.symbols.len());
        let mut skip = Vec::with_capacity(queue.capacity());

        queue.extend(
            self.symbols
                .windows(2)
                .enumerate()
                .filter_map(|(pos, window)| {
                    merges
                        .get(&(window[0].c, window[1].c))
                        .map(|&(rank, new_id)| Merge { pos, rank, new_id })
                }),
        );

        let mut rng = dropout.map(|_| thread_rng());
        while let Some(top) = queue.pop() {
            if let (Some(p), Some(rng)) = (dropout, rng.as_mut()) {
                if rng.r#gen::<f32>() < p {
                    skip.push(top);
                    continue;
                }
            }
            queue.extend(skip.drain(..));

            if self.symbols[top.pos].len == 0 || self.symbols[top.pos].next == -1 {
                continue;
            }

            let next_pos = self.symbols[top.pos].next as usize;
            let right = self.symbols[next_pos];

            // The queue may hold stale entries for pairs that changed since.
            let target = (self.symbols[top.pos].c, right.c);
            if merges
                .get(&target)
                .is_none_or(|&(_, new_id)| new_id != top.new_id)
            {
                continue;
            }

            self.symbols[top.pos].merge_with(&right, top.new_id);
            self.symbols[next_pos].len = 0;
            if right.next > -1 && (right.next as usize) < self.symbols.len() {
                self.symbols[right.next as usize].prev = top.pos as isize;
            }

            let current = self.symbols[top.pos];
            if current.prev >= 0 {
                let prev = current.prev as usize;
                if let Some(&(rank, new_id)) = merges.get(&(self.symbols[prev].c, current.c)) {
                    queue.push(Merge {
                        pos: prev,
                        rank,
                        new_id,
                    });
                }
            }
            if current.next >= 0 && (current.next as usize) < self.symbols.len() {
                let next = current.next as usize;
                if let Some(&(rank, new_id)) = merges.get(&(current.c, self.symbols[next].c)) {
                    queue.push(Merge {
                        pos: top.pos,
                        rank,
                        new_id,
                    });
                }
            }
        }

        self.symbols.retain(|s| s.len != 0);
    }

    pub fn get_chars(&self) -> Vec<u32> {
        self.symbols.iter().map(|s| s.c).collect()
    }

    pub fn get_chars_iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.symbols.iter().map(|s| s.c)
    }

    /// Byte offsets of each symbol inside the word.
    pub fn get_offsets_iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.symbols.iter().map(|s| (s.start, s.start + s.len))
    }
}
