// src/tokenizer/pair.rs

use rustc_hash::FxHashMap;

/// Two adjacent symbol ids considered for a BPE merge.
pub type Pair = (u32, u32);

/// `(left, right) -> (rank, merged id)`. Lower ranks merge first.
pub type MergeMap = FxHashMap<Pair, (u32, u32)>;
