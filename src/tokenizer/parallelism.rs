// src/tokenizer/parallelism.rs
//! Batch operations go through rayon, unless parallelism is switched off with the
//! `TOKENIZERS_PARALLELISM` environment variable or with [`set_parallelism`].

use rayon::prelude::*;
use rayon_cond::CondIterator;
use std::sync::atomic::{AtomicU8, Ordering};
use tracing::warn;

pub const ENV_VARIABLE: &str = "TOKENIZERS_PARALLELISM";

// 0: not overridden, 1: forced off, 2: forced on
static PARALLELISM_OVERRIDE: AtomicU8 = AtomicU8::new(0);

fn get_override_parallelism() -> Option<bool> {
    match PARALLELISM_OVERRIDE.load(Ordering::SeqCst) {
        1 => Some(false),
        2 => Some(true),
        _ => None,
    }
}

fn get_env_parallelism() -> bool {
    match std::env::var(ENV_VARIABLE) {
        Ok(value) => parse_parallelism(&value),
        Err(_) => true,
    }
}

fn parse_parallelism(value: &str) -> bool {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "false" | "f" | "off" | "no" | "n" | "0" => false,
        "true" | "t" | "on" | "yes" | "y" | "1" => true,
        other => {
            warn!(value = other, "unrecognized {ENV_VARIABLE} value, keeping parallelism on");
            true
        }
    }
}

/// Current parallelism setting: the programmatic override if any, otherwise the
/// environment variable, defaulting to on.
pub fn get_parallelism() -> bool {
    get_override_parallelism().unwrap_or_else(get_env_parallelism)
}

pub fn set_parallelism(val: bool) {
    PARALLELISM_OVERRIDE.store(if val { 2 } else { 1 }, Ordering::SeqCst);
}

/// Converts any collection into an iterator that is parallel or serial depending
/// on the current parallelism setting.
pub trait MaybeParallelIterator<P, S>
where
    P: ParallelIterator,
    S: Iterator<Item = P::Item>,
{
    fn into_maybe_par_iter(self) -> CondIterator<P, S>;
    fn into_maybe_par_iter_cond(self, cond: bool) -> CondIterator<P, S>;
}

impl<P, S, I> MaybeParallelIterator<P, S> for I
where
    I: IntoParallelIterator<Iter = P, Item = P::Item> + IntoIterator<IntoIter = S, Item = S::Item>,
    P: ParallelIterator,
    S: Iterator<Item = P::Item>,
{
    fn into_maybe_par_iter(self) -> CondIterator<P, S> {
        CondIterator::new(self, get_parallelism())
    }

    fn into_maybe_par_iter_cond(self, cond: bool) -> CondIterator<P, S> {
        if cond {
            self.into_maybe_par_iter()
        } else {
            CondIterator::from_serial(self)
        }
    }
}

/// Shared-reference flavour of [`MaybeParallelIterator`].
pub trait MaybeParallelRefIterator<'data, P, S>
where
    P: ParallelIterator,
    S: Iterator<Item = P::Item>,
    P::Item: 'data,
{
    fn maybe_par_iter(&'data self) -> CondIterator<P, S>;
    fn maybe_par_iter_cond(&'data self, cond: bool) -> CondIterator<P, S>;
}

impl<'data, P, S, I: 'data + ?Sized> MaybeParallelRefIterator<'data, P, S> for I
where
    &'data I: MaybeParallelIterator<P, S>,
    P: ParallelIterator,
    S: Iterator<Item = P::Item>,
    P::Item: 'data,
{
    fn maybe_par_iter(&'data self) -> CondIterator<P, S> {
        self.into_maybe_par_iter()
    }

    fn maybe_par_iter_cond(&'data self, cond: bool) -> CondIterator<P, S> {
        self.into_maybe_par_iter_cond(cond)
    }
}

/// Mutable-reference flavour of [`MaybeParallelIterator`].
pub trait MaybeParallelRefMutIterator<'data, P, S>
where
    P: ParallelIterator,
    S: Iterator<Item = P::Item>,
    P::Item: 'data,
{
    fn maybe_par_iter_mut(&'data mut self) -> CondIterator<P, S>;
    fn maybe_par_iter_mut_cond(&'data mut self, cond: bool) -> CondIterator<P, S>;
}

impl<'data, P, S, I: 'data + ?Sized> MaybeParallelRefMutIterator<'data, P, S> for I
where
    &'data mut I: MaybeParallelIterator<P, S>,
    P: ParallelIterator,
    S: Iterator<Item = P::Item>,
    P::Item: 'data,
{
    fn maybe_par_iter_mut(&'data mut self) -> CondIterator<P, S> {
        self.into_maybe_par_iter()
    }

    fn maybe_par_iter_mut_cond(&'data mut self, cond: bool) -> CondIterator<P, S> {
        self.into_maybe_par_iter_cond(cond)
    }
}
