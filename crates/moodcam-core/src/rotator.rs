//! Non-repeating commentary selection.

use crate::commentary::{CommentaryCatalog, CommentaryCategory};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::Arc;

/// Random draws allowed per pick before giving up on avoiding a repeat.
pub const DEFAULT_RETRY_ATTEMPTS: usize = 5;

/// Last message index shown per category.
#[derive(Debug, Clone, Default)]
pub struct CommentaryHistory {
    last: HashMap<CommentaryCategory, usize>,
}

impl CommentaryHistory {
    pub fn last(&self, category: CommentaryCategory) -> Option<usize> {
        self.last.get(&category).copied()
    }

    fn record(&mut self, category: CommentaryCategory, index: usize) {
        self.last.insert(category, index);
    }

    pub fn clear(&mut self) {
        self.last.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.last.is_empty()
    }
}

/// Picks commentary at random, avoiding an immediate repeat per category.
pub struct MessageRotator<R = StdRng> {
    catalog: Arc<CommentaryCatalog>,
    history: CommentaryHistory,
    attempts: usize,
    rng: R,
}

impl MessageRotator<StdRng> {
    pub fn new(catalog: Arc<CommentaryCatalog>, attempts: usize) -> Self {
        Self::with_rng(catalog, attempts, StdRng::from_entropy())
    }

    /// Deterministic rotator for reproducible runs.
    pub fn seeded(catalog: Arc<CommentaryCatalog>, attempts: usize, seed: u64) -> Self {
        Self::with_rng(catalog, attempts, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> MessageRotator<R> {
    pub fn with_rng(catalog: Arc<CommentaryCatalog>, attempts: usize, rng: R) -> Self {
        Self {
            catalog,
            history: CommentaryHistory::default(),
            attempts: attempts.max(1),
            rng,
        }
    }

    /// Pick a message for `category`.
    ///
    /// Draws up to `attempts` times looking for something other than the
    /// previous pick; if every draw collides the previous message is reused.
    pub fn pick(&mut self, category: CommentaryCategory) -> String {
        let messages = self.catalog.messages(category);
        let previous = self.history.last(category);

        let mut choice = self.rng.gen_range(0..messages.len());
        let mut draws = 1;
        while Some(choice) == previous && draws < self.attempts {
            choice = self.rng.gen_range(0..messages.len());
            draws += 1;
        }

        if Some(choice) == previous && messages.len() > 1 {
            tracing::debug!(%category, draws, "commentary draws exhausted; repeating");
        }

        self.history.record(category, choice);
        messages[choice].clone()
    }

    /// Forget previous picks in every category.
    pub fn reset(&mut self) {
        self.history.clear();
    }

    pub fn history(&self) -> &CommentaryHistory {
        &self.history
    }
}
