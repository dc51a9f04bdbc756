use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::enumerator::Enumerator;

/// Estimates below this are always recounted
const MIN_TRUSTED_ESTIMATE: usize = 20;

/// One draw in `0..=RECOUNT_ODDS` triggers a recount
const RECOUNT_ODDS: u32 = 20;

/// Draws approximately uniform random images without storing the full list.
///
/// Keeps an estimate of the total image count that is refreshed now and then,
/// so most draws cost a single partial pass over the enumerator.
#[derive(Debug, Default)]
pub struct Sampler {
    estimate: AtomicUsize,
}

impl Sampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last known number of eligible images (0 if never counted)
    pub fn image_count(&self) -> usize {
        self.estimate.load(Ordering::Relaxed)
    }

    /// Forget the estimate, forcing a recount on the next draw
    pub fn invalidate(&self) {
        self.estimate.store(0, Ordering::Relaxed);
    }

    /// Up to `count` distinct images in random order
    pub fn sample(&self, enumerator: &Enumerator, count: usize) -> Vec<PathBuf> {
        let mut rng = rand::rng();

        let cached = self.image_count();
        let total = if cached < MIN_TRUSTED_ESTIMATE || rng.random_range(0..=RECOUNT_ODDS) == 0 {
            let counted = enumerator.iter().count();
            log::debug!("Counted {} images (previous estimate {})", counted, cached);
            self.estimate.store(counted, Ordering::Relaxed);
            counted
        } else {
            cached
        };

        if total == 0 || count == 0 {
            return Vec::new();
        }

        let wanted = count.min(total);
        let mut indexes = HashSet::with_capacity(wanted);
        while indexes.len() < wanted {
            indexes.insert(rng.random_range(0..total));
        }

        // Indexes past the end of a shrunken folder set simply never match
        let mut result = Vec::with_capacity(wanted);
        for (index, path) in enumerator.iter().enumerate() {
            if indexes.remove(&index) {
                result.push(path);
                if indexes.is_empty() {
                    break;
                }
            }
        }

        result.shuffle(&mut rng);
        result
    }
}
