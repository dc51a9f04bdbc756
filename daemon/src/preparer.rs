//! Keeps a small buffer of vetted candidates ready for the next change.
//!
//! A refill pass draws a batch from the sampler and runs it through the color
//! filter at increasing tolerance until enough images pass. When nothing
//! passes at all, the first non-current candidate is taken anyway so the
//! rotation never stalls on a strict color preference.

use rand::seq::SliceRandom;
use std::collections::HashSet;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::color::{Color, ColorFilter};
use crate::engine::Engine;
use crate::locked;

/// Candidates drawn per refill pass
pub const REFILL_BATCH: usize = 100;

/// Escalation stops once more images than this were accepted
const ENOUGH_ACCEPTED: usize = 10;

/// Idle re-check interval of the preparer task
const PREPARE_TIMEOUT: Duration = Duration::from_secs(30);

/// Ordered candidates; the head (next to be shown) is the last element.
#[derive(Debug, Default)]
pub struct PreparedBuffer {
    items: Vec<PathBuf>,
    generation: u64,
}

impl PreparedBuffer {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Bumped on every reset; a refill started under an older generation is stale
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Take the head
    pub fn pop(&mut self) -> Option<PathBuf> {
        self.items.pop()
    }

    /// Drop everything and invalidate in-flight refills
    pub fn reset(&mut self) {
        self.items.clear();
        self.generation += 1;
    }

    pub fn remove(&mut self, path: &Path) {
        self.items.retain(|p| p != path);
    }

    /// Add `accepted`, dedup, reshuffle, and never leave `current` at the head
    pub fn merge(&mut self, accepted: Vec<PathBuf>, current: Option<&Path>) {
        self.items.extend(accepted);

        let mut seen = HashSet::new();
        self.items.retain(|p| seen.insert(p.clone()));

        self.items.shuffle(&mut rand::rng());
        if self.items.last().map(PathBuf::as_path) == current && current.is_some() {
            self.items.pop();
        }
    }

    /// Whether the buffer is low enough to need another pass
    pub fn needs_refill(&self, image_count: usize) -> bool {
        self.is_empty() || self.len() <= ENOUGH_ACCEPTED.min(image_count / 20)
    }
}

/// Run `candidates` through the color filter with escalating tolerance.
///
/// Returns accepted images in acceptance order, never including `current`.
pub fn select_candidates(
    color: &ColorFilter,
    candidates: &[PathBuf],
    current: Option<&Path>,
    desired: Option<Color>,
    tolerances: RangeInclusive<u32>,
) -> Vec<PathBuf> {
    let mut accepted = Vec::new();
    let mut seen = HashSet::new();

    for tolerance in tolerances {
        if accepted.len() > ENOUGH_ACCEPTED {
            break;
        }
        for image in candidates {
            if Some(image.as_path()) == current || seen.contains(image) {
                continue;
            }
            if color.accepts(image, desired, tolerance) {
                log::debug!("Accepted {} at tolerance {}", image.display(), tolerance);
                seen.insert(image.clone());
                accepted.push(image.clone());
            }
        }
    }

    if accepted.is_empty() {
        if let Some(first) = candidates.iter().find(|c| Some(c.as_path()) != current) {
            log::info!(
                "Could not find any image matching the color preference, using {}",
                first.display()
            );
            accepted.push(first.clone());
        }
    }

    accepted
}

impl Engine {
    /// One refill pass. Blocking. Returns how many images were added.
    pub(crate) fn refill(&self) -> usize {
        let snapshot = self.snapshot();
        let generation = locked!(self.prepared).generation();

        let candidates = self
            .sampler
            .sample(&snapshot.sources.enumerator, REFILL_BATCH);
        log::debug!("Refill pass over {} candidates", candidates.len());
        if candidates.is_empty() {
            return 0;
        }

        let desired = snapshot.config.desired_color();
        if desired.is_some() {
            self.color.warm(&candidates);
            log::debug!("Color cache holds {} entries", self.color.cached_len());
        }

        let accepted = select_candidates(
            &self.color,
            &candidates,
            self.current().as_deref(),
            desired,
            snapshot.config.tolerance_levels(),
        );

        // The display may have moved on during the pass
        let current = self.current();
        let accepted: Vec<PathBuf> = accepted
            .into_iter()
            .filter(|p| Some(p) != current.as_ref())
            .collect();
        let added = accepted.len();

        let mut prepared = locked!(self.prepared);
        if prepared.generation() != generation {
            log::debug!("Discarding refill results from before a reload");
            return 0;
        }
        prepared.merge(accepted, current.as_deref());
        log::info!("After refill prepared buffer contains {} images", prepared.len());
        added
    }

    pub(crate) async fn run_preparer(self: Arc<Self>) {
        log::info!("Preparer started");

        while self.is_running() {
            let needs_refill = {
                let prepared = locked!(self.prepared);
                log::debug!("Prepared buffer contains {} images", prepared.len());
                prepared.needs_refill(self.sampler.image_count())
            };

            if needs_refill {
                let engine = self.clone();
                match tokio::task::spawn_blocking(move || engine.refill()).await {
                    Ok(added) => log::debug!("Refill added {} images", added),
                    Err(e) => log::error!("Refill task failed: {}", e),
                }
            }

            self.prepare_event.wait_timeout(PREPARE_TIMEOUT).await;
        }

        log::info!("Preparer stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::tests::StemExtractor;
    use crate::engine::test_support::*;

    fn p(s: &str) -> PathBuf {
        PathBuf::from(s)
    }

    const RED: Color = Color::new(255, 0, 0);

    fn abc_filter() -> ColorFilter {
        ColorFilter::new(Box::new(StemExtractor::new(&[
            ("a", Color::new(165, 0, 0)), // distance 90
            ("b", Color::new(215, 0, 0)), // distance 40
            ("c", Color::new(255, 90, 0)), // distance 90
        ])))
    }

    #[test]
    fn test_escalation_accepts_by_tolerance() {
        let filter = abc_filter();
        let candidates = vec![p("/w/a.jpg"), p("/w/b.jpg"), p("/w/c.jpg")];

        let accepted = select_candidates(&filter, &candidates, None, Some(RED), 2..=6);
        // B passes from tolerance 3, A and C only at 6
        assert_eq!(accepted, vec![p("/w/b.jpg"), p("/w/a.jpg"), p("/w/c.jpg")]);

        let accepted = select_candidates(&filter, &candidates, None, Some(RED), 2..=5);
        assert_eq!(accepted, vec![p("/w/b.jpg")]);
    }

    #[test]
    fn test_force_accepts_first_non_current() {
        let filter = abc_filter();
        let candidates = vec![p("/w/a.jpg"), p("/w/c.jpg")];

        let accepted = select_candidates(
            &filter,
            &candidates,
            Some(Path::new("/w/a.jpg")),
            Some(RED),
            2..=3,
        );
        assert_eq!(accepted, vec![p("/w/c.jpg")]);
    }

    #[test]
    fn test_never_selects_current() {
        let filter = abc_filter();
        let candidates = vec![p("/w/b.jpg")];
        let accepted = select_candidates(
            &filter,
            &candidates,
            Some(Path::new("/w/b.jpg")),
            Some(RED),
            2..=6,
        );
        assert!(accepted.is_empty());
    }

    #[test]
    fn test_no_color_preference_accepts_whole_batch() {
        let filter = ColorFilter::new(Box::new(StemExtractor::new(&[])));
        let candidates: Vec<PathBuf> = (0..30).map(|i| p(&format!("/w/{}.jpg", i))).collect();
        let accepted = select_candidates(&filter, &candidates, None, None, 2..=6);
        assert_eq!(accepted.len(), 30);
    }

    #[test]
    fn test_escalation_stops_when_enough_accepted() {
        let mut entries: Vec<(String, Color)> = (0..11)
            .map(|i| (format!("near{}", i), Color::new(215, 0, 0)))
            .collect();
        entries.push(("far".to_string(), Color::new(165, 0, 0)));
        let entries: Vec<(&str, Color)> = entries.iter().map(|(s, c)| (s.as_str(), *c)).collect();
        let filter = ColorFilter::new(Box::new(StemExtractor::new(&entries)));

        let candidates: Vec<PathBuf> = entries
            .iter()
            .map(|(stem, _)| p(&format!("/w/{}.jpg", stem)))
            .collect();
        let accepted = select_candidates(&filter, &candidates, None, Some(RED), 2..=6);
        assert_eq!(accepted.len(), 11);
        assert!(!accepted.contains(&p("/w/far.jpg")));
    }

    #[test]
    fn test_merge_never_leaves_current_at_head() {
        let current = p("/w/current.jpg");
        for _ in 0..50 {
            let mut buffer = PreparedBuffer::default();
            buffer.merge(
                vec![p("/w/x.jpg"), current.clone(), p("/w/x.jpg")],
                Some(&current),
            );
            assert_ne!(buffer.pop(), Some(current.clone()));
        }
    }

    #[test]
    fn test_merge_dedups() {
        let mut buffer = PreparedBuffer::default();
        buffer.merge(vec![p("/a"), p("/b")], None);
        buffer.merge(vec![p("/b"), p("/c")], None);
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn test_needs_refill_threshold() {
        let mut buffer = PreparedBuffer::default();
        assert!(buffer.needs_refill(0));

        buffer.merge((0..5).map(|i| p(&format!("/{}", i))).collect(), None);
        assert!(!buffer.needs_refill(50));
        assert!(buffer.needs_refill(100));

        buffer.merge((5..20).map(|i| p(&format!("/{}", i))).collect(), None);
        assert!(!buffer.needs_refill(100_000));
    }

    #[test]
    fn test_reset_bumps_generation() {
        let mut buffer = PreparedBuffer::default();
        buffer.merge(vec![p("/a")], None);
        let generation = buffer.generation();
        buffer.reset();
        assert!(buffer.is_empty());
        assert_eq!(buffer.generation(), generation + 1);
    }

    #[tokio::test]
    async fn test_refill_excludes_current() {
        let dir = tempfile::tempdir().unwrap();
        let images = write_images(dir.path(), 5);
        let store = RecordingStore {
            initial: Some(images[2].clone()),
            ..Default::default()
        };
        let engine = test_engine(test_config(dir.path()), store);

        assert_eq!(engine.refill(), 4);
        let mut prepared = locked!(engine.prepared);
        assert_eq!(prepared.len(), 4);
        while let Some(image) = prepared.pop() {
            assert_ne!(image, images[2]);
        }
    }

    #[tokio::test]
    async fn test_refill_with_only_current_adds_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let images = write_images(dir.path(), 1);
        let store = RecordingStore {
            initial: Some(images[0].clone()),
            ..Default::default()
        };
        let engine = test_engine(test_config(dir.path()), store);

        assert_eq!(engine.refill(), 0);
        assert!(locked!(engine.prepared).is_empty());
    }

    #[tokio::test]
    async fn test_preparer_task_fills_buffer() {
        let dir = tempfile::tempdir().unwrap();
        write_images(dir.path(), 8);
        let engine = test_engine(test_config(dir.path()), RecordingStore::default());

        let task = tokio::spawn(engine.clone().run_preparer());
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(locked!(engine.prepared).len(), 8);

        engine.shutdown();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
    }
}
