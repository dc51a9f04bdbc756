use std::path::{Path, PathBuf};

/// Bounded back-stack of shown images with a cursor.
///
/// `used[0]` is the newest entry; `position` points at the entry currently
/// committed to the display.
#[derive(Debug, Clone)]
pub struct History {
    used: Vec<PathBuf>,
    position: usize,
    limit: usize,
}

impl History {
    pub fn new(limit: usize) -> Self {
        Self {
            used: Vec::new(),
            position: 0,
            limit: limit.max(1),
        }
    }

    /// Start a history with the wallpaper found on the desktop at startup
    pub fn seeded(initial: Option<PathBuf>, limit: usize) -> Self {
        let mut history = Self::new(limit);
        if let Some(path) = initial {
            history.used.push(path);
        }
        history
    }

    /// Push a new image, discarding entries newer than the cursor
    pub fn advance(&mut self, image: PathBuf) {
        self.used.drain(..self.position.min(self.used.len()));
        self.used.insert(0, image);
        self.position = 0;
        self.used.truncate(self.limit);
    }

    /// Move towards older images. Returns the image to re-apply.
    pub fn step_back(&mut self) -> Option<PathBuf> {
        if !self.can_step_back() {
            return None;
        }
        self.position += 1;
        Some(self.used[self.position].clone())
    }

    /// Move towards newer images.
    ///
    /// Returns `None` at the newest entry, where going forward means showing
    /// a fresh image instead.
    pub fn step_forward(&mut self) -> Option<PathBuf> {
        if self.position == 0 {
            return None;
        }
        self.position -= 1;
        Some(self.used[self.position].clone())
    }

    pub fn can_step_back(&self) -> bool {
        self.position + 1 < self.used.len()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn len(&self) -> usize {
        self.used.len()
    }

    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }

    /// Entry under the cursor
    pub fn at_cursor(&self) -> Option<&Path> {
        self.used.get(self.position).map(|p| p.as_path())
    }

    /// Change the bound, dropping the oldest entries if needed
    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit.max(1);
        self.used.truncate(self.limit);
        self.clamp();
    }

    /// Rewrite every occurrence of `from` (after a file move)
    pub fn replace(&mut self, from: &Path, to: &Path) {
        for entry in self.used.iter_mut().filter(|e| e.as_path() == from) {
            *entry = to.to_path_buf();
        }
    }

    /// Forget every occurrence of `path`
    pub fn remove(&mut self, path: &Path) {
        let before_cursor = self.used[..self.position.min(self.used.len())]
            .iter()
            .filter(|e| e.as_path() == path)
            .count();
        self.used.retain(|e| e.as_path() != path);
        self.position -= before_cursor;
        self.clamp();
    }

    fn clamp(&mut self) {
        if self.is_empty() {
            self.position = 0;
        } else if self.position >= self.used.len() {
            self.position = self.used.len() - 1;
        }
    }

    #[cfg(test)]
    fn entries(&self) -> Vec<&str> {
        self.used.iter().map(|p| p.to_str().unwrap()).collect()
    }
}
