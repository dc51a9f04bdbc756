use glob::glob;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Extensions accepted as wallpapers (compared case-insensitively)
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "gif", "png"];

/// Lazily lists eligible images from individual files and folders.
///
/// Nothing is cached: every call to [`Enumerator::iter`] walks the filesystem
/// again, so downloads and deletions are picked up on the next pass.
#[derive(Debug, Clone, Default)]
pub struct Enumerator {
    /// Individual files or glob patterns
    images: Vec<PathBuf>,
    /// Folders walked recursively
    folders: Vec<PathBuf>,
}

impl Enumerator {
    pub fn new(images: Vec<PathBuf>, folders: Vec<PathBuf>) -> Self {
        Self { images, folders }
    }

    pub fn folders(&self) -> &[PathBuf] {
        &self.folders
    }

    pub fn images(&self) -> &[PathBuf] {
        &self.images
    }

    /// Single pass over every eligible image: individual files first, then folders
    pub fn iter(&self) -> impl Iterator<Item = PathBuf> + '_ {
        let individual = self.images.iter().flat_map(|entry| expand_image_entry(entry));
        let walked = self.folders.iter().flat_map(|folder| walk_folder(folder));
        individual.chain(walked)
    }
}

/// Check if a file has an image extension
pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|e| e.eq_ignore_ascii_case(ext)))
}

fn is_glob_pattern(entry: &Path) -> bool {
    entry
        .to_str()
        .is_some_and(|s| s.contains(['*', '?', '[']))
}

fn expand_image_entry(entry: &Path) -> Vec<PathBuf> {
    if !is_glob_pattern(entry) {
        return if is_image(entry) && entry.is_file() {
            vec![entry.to_path_buf()]
        } else {
            Vec::new()
        };
    }

    let Some(pattern) = entry.to_str() else {
        return Vec::new();
    };
    match glob(pattern) {
        Ok(entries) => entries
            .flatten()
            .filter(|p| p.is_file() && is_image(p))
            .collect(),
        Err(e) => {
            log::warn!("Failed to glob pattern '{}': {}", pattern, e);
            Vec::new()
        }
    }
}

fn walk_folder(folder: &Path) -> Box<dyn Iterator<Item = PathBuf> + '_> {
    if !folder.is_dir() {
        log::debug!("Skipping missing folder {}", folder.display());
        return Box::new(std::iter::empty());
    }

    Box::new(
        WalkDir::new(folder)
            .follow_links(true)
            .into_iter()
            .filter_map(move |entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    log::warn!("Could not walk folder {}: {}", folder.display(), e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file() && is_image(entry.path()))
            .map(|entry| entry.into_path()),
    )
}
