use std::fs;
use std::path::{Path, PathBuf};

/// Where an image came from, for display purposes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub label: String,
    pub url: Option<String>,
}

/// Sidecar file next to a downloaded image (`<image>.txt`)
pub fn sidecar_path(image: &Path) -> PathBuf {
    let mut name = image.as_os_str().to_os_string();
    name.push(".txt");
    PathBuf::from(name)
}

/// Read the origin of `image`.
///
/// A sidecar starting with an `INFO:` line provides the label and URL on the
/// next two lines; otherwise the label is the containing folder.
pub fn read_origin(image: &Path) -> Origin {
    let fallback = Origin {
        label: image
            .parent()
            .map(|p| p.display().to_string())
            .unwrap_or_default(),
        url: None,
    };

    let Ok(contents) = fs::read_to_string(sidecar_path(image)) else {
        return fallback;
    };

    let mut lines = contents.lines().map(str::trim);
    if lines.next() != Some("INFO:") {
        return fallback;
    }

    match (lines.next(), lines.next()) {
        (Some(label), url) if !label.is_empty() => Origin {
            label: label.to_string(),
            url: url.filter(|u| !u.is_empty()).map(str::to_string),
        },
        _ => fallback,
    }
}
