// ============================================================
// Layer 4 — Image Folder Loader
// ============================================================
// Indexes a labeled image tree the way a directory iterator
// does:
//
//   training_data/
//     adeno_carcinoma/        ← class 0
//       000001.png
//       000002.png
//     large_cell_carcinoma/   ← class 1
//     normal/                 ← class 2
//     squamous_cell_carcinoma/← class 3
//
// Rules:
//   - Classes are the immediate subdirectories, sorted by name
//     (byte order); the index is the position in that order
//   - Files inside each class are sorted by name
//   - Only known image extensions are kept (case-insensitive)
//   - Nested subdirectories are walked recursively and their
//     files belong to the top-level class
//
// Nothing is decoded here: the result is a cheap list of
// (path, label) pairs. Decoding happens per batch.
//
// Reference: Rust Book §8 (Collections)
//            Rust Book §9 (Error Handling)

use anyhow::{bail, Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::domain::labels::ClassLabels;

/// Extensions accepted as images.
pub const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "bmp", "tif", "tiff"];

/// One image on disk and its class index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSample {
    pub path:  PathBuf,
    pub label: usize,
}

/// The indexed directory: class names and every sample in order.
#[derive(Debug, Clone)]
pub struct ImageFolder {
    pub root:    PathBuf,
    pub classes: Vec<String>,
    /// Grouped by class, each group sorted by file name.
    pub samples: Vec<ImageSample>,
}

impl ImageFolder {
    /// Scan `root`. A missing directory or one with no class
    /// subdirectories is an error: nothing downstream can work.
    pub fn scan(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            bail!("Image directory '{}' does not exist", root.display());
        }

        let mut classes: Vec<String> = fs::read_dir(root)
            .with_context(|| format!("Cannot read directory '{}'", root.display()))?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        classes.sort();

        if classes.is_empty() {
            bail!("'{}' contains no class subdirectories", root.display());
        }

        let mut samples = Vec::new();
        for (label, class) in classes.iter().enumerate() {
            let mut files = Vec::new();
            collect_images(&root.join(class), &mut files)?;
            files.sort();
            samples.extend(files.into_iter().map(|path| ImageSample { path, label }));
        }

        tracing::info!(
            "Found {} images belonging to {} classes in {}",
            samples.len(),
            classes.len(),
            root.display()
        );

        Ok(Self { root: root.to_path_buf(), classes, samples })
    }

    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn labels(&self) -> ClassLabels {
        ClassLabels::new(self.classes.clone())
    }

    /// Per-sample class index, in sample order.
    pub fn targets(&self) -> Vec<usize> {
        self.samples.iter().map(|s| s.label).collect()
    }
}

pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn collect_images(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)
        .with_context(|| format!("Cannot read directory '{}'", dir.display()))?
    {
        let path = entry?.path();
        if path.is_dir() {
            collect_images(&path, out)?;
        } else if is_image(&path) {
            out.push(path);
        }
    }
    Ok(())
}
