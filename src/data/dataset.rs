use burn::data::dataset::Dataset;

use crate::data::loader::ImageSample;

/// A fixed, ordered list of (path, label) samples.
/// Order is meaningful: evaluation relies on it to line up
/// predictions with ground truth.
#[derive(Debug, Clone)]
pub struct ImageFolderDataset {
    samples: Vec<ImageSample>,
}

impl ImageFolderDataset {
    pub fn new(samples: Vec<ImageSample>) -> Self { Self { samples } }

    pub fn labels(&self) -> Vec<usize> {
        self.samples.iter().map(|s| s.label).collect()
    }

    /// Per-class sample counts for `num_classes` classes.
    pub fn class_counts(&self, num_classes: usize) -> Vec<usize> {
        let mut counts = vec![0; num_classes];
        for s in &self.samples {
            if let Some(c) = counts.get_mut(s.label) {
                *c += 1;
            }
        }
        counts
    }
}

impl Dataset<ImageSample> for ImageFolderDataset {
    fn get(&self, index: usize) -> Option<ImageSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}
