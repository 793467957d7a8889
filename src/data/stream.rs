// ============================================================
// Layer 4 — Image Streams
// ============================================================
// A stream is a dataset plus the policy for walking it:
//
//   stream       shuffle        augment   last partial batch
//   ──────────   ────────────   ───────   ──────────────────
//   training     per epoch      optional  dropped
//   validation   no             no        dropped
//   evaluation   no             no        kept
//
// Steps per epoch:
//   drop_last → floor(N / batch_size)   e.g. 100 / 32 → 3
//   keep_last → ceil(N / batch_size)
//
// Shuffling and augmentation draw from StdRng seeded with
// (seed + epoch), so epoch k looks the same on every run.
//
// Images are decoded lazily, one batch at a time, so memory
// stays bounded by the batch size rather than the dataset.

use anyhow::Result;
use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    prelude::*,
};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::data::{
    augment::Augmenter,
    batcher::{ImageBatch, ImageBatcher, ImageItem},
    dataset::ImageFolderDataset,
    loader::ImageSample,
    preprocessor::Preprocessor,
};

pub struct ImageStream {
    dataset:      ImageFolderDataset,
    preprocessor: Preprocessor,
    batcher:      ImageBatcher,
    batch_size:   usize,
    shuffle_seed: Option<u64>,
    augmenter:    Option<Augmenter>,
    drop_last:    bool,
}

impl ImageStream {
    fn new(
        samples:      Vec<ImageSample>,
        preprocessor: Preprocessor,
        num_classes:  usize,
        batch_size:   usize,
    ) -> Self {
        Self {
            dataset: ImageFolderDataset::new(samples),
            batcher: ImageBatcher::new(preprocessor.image_size(), num_classes),
            preprocessor,
            batch_size: batch_size.max(1),
            shuffle_seed: None,
            augmenter: None,
            drop_last: true,
        }
    }

    /// Shuffled every epoch, optionally augmented, remainder dropped.
    pub fn training(
        samples:      Vec<ImageSample>,
        preprocessor: Preprocessor,
        num_classes:  usize,
        batch_size:   usize,
        seed:         u64,
        augment:      bool,
    ) -> Self {
        let mut s = Self::new(samples, preprocessor, num_classes, batch_size);
        s.shuffle_seed = Some(seed);
        s.augmenter    = augment.then(Augmenter::default);
        s
    }

    /// Fixed order, no augmentation, remainder dropped.
    pub fn validation(
        samples:      Vec<ImageSample>,
        preprocessor: Preprocessor,
        num_classes:  usize,
        batch_size:   usize,
    ) -> Self {
        Self::new(samples, preprocessor, num_classes, batch_size)
    }

    /// Fixed order, no augmentation, every sample visited.
    pub fn evaluation(
        samples:      Vec<ImageSample>,
        preprocessor: Preprocessor,
        num_classes:  usize,
        batch_size:   usize,
    ) -> Self {
        let mut s = Self::new(samples, preprocessor, num_classes, batch_size);
        s.drop_last = false;
        s
    }

    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn steps_per_epoch(&self) -> usize {
        let n = self.len();
        if self.drop_last {
            n / self.batch_size
        } else {
            n.div_ceil(self.batch_size)
        }
    }

    /// Ground-truth labels in unshuffled stream order.
    pub fn labels(&self) -> Vec<usize> {
        self.dataset.labels()
    }

    /// Visiting order for `epoch`.
    pub fn epoch_order(&self, epoch: usize) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.len()).collect();
        if let Some(seed) = self.shuffle_seed {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(epoch as u64));
            order.shuffle(&mut rng);
        }
        order
    }

    /// Iterate the batches of one epoch on `device`.
    pub fn batches<B: Backend>(&self, epoch: usize, device: &B::Device) -> EpochBatches<'_, B> {
        let aug_seed = self
            .shuffle_seed
            .unwrap_or(0)
            .wrapping_add(epoch as u64)
            .wrapping_mul(0x9E37_79B9_7F4A_7C15);

        EpochBatches {
            stream: self,
            order:  self.epoch_order(epoch),
            step:   0,
            steps:  self.steps_per_epoch(),
            rng:    StdRng::seed_from_u64(aug_seed),
            device: device.clone(),
        }
    }

    fn load_item(&self, sample: &ImageSample, rng: &mut StdRng) -> Result<ImageItem> {
        let img = self.preprocessor.load_path(&sample.path)?;
        let img = match &self.augmenter {
            Some(aug) => aug.apply(&img, rng),
            None      => img,
        };
        Ok(ImageItem { pixels: self.preprocessor.to_chw(&img), label: sample.label })
    }
}

/// Lazily decoded batches of one epoch.
pub struct EpochBatches<'a, B: Backend> {
    stream: &'a ImageStream,
    order:  Vec<usize>,
    step:   usize,
    steps:  usize,
    rng:    StdRng,
    device: B::Device,
}

impl<B: Backend> Iterator for EpochBatches<'_, B> {
    type Item = Result<ImageBatch<B>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.step >= self.steps {
            return None;
        }
        let bs    = self.stream.batch_size;
        let start = self.step * bs;
        let end   = (start + bs).min(self.order.len());
        self.step += 1;

        let mut items = Vec::with_capacity(end - start);
        for &idx in &self.order[start..end] {
            let sample = self.stream.dataset.get(idx)?;
            match self.stream.load_item(&sample, &mut self.rng) {
                Ok(item) => items.push(item),
                Err(e)   => return Some(Err(e)),
            }
        }

        let batch = <ImageBatcher as Batcher<B, ImageItem, ImageBatch<B>>>::batch(
            &self.stream.batcher,
            items,
            &self.device,
        );
        Some(Ok(batch))
    }
}
