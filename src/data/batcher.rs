// ============================================================
// Layer 4 — Image Batcher
// ============================================================
// Implements Burn's Batcher trait to stack preprocessed images
// into device tensors.
//
// How batching works here:
//   Input:  Vec of N ImageItems, each a CHW Vec<f32> of
//           length C·H·W plus a class index
//   Output: ImageBatch with
//             images  [N, C, H, W]
//             targets [N, num_classes] one-hot
//             labels  Vec<usize> (host copy, for accuracy and
//                     the evaluation report)
//
// The one-hot encoding is built on the host and uploaded as
// one float tensor, so categorical cross-entropy is a plain
// element-wise product with log-probabilities.
//
// Reference: Burn Book §4 (Batcher)

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
    tensor::TensorData,
};

use crate::config::ImageSize;

/// One decoded, resized, rescaled image.
#[derive(Debug, Clone)]
pub struct ImageItem {
    /// CHW, values in [0, 1]
    pub pixels: Vec<f32>,
    pub label:  usize,
}

// ─── ImageBatch ───────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct ImageBatch<B: Backend> {
    /// shape: [batch, channels, height, width]
    pub images: Tensor<B, 4>,

    /// One-hot targets, shape: [batch, num_classes]
    pub targets: Tensor<B, 2>,

    /// Class indices, same order as the rows above
    pub labels: Vec<usize>,
}

// ─── ImageBatcher ─────────────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct ImageBatcher {
    image_size:  ImageSize,
    num_classes: usize,
}

impl ImageBatcher {
    pub fn new(image_size: ImageSize, num_classes: usize) -> Self {
        Self { image_size, num_classes }
    }

    pub fn one_hot(&self, labels: &[usize]) -> Vec<f32> {
        let mut out = vec![0.0f32; labels.len() * self.num_classes];
        for (row, &label) in labels.iter().enumerate() {
            if label < self.num_classes {
                out[row * self.num_classes + label] = 1.0;
            }
        }
        out
    }
}

impl<B: Backend> Batcher<B, ImageItem, ImageBatch<B>> for ImageBatcher {
    fn batch(&self, items: Vec<ImageItem>, device: &B::Device) -> ImageBatch<B> {
        let n = items.len();
        let ImageSize { height, width, channels } = self.image_size;

        let labels: Vec<usize> = items.iter().map(|i| i.label).collect();
        let pixels: Vec<f32>   = items.into_iter().flat_map(|i| i.pixels).collect();

        let images = Tensor::<B, 4>::from_data(
            TensorData::new(pixels, [n, channels, height, width]),
            device,
        );
        let targets = Tensor::<B, 2>::from_data(
            TensorData::new(self.one_hot(&labels), [n, self.num_classes]),
            device,
        );

        ImageBatch { images, targets, labels }
    }
}
