// ============================================================
// Layer 4 — Training-time Augmentation
// ============================================================
// Random geometric perturbations applied to each training
// image, freshly sampled every time the image is drawn:
//
//   rotation          ±40°
//   width shift       ±20% of width
//   height shift      ±20% of height
//   shear             ±0.2° (counter-clockwise, in degrees)
//   zoom              0.8 – 1.2, independently per axis
//   horizontal flip   p = 0.5
//
// Everything is folded into one affine matrix that maps an
// output pixel back to its source location (centred on the
// image middle). Source positions are sampled bilinearly and
// clamped to the border, which is "nearest" fill: pixels
// that fall outside repeat the edge.
//
// The RNG is passed in, so a seeded stream gives the same
// augmented epoch on every run.

use image::{Rgb, RgbImage};
use rand::Rng;

#[derive(Debug, Clone, Copy)]
pub struct AugmentConfig {
    pub rotation_deg:    f32,
    pub width_shift:     f32,
    pub height_shift:    f32,
    pub shear_deg:       f32,
    pub zoom_range:      (f32, f32),
    pub horizontal_flip: bool,
}

impl Default for AugmentConfig {
    fn default() -> Self {
        Self {
            rotation_deg:    40.0,
            width_shift:     0.2,
            height_shift:    0.2,
            shear_deg:       0.2,
            zoom_range:      (0.8, 1.2),
            horizontal_flip: true,
        }
    }
}

/// One sampled set of transform parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub theta: f32,
    pub tx:    f32,
    pub ty:    f32,
    pub shear: f32,
    pub zx:    f32,
    pub zy:    f32,
    pub flip:  bool,
}

impl Transform {
    pub fn identity() -> Self {
        Self { theta: 0.0, tx: 0.0, ty: 0.0, shear: 0.0, zx: 1.0, zy: 1.0, flip: false }
    }

    /// 2×3 matrix mapping centred output coords to centred source coords:
    /// rotation · shift · shear · zoom.
    fn matrix(&self) -> [[f32; 3]; 2] {
        let (s, c)   = self.theta.sin_cos();
        let (ss, sc) = self.shear.sin_cos();

        // rotation · shift
        let rt = [[c, -s, c * self.tx - s * self.ty], [s, c, s * self.tx + c * self.ty]];
        // shear · zoom
        let sz = [[self.zx, -ss * self.zy], [0.0, sc * self.zy]];

        [
            [
                rt[0][0] * sz[0][0] + rt[0][1] * sz[1][0],
                rt[0][0] * sz[0][1] + rt[0][1] * sz[1][1],
                rt[0][2],
            ],
            [
                rt[1][0] * sz[0][0] + rt[1][1] * sz[1][0],
                rt[1][0] * sz[0][1] + rt[1][1] * sz[1][1],
                rt[1][2],
            ],
        ]
    }

    pub fn apply(&self, img: &RgbImage) -> RgbImage {
        let (w, h) = img.dimensions();
        let cx = (w as f32 - 1.0) / 2.0;
        let cy = (h as f32 - 1.0) / 2.0;
        let m  = self.matrix();

        RgbImage::from_fn(w, h, |x, y| {
            let src_x = if self.flip { w - 1 - x } else { x };
            let ox = src_x as f32 - cx;
            let oy = y as f32 - cy;
            let sx = m[0][0] * ox + m[0][1] * oy + m[0][2] + cx;
            let sy = m[1][0] * ox + m[1][1] * oy + m[1][2] + cy;
            sample_bilinear(img, sx, sy)
        })
    }
}

/// Bilinear lookup with coordinates clamped to the image.
fn sample_bilinear(img: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let (w, h) = img.dimensions();
    let x = x.clamp(0.0, (w - 1) as f32);
    let y = y.clamp(0.0, (h - 1) as f32);

    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = img.get_pixel(x0, y0);
    let p10 = img.get_pixel(x1, y0);
    let p01 = img.get_pixel(x0, y1);
    let p11 = img.get_pixel(x1, y1);

    let mut out = [0u8; 3];
    for c in 0..3 {
        let top    = p00[c] as f32 * (1.0 - fx) + p10[c] as f32 * fx;
        let bottom = p01[c] as f32 * (1.0 - fx) + p11[c] as f32 * fx;
        out[c] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgb(out)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Augmenter {
    cfg: AugmentConfig,
}

impl Augmenter {
    pub fn new(cfg: AugmentConfig) -> Self {
        Self { cfg }
    }

    /// Draw transform parameters for an image of `width × height`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R, width: u32, height: u32) -> Transform {
        let sym = |rng: &mut R, r: f32| if r > 0.0 { rng.gen_range(-r..=r) } else { 0.0 };
        let (zlo, zhi) = self.cfg.zoom_range;
        let zoom = |rng: &mut R| if zhi > zlo { rng.gen_range(zlo..=zhi) } else { zlo };

        Transform {
            theta: sym(rng, self.cfg.rotation_deg).to_radians(),
            tx:    sym(rng, self.cfg.width_shift) * width as f32,
            ty:    sym(rng, self.cfg.height_shift) * height as f32,
            shear: sym(rng, self.cfg.shear_deg).to_radians(),
            zx:    zoom(rng),
            zy:    zoom(rng),
            flip:  self.cfg.horizontal_flip && rng.gen_bool(0.5),
        }
    }

    pub fn apply<R: Rng + ?Sized>(&self, img: &RgbImage, rng: &mut R) -> RgbImage {
        let (w, h) = img.dimensions();
        self.sample(rng, w, h).apply(img)
    }
}
