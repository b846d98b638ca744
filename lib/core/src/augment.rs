use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgba, RgbaImage};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Augmentation tiers. Each tier contains every transform of the tiers
/// below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AugmentStrength {
    /// Brightness and contrast jitter.
    Light,
    /// Adds color jitter, a small rotation and a random crop-resize.
    #[default]
    Medium,
    /// Adds a horizontal flip and sharpness jitter.
    Heavy,
}

impl AugmentStrength {
    /// Number of images `augment` returns for this tier, original included.
    pub fn output_count(self) -> usize {
        match self {
            AugmentStrength::Light => 3,
            AugmentStrength::Medium => 6,
            AugmentStrength::Heavy => 8,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AugmentStrength::Light => "light",
            AugmentStrength::Medium => "medium",
            AugmentStrength::Heavy => "heavy",
        }
    }
}

impl fmt::Display for AugmentStrength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AugmentStrength {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "light" => Ok(AugmentStrength::Light),
            "medium" => Ok(AugmentStrength::Medium),
            "heavy" => Ok(AugmentStrength::Heavy),
            other => Err(Error::Validation(format!(
                "unknown augmentation strength: {}",
                other
            ))),
        }
    }
}

/// Produces perturbed copies of an image. Every output has the dimensions
/// of the input and the first output is the input itself.
#[derive(Debug, Clone, Default)]
pub struct AugmentationSampler;

impl AugmentationSampler {
    pub fn new() -> Self {
        Self
    }

    pub fn augment(&self, image: &DynamicImage, strength: AugmentStrength) -> Vec<DynamicImage> {
        self.augment_with(image, strength, &mut rand::rng())
    }

    pub fn augment_with<R: Rng>(
        &self,
        image: &DynamicImage,
        strength: AugmentStrength,
        rng: &mut R,
    ) -> Vec<DynamicImage> {
        let src = image.to_rgba8();
        let mut out = Vec::with_capacity(strength.output_count());
        out.push(image.clone());

        out.push(to_dynamic(brightness(&src, rng.random_range(0.85..=1.15))));
        out.push(to_dynamic(contrast(&src, rng.random_range(0.9..=1.1))));

        if strength == AugmentStrength::Light {
            return out;
        }

        out.push(to_dynamic(saturation(&src, rng.random_range(0.9..=1.1))));
        out.push(to_dynamic(rotate(&src, rng.random_range(-10.0f32..=10.0))));
        out.push(to_dynamic(random_crop(&src, rng)));

        if strength == AugmentStrength::Medium {
            return out;
        }

        out.push(to_dynamic(imageops::flip_horizontal(&src)));
        out.push(to_dynamic(sharpness(&src, rng.random_range(0.8..=1.2))));
        out
    }
}

fn to_dynamic(img: RgbaImage) -> DynamicImage {
    DynamicImage::ImageRgba8(img)
}

/// `degenerate + (src - degenerate) * factor`, per color channel, alpha kept.
fn blend(src: &RgbaImage, degenerate: impl Fn(u32, u32, &Rgba<u8>) -> [f32; 3], factor: f32) -> RgbaImage {
    let mut out = src.clone();
    for (x, y, px) in out.enumerate_pixels_mut() {
        let base = degenerate(x, y, &*px);
        for c in 0..3 {
            let v = base[c] + (px[c] as f32 - base[c]) * factor;
            px[c] = v.round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

fn luma(px: &Rgba<u8>) -> f32 {
    0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32
}

fn brightness(src: &RgbaImage, factor: f32) -> RgbaImage {
    blend(src, |_, _, _| [0.0; 3], factor)
}

fn contrast(src: &RgbaImage, factor: f32) -> RgbaImage {
    let count = (src.width() as u64 * src.height() as u64).max(1) as f32;
    let mean = (src.pixels().map(luma).sum::<f32>() / count).round();
    blend(src, |_, _, _| [mean; 3], factor)
}

fn saturation(src: &RgbaImage, factor: f32) -> RgbaImage {
    blend(src, |_, _, px| [luma(px).round(); 3], factor)
}

fn sharpness(src: &RgbaImage, factor: f32) -> RgbaImage {
    let smooth: RgbaImage = imageops::filter3x3(
        src,
        &[
            1.0 / 13.0, 1.0 / 13.0, 1.0 / 13.0,
            1.0 / 13.0, 5.0 / 13.0, 1.0 / 13.0,
            1.0 / 13.0, 1.0 / 13.0, 1.0 / 13.0,
        ],
    );
    blend(
        src,
        |x, y, _| {
            let p = smooth.get_pixel(x, y);
            [p[0] as f32, p[1] as f32, p[2] as f32]
        },
        factor,
    )
}

/// Rotate about the center, keeping the canvas size. Uncovered corners are
/// filled white.
fn rotate(src: &RgbaImage, degrees: f32) -> RgbaImage {
    let (w, h) = src.dimensions();
    let (sin, cos) = degrees.to_radians().sin_cos();
    let cx = (w as f32 - 1.0) / 2.0;
    let cy = (h as f32 - 1.0) / 2.0;

    RgbaImage::from_fn(w, h, |x, y| {
        let dx = x as f32 - cx;
        let dy = y as f32 - cy;
        let sx = (cos * dx + sin * dy + cx).round();
        let sy = (-sin * dx + cos * dy + cy).round();
        if sx >= 0.0 && sy >= 0.0 && (sx as u32) < w && (sy as u32) < h {
            *src.get_pixel(sx as u32, sy as u32)
        } else {
            Rgba([255, 255, 255, 255])
        }
    })
}

/// Crop a square of 85-95% of the short side at a random offset and scale
/// it back to the source size.
fn random_crop<R: Rng>(src: &RgbaImage, rng: &mut R) -> RgbaImage {
    let (w, h) = src.dimensions();
    let side = ((w.min(h) as f32) * rng.random_range(0.85f32..=0.95)) as u32;
    let side = side.clamp(1, w.min(h).max(1));
    let x = rng.random_range(0..=w.saturating_sub(side));
    let y = rng.random_range(0..=h.saturating_sub(side));
    let cropped = imageops::crop_imm(src, x, y, side, side).to_image();
    imageops::resize(&cropped, w, h, FilterType::Lanczos3)
}
