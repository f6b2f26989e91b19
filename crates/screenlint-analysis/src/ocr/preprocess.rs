//! Image preprocessing used between OCR attempts

use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, GrayImage, Luma};
use screenlint_core::Rect;

/// Crops at or below this height are upscaled
pub const MIN_OCR_HEIGHT: u32 = 50;

/// Mean brightness below which a region is treated as dark mode
pub const DARK_MODE_THRESHOLD: f64 = 127.0;

pub const ADAPTIVE_BLOCK_SIZE: u32 = 99;
pub const ADAPTIVE_CONSTANT: f64 = 4.0;

const GAUSSIAN_3X3: [f32; 9] = [
    1.0 / 16.0,
    2.0 / 16.0,
    1.0 / 16.0,
    2.0 / 16.0,
    4.0 / 16.0,
    2.0 / 16.0,
    1.0 / 16.0,
    2.0 / 16.0,
    1.0 / 16.0,
];

/// Region of `image` inside `bounds`, `None` when they do not overlap
pub fn crop(image: &DynamicImage, bounds: Rect) -> Option<DynamicImage> {
    let (w, h) = image.dimensions();
    let area = Rect::new(0, 0, w as i32, h as i32).intersect(&bounds)?;
    Some(image.crop_imm(
        area.x as u32,
        area.y as u32,
        area.width as u32,
        area.height as u32,
    ))
}

/// Scale a short crop up to [`MIN_OCR_HEIGHT`] with cubic interpolation
pub fn upscale_small(image: &DynamicImage) -> Option<DynamicImage> {
    let (w, h) = image.dimensions();
    if h == 0 || h > MIN_OCR_HEIGHT {
        return None;
    }
    let factor = MIN_OCR_HEIGHT as f64 / h as f64;
    let new_w = ((w as f64 * factor).round() as u32).max(1);
    Some(image.resize_exact(new_w, MIN_OCR_HEIGHT, FilterType::CatmullRom))
}

/// Summed-area table with a zero row and column in front
struct Integral {
    width: usize,
    sums: Vec<u64>,
}

impl Integral {
    fn new(image: &GrayImage) -> Self {
        let (w, h) = (image.width() as usize, image.height() as usize);
        let width = w + 1;
        let mut sums = vec![0u64; width * (h + 1)];
        for y in 0..h {
            let mut row = 0u64;
            for x in 0..w {
                row += image.get_pixel(x as u32, y as u32)[0] as u64;
                sums[(y + 1) * width + x + 1] = sums[y * width + x + 1] + row;
            }
        }
        Self { width, sums }
    }

    /// Sum over `[x0, x1) x [y0, y1)`
    fn sum(&self, x0: usize, y0: usize, x1: usize, y1: usize) -> u64 {
        let w = self.width;
        self.sums[y1 * w + x1] + self.sums[y0 * w + x0]
            - self.sums[y0 * w + x1]
            - self.sums[y1 * w + x0]
    }

    /// Mean of the window of `radius` around `(x, y)`, clamped to the image
    fn window_mean(&self, x: u32, y: u32, radius: u32, w: u32, h: u32) -> f64 {
        let x0 = x.saturating_sub(radius) as usize;
        let y0 = y.saturating_sub(radius) as usize;
        let x1 = (x + radius + 1).min(w) as usize;
        let y1 = (y + radius + 1).min(h) as usize;
        let count = ((x1 - x0) * (y1 - y0)) as f64;
        self.sum(x0, y0, x1, y1) as f64 / count
    }
}

/// Box blur with a `(2 * radius + 1)` square window
pub fn box_blur(image: &GrayImage, radius: u32) -> GrayImage {
    let (w, h) = image.dimensions();
    let integral = Integral::new(image);
    GrayImage::from_fn(w, h, |x, y| {
        Luma([integral.window_mean(x, y, radius, w, h).round() as u8])
    })
}

pub fn mean_brightness(image: &GrayImage) -> f64 {
    let pixels = (image.width() as u64) * (image.height() as u64);
    if pixels == 0 {
        return 255.0;
    }
    let total: u64 = image.pixels().map(|p| p[0] as u64).sum();
    total as f64 / pixels as f64
}

/// Light text on a dark background
pub fn is_dark_mode(image: &GrayImage) -> bool {
    mean_brightness(&box_blur(image, 2)) < DARK_MODE_THRESHOLD
}

/// Grayscale with dark text on a light background
pub fn normalized_grayscale(image: &DynamicImage) -> GrayImage {
    let mut gray = image.to_luma8();
    if is_dark_mode(&gray) {
        imageops::invert(&mut gray);
    }
    gray
}

pub fn gaussian_blur_3x3(image: &GrayImage) -> GrayImage {
    imageops::filter3x3(image, &GAUSSIAN_3X3)
}

/// Normalized 1-D Gaussian of `size` taps; sigma follows the size the way OpenCV derives it
fn gaussian_kernel(size: u32) -> Vec<f32> {
    let sigma = 0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let half = (size / 2) as i64;
    let mut kernel: Vec<f32> = (-half..=half)
        .map(|i| (-((i * i) as f32) / (2.0 * sigma * sigma)).exp())
        .collect();
    let total: f32 = kernel.iter().sum();
    kernel.iter_mut().for_each(|k| *k /= total);
    kernel
}

/// Gaussian-weighted mean of the `block_size` window around every pixel
///
/// Separable, with borders replicated. `block_size` is rounded up to odd.
pub fn gaussian_local_mean(image: &GrayImage, block_size: u32) -> Vec<f32> {
    let (w, h) = image.dimensions();
    let kernel = gaussian_kernel(block_size | 1);
    let half = (kernel.len() / 2) as i64;
    let clamp = |v: i64, len: u32| v.clamp(0, len as i64 - 1) as u32;

    let mut rows = vec![0f32; (w as usize) * (h as usize)];
    for y in 0..h {
        for x in 0..w {
            rows[(y * w + x) as usize] = kernel
                .iter()
                .enumerate()
                .map(|(i, k)| {
                    let sx = clamp(x as i64 + i as i64 - half, w);
                    k * image.get_pixel(sx, y)[0] as f32
                })
                .sum();
        }
    }

    let mut mean = vec![0f32; rows.len()];
    for y in 0..h {
        for x in 0..w {
            mean[(y * w + x) as usize] = kernel
                .iter()
                .enumerate()
                .map(|(i, k)| {
                    let sy = clamp(y as i64 + i as i64 - half, h);
                    k * rows[(sy * w + x) as usize]
                })
                .sum();
        }
    }
    mean
}

/// Binary threshold against the Gaussian-weighted local mean minus `constant`
///
/// A pixel becomes white when it is brighter than the weighted mean of the
/// `block_size` window around it minus `constant`, otherwise black.
pub fn adaptive_threshold(image: &GrayImage, block_size: u32, constant: f64) -> GrayImage {
    let (w, h) = image.dimensions();
    let mean = gaussian_local_mean(image, block_size);
    GrayImage::from_fn(w, h, |x, y| {
        let threshold = mean[(y * w + x) as usize].round() as f64 - constant;
        if image.get_pixel(x, y)[0] as f64 > threshold {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn gray(w: u32, h: u32, value: u8) -> GrayImage {
        GrayImage::from_pixel(w, h, Luma([value]))
    }

    #[test]
    fn test_crop_clamps_to_image() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(100, 80));
        let cropped = crop(&image, Rect::new(90, 70, 50, 50)).unwrap();
        assert_eq!(cropped.dimensions(), (10, 10));
        assert!(crop(&image, Rect::new(200, 200, 10, 10)).is_none());
    }

    #[test]
    fn test_upscale_only_small_crops() {
        let small = DynamicImage::ImageLuma8(gray(40, 20, 200));
        let up = upscale_small(&small).unwrap();
        assert_eq!(up.dimensions(), (100, 50));

        let tall = DynamicImage::ImageLuma8(gray(40, 60, 200));
        assert!(upscale_small(&tall).is_none());
    }

    #[test]
    fn test_dark_mode_is_inverted() {
        let dark = DynamicImage::ImageLuma8(gray(20, 20, 30));
        let normalized = normalized_grayscale(&dark);
        assert_eq!(normalized.get_pixel(5, 5)[0], 225);

        let light = DynamicImage::ImageLuma8(gray(20, 20, 230));
        assert_eq!(normalized_grayscale(&light).get_pixel(5, 5)[0], 230);
    }

    #[test]
    fn test_box_blur_uniform_is_unchanged() {
        let blurred = box_blur(&gray(9, 9, 100), 2);
        assert!(blurred.pixels().all(|p| p[0] == 100));
    }

    #[test]
    fn test_adaptive_threshold_separates_text() {
        // dark 2x2 "glyph" on a light background
        let mut image = gray(12, 12, 220);
        for (x, y) in [(5, 5), (5, 6), (6, 5), (6, 6)] {
            image.put_pixel(x, y, Luma([20]));
        }
        let binary = adaptive_threshold(&image, ADAPTIVE_BLOCK_SIZE, ADAPTIVE_CONSTANT);
        assert_eq!(binary.get_pixel(5, 5)[0], 0);
        assert_eq!(binary.get_pixel(0, 0)[0], 255);
    }

    #[test]
    fn test_gaussian_kernel_normalized() {
        let kernel = gaussian_kernel(ADAPTIVE_BLOCK_SIZE);
        assert_eq!(kernel.len(), 99);
        assert!((kernel.iter().sum::<f32>() - 1.0).abs() < 1e-4);
        assert!(kernel[49] > kernel[30] && kernel[30] > kernel[0]);
        assert_eq!(gaussian_kernel(10).len(), 11);
    }

    #[test]
    fn test_local_mean_weights_nearby_pixels_more() {
        // a box mean would rate x=0 brighter than the peak itself
        let mut image = gray(11, 1, 0);
        image.put_pixel(5, 0, Luma([255]));
        let mean = gaussian_local_mean(&image, 11);
        assert!(mean[5] > mean[3]);
        assert!(mean[3] > mean[0]);
        assert!((mean[4] - mean[6]).abs() < 1e-3);

        let uniform = gaussian_local_mean(&gray(7, 5, 90), 99);
        assert!(uniform.iter().all(|m| (m - 90.0).abs() < 1e-2));
    }

    #[test]
    fn test_uniform_region_thresholds_white() {
        let binary = adaptive_threshold(&gray(10, 10, 128), 99, 4.0);
        assert!(binary.pixels().all(|p| p[0] == 255));
    }
}
