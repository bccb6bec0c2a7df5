use std::path::Path;

use image::{GrayImage, Luma};
use log::debug;
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::error::DenoiseError;

// A rows x cols grayscale image with f64 pixels, used both for the synthetic
// ground truth (integer ring values in [0, colors)) and for its corrupted
// observation (real-valued after Gaussian noise).
pub struct Image {
    rows: usize,
    cols: usize,
    pixels: Vec<f64>,
}

impl Image {
    pub fn new(rows: usize, cols: usize) -> Self {
        assert!(
            rows > 0 && cols > 0,
            "Image must have positive dimensions."
        );
        Image {
            rows,
            cols,
            pixels: vec![0.; rows * cols],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn num_pixels(&self) -> usize {
        self.pixels.len()
    }

    // Row-major vertex id of a cell; the model builder relies on this
    // numbering matching the order vertices are added to the MRF
    pub fn vertid(&self, row: usize, col: usize) -> usize {
        row * self.cols + col
    }

    pub fn pixel(&self, row: usize, col: usize) -> f64 {
        self.pixels[self.vertid(row, col)]
    }

    pub fn set_pixel(&mut self, row: usize, col: usize, value: f64) {
        let id = self.vertid(row, col);
        self.pixels[id] = value;
    }

    pub fn pixel_by_id(&self, id: usize) -> f64 {
        self.pixels[id]
    }

    pub fn set_pixel_by_id(&mut self, id: usize, value: f64) {
        self.pixels[id] = value;
    }

    // Paints concentric rings about the image center, cycling through the
    // given number of ring values. Pixels outside the inscribed circle get
    // ring zero.
    pub fn paint_sunset(&mut self, num_rings: usize) {
        assert!(num_rings > 0, "Image must have at least one ring.");
        let center_row = self.rows as f64 / 2.;
        let center_col = self.cols as f64 / 2.;
        let max_radius = self.rows.min(self.cols) as f64 / 2.;
        for row in 0..self.rows {
            for col in 0..self.cols {
                let distance = ((row as f64 - center_row).powi(2)
                    + (col as f64 - center_col).powi(2))
                .sqrt();
                let ring = if distance < max_radius {
                    (distance * num_rings as f64 / max_radius).floor() as usize % num_rings
                } else {
                    0
                };
                self.set_pixel(row, col, ring as f64);
            }
        }
    }

    // Adds zero-mean Gaussian noise with the given standard deviation to
    // every pixel
    pub fn corrupt(&mut self, sigma: f64, rng: &mut impl Rng) {
        assert!(sigma > 0., "Noise standard deviation must be positive.");
        let noise = Normal::new(0., sigma).expect("sigma is finite and positive");
        for pixel in self.pixels.iter_mut() {
            *pixel += noise.sample(rng);
        }
    }

    // Saves as 8-bit grayscale, scaling the current pixel range onto 0..=255.
    // The format is inferred from the file extension.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), DenoiseError> {
        let min = self.pixels.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = self
            .pixels
            .iter()
            .cloned()
            .fold(f64::NEG_INFINITY, f64::max);
        let range = if max > min { max - min } else { 1. };
        let mut output = GrayImage::new(self.cols as u32, self.rows as u32);
        for row in 0..self.rows {
            for col in 0..self.cols {
                let scaled = (self.pixel(row, col) - min) / range * 255.;
                output.put_pixel(
                    col as u32,
                    row as u32,
                    Luma([scaled.round().clamp(0., 255.) as u8]),
                );
            }
        }
        debug!("Saving {}x{} image to {:?}", self.rows, self.cols, path.as_ref());
        output.save(path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;

    #[test]
    fn vertid_is_row_major() {
        let img = Image::new(3, 4);
        assert_eq!(img.vertid(0, 0), 0);
        assert_eq!(img.vertid(0, 3), 3);
        assert_eq!(img.vertid(1, 0), 4);
        assert_eq!(img.vertid(2, 3), 11);
    }

    #[test]
    fn paint_sunset_stays_within_ring_range() {
        let mut img = Image::new(20, 20);
        img.paint_sunset(5);
        for row in 0..img.rows() {
            for col in 0..img.cols() {
                let value = img.pixel(row, col);
                assert_eq!(value, value.floor());
                assert!(value >= 0. && value < 5.);
            }
        }
    }

    #[test]
    fn paint_sunset_is_brightest_near_the_edge_of_the_circle() {
        let mut img = Image::new(21, 21);
        img.paint_sunset(3);
        // The exact center sits in ring zero
        assert_eq!(img.pixel(10, 10), 0.);
    }

    #[test]
    fn corrupt_perturbs_pixels() {
        let mut img = Image::new(10, 10);
        img.paint_sunset(4);
        let clean: Vec<f64> = (0..img.num_pixels()).map(|id| img.pixel_by_id(id)).collect();
        let mut rng = StdRng::seed_from_u64(7);
        img.corrupt(2., &mut rng);
        let changed = (0..img.num_pixels())
            .filter(|&id| img.pixel_by_id(id) != clean[id])
            .count();
        assert!(changed > img.num_pixels() / 2);
    }
}
