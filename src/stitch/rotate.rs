/// Rotation compensation for captured photos
///
/// Both variants remap every destination pixel to the inverse-rotated
/// source pixel (nearest neighbour) and keep the input dimensions.
/// Source coordinates outside the photo take the background colour.

use cgmath::{Matrix3, Quaternion, Vector3};
use image::{Rgb, RgbImage};
use rayon::prelude::*;

use crate::state::data::normalized;

/// Background fill for uncovered pixels
///
/// Grid composites use white, position composites use black.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Background {
    White,
    Black,
}

impl Background {
    pub fn rgb(self) -> Rgb<u8> {
        match self {
            Background::White => Rgb([255, 255, 255]),
            Background::Black => Rgb([0, 0, 0]),
        }
    }
}

/// Rotation to apply to a photo
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RotationDelta {
    /// In-plane rotation in degrees, positive = clockwise on screen.
    Planar { degrees: f64 },
    /// Full 3-D rotation of the photo plane in front of a centred camera.
    Spatial(Quaternion<f64>),
}

/// Rotation compensator for a virtual pinhole camera
#[derive(Debug, Clone, Copy)]
pub struct RotationCompensator {
    /// Horizontal field of view used to build the camera matrix
    pub fov_degrees: f64,
}

impl Default for RotationCompensator {
    fn default() -> Self {
        Self { fov_degrees: 60.0 }
    }
}

impl RotationCompensator {
    pub fn new(fov_degrees: f64) -> Self {
        Self { fov_degrees }
    }

    /// Focal length in pixels for an image `width` pixels wide
    pub fn focal_length(&self, width: u32) -> f64 {
        let half_fov = (self.fov_degrees.clamp(1.0, 179.0) / 2.0).to_radians();
        (width as f64 / 2.0) / half_fov.tan()
    }

    /// Rotate `image` by `delta`; output has the same dimensions
    pub fn compensate(&self, image: &RgbImage, delta: RotationDelta, background: Background) -> RgbImage {
        match delta {
            RotationDelta::Planar { degrees } => rotate_planar(image, degrees, background),
            RotationDelta::Spatial(q) => self.rotate_spatial(image, q, background),
        }
    }

    /// Perspective warp induced by rotating the photo plane by `q`
    ///
    /// Camera axes: x right, y down, z forward. For each destination pixel
    /// the viewing ray is rotated back by `q` and reprojected onto the
    /// source raster. Rays that end up behind the camera are background.
    fn rotate_spatial(&self, image: &RgbImage, q: Quaternion<f64>, background: Background) -> RgbImage {
        let (width, height) = image.dimensions();
        let f = self.focal_length(width);
        let cx = (width as f64 - 1.0) / 2.0;
        let cy = (height as f64 - 1.0) / 2.0;

        // Rotation matrices are orthonormal: the inverse is the transpose
        let inverse: Matrix3<f64> = Matrix3::from(normalized(q).conjugate());

        remap(image, background, |x, y| {
            let ray = Vector3::new((x - cx) / f, (y - cy) / f, 1.0);
            let src = inverse * ray;
            if src.z <= 1e-9 {
                return None;
            }
            Some((f * src.x / src.z + cx, f * src.y / src.z + cy))
        })
    }
}

/// In-plane rotation around the image centre
pub fn rotate_planar(image: &RgbImage, degrees: f64, background: Background) -> RgbImage {
    let (width, height) = image.dimensions();
    let cx = (width as f64 - 1.0) / 2.0;
    let cy = (height as f64 - 1.0) / 2.0;

    // y points down, so a positive angle turns content clockwise on screen.
    // Sampling needs the inverse rotation.
    let (sin, cos) = (-degrees).to_radians().sin_cos();

    remap(image, background, |x, y| {
        let dx = x - cx;
        let dy = y - cy;
        Some((dx * cos - dy * sin + cx, dx * sin + dy * cos + cy))
    })
}

/// Rotate a sensor frame a quarter turn clockwise (landscape sensor to portrait)
pub fn rotate_quarter_cw(frame: &RgbImage) -> RgbImage {
    image::imageops::rotate90(frame)
}

/// Inverse-map every destination pixel through `source_of`
fn remap<F>(image: &RgbImage, background: Background, source_of: F) -> RgbImage
where
    F: Fn(f64, f64) -> Option<(f64, f64)> + Sync,
{
    let (width, height) = image.dimensions();
    let mut out = RgbImage::from_pixel(width, height, background.rgb());
    if width == 0 || height == 0 {
        return out;
    }

    let row_len = width as usize * 3;
    out.as_mut()
        .par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..width {
                let Some((sx, sy)) = source_of(x as f64, y as f64) else {
                    continue;
                };
                let sx = sx.round();
                let sy = sy.round();
                if sx < 0.0 || sy < 0.0 || sx >= width as f64 || sy >= height as f64 {
                    continue;
                }
                let px = image.get_pixel(sx as u32, sy as u32);
                let i = x as usize * 3;
                row[i..i + 3].copy_from_slice(&px.0);
            }
        });

    out
}
