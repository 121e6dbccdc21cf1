/// Capture aids: edge guides for the next slot and live pose status
///
/// Neither affects stitching. They tell the person holding the device how
/// the next photo relates to the ones already taken.

use cgmath::{InnerSpace, Vector3};
use image::RgbImage;

use super::data::{euler_degrees, relative_orientation, Orientation, PoseSample};
use crate::config::GRID_COLUMNS;

/// Already-captured neighbours of a grid slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EdgeGuides {
    /// Same visual row, one column to the left
    pub left: Option<usize>,
    /// Previous row; drawn directly below because rows are flipped
    pub below: Option<usize>,
}

impl EdgeGuides {
    pub fn for_slot(slot: usize) -> Self {
        Self {
            left: (slot % GRID_COLUMNS != 0).then(|| slot - 1),
            below: (slot >= GRID_COLUMNS).then(|| slot - GRID_COLUMNS),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_none() && self.below.is_none()
    }
}

/// Rightmost `fraction` of a photo, shown at the left edge of the next frame
pub fn right_strip(image: &RgbImage, fraction: f32) -> RgbImage {
    let (w, h) = image.dimensions();
    let tw = strip_extent(w, fraction);
    image::imageops::crop_imm(image, w - tw, 0, tw, h).to_image()
}

/// Topmost `fraction` of a photo, shown at the bottom edge of the next frame
pub fn top_strip(image: &RgbImage, fraction: f32) -> RgbImage {
    let (w, h) = image.dimensions();
    let th = strip_extent(h, fraction);
    image::imageops::crop_imm(image, 0, 0, w, th).to_image()
}

fn strip_extent(extent: u32, fraction: f32) -> u32 {
    ((extent as f32 * fraction).round() as u32).clamp(1, extent.max(1)).min(extent)
}

/// Tracking state relative to the session's first photo
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PoseStatus {
    /// No baseline yet
    Waiting,
    /// Translation below the stationary threshold
    Stationary {
        position: Vector3<f64>,
        euler: Vector3<f64>,
    },
    Ready {
        position: Vector3<f64>,
        euler: Vector3<f64>,
    },
}

impl PoseStatus {
    /// Compare the latest sample against the session baseline
    pub fn evaluate(
        baseline: Option<(Orientation, Vector3<f64>)>,
        sample: &PoseSample,
        stationary_threshold: f64,
    ) -> Self {
        let Some((reference, origin)) = baseline else {
            return PoseStatus::Waiting;
        };

        let position = sample.position - origin;
        let euler = euler_degrees(relative_orientation(reference, sample.orientation));

        if position.magnitude() < stationary_threshold {
            PoseStatus::Stationary { position, euler }
        } else {
            PoseStatus::Ready { position, euler }
        }
    }

    /// One-line description for a status label
    pub fn describe(&self) -> String {
        let fmt = |v: &Vector3<f64>| format!("({:.2}, {:.2}, {:.2})", v.x, v.y, v.z);
        match self {
            PoseStatus::Waiting => "Waiting for tracking...".to_string(),
            PoseStatus::Stationary { position, euler } => format!(
                "Camera is stationary | Offset: {} | Rotation: {}",
                fmt(position),
                fmt(euler)
            ),
            PoseStatus::Ready { position, euler } => format!(
                "Ready to capture | Offset: {} | Rotation: {}",
                fmt(position),
                fmt(euler)
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::data::identity;
    use image::Rgb;

    #[test]
    fn test_guides_follow_grid() {
        assert!(EdgeGuides::for_slot(0).is_empty());
        assert_eq!(EdgeGuides::for_slot(1), EdgeGuides { left: Some(0), below: None });
        assert_eq!(EdgeGuides::for_slot(4), EdgeGuides { left: None, below: Some(0) });
        assert_eq!(EdgeGuides::for_slot(6), EdgeGuides { left: Some(5), below: Some(2) });
    }

    #[test]
    fn test_strips() {
        let img = RgbImage::from_fn(100, 50, |x, y| Rgb([x as u8, y as u8, 0]));

        let right = right_strip(&img, 0.1);
        assert_eq!(right.dimensions(), (10, 50));
        assert_eq!(right.get_pixel(0, 0).0, [90, 0, 0]);

        let top = top_strip(&img, 0.2);
        assert_eq!(top.dimensions(), (100, 10));
        assert_eq!(top.get_pixel(0, 9).0, [0, 9, 0]);
    }

    #[test]
    fn test_pose_status() {
        let sample = PoseSample::from_orientation(identity()).with_position(Vector3::new(0.005, 0.0, 0.0));
        assert_eq!(PoseStatus::evaluate(None, &sample, 0.01), PoseStatus::Waiting);

        let baseline = Some((identity(), Vector3::new(0.0, 0.0, 0.0)));
        assert!(matches!(
            PoseStatus::evaluate(baseline, &sample, 0.01),
            PoseStatus::Stationary { .. }
        ));

        let moved = sample.with_position(Vector3::new(0.2, 0.0, 0.0));
        let status = PoseStatus::evaluate(baseline, &moved, 0.01);
        assert!(matches!(status, PoseStatus::Ready { .. }));
        assert!(status.describe().starts_with("Ready to capture"));
    }
}
