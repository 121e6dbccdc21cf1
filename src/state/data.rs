/// Shared data structures for captured photos and device poses
///
/// These structs represent the data model that flows between
/// the capture session, the stitching engine and the metadata document.

use cgmath::{Deg, Euler, InnerSpace, Quaternion, Rad, Vector3};
use chrono::{DateTime, Utc};
use image::RgbImage;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::SessionResult;

/// Device attitude as a unit quaternion
pub type Orientation = Quaternion<f64>;

/// Default encoder quality recorded for captured photos
pub const DEFAULT_QUALITY: u8 = 95;

/// The identity rotation
pub fn identity() -> Orientation {
    Quaternion::new(1.0, 0.0, 0.0, 0.0)
}

/// Normalize a quaternion, falling back to identity for degenerate input
pub fn normalized(q: Orientation) -> Orientation {
    if q.magnitude2() < 1e-12 || !q.magnitude2().is_finite() {
        identity()
    } else {
        q.normalize()
    }
}

/// Orientation of `raw` expressed relative to `reference`: `inverse(reference) * raw`
pub fn relative_orientation(reference: Orientation, raw: Orientation) -> Orientation {
    normalized(normalized(reference).conjugate() * normalized(raw))
}

/// Euler angles (x, y, z) in degrees for a rotation
pub fn euler_degrees(q: Orientation) -> Vector3<f64> {
    let euler: Euler<Rad<f64>> = Euler::from(normalized(q));
    Vector3::new(
        Deg::from(euler.x).0,
        Deg::from(euler.y).0,
        Deg::from(euler.z).0,
    )
}

/// Latitude/longitude in degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// The latest sample from the device pose provider
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseSample {
    pub orientation: Orientation,
    pub position: Vector3<f64>,
    pub geo: Option<GeoPoint>,
}

impl PoseSample {
    /// A pose with the given attitude and no translation tracking
    pub fn from_orientation(orientation: Orientation) -> Self {
        Self {
            orientation,
            position: Vector3::new(0.0, 0.0, 0.0),
            geo: None,
        }
    }

    pub fn with_position(mut self, position: Vector3<f64>) -> Self {
        self.position = position;
        self
    }

    pub fn with_geo(mut self, latitude: f64, longitude: f64) -> Self {
        self.geo = Some(GeoPoint { latitude, longitude });
        self
    }
}

impl Default for PoseSample {
    fn default() -> Self {
        Self::from_orientation(identity())
    }
}

/// One captured frame and its pose metadata
///
/// The pixels are either held in memory (fresh capture), on disk
/// (`storage_path`, resumed session), or both once a capture is persisted.
/// `euler_relative` is derived from `orientation_relative` and only
/// changes together with it.
#[derive(Debug, Clone)]
pub struct PhotoRecord {
    pub photo_id: Uuid,
    pub session_id: Uuid,
    pub captured_at: DateTime<Utc>,
    pub pixels: Option<RgbImage>,
    pub storage_path: Option<PathBuf>,
    pub width: u32,
    pub height: u32,
    pub quality: u8,
    pub orientation: Orientation,
    orientation_relative: Orientation,
    euler_relative: Vector3<f64>,
    pub position_relative: Vector3<f64>,
    pub geo: Option<GeoPoint>,
    /// Insertion order within the session, 0..=7
    pub grid_slot: usize,
}

impl PhotoRecord {
    /// A record with identity pose and no pixels yet
    pub fn new(photo_id: Uuid, session_id: Uuid, captured_at: DateTime<Utc>, grid_slot: usize) -> Self {
        Self {
            photo_id,
            session_id,
            captured_at,
            pixels: None,
            storage_path: None,
            width: 0,
            height: 0,
            quality: DEFAULT_QUALITY,
            orientation: identity(),
            orientation_relative: identity(),
            euler_relative: Vector3::new(0.0, 0.0, 0.0),
            position_relative: Vector3::new(0.0, 0.0, 0.0),
            geo: None,
            grid_slot,
        }
    }

    /// Attach in-memory pixels; dimensions follow the buffer
    pub fn with_pixels(mut self, image: RgbImage) -> Self {
        self.width = image.width();
        self.height = image.height();
        self.pixels = Some(image);
        self
    }

    pub fn with_storage_path(mut self, path: PathBuf) -> Self {
        self.storage_path = Some(path);
        self
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set absolute and relative pose
    pub fn with_pose(
        mut self,
        orientation: Orientation,
        orientation_relative: Orientation,
        position_relative: Vector3<f64>,
        geo: Option<GeoPoint>,
    ) -> Self {
        self.orientation = normalized(orientation);
        self.set_orientation_relative(orientation_relative);
        self.position_relative = position_relative;
        self.geo = geo;
        self
    }

    pub fn orientation_relative(&self) -> Orientation {
        self.orientation_relative
    }

    /// Euler angles of `orientation_relative`, degrees
    pub fn euler_relative(&self) -> Vector3<f64> {
        self.euler_relative
    }

    /// Roll around the viewing axis relative to the first photo, degrees
    pub fn roll_degrees(&self) -> f64 {
        self.euler_relative.z
    }

    pub fn set_orientation_relative(&mut self, q: Orientation) {
        self.orientation_relative = normalized(q);
        self.euler_relative = euler_degrees(self.orientation_relative);
    }

    /// File name used for this photo on disk and inside export bundles
    pub fn file_name(&self) -> String {
        match self.storage_path.as_deref().and_then(Path::file_name) {
            Some(name) => name.to_string_lossy().to_string(),
            None => format!("Photo_{}.png", self.photo_id),
        }
    }

    /// Borrow the in-memory pixels or read them from `storage_path`
    ///
    /// Returns `Ok(None)` when the record only points at a file that no
    /// longer exists; callers decide whether that is fatal.
    pub fn load_pixels(&self) -> SessionResult<Option<Cow<'_, RgbImage>>> {
        if let Some(pixels) = &self.pixels {
            return Ok(Some(Cow::Borrowed(pixels)));
        }

        match &self.storage_path {
            Some(path) if path.is_file() => {
                let image = image::open(path)?.to_rgb8();
                Ok(Some(Cow::Owned(image)))
            }
            _ => Ok(None),
        }
    }
}
