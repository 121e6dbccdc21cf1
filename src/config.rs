/// Tunable parameters for capture sessions and the stitching engine
///
/// Both structs serialize to JSON with every field optional, so a config
/// file only needs to name the values it changes.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Number of photos in one mini-session.
pub const SESSION_CAPACITY: usize = 8;
/// Columns of the conceptual capture grid.
pub const GRID_COLUMNS: usize = 4;
/// Rows of the conceptual capture grid.
pub const GRID_ROWS: usize = 2;

/// How photos are laid out on the output canvas
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlacementMode {
    /// Fixed 4x2 cells, bottom row first, white background.
    Grid,
    /// Scaled device translation, black background.
    #[default]
    Position,
}

/// Thickness of the edge strips compared by the overlap matcher
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StripWidth {
    /// Fixed thickness in pixels.
    Pixels(u32),
    /// Fraction of the photo's width (vertical strips) or height (horizontal strips).
    Fraction(f32),
}

impl StripWidth {
    /// Resolve to a pixel thickness along an edge of `extent` pixels.
    ///
    /// Always at least 1 and never more than `extent`.
    pub fn resolve(&self, extent: u32) -> u32 {
        let px = match *self {
            StripWidth::Pixels(px) => px,
            StripWidth::Fraction(f) => (extent as f32 * f).round() as u32,
        };
        px.clamp(1, extent.max(1))
    }
}

impl Default for StripWidth {
    fn default() -> Self {
        StripWidth::Pixels(5)
    }
}

/// Which edge pair decides exact cost ties in the overlap search
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PriorityPolicy {
    /// Horizontal when the photos moved more along x than along y.
    #[default]
    FromPositionDelta,
    Horizontal,
    Vertical,
}

/// Stitching engine parameters
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct StitchConfig {
    pub mode: PlacementMode,
    /// Offsets are searched over `[-search_radius, search_radius]` on both axes.
    pub search_radius: i32,
    pub strip: StripWidth,
    pub priority: PriorityPolicy,
    /// Device-tracking units to pixels.
    pub position_scale: f64,
    /// Run the overlap matcher against the previous photo.
    pub refine_adjacency: bool,
    /// Horizontal field of view of the virtual camera used for 3-D compensation.
    pub virtual_fov_degrees: f64,
    /// Also produce a plain grid collage when stitching in position mode.
    pub grid_preview: bool,
}

impl Default for StitchConfig {
    fn default() -> Self {
        Self {
            mode: PlacementMode::Position,
            search_radius: 10,
            strip: StripWidth::default(),
            priority: PriorityPolicy::default(),
            position_scale: 2000.0,
            refine_adjacency: true,
            virtual_fov_degrees: 60.0,
            grid_preview: true,
        }
    }
}

/// Capture session parameters
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    pub stitch: StitchConfig,
    /// Rotate each incoming frame 90 degrees clockwise before recording it.
    pub rotate_frames_cw: bool,
    /// Write the export bundle as part of finalize.
    pub export_on_finalize: bool,
    /// Size of the guide strips shown for the next capture.
    pub edge_guide_fraction: f32,
    /// Translation magnitude below which the device counts as stationary.
    pub stationary_threshold: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            stitch: StitchConfig::default(),
            rotate_frames_cw: false,
            export_on_finalize: true,
            edge_guide_fraction: 0.1,
            stationary_threshold: 0.01,
        }
    }
}

impl SessionConfig {
    /// Convert to a pretty JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parse from a JSON string; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Load a config file from disk
    pub fn load(path: &Path) -> Result<Self, crate::error::SessionError> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::from_json(&text)?)
    }
}
