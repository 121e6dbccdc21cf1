/// Persisted session metadata document
///
/// One JSON document per session, `{ "items": [ ... ] }`, one entry per
/// photo. Vectors and quaternions are written as `{x, y, z}` and
/// `{x, y, z, w}` objects. The reader also accepts the camelCase field
/// names written by older capture builds.

use cgmath::{Quaternion, Vector3};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use super::data::{euler_degrees, GeoPoint, PhotoRecord, DEFAULT_QUALITY};
use crate::error::{SessionError, SessionResult};

/// Quaternion on the wire
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct QuatDoc {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl From<Quaternion<f64>> for QuatDoc {
    fn from(q: Quaternion<f64>) -> Self {
        Self { x: q.v.x, y: q.v.y, z: q.v.z, w: q.s }
    }
}

impl From<QuatDoc> for Quaternion<f64> {
    fn from(q: QuatDoc) -> Self {
        Quaternion::new(q.w, q.x, q.y, q.z)
    }
}

/// 3-vector on the wire
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3Doc {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl From<Vector3<f64>> for Vec3Doc {
    fn from(v: Vector3<f64>) -> Self {
        Self { x: v.x, y: v.y, z: v.z }
    }
}

impl From<Vec3Doc> for Vector3<f64> {
    fn from(v: Vec3Doc) -> Self {
        Vector3::new(v.x, v.y, v.z)
    }
}

fn default_quality() -> u8 {
    DEFAULT_QUALITY
}

/// One photo entry of the metadata document
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RecordEntry {
    #[serde(alias = "photoId")]
    pub photo_id: Uuid,
    #[serde(alias = "sessionId")]
    pub session_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub path: String,
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_quality")]
    pub quality: u8,
    #[serde(alias = "gyroAttitude")]
    pub orientation: QuatDoc,
    #[serde(alias = "relativeGyroAttitude")]
    pub orientation_relative: QuatDoc,
    #[serde(alias = "relativeEulerAngles")]
    pub euler_relative: Vec3Doc,
    #[serde(alias = "relativePosition", default)]
    pub position_relative: Vec3Doc,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

impl RecordEntry {
    /// Describe a record for persistence
    ///
    /// `path` is where the photo lives (or will live) on disk.
    pub fn from_record(record: &PhotoRecord, path: String) -> Self {
        Self {
            photo_id: record.photo_id,
            session_id: record.session_id,
            timestamp: record.captured_at,
            path,
            width: record.width,
            height: record.height,
            quality: record.quality,
            orientation: record.orientation.into(),
            orientation_relative: record.orientation_relative().into(),
            euler_relative: record.euler_relative().into(),
            position_relative: record.position_relative.into(),
            latitude: record.geo.map(|g| g.latitude),
            longitude: record.geo.map(|g| g.longitude),
        }
    }

    /// Rebuild a record that points at its photo on disk
    ///
    /// The stored `orientation_relative` is trusted as-is; the Euler
    /// angles are re-derived from it so the two cannot disagree.
    pub fn to_record(&self, grid_slot: usize) -> PhotoRecord {
        let geo = match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(GeoPoint { latitude, longitude }),
            _ => None,
        };

        let derived = euler_degrees(self.orientation_relative.into());
        let stored: Vector3<f64> = self.euler_relative.into();
        if angle_gap(derived, stored) > 0.5 {
            tracing::debug!(
                photo_id = %self.photo_id,
                "stored Euler angles disagree with orientation_relative, re-deriving"
            );
        }

        let mut record = PhotoRecord::new(self.photo_id, self.session_id, self.timestamp, grid_slot)
            .with_storage_path(PathBuf::from(&self.path))
            .with_dimensions(self.width, self.height)
            .with_pose(
                self.orientation.into(),
                self.orientation_relative.into(),
                self.position_relative.into(),
                geo,
            );
        record.quality = self.quality;
        record
    }
}

/// Largest per-axis difference between two Euler triples, modulo 360
fn angle_gap(a: Vector3<f64>, b: Vector3<f64>) -> f64 {
    let wrap = |d: f64| {
        let d = d.rem_euclid(360.0);
        d.min(360.0 - d)
    };
    wrap(a.x - b.x).max(wrap(a.y - b.y)).max(wrap(a.z - b.z))
}

/// Top-level metadata document
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct SessionDocument {
    #[serde(alias = "Items")]
    pub items: Vec<RecordEntry>,
}

impl SessionDocument {
    /// Document file name for a session: `Session_<id>.json`
    pub fn file_name(session_id: Uuid) -> String {
        format!("Session_{}.json", session_id)
    }

    /// Convert to a pretty JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parse a document; empty or unparsable input is malformed metadata
    pub fn from_json(json: &str) -> SessionResult<Self> {
        let document: SessionDocument = serde_json::from_str(json)
            .map_err(|e| SessionError::MalformedMetadata(e.to_string()))?;

        if document.items.is_empty() {
            return Err(SessionError::MalformedMetadata(
                "document contains no records".to_string(),
            ));
        }

        Ok(document)
    }

    /// Session the document belongs to (the first record's)
    pub fn session_id(&self) -> Option<Uuid> {
        self.items.first().map(|item| item.session_id)
    }
}
